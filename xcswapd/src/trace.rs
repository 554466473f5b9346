use tracing::{info, level_filters::LevelFilter, subscriber};
use tracing_subscriber::FmtSubscriber;

pub fn init_tracing(level: LevelFilter) -> anyhow::Result<()> {
    if level == LevelFilter::OFF {
        return Ok(());
    }

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();

    subscriber::set_global_default(subscriber)?;
    info!("initialized tracing with level: {}", level);

    Ok(())
}
