use crate::{command::connect, config::Settings};
use std::sync::Arc;

pub async fn resume(settings: Settings) -> anyhow::Result<()> {
    let deps = Arc::new(connect(settings).await?);
    let swaps = deps.db.all_swaps()?;

    if swaps.is_empty() {
        tracing::info!("no swaps to resume");
        return Ok(());
    }

    let executions = swaps.into_iter().map(|(swap_id, record)| {
        let deps = deps.clone();
        tokio::spawn(async move { (swap_id, deps.execute(swap_id, record).await) })
    });

    for execution in futures::future::join_all(executions).await {
        match execution {
            Ok((swap_id, Ok(state))) => println!("swap {} ended in {}", swap_id, state),
            Ok((swap_id, Err(error))) => tracing::error!("swap {}: {:#}", swap_id, error),
            Err(error) => tracing::error!("swap task failed: {}", error),
        }
    }

    Ok(())
}
