pub mod file;
pub mod settings;

use ::serde::{Deserialize, Serialize};
use anyhow::{anyhow, Context};
use std::path::PathBuf;
use url::Url;

pub use self::{file::File, settings::*};

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Data {
    pub dir: PathBuf,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Bitcoind {
    pub node_url: Url,
    pub username: Option<String>,
    pub password: Option<String>,
}

pub fn read_config<T>(config_file: &Option<PathBuf>, default_config_path: T) -> anyhow::Result<File>
where
    T: FnOnce() -> anyhow::Result<PathBuf>,
{
    let path = config_file
        .as_ref()
        .map(|path| {
            eprintln!("Using config file {}", path.display());
            path
        })
        .map_or_else(
            || {
                let default_path = default_config_path()?;

                if default_path.exists() {
                    eprintln!(
                        "Using config file at default path: {}",
                        default_path.display()
                    );
                    Ok(default_path)
                } else {
                    eprintln!("Config file default path is {}", default_path.display());
                    Err(anyhow!("no config file at the default path"))
                }
            },
            |path| Ok(path.to_path_buf()),
        )
        .ok();

    match path {
        Some(path) => File::read(&path)
            .with_context(|| format!("failed to read config file {}", path.display())),
        None => Ok(File::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::file::Level;
    use spectral::prelude::*;
    use std::{fs, io::Write};
    use xcswap::ledger;

    #[test]
    fn bitcoind_section_deserializes_with_and_without_credentials() {
        let file_contents = vec![
            r#"
            node_url = "http://localhost:18443/"
            "#,
            r#"
            node_url = "http://localhost:18443/"
            username = "user"
            password = "hunter2"
            "#,
        ];

        let expected = vec![
            Bitcoind {
                node_url: "http://localhost:18443/".parse().unwrap(),
                username: None,
                password: None,
            },
            Bitcoind {
                node_url: "http://localhost:18443/".parse().unwrap(),
                username: Some("user".to_owned()),
                password: Some("hunter2".to_owned()),
            },
        ];

        let actual = file_contents
            .into_iter()
            .map(toml::from_str)
            .collect::<Result<Vec<Bitcoind>, toml::de::Error>>()
            .unwrap();

        assert_that!(actual).is_equal_to(expected);
    }

    #[test]
    fn sample_config_deserializes_correctly() {
        let config = read_config(
            &Some(PathBuf::from(concat!(
                env!("CARGO_MANIFEST_DIR"),
                "/sample-config.toml"
            ))),
            || unreachable!(),
        )
        .unwrap();

        let bitcoin = config.bitcoin.unwrap();
        assert_that!(bitcoin.network).is_equal_to(Some(ledger::Bitcoin::Regtest));
        assert_that!(bitcoin.fee_sat).is_equal_to(Some(1_000));
        assert_that!(bitcoin.bitcoind.map(|bitcoind| bitcoind.node_url.to_string()))
            .is_equal_to(Some("http://localhost:18443/".to_owned()));
        assert_that!(config.logging.and_then(|logging| logging.level))
            .is_equal_to(Some(Level::Info));
        assert_that!(config.swap.and_then(|swap| swap.safety_margin_secs))
            .is_equal_to(Some(600));
    }

    #[test]
    fn read_config_uses_default_path() {
        let tmp_dir = tempfile::TempDir::new().unwrap();
        let default_path = tmp_dir.path().join("config.toml");

        let mut file = fs::File::create(default_path.clone()).unwrap();
        file.write_all(b"[data]\ndir = \"/not/a/default/location/\"")
            .unwrap();

        let config = read_config(&None, || Ok(default_path)).unwrap();

        assert_that!(config.data.unwrap().dir)
            .is_equal_to(PathBuf::from("/not/a/default/location/"));
    }

    #[test]
    fn read_config_returns_default_config_if_default_path_errors() {
        let config = read_config(&None, || Err(anyhow!("Some error"))).unwrap();

        assert_that!(config).is_equal_to(File::default());
    }

    #[test]
    fn read_config_errors_if_passed_path_doesnt_exist() {
        let config = read_config(&Some(PathBuf::from("/this/path/doesnt/exist")), || {
            unreachable!()
        });

        assert_that!(config).is_err();
    }
}
