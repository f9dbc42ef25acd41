use anyhow::Result;

use super::Config;
use super::ConfigKey;
use crate::application::cli;

#[test]
fn it_serializes_to_valid_toml() {
    let res = Config::serialize_default(cli::build());
    let toml_res = res.parse::<toml_edit::Document>();
    assert!(toml_res.is_ok());
}

#[test]
fn it_has_a_default_for_every_key() {
    let doc = Config::serialize_default(cli::build())
        .parse::<toml_edit::Document>()
        .unwrap();

    assert_eq!(doc["api-url"].as_str(), Some("http://localhost:8080"));
    assert_eq!(doc["page-size"].as_integer(), Some(25));
    assert_eq!(doc["poll-interval"].as_integer(), Some(10));
    assert_eq!(doc["api-timeout"].as_integer(), Some(1000));
    assert!(doc.get(&ConfigKey::ConfigFile.to_string()).is_none());
}

#[tokio::test]
async fn it_loads_config_from_file() -> Result<()> {
    let matches = cli::build().try_get_matches_from(vec!["serve", "-c", "./config.example.toml"])?;
    Config::load(cli::build(), vec![&matches]).await?;
    return Ok(());
}

#[tokio::test]
async fn it_fails_to_loads_config_from_file() -> Result<()> {
    let matches =
        cli::build().try_get_matches_from(vec!["serve", "-c", "./test/bad-config.toml"])?;
    let res = Config::load(cli::build(), vec![&matches]).await;
    assert!(res.is_err());
    return Ok(());
}
