use std::io::Write;

use pretty_assertions::assert_eq;
use serial_test::serial;
use successfuel_core::config::{AppConfig, ConfigError, ConfigLoader};
use successfuel_core::retry::BackoffPolicy;
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> anyhow::Result<NamedTempFile> {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
    file.write_all(contents.as_bytes())?;
    Ok(file)
}

#[test]
#[serial]
fn file_overrides_defaults_and_env_overrides_file() -> anyhow::Result<()> {
    let file = write_config(
        r#"
[api]
root_url = "http://localhost:8080"
health_path = "/health"

[connectivity]
retry_base_delay_ms = 250
max_retries = 4
"#,
    )?;

    // SAFETY: tests touching the environment are serialized.
    unsafe { std::env::set_var("SUCCESSFUEL_CONNECTIVITY__MAX_RETRIES", "6") };
    let loaded = ConfigLoader::new().with_file(file.path()).load();
    unsafe { std::env::remove_var("SUCCESSFUEL_CONNECTIVITY__MAX_RETRIES") };
    let config = loaded?;

    assert_eq!(config.api.health_url(), "http://localhost:8080/health");
    assert_eq!(config.connectivity.max_retries, 6);
    assert_eq!(config.connectivity.retry_base_delay_ms, 250);
    assert_eq!(
        config.connectivity.max_retry_delay_ms,
        AppConfig::default().connectivity.max_retry_delay_ms
    );

    let policy = BackoffPolicy::from_config(&config.connectivity);
    assert_eq!(policy.delay(2).as_millis(), 1_000);
    Ok(())
}

#[test]
#[serial]
fn invalid_delays_are_rejected() -> anyhow::Result<()> {
    let file = write_config(
        r#"
[connectivity]
retry_base_delay_ms = 5000
max_retry_delay_ms = 1000
"#,
    )?;

    let result = ConfigLoader::new().with_file(file.path()).load();
    assert!(matches!(result, Err(ConfigError::Invalid { .. })), "{result:?}");
    Ok(())
}
