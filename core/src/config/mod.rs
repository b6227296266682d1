/// Layered client configuration.
///
/// Sources, lowest precedence first:
/// 1. Defaults (from code)
/// 2. Config file (`--config` or `<config_dir>/successfuel/config.toml`)
/// 3. Environment variables (`SUCCESSFUEL_*`, `__` between section and key)
///
/// ```no_run
/// use successfuel_core::config::ConfigLoader;
///
/// let config = ConfigLoader::load_default()?;
/// let tuned = ConfigLoader::new().with_file("./successfuel.toml").load()?;
/// # Ok::<(), successfuel_core::config::ConfigError>(())
/// ```
pub mod error;
pub mod loader;

pub use error::{ConfigError, Result};
pub use loader::{ApiConfig, AppConfig, AuthConfig, ConfigLoader, ConnectivityConfig};
