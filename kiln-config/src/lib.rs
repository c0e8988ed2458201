// Startup configuration for the Kiln server
//
// Values are read once, before the engine starts: defaults, then an optional
// TOML or JSON file, then KILN_* environment overrides, then validation.

pub mod env;
pub mod error;
pub mod loader;
pub mod settings;
pub mod validation;

pub use env::EnvOverrides;
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};
pub use settings::{
    CacheSection, CacheSettings, FilesSection, LimitsSection, RouterSection, ServerConfig,
    ServerSection, TlsSection,
};
pub use validation::Validate;

use std::path::Path;

/// Load a config file (format from its extension), apply environment
/// overrides, and validate the result.
pub fn load(path: impl AsRef<Path>) -> Result<ServerConfig> {
    let path = path.as_ref();
    let mut config = ConfigLoader::auto(path)?.load_file(path)?;
    EnvOverrides::from_env().apply(&mut config)?;
    config.validate()?;
    Ok(config)
}

/// Defaults plus environment overrides, validated.
pub fn from_env() -> Result<ServerConfig> {
    let mut config = ServerConfig::default();
    EnvOverrides::from_env().apply(&mut config)?;
    config.validate()?;
    Ok(config)
}
