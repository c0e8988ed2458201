// KILN_* environment overrides

use crate::{ConfigError, Result, ServerConfig};
use std::collections::HashMap;
use std::str::FromStr;

const PREFIX: &str = "KILN_";

/// Overrides collected from `KILN_*` variables.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    vars: HashMap<String, String>,
}

impl EnvOverrides {
    /// Read the process environment, after loading a `.env` file if present.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_vars(std::env::vars())
    }

    /// Collect overrides from explicit pairs; keys without the prefix are ignored.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = vars
            .into_iter()
            .filter_map(|(key, value)| {
                let key = key.into();
                key.strip_prefix(PREFIX)
                    .map(|name| (name.to_lowercase(), value.into()))
            })
            .collect();
        Self { vars }
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Write recognized overrides into `config`.
    pub fn apply(&self, config: &mut ServerConfig) -> Result<()> {
        if let Some(host) = self.vars.get("host") {
            config.server.host = host.clone();
        }
        if let Some(port) = self.parsed("port")? {
            config.server.port = port;
        }
        if let Some(workers) = self.parsed("workers")? {
            config.server.workers = workers;
        }
        if let Some(debug) = self.flag("debug")? {
            config.server.debug = debug;
        }
        if let Some(gzip) = self.flag("gzip")? {
            config.server.gzip = gzip;
        }
        if let Some(enabled) = self.flag("cache")? {
            config.cache.enabled = enabled;
        }
        Ok(())
    }

    fn parsed<T: FromStr>(&self, name: &str) -> Result<Option<T>> {
        match self.vars.get(name) {
            None => Ok(None),
            Some(raw) => raw.trim().parse().map(Some).map_err(|_| ConfigError::InvalidOverride {
                key: format!("{PREFIX}{}", name.to_uppercase()),
                value: raw.clone(),
            }),
        }
    }

    fn flag(&self, name: &str) -> Result<Option<bool>> {
        match self.vars.get(name).map(|v| v.trim().to_lowercase()) {
            None => Ok(None),
            Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(Some(true)),
            Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(Some(false)),
            Some(v) => Err(ConfigError::InvalidOverride {
                key: format!("{PREFIX}{}", name.to_uppercase()),
                value: v,
            }),
        }
    }
}
