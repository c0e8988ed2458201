// Configuration validation

use crate::{ConfigError, Result, ServerConfig};

/// Trait for validating configuration
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}

impl Validate for ServerConfig {
    fn validate(&self) -> Result<()> {
        if self.server.workers == 0 {
            return Err(invalid("server.workers must be at least 1"));
        }
        if self.server.queue_factor == 0 {
            return Err(invalid("server.queue_factor must be at least 1"));
        }
        if self.limits.request_lines == 0 {
            return Err(invalid("limits.request_lines must be at least 1"));
        }
        if self.limits.request_line_size == 0 {
            return Err(invalid("limits.request_line_size must be at least 1"));
        }

        for (name, settings) in [
            ("responses", &self.cache.responses),
            ("files", &self.cache.files),
            ("fragments", &self.cache.fragments),
        ] {
            if settings.max_entries == 0 {
                return Err(invalid(format!("cache.{name}.max_entries must be at least 1")));
            }
        }

        if self.tls.enabled {
            if self.tls.cert_path.is_none() || self.tls.key_path.is_none() {
                return Err(invalid("tls.cert_path and tls.key_path are required when tls is enabled"));
            }
            if self.tls.port == self.server.port {
                return Err(invalid("tls.port must differ from server.port"));
            }
        }

        if self.files.folder.trim().is_empty() {
            return Err(invalid("files.folder cannot be empty"));
        }
        Ok(())
    }
}
