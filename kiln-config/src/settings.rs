// Typed configuration sections

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerSection,
    pub limits: LimitsSection,
    pub cache: CacheSection,
    pub router: RouterSection,
    pub tls: TlsSection,
    pub files: FilesSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
    /// Pool size; the ceiling on requests mid-pipeline
    pub workers: usize,
    /// Admitted-but-waiting connections per worker
    pub queue_factor: usize,
    pub debug: bool,
    pub gzip: bool,
    pub content_md5: bool,
    pub shutdown_grace_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 80,
            workers: 1,
            queue_factor: 4,
            debug: false,
            gzip: true,
            content_md5: true,
            shutdown_grace_secs: 10,
        }
    }
}

impl ServerSection {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Parse-time limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsSection {
    /// Maximum head lines, request line included
    pub request_lines: usize,
    /// Maximum bytes in a single head line
    pub request_line_size: usize,
    /// Bodies at or above this many bytes are rejected
    pub body_size: usize,
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            request_lines: 100,
            request_line_size: 8190,
            body_size: 8190,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub ttl_secs: u64,
    pub max_entries: usize,
}

impl CacheSettings {
    pub fn new(ttl_secs: u64, max_entries: usize) -> Self {
        Self { ttl_secs, max_entries }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self::new(3600, 1000)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub enabled: bool,
    pub responses: CacheSettings,
    pub files: CacheSettings,
    pub fragments: CacheSettings,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: true,
            responses: CacheSettings::new(3600, 1000),
            files: CacheSettings::new(86_400, 1000),
            fragments: CacheSettings::new(3600, 1000),
        }
    }
}

/// Self-tuning sort schedule. An interval of zero disables sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterSection {
    pub sort_interval_secs: u64,
    pub sort_initial_delay_secs: u64,
}

impl Default for RouterSection {
    fn default() -> Self {
        Self {
            sort_interval_secs: 0,
            sort_initial_delay_secs: 30,
        }
    }
}

impl RouterSection {
    pub fn sort_interval(&self) -> Option<Duration> {
        (self.sort_interval_secs > 0).then(|| Duration::from_secs(self.sort_interval_secs))
    }

    pub fn sort_initial_delay(&self) -> Duration {
        Duration::from_secs(self.sort_initial_delay_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsSection {
    pub enabled: bool,
    pub port: u16,
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
}

impl Default for TlsSection {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 443,
            cert_path: None,
            key_path: None,
        }
    }
}

/// Static file serving.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesSection {
    /// Folder under the base directory that is served
    pub folder: String,
}

impl Default for FilesSection {
    fn default() -> Self {
        Self {
            folder: "public".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.server.port, 80);
        assert_eq!(config.server.workers, 1);
        assert!(config.server.gzip);
        assert!(config.server.content_md5);
        assert_eq!(config.limits.request_lines, 100);
        assert_eq!(config.limits.request_line_size, 8190);
        assert_eq!(config.cache.files.ttl_secs, 86_400);
        assert_eq!(config.tls.port, 443);
        assert!(config.router.sort_interval().is_none());
    }

    #[test]
    fn test_sort_interval() {
        let router = RouterSection {
            sort_interval_secs: 5,
            ..RouterSection::default()
        };
        assert_eq!(router.sort_interval(), Some(Duration::from_secs(5)));
    }
}
