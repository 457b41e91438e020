//! Application configuration
//!
//! Stored as TOML in the platform config directory. A missing file means
//! defaults; missing keys fall back to their defaults individually.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::dispatch::DispatchDefaults;
use crate::error::{Error, Result};
use crate::protocol::codec::DEFAULT_MAX_CONTENT_LENGTH;
use crate::protocol::FrameLimits;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub session: SessionConfig,
}

/// Listener and connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest accepted payload in bytes
    pub max_content_length: u64,
    /// Largest accepted JSON header in bytes
    pub max_header_len: usize,
    /// Audio worker threads
    pub workers: usize,
    /// Jobs that may wait for a free worker before requests are refused
    pub job_queue_depth: usize,
    /// Close connections that send nothing for this long; 0 disables
    pub idle_timeout_secs: u64,
    /// Bytes read from a socket per readiness notification
    pub read_chunk_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
            max_header_len: DEFAULT_MAX_HEADER_LEN,
            workers: DEFAULT_WORKERS,
            job_queue_depth: DEFAULT_JOB_QUEUE_DEPTH,
            idle_timeout_secs: 0,
            read_chunk_size: DEFAULT_READ_CHUNK,
        }
    }
}

impl ServerConfig {
    pub fn frame_limits(&self) -> FrameLimits {
        FrameLimits {
            max_header_len: self.max_header_len.min(u16::MAX as usize),
            max_content_length: self.max_content_length,
        }
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Session parameters shared with the desktop host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Output device selected at startup
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_device_id: Option<u32>,
    /// Level in dB for play requests that carry none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presentation_level: Option<f64>,
}

impl SessionConfig {
    pub fn dispatch_defaults(&self) -> DispatchDefaults {
        DispatchDefaults {
            device_id: self.audio_device_id,
            level: self.presentation_level,
        }
    }
}

impl AppConfig {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("org", "socket-audio", "socket-audio-host")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from a file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Load from a file, or defaults if it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let config = Self::load(path)?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Write to a file, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.bind_address(), "127.0.0.1:65432");
        assert_eq!(config.server.idle_timeout(), None);
        assert_eq!(config.session.dispatch_defaults(), DispatchDefaults::default());
    }

    #[test]
    fn test_partial_file() {
        let config: AppConfig = toml::from_str(
            r#"
            [server]
            port = 7000
            idle_timeout_secs = 30

            [session]
            audio_device_id = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 7000);
        assert_eq!(config.server.host, DEFAULT_HOST);
        assert_eq!(config.server.idle_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.session.audio_device_id, Some(2));
        assert_eq!(config.session.presentation_level, None);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.server.workers = 4;
        config.session.presentation_level = Some(-25.5);
        config.save(&path).unwrap();

        assert_eq!(AppConfig::load_or_default(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_file_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\nport = \"lots\"\n").unwrap();
        assert!(matches!(AppConfig::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_frame_limits_capped() {
        let server = ServerConfig {
            max_header_len: 1 << 20,
            ..ServerConfig::default()
        };
        assert_eq!(server.frame_limits().max_header_len, u16::MAX as usize);
    }
}
