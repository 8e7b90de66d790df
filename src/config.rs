//! Configuration file handling for booth-cam.
//!
//! Loads configuration from `~/.config/booth-cam/config.toml` or a custom path.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::camera::{
    CameraKind, CaptureCommand, ProcessSettings, Resolution, StillCommand, DEFAULT_MAX_BUFFER,
};
use crate::session::{SessionSettings, SystemSources};

/// Configuration file structure for booth-cam.
/// Loaded from ~/.config/booth-cam/config.toml (or custom path via --config).
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub still: StillConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CameraConfig {
    pub kind: CameraKind,
    /// Device index for the device-backed kind
    pub device_index: u32,
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
    /// Capture program for the process-backed kind
    pub program: String,
    /// Appended after the fixed argument set
    pub extra_args: Vec<String>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            kind: CameraKind::Process,
            device_index: 0,
            width: Resolution::LIVE.width,
            height: Resolution::LIVE.height,
            framerate: 15,
            program: "rpicam-vid".to_string(),
            extra_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StillConfig {
    pub enabled: bool,
    pub program: String,
    pub width: u32,
    pub height: u32,
    pub timeout_secs: u64,
    pub warmup_ms: u64,
}

impl Default for StillConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: "rpicam-still".to_string(),
            width: Resolution::STILL.width,
            height: Resolution::STILL.height,
            timeout_secs: crate::camera::DEFAULT_STILL_TIMEOUT.as_secs(),
            warmup_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StreamConfig {
    pub read_chunk_size: usize,
    pub queue_depth: usize,
    pub stop_timeout_ms: u64,
    pub device_backoff_ms: u64,
    /// Demux buffer bound; 0 disables it
    pub max_buffer_bytes: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: crate::camera::DEFAULT_CHUNK_SIZE,
            queue_depth: crate::session::DEFAULT_QUEUE_DEPTH,
            stop_timeout_ms: crate::camera::DEFAULT_STOP_TIMEOUT.as_millis() as u64,
            device_backoff_ms: crate::camera::DEFAULT_POLL_BACKOFF.as_millis() as u64,
            max_buffer_bytes: DEFAULT_MAX_BUFFER,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub photos_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            photos_dir: PathBuf::from("photos"),
        }
    }
}

impl Config {
    /// Load configuration from a file path.
    /// Returns default config if the file doesn't exist.
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(PathBuf::from).unwrap_or_else(default_path);

        if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::IoError {
                path: path.clone(),
                source: e,
            })?;
            let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.clone(),
                source: e,
            })?;
            log::debug!("Loaded config from {}", path.display());
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Render as TOML, for `config show` and `config init`.
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Source factory settings derived from `[camera]` and `[stream]`.
    pub fn sources(&self) -> SystemSources {
        let resolution = Resolution {
            width: self.camera.width,
            height: self.camera.height,
        };
        let mut command =
            CaptureCommand::mjpeg_stdout(&self.camera.program, resolution, self.camera.framerate);
        command.args.extend(self.camera.extra_args.iter().cloned());

        SystemSources {
            process: ProcessSettings {
                command,
                chunk_size: self.stream.read_chunk_size.max(1),
                stop_timeout: Duration::from_millis(self.stream.stop_timeout_ms),
                max_buffer: self.stream.max_buffer_bytes,
            },
            device_index: self.camera.device_index,
            device_backoff: Duration::from_millis(self.stream.device_backoff_ms),
            device_resolution: resolution,
            device_framerate: self.camera.framerate,
        }
    }

    /// Session manager settings derived from `[camera]`, `[still]` and `[stream]`.
    pub fn session(&self) -> SessionSettings {
        let still = self.still.enabled.then(|| {
            let mut command = StillCommand::rpicam_still(
                Resolution {
                    width: self.still.width,
                    height: self.still.height,
                },
                self.still.warmup_ms,
                Duration::from_secs(self.still.timeout_secs),
            );
            command.program = self.still.program.clone();
            command
        });

        SessionSettings {
            default_kind: self.camera.kind,
            queue_depth: self.stream.queue_depth.max(1),
            still,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", .path.display())]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{}': {source}", .path.display())]
    ParseError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Get the default config file path.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("booth-cam").join("config.toml"))
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config/booth-cam/config.toml")
        })
}
