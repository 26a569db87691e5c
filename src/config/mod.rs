//! Server configuration: defaults, `.env`, environment and CLI overrides

pub mod env;
pub mod parser;

pub use env::EnvManager;
pub use parser::{display_config_summary, load_config, ConfigParser};

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Process-wide settings shared by every session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the WebSocket server binds to
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Directory where report artifacts are written before encoding
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,

    /// Resource downloaded through each endpoint during the speed stage
    #[serde(default = "default_download_url")]
    pub download_url: String,

    /// Deadline of the ping stage
    #[serde(default = "default_ping_deadline_seconds")]
    pub ping_deadline_seconds: u64,

    /// Font handed to the report renderer
    #[serde(default = "default_font_path")]
    pub font_path: String,

    /// Enable colored terminal output
    #[serde(default = "default_enable_color")]
    pub enable_color: bool,

    /// Enable verbose output
    #[serde(default)]
    pub verbose: bool,

    /// Enable debug output
    #[serde(default)]
    pub debug: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            artifact_dir: default_artifact_dir(),
            download_url: default_download_url(),
            ping_deadline_seconds: default_ping_deadline_seconds(),
            font_path: default_font_path(),
            enable_color: default_enable_color(),
            verbose: false,
            debug: false,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ping deadline as Duration
    pub fn ping_deadline(&self) -> Duration {
        Duration::from_secs(self.ping_deadline_seconds)
    }

    /// Parsed listen address
    pub fn listen_socket_addr(&self) -> Result<SocketAddr> {
        self.listen_addr
            .parse()
            .map_err(|e| AppError::config(format!("Invalid listen address '{}': {}", self.listen_addr, e)))
    }

    /// Validate the configuration and return the first problem found
    pub fn validate(&self) -> Result<()> {
        self.listen_socket_addr()?;

        if self.download_url.is_empty() {
            return Err(AppError::config("Download URL cannot be empty"));
        }

        match url::Url::parse(&self.download_url) {
            Ok(parsed) => {
                if parsed.scheme() != "http" && parsed.scheme() != "https" {
                    return Err(AppError::config(format!(
                        "Download URL must use HTTP or HTTPS: {}",
                        self.download_url
                    )));
                }
            }
            Err(e) => {
                return Err(AppError::config(format!(
                    "Invalid download URL '{}': {}",
                    self.download_url, e
                )));
            }
        }

        if self.ping_deadline_seconds == 0 {
            return Err(AppError::config("Ping deadline must be greater than 0"));
        }

        if self.ping_deadline_seconds > 60 {
            return Err(AppError::config("Ping deadline cannot exceed 60 seconds"));
        }

        if self.artifact_dir.as_os_str().is_empty() {
            return Err(AppError::config("Artifact directory cannot be empty"));
        }

        Ok(())
    }

    /// Merge environment variables into this configuration
    pub fn merge_from_env(&mut self) -> Result<()> {
        if let Ok(listen_addr) = std::env::var("LISTEN_ADDR") {
            self.listen_addr = listen_addr.trim().to_string();
        }

        if let Ok(artifact_dir) = std::env::var("ARTIFACT_DIR") {
            self.artifact_dir = PathBuf::from(artifact_dir.trim());
        }

        if let Ok(download_url) = std::env::var("DOWNLOAD_URL") {
            self.download_url = download_url.trim().to_string();
        }

        if let Ok(deadline) = std::env::var("PING_DEADLINE_SECONDS") {
            self.ping_deadline_seconds = deadline.trim().parse().map_err(|e| {
                AppError::config(format!("Invalid PING_DEADLINE_SECONDS value '{}': {}", deadline, e))
            })?;
        }

        if let Ok(font_path) = std::env::var("FONT_PATH") {
            self.font_path = font_path.trim().to_string();
        }

        if let Ok(enable_color) = std::env::var("ENABLE_COLOR") {
            self.enable_color = enable_color.trim().parse().map_err(|e| {
                AppError::config(format!("Invalid ENABLE_COLOR value '{}': {}", enable_color, e))
            })?;
        }

        Ok(())
    }
}

// Default value functions for serde
fn default_listen_addr() -> String {
    crate::defaults::DEFAULT_LISTEN_ADDR.to_string()
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from(crate::defaults::DEFAULT_ARTIFACT_DIR)
}

fn default_download_url() -> String {
    crate::defaults::DEFAULT_DOWNLOAD_URL.to_string()
}

fn default_ping_deadline_seconds() -> u64 {
    crate::defaults::PING_DEADLINE.as_secs()
}

fn default_font_path() -> String {
    crate::defaults::DEFAULT_FONT_PATH.to_string()
}

fn default_enable_color() -> bool {
    crate::defaults::DEFAULT_ENABLE_COLOR
}
