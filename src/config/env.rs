//! Environment variable handling and .env file management

use crate::error::{AppError, Result};
use std::path::Path;

/// Environment variable configuration manager
pub struct EnvManager;

impl EnvManager {
    /// Load .env file if it exists
    pub fn load_env_file(debug: bool) -> Result<()> {
        if Path::new(".env").exists() {
            dotenv::from_filename(".env")
                .map_err(|e| AppError::config(format!("Failed to load .env file: {}", e)))?;

            if debug {
                eprintln!("Loaded configuration from .env file");
            }
        } else if debug {
            eprintln!("No .env file found, using defaults and CLI arguments");
        }

        Ok(())
    }

    /// Create example .env file content
    pub fn create_example_env_content() -> String {
        r#"# Proxy Speed Tester Configuration
#
# Values here act as defaults and are overridden by command-line arguments.

# Address the WebSocket server listens on
# LISTEN_ADDR=127.0.0.1:10888

# Directory for temporary report artifacts
# ARTIFACT_DIR=./artifacts

# Resource downloaded through every endpoint during the speed stage
# DOWNLOAD_URL=https://speed.cloudflare.com/__down?bytes=104857600

# Deadline of the ping stage in seconds
# PING_DEADLINE_SECONDS=2

# Font used by the report renderer
# FONT_PATH=./web/misc/WenQuanYiMicroHei-01.ttf

# Enable colored output (true/false)
# ENABLE_COLOR=true
"#
        .to_string()
    }

    /// Save example .env file to disk
    pub fn save_example_env_file(path: &Path) -> Result<()> {
        let content = Self::create_example_env_content();
        std::fs::write(path, content)
            .map_err(|e| AppError::config(format!("Failed to write example .env file: {}", e)))?;

        Ok(())
    }

    /// Validate environment variable format before parsing
    pub fn validate_env_var(key: &str, value: &str) -> Result<()> {
        match key {
            "LISTEN_ADDR" => {
                value
                    .trim()
                    .parse::<std::net::SocketAddr>()
                    .map_err(|e| AppError::config(format!("Invalid LISTEN_ADDR value '{}': {}", value, e)))?;
            }
            "DOWNLOAD_URL" => {
                let parsed = url::Url::parse(value.trim())
                    .map_err(|e| AppError::config(format!("Invalid DOWNLOAD_URL value '{}': {}", value, e)))?;
                if parsed.scheme() != "http" && parsed.scheme() != "https" {
                    return Err(AppError::config(format!("DOWNLOAD_URL must use HTTP or HTTPS: {}", value)));
                }
            }
            "PING_DEADLINE_SECONDS" => {
                let seconds: u64 = value.trim().parse().map_err(|e| {
                    AppError::config(format!("Invalid PING_DEADLINE_SECONDS value '{}': {}", value, e))
                })?;
                if seconds == 0 || seconds > 60 {
                    return Err(AppError::config(format!(
                        "PING_DEADLINE_SECONDS must be between 1 and 60, got: {}",
                        seconds
                    )));
                }
            }
            "ARTIFACT_DIR" | "FONT_PATH" => {
                if value.trim().is_empty() {
                    return Err(AppError::config(format!("{} cannot be empty", key)));
                }
            }
            "ENABLE_COLOR" => {
                value
                    .trim()
                    .parse::<bool>()
                    .map_err(|e| AppError::config(format!("Invalid ENABLE_COLOR value '{}': {}", value, e)))?;
            }
            _ => {}
        }

        Ok(())
    }

    /// All supported environment variables with descriptions and examples
    pub fn get_supported_env_vars() -> Vec<(&'static str, &'static str, &'static str)> {
        vec![
            ("LISTEN_ADDR", "WebSocket listen address", "127.0.0.1:10888"),
            ("ARTIFACT_DIR", "Directory for temporary report artifacts", "./artifacts"),
            ("DOWNLOAD_URL", "Resource downloaded during the speed stage", "https://speed.cloudflare.com/__down?bytes=104857600"),
            ("PING_DEADLINE_SECONDS", "Ping stage deadline in seconds (1-60)", "2"),
            ("FONT_PATH", "Font used by the report renderer", "./web/misc/WenQuanYiMicroHei-01.ttf"),
            ("ENABLE_COLOR", "Enable colored output", "true"),
        ]
    }

    /// Display environment variable help
    pub fn display_env_help() -> String {
        let mut help = String::new();
        help.push_str("Supported Environment Variables:\n\n");

        for (var, description, example) in Self::get_supported_env_vars() {
            help.push_str(&format!("  {:<22} {}\n", var, description));
            help.push_str(&format!("  {:<22} Example: {}\n\n", "", example));
        }

        help.push_str("Configuration Priority (highest to lowest):\n");
        help.push_str("  1. Command-line arguments\n");
        help.push_str("  2. Environment variables\n");
        help.push_str("  3. .env file values\n");
        help.push_str("  4. Default values\n");

        help
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_example_content_lists_every_variable() {
        let content = EnvManager::create_example_env_content();
        for (var, _, _) in EnvManager::get_supported_env_vars() {
            assert!(content.contains(&format!("{}=", var)), "missing {}", var);
        }
    }

    #[test]
    fn test_save_example_file() {
        let temp_file = NamedTempFile::new().unwrap();
        EnvManager::save_example_env_file(temp_file.path()).unwrap();

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert!(content.contains("Proxy Speed Tester Configuration"));
    }

    #[test]
    fn test_validate_env_var() {
        assert!(EnvManager::validate_env_var("LISTEN_ADDR", "0.0.0.0:8080").is_ok());
        assert!(EnvManager::validate_env_var("DOWNLOAD_URL", "https://example.com/100mb").is_ok());
        assert!(EnvManager::validate_env_var("PING_DEADLINE_SECONDS", "3").is_ok());
        assert!(EnvManager::validate_env_var("ARTIFACT_DIR", "/tmp/reports").is_ok());
        assert!(EnvManager::validate_env_var("ENABLE_COLOR", "false").is_ok());

        assert!(EnvManager::validate_env_var("LISTEN_ADDR", "localhost").is_err());
        assert!(EnvManager::validate_env_var("DOWNLOAD_URL", "ftp://example.com/f").is_err());
        assert!(EnvManager::validate_env_var("PING_DEADLINE_SECONDS", "0").is_err());
        assert!(EnvManager::validate_env_var("PING_DEADLINE_SECONDS", "61").is_err());
        assert!(EnvManager::validate_env_var("ARTIFACT_DIR", "  ").is_err());
        assert!(EnvManager::validate_env_var("ENABLE_COLOR", "maybe").is_err());
        assert!(EnvManager::validate_env_var("UNRELATED", "anything").is_ok());
    }

    #[test]
    fn test_display_env_help() {
        let help = EnvManager::display_env_help();
        assert!(help.contains("Supported Environment Variables:"));
        assert!(help.contains("DOWNLOAD_URL"));
        assert!(help.contains("Configuration Priority"));
    }
}
