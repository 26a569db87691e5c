//! Command-line interface

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Proxy Speed Tester - concurrent ping and throughput benchmarking of proxy profiles
#[derive(Parser, Debug, Clone)]
#[command(name = "pst")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Force colored output
    #[arg(long, global = true)]
    pub color: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Enable verbose output
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Enable debug output
    #[arg(long, global = true)]
    pub debug: bool,

    /// Directory for temporary report artifacts
    #[arg(long, global = true, value_name = "DIR")]
    pub artifact_dir: Option<PathBuf>,

    /// Resource downloaded through each endpoint during the speed stage
    #[arg(long, global = true, value_name = "URL")]
    pub download_url: Option<String>,

    /// Ping stage deadline in seconds
    #[arg(long, global = true, value_parser = parse_seconds, value_name = "SECONDS")]
    pub ping_deadline: Option<u64>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Accept WebSocket connections, one test session per connection
    Serve {
        /// Listen address, e.g. 127.0.0.1:10888
        #[arg(short, long, value_name = "ADDR")]
        listen: Option<String>,
    },
    /// Run a single request and print events as JSON lines on stdout
    Run {
        /// Request file, or `-` for stdin
        #[arg(short, long, default_value = "-", value_name = "FILE")]
        request: String,
    },
}

impl Cli {
    /// Validate CLI arguments for conflicts
    pub fn validate(&self) -> Result<(), String> {
        if self.color && self.no_color {
            return Err("Cannot specify both --color and --no-color".to_string());
        }

        if let Some(ref url) = self.download_url {
            if url::Url::parse(url).is_err() {
                return Err(format!("Invalid download URL: {}", url));
            }
        }

        if let Command::Run { request } = &self.command {
            if request.trim().is_empty() {
                return Err("--request cannot be empty".to_string());
            }
        }

        Ok(())
    }

    /// Check if colors should be enabled
    pub fn use_colors(&self) -> bool {
        if self.color {
            true
        } else if self.no_color {
            false
        } else {
            supports_color()
        }
    }

    /// Whether events go to stdout, which must stay machine-readable
    pub fn is_run_mode(&self) -> bool {
        matches!(self.command, Command::Run { .. })
    }

    /// Get configuration summary for display
    pub fn get_config_summary(&self) -> String {
        let mut summary = String::new();

        summary.push_str("Configuration Summary:\n");
        match &self.command {
            Command::Serve { listen } => {
                summary.push_str("  Mode: serve\n");
                if let Some(listen) = listen {
                    summary.push_str(&format!("  Listen: {}\n", listen));
                }
            }
            Command::Run { request } => {
                summary.push_str("  Mode: run\n");
                summary.push_str(&format!("  Request: {}\n", request));
            }
        }
        summary.push_str(&format!("  Colored output: {}\n", self.use_colors()));
        summary.push_str(&format!("  Verbose mode: {}\n", self.verbose));
        summary.push_str(&format!("  Debug mode: {}\n", self.debug));

        if let Some(ref dir) = self.artifact_dir {
            summary.push_str(&format!("  Artifact dir: {}\n", dir.display()));
        }

        if let Some(ref url) = self.download_url {
            summary.push_str(&format!("  Download URL: {}\n", url));
        }

        summary
    }
}

/// Parse a positive number of seconds
fn parse_seconds(s: &str) -> Result<u64, String> {
    if s.starts_with('+') || s.starts_with("0x") || s.starts_with("0X") {
        return Err(format!("Invalid duration: {}", s));
    }

    s.parse::<u64>()
        .map_err(|_| format!("Invalid duration: {}", s))
        .and_then(|secs| {
            if secs == 0 {
                Err("Duration must be greater than 0".to_string())
            } else if secs > 60 {
                Err("Duration cannot exceed 60 seconds".to_string())
            } else {
                Ok(secs)
            }
        })
}

/// Check if the terminal supports color output
fn supports_color() -> bool {
    if let Ok(term) = std::env::var("TERM") {
        if term == "dumb" {
            return false;
        }
    }

    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }

    if std::env::var("FORCE_COLOR").is_ok() {
        return true;
    }

    #[cfg(target_os = "windows")]
    {
        if std::env::var("ANSICON").is_ok() || std::env::var("ConEmuANSI").is_ok() {
            return true;
        }
    }

    #[cfg(unix)]
    {
        true
    }
    #[cfg(not(unix))]
    {
        false
    }
}
