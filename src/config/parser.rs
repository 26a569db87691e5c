//! Configuration parsing from CLI arguments and environment variables

use crate::{
    cli::{Cli, Command},
    config::{env::EnvManager, ServerConfig},
    error::Result,
};

/// Combines defaults, `.env`, environment variables and CLI arguments
pub struct ConfigParser {
    cli: Cli,
}

impl ConfigParser {
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Parse and build the complete configuration
    pub fn parse(&self) -> Result<ServerConfig> {
        let mut config = ServerConfig::default();

        EnvManager::load_env_file(self.cli.debug)?;

        config.merge_from_env()?;

        self.apply_cli_overrides(&mut config);

        config.validate()?;

        Ok(config)
    }

    /// Apply CLI argument overrides to configuration
    fn apply_cli_overrides(&self, config: &mut ServerConfig) {
        if let Command::Serve { listen: Some(ref listen) } = self.cli.command {
            config.listen_addr = listen.clone();
        }

        if let Some(ref dir) = self.cli.artifact_dir {
            config.artifact_dir = dir.clone();
        }

        if let Some(ref url) = self.cli.download_url {
            config.download_url = url.clone();
        }

        if let Some(seconds) = self.cli.ping_deadline {
            config.ping_deadline_seconds = seconds;
        }

        if self.cli.no_color {
            config.enable_color = false;
        } else if self.cli.color {
            config.enable_color = true;
        }

        // CLI-only flags
        config.verbose = self.cli.verbose;
        config.debug = self.cli.debug;

        if config.debug {
            eprintln!("Applied CLI overrides to configuration");
            eprintln!("{}", display_config_summary(config));
        }
    }
}

/// Load the complete configuration from CLI arguments
pub fn load_config(cli: Cli) -> Result<ServerConfig> {
    ConfigParser::new(cli).parse()
}

/// Configuration summary for debug output
pub fn display_config_summary(config: &ServerConfig) -> String {
    let mut summary = Vec::new();

    summary.push(format!("Listen Address: {}", config.listen_addr));
    summary.push(format!("Artifact Dir: {}", config.artifact_dir.display()));
    summary.push(format!("Download URL: {}", config.download_url));
    summary.push(format!("Ping Deadline: {}s", config.ping_deadline_seconds));
    summary.push(format!("Font Path: {}", config.font_path));
    summary.push(format!("Color Output: {}", config.enable_color));
    summary.push(format!("Verbose: {}", config.verbose));
    summary.push(format!("Debug: {}", config.debug));

    summary.join("\n")
}
