//! Proxy Speed Tester - Main CLI Application
//!
//! Serves test sessions over WebSocket or runs a single request, streaming
//! progress events as JSON.

use clap::Parser;
use proxy_speedtest::{
    app::App,
    cli::Cli,
    error::{ErrorReporter, Result},
};
use std::process;

#[tokio::main]
async fn main() {
    // Set up better panic handling
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panic: {}", panic_info);
        process::exit(1);
    }));

    // Parse command line arguments
    let cli = Cli::parse();
    let reporter = ErrorReporter::new(cli.use_colors(), cli.verbose);

    if let Err(e) = run_application(cli).await {
        reporter.report_error(&e);
        process::exit(e.exit_code());
    }
}

/// Main application logic
async fn run_application(cli: Cli) -> Result<()> {
    App::new(cli)?.run().await
}
