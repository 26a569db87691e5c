//! Proxy Speed Tester
//!
//! A concurrent benchmarking engine for proxy endpoints. A batch of
//! profiles (vmess, ssr, ss, trojan, ...) is pinged and speed-tested under
//! a bounded worker pool while progress events stream to the connected
//! client, followed by one aggregated report.

pub mod app;
pub mod cli;
pub mod config;
pub mod decode;
pub mod error;
pub mod executor;
pub mod links;
pub mod logging;
pub mod models;
pub mod notifier;
pub mod output;
pub mod probe;
pub mod session;
pub mod stats;
pub mod types;

// Re-export commonly used types
pub use config::ServerConfig;
pub use error::{AppError, ProbeError, Result};
pub use executor::{aggregator::ResultAggregator, ScheduleOutcome, Scheduler, SchedulerStats};
pub use links::{LinkResolver, SubscriptionResolver};
pub use models::{ProbeResult, ProbeTarget, ProgressEvent, TestConfiguration};
pub use notifier::{EventSink, ProgressNotifier};
pub use output::{ReportBuilder, ReportRenderer, TextTableRenderer};
pub use probe::{HttpSpeedProbe, PingProbe, SpeedProbe, TcpPingProbe};
pub use session::{Collaborators, Session, SessionOutcome};
pub use stats::{BatchSummary, SpeedAccumulator};

/// Application version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Build metadata set by the build script
pub const BUILD_TIME: &str = env!("BUILD_TIME");
pub const TARGET_TRIPLE: &str = env!("TARGET_TRIPLE");
pub const GIT_COMMIT: Option<&str> = option_env!("GIT_COMMIT");

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    /// Group name used when the request leaves it empty
    pub const DEFAULT_GROUP_NAME: &str = "Default";
    /// Placeholder some clients send for an empty group
    pub const EMPTY_GROUP_SENTINEL: &str = "?empty?";

    pub const FRESH_MIN_TIMEOUT: Duration = Duration::from_secs(8);
    pub const LEGACY_MIN_TIMEOUT: Duration = Duration::from_secs(20);
    pub const RETEST_MIN_TIMEOUT: Duration = Duration::from_secs(20);
    /// Longest speed stage a request may ask for
    pub const MAX_TIMEOUT: Duration = Duration::from_secs(3600);

    /// Upper bound on pipelines running at once in one session
    pub const MAX_CONCURRENCY: usize = 1024;

    /// Fixed deadline of the ping stage
    pub const PING_DEADLINE: Duration = Duration::from_secs(2);
    pub const SUBSCRIPTION_FETCH_TIMEOUT: Duration = Duration::from_secs(20);

    /// Interval between two throughput samples
    pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);
    pub const SAMPLE_CHANNEL_CAPACITY: usize = 16;

    pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:10888";
    pub const DEFAULT_ARTIFACT_DIR: &str = "./artifacts";
    pub const DEFAULT_DOWNLOAD_URL: &str = "https://speed.cloudflare.com/__down?bytes=104857600";

    pub const DEFAULT_FONT_PATH: &str = "./web/misc/WenQuanYiMicroHei-01.ttf";
    pub const DEFAULT_FONT_SIZE: u32 = 24;
    pub const DEFAULT_LANGUAGE: &str = "en";

    pub const REPORT_HORIZONTAL_PADDING: u32 = 40;
    pub const REPORT_VERTICAL_PADDING: u32 = 30;

    pub const DEFAULT_ENABLE_COLOR: bool = true;
}
