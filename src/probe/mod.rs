//! Endpoint probes and the per-target probe pipeline

pub mod pipeline;
pub mod ping;
pub mod speed;

pub use pipeline::{describe_target, ProbePipeline, TargetDescription};
pub use ping::TcpPingProbe;
pub use speed::HttpSpeedProbe;

use crate::error::ProbeError;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;

/// Result of a single probe call
pub type ProbeOutcome<T> = std::result::Result<T, ProbeError>;

/// Measures round-trip latency to an endpoint
#[async_trait]
pub trait PingProbe: Send + Sync {
    /// Latency in milliseconds; values below one mean unreachable
    async fn ping(&self, uri: &str, deadline: Duration) -> ProbeOutcome<i64>;
}

/// Streams a download through an endpoint and reports throughput
#[async_trait]
pub trait SpeedProbe: Send + Sync {
    /// Push one instantaneous bytes/s sample per interval into `samples`
    /// and return the total number of bytes received.
    ///
    /// A negative sample tells the consumer the transfer broke off.
    /// Dropping `samples` ends the stream.
    async fn measure(
        &self,
        uri: &str,
        connect_timeout: Duration,
        total_timeout: Duration,
        samples: mpsc::Sender<i64>,
    ) -> ProbeOutcome<i64>;
}
