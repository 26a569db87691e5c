//! TCP connect latency probe

use crate::{
    links::parse_profile,
    probe::{PingProbe, ProbeOutcome},
};
use crate::error::ProbeError;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;

/// Measures the time to open a TCP connection to the profile's server
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpPingProbe;

impl TcpPingProbe {
    pub fn new() -> Self {
        Self
    }

    /// Connect to `address` and return the elapsed milliseconds
    pub async fn connect_latency(address: &str, deadline: Duration) -> ProbeOutcome<i64> {
        let start = Instant::now();

        match tokio::time::timeout(deadline, TcpStream::connect(address)).await {
            Ok(Ok(_stream)) => {
                // A loopback connect can finish within the same millisecond
                Ok((start.elapsed().as_millis() as i64).max(1))
            }
            Ok(Err(e)) => Err(ProbeError::Unreachable(format!("{}: {}", address, e))),
            Err(_) => Err(ProbeError::Timeout(deadline.as_secs())),
        }
    }
}

#[async_trait]
impl PingProbe for TcpPingProbe {
    async fn ping(&self, uri: &str, deadline: Duration) -> ProbeOutcome<i64> {
        let profile = parse_profile(uri)?;
        Self::connect_latency(&profile.address(), deadline).await
    }
}
