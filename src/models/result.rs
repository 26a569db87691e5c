//! Probe targets and their results

use serde::{Deserialize, Serialize};

/// One endpoint to test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeTarget {
    /// Index into the requested target sequence; the correlation key
    pub position: usize,
    /// Raw proxy URI
    pub uri: String,
    /// Identity from a previous batch when retesting
    pub remap_id: Option<i64>,
}

impl ProbeTarget {
    pub fn new(position: usize, uri: String, remap_id: Option<i64>) -> Self {
        Self { position, uri, remap_id }
    }

    /// The URI handed to probes, without any `^`-separated suffix
    pub fn probe_uri(&self) -> &str {
        self.uri.split('^').next().unwrap_or(&self.uri)
    }
}

/// Final outcome of one probe pipeline
///
/// Created once by the pipeline and moved into the aggregator; never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    /// Target position
    pub id: usize,
    pub group: String,
    /// Display name derived from the URI
    pub remarks: String,
    /// Protocol tag (vmess, ssr, ss, trojan, ...)
    pub protocol: String,
    /// Latency in milliseconds; zero or negative means unavailable
    pub ping: i64,
    /// Time-weighted average throughput in bytes/s
    pub avg_speed: i64,
    /// Maximum instantaneous throughput in bytes/s
    pub max_speed: i64,
    pub is_ok: bool,
    /// Bytes transferred during the speed stage
    pub traffic: i64,
}

impl ProbeResult {
    /// Result for a pipeline that stopped after the ping stage
    pub fn ping_only(id: usize, group: &str, remarks: &str, protocol: &str, ping: i64) -> Self {
        Self {
            id,
            group: group.to_string(),
            remarks: remarks.to_string(),
            protocol: protocol.to_string(),
            ping,
            avg_speed: 0,
            max_speed: 0,
            is_ok: false,
            traffic: 0,
        }
    }

    pub fn has_ping(&self) -> bool {
        self.ping > 0
    }
}
