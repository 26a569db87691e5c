//! Normalized test request shared by every task of a session

use crate::{
    defaults,
    models::result::ProbeTarget,
    types::{SpeedTestMode, TestMode},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Validated configuration for one test session
///
/// Built once by the decoder and shared read-only (behind an `Arc`)
/// by the scheduler and every probe pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestConfiguration {
    /// Group label attached to every result
    pub group_name: String,

    /// Which probe stages run
    pub speed_test_mode: SpeedTestMode,

    /// Raw speed test mode as sent by the client
    pub speed_test_mode_raw: String,

    /// Opaque ping method hint
    pub ping_method: String,

    /// Opaque sort method hint
    pub sort_method: String,

    /// Maximum number of simultaneously running pipelines
    pub concurrency: usize,

    /// How the targets were produced
    pub mode: TestMode,

    /// Connect and total timeout of the speed stage
    pub timeout: Duration,

    /// Ordered endpoint URIs
    pub targets: Vec<String>,

    /// Display identities from a previous batch (retest only)
    pub remap_ids: Option<Vec<i64>>,

    /// Render hint: table language
    pub language: String,

    /// Render hint: font size
    pub font_size: u32,
}

impl Default for TestConfiguration {
    fn default() -> Self {
        Self {
            group_name: defaults::DEFAULT_GROUP_NAME.to_string(),
            speed_test_mode: SpeedTestMode::Normal,
            speed_test_mode_raw: String::new(),
            ping_method: String::new(),
            sort_method: String::new(),
            concurrency: 1,
            mode: TestMode::Fresh,
            timeout: defaults::FRESH_MIN_TIMEOUT,
            targets: Vec::new(),
            remap_ids: None,
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            font_size: defaults::DEFAULT_FONT_SIZE,
        }
    }
}

impl TestConfiguration {
    /// Replace an empty or sentinel group name with the default
    pub fn normalize_group(name: &str) -> String {
        if name.is_empty() || name == defaults::EMPTY_GROUP_SENTINEL {
            defaults::DEFAULT_GROUP_NAME.to_string()
        } else {
            name.to_string()
        }
    }

    /// Concurrency values below one run sequentially; large values are
    /// capped at [`defaults::MAX_CONCURRENCY`]
    pub fn clamp_concurrency(value: i64) -> usize {
        value.clamp(1, defaults::MAX_CONCURRENCY as i64) as usize
    }

    /// Apply the mode-specific timeout floor and the global ceiling to a
    /// value in seconds
    pub fn clamp_timeout(seconds: i64, minimum: Duration) -> Duration {
        let ceiling = defaults::MAX_TIMEOUT.as_secs() as i64;
        let requested = Duration::from_secs(seconds.clamp(0, ceiling) as u64);
        requested.max(minimum)
    }

    /// Number of targets in the batch
    pub fn batch_size(&self) -> usize {
        self.targets.len()
    }

    /// Build the immutable per-target identities, in request order
    pub fn probe_targets(&self) -> Vec<ProbeTarget> {
        self.targets
            .iter()
            .enumerate()
            .map(|(position, uri)| {
                let remap_id = self
                    .remap_ids
                    .as_ref()
                    .and_then(|ids| ids.get(position).copied());
                ProbeTarget::new(position, uri.clone(), remap_id)
            })
            .collect()
    }
}
