//! Throughput accumulation and batch summary figures

use crate::models::ProbeResult;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Smallest elapsed time used as a divisor, so a sample arriving at the
/// very start of a stage cannot divide by zero
const MIN_ELAPSED: Duration = Duration::from_millis(1);

/// Running throughput state of one speed stage
///
/// Owned by exactly one sampling loop; never shared across targets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpeedAccumulator {
    /// Bytes received so far
    sum: i64,
    /// Time-weighted average in bytes/s
    avg: i64,
    /// Largest instantaneous sample in bytes/s
    max: i64,
    /// Number of samples recorded
    samples: u64,
}

/// Values reported after every sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeedSnapshot {
    pub avg: i64,
    pub max: i64,
    pub instant: i64,
}

impl SpeedAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one instantaneous byte-rate sample observed `elapsed`
    /// after the stage started.
    ///
    /// The average is the total divided by wall-clock seconds (at
    /// millisecond resolution), not the mean over sample count.
    pub fn record(&mut self, sample: i64, elapsed: Duration) -> SpeedSnapshot {
        self.sum += sample;
        self.samples += 1;

        let millis = elapsed.max(MIN_ELAPSED).as_millis() as f64;
        let seconds = millis / 1000.0;
        self.avg = (self.sum as f64 / seconds) as i64;

        if sample > self.max {
            self.max = sample;
        }

        SpeedSnapshot {
            avg: self.avg,
            max: self.max,
            instant: sample,
        }
    }

    pub fn sum(&self) -> i64 {
        self.sum
    }

    pub fn avg(&self) -> i64 {
        self.avg
    }

    pub fn max(&self) -> i64 {
        self.max
    }

    pub fn sample_count(&self) -> u64 {
        self.samples
    }

    pub fn has_samples(&self) -> bool {
        self.samples > 0
    }
}

/// Summary figures of a finished batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Number of results in the batch
    pub total: usize,
    /// Results with the success flag set
    pub success_count: usize,
    /// Bytes transferred across all results
    pub total_traffic: i64,
}

impl BatchSummary {
    /// Fold one result into the running summary
    pub fn add(&mut self, result: &ProbeResult) {
        self.total += 1;
        self.total_traffic += result.traffic;
        if result.is_ok {
            self.success_count += 1;
        }
    }

    /// Success fraction as shown in the report, e.g. `"3/5"`
    pub fn success_fraction(&self) -> String {
        format!("{}/{}", self.success_count, self.total)
    }

    /// Success rate in percent
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.success_count as f64 / self.total as f64) * 100.0
        }
    }
}
