//! Order-restoring result aggregation

use crate::{
    error::{AppError, Result},
    models::ProbeResult,
    stats::BatchSummary,
};
use tokio::sync::mpsc;

/// Results of one batch, ordered by target position
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedResults {
    pub results: Vec<ProbeResult>,
    pub summary: BatchSummary,
}

/// Drains the completion channel into position-indexed slots
pub struct ResultAggregator {
    receiver: mpsc::Receiver<ProbeResult>,
    expected: usize,
}

impl ResultAggregator {
    /// Completion channel sized to the batch, plus the aggregator draining it
    pub fn channel(expected: usize) -> (mpsc::Sender<ProbeResult>, Self) {
        let (sender, receiver) = mpsc::channel(expected.max(1));
        (sender, Self { receiver, expected })
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Receive exactly `expected` results and order them by id
    ///
    /// Fails when the channel closes early or a result carries an id that
    /// is out of range or already seen.
    pub async fn collect(mut self) -> Result<AggregatedResults> {
        let mut slots: Vec<Option<ProbeResult>> = vec![None; self.expected];
        let mut summary = BatchSummary::default();

        for received in 0..self.expected {
            let result = self.receiver.recv().await.ok_or_else(|| {
                AppError::internal(format!(
                    "completion channel closed after {}/{} results",
                    received, self.expected
                ))
            })?;
            Self::place(&mut slots, &mut summary, result)?;
        }

        let results = slots.into_iter().flatten().collect();
        Ok(AggregatedResults { results, summary })
    }

    /// Take whatever results have already arrived, without waiting
    ///
    /// Used after cancellation, when some targets never report.
    pub fn collect_available(mut self) -> Result<AggregatedResults> {
        let mut slots: Vec<Option<ProbeResult>> = vec![None; self.expected];
        let mut summary = BatchSummary::default();

        while let Ok(result) = self.receiver.try_recv() {
            Self::place(&mut slots, &mut summary, result)?;
        }

        let results = slots.into_iter().flatten().collect();
        Ok(AggregatedResults { results, summary })
    }

    fn place(
        slots: &mut [Option<ProbeResult>],
        summary: &mut BatchSummary,
        result: ProbeResult,
    ) -> Result<()> {
        let id = result.id;
        let slot = slots
            .get_mut(id)
            .ok_or_else(|| AppError::internal(format!("result id {} out of range", id)))?;
        if slot.is_some() {
            return Err(AppError::internal(format!("duplicate result for id {}", id)));
        }
        summary.add(&result);
        *slot = Some(result);
        Ok(())
    }
}
