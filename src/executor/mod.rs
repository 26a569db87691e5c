//! Bounded-concurrency scheduling of probe pipelines
//!
//! This module contains the execution components of a session:
//! - [`Scheduler`] dispatching one pipeline task per target under a permit pool
//! - [`aggregator::ResultAggregator`] restoring target order from the completion channel

pub mod aggregator;

pub use aggregator::{AggregatedResults, ResultAggregator};

use crate::{
    error::{AppError, Result},
    log_debug, log_warn,
    logging::Logger,
    models::{ProbeResult, ProbeTarget, ProgressEvent},
    notifier::ProgressNotifier,
    probe::ProbePipeline,
};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

/// How a schedule run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleOutcome {
    /// Every target was dispatched and every task has finished
    Completed,
    /// Cancellation stopped dispatching; in-flight tasks were not awaited
    Cancelled,
}

/// Counters of one schedule run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// Targets handed to a pipeline task
    pub dispatched: usize,
    /// Tasks that delivered their result
    pub finished: usize,
    /// Highest number of pipelines running at the same time
    pub peak_active: usize,
}

/// Live counters shared with the spawned tasks
#[derive(Debug, Default)]
struct Counters {
    dispatched: AtomicUsize,
    finished: AtomicUsize,
    active: AtomicUsize,
    peak_active: AtomicUsize,
}

impl Counters {
    fn enter(&self) {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_active.fetch_max(active, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.finished.fetch_add(1, Ordering::SeqCst);
    }

    fn snapshot(&self) -> SchedulerStats {
        SchedulerStats {
            dispatched: self.dispatched.load(Ordering::SeqCst),
            finished: self.finished.load(Ordering::SeqCst),
            peak_active: self.peak_active.load(Ordering::SeqCst),
        }
    }
}

/// Dispatches one pipeline per target, never more than `concurrency` at once
pub struct Scheduler {
    concurrency: usize,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
    counters: Arc<Counters>,
    logger: Logger,
}

impl Scheduler {
    /// Create a scheduler; a concurrency of zero runs sequentially and
    /// values beyond the permit pool's limit are capped
    pub fn new(concurrency: usize, cancel: CancellationToken, logger: &Logger) -> Self {
        let concurrency = concurrency.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            concurrency,
            permits: Arc::new(Semaphore::new(concurrency)),
            cancel,
            counters: Arc::new(Counters::default()),
            logger: logger.child("SCHED"),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Counters as of now
    pub fn stats(&self) -> SchedulerStats {
        self.counters.snapshot()
    }

    /// Run every target through `pipeline`
    ///
    /// Each task sends its result on `completed`, then emits
    /// `target-finished`, then releases its permit. Targets are dispatched
    /// in order. Cancellation stops dispatching and returns immediately.
    pub async fn run(
        &self,
        pipeline: Arc<ProbePipeline>,
        notifier: Arc<ProgressNotifier>,
        targets: Vec<ProbeTarget>,
        completed: mpsc::Sender<ProbeResult>,
    ) -> Result<ScheduleOutcome> {
        let total = targets.len();
        let mut tasks = Vec::with_capacity(total);

        log_debug!(
            self.logger,
            "Scheduling {} targets with concurrency {}",
            total,
            self.concurrency
        );

        for target in targets {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    let stats = self.stats();
                    log_warn!(
                        self.logger,
                        "Session cancelled after dispatching {}/{} targets",
                        stats.dispatched,
                        total
                    );
                    return Ok(ScheduleOutcome::Cancelled);
                }
                permit = Arc::clone(&self.permits).acquire_owned() => {
                    permit.map_err(|_| AppError::internal("permit pool closed"))?
                }
            };

            let pipeline = Arc::clone(&pipeline);
            let notifier = Arc::clone(&notifier);
            let counters = Arc::clone(&self.counters);
            let completed = completed.clone();
            let logger = self.logger.clone();

            counters.dispatched.fetch_add(1, Ordering::SeqCst);
            counters.enter();

            tasks.push(tokio::spawn(async move {
                let id = target.position;
                let result = pipeline.run(target).await;

                if completed.send(result).await.is_err() {
                    log_debug!(logger, "Result of target {} dropped, aggregator gone", id);
                }
                notifier
                    .emit_best_effort(ProgressEvent::TargetFinished { id })
                    .await;

                counters.leave();
                drop(permit);
            }));
        }

        // Only the tasks hold senders from here on
        drop(completed);

        for joined in join_all(tasks).await {
            if let Err(e) = joined {
                log_warn!(self.logger, "Pipeline task failed: {}", e);
            }
        }

        let stats = self.stats();
        log_debug!(
            self.logger,
            "All {} targets finished, peak concurrency {}",
            stats.finished,
            stats.peak_active
        );

        Ok(ScheduleOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::ProbeError,
        logging::ProbeLogger,
        models::TestConfiguration,
        notifier::ChannelSink,
        probe::{PingProbe, ProbeOutcome, SpeedProbe},
        types::SpeedTestMode,
    };
    use async_trait::async_trait;
    use std::time::Duration;

    /// Ping that holds the target for a while and reports the live count
    struct SlowPing {
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl PingProbe for SlowPing {
        async fn ping(&self, _uri: &str, _deadline: Duration) -> ProbeOutcome<i64> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(10)
        }
    }

    struct NoSpeed;

    #[async_trait]
    impl SpeedProbe for NoSpeed {
        async fn measure(
            &self,
            _uri: &str,
            _connect: Duration,
            _total: Duration,
            _samples: mpsc::Sender<i64>,
        ) -> ProbeOutcome<i64> {
            Err(ProbeError::Unsupported("test".into()))
        }
    }

    fn setup(
        concurrency: usize,
        targets: usize,
    ) -> (
        Scheduler,
        Arc<ProbePipeline>,
        Arc<ProgressNotifier>,
        Vec<ProbeTarget>,
        Arc<AtomicUsize>,
        CancellationToken,
        mpsc::UnboundedReceiver<String>,
    ) {
        let logger = Logger::silent("TEST");
        let cancel = CancellationToken::new();
        let (sink, events) = ChannelSink::new();
        let notifier = Arc::new(ProgressNotifier::new(Box::new(sink), cancel.clone(), &logger));
        let peak = Arc::new(AtomicUsize::new(0));

        let config = TestConfiguration {
            speed_test_mode: SpeedTestMode::PingOnly,
            concurrency,
            targets: (0..targets).map(|i| format!("socks5://127.0.0.1:{}", 1000 + i)).collect(),
            ..TestConfiguration::default()
        };
        let probe_targets = config.probe_targets();

        let pipeline = Arc::new(ProbePipeline::new(
            Arc::new(config),
            Arc::clone(&notifier),
            Arc::new(SlowPing {
                active: Arc::new(AtomicUsize::new(0)),
                peak: Arc::clone(&peak),
            }),
            Arc::new(NoSpeed),
            cancel.clone(),
            ProbeLogger::new(&logger),
        ));

        let scheduler = Scheduler::new(concurrency, cancel.clone(), &logger);
        (scheduler, pipeline, notifier, probe_targets, peak, cancel, events)
    }

    #[tokio::test]
    async fn test_every_target_finishes_once() {
        let (scheduler, pipeline, notifier, targets, _, _, mut events) = setup(3, 7);
        let (tx, mut rx) = mpsc::channel(7);

        let outcome = scheduler.run(pipeline, notifier, targets, tx).await.unwrap();
        assert_eq!(outcome, ScheduleOutcome::Completed);

        let mut ids = Vec::new();
        while let Ok(result) = rx.try_recv() {
            ids.push(result.id);
        }
        ids.sort_unstable();
        assert_eq!(ids, (0..7).collect::<Vec<_>>());

        let mut finished = 0;
        while let Ok(message) = events.try_recv() {
            if message.contains("\"endone\"") {
                finished += 1;
            }
        }
        assert_eq!(finished, 7);

        let stats = scheduler.stats();
        assert_eq!(stats.dispatched, 7);
        assert_eq!(stats.finished, 7);
    }

    #[tokio::test]
    async fn test_concurrency_bound_holds() {
        let (scheduler, pipeline, notifier, targets, peak, _, _events) = setup(2, 8);
        let (tx, _rx) = mpsc::channel(8);

        scheduler.run(pipeline, notifier, targets, tx).await.unwrap();

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(scheduler.stats().peak_active <= 2);
        assert!(scheduler.stats().peak_active >= 1);
    }

    #[tokio::test]
    async fn test_zero_concurrency_runs_sequentially() {
        let (_, pipeline, notifier, targets, peak, cancel, _events) = setup(1, 4);
        let scheduler = Scheduler::new(0, cancel, &Logger::silent("TEST"));
        assert_eq!(scheduler.concurrency(), 1);

        let (tx, _rx) = mpsc::channel(4);
        scheduler.run(pipeline, notifier, targets, tx).await.unwrap();
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_oversized_concurrency_is_capped() {
        let (_, pipeline, notifier, targets, _, cancel, _events) = setup(1, 3);
        let scheduler = Scheduler::new(usize::MAX, cancel, &Logger::silent("TEST"));
        assert_eq!(scheduler.concurrency(), Semaphore::MAX_PERMITS);

        let (tx, _rx) = mpsc::channel(3);
        let outcome = scheduler.run(pipeline, notifier, targets, tx).await.unwrap();
        assert_eq!(outcome, ScheduleOutcome::Completed);
        assert_eq!(scheduler.stats().finished, 3);
    }

    #[tokio::test]
    async fn test_cancelled_before_dispatch() {
        let (scheduler, pipeline, notifier, targets, _, cancel, _events) = setup(2, 5);
        cancel.cancel();

        let (tx, _rx) = mpsc::channel(5);
        let outcome = scheduler.run(pipeline, notifier, targets, tx).await.unwrap();

        assert_eq!(outcome, ScheduleOutcome::Cancelled);
        assert_eq!(scheduler.stats().dispatched, 0);
    }

    #[tokio::test]
    async fn test_cancel_stops_further_dispatch() {
        let (scheduler, pipeline, notifier, targets, _, cancel, _events) = setup(1, 20);
        let (tx, _rx) = mpsc::channel(20);

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let outcome = scheduler.run(pipeline, notifier, targets, tx).await.unwrap();
        assert_eq!(outcome, ScheduleOutcome::Cancelled);
        assert!(scheduler.stats().dispatched < 20);
    }
}
