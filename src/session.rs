//! One test session: a single client request from decode to report
//!
//! The session owns the cancellation token, the notifier and the
//! aggregator for its batch. Decode and extraction failures end the
//! session with a `fatal` event; everything after dispatch is absorbed
//! into per-target results.

use crate::{
    config::ServerConfig,
    decode::decode_request,
    error::{AppError, Result},
    executor::{ResultAggregator, ScheduleOutcome, Scheduler, SchedulerStats},
    links::{LinkResolver, SubscriptionResolver},
    log_info, log_warn,
    logging::{ErrorEventLogger, Logger, LoggerFactory, PerformanceLogger, ProbeLogger},
    models::{ProbeResult, ProgressEvent, TestConfiguration},
    notifier::{EventSink, ProgressNotifier},
    output::{ReportBuilder, ReportRenderer, TextTableRenderer},
    probe::{describe_target, HttpSpeedProbe, PingProbe, ProbePipeline, SpeedProbe, TcpPingProbe},
    stats::BatchSummary,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// External collaborators used by every session
#[derive(Clone)]
pub struct Collaborators {
    pub resolver: Arc<dyn LinkResolver>,
    pub ping_probe: Arc<dyn PingProbe>,
    pub speed_probe: Arc<dyn SpeedProbe>,
    pub renderer: Arc<dyn ReportRenderer>,
}

impl Collaborators {
    /// The shipped implementations, configured from `config`
    pub fn from_config(config: &ServerConfig, logger: &Logger) -> Result<Self> {
        Ok(Self {
            resolver: Arc::new(SubscriptionResolver::new(logger)?),
            ping_probe: Arc::new(TcpPingProbe::new()),
            speed_probe: Arc::new(HttpSpeedProbe::new(config.download_url.clone())),
            renderer: Arc::new(TextTableRenderer::new()),
        })
    }
}

/// What a finished session produced
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub session_id: String,
    pub schedule: ScheduleOutcome,
    /// Results ordered by target position; partial when cancelled
    pub results: Vec<ProbeResult>,
    pub summary: BatchSummary,
    pub stats: SchedulerStats,
    /// Data URI of the report, when one was published
    pub report: Option<String>,
    pub elapsed: Duration,
}

impl SessionOutcome {
    pub fn is_cancelled(&self) -> bool {
        self.schedule == ScheduleOutcome::Cancelled
    }
}

pub struct Session {
    id: String,
    config: ServerConfig,
    collaborators: Collaborators,
    cancel: CancellationToken,
    logger: Logger,
}

impl Session {
    /// Create a session with a fresh session id
    pub async fn new(config: &ServerConfig, collaborators: Collaborators, cancel: CancellationToken) -> Self {
        let factory = LoggerFactory::new(config.clone());
        let logger = factory.create_logger("SESSION").await;

        Self {
            id: factory.session_id().to_string(),
            config: config.clone(),
            collaborators,
            cancel,
            logger,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the request in `payload`, streaming events into `sink`
    pub async fn run(&self, payload: &str, sink: Box<dyn EventSink>) -> Result<SessionOutcome> {
        let notifier = Arc::new(ProgressNotifier::new(sink, self.cancel.clone(), &self.logger));
        let outcome = self.run_with(payload, &notifier).await;

        if let Err(e) = notifier.close().await {
            log_warn!(self.logger, "Failed to close event stream: {}", e);
        }
        outcome
    }

    async fn run_with(&self, payload: &str, notifier: &Arc<ProgressNotifier>) -> Result<SessionOutcome> {
        let config = match self.prepare(payload).await {
            Ok(config) => Arc::new(config),
            Err(e) => return Err(self.abort(notifier, e).await),
        };
        let batch_size = config.batch_size();

        log_info!(
            self.logger,
            "Testing {} targets, concurrency {}, timeout {}s",
            batch_size,
            config.concurrency,
            config.timeout.as_secs()
        );

        let mut perf = PerformanceLogger::new(&self.logger);
        perf.start_timing("batch").await;
        let started = Instant::now();

        notifier.emit_best_effort(ProgressEvent::Started).await;

        let targets = config.probe_targets();
        for target in &targets {
            let description = describe_target(target);
            notifier
                .emit_best_effort(ProgressEvent::ServerRegistered {
                    id: target.position,
                    uri: target.uri.clone(),
                    group: config.group_name.clone(),
                    remarks: description.remarks,
                    protocol: description.protocol,
                    remap_id: target.remap_id,
                })
                .await;
        }

        let pipeline = Arc::new(
            ProbePipeline::new(
                Arc::clone(&config),
                Arc::clone(notifier),
                Arc::clone(&self.collaborators.ping_probe),
                Arc::clone(&self.collaborators.speed_probe),
                self.cancel.clone(),
                ProbeLogger::new(&self.logger),
            )
            .with_ping_deadline(self.config.ping_deadline()),
        );

        let (completed, aggregator) = ResultAggregator::channel(batch_size);
        let scheduler = Scheduler::new(config.concurrency, self.cancel.clone(), &self.logger);
        let schedule = scheduler
            .run(pipeline, Arc::clone(notifier), targets, completed)
            .await?;

        let stats = scheduler.stats();
        let elapsed = started.elapsed();
        perf.end_timing("batch").await;

        if schedule == ScheduleOutcome::Cancelled {
            let partial = aggregator.collect_available()?;
            log_warn!(
                self.logger,
                "Session cancelled with {}/{} results",
                partial.results.len(),
                batch_size
            );
            return Ok(SessionOutcome {
                session_id: self.id.clone(),
                schedule,
                results: partial.results,
                summary: partial.summary,
                stats,
                report: None,
                elapsed,
            });
        }

        notifier.emit_best_effort(ProgressEvent::AllFinished).await;

        let aggregated = aggregator.collect().await?;
        perf.log_batch_summary(&aggregated.summary, elapsed).await;

        // Nobody is listening for the report once the session is cancelled
        let report = if self.cancel.is_cancelled() {
            None
        } else {
            ReportBuilder::new(
                Arc::clone(&self.collaborators.renderer),
                &self.config.artifact_dir,
                self.config.font_path.clone(),
                &self.logger,
            )
            .publish(notifier, &self.id, &config, &aggregated, elapsed)
            .await
        };

        Ok(SessionOutcome {
            session_id: self.id.clone(),
            schedule,
            results: aggregated.results,
            summary: aggregated.summary,
            stats,
            report,
            elapsed,
        })
    }

    /// Decode the request and make sure the batch is not empty
    async fn prepare(&self, payload: &str) -> Result<TestConfiguration> {
        // A failed subscription fetch leaves the batch without profiles
        let config = decode_request(payload, self.collaborators.resolver.as_ref())
            .await
            .map_err(|e| match e {
                AppError::Network(_) | AppError::Timeout(_) => {
                    AppError::extraction(format!("subscription unavailable: {}", e.detail()))
                }
                other => other,
            })?;
        if config.targets.is_empty() {
            return Err(AppError::extraction("no profile found"));
        }
        Ok(config)
    }

    /// Emit `fatal` for a session-ending error and hand it back
    async fn abort(&self, notifier: &ProgressNotifier, error: AppError) -> AppError {
        ErrorEventLogger::new(&self.logger)
            .log_error(&error, Some("Session aborted"), Some(&self.id))
            .await;

        if error.is_fatal_to_session() {
            notifier
                .emit_best_effort(ProgressEvent::Fatal { reason: error.detail() })
                .await;
        }
        error
    }
}
