//! Two-stage probe pipeline run once per target
//!
//! Ping first, then a streamed speed measurement. Every path ends in
//! exactly one [`ProbeResult`]; probe failures are folded into that result
//! instead of propagating.

use crate::{
    defaults,
    error::ProbeError,
    links::{parse_profile, protocol_of},
    logging::ProbeLogger,
    models::{ProbeResult, ProbeTarget, ProgressEvent, TestConfiguration},
    notifier::ProgressNotifier,
    probe::{PingProbe, SpeedProbe},
    stats::SpeedAccumulator,
    types::SpeedTestMode,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Display metadata of a target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDescription {
    pub protocol: String,
    pub remarks: String,
}

/// Derive protocol and remarks from the target URI
///
/// Unparseable profiles and profiles without a name are shown as
/// `Profile {position}`.
pub fn describe_target(target: &ProbeTarget) -> TargetDescription {
    let uri = target.probe_uri();
    match parse_profile(uri) {
        Ok(info) if !info.remarks.trim().is_empty() => TargetDescription {
            protocol: info.protocol,
            remarks: info.remarks,
        },
        Ok(info) => TargetDescription {
            protocol: info.protocol,
            remarks: format!("Profile {}", target.position),
        },
        Err(_) => TargetDescription {
            protocol: protocol_of(uri),
            remarks: format!("Profile {}", target.position),
        },
    }
}

/// Shared, read-only state of every pipeline in a session
pub struct ProbePipeline {
    config: Arc<TestConfiguration>,
    notifier: Arc<ProgressNotifier>,
    ping_probe: Arc<dyn PingProbe>,
    speed_probe: Arc<dyn SpeedProbe>,
    ping_deadline: Duration,
    cancel: CancellationToken,
    logger: ProbeLogger,
}

/// How the speed stage ended
struct SpeedOutcome {
    accumulator: SpeedAccumulator,
    traffic: i64,
    is_ok: bool,
}

impl ProbePipeline {
    pub fn new(
        config: Arc<TestConfiguration>,
        notifier: Arc<ProgressNotifier>,
        ping_probe: Arc<dyn PingProbe>,
        speed_probe: Arc<dyn SpeedProbe>,
        cancel: CancellationToken,
        logger: ProbeLogger,
    ) -> Self {
        Self {
            config,
            notifier,
            ping_probe,
            speed_probe,
            ping_deadline: defaults::PING_DEADLINE,
            cancel,
            logger,
        }
    }

    /// Override the fixed ping deadline
    pub fn with_ping_deadline(mut self, deadline: Duration) -> Self {
        self.ping_deadline = deadline;
        self
    }

    pub fn config(&self) -> &TestConfiguration {
        &self.config
    }

    /// Run both stages for one target
    pub async fn run(&self, target: ProbeTarget) -> ProbeResult {
        let id = target.position;
        let uri = target.probe_uri().to_string();
        let TargetDescription { protocol, remarks } = describe_target(&target);
        let group = self.config.group_name.as_str();

        let mut latency = 0;
        if self.config.speed_test_mode.runs_ping() {
            latency = self.ping_stage(id, &uri, &remarks).await;

            if latency < 1 || self.config.speed_test_mode == SpeedTestMode::PingOnly {
                self.notifier
                    .emit_best_effort(ProgressEvent::speed_unavailable(id))
                    .await;
                let result = ProbeResult::ping_only(id, group, &remarks, &protocol, latency);
                self.logger.log_result(&result).await;
                return result;
            }
        }

        let outcome = self.speed_stage(id, uri, &remarks).await;

        let result = ProbeResult {
            id,
            group: group.to_string(),
            remarks,
            protocol,
            ping: latency,
            avg_speed: outcome.accumulator.avg(),
            max_speed: outcome.accumulator.max(),
            is_ok: outcome.is_ok,
            traffic: outcome.traffic,
        };
        self.logger.log_result(&result).await;
        result
    }

    async fn ping_stage(&self, id: usize, uri: &str, remarks: &str) -> i64 {
        self.notifier
            .emit_best_effort(ProgressEvent::PingStarted { id })
            .await;

        let latency = match self.ping_probe.ping(uri, self.ping_deadline).await {
            Ok(latency) => latency,
            Err(e) => {
                self.logger.log_failure(id, remarks, "ping", &e).await;
                0
            }
        };

        self.logger.log_ping(id, remarks, latency).await;
        self.notifier
            .emit_best_effort(ProgressEvent::PingResult { id, latency })
            .await;
        latency
    }

    async fn speed_stage(&self, id: usize, uri: String, remarks: &str) -> SpeedOutcome {
        self.notifier
            .emit_best_effort(ProgressEvent::SpeedStarted { id })
            .await;

        let (sender, mut receiver) = mpsc::channel(defaults::SAMPLE_CHANNEL_CAPACITY);
        let probe = Arc::clone(&self.speed_probe);
        let timeout = self.config.timeout;
        let transfer = tokio::spawn(async move { probe.measure(&uri, timeout, timeout, sender).await });

        let started = Instant::now();
        let mut accumulator = SpeedAccumulator::new();
        let mut cancelled = false;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                sample = receiver.recv() => match sample {
                    Some(sample) if sample >= 0 => {
                        let snapshot = accumulator.record(sample, started.elapsed());
                        self.logger.log_sample(id, remarks, sample).await;
                        self.notifier
                            .emit_best_effort(ProgressEvent::SpeedSample {
                                id,
                                avg: snapshot.avg,
                                max: snapshot.max,
                                instant: snapshot.instant,
                            })
                            .await;
                    }
                    // Negative sample: the transfer broke off
                    Some(_) | None => break,
                },
            }
        }

        if cancelled {
            // The spawned probe keeps running until its own timeout
            drop(transfer);
            return SpeedOutcome {
                traffic: accumulator.sum(),
                is_ok: accumulator.has_samples(),
                accumulator,
            };
        }

        // Unblock a probe still waiting on a full channel
        drop(receiver);

        // A failed transfer still moved the bytes its samples account for
        let (transfer_ok, traffic) = match transfer.await {
            Ok(Ok(bytes)) => (true, bytes),
            Ok(Err(e)) => {
                self.logger.log_failure(id, remarks, "speed", &e).await;
                (false, accumulator.sum())
            }
            Err(join_error) => {
                let e = ProbeError::Transfer(join_error.to_string());
                self.logger.log_failure(id, remarks, "speed", &e).await;
                (false, accumulator.sum())
            }
        };

        if traffic < 1 {
            self.notifier
                .emit_best_effort(ProgressEvent::speed_unavailable(id))
                .await;
        }

        SpeedOutcome {
            is_ok: transfer_ok || accumulator.has_samples(),
            traffic,
            accumulator,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        logging::Logger,
        notifier::ChannelSink,
        probe::ProbeOutcome,
    };
    use async_trait::async_trait;
    use serde_json::Value;

    struct FixedPing(i64);

    #[async_trait]
    impl PingProbe for FixedPing {
        async fn ping(&self, _uri: &str, _deadline: Duration) -> ProbeOutcome<i64> {
            if self.0 < 0 {
                Err(ProbeError::Unreachable("down".into()))
            } else {
                Ok(self.0)
            }
        }
    }

    /// Sends the given samples, then returns their sum
    struct ScriptedSpeed(Vec<i64>);

    #[async_trait]
    impl SpeedProbe for ScriptedSpeed {
        async fn measure(
            &self,
            _uri: &str,
            _connect: Duration,
            _total: Duration,
            samples: mpsc::Sender<i64>,
        ) -> ProbeOutcome<i64> {
            let mut total = 0;
            for sample in &self.0 {
                if samples.send(*sample).await.is_err() {
                    break;
                }
                if *sample > 0 {
                    total += sample;
                }
            }
            if total == 0 {
                Err(ProbeError::Timeout(1))
            } else {
                Ok(total)
            }
        }
    }

    /// Sends the given samples, then fails the transfer
    struct BrokenSpeed(Vec<i64>);

    #[async_trait]
    impl SpeedProbe for BrokenSpeed {
        async fn measure(
            &self,
            _uri: &str,
            _connect: Duration,
            _total: Duration,
            samples: mpsc::Sender<i64>,
        ) -> ProbeOutcome<i64> {
            for sample in &self.0 {
                let _ = samples.send(*sample).await;
            }
            Err(ProbeError::Transfer("connection reset".into()))
        }
    }

    /// Sends the given samples, then stalls far past any test deadline
    struct StallingSpeed(Vec<i64>);

    #[async_trait]
    impl SpeedProbe for StallingSpeed {
        async fn measure(
            &self,
            _uri: &str,
            _connect: Duration,
            _total: Duration,
            samples: mpsc::Sender<i64>,
        ) -> ProbeOutcome<i64> {
            for sample in &self.0 {
                let _ = samples.send(*sample).await;
            }
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(self.0.iter().sum())
        }
    }

    fn pipeline(
        mode: SpeedTestMode,
        ping: i64,
        samples: Vec<i64>,
    ) -> (ProbePipeline, mpsc::UnboundedReceiver<String>) {
        pipeline_with(mode, ping, Arc::new(ScriptedSpeed(samples)))
    }

    fn pipeline_with(
        mode: SpeedTestMode,
        ping: i64,
        speed: Arc<dyn SpeedProbe>,
    ) -> (ProbePipeline, mpsc::UnboundedReceiver<String>) {
        let (sink, receiver) = ChannelSink::new();
        let cancel = CancellationToken::new();
        let logger = Logger::silent("TEST");
        let notifier = Arc::new(ProgressNotifier::new(Box::new(sink), cancel.clone(), &logger));
        let config = Arc::new(TestConfiguration {
            speed_test_mode: mode,
            ..TestConfiguration::default()
        });
        let pipeline = ProbePipeline::new(
            config,
            notifier,
            Arc::new(FixedPing(ping)),
            speed,
            cancel,
            ProbeLogger::new(&logger),
        );
        (pipeline, receiver)
    }

    fn drain(receiver: &mut mpsc::UnboundedReceiver<String>) -> Vec<Value> {
        let mut events = Vec::new();
        while let Ok(message) = receiver.try_recv() {
            events.push(serde_json::from_str(&message).unwrap());
        }
        events
    }

    fn kinds(events: &[Value]) -> Vec<&str> {
        events.iter().map(|e| e["info"].as_str().unwrap()).collect()
    }

    fn target(position: usize) -> ProbeTarget {
        ProbeTarget::new(position, "trojan://pw@h.example:443?sni=x#Node".to_string(), None)
    }

    #[test]
    fn test_describe_target_fallback() {
        let good = describe_target(&target(0));
        assert_eq!(good.protocol, "trojan");
        assert_eq!(good.remarks, "Node");

        let bad = describe_target(&ProbeTarget::new(4, "vmess://%%%".to_string(), None));
        assert_eq!(bad.protocol, "vmess");
        assert_eq!(bad.remarks, "Profile 4");
    }

    #[tokio::test]
    async fn test_normal_mode_runs_both_stages() {
        let (pipeline, mut receiver) = pipeline(SpeedTestMode::Normal, 42, vec![1000, 2000]);
        let result = pipeline.run(target(3)).await;

        assert_eq!(result.id, 3);
        assert_eq!(result.ping, 42);
        assert_eq!(result.max_speed, 2000);
        assert_eq!(result.traffic, 3000);
        assert!(result.is_ok);

        let events = drain(&mut receiver);
        assert_eq!(
            kinds(&events),
            vec!["startping", "gotping", "startspeed", "gotspeed", "gotspeed"]
        );
        assert!(events.iter().all(|e| e["id"] == 3));
        assert_eq!(events[1]["ping"], 42);
    }

    #[tokio::test]
    async fn test_failed_ping_skips_speed_stage() {
        let (pipeline, mut receiver) = pipeline(SpeedTestMode::Normal, -1, vec![1000]);
        let result = pipeline.run(target(0)).await;

        assert!(!result.is_ok);
        assert_eq!(result.ping, 0);
        assert_eq!(result.traffic, 0);

        let events = drain(&mut receiver);
        assert_eq!(kinds(&events), vec!["startping", "gotping", "gotspeed"]);
        assert_eq!(events[2]["speed"], -1);
        assert_eq!(events[2]["maxspeed"], -1);
        assert_eq!(events[2]["instant"], 0);
    }

    #[tokio::test]
    async fn test_ping_only_keeps_latency_and_zero_speed() {
        let (pipeline, mut receiver) = pipeline(SpeedTestMode::PingOnly, 88, vec![1000]);
        let result = pipeline.run(target(1)).await;

        assert_eq!(result.ping, 88);
        assert_eq!(result.avg_speed, 0);
        assert_eq!(result.max_speed, 0);
        assert_eq!(result.traffic, 0);
        assert!(!result.is_ok);

        let events = drain(&mut receiver);
        assert_eq!(kinds(&events), vec!["startping", "gotping", "gotspeed"]);
        assert_eq!(events[2]["speed"], -1);
    }

    #[tokio::test]
    async fn test_speed_only_never_pings() {
        let (pipeline, mut receiver) = pipeline(SpeedTestMode::SpeedOnly, 42, vec![500]);
        let result = pipeline.run(target(2)).await;

        assert_eq!(result.ping, 0);
        assert!(result.is_ok);

        let events = drain(&mut receiver);
        let kinds = kinds(&events);
        assert!(!kinds.contains(&"startping"));
        assert!(!kinds.contains(&"gotping"));
        assert_eq!(kinds, vec!["startspeed", "gotspeed"]);
    }

    #[tokio::test]
    async fn test_no_throughput_emits_sentinel() {
        let (pipeline, mut receiver) = pipeline(SpeedTestMode::SpeedOnly, 42, vec![]);
        let result = pipeline.run(target(0)).await;

        assert!(!result.is_ok);
        assert_eq!(result.traffic, 0);

        let events = drain(&mut receiver);
        assert_eq!(kinds(&events), vec!["startspeed", "gotspeed"]);
        assert_eq!(events[1]["speed"], -1);
    }

    #[tokio::test]
    async fn test_negative_sample_ends_sampling() {
        let (pipeline, mut receiver) = pipeline(SpeedTestMode::SpeedOnly, 0, vec![700, -1, 900]);
        let result = pipeline.run(target(0)).await;

        // The probe still reports its own byte count
        assert!(result.is_ok);
        assert_eq!(result.max_speed, 700);

        let events = drain(&mut receiver);
        let samples: Vec<&Value> = events.iter().filter(|e| e["info"] == "gotspeed").collect();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0]["instant"], 700);
    }

    #[tokio::test]
    async fn test_cancelled_before_speed_stage() {
        let (pipeline, _receiver) = pipeline(SpeedTestMode::SpeedOnly, 0, vec![1000]);
        pipeline.cancel.cancel();

        let result = pipeline.run(target(5)).await;
        assert_eq!(result.id, 5);
        assert!(!result.is_ok);
        assert_eq!(result.traffic, 0);
    }

    #[tokio::test]
    async fn test_failed_transfer_keeps_sampled_traffic() {
        let (pipeline, mut receiver) =
            pipeline_with(SpeedTestMode::SpeedOnly, 0, Arc::new(BrokenSpeed(vec![1000, 2000])));
        let result = pipeline.run(target(0)).await;

        assert!(result.is_ok);
        assert_eq!(result.max_speed, 2000);
        assert_eq!(result.traffic, 3000);

        // Traffic was measured, so no sentinel follows the samples
        let events = drain(&mut receiver);
        assert_eq!(kinds(&events), vec!["startspeed", "gotspeed", "gotspeed"]);
        assert!(events.iter().all(|e| e["speed"] != -1));
    }

    #[tokio::test]
    async fn test_cancel_during_sampling_finalizes_partial_result() {
        let (pipeline, mut receiver) =
            pipeline_with(SpeedTestMode::SpeedOnly, 0, Arc::new(StallingSpeed(vec![1500])));

        let run = pipeline.run(target(2));
        let cancel_after_first_sample = async {
            while let Some(message) = receiver.recv().await {
                if message.contains("gotspeed") {
                    pipeline.cancel.cancel();
                    break;
                }
            }
        };
        let (result, _) = tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(run, cancel_after_first_sample)
        })
        .await
        .expect("sampling loop did not stop on cancellation");

        assert_eq!(result.id, 2);
        assert!(result.is_ok);
        assert_eq!(result.max_speed, 1500);
        assert_eq!(result.traffic, 1500);
        assert!(drain(&mut receiver).iter().all(|e| e["info"] != "gotspeed"));
    }
}
