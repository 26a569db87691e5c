//! HTTP download throughput probe

use crate::{
    defaults,
    error::ProbeError,
    probe::{ProbeOutcome, SpeedProbe},
};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Proxy};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Proxy schemes reqwest can tunnel through
const SUPPORTED_SCHEMES: &[&str] = &["http", "https", "socks5", "socks5h"];

/// Downloads a fixed resource through the endpoint and samples the
/// byte rate once per interval
#[derive(Debug, Clone)]
pub struct HttpSpeedProbe {
    download_url: String,
    sample_interval: Duration,
}

impl HttpSpeedProbe {
    pub fn new(download_url: impl Into<String>) -> Self {
        Self {
            download_url: download_url.into(),
            sample_interval: defaults::SAMPLE_INTERVAL,
        }
    }

    /// Override the sampling interval
    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    pub fn download_url(&self) -> &str {
        &self.download_url
    }

    /// Whether the endpoint can be used as a reqwest proxy
    pub fn supports(uri: &str) -> bool {
        let scheme = crate::links::protocol_of(uri);
        SUPPORTED_SCHEMES.contains(&scheme.as_str())
    }

    fn build_client(&self, uri: &str, connect_timeout: Duration) -> ProbeOutcome<Client> {
        if !Self::supports(uri) {
            return Err(ProbeError::Unsupported(crate::links::protocol_of(uri)));
        }

        let proxy = Proxy::all(uri).map_err(|e| ProbeError::InvalidProfile(e.to_string()))?;

        Client::builder()
            .proxy(proxy)
            .connect_timeout(connect_timeout)
            .user_agent(concat!("proxy-speedtest/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProbeError::Transfer(format!("Failed to create HTTP client: {}", e)))
    }

    /// Scale a byte count observed over `window` to bytes per second
    fn rate(bytes: u64, window: Duration) -> i64 {
        let seconds = window.as_secs_f64().max(1e-3);
        (bytes as f64 / seconds) as i64
    }
}

#[async_trait]
impl SpeedProbe for HttpSpeedProbe {
    async fn measure(
        &self,
        uri: &str,
        connect_timeout: Duration,
        total_timeout: Duration,
        samples: mpsc::Sender<i64>,
    ) -> ProbeOutcome<i64> {
        let client = self.build_client(uri, connect_timeout)?;
        let deadline = tokio::time::Instant::now()
            .checked_add(total_timeout)
            .ok_or_else(|| ProbeError::Transfer(format!("Timeout of {}s out of range", total_timeout.as_secs())))?;

        let response = tokio::time::timeout_at(deadline, client.get(&self.download_url).send())
            .await
            .map_err(|_| ProbeError::Timeout(total_timeout.as_secs()))??;

        if !response.status().is_success() {
            return Err(ProbeError::Transfer(format!("HTTP {}", response.status().as_u16())));
        }

        let mut stream = response.bytes_stream();
        let mut ticker = tokio::time::interval(self.sample_interval);
        // The first tick completes immediately
        ticker.tick().await;

        let mut total: u64 = 0;
        let mut window: u64 = 0;
        let mut window_start = Instant::now();

        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => break,
                _ = ticker.tick() => {
                    let sample = Self::rate(window, window_start.elapsed());
                    window = 0;
                    window_start = Instant::now();
                    // No sample before the first byte
                    if total > 0 && samples.send(sample).await.is_err() {
                        // Consumer stopped listening
                        return Ok(total as i64);
                    }
                }
                chunk = stream.next() => match chunk {
                    Some(Ok(bytes)) => {
                        total += bytes.len() as u64;
                        window += bytes.len() as u64;
                    }
                    Some(Err(e)) => {
                        if total == 0 {
                            return Err(ProbeError::from(e));
                        }
                        let _ = samples.send(-1).await;
                        return Ok(total as i64);
                    }
                    None => break,
                },
            }
        }

        // Flush the partial window
        if window > 0 {
            let _ = samples.send(Self::rate(window, window_start.elapsed())).await;
        }

        if total == 0 {
            return Err(ProbeError::Timeout(total_timeout.as_secs()));
        }

        Ok(total as i64)
    }
}
