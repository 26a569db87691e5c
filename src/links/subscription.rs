//! Subscription-aware link resolver

use crate::{
    defaults,
    error::{AppError, Result},
    links::{
        extract::{classify, decode_base64_text, extract_links, LinkSource},
        LinkResolver,
    },
    log_debug, log_info,
    logging::Logger,
};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Resolves subscription URLs over HTTP and raw link text in place
pub struct SubscriptionResolver {
    client: Client,
    fetch_timeout: Duration,
    logger: Logger,
}

impl SubscriptionResolver {
    /// Create a resolver with the default fetch timeout
    pub fn new(logger: &Logger) -> Result<Self> {
        Self::with_timeout(defaults::SUBSCRIPTION_FETCH_TIMEOUT, logger)
    }

    /// Create a resolver with a custom fetch timeout
    pub fn with_timeout(fetch_timeout: Duration, logger: &Logger) -> Result<Self> {
        let client = Client::builder()
            .timeout(fetch_timeout)
            .user_agent(concat!("proxy-speedtest/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            fetch_timeout,
            logger: logger.child("LINKS"),
        })
    }

    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    /// Download a subscription and return its decoded body
    async fn fetch(&self, url: &str) -> Result<String> {
        log_info!(self.logger, "Fetching subscription {}", url);

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::timeout(format!(
                    "Subscription fetch exceeded {}s",
                    self.fetch_timeout.as_secs()
                ))
            } else {
                AppError::from(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::network(format!(
                "Subscription fetch failed with HTTP {}",
                status.as_u16()
            )));
        }

        let body = response.text().await?;
        log_debug!(self.logger, "Subscription downloaded: {} bytes", body.len());

        // Most providers serve base64; some serve the link list as is
        match decode_base64_text(body.trim()) {
            Ok(decoded) => Ok(decoded),
            Err(_) => Ok(body),
        }
    }
}

#[async_trait]
impl LinkResolver for SubscriptionResolver {
    async fn resolve(&self, text: &str) -> Result<Vec<String>> {
        let text = text.trim();
        let links = match classify(text) {
            LinkSource::Subscription => {
                let url = text.split_whitespace().next().unwrap_or(text);
                let body = self.fetch(url).await?;
                extract_links(&body)?
            }
            LinkSource::Inline => extract_links(text)?,
        };

        log_info!(self.logger, "Resolved {} links", links.len());
        Ok(links)
    }
}
