//! Inbound request decoding
//!
//! Three wire formats produce the same [`TestConfiguration`]: the JSON
//! request of a fresh test, the JSON request of a retest, and the legacy
//! `^`-delimited option string. Group default and concurrency clamp are
//! applied identically on every path; the timeout floor depends on the
//! path.

pub mod legacy;

pub use legacy::decode_legacy;

use crate::{
    defaults,
    error::{AppError, Result},
    links::LinkResolver,
    models::TestConfiguration,
    types::{SpeedTestMode, TestMode},
};
use serde::Deserialize;

/// JSON request as sent by the client
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RequestPayload {
    group: String,
    speedtest_mode: String,
    ping_method: String,
    sort_method: String,
    concurrency: i64,
    test_mode: i64,
    testids: Vec<i64>,
    /// Seconds
    timeout: i64,
    links: Vec<String>,
    subscription: String,
    language: String,
    font_size: u32,
}

impl RequestPayload {
    fn parse(payload: &str) -> Result<Self> {
        serde_json::from_str(payload).map_err(|e| AppError::decode(format!("Malformed request: {}", e)))
    }

    /// Fields shared by fresh and retest requests
    fn base_configuration(&self, mode: TestMode, minimum_timeout: std::time::Duration) -> TestConfiguration {
        let language = if self.language.is_empty() {
            defaults::DEFAULT_LANGUAGE.to_string()
        } else {
            self.language.clone()
        };
        let font_size = if self.font_size == 0 {
            defaults::DEFAULT_FONT_SIZE
        } else {
            self.font_size
        };

        TestConfiguration {
            group_name: TestConfiguration::normalize_group(&self.group),
            speed_test_mode: SpeedTestMode::from_wire(&self.speedtest_mode),
            speed_test_mode_raw: self.speedtest_mode.clone(),
            ping_method: self.ping_method.clone(),
            sort_method: self.sort_method.clone(),
            concurrency: TestConfiguration::clamp_concurrency(self.concurrency),
            mode,
            timeout: TestConfiguration::clamp_timeout(self.timeout, minimum_timeout),
            targets: Vec::new(),
            remap_ids: None,
            language,
            font_size,
        }
    }

    fn into_retest(self) -> Result<TestConfiguration> {
        if self.links.is_empty() {
            return Err(AppError::decode("Retest request has no links"));
        }
        if self.links.len() != self.testids.len() {
            return Err(AppError::decode(format!(
                "Retest request has {} links but {} test ids",
                self.links.len(),
                self.testids.len()
            )));
        }

        let mut config = self.base_configuration(TestMode::Retest, defaults::RETEST_MIN_TIMEOUT);
        config.targets = self.links;
        config.remap_ids = Some(self.testids);
        Ok(config)
    }
}

/// Decode a JSON request
///
/// Retest requests carry their targets; fresh requests resolve the
/// `subscription` field through the link resolver.
pub async fn decode_structured(payload: &str, resolver: &dyn LinkResolver) -> Result<TestConfiguration> {
    let request = RequestPayload::parse(payload)?;

    if TestMode::from_wire(request.test_mode) == TestMode::Retest {
        return request.into_retest();
    }

    let mut config = request.base_configuration(TestMode::Fresh, defaults::FRESH_MIN_TIMEOUT);
    config.targets = resolver.resolve(&request.subscription).await?;
    Ok(config)
}

/// Decode a JSON request that must be a retest
pub fn decode_retest(payload: &str) -> Result<TestConfiguration> {
    let request = RequestPayload::parse(payload)?;

    if TestMode::from_wire(request.test_mode) != TestMode::Retest {
        return Err(AppError::decode("Not a retest request"));
    }

    request.into_retest()
}

/// Decode any inbound request: JSON objects take the structured path,
/// everything else the legacy delimited path
pub async fn decode_request(payload: &str, resolver: &dyn LinkResolver) -> Result<TestConfiguration> {
    let trimmed = payload.trim_start();
    if trimmed.starts_with('{') {
        decode_structured(trimmed, resolver).await
    } else {
        decode_legacy(payload, resolver).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::links::InlineResolver;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Resolver that records calls and returns a fixed list
    #[derive(Default)]
    struct CountingResolver {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LinkResolver for CountingResolver {
        async fn resolve(&self, _text: &str) -> Result<Vec<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec!["vmess://a".to_string(), "vmess://b".to_string()])
        }
    }

    #[tokio::test]
    async fn test_fresh_request_clamps() {
        let payload = r#"{"group":"?empty?","speedtestMode":"all","concurrency":0,"timeout":3,"subscription":"vmess://abc"}"#;
        let config = decode_structured(payload, &InlineResolver).await.unwrap();

        assert_eq!(config.group_name, "Default");
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.timeout, Duration::from_secs(8));
        assert_eq!(config.mode, TestMode::Fresh);
        assert_eq!(config.speed_test_mode, SpeedTestMode::Normal);
        assert_eq!(config.speed_test_mode_raw, "all");
        assert_eq!(config.targets, vec!["vmess://abc".to_string()]);
        assert!(config.remap_ids.is_none());
    }

    #[tokio::test]
    async fn test_fresh_request_uses_resolver() {
        let resolver = CountingResolver::default();
        let payload = r#"{"group":"HK","speedtestMode":"pingonly","concurrency":4,"timeout":15,"subscription":"https://sub.example/x","language":"cn","fontSize":18}"#;
        let config = decode_structured(payload, &resolver).await.unwrap();

        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
        assert_eq!(config.group_name, "HK");
        assert_eq!(config.speed_test_mode, SpeedTestMode::PingOnly);
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.timeout, Duration::from_secs(15));
        assert_eq!(config.targets.len(), 2);
        assert_eq!(config.language, "cn");
        assert_eq!(config.font_size, 18);
    }

    #[tokio::test]
    async fn test_fresh_request_without_links_fails_extraction() {
        let payload = r#"{"subscription":"nothing useful"}"#;
        let err = decode_structured(payload, &InlineResolver).await.unwrap_err();
        assert_eq!(err.category(), "EXTRACTION");
    }

    #[tokio::test]
    async fn test_retest_skips_resolution() {
        let resolver = CountingResolver::default();
        let payload = r#"{"testMode":3,"timeout":5,"links":["trojan://p@h:443#a","vmess://b"],"testids":[7,3]}"#;
        let config = decode_structured(payload, &resolver).await.unwrap();

        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
        assert_eq!(config.mode, TestMode::Retest);
        assert_eq!(config.timeout, Duration::from_secs(20));
        assert_eq!(config.remap_ids, Some(vec![7, 3]));
        assert_eq!(config.targets.len(), 2);
    }

    #[test]
    fn test_retest_validation() {
        let mismatched = r#"{"testMode":3,"links":["vmess://a"],"testids":[1,2]}"#;
        assert_eq!(decode_retest(mismatched).unwrap_err().category(), "DECODE");

        let empty = r#"{"testMode":3,"links":[],"testids":[]}"#;
        assert_eq!(decode_retest(empty).unwrap_err().category(), "DECODE");

        let fresh = r#"{"testMode":2,"links":["vmess://a"],"testids":[1]}"#;
        assert_eq!(decode_retest(fresh).unwrap_err().category(), "DECODE");

        let ok = r#"{"testMode":3,"timeout":30,"links":["vmess://a"],"testids":[1]}"#;
        let config = decode_retest(ok).unwrap();
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_malformed_json_is_decode_error() {
        let err = decode_structured("{not json", &InlineResolver).await.unwrap_err();
        assert_eq!(err.category(), "DECODE");
        assert!(err.is_fatal_to_session());
    }

    #[test]
    fn test_oversized_values_are_capped() {
        let payload = format!(
            r#"{{"testMode":3,"timeout":{max},"concurrency":{max},"links":["vmess://a"],"testids":[0]}}"#,
            max = i64::MAX
        );
        let config = decode_retest(&payload).unwrap();
        assert_eq!(config.timeout, defaults::MAX_TIMEOUT);
        assert_eq!(config.concurrency, defaults::MAX_CONCURRENCY);
    }

    #[tokio::test]
    async fn test_decode_request_dispatch() {
        let json = decode_request(r#"  {"subscription":"vmess://x"}"#, &InlineResolver).await.unwrap();
        assert_eq!(json.timeout, Duration::from_secs(8));

        let legacy = decode_request("G^^^^^2^5^vmess://x", &InlineResolver).await.unwrap();
        assert_eq!(legacy.timeout, Duration::from_secs(20));
        assert_eq!(legacy.group_name, "G");
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn retest_timeout_never_below_floor(timeout in -1000i64..1000, concurrency in -50i64..50) {
                let payload = format!(
                    r#"{{"testMode":3,"timeout":{},"concurrency":{},"links":["vmess://a"],"testids":[0]}}"#,
                    timeout, concurrency
                );
                let config = decode_retest(&payload).unwrap();
                prop_assert!(config.timeout >= Duration::from_secs(20));
                prop_assert!(config.concurrency >= 1);
                if timeout >= 20 {
                    prop_assert_eq!(config.timeout, Duration::from_secs(timeout as u64));
                }
                if concurrency >= 1 {
                    prop_assert_eq!(config.concurrency, concurrency as usize);
                }
            }

            #[test]
            fn fresh_timeout_never_below_floor(timeout in -1000i64..1000) {
                let payload = format!(r#"{{"timeout":{},"subscription":"vmess://a"}}"#, timeout);
                let config = tokio_test::block_on(decode_structured(&payload, &InlineResolver)).unwrap();
                prop_assert!(config.timeout >= Duration::from_secs(8));
                if timeout >= 8 {
                    prop_assert_eq!(config.timeout, Duration::from_secs(timeout as u64));
                }
            }

            #[test]
            fn group_is_never_empty(group in "[a-zA-Z?]{0,8}") {
                let normalized = TestConfiguration::normalize_group(&group);
                prop_assert!(!normalized.is_empty());
                prop_assert_ne!(normalized, "?empty?".to_string());
            }
        }
    }
}
