//! Legacy `^`-delimited request format
//!
//! `group^speedtestMode^pingMethod^sortMethod^reserved^concurrency^timeout^links...`

use crate::{
    defaults,
    error::{AppError, Result},
    links::LinkResolver,
    models::TestConfiguration,
    types::{SpeedTestMode, TestMode},
};

const FIELD_SEPARATOR: char = '^';
const OPTION_FIELDS: usize = 7;

/// Positional options of a legacy request, before link resolution
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyOptions {
    pub config: TestConfiguration,
    /// Text after the seventh separator
    pub link_text: String,
}

/// Parse the positional option fields without resolving links
pub fn parse_legacy_options(payload: &str) -> Result<LegacyOptions> {
    let fields: Vec<&str> = payload.splitn(OPTION_FIELDS + 1, FIELD_SEPARATOR).collect();
    if fields.len() < OPTION_FIELDS {
        return Err(AppError::decode(format!(
            "Legacy request needs {} fields, got {}",
            OPTION_FIELDS,
            fields.len()
        )));
    }

    let concurrency: i64 = fields[5]
        .trim()
        .parse()
        .map_err(|_| AppError::decode(format!("Invalid concurrency: {:?}", fields[5])))?;
    let timeout: i64 = fields[6]
        .trim()
        .parse()
        .map_err(|_| AppError::decode(format!("Invalid timeout: {:?}", fields[6])))?;

    let config = TestConfiguration {
        group_name: TestConfiguration::normalize_group(fields[0]),
        speed_test_mode: SpeedTestMode::from_wire(fields[1]),
        speed_test_mode_raw: fields[1].to_string(),
        ping_method: fields[2].to_string(),
        sort_method: fields[3].to_string(),
        concurrency: TestConfiguration::clamp_concurrency(concurrency),
        mode: TestMode::Fresh,
        timeout: TestConfiguration::clamp_timeout(timeout, defaults::LEGACY_MIN_TIMEOUT),
        ..TestConfiguration::default()
    };

    Ok(LegacyOptions {
        config,
        link_text: fields.get(OPTION_FIELDS).copied().unwrap_or_default().to_string(),
    })
}

/// Decode a legacy request and resolve its link text
pub async fn decode_legacy(payload: &str, resolver: &dyn LinkResolver) -> Result<TestConfiguration> {
    let LegacyOptions { mut config, link_text } = parse_legacy_options(payload)?;
    config.targets = resolver.resolve(&link_text).await?;
    Ok(config)
}
