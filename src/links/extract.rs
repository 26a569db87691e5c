//! Link classification, extraction and lenient base64 decoding

use crate::error::{AppError, Result};
use base64::{engine::general_purpose, Engine as _};
use regex::Regex;
use std::sync::OnceLock;

/// Text starting with an http(s) URL is a subscription reference
const SUBSCRIPTION_PATTERN: &str = r"^(?:https?://)(?:[^@/\n]+@)?(?:www\.)?([^:/\n]+)";

/// vmess/ssr links are one base64 blob; ss/trojan links carry
/// `user@host:port` followed by a query or fragment
const LINK_PATTERN: &str =
    r"(?:(?i:vmess|ssr)://[a-zA-Z0-9+_/=-]+)|(?:(?i:ss|trojan)://(.+?)@(.+?):([0-9]{2,5})([?#][^\s]+))";

/// How a piece of link text has to be resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkSource {
    /// Fetch over HTTP, decode, then extract
    Subscription,
    /// Extract links directly from the text
    Inline,
}

fn compiled(
    cell: &'static OnceLock<std::result::Result<Regex, regex::Error>>,
    pattern: &str,
) -> Result<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern))
        .as_ref()
        .map_err(|e| AppError::internal(format!("Invalid link pattern: {}", e)))
}

fn subscription_regex() -> Result<&'static Regex> {
    static CELL: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
    compiled(&CELL, SUBSCRIPTION_PATTERN)
}

fn link_regex() -> Result<&'static Regex> {
    static CELL: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
    compiled(&CELL, LINK_PATTERN)
}

/// Whether the text is a subscription URL that must be fetched
pub fn is_subscription_url(text: &str) -> bool {
    subscription_regex()
        .map(|re| re.is_match(text.trim()))
        .unwrap_or(false)
}

/// Classify link text
pub fn classify(text: &str) -> LinkSource {
    if is_subscription_url(text) {
        LinkSource::Subscription
    } else {
        LinkSource::Inline
    }
}

/// Extract every endpoint URI from the text, in order of appearance
pub fn extract_links(text: &str) -> Result<Vec<String>> {
    let links: Vec<String> = link_regex()?
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect();

    if links.is_empty() {
        return Err(AppError::extraction("no profile found"));
    }

    Ok(links)
}

/// Decode base64 in any of the alphabets subscription providers use
///
/// Whitespace is ignored; standard and URL-safe alphabets are accepted,
/// padded or not.
pub fn decode_base64_lenient(text: &str) -> Result<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let trimmed = compact.trim_end_matches('=');

    general_purpose::STANDARD_NO_PAD
        .decode(trimmed)
        .or_else(|_| general_purpose::URL_SAFE_NO_PAD.decode(trimmed))
        .or_else(|_| general_purpose::STANDARD.decode(&compact))
        .or_else(|_| general_purpose::URL_SAFE.decode(&compact))
        .map_err(AppError::from)
}

/// Lenient base64 decode into UTF-8 text
pub fn decode_base64_text(text: &str) -> Result<String> {
    let bytes = decode_base64_lenient(text)?;
    String::from_utf8(bytes).map_err(|e| AppError::parse(format!("Decoded text is not UTF-8: {}", e)))
}
