//! Link resolution: subscription fetching, link extraction and
//! per-profile display metadata

pub mod extract;
pub mod profile;
pub mod subscription;

pub use extract::{classify, decode_base64_text, extract_links, is_subscription_url, LinkSource};
pub use profile::{parse_profile, protocol_of, ProfileInfo};
pub use subscription::SubscriptionResolver;

use crate::error::Result;
use async_trait::async_trait;

/// Turns a subscription reference or raw batch text into endpoint URIs
#[async_trait]
pub trait LinkResolver: Send + Sync {
    /// Ordered endpoint URIs; `AppError::Extraction` when nothing matches
    async fn resolve(&self, text: &str) -> Result<Vec<String>>;
}

/// Resolver that only extracts links already present in the text
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineResolver;

#[async_trait]
impl LinkResolver for InlineResolver {
    async fn resolve(&self, text: &str) -> Result<Vec<String>> {
        extract_links(text)
    }
}
