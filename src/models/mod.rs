//! Data models for test requests, probe results and progress events

pub mod event;
pub mod request;
pub mod result;

pub use event::ProgressEvent;
pub use request::TestConfiguration;
pub use result::{ProbeResult, ProbeTarget};
