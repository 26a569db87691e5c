//! Final report assembly and delivery

use crate::{
    defaults,
    error::{AppError, Result},
    executor::AggregatedResults,
    log_debug, log_warn,
    logging::{ErrorEventLogger, Logger},
    models::{ProgressEvent, TestConfiguration},
    notifier::ProgressNotifier,
    output::ReportRenderer,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Layout parameters handed to the renderer
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutConfig {
    pub horizontal_padding: u32,
    pub vertical_padding: u32,
    pub font_size: u32,
    pub language: String,
    pub font_path: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            horizontal_padding: defaults::REPORT_HORIZONTAL_PADDING,
            vertical_padding: defaults::REPORT_VERTICAL_PADDING,
            font_size: defaults::DEFAULT_FONT_SIZE,
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            font_path: defaults::DEFAULT_FONT_PATH.to_string(),
        }
    }
}

impl LayoutConfig {
    /// Layout for one session's render hints
    pub fn for_session(config: &TestConfiguration, font_path: &str) -> Self {
        Self {
            font_size: config.font_size,
            language: config.language.clone(),
            font_path: font_path.to_string(),
            ..Self::default()
        }
    }
}

/// Renders, persists and publishes the batch report
pub struct ReportBuilder {
    renderer: Arc<dyn ReportRenderer>,
    artifact_dir: PathBuf,
    font_path: String,
    logger: Logger,
}

impl ReportBuilder {
    pub fn new(
        renderer: Arc<dyn ReportRenderer>,
        artifact_dir: impl Into<PathBuf>,
        font_path: impl Into<String>,
        logger: &Logger,
    ) -> Self {
        Self {
            renderer,
            artifact_dir: artifact_dir.into(),
            font_path: font_path.into(),
            logger: logger.child("REPORT"),
        }
    }

    /// Session-scoped artifact location
    pub fn artifact_path(&self, session_id: &str) -> PathBuf {
        self.artifact_dir
            .join(format!("report-{}.{}", session_id, self.renderer.extension()))
    }

    /// Render and persist the report, then return it as a data URI
    ///
    /// The artifact file is removed once encoded.
    pub async fn build(
        &self,
        session_id: &str,
        config: &TestConfiguration,
        aggregated: &AggregatedResults,
        elapsed: Duration,
    ) -> Result<String> {
        let layout = LayoutConfig::for_session(config, &self.font_path);
        let summary_line = self.renderer.format_summary(&aggregated.summary, elapsed);
        let artifact = self.renderer.render(&aggregated.results, &summary_line, &layout)?;

        let path = self.artifact_path(session_id);
        self.renderer.persist(&artifact, &path).await?;
        log_debug!(self.logger, "Report written to {}", path.display());

        let encoded = Self::encode_file(&path, self.renderer.mime_type()).await;
        if let Err(e) = tokio::fs::remove_file(&path).await {
            log_warn!(self.logger, "Failed to remove {}: {}", path.display(), e);
        }

        encoded
    }

    /// Build the report and emit `report-ready`
    ///
    /// Failures are logged and the event is omitted.
    pub async fn publish(
        &self,
        notifier: &ProgressNotifier,
        session_id: &str,
        config: &TestConfiguration,
        aggregated: &AggregatedResults,
        elapsed: Duration,
    ) -> Option<String> {
        match self.build(session_id, config, aggregated, elapsed).await {
            Ok(data_uri) => {
                notifier
                    .emit_best_effort(ProgressEvent::ReportReady {
                        data_uri: data_uri.clone(),
                    })
                    .await;
                Some(data_uri)
            }
            Err(e) => {
                ErrorEventLogger::new(&self.logger)
                    .log_error(&e, Some("Report generation failed"), Some(session_id))
                    .await;
                None
            }
        }
    }

    async fn encode_file(path: &Path, mime_type: &str) -> Result<String> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| AppError::render(format!("Failed to read {}: {}", path.display(), e)))?;
        Ok(format!("data:{};base64,{}", mime_type, STANDARD.encode(bytes)))
    }
}
