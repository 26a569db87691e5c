//! Error handling for the proxy speed tester

pub mod probe;

pub use probe::ProbeError;

use thiserror::Error;

/// Custom error types for the proxy speed tester
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed or incomplete test request
    #[error("Decode error: {0}")]
    Decode(String),

    /// No proxy links could be resolved from the request
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Per-target ping or speed failure
    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),

    /// Report rendering or encoding failure
    #[error("Render error: {0}")]
    Render(String),

    /// Writing to the outbound progress stream failed
    #[error("Notification error: {0}")]
    Notification(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network connectivity errors
    #[error("Network error: {0}")]
    Network(String),

    /// Timeout errors
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(String),

    /// Parsing errors (URLs, JSON, etc.)
    #[error("Parsing error: {0}")]
    Parse(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Create a new decode error
    pub fn decode<S: Into<String>>(message: S) -> Self {
        Self::Decode(message.into())
    }

    /// Create a new extraction error
    pub fn extraction<S: Into<String>>(message: S) -> Self {
        Self::Extraction(message.into())
    }

    /// Create a new render error
    pub fn render<S: Into<String>>(message: S) -> Self {
        Self::Render(message.into())
    }

    /// Create a new notification error
    pub fn notification<S: Into<String>>(message: S) -> Self {
        Self::Notification(message.into())
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network(message.into())
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::Timeout(message.into())
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io(message.into())
    }

    /// Create a new parsing error
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Get error category for logging and reporting
    pub fn category(&self) -> &'static str {
        match self {
            Self::Decode(_) => "DECODE",
            Self::Extraction(_) => "EXTRACTION",
            Self::Probe(_) => "PROBE",
            Self::Render(_) => "RENDER",
            Self::Notification(_) => "NOTIFY",
            Self::Config(_) => "CONFIG",
            Self::Network(_) => "NETWORK",
            Self::Timeout(_) => "TIMEOUT",
            Self::Io(_) => "IO",
            Self::Parse(_) => "PARSE",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// The message without the category prefix, as sent in `fatal` events
    pub fn detail(&self) -> String {
        match self {
            Self::Probe(err) => err.to_string(),
            Self::Decode(msg)
            | Self::Extraction(msg)
            | Self::Render(msg)
            | Self::Notification(msg)
            | Self::Config(msg)
            | Self::Network(msg)
            | Self::Timeout(msg)
            | Self::Io(msg)
            | Self::Parse(msg)
            | Self::Internal(msg) => msg.clone(),
        }
    }

    /// Whether this error aborts a session with a `fatal` event.
    ///
    /// Batch-level preconditions escalate; per-target, render and
    /// notification failures are absorbed by the session itself.
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::Extraction(_))
    }

    /// Check if error is recoverable (can retry)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::Probe(_) => true,
            Self::Decode(_) | Self::Extraction(_) | Self::Config(_) | Self::Parse(_) => false,
            Self::Render(_) | Self::Notification(_) | Self::Io(_) | Self::Internal(_) => false,
        }
    }

    /// Get user-friendly error message with suggestions
    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::Decode(msg) => {
                format!("Invalid test request: {}\n\nSuggestion: Check the request payload fields and the '^' separated legacy format.", msg)
            }
            Self::Extraction(msg) => {
                format!("No proxy profiles found: {}\n\nSuggestion: Provide vmess/ssr/ss/trojan links or a reachable subscription URL.", msg)
            }
            Self::Probe(err) => {
                format!("Probe failed: {}\n\nSuggestion: The endpoint may be offline or unsupported by the built-in probes.", err)
            }
            Self::Render(msg) => {
                format!("Report rendering failed: {}\n\nSuggestion: Check that the artifact directory is writable.", msg)
            }
            Self::Notification(msg) => {
                format!("Progress stream failed: {}\n\nSuggestion: The client disconnected; start a new session.", msg)
            }
            Self::Config(msg) => {
                format!("Configuration problem: {}\n\nSuggestion: Check your .env file or command line arguments.", msg)
            }
            Self::Network(msg) => {
                format!("Network connectivity issue: {}\n\nSuggestion: Check your internet connection and try again.", msg)
            }
            Self::Timeout(msg) => {
                format!("Operation timed out: {}\n\nSuggestion: Increase the timeout in the test request.", msg)
            }
            Self::Io(msg) => {
                format!("File operation failed: {}\n\nSuggestion: Check file permissions and disk space.", msg)
            }
            Self::Parse(msg) => {
                format!("Failed to parse data: {}\n\nSuggestion: Check the format of your input data or configuration files.", msg)
            }
            Self::Internal(msg) => {
                format!("Internal error: {}\n\nThis is likely a bug. Please report this issue with the error details.", msg)
            }
        }
    }

    /// Get exit code for this error type
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Decode(_) | Self::Parse(_) => 1,
            Self::Network(_) | Self::Extraction(_) => 2,
            Self::Timeout(_) => 3,
            Self::Notification(_) => 4,
            Self::Io(_) | Self::Render(_) => 5,
            Self::Probe(_) => 6,
            Self::Internal(_) => 99,
        }
    }

    /// Format error for console display with color coding
    pub fn format_for_console(&self, use_color: bool) -> String {
        let category = self.category();
        let message = self.to_string();

        if use_color {
            use colored::Colorize;
            match self {
                Self::Config(_) | Self::Decode(_) | Self::Parse(_) => {
                    format!("[{}] {}", category.red().bold(), message.red())
                }
                Self::Network(_) | Self::Extraction(_) | Self::Probe(_) => {
                    format!("[{}] {}", category.yellow().bold(), message.yellow())
                }
                Self::Timeout(_) => {
                    format!("[{}] {}", category.blue().bold(), message.blue())
                }
                Self::Notification(_) => {
                    format!("[{}] {}", category.magenta().bold(), message.magenta())
                }
                Self::Io(_) | Self::Render(_) => {
                    format!("[{}] {}", category.cyan().bold(), message.cyan())
                }
                Self::Internal(_) => {
                    format!("[{}] {}", category.bright_red().bold(), message.bright_red())
                }
            }
        } else {
            format!("[{}] {}", category, message)
        }
    }
}

// Standard library error conversions
impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::io(error.to_string())
    }
}

impl From<url::ParseError> for AppError {
    fn from(error: url::ParseError) -> Self {
        Self::parse(format!("URL parse error: {}", error))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::parse(format!("JSON parse error: {}", error))
    }
}

impl From<base64::DecodeError> for AppError {
    fn from(error: base64::DecodeError) -> Self {
        Self::parse(format!("Base64 decode error: {}", error))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::timeout(error.to_string())
        } else {
            Self::network(error.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for AppError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::notification(format!("WebSocket error: {}", error))
    }
}

impl From<dotenv::Error> for AppError {
    fn from(error: dotenv::Error) -> Self {
        Self::config(format!("Environment file error: {}", error))
    }
}

impl From<std::num::ParseIntError> for AppError {
    fn from(error: std::num::ParseIntError) -> Self {
        Self::parse(format!("Integer parse error: {}", error))
    }
}

impl From<std::net::AddrParseError> for AppError {
    fn from(error: std::net::AddrParseError) -> Self {
        Self::parse(format!("Socket address parse error: {}", error))
    }
}

/// Custom Result type for the application
pub type Result<T> = std::result::Result<T, AppError>;

/// Error reporter for CLI-level error output
pub struct ErrorReporter {
    pub use_color: bool,
    pub verbose: bool,
}

impl ErrorReporter {
    /// Create a new error reporter
    pub fn new(use_color: bool, verbose: bool) -> Self {
        Self { use_color, verbose }
    }

    /// Report an error to the user
    pub fn report_error(&self, error: &AppError) {
        eprintln!("{}", error.format_for_console(self.use_color));

        if self.verbose {
            eprintln!();
            eprintln!("{}", error.user_friendly_message());

            if error.is_recoverable() {
                eprintln!();
                if self.use_color {
                    use colored::Colorize;
                    eprintln!("{}", "This error might be temporary. You can try running the command again.".green());
                } else {
                    eprintln!("This error might be temporary. You can try running the command again.");
                }
            }
        }
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let decode_error = AppError::decode("missing links");
        assert_eq!(decode_error.category(), "DECODE");
        assert!(!decode_error.is_recoverable());
        assert!(decode_error.is_fatal_to_session());
        assert_eq!(decode_error.exit_code(), 1);

        let network_error = AppError::network("Connection failed");
        assert_eq!(network_error.category(), "NETWORK");
        assert!(network_error.is_recoverable());
        assert!(!network_error.is_fatal_to_session());
        assert_eq!(network_error.exit_code(), 2);
    }

    #[test]
    fn test_error_display() {
        let error = AppError::extraction("no links");
        let display = error.to_string();
        assert!(display.contains("Extraction error"));
        assert!(display.contains("no links"));
    }

    #[test]
    fn test_error_categories() {
        let errors = [
            AppError::decode("decode"),
            AppError::extraction("extraction"),
            AppError::Probe(ProbeError::Unreachable("x".into())),
            AppError::render("render"),
            AppError::notification("notify"),
            AppError::config("config"),
            AppError::network("network"),
            AppError::timeout("timeout"),
            AppError::io("io"),
            AppError::parse("parse"),
            AppError::internal("internal"),
        ];

        let expected_categories = [
            "DECODE", "EXTRACTION", "PROBE", "RENDER", "NOTIFY", "CONFIG",
            "NETWORK", "TIMEOUT", "IO", "PARSE", "INTERNAL",
        ];

        for (error, expected) in errors.iter().zip(expected_categories.iter()) {
            assert_eq!(error.category(), *expected);
        }
    }

    #[test]
    fn test_only_batch_preconditions_are_fatal() {
        assert!(AppError::decode("x").is_fatal_to_session());
        assert!(AppError::extraction("x").is_fatal_to_session());
        assert!(!AppError::render("x").is_fatal_to_session());
        assert!(!AppError::notification("x").is_fatal_to_session());
        assert!(!AppError::Probe(ProbeError::Timeout(2)).is_fatal_to_session());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(AppError::config("test").exit_code(), 1);
        assert_eq!(AppError::network("test").exit_code(), 2);
        assert_eq!(AppError::timeout("test").exit_code(), 3);
        assert_eq!(AppError::notification("test").exit_code(), 4);
        assert_eq!(AppError::io("test").exit_code(), 5);
        assert_eq!(AppError::internal("test").exit_code(), 99);
    }

    #[test]
    fn test_user_friendly_messages() {
        let error = AppError::config("Invalid listen address");
        let message = error.user_friendly_message();
        assert!(message.contains("Configuration problem"));
        assert!(message.contains("Suggestion:"));
        assert!(message.contains("Invalid listen address"));
    }

    #[test]
    fn test_error_conversions() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let app_error: AppError = io_error.into();
        assert_eq!(app_error.category(), "IO");

        let parse_error = "not_a_number".parse::<i32>().unwrap_err();
        let app_error: AppError = parse_error.into();
        assert_eq!(app_error.category(), "PARSE");

        let probe_error = ProbeError::Unsupported("vmess".into());
        let app_error: AppError = probe_error.into();
        assert_eq!(app_error.category(), "PROBE");
    }

    #[test]
    fn test_console_formatting() {
        let error = AppError::decode("Test error");
        let formatted_no_color = error.format_for_console(false);
        let formatted_color = error.format_for_console(true);

        assert!(formatted_no_color.contains("[DECODE]"));
        assert!(formatted_color.contains("DECODE"));
        assert!(formatted_no_color.contains("Test error"));
        assert!(formatted_color.contains("Test error"));
    }

    #[test]
    fn test_json_parse_error_conversion() {
        let json_error: serde_json::Error = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let app_error: AppError = json_error.into();
        assert_eq!(app_error.category(), "PARSE");
        assert!(app_error.to_string().contains("JSON parse error"));
    }

    #[test]
    fn test_base64_error_conversion() {
        use base64::Engine;
        let b64_error = base64::engine::general_purpose::STANDARD.decode("!!!").unwrap_err();
        let app_error: AppError = b64_error.into();
        assert_eq!(app_error.category(), "PARSE");
        assert!(app_error.to_string().contains("Base64"));
    }

    #[test]
    fn test_error_reporter_default() {
        let reporter = ErrorReporter::default();
        assert!(reporter.use_color);
        assert!(!reporter.verbose);
        reporter.report_error(&AppError::config("Test error"));
    }
}
