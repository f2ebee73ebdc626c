//! Error types shared by the ChatBFC core crate.

use thiserror::Error;

/// Result type alias for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by the question bank, completion service and response reshaping.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("No seed questions match the requested filter: {0}")]
    NoSeedQuestions(String),

    #[error("Question bank error: {0}")]
    QuestionBank(String),

    #[error("Completion API error{}: {message}", status_suffix(.status))]
    Completion {
        status: Option<u16>,
        message: String,
        request_id: Option<String>,
    },

    #[error("Could not parse model output: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" {}", s)).unwrap_or_default()
}

impl CoreError {
    /// Upstream request identifier, when the failing call returned one.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            CoreError::Completion { request_id, .. } => request_id.as_deref(),
            _ => None,
        }
    }
}

impl From<config::ConfigError> for CoreError {
    fn from(err: config::ConfigError) -> Self {
        CoreError::Config(err.to_string())
    }
}

impl From<toml::de::Error> for CoreError {
    fn from(err: toml::de::Error) -> Self {
        CoreError::QuestionBank(err.to_string())
    }
}
