//! Error types for the ChatBFC turn-taking core

use thiserror::Error;

/// Result type alias for voice operations
pub type VoiceResult<T> = Result<T, VoiceError>;

/// Errors surfaced by the capture, playback and collaborator layers
#[derive(Error, Debug)]
pub enum VoiceError {
    /// The planning collaborator returned no items (or "not found").
    #[error("No questions are available for these settings: {0}")]
    PlanUnavailable(String),

    /// Network failure or non-2xx response from a collaborator.
    #[error("{service} failed{}: {message}{}", status_suffix(.status), request_suffix(.request_id))]
    Upstream {
        service: &'static str,
        status: Option<u16>,
        message: String,
        request_id: Option<String>,
    },

    /// Speech recognition unsupported, permission denied, or no input device.
    #[error("Speech capture unavailable: {0}")]
    Capability(String),

    #[error("Recognition error: {0}")]
    Recognition(String),

    #[error("Audio playback error: {0}")]
    Playback(String),

    #[error("TTS error: {0}")]
    Tts(String),

    #[error("STT error: {0}")]
    Stt(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Channel send error: {0}")]
    ChannelSend(String),

    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Audio stream error: {0}")]
    AudioStream(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

fn request_suffix(request_id: &Option<String>) -> String {
    request_id
        .as_deref()
        .map(|id| format!(" [request id: {}]", id))
        .unwrap_or_default()
}

impl VoiceError {
    pub fn upstream(service: &'static str, message: impl Into<String>) -> Self {
        VoiceError::Upstream {
            service,
            status: None,
            message: message.into(),
            request_id: None,
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        match self {
            VoiceError::Upstream { request_id, .. } => request_id.as_deref(),
            _ => None,
        }
    }
}

#[cfg(feature = "device-audio")]
impl From<cpal::DevicesError> for VoiceError {
    fn from(err: cpal::DevicesError) -> Self {
        VoiceError::AudioDevice(err.to_string())
    }
}

#[cfg(feature = "device-audio")]
impl From<cpal::DefaultStreamConfigError> for VoiceError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        VoiceError::AudioDevice(err.to_string())
    }
}

#[cfg(feature = "device-audio")]
impl From<cpal::BuildStreamError> for VoiceError {
    fn from(err: cpal::BuildStreamError) -> Self {
        VoiceError::AudioStream(err.to_string())
    }
}

#[cfg(feature = "device-audio")]
impl From<cpal::PlayStreamError> for VoiceError {
    fn from(err: cpal::PlayStreamError) -> Self {
        VoiceError::AudioStream(err.to_string())
    }
}
