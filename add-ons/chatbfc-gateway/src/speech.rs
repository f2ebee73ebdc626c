//! Speech synthesis proxy to an OpenAI-compatible `/audio/speech` endpoint.

use async_trait::async_trait;
use chatbfc_core::CoreConfig;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug)]
pub enum SpeechError {
    /// Upstream rejected the request or could not be reached.
    Upstream {
        status: Option<u16>,
        message: String,
    },
}

impl std::fmt::Display for SpeechError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpeechError::Upstream {
                status: Some(status),
                message,
            } => write!(f, "speech API error {}: {}", status, message),
            SpeechError::Upstream { status: None, message } => {
                write!(f, "speech API unreachable: {}", message)
            }
        }
    }
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// MP3 bytes for `text`.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError>;
}

#[derive(Serialize)]
struct SpeechBody<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'a str,
}

pub struct OpenAiSpeech {
    base_url: String,
    api_key: String,
    model: String,
    voice: String,
    client: reqwest::Client,
}

impl OpenAiSpeech {
    pub fn new(config: &CoreConfig, api_key: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            base_url: config.tts_api_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.tts_model.clone(),
            voice: config.tts_voice.clone(),
            client,
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSpeech {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError> {
        let body = SpeechBody {
            model: &self.model,
            voice: &self.voice,
            input: text,
            response_format: "mp3",
        };
        let res = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SpeechError::Upstream {
                status: None,
                message: e.to_string(),
            })?;
        let status = res.status();
        if !status.is_success() {
            let message = res.text().await.unwrap_or_default();
            return Err(SpeechError::Upstream {
                status: Some(status.as_u16()),
                message,
            });
        }
        let bytes = res.bytes().await.map_err(|e| SpeechError::Upstream {
            status: Some(status.as_u16()),
            message: e.to_string(),
        })?;
        Ok(bytes.to_vec())
    }
}
