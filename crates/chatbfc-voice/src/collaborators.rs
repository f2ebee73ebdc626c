//! The network collaborators a session consumes, and their gateway implementation.
//!
//! The state machine only sees the traits. `GatewayClient` implements all four against
//! the ChatBFC gateway's JSON routes and folds the gateway's request id into errors.

use crate::error::{VoiceError, VoiceResult};
use crate::playback::TtsBackend;
use async_trait::async_trait;
use chatbfc_core::{
    EndRequest, EndResponse, Feedback, GradeRequest, PlanRequest, PlanResponse, TtsRequest,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait PlanningService: Send + Sync {
    /// `VoiceError::PlanUnavailable` when no seed questions match.
    async fn fetch_plan(&self, request: &PlanRequest) -> VoiceResult<PlanResponse>;
}

#[async_trait]
pub trait GradingService: Send + Sync {
    async fn grade(&self, request: &GradeRequest) -> VoiceResult<Feedback>;
}

#[async_trait]
pub trait SummaryService: Send + Sync {
    async fn summarize(&self, request: &EndRequest) -> VoiceResult<EndResponse>;
}

/// Everything a session talks to over the network.
#[derive(Clone)]
pub struct Collaborators {
    pub planning: Arc<dyn PlanningService>,
    pub grading: Arc<dyn GradingService>,
    pub summary: Arc<dyn SummaryService>,
    pub tts: Arc<dyn TtsBackend>,
}

impl Collaborators {
    /// All four collaborators served by one gateway.
    pub fn gateway(client: GatewayClient) -> Self {
        let client = Arc::new(client);
        Self {
            planning: client.clone(),
            grading: client.clone(),
            summary: client.clone(),
            tts: client,
        }
    }

    pub fn with_tts(mut self, tts: Arc<dyn TtsBackend>) -> Self {
        self.tts = tts;
        self
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    request_id: Option<String>,
}

/// HTTP client for the ChatBFC gateway.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    base_url: String,
    client: reqwest::Client,
}

impl GatewayClient {
    pub fn new(base_url: &str) -> VoiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| VoiceError::Config(format!("HTTP client build failed: {}", e)))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post(
        &self,
        service: &'static str,
        path: &str,
        body: &(impl Serialize + Sync),
    ) -> VoiceResult<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        let res = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| VoiceError::upstream(service, e.to_string()))?;
        if res.status().is_success() {
            return Ok(res);
        }
        Err(Self::error_from(service, res).await)
    }

    async fn error_from(service: &'static str, res: reqwest::Response) -> VoiceError {
        let status = res.status();
        let header_id = res
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = res.text().await.unwrap_or_default();
        let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
        let message = if !body.message.is_empty() {
            body.message
        } else if !body.error.is_empty() {
            body.error.clone()
        } else if !text.trim().is_empty() {
            text.trim().to_string()
        } else {
            status.canonical_reason().unwrap_or("request failed").to_string()
        };
        let request_id = header_id.or(body.request_id);

        if service == "planning"
            && (status == reqwest::StatusCode::NOT_FOUND || body.error == "no_seed_questions")
        {
            return VoiceError::PlanUnavailable(message);
        }
        VoiceError::Upstream {
            service,
            status: Some(status.as_u16()),
            message,
            request_id,
        }
    }

    async fn post_json<R: DeserializeOwned>(
        &self,
        service: &'static str,
        path: &str,
        body: &(impl Serialize + Sync),
    ) -> VoiceResult<R> {
        let res = self.post(service, path, body).await?;
        let request_id = res
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        res.json::<R>().await.map_err(|e| VoiceError::Upstream {
            service,
            status: None,
            message: format!("invalid response body: {}", e),
            request_id,
        })
    }
}

#[async_trait]
impl PlanningService for GatewayClient {
    async fn fetch_plan(&self, request: &PlanRequest) -> VoiceResult<PlanResponse> {
        let plan: PlanResponse = self.post_json("planning", "/api/v1/plan", request).await?;
        debug!(items = plan.plan.len(), seed_count = plan.seed_count, "Plan received");
        Ok(plan)
    }
}

#[async_trait]
impl GradingService for GatewayClient {
    async fn grade(&self, request: &GradeRequest) -> VoiceResult<Feedback> {
        let feedback: Feedback = self.post_json("grading", "/api/v1/grade", request).await?;
        Ok(feedback.normalized())
    }
}

#[async_trait]
impl SummaryService for GatewayClient {
    async fn summarize(&self, request: &EndRequest) -> VoiceResult<EndResponse> {
        self.post_json("summary", "/api/v1/end", request).await
    }
}

#[async_trait]
impl TtsBackend for GatewayClient {
    async fn synthesize(&self, text: &str) -> VoiceResult<Vec<u8>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let body = TtsRequest {
            text: text.to_string(),
        };
        let res = self
            .post("speech", "/api/v1/tts", &body)
            .await
            .map_err(|e| VoiceError::Tts(e.to_string()))?;
        let bytes = res
            .bytes()
            .await
            .map_err(|e| VoiceError::Tts(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
