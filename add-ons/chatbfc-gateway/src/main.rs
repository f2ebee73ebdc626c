//! Axum gateway for ChatBFC: planning, grading, end-of-session summaries and speech
//! synthesis over JSON/HTTP. Config-driven via `CoreConfig`.

mod routes;
mod speech;

use anyhow::Context;
use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use chatbfc_core::{CompletionService, CoreConfig, LlmMode, OpenRouterCompletion, QuestionBank};
use speech::{OpenAiSpeech, SpeechSynthesizer};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Clone)]
pub(crate) struct AppState {
    pub config: Arc<CoreConfig>,
    pub bank: Arc<QuestionBank>,
    /// `None` in mock mode: rubric grading and feedback-derived summaries.
    pub completion: Option<Arc<dyn CompletionService>>,
    /// `None` when no speech API key is configured.
    pub speech: Option<Arc<dyn SpeechSynthesizer>>,
}

impl AppState {
    fn from_config(config: CoreConfig) -> anyhow::Result<Self> {
        let bank = QuestionBank::load_or_builtin(config.question_bank_path())
            .context("loading question bank")?;
        info!(seeds = bank.len(), "Question bank loaded");

        let completion: Option<Arc<dyn CompletionService>> = match config.llm_mode {
            LlmMode::Mock => None,
            LlmMode::Openrouter => {
                let key = CoreConfig::llm_api_key().context(
                    "llm_mode=openrouter requires CHATBFC_LLM_API_KEY or OPENROUTER_API_KEY",
                )?;
                Some(Arc::new(OpenRouterCompletion::new(key)?.with_model(&config.llm_model)))
            }
        };

        let speech: Option<Arc<dyn SpeechSynthesizer>> = match CoreConfig::tts_api_key() {
            Some(key) => Some(Arc::new(OpenAiSpeech::new(&config, key)?)),
            None => {
                warn!("No TTS_API_KEY or OPENAI_API_KEY; /api/v1/tts will answer 503");
                None
            }
        };

        Ok(Self {
            config: Arc::new(config),
            bank: Arc::new(bank),
            completion,
            speech,
        })
    }
}

fn build_app(state: AppState) -> Router {
    // Local practice clients only.
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(|origin: &axum::http::HeaderValue, _| {
            let s = origin.to_str().unwrap_or("");
            s.starts_with("http://localhost:") || s.starts_with("http://127.0.0.1:")
        }))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any)
        .expose_headers([axum::http::HeaderName::from_static(routes::REQUEST_ID_HEADER)]);

    Router::new()
        .route("/api/v1/health", get(routes::health))
        .route("/api/v1/plan", post(routes::plan))
        .route("/api/v1/grade", post(routes::grade))
        .route("/api/v1/end", post(routes::end))
        .route("/api/v1/tts", post(routes::tts))
        .with_state(state)
        .layer(axum::middleware::from_fn(routes::assign_request_id))
        .layer(cors)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[chatbfc-gateway] .env not loaded: {} (using system environment)", e);
    }
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = CoreConfig::load().context("loading gateway config")?;
    let port = config.port;
    info!(
        app_name = %config.app_name,
        llm_mode = config.llm_mode.label(),
        port,
        "Starting gateway"
    );
    let app = build_app(AppState::from_config(config)?);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("Gateway listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::SpeechError;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chatbfc_core::CannedCompletion;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn test_config() -> CoreConfig {
        CoreConfig {
            app_name: "Test Gateway".to_string(),
            port: 8010,
            llm_mode: LlmMode::Mock,
            llm_model: "test-model".to_string(),
            question_bank_path: None,
            tts_model: "tts-1".to_string(),
            tts_voice: "alloy".to_string(),
            tts_api_url: "http://127.0.0.1:9".to_string(),
        }
    }

    fn test_state() -> AppState {
        AppState {
            config: Arc::new(test_config()),
            bank: Arc::new(QuestionBank::builtin().unwrap()),
            completion: None,
            speech: None,
        }
    }

    struct FixedSpeech(Result<Vec<u8>, u16>);

    #[async_trait]
    impl SpeechSynthesizer for FixedSpeech {
        async fn synthesize(&self, _text: &str) -> Result<Vec<u8>, SpeechError> {
            self.0.clone().map_err(|status| SpeechError::Upstream {
                status: Some(status),
                message: "quota exceeded".to_string(),
            })
        }
    }

    async fn post(app: Router, uri: &str, body: Value) -> (StatusCode, Option<String>, Vec<u8>) {
        let req = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let request_id = res
            .headers()
            .get(routes::REQUEST_ID_HEADER)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, request_id, bytes.to_vec())
    }

    fn plan_item() -> Value {
        json!({
            "id": "tech-dcf",
            "type": "technical",
            "question": "Walk me through a DCF.",
            "rubric": ["free cash flow", "discount rate", "terminal value"],
            "idealAnswerOutline": [
                "Project free cash flow",
                "Discount at WACC",
                "Add terminal value"
            ]
        })
    }

    #[tokio::test]
    async fn health_reports_mode_and_request_id() {
        let app = build_app(test_state());
        let req = Request::builder()
            .uri("/api/v1/health")
            .body(Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers().contains_key(routes::REQUEST_ID_HEADER));
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["llm_mode"], "mock");
        assert_eq!(json["tts_available"], false);
    }

    #[tokio::test]
    async fn plan_returns_requested_number_of_items() {
        let (status, _, body) = post(
            build_app(test_state()),
            "/api/v1/plan",
            json!({"firm": "Goldman Sachs", "stage": "first_round", "numQuestions": 3}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["plan"].as_array().unwrap().len(), 3);
        assert!(json["seedCount"].as_u64().unwrap() >= 3);
    }

    #[tokio::test]
    async fn plan_without_matches_is_not_found() {
        let state = AppState {
            bank: Arc::new(QuestionBank::new(vec![])),
            ..test_state()
        };
        let (status, request_id, body) = post(
            build_app(state),
            "/api/v1/plan",
            json!({"firm": "Lazard", "stage": "superday"}),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "no_seed_questions");
        assert_eq!(json["request_id"].as_str(), request_id.as_deref());
    }

    #[tokio::test]
    async fn plan_rejects_bad_settings() {
        let app = build_app(test_state());
        let (status, _, _) = post(
            app.clone(),
            "/api/v1/plan",
            json!({"firm": "Evercore", "stage": "first_round", "numQuestions": 0}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _, _) = post(
            app,
            "/api/v1/plan",
            json!({"firm": "Evercore", "stage": "first_round", "numQuestions": 40}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn mock_grading_scores_rubric_coverage() {
        let (status, _, body) = post(
            build_app(test_state()),
            "/api/v1/grade",
            json!({
                "planItem": plan_item(),
                "userAnswer": "I would project unlevered free cash flow for five years, \
                    pick a discount rate from WACC, add a terminal value and discount \
                    everything back to today.",
                "firm": "Evercore",
                "stage": "first_round"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let feedback: Value = serde_json::from_slice(&body).unwrap();
        let score = feedback["score"].as_u64().unwrap();
        assert!(score > 4 && score <= 10, "score {}", score);
    }

    #[tokio::test]
    async fn grading_rejects_empty_answer() {
        let (status, _, body) = post(
            build_app(test_state()),
            "/api/v1/grade",
            json!({
                "planItem": plan_item(),
                "userAnswer": "  ",
                "firm": "Evercore",
                "stage": "first_round"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "invalid_request");
    }

    #[tokio::test]
    async fn unparseable_model_output_is_bad_gateway() {
        let state = AppState {
            completion: Some(Arc::new(CannedCompletion::new(["I cannot grade that."]))),
            ..test_state()
        };
        let (status, _, body) = post(
            build_app(state),
            "/api/v1/grade",
            json!({
                "planItem": plan_item(),
                "userAnswer": "Discount the cash flows.",
                "firm": "Evercore",
                "stage": "first_round"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "upstream");
    }

    #[tokio::test]
    async fn end_summarizes_through_the_model() {
        let state = AppState {
            completion: Some(Arc::new(CannedCompletion::new([
                "  Solid technicals; tighten your story.  ",
            ]))),
            ..test_state()
        };
        let (status, _, body) = post(
            build_app(state),
            "/api/v1/end",
            json!({
                "settings": {"firm": "Evercore", "stage": "first_round"},
                "askedQuestionIds": ["tech-dcf"],
                "conversation": [
                    {"role": "interviewer", "content": "Walk me through a DCF."},
                    {"role": "user", "content": "Project cash flows and discount them."}
                ]
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["finalSummary"], "Solid technicals; tighten your story.");
    }

    #[tokio::test]
    async fn tts_without_key_is_unavailable() {
        let (status, _, body) = post(
            build_app(test_state()),
            "/api/v1/tts",
            json!({"text": "Walk me through a DCF."}),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "tts_unavailable");
    }

    #[tokio::test]
    async fn tts_returns_audio_or_bad_gateway() {
        let state = AppState {
            speech: Some(Arc::new(FixedSpeech(Ok(vec![0xff, 0xfb, 0x90])))),
            ..test_state()
        };
        let app = build_app(state);
        let (status, _, body) = post(app.clone(), "/api/v1/tts", json!({"text": "Hello"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, vec![0xff, 0xfb, 0x90]);
        let (status, _, _) = post(app, "/api/v1/tts", json!({"text": "   "})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let failing = AppState {
            speech: Some(Arc::new(FixedSpeech(Err(429)))),
            ..test_state()
        };
        let (status, _, body) =
            post(build_app(failing), "/api/v1/tts", json!({"text": "Hello"})).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert!(json["message"].as_str().unwrap().contains("429"));
    }
}
