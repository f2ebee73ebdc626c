//! Route handlers and the JSON error body shared by all of them.

use crate::AppState;
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chatbfc_core::{
    grade_answer, heuristic_summary, rubric_feedback, summarize, CoreError, EndRequest,
    EndResponse, Feedback, GradeRequest, PlanRequest, PlanResponse, TtsRequest, MAX_QUESTIONS,
};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Tag every request with a fresh id, echoed in the `x-request-id` response header.
pub async fn assign_request_id(mut request: Request, next: Next) -> Response {
    let id = uuid::Uuid::new_v4().to_string();
    request.extensions_mut().insert(RequestId(id.clone()));
    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    status: StatusCode,
    error: &'static str,
    message: String,
    request_id: String,
}

impl ApiError {
    fn new(
        status: StatusCode,
        error: &'static str,
        message: impl Into<String>,
        id: &RequestId,
    ) -> Self {
        Self {
            status,
            error,
            message: message.into(),
            request_id: id.0.clone(),
        }
    }

    fn from_core(err: CoreError, id: &RequestId) -> Self {
        let (status, code) = match &err {
            CoreError::InvalidSettings(_) | CoreError::InvalidRequest(_) => {
                (StatusCode::BAD_REQUEST, "invalid_request")
            }
            CoreError::NoSeedQuestions(_) => (StatusCode::NOT_FOUND, "no_seed_questions"),
            CoreError::Completion { .. } | CoreError::Parse(_) => {
                (StatusCode::BAD_GATEWAY, "upstream")
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        if status.is_server_error() {
            warn!(
                request_id = %id.0,
                upstream_request_id = err.request_id(),
                error = %err,
                "Request failed"
            );
        }
        Self::new(status, code, err.to_string(), id)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "app_name": state.config.app_name,
        "llm_mode": state.config.llm_mode.label(),
        "question_count": state.bank.len(),
        "tts_available": state.speech.is_some(),
    }))
}

pub async fn plan(
    State(state): State<AppState>,
    Extension(id): Extension<RequestId>,
    Json(req): Json<PlanRequest>,
) -> Result<Json<PlanResponse>, ApiError> {
    if req.firm.trim().is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "firm must not be empty",
            &id,
        ));
    }
    if req.num_questions > MAX_QUESTIONS {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            format!("numQuestions must be between 1 and {}", MAX_QUESTIONS),
            &id,
        ));
    }
    let plan = state.bank.plan(&req).map_err(|e| ApiError::from_core(e, &id))?;
    info!(
        request_id = %id.0,
        firm = %req.firm,
        stage = req.stage.label(),
        planned = plan.plan.len(),
        seed_count = plan.seed_count,
        "Plan served"
    );
    Ok(Json(plan))
}

pub async fn grade(
    State(state): State<AppState>,
    Extension(id): Extension<RequestId>,
    Json(req): Json<GradeRequest>,
) -> Result<Json<Feedback>, ApiError> {
    if req.user_answer.trim().is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "userAnswer must not be empty",
            &id,
        ));
    }
    let feedback = match &state.completion {
        Some(service) => grade_answer(service.as_ref(), &req)
            .await
            .map_err(|e| ApiError::from_core(e, &id))?,
        None => rubric_feedback(&req),
    };
    info!(
        request_id = %id.0,
        question = %req.plan_item.id,
        score = feedback.score,
        "Answer graded"
    );
    Ok(Json(feedback.normalized()))
}

pub async fn end(
    State(state): State<AppState>,
    Extension(id): Extension<RequestId>,
    Json(req): Json<EndRequest>,
) -> Result<Json<EndResponse>, ApiError> {
    let final_summary = match &state.completion {
        Some(service) if !req.conversation.is_empty() => summarize(service.as_ref(), &req)
            .await
            .map_err(|e| ApiError::from_core(e, &id))?,
        _ => heuristic_summary(&req, &[]),
    };
    info!(
        request_id = %id.0,
        asked = req.asked_question_ids.len(),
        turns = req.conversation.len(),
        "Session summarized"
    );
    Ok(Json(EndResponse { final_summary }))
}

pub async fn tts(
    State(state): State<AppState>,
    Extension(id): Extension<RequestId>,
    Json(req): Json<TtsRequest>,
) -> Result<Response, ApiError> {
    let text = req.text.trim();
    if text.is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "text must not be empty",
            &id,
        ));
    }
    let Some(speech) = &state.speech else {
        return Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "tts_unavailable",
            "no speech API key is configured",
            &id,
        ));
    };
    let audio = speech.synthesize(text).await.map_err(|e| {
        warn!(request_id = %id.0, error = %e, "Speech synthesis failed");
        ApiError::new(StatusCode::BAD_GATEWAY, "upstream", e.to_string(), &id)
    })?;
    Ok(([(header::CONTENT_TYPE, "audio/mpeg")], audio).into_response())
}
