//! REST endpoints for assessment sessions and phase actions.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{FlowError, SessionError};

use super::sessions::SessionRegistry;
use super::view::TranscriptView;

/// Shared state for assessment routes.
#[derive(Clone)]
pub struct AssessmentRouteState {
    pub sessions: Arc<SessionRegistry>,
    /// Include raw scoring replies in the transcript.
    pub debug: bool,
}

/// Body of submit and skip requests.
#[derive(Debug, Deserialize)]
pub struct PhaseAnswer {
    #[serde(default)]
    pub text: String,
}

/// Reply to opening a session.
#[derive(Debug, Serialize)]
pub struct SessionOpened {
    pub session_id: Uuid,
    pub transcript: TranscriptView,
}

fn error_body(status: StatusCode, message: String) -> Response {
    (status, Json(serde_json::json!({"error": message}))).into_response()
}

fn flow_error(err: &FlowError) -> Response {
    let status = match err {
        FlowError::PhaseLocked { .. } | FlowError::SkipNotAllowed { .. } => StatusCode::CONFLICT,
        FlowError::UnknownPhase { .. } | FlowError::PhaseNotReached { .. } => {
            StatusCode::BAD_REQUEST
        }
        FlowError::Gateway(_) => StatusCode::BAD_GATEWAY,
    };
    error_body(status, err.to_string())
}

fn session_error(err: &SessionError) -> Response {
    let status = match err {
        SessionError::NotFound { .. } => StatusCode::NOT_FOUND,
        SessionError::LimitReached { .. } => StatusCode::SERVICE_UNAVAILABLE,
        SessionError::Gateway(_) => StatusCode::BAD_GATEWAY,
        SessionError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_body(status, err.to_string())
}

/// POST /api/assessment/sessions
///
/// Opens a session on a fresh conversation thread.
async fn open_session(State(state): State<AssessmentRouteState>) -> Response {
    match state.sessions.open().await {
        Ok((session_id, flow)) => {
            let transcript = flow.lock().await.render(state.debug);
            (
                StatusCode::CREATED,
                Json(SessionOpened {
                    session_id,
                    transcript,
                }),
            )
                .into_response()
        }
        Err(e) => session_error(&e),
    }
}

/// GET /api/assessment/sessions/{id}
///
/// Returns the transcript of every visited phase.
async fn get_transcript(
    State(state): State<AssessmentRouteState>,
    Path(session_id): Path<Uuid>,
) -> Response {
    match state.sessions.get(session_id).await {
        Ok(flow) => Json(flow.lock().await.render(state.debug)).into_response(),
        Err(e) => session_error(&e),
    }
}

/// DELETE /api/assessment/sessions/{id}
async fn close_session(
    State(state): State<AssessmentRouteState>,
    Path(session_id): Path<Uuid>,
) -> Response {
    match state.sessions.close(session_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => session_error(&e),
    }
}

/// POST /api/assessment/sessions/{id}/phases/{index}/submit
async fn submit_phase(
    State(state): State<AssessmentRouteState>,
    Path((session_id, index)): Path<(Uuid, usize)>,
    Json(answer): Json<PhaseAnswer>,
) -> Response {
    let flow = match state.sessions.get(session_id).await {
        Ok(flow) => flow,
        Err(e) => return session_error(&e),
    };
    let mut flow = flow.lock().await;
    match flow.submit(index, &answer.text).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => flow_error(&e),
    }
}

/// POST /api/assessment/sessions/{id}/phases/{index}/skip
async fn skip_phase(
    State(state): State<AssessmentRouteState>,
    Path((session_id, index)): Path<(Uuid, usize)>,
    Json(answer): Json<PhaseAnswer>,
) -> Response {
    let flow = match state.sessions.get(session_id).await {
        Ok(flow) => flow,
        Err(e) => return session_error(&e),
    };
    let mut flow = flow.lock().await;
    match flow.skip(index, &answer.text) {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => flow_error(&e),
    }
}

/// Build the assessment REST routes.
pub fn assessment_routes(state: AssessmentRouteState) -> Router {
    Router::new()
        .route("/api/assessment/sessions", post(open_session))
        .route(
            "/api/assessment/sessions/{id}",
            get(get_transcript).delete(close_session),
        )
        .route(
            "/api/assessment/sessions/{id}/phases/{index}/submit",
            post(submit_phase),
        )
        .route(
            "/api/assessment/sessions/{id}/phases/{index}/skip",
            post(skip_phase),
        )
        .with_state(state)
}
