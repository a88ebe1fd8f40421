use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use lamp_core::RagError;
use lamp_llm::LlmProvider;
use serde::{Deserialize, Serialize};

use super::server::AppState;

#[derive(Debug, Deserialize, Serialize)]
pub struct QueryRequest {
    pub query: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ErrorResponse {
    pub detail: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    indexed_chunks: usize,
}

fn error_response(status: StatusCode, detail: String) -> Response {
    (status, Json(ErrorResponse { detail })).into_response()
}

pub(crate) async fn query_handler<P: LlmProvider + 'static>(
    State(state): State<AppState<P>>,
    request: Result<Json<QueryRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match request {
        Ok(request) => request,
        Err(rejection) => return error_response(rejection.status(), rejection.body_text()),
    };
    match state.service.answer(&request.query).await {
        Ok(answer) => Json(answer).into_response(),
        Err(RagError::EmptyQuery) => {
            error_response(StatusCode::BAD_REQUEST, "query must not be empty".into())
        }
        Err(e) => {
            tracing::error!(error = %e, "query failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("An error occurred while processing the query: {e}"),
            )
        }
    }
}

pub(crate) async fn health_handler<P: LlmProvider + 'static>(
    State(state): State<AppState<P>>,
) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.started_at.elapsed().as_secs(),
        indexed_chunks: state.service.index().len(),
    })
}
