// Copyright 2026 The Dugout Project
// SPDX-License-Identifier: Apache-2.0

// HTTP surface.
//
// Thin glue over the session pipeline:
// - POST /api/{sport}/generate-insights        -> final payload only
// - POST /api/{sport}/generate-insights?stream -> SSE event stream
// - GET  /health                               -> liveness probe
//
// All behavior lives in the stream/repair modules; handlers only translate
// between HTTP and the session entry point. The production source is
// injected via trait object, so tests never touch a real upstream.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;

use crate::payload::{InsightPayload, InsightRequest};
use crate::registry::SessionRegistry;
use crate::source::InsightSource;
use crate::stream::{self, SessionOptions, StreamEvent};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced to HTTP clients.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("unsupported sport \"{0}\"")]
    UnknownSport(String),

    #[error("failed to generate insights: {0}")]
    Generation(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::UnknownSport(_) => StatusCode::BAD_REQUEST,
            ApiError::Generation(_) => StatusCode::BAD_GATEWAY,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

/// Shared state injected into axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub source: Arc<dyn InsightSource>,
    pub registry: Arc<SessionRegistry>,
    pub options: SessionOptions,
    pub supported_sports: Arc<Vec<String>>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct GenerateQuery {
    /// Enable Server-Sent-Events streaming.
    #[serde(default)]
    stream: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub active_sessions: usize,
}

/// Liveness probe.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: Utc::now().to_rfc3339(),
        active_sessions: state.registry.len(),
    })
}

/// Generate insights for a sport, streamed or collected.
pub async fn generate_insights(
    State(state): State<AppState>,
    Path(sport): Path<String>,
    Query(query): Query<GenerateQuery>,
    Json(request): Json<InsightRequest>,
) -> Response {
    let sport = sport.to_lowercase();
    if !state.supported_sports.iter().any(|s| s == &sport) {
        return ApiError::UnknownSport(sport).into_response();
    }

    let events = stream::run_session(
        Arc::clone(&state.source),
        sport,
        request,
        state.options,
        &state.registry,
    )
    .await;

    if query.stream {
        let frames =
            events.map(|event| Ok::<Event, Infallible>(Event::default().data(event.frame())));
        Sse::new(frames).into_response()
    } else {
        match collect_final(events).await {
            Ok(payload) => Json(payload).into_response(),
            Err(e) => e.into_response(),
        }
    }
}

/// Drain a session to completion and keep only its Final payload.
async fn collect_final(
    events: impl Stream<Item = StreamEvent>,
) -> Result<InsightPayload, ApiError> {
    tokio::pin!(events);
    let mut payload = None;
    while let Some(event) = events.next().await {
        match event {
            StreamEvent::Final(p) => payload = Some(p),
            StreamEvent::Error(message) => return Err(ApiError::Generation(message)),
            _ => {}
        }
    }
    payload.ok_or_else(|| ApiError::Generation("session ended without a final payload".to_string()))
}

// ---------------------------------------------------------------------------
// Router construction
// ---------------------------------------------------------------------------

/// Build the axum router. The production source and registry are injected —
/// no side effects, no hard-coded clients.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/:sport/generate-insights", post(generate_insights))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
