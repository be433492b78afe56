//! HTTP surface: `/health` and the `.ics` team feeds.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use logger::{now_iso, EventLogger, FeedFailedEvent, FeedServedEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::feed::{FeedAssembler, FeedError, FeedRequest};

pub const ICS_CONTENT_TYPE: &str = "text/calendar; charset=utf-8";
pub const ICS_CACHE_CONTROL: &str = "s-maxage=300, max-age=120";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub assembler: Arc<FeedAssembler>,
    pub audit: Option<Arc<EventLogger>>,
}

impl AppState {
    pub fn new(assembler: Arc<FeedAssembler>, audit: Option<Arc<EventLogger>>) -> Self {
        Self { assembler, audit }
    }

    fn audit<T: Serialize>(&self, event: &T) {
        if let Some(audit) = &self.audit {
            audit.log_or_warn(event);
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/team/{file}", get(team_feed))
        .route("/team/{id}/{file}", get(team_feed_with_slug))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Standard API error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Any pipeline failure is the upstream's fault from the client's view: 502.
pub struct AppError(FeedError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.0.to_string(),
        });
        (StatusCode::BAD_GATEWAY, body).into_response()
    }
}

impl From<FeedError> for AppError {
    fn from(err: FeedError) -> Self {
        Self(err)
    }
}

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    time: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct FeedQuery {
    pub duration: Option<String>,
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        time: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

/// GET /team/{id}.ics
async fn team_feed(
    State(state): State<AppState>,
    Path(file): Path<String>,
    Query(query): Query<FeedQuery>,
) -> Result<Response, AppError> {
    let Some(team_id) = file.strip_suffix(".ics") else {
        return Ok(StatusCode::NOT_FOUND.into_response());
    };
    let req = FeedRequest {
        team_id: team_id.to_string(),
        slug: None,
        duration: query.duration,
    };
    serve_feed(&state, req).await
}

/// GET /team/{id}/{slug}.ics
async fn team_feed_with_slug(
    State(state): State<AppState>,
    Path((team_id, file)): Path<(String, String)>,
    Query(query): Query<FeedQuery>,
) -> Result<Response, AppError> {
    let Some(slug) = file.strip_suffix(".ics") else {
        return Ok(StatusCode::NOT_FOUND.into_response());
    };
    let req = FeedRequest {
        team_id,
        slug: Some(slug.to_string()),
        duration: query.duration,
    };
    serve_feed(&state, req).await
}

async fn serve_feed(state: &AppState, req: FeedRequest) -> Result<Response, AppError> {
    let started = Instant::now();

    let feed = match state.assembler.build(&req).await {
        Ok(feed) => feed,
        Err(e) => {
            warn!("feed for team {} failed: {}", req.team_id, e);
            state.audit(&FeedFailedEvent {
                ts: now_iso(),
                event: "FEED_FAILED",
                team_id: req.team_id.clone(),
                error: e.to_string(),
            });
            return Err(e.into());
        }
    };

    let elapsed_ms = started.elapsed().as_millis() as u64;
    info!(
        "served {} ({} events, {}min) in {}ms",
        feed.source_url, feed.event_count, feed.duration_minutes, elapsed_ms
    );
    state.audit(&FeedServedEvent {
        ts: now_iso(),
        event: "FEED_SERVED",
        team_id: req.team_id,
        url: feed.source_url.to_string(),
        duration_min: feed.duration_minutes,
        events: feed.event_count,
        elapsed_ms,
    });

    Ok((
        [
            (header::CONTENT_TYPE, ICS_CONTENT_TYPE),
            (header::CACHE_CONTROL, ICS_CACHE_CONTROL),
        ],
        feed.ics,
    )
        .into_response())
}
