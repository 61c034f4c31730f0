use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::{debug, error};

use subcount_client::{ErrorResponse, SocialCountsClient, SubsResponse, FROM_CACHE_HEADER};

/// Cache lifetime forwarded upstream when the caller sends none.
const DEFAULT_CACHE_TTL: &str = "5000";

pub struct AppState {
    pub upstream: SocialCountsClient,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { "ok" }))
        .route("/api/subs/{channel_id}", get(api_subs))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

#[derive(Debug, Deserialize)]
pub struct SubsQuery {
    #[serde(rename = "bypassCache")]
    bypass_cache: Option<String>,
    #[serde(rename = "cacheTTL")]
    cache_ttl: Option<String>,
}

impl SubsQuery {
    /// Upstream cache is skipped only for a literal `bypassCache=true`.
    fn use_cache(&self) -> bool {
        self.bypass_cache.as_deref() != Some("true")
    }

    fn cache_ttl(&self) -> &str {
        self.cache_ttl.as_deref().unwrap_or(DEFAULT_CACHE_TTL)
    }
}

pub async fn api_subs(
    State(state): State<Arc<AppState>>,
    Path(channel_id): Path<String>,
    Query(query): Query<SubsQuery>,
) -> Response {
    let use_cache = query.use_cache();
    match state
        .upstream
        .live_subscriber_count(&channel_id, use_cache, query.cache_ttl())
        .await
    {
        Ok(count) => {
            debug!(
                channel_id = %channel_id,
                count = count.est_sub,
                from_cache = count.from_cache,
                "Served count"
            );
            let from_cache = if count.from_cache { "true" } else { "false" };
            (
                [(FROM_CACHE_HEADER, from_cache)],
                Json(SubsResponse {
                    subscriber_count: count.est_sub,
                    from_cache: Some(count.from_cache),
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!(channel_id = %channel_id, error = %e, "Error fetching subscriber count");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Failed to fetch subscriber count".to_string(),
                }),
            )
                .into_response()
        }
    }
}
