use axum::extract::State;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::app::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub service: &'static str,
    pub version: &'static str,
    pub status: &'static str,
    pub db_ok: bool,
    pub db_error: Option<String>,
}

/// Liveness plus a one-row database probe. Always answers 200; a broken
/// database shows up as `status = "degraded"` so the probe itself stays
/// reachable.
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "Health",
    responses((status = 200, description = "Health check", body = HealthResponse))
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let (db_ok, db_error) = match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&state.pool)
        .await
    {
        Ok(_) => (true, None),
        Err(err) => (false, Some(err.to_string())),
    };

    Json(HealthResponse {
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        status: if db_ok { "ok" } else { "degraded" },
        db_ok,
        db_error,
    })
}
