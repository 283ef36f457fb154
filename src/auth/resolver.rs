use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use sqlx::SqlitePool;

use super::token::hash_token;
use crate::app::AppState;
use crate::authz::{Principal, PrincipalKind};
use crate::errors::AppError;
use crate::utils::parse_uuid;

/// Resolves a raw bearer token to a live principal. Fails closed: an
/// unknown, revoked, or dangling token and a soft-deleted principal all
/// yield the same `Unauthorized` error.
pub async fn resolve(pool: &SqlitePool, raw_token: &str) -> Result<Principal, AppError> {
    let binding: Option<(String, String)> = sqlx::query_as(
        "SELECT principal_kind, principal_id FROM access_tokens \
         WHERE token_hash = ? AND revoked_at IS NULL",
    )
    .bind(hash_token(raw_token))
    .fetch_optional(pool)
    .await?;

    let (kind, principal_id) = binding.ok_or_else(unauthenticated)?;
    let kind: PrincipalKind = kind.parse()?;
    let principal_id = parse_uuid(&principal_id)?;

    match kind {
        PrincipalKind::User => {
            let role: Option<String> =
                sqlx::query_scalar("SELECT role FROM users WHERE id = ? AND deleted_at IS NULL")
                    .bind(principal_id.to_string())
                    .fetch_optional(pool)
                    .await?;

            let role = role.ok_or_else(unauthenticated)?;
            Ok(Principal::user(principal_id, role.parse()?))
        }
        PrincipalKind::Association => {
            let live: Option<i64> = sqlx::query_scalar(
                "SELECT 1 FROM associations WHERE id = ? AND deleted_at IS NULL",
            )
            .bind(principal_id.to_string())
            .fetch_optional(pool)
            .await?;

            live.ok_or_else(unauthenticated)?;
            Ok(Principal::association(principal_id))
        }
    }
}

fn unauthenticated() -> AppError {
    AppError::unauthorized("unauthenticated")
}

/// The authenticated caller, extracted once per request. Keeps the raw
/// token so logout can revoke exactly the token that was presented.
#[derive(Debug, Clone)]
pub struct CurrentPrincipal {
    pub principal: Principal,
    pub raw_token: String,
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentPrincipal {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| AppError::unauthorized("Authorization header missing"))?;

        let principal = resolve(&state.pool, token).await?;

        Ok(CurrentPrincipal {
            principal,
            raw_token: token.to_string(),
        })
    }
}
