use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use sqlx::SqlitePool;
use utoipa::ToSchema;
use uuid::Uuid;

use super::MessageResponse;
use crate::app::AppState;
use crate::auth::{issue, revoke, CurrentPrincipal};
use crate::authz::{Principal, PrincipalKind};
use crate::errors::{AppError, AppResult};
use crate::models::association::Association;
use crate::models::user::{AuthResponse, DbUser, LoginRequest, RegisterRequest, User, UserRole};
use crate::utils::{hash_password, utc_now, verify_password};

const DEFAULT_DEVICE: &str = "api_token";

/// `/auth/me` serves whichever principal kind presented the token.
#[derive(Debug, Serialize, ToSchema)]
#[serde(untagged)]
pub enum MeResponse {
    User(User),
    Association(Association),
}

#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = AuthResponse),
        (status = 400, description = "Invalid role or weak password"),
        (status = 409, description = "Email already in use")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    if payload.role == UserRole::Admin {
        return Err(AppError::bad_request("admin accounts cannot self-register"));
    }

    ensure_email_available(&state.pool, &payload.email).await?;

    let password_hash = hash_password(&payload.password)?;
    let now = utc_now();
    let user_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO users (id, first_name, last_name, email, password_hash, phone, address, role, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(user_id.to_string())
    .bind(&payload.first_name)
    .bind(&payload.last_name)
    .bind(&payload.email)
    .bind(password_hash)
    .bind(&payload.phone)
    .bind(&payload.address)
    .bind(payload.role.as_str())
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let user: User = fetch_user_by_id(&state.pool, user_id).await?.try_into()?;
    let issued = issue(&state.pool, PrincipalKind::User, user.id, DEFAULT_DEVICE).await?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token: issued.token,
            user,
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let db_user = sqlx::query_as::<_, DbUser>(
        "SELECT id, first_name, last_name, email, password_hash, phone, address, role, created_at, updated_at, deleted_at \
         FROM users WHERE email = ? AND deleted_at IS NULL",
    )
    .bind(&payload.email)
    .fetch_optional(&state.pool)
    .await?
    // Same answer for unknown email and wrong password.
    .ok_or_else(|| AppError::unauthorized("invalid credentials"))?;

    if !verify_password(&payload.password, &db_user.password_hash)? {
        return Err(AppError::unauthorized("invalid credentials"));
    }

    let user: User = db_user.try_into()?;
    let device = payload.device_name.as_deref().unwrap_or(DEFAULT_DEVICE);
    let issued = issue(&state.pool, PrincipalKind::User, user.id, device).await?;

    Ok(Json(AuthResponse {
        token: issued.token,
        user,
    }))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Auth",
    responses((status = 200, description = "Current principal", body = MeResponse))
)]
pub async fn me(State(state): State<AppState>, current: CurrentPrincipal) -> AppResult<Json<MeResponse>> {
    match current.principal {
        Principal::User(identity) => {
            let user: User = fetch_user_by_id(&state.pool, identity.id).await?.try_into()?;
            Ok(Json(MeResponse::User(user)))
        }
        Principal::Association(identity) => {
            let association =
                super::associations::fetch_association(&state.pool, identity.id, false).await?;
            Ok(Json(MeResponse::Association(association.try_into()?)))
        }
    }
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "Auth",
    responses((status = 200, description = "Token revoked"))
)]
pub async fn logout(
    State(state): State<AppState>,
    current: CurrentPrincipal,
) -> AppResult<Json<MessageResponse>> {
    revoke(&state.pool, &current.raw_token).await?;
    Ok(Json(MessageResponse::new("Logged out")))
}

async fn ensure_email_available(pool: &SqlitePool, email: &str) -> AppResult<()> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE email = ? AND deleted_at IS NULL")
            .bind(email)
            .fetch_one(pool)
            .await?;

    if count > 0 {
        return Err(AppError::conflict("email already in use"));
    }

    Ok(())
}

pub(crate) async fn fetch_user_by_id(pool: &SqlitePool, user_id: Uuid) -> AppResult<DbUser> {
    sqlx::query_as::<_, DbUser>(
        "SELECT id, first_name, last_name, email, password_hash, phone, address, role, created_at, updated_at, deleted_at \
         FROM users WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(user_id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("user not found"))
}
