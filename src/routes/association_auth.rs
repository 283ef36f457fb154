use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::auth::issue;
use crate::authz::PrincipalKind;
use crate::errors::{AppError, AppResult};
use crate::models::association::{
    validate_category, Association, AssociationAuthResponse, AssociationLoginRequest,
    AssociationRegisterRequest, DbAssociation,
};
use crate::utils::{hash_password, utc_now, verify_password};

const DEFAULT_DEVICE: &str = "association_token";

#[utoipa::path(
    post,
    path = "/association/register",
    tag = "AssociationAuth",
    request_body = AssociationRegisterRequest,
    responses(
        (status = 201, description = "Association registered", body = AssociationAuthResponse),
        (status = 400, description = "Invalid category, owner, or weak password"),
        (status = 409, description = "Email already in use")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<AssociationRegisterRequest>,
) -> AppResult<(StatusCode, Json<AssociationAuthResponse>)> {
    validate_category(&payload.category)?;
    ensure_email_available(&state.pool, &payload.email).await?;

    if let Some(owner_id) = payload.owner_user_id {
        let owner: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM users WHERE id = ? AND deleted_at IS NULL")
                .bind(owner_id.to_string())
                .fetch_optional(&state.pool)
                .await?;
        if owner.is_none() {
            return Err(AppError::bad_request("owner user does not exist"));
        }
    }

    let password_hash = hash_password(&payload.password)?;
    let now = utc_now();
    let association_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO associations (id, name, email, password_hash, phone, address, description, category, logo_url, owner_user_id, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(association_id.to_string())
    .bind(&payload.name)
    .bind(&payload.email)
    .bind(password_hash)
    .bind(&payload.phone)
    .bind(&payload.address)
    .bind(&payload.description)
    .bind(&payload.category)
    .bind(&payload.logo_url)
    .bind(payload.owner_user_id.map(|id| id.to_string()))
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let association: Association =
        super::associations::fetch_association(&state.pool, association_id, false)
            .await?
            .try_into()?;
    let issued = issue(
        &state.pool,
        PrincipalKind::Association,
        association.id,
        DEFAULT_DEVICE,
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(AssociationAuthResponse {
            token: issued.token,
            association,
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/association/login",
    tag = "AssociationAuth",
    request_body = AssociationLoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AssociationAuthResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<AssociationLoginRequest>,
) -> AppResult<Json<AssociationAuthResponse>> {
    let db_association = sqlx::query_as::<_, DbAssociation>(
        "SELECT id, name, email, password_hash, phone, address, description, category, logo_url, owner_user_id, created_at, updated_at, deleted_at \
         FROM associations WHERE email = ? AND deleted_at IS NULL",
    )
    .bind(&payload.email)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::unauthorized("invalid credentials"))?;

    if !verify_password(&payload.password, &db_association.password_hash)? {
        return Err(AppError::unauthorized("invalid credentials"));
    }

    let association: Association = db_association.try_into()?;
    let device = payload.device_name.as_deref().unwrap_or(DEFAULT_DEVICE);
    let issued = issue(&state.pool, PrincipalKind::Association, association.id, device).await?;

    Ok(Json(AssociationAuthResponse {
        token: issued.token,
        association,
    }))
}

async fn ensure_email_available(pool: &SqlitePool, email: &str) -> AppResult<()> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(1) FROM associations WHERE email = ? AND deleted_at IS NULL",
    )
    .bind(email)
    .fetch_one(pool)
    .await?;

    if count > 0 {
        return Err(AppError::conflict("email already in use"));
    }

    Ok(())
}
