use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use super::auth::fetch_user_by_id;
use crate::app::AppState;
use crate::authz::{ensure_allowed, Action, Resource};
use crate::auth::CurrentPrincipal;
use crate::errors::{AppError, AppResult};
use crate::models::user::{DbUser, User, UserUpdateRequest};
use crate::utils::utc_now;

const SELECT_USER: &str = "SELECT id, first_name, last_name, email, password_hash, phone, address, role, created_at, updated_at, deleted_at FROM users";

#[utoipa::path(
    get,
    path = "/users",
    tag = "Users",
    responses((status = 200, description = "All live users (admin only)", body = [User]))
)]
pub async fn list_users(
    State(state): State<AppState>,
    current: CurrentPrincipal,
) -> AppResult<Json<Vec<User>>> {
    let decision = state
        .policy
        .authorize(&current.principal, Action::View, &Resource::UserDirectory)
        .await?;
    ensure_allowed(decision)?;

    let rows = sqlx::query_as::<_, DbUser>(&format!(
        "{SELECT_USER} WHERE deleted_at IS NULL ORDER BY created_at"
    ))
    .fetch_all(&state.pool)
    .await?;

    rows.into_iter()
        .map(User::try_from)
        .collect::<Result<Vec<_>, _>>()
        .map(Json)
}

#[utoipa::path(
    get,
    path = "/users/deleted/all",
    tag = "Users",
    responses((status = 200, description = "Soft-deleted users (admin only)", body = [User]))
)]
pub async fn deleted_users(
    State(state): State<AppState>,
    current: CurrentPrincipal,
) -> AppResult<Json<Vec<User>>> {
    let decision = state
        .policy
        .authorize(&current.principal, Action::View, &Resource::UserDirectory)
        .await?;
    ensure_allowed(decision)?;

    let rows = sqlx::query_as::<_, DbUser>(&format!(
        "{SELECT_USER} WHERE deleted_at IS NOT NULL ORDER BY deleted_at"
    ))
    .fetch_all(&state.pool)
    .await?;

    rows.into_iter()
        .map(User::try_from)
        .collect::<Result<Vec<_>, _>>()
        .map(Json)
}

#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User id")),
    responses((status = 200, description = "User detail", body = User))
)]
pub async fn get_user(
    State(state): State<AppState>,
    current: CurrentPrincipal,
    Path(id): Path<Uuid>,
) -> AppResult<Json<User>> {
    let decision = state
        .policy
        .authorize(&current.principal, Action::View, &Resource::User { id })
        .await?;
    ensure_allowed(decision)?;

    let user: User = fetch_user_by_id(&state.pool, id).await?.try_into()?;
    Ok(Json(user))
}

#[utoipa::path(
    put,
    path = "/users/{id}",
    tag = "Users",
    request_body = UserUpdateRequest,
    params(("id" = Uuid, Path, description = "User id")),
    responses((status = 200, description = "User updated", body = User))
)]
pub async fn update_user(
    State(state): State<AppState>,
    current: CurrentPrincipal,
    Path(id): Path<Uuid>,
    Json(payload): Json<UserUpdateRequest>,
) -> AppResult<Json<User>> {
    let decision = state
        .policy
        .authorize(&current.principal, Action::Update, &Resource::User { id })
        .await?;
    ensure_allowed(decision)?;

    let existing = fetch_user_by_id(&state.pool, id).await?;

    sqlx::query(
        "UPDATE users SET first_name = ?, last_name = ?, phone = ?, address = ?, updated_at = ? WHERE id = ?",
    )
    .bind(payload.first_name.unwrap_or(existing.first_name))
    .bind(payload.last_name.unwrap_or(existing.last_name))
    .bind(payload.phone.or(existing.phone))
    .bind(payload.address.or(existing.address))
    .bind(utc_now())
    .bind(id.to_string())
    .execute(&state.pool)
    .await?;

    let user: User = fetch_user_by_id(&state.pool, id).await?.try_into()?;
    Ok(Json(user))
}

#[utoipa::path(
    delete,
    path = "/users/{id}",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User id")),
    responses((status = 204, description = "User soft-deleted"))
)]
pub async fn delete_user(
    State(state): State<AppState>,
    current: CurrentPrincipal,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let decision = state
        .policy
        .authorize(&current.principal, Action::Delete, &Resource::User { id })
        .await?;
    ensure_allowed(decision)?;

    // 404 before touching anything so delete is not a probe for existence
    // beyond what View already reveals.
    fetch_user_by_id(&state.pool, id).await?;

    sqlx::query("UPDATE users SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL")
        .bind(utc_now())
        .bind(utc_now())
        .bind(id.to_string())
        .execute(&state.pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/users/{id}/restore",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User id")),
    responses((status = 200, description = "User restored (admin only)", body = User))
)]
pub async fn restore_user(
    State(state): State<AppState>,
    current: CurrentPrincipal,
    Path(id): Path<Uuid>,
) -> AppResult<Json<User>> {
    let decision = state
        .policy
        .authorize(&current.principal, Action::Restore, &Resource::User { id })
        .await?;
    ensure_allowed(decision)?;

    let existing = sqlx::query_as::<_, DbUser>(&format!("{SELECT_USER} WHERE id = ?"))
        .bind(id.to_string())
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))?;

    if existing.deleted_at.is_some() {
        sqlx::query("UPDATE users SET deleted_at = NULL, updated_at = ? WHERE id = ?")
            .bind(utc_now())
            .bind(id.to_string())
            .execute(&state.pool)
            .await?;
    }

    let user: User = fetch_user_by_id(&state.pool, id).await?.try_into()?;
    Ok(Json(user))
}

#[utoipa::path(
    delete,
    path = "/users/{id}/force",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User id")),
    responses((status = 204, description = "User permanently removed (admin only)"))
)]
pub async fn force_delete_user(
    State(state): State<AppState>,
    current: CurrentPrincipal,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let decision = state
        .policy
        .authorize(&current.principal, Action::ForceDelete, &Resource::User { id })
        .await?;
    ensure_allowed(decision)?;

    let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM users WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(&state.pool)
        .await?;
    exists.ok_or_else(|| AppError::not_found("user not found"))?;

    let mut tx = state.pool.begin().await?;
    sqlx::query("DELETE FROM access_tokens WHERE principal_kind = 'user' AND principal_id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM association_members WHERE user_id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}
