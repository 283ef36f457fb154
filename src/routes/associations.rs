use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::auth::CurrentPrincipal;
use crate::authz::{ensure_allowed, Action, Resource};
use crate::errors::{AppError, AppResult};
use crate::models::association::{
    validate_category, Association, AssociationUpdateRequest, DbAssociation,
};
use crate::models::membership::{AddMemberRequest, AssociationMember, DbAssociationMember};
use crate::utils::utc_now;

const SELECT_ASSOCIATION: &str = "SELECT id, name, email, password_hash, phone, address, description, category, logo_url, owner_user_id, created_at, updated_at, deleted_at FROM associations";

/// Loads an association row by id. With `include_deleted = false` a
/// soft-deleted association is reported as not found.
pub(crate) async fn fetch_association(
    pool: &SqlitePool,
    id: Uuid,
    include_deleted: bool,
) -> AppResult<DbAssociation> {
    let filter = if include_deleted {
        "WHERE id = ?"
    } else {
        "WHERE id = ? AND deleted_at IS NULL"
    };

    sqlx::query_as::<_, DbAssociation>(&format!("{SELECT_ASSOCIATION} {filter}"))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("association not found"))
}

/// Builds the policy resource for an association row.
pub(crate) fn association_resource(db: &DbAssociation) -> AppResult<Resource> {
    Ok(Resource::Association {
        id: crate::utils::parse_uuid(&db.id)?,
        owner_user_id: db
            .owner_user_id
            .as_deref()
            .map(crate::utils::parse_uuid)
            .transpose()?,
    })
}

#[utoipa::path(
    get,
    path = "/associations",
    tag = "Associations",
    responses((status = 200, description = "Association directory", body = [Association]))
)]
pub async fn list_associations(
    State(state): State<AppState>,
    _current: CurrentPrincipal,
) -> AppResult<Json<Vec<Association>>> {
    let rows = sqlx::query_as::<_, DbAssociation>(&format!(
        "{SELECT_ASSOCIATION} WHERE deleted_at IS NULL ORDER BY name"
    ))
    .fetch_all(&state.pool)
    .await?;

    rows.into_iter()
        .map(Association::try_from)
        .collect::<Result<Vec<_>, _>>()
        .map(Json)
}

#[utoipa::path(
    get,
    path = "/associations/{id}",
    tag = "Associations",
    params(("id" = Uuid, Path, description = "Association id")),
    responses((status = 200, description = "Association detail", body = Association))
)]
pub async fn get_association(
    State(state): State<AppState>,
    _current: CurrentPrincipal,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Association>> {
    let association: Association = fetch_association(&state.pool, id, false).await?.try_into()?;
    Ok(Json(association))
}

#[utoipa::path(
    put,
    path = "/associations/{id}",
    tag = "Associations",
    request_body = AssociationUpdateRequest,
    params(("id" = Uuid, Path, description = "Association id")),
    responses((status = 200, description = "Association updated", body = Association))
)]
pub async fn update_association(
    State(state): State<AppState>,
    current: CurrentPrincipal,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssociationUpdateRequest>,
) -> AppResult<Json<Association>> {
    let existing = fetch_association(&state.pool, id, false).await?;
    let resource = association_resource(&existing)?;
    let decision = state
        .policy
        .authorize(&current.principal, Action::Update, &resource)
        .await?;
    ensure_allowed(decision)?;

    validate_category(&payload.category)?;

    sqlx::query(
        "UPDATE associations SET name = ?, phone = ?, address = ?, description = ?, category = ?, logo_url = ?, updated_at = ? WHERE id = ?",
    )
    .bind(payload.name.unwrap_or(existing.name))
    .bind(payload.phone.or(existing.phone))
    .bind(payload.address.or(existing.address))
    .bind(payload.description.or(existing.description))
    .bind(payload.category.or(existing.category))
    .bind(payload.logo_url.or(existing.logo_url))
    .bind(utc_now())
    .bind(id.to_string())
    .execute(&state.pool)
    .await?;

    let association: Association = fetch_association(&state.pool, id, false).await?.try_into()?;
    Ok(Json(association))
}

#[utoipa::path(
    delete,
    path = "/associations/{id}",
    tag = "Associations",
    params(("id" = Uuid, Path, description = "Association id")),
    responses((status = 204, description = "Association soft-deleted"))
)]
pub async fn delete_association(
    State(state): State<AppState>,
    current: CurrentPrincipal,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let existing = fetch_association(&state.pool, id, false).await?;
    let resource = association_resource(&existing)?;
    let decision = state
        .policy
        .authorize(&current.principal, Action::Delete, &resource)
        .await?;
    ensure_allowed(decision)?;

    sqlx::query(
        "UPDATE associations SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(utc_now())
    .bind(utc_now())
    .bind(id.to_string())
    .execute(&state.pool)
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/associations/trashed/all",
    tag = "Associations",
    responses((status = 200, description = "Soft-deleted associations (admin only)", body = [Association]))
)]
pub async fn deleted_associations(
    State(state): State<AppState>,
    current: CurrentPrincipal,
) -> AppResult<Json<Vec<Association>>> {
    let decision = state
        .policy
        .authorize(&current.principal, Action::View, &Resource::AssociationDirectory)
        .await?;
    ensure_allowed(decision)?;

    let rows = sqlx::query_as::<_, DbAssociation>(&format!(
        "{SELECT_ASSOCIATION} WHERE deleted_at IS NOT NULL ORDER BY deleted_at"
    ))
    .fetch_all(&state.pool)
    .await?;

    rows.into_iter()
        .map(Association::try_from)
        .collect::<Result<Vec<_>, _>>()
        .map(Json)
}

#[utoipa::path(
    post,
    path = "/associations/{id}/restore",
    tag = "Associations",
    params(("id" = Uuid, Path, description = "Association id")),
    responses((status = 200, description = "Association restored (admin only)", body = Association))
)]
pub async fn restore_association(
    State(state): State<AppState>,
    current: CurrentPrincipal,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Association>> {
    let existing = fetch_association(&state.pool, id, true).await?;
    let resource = association_resource(&existing)?;
    let decision = state
        .policy
        .authorize(&current.principal, Action::Restore, &resource)
        .await?;
    ensure_allowed(decision)?;

    if existing.deleted_at.is_some() {
        sqlx::query("UPDATE associations SET deleted_at = NULL, updated_at = ? WHERE id = ?")
            .bind(utc_now())
            .bind(id.to_string())
            .execute(&state.pool)
            .await?;
    }

    let association: Association = fetch_association(&state.pool, id, false).await?.try_into()?;
    Ok(Json(association))
}

#[utoipa::path(
    delete,
    path = "/associations/{id}/force",
    tag = "Associations",
    params(("id" = Uuid, Path, description = "Association id")),
    responses((status = 204, description = "Association permanently removed (admin only)"))
)]
pub async fn force_delete_association(
    State(state): State<AppState>,
    current: CurrentPrincipal,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let existing = fetch_association(&state.pool, id, true).await?;
    let resource = association_resource(&existing)?;
    let decision = state
        .policy
        .authorize(&current.principal, Action::ForceDelete, &resource)
        .await?;
    ensure_allowed(decision)?;

    let mut tx = state.pool.begin().await?;
    sqlx::query("DELETE FROM access_tokens WHERE principal_kind = 'association' AND principal_id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM association_members WHERE association_id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM associations WHERE id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/associations/{id}/members",
    tag = "Associations",
    params(("id" = Uuid, Path, description = "Association id")),
    responses((status = 200, description = "Association members", body = [AssociationMember]))
)]
pub async fn list_members(
    State(state): State<AppState>,
    current: CurrentPrincipal,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<AssociationMember>>> {
    let existing = fetch_association(&state.pool, id, false).await?;
    let resource = association_resource(&existing)?;
    let decision = state
        .policy
        .authorize(&current.principal, Action::ManageMembers, &resource)
        .await?;
    ensure_allowed(decision)?;

    let rows = sqlx::query_as::<_, DbAssociationMember>(
        "SELECT association_id, user_id, role, created_at FROM association_members WHERE association_id = ? ORDER BY created_at",
    )
    .bind(id.to_string())
    .fetch_all(&state.pool)
    .await?;

    rows.into_iter()
        .map(AssociationMember::try_from)
        .collect::<Result<Vec<_>, _>>()
        .map(Json)
}

#[utoipa::path(
    post,
    path = "/associations/{id}/members",
    tag = "Associations",
    request_body = AddMemberRequest,
    params(("id" = Uuid, Path, description = "Association id")),
    responses((status = 201, description = "Member added", body = AssociationMember))
)]
pub async fn add_member(
    State(state): State<AppState>,
    current: CurrentPrincipal,
    Path(id): Path<Uuid>,
    Json(payload): Json<AddMemberRequest>,
) -> AppResult<(StatusCode, Json<AssociationMember>)> {
    let existing = fetch_association(&state.pool, id, false).await?;
    let resource = association_resource(&existing)?;
    let decision = state
        .policy
        .authorize(&current.principal, Action::ManageMembers, &resource)
        .await?;
    ensure_allowed(decision)?;

    let user_exists: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM users WHERE id = ? AND deleted_at IS NULL")
            .bind(payload.user_id.to_string())
            .fetch_optional(&state.pool)
            .await?;
    user_exists.ok_or_else(|| AppError::bad_request("user does not exist"))?;

    sqlx::query(
        "INSERT INTO association_members (association_id, user_id, role, created_at) VALUES (?, ?, ?, ?) \
         ON CONFLICT (association_id, user_id) DO UPDATE SET role = excluded.role",
    )
    .bind(id.to_string())
    .bind(payload.user_id.to_string())
    .bind(payload.role.as_str())
    .bind(utc_now())
    .execute(&state.pool)
    .await?;

    let member: AssociationMember = sqlx::query_as::<_, DbAssociationMember>(
        "SELECT association_id, user_id, role, created_at FROM association_members WHERE association_id = ? AND user_id = ?",
    )
    .bind(id.to_string())
    .bind(payload.user_id.to_string())
    .fetch_one(&state.pool)
    .await?
    .try_into()?;

    Ok((StatusCode::CREATED, Json(member)))
}

#[utoipa::path(
    delete,
    path = "/associations/{id}/members/{user_id}",
    tag = "Associations",
    params(
        ("id" = Uuid, Path, description = "Association id"),
        ("user_id" = Uuid, Path, description = "User id")
    ),
    responses((status = 204, description = "Member removed"))
)]
pub async fn remove_member(
    State(state): State<AppState>,
    current: CurrentPrincipal,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    let existing = fetch_association(&state.pool, id, false).await?;
    let resource = association_resource(&existing)?;
    let decision = state
        .policy
        .authorize(&current.principal, Action::ManageMembers, &resource)
        .await?;
    ensure_allowed(decision)?;

    sqlx::query("DELETE FROM association_members WHERE association_id = ? AND user_id = ?")
        .bind(id.to_string())
        .bind(user_id.to_string())
        .execute(&state.pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
