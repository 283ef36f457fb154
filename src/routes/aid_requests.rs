use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use super::associations::{association_resource, fetch_association};
use crate::app::AppState;
use crate::auth::CurrentPrincipal;
use crate::authz::{ensure_allowed, Action, Principal};
use crate::errors::{AppError, AppResult};
use crate::models::aid_request::{AidRequest, AidRequestCreateRequest, DbAidRequest};
use crate::models::association::validate_category;
use crate::models::offer::StatusUpdateRequest;
use crate::models::user::UserRole;
use crate::utils::utc_now;

const SELECT_REQUEST: &str = "SELECT id, recipient_id, association_id, title, description, category, status, created_at, updated_at FROM aid_requests";

#[utoipa::path(
    post,
    path = "/requests",
    tag = "AidRequests",
    request_body = AidRequestCreateRequest,
    responses(
        (status = 201, description = "Aid request created", body = AidRequest),
        (status = 403, description = "Only recipient users can post requests")
    )
)]
pub async fn create_request(
    State(state): State<AppState>,
    current: CurrentPrincipal,
    Json(payload): Json<AidRequestCreateRequest>,
) -> AppResult<(StatusCode, Json<AidRequest>)> {
    let recipient_id = match &current.principal {
        Principal::User(user) if user.role == UserRole::Recipient => user.id,
        _ => return Err(AppError::forbidden("insufficient permissions")),
    };

    validate_category(&payload.category)?;
    fetch_association(&state.pool, payload.association_id, false).await?;

    let now = utc_now();
    let request_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO aid_requests (id, recipient_id, association_id, title, description, category, status, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, 'pending', ?, ?)",
    )
    .bind(request_id.to_string())
    .bind(recipient_id.to_string())
    .bind(payload.association_id.to_string())
    .bind(&payload.title)
    .bind(&payload.description)
    .bind(&payload.category)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let request: AidRequest = fetch_request(&state, request_id).await?.try_into()?;
    Ok((StatusCode::CREATED, Json(request)))
}

#[utoipa::path(
    get,
    path = "/recipient/requests",
    tag = "AidRequests",
    responses((status = 200, description = "Requests posted by the current user", body = [AidRequest]))
)]
pub async fn recipient_requests(
    State(state): State<AppState>,
    current: CurrentPrincipal,
) -> AppResult<Json<Vec<AidRequest>>> {
    let user_id = match &current.principal {
        Principal::User(user) => user.id,
        Principal::Association(_) => return Err(AppError::forbidden("insufficient permissions")),
    };

    let rows = sqlx::query_as::<_, DbAidRequest>(&format!(
        "{SELECT_REQUEST} WHERE recipient_id = ? ORDER BY created_at DESC"
    ))
    .bind(user_id.to_string())
    .fetch_all(&state.pool)
    .await?;

    rows.into_iter()
        .map(AidRequest::try_from)
        .collect::<Result<Vec<_>, _>>()
        .map(Json)
}

#[utoipa::path(
    get,
    path = "/associations/{id}/requests",
    tag = "AidRequests",
    params(("id" = Uuid, Path, description = "Association id")),
    responses((status = 200, description = "Inbound requests for the association", body = [AidRequest]))
)]
pub async fn association_requests(
    State(state): State<AppState>,
    current: CurrentPrincipal,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<AidRequest>>> {
    let association = fetch_association(&state.pool, id, false).await?;
    let resource = association_resource(&association)?;
    let decision = state
        .policy
        .authorize(&current.principal, Action::View, &resource)
        .await?;
    ensure_allowed(decision)?;

    let rows = sqlx::query_as::<_, DbAidRequest>(&format!(
        "{SELECT_REQUEST} WHERE association_id = ? ORDER BY created_at DESC"
    ))
    .bind(id.to_string())
    .fetch_all(&state.pool)
    .await?;

    rows.into_iter()
        .map(AidRequest::try_from)
        .collect::<Result<Vec<_>, _>>()
        .map(Json)
}

#[utoipa::path(
    patch,
    path = "/requests/{id}/status",
    tag = "AidRequests",
    request_body = StatusUpdateRequest,
    params(("id" = Uuid, Path, description = "Aid request id")),
    responses(
        (status = 200, description = "Status updated", body = AidRequest),
        (status = 403, description = "Association principals only")
    )
)]
pub async fn update_request_status(
    State(state): State<AppState>,
    current: CurrentPrincipal,
    Path(id): Path<Uuid>,
    Json(payload): Json<StatusUpdateRequest>,
) -> AppResult<Json<AidRequest>> {
    let request = fetch_request(&state, id).await?;
    let association = fetch_association(
        &state.pool,
        crate::utils::parse_uuid(&request.association_id)?,
        true,
    )
    .await?;
    let resource = association_resource(&association)?;

    let decision = state
        .policy
        .authorize(&current.principal, Action::SetDonationStatus, &resource)
        .await?;
    ensure_allowed(decision)?;
    if current.principal.id().to_string() != request.association_id {
        return Err(AppError::forbidden("insufficient permissions"));
    }

    sqlx::query("UPDATE aid_requests SET status = ?, updated_at = ? WHERE id = ?")
        .bind(payload.status.as_str())
        .bind(utc_now())
        .bind(id.to_string())
        .execute(&state.pool)
        .await?;

    let request: AidRequest = fetch_request(&state, id).await?.try_into()?;
    Ok(Json(request))
}

async fn fetch_request(state: &AppState, id: Uuid) -> AppResult<DbAidRequest> {
    sqlx::query_as::<_, DbAidRequest>(&format!("{SELECT_REQUEST} WHERE id = ?"))
        .bind(id.to_string())
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::not_found("aid request not found"))
}
