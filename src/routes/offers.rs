use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use super::associations::{association_resource, fetch_association};
use crate::app::AppState;
use crate::auth::CurrentPrincipal;
use crate::authz::{ensure_allowed, Action, Principal};
use crate::errors::{AppError, AppResult};
use crate::models::association::validate_category;
use crate::models::offer::{DbOffer, Offer, OfferCreateRequest, StatusUpdateRequest};
use crate::models::user::UserRole;
use crate::utils::utc_now;

const SELECT_OFFER: &str = "SELECT id, donor_id, association_id, title, description, category, status, created_at, updated_at FROM offers";

#[utoipa::path(
    post,
    path = "/offers",
    tag = "Offers",
    request_body = OfferCreateRequest,
    responses(
        (status = 201, description = "Offer created", body = Offer),
        (status = 403, description = "Only donor users can post offers")
    )
)]
pub async fn create_offer(
    State(state): State<AppState>,
    current: CurrentPrincipal,
    Json(payload): Json<OfferCreateRequest>,
) -> AppResult<(StatusCode, Json<Offer>)> {
    let donor_id = match &current.principal {
        Principal::User(user) if user.role == UserRole::Donor => user.id,
        _ => return Err(AppError::forbidden("insufficient permissions")),
    };

    validate_category(&payload.category)?;
    fetch_association(&state.pool, payload.association_id, false).await?;

    let now = utc_now();
    let offer_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO offers (id, donor_id, association_id, title, description, category, status, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, 'pending', ?, ?)",
    )
    .bind(offer_id.to_string())
    .bind(donor_id.to_string())
    .bind(payload.association_id.to_string())
    .bind(&payload.title)
    .bind(&payload.description)
    .bind(&payload.category)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let offer: Offer = fetch_offer(&state, offer_id).await?.try_into()?;
    Ok((StatusCode::CREATED, Json(offer)))
}

#[utoipa::path(
    get,
    path = "/donor/offers",
    tag = "Offers",
    responses((status = 200, description = "Offers posted by the current user", body = [Offer]))
)]
pub async fn donor_offers(
    State(state): State<AppState>,
    current: CurrentPrincipal,
) -> AppResult<Json<Vec<Offer>>> {
    let user_id = match &current.principal {
        Principal::User(user) => user.id,
        Principal::Association(_) => return Err(AppError::forbidden("insufficient permissions")),
    };

    let rows = sqlx::query_as::<_, DbOffer>(&format!(
        "{SELECT_OFFER} WHERE donor_id = ? ORDER BY created_at DESC"
    ))
    .bind(user_id.to_string())
    .fetch_all(&state.pool)
    .await?;

    rows.into_iter()
        .map(Offer::try_from)
        .collect::<Result<Vec<_>, _>>()
        .map(Json)
}

#[utoipa::path(
    get,
    path = "/associations/{id}/offers",
    tag = "Offers",
    params(("id" = Uuid, Path, description = "Association id")),
    responses((status = 200, description = "Inbound offers for the association", body = [Offer]))
)]
pub async fn association_offers(
    State(state): State<AppState>,
    current: CurrentPrincipal,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<Offer>>> {
    let association = fetch_association(&state.pool, id, false).await?;
    let resource = association_resource(&association)?;
    let decision = state
        .policy
        .authorize(&current.principal, Action::View, &resource)
        .await?;
    ensure_allowed(decision)?;

    let rows = sqlx::query_as::<_, DbOffer>(&format!(
        "{SELECT_OFFER} WHERE association_id = ? ORDER BY created_at DESC"
    ))
    .bind(id.to_string())
    .fetch_all(&state.pool)
    .await?;

    rows.into_iter()
        .map(Offer::try_from)
        .collect::<Result<Vec<_>, _>>()
        .map(Json)
}

#[utoipa::path(
    patch,
    path = "/offers/{id}/status",
    tag = "Offers",
    request_body = StatusUpdateRequest,
    params(("id" = Uuid, Path, description = "Offer id")),
    responses(
        (status = 200, description = "Status updated", body = Offer),
        (status = 403, description = "Association principals only")
    )
)]
pub async fn update_offer_status(
    State(state): State<AppState>,
    current: CurrentPrincipal,
    Path(id): Path<Uuid>,
    Json(payload): Json<StatusUpdateRequest>,
) -> AppResult<Json<Offer>> {
    let offer = fetch_offer(&state, id).await?;
    let association = fetch_association(
        &state.pool,
        crate::utils::parse_uuid(&offer.association_id)?,
        true,
    )
    .await?;
    let resource = association_resource(&association)?;

    // Kind gate: only an association principal may drive offer status, and
    // only for offers addressed to it.
    let decision = state
        .policy
        .authorize(&current.principal, Action::SetDonationStatus, &resource)
        .await?;
    ensure_allowed(decision)?;
    if current.principal.id().to_string() != offer.association_id {
        return Err(AppError::forbidden("insufficient permissions"));
    }

    sqlx::query("UPDATE offers SET status = ?, updated_at = ? WHERE id = ?")
        .bind(payload.status.as_str())
        .bind(utc_now())
        .bind(id.to_string())
        .execute(&state.pool)
        .await?;

    let offer: Offer = fetch_offer(&state, id).await?.try_into()?;
    Ok(Json(offer))
}

async fn fetch_offer(state: &AppState, id: Uuid) -> AppResult<DbOffer> {
    sqlx::query_as::<_, DbOffer>(&format!("{SELECT_OFFER} WHERE id = ?"))
        .bind(id.to_string())
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::not_found("offer not found"))
}
