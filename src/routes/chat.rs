use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use super::associations::fetch_association;
use crate::app::AppState;
use crate::auth::CurrentPrincipal;
use crate::authz::{ensure_allowed, Action, Principal, PrincipalKind, Resource};
use crate::errors::{AppError, AppResult};
use crate::models::message::{DbMessage, Message, SendMessageRequest};
use crate::utils::utc_now;

const SELECT_MESSAGE: &str = "SELECT id, sender_kind, sender_id, recipient_kind, recipient_id, body, read_at, created_at FROM messages";

#[utoipa::path(
    post,
    path = "/chat/association/{id}/send",
    tag = "Chat",
    request_body = SendMessageRequest,
    params(("id" = Uuid, Path, description = "Association id")),
    responses((status = 201, description = "Message sent", body = Message))
)]
pub async fn send_to_association(
    State(state): State<AppState>,
    current: CurrentPrincipal,
    Path(id): Path<Uuid>,
    Json(payload): Json<SendMessageRequest>,
) -> AppResult<(StatusCode, Json<Message>)> {
    let sender_id = match &current.principal {
        Principal::User(user) => user.id,
        Principal::Association(_) => return Err(AppError::forbidden("insufficient permissions")),
    };

    fetch_association(&state.pool, id, false).await?;

    let message = insert_message(
        &state,
        PrincipalKind::User,
        sender_id,
        PrincipalKind::Association,
        id,
        &payload.body,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

#[utoipa::path(
    post,
    path = "/chat/user/{id}/send",
    tag = "Chat",
    request_body = SendMessageRequest,
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 201, description = "Message sent", body = Message),
        (status = 403, description = "Association principals only")
    )
)]
pub async fn send_to_user(
    State(state): State<AppState>,
    current: CurrentPrincipal,
    Path(id): Path<Uuid>,
    Json(payload): Json<SendMessageRequest>,
) -> AppResult<(StatusCode, Json<Message>)> {
    let decision = state
        .policy
        .authorize(
            &current.principal,
            Action::SendMessageToUser,
            &Resource::User { id },
        )
        .await?;
    ensure_allowed(decision)?;

    super::auth::fetch_user_by_id(&state.pool, id).await?;

    let message = insert_message(
        &state,
        PrincipalKind::Association,
        current.principal.id(),
        PrincipalKind::User,
        id,
        &payload.body,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

#[utoipa::path(
    get,
    path = "/chat/association/{id}",
    tag = "Chat",
    params(("id" = Uuid, Path, description = "Association id")),
    responses((status = 200, description = "Full thread with the association, oldest first", body = [Message]))
)]
pub async fn conversation(
    State(state): State<AppState>,
    current: CurrentPrincipal,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<Message>>> {
    let user_id = match &current.principal {
        Principal::User(user) => user.id,
        Principal::Association(_) => return Err(AppError::forbidden("insufficient permissions")),
    };

    fetch_association(&state.pool, id, false).await?;

    let rows = sqlx::query_as::<_, DbMessage>(&format!(
        "{SELECT_MESSAGE} WHERE (sender_kind = ? AND sender_id = ? AND recipient_kind = ? AND recipient_id = ?) \
         OR (sender_kind = ? AND sender_id = ? AND recipient_kind = ? AND recipient_id = ?) \
         ORDER BY created_at"
    ))
    .bind(PrincipalKind::User.as_str())
    .bind(user_id.to_string())
    .bind(PrincipalKind::Association.as_str())
    .bind(id.to_string())
    .bind(PrincipalKind::Association.as_str())
    .bind(id.to_string())
    .bind(PrincipalKind::User.as_str())
    .bind(user_id.to_string())
    .fetch_all(&state.pool)
    .await?;

    rows.into_iter()
        .map(Message::try_from)
        .collect::<Result<Vec<_>, _>>()
        .map(Json)
}

#[utoipa::path(
    get,
    path = "/user/messages",
    tag = "Chat",
    responses((status = 200, description = "Messages received by the current user", body = [Message]))
)]
pub async fn user_messages(
    State(state): State<AppState>,
    current: CurrentPrincipal,
) -> AppResult<Json<Vec<Message>>> {
    let user_id = match &current.principal {
        Principal::User(user) => user.id,
        Principal::Association(_) => return Err(AppError::forbidden("insufficient permissions")),
    };

    received_messages(&state, PrincipalKind::User, user_id).await.map(Json)
}

#[utoipa::path(
    get,
    path = "/association/messages",
    tag = "Chat",
    responses(
        (status = 200, description = "Messages received by the current association", body = [Message]),
        (status = 403, description = "Association principals only")
    )
)]
pub async fn association_messages(
    State(state): State<AppState>,
    current: CurrentPrincipal,
) -> AppResult<Json<Vec<Message>>> {
    let resource = Resource::Association {
        id: current.principal.id(),
        owner_user_id: None,
    };
    let decision = state
        .policy
        .authorize(&current.principal, Action::ReadAssociationInbox, &resource)
        .await?;
    ensure_allowed(decision)?;

    received_messages(&state, PrincipalKind::Association, current.principal.id())
        .await
        .map(Json)
}

#[utoipa::path(
    post,
    path = "/chat/mark-read/{sender_id}",
    tag = "Chat",
    params(("sender_id" = Uuid, Path, description = "Sender id")),
    responses((status = 204, description = "Messages from the sender marked read"))
)]
pub async fn mark_read(
    State(state): State<AppState>,
    current: CurrentPrincipal,
    Path(sender_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    sqlx::query(
        "UPDATE messages SET read_at = ? WHERE recipient_kind = ? AND recipient_id = ? AND sender_id = ? AND read_at IS NULL",
    )
    .bind(utc_now())
    .bind(current.principal.kind().as_str())
    .bind(current.principal.id().to_string())
    .bind(sender_id.to_string())
    .execute(&state.pool)
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn insert_message(
    state: &AppState,
    sender_kind: PrincipalKind,
    sender_id: Uuid,
    recipient_kind: PrincipalKind,
    recipient_id: Uuid,
    body: &str,
) -> AppResult<Message> {
    if body.trim().is_empty() {
        return Err(AppError::bad_request("message body must not be empty"));
    }

    let message_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO messages (id, sender_kind, sender_id, recipient_kind, recipient_id, body, read_at, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, NULL, ?)",
    )
    .bind(message_id.to_string())
    .bind(sender_kind.as_str())
    .bind(sender_id.to_string())
    .bind(recipient_kind.as_str())
    .bind(recipient_id.to_string())
    .bind(body)
    .bind(utc_now())
    .execute(&state.pool)
    .await?;

    sqlx::query_as::<_, DbMessage>(&format!("{SELECT_MESSAGE} WHERE id = ?"))
        .bind(message_id.to_string())
        .fetch_one(&state.pool)
        .await?
        .try_into()
}

async fn received_messages(
    state: &AppState,
    kind: PrincipalKind,
    id: Uuid,
) -> AppResult<Vec<Message>> {
    let rows = sqlx::query_as::<_, DbMessage>(&format!(
        "{SELECT_MESSAGE} WHERE recipient_kind = ? AND recipient_id = ? ORDER BY created_at DESC"
    ))
    .bind(kind.as_str())
    .bind(id.to_string())
    .fetch_all(&state.pool)
    .await?;

    rows.into_iter().map(Message::try_from).collect()
}
