use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

/// A chat message between a user and an association. Sender and recipient
/// each carry an explicit kind tag since both principal kinds take part.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Message {
    pub id: Uuid,
    #[schema(example = "user")]
    pub sender_kind: String,
    pub sender_id: Uuid,
    #[schema(example = "association")]
    pub recipient_kind: String,
    pub recipient_id: Uuid,
    pub body: String,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbMessage {
    pub id: String,
    pub sender_kind: String,
    pub sender_id: String,
    pub recipient_kind: String,
    pub recipient_id: String,
    pub body: String,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbMessage> for Message {
    type Error = AppError;

    fn try_from(value: DbMessage) -> Result<Self, Self::Error> {
        Ok(Message {
            id: crate::utils::parse_uuid(&value.id)?,
            sender_kind: value.sender_kind,
            sender_id: crate::utils::parse_uuid(&value.sender_id)?,
            recipient_kind: value.recipient_kind,
            recipient_id: crate::utils::parse_uuid(&value.recipient_id)?,
            body: value.body,
            read_at: value.read_at,
            created_at: value.created_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SendMessageRequest {
    #[schema(example = "Hello, is the pickup still available on Friday?")]
    pub body: String,
}
