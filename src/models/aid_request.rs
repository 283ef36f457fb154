use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::offer::DonationStatus;

/// A recipient's request for aid from an association. Mirrors the offer
/// shape with the roles reversed.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AidRequest {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub association_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub status: DonationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbAidRequest {
    pub id: String,
    pub recipient_id: String,
    pub association_id: String,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbAidRequest> for AidRequest {
    type Error = AppError;

    fn try_from(value: DbAidRequest) -> Result<Self, Self::Error> {
        Ok(AidRequest {
            id: crate::utils::parse_uuid(&value.id)?,
            recipient_id: crate::utils::parse_uuid(&value.recipient_id)?,
            association_id: crate::utils::parse_uuid(&value.association_id)?,
            title: value.title,
            description: value.description,
            category: value.category,
            status: value.status.parse()?,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AidRequestCreateRequest {
    pub association_id: Uuid,
    #[schema(example = "School supplies for two children")]
    pub title: String,
    pub description: Option<String>,
    #[schema(example = "Education")]
    pub category: Option<String>,
}
