use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

/// Lifecycle of an offer or aid request, driven by the targeted association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DonationStatus {
    Pending,
    Accepted,
    Rejected,
}

impl DonationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DonationStatus::Pending => "pending",
            DonationStatus::Accepted => "accepted",
            DonationStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for DonationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DonationStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(DonationStatus::Pending),
            "accepted" => Ok(DonationStatus::Accepted),
            "rejected" => Ok(DonationStatus::Rejected),
            other => Err(AppError::internal(format!("unknown donation status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Offer {
    pub id: Uuid,
    pub donor_id: Uuid,
    pub association_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub status: DonationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbOffer {
    pub id: String,
    pub donor_id: String,
    pub association_id: String,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbOffer> for Offer {
    type Error = AppError;

    fn try_from(value: DbOffer) -> Result<Self, Self::Error> {
        Ok(Offer {
            id: crate::utils::parse_uuid(&value.id)?,
            donor_id: crate::utils::parse_uuid(&value.donor_id)?,
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
pub struct OfferCreateRequest {
    pub association_id: Uuid,
    #[schema(example = "Winter clothes, two boxes")]
    pub title: String,
    pub description: Option<String>,
    #[schema(example = "Clothes")]
    pub category: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct StatusUpdateRequest {
    pub status: DonationStatus,
}
