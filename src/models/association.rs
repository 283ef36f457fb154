use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

/// Accepted donation categories.
pub const CATEGORIES: &[&str] = &["Food", "Clothes", "Healthcare", "Education", "Home supplies"];

pub fn validate_category(category: &Option<String>) -> Result<(), AppError> {
    if let Some(value) = category {
        if !CATEGORIES.contains(&value.as_str()) {
            return Err(AppError::bad_request(format!(
                "category must be one of: {}",
                CATEGORIES.join(", ")
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Association {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub logo_url: Option<String>,
    pub owner_user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbAssociation {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub logo_url: Option<String>,
    pub owner_user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<DbAssociation> for Association {
    type Error = AppError;

    fn try_from(value: DbAssociation) -> Result<Self, Self::Error> {
        Ok(Association {
            id: crate::utils::parse_uuid(&value.id)?,
            name: value.name,
            email: value.email,
            phone: value.phone,
            address: value.address,
            description: value.description,
            category: value.category,
            logo_url: value.logo_url,
            owner_user_id: value
                .owner_user_id
                .as_deref()
                .map(crate::utils::parse_uuid)
                .transpose()?,
            created_at: value.created_at,
            updated_at: value.updated_at,
            deleted_at: value.deleted_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssociationRegisterRequest {
    #[schema(example = "Helping Hands")]
    pub name: String,
    #[schema(example = "contact@helpinghands.org")]
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub description: Option<String>,
    #[schema(example = "Food")]
    pub category: Option<String>,
    pub logo_url: Option<String>,
    /// Optional link to the user account that owns this association.
    pub owner_user_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssociationLoginRequest {
    pub email: String,
    pub password: String,
    pub device_name: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssociationUpdateRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub logo_url: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AssociationAuthResponse {
    pub token: String,
    pub association: Association,
}
