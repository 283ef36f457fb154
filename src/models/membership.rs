use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

/// Role within one association. `Admin` here is a narrow grant scoped to
/// that association only; it is unrelated to the platform admin user role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Member,
    Admin,
}

impl MemberRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MemberRole::Member => "member",
            MemberRole::Admin => "admin",
        }
    }
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemberRole {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "member" => Ok(MemberRole::Member),
            "admin" => Ok(MemberRole::Admin),
            other => Err(AppError::internal(format!("unknown member role: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AssociationMember {
    pub association_id: Uuid,
    pub user_id: Uuid,
    pub role: MemberRole,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbAssociationMember {
    pub association_id: String,
    pub user_id: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbAssociationMember> for AssociationMember {
    type Error = AppError;

    fn try_from(value: DbAssociationMember) -> Result<Self, Self::Error> {
        Ok(AssociationMember {
            association_id: crate::utils::parse_uuid(&value.association_id)?,
            user_id: crate::utils::parse_uuid(&value.user_id)?,
            role: value.role.parse()?,
            created_at: value.created_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddMemberRequest {
    pub user_id: Uuid,
    pub role: MemberRole,
}
