use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use crate::errors::AppError;
use crate::models::user::UserRole;

/// The two disjoint principal kinds. Fixed at creation; the kinds are never
/// interchangeable subjects for the same rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrincipalKind {
    User,
    Association,
}

impl PrincipalKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PrincipalKind::User => "user",
            PrincipalKind::Association => "association",
        }
    }
}

impl fmt::Display for PrincipalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrincipalKind {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(PrincipalKind::User),
            "association" => Ok(PrincipalKind::Association),
            other => Err(AppError::internal(format!("unknown principal kind: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserIdentity {
    pub id: Uuid,
    pub role: UserRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssociationIdentity {
    pub id: Uuid,
}

/// An authenticated caller, resolved once per request and read-only for the
/// rest of the pipeline. Modeled as a sum type so every policy rule matches
/// on the kind tag explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Principal {
    User(UserIdentity),
    Association(AssociationIdentity),
}

impl Principal {
    pub fn user(id: Uuid, role: UserRole) -> Self {
        Principal::User(UserIdentity { id, role })
    }

    pub fn association(id: Uuid) -> Self {
        Principal::Association(AssociationIdentity { id })
    }

    pub fn kind(&self) -> PrincipalKind {
        match self {
            Principal::User(_) => PrincipalKind::User,
            Principal::Association(_) => PrincipalKind::Association,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Principal::User(user) => user.id,
            Principal::Association(assoc) => assoc.id,
        }
    }

    pub fn is_admin_user(&self) -> bool {
        matches!(
            self,
            Principal::User(UserIdentity {
                role: UserRole::Admin,
                ..
            })
        )
    }
}

/// Actions the policy engine understands. Association-only actions are
/// gated on the principal kind before any other rule runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    View,
    Update,
    Delete,
    Restore,
    ForceDelete,
    ManageMembers,
    /// Sending a chat message to a user. Association principals only.
    SendMessageToUser,
    /// Reading an association's own message inbox. Association principals only.
    ReadAssociationInbox,
    /// Accepting/rejecting an inbound offer or aid request. Association
    /// principals only.
    SetDonationStatus,
}

impl Action {
    /// Kind-gated actions: a User principal is denied regardless of role.
    pub fn association_only(self) -> bool {
        matches!(
            self,
            Action::SendMessageToUser | Action::ReadAssociationInbox | Action::SetDonationStatus
        )
    }
}

/// The target of an action, carrying exactly the fields the rules need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    User { id: Uuid },
    /// The whole user collection (listing, trash views). Admin-only via the
    /// override rule; nothing else matches.
    UserDirectory,
    Association { id: Uuid, owner_user_id: Option<Uuid> },
    AssociationDirectory,
}
