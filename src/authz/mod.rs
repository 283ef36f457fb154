//! Authorization policy engine.
//!
//! Decides allow/deny for `(principal, action, resource)` triples using a
//! fixed rule order:
//! - association kind gates (checked before anything else, so a platform
//!   admin can never act as an association)
//! - platform admin override
//! - self rules (a principal acting on its own record)
//! - association ownership
//! - association membership with the `admin` member role
//! - default deny
//!
//! Decisions are pure with respect to the membership directory: the same
//! store state always yields the same decision.

mod evaluator;
mod principal;

pub use evaluator::{MembershipDirectory, PolicyEngine, SqliteMembershipDirectory};
pub use principal::{Action, AssociationIdentity, Principal, PrincipalKind, Resource, UserIdentity};

use crate::errors::{AppError, AppResult};

/// Outcome of a policy evaluation. The deny reason is for debug logging
/// only and is never surfaced to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(&'static str),
}

/// Maps a decision to the guard outcome: `Deny` becomes a generic 403 that
/// does not reveal which rule matched.
pub fn ensure_allowed(decision: Decision) -> AppResult<()> {
    match decision {
        Decision::Allow => Ok(()),
        Decision::Deny(reason) => {
            tracing::debug!(reason, "authorization denied");
            Err(AppError::forbidden("insufficient permissions"))
        }
    }
}
