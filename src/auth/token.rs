use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::authz::PrincipalKind;
use crate::errors::AppError;
use crate::utils::utc_now;

/// A freshly minted token. `token` is the raw bearer value, retrievable
/// exactly once from this struct; only its digest is persisted.
#[derive(Debug)]
pub struct IssuedToken {
    pub id: Uuid,
    pub token: String,
}

pub fn hash_token(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

fn random_token_value() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Mints a token bound to one principal. Existing tokens for the same
/// principal stay live (multi-device). Global uniqueness of the value is
/// backed by the unique index on `token_hash`.
pub async fn issue(
    pool: &SqlitePool,
    kind: PrincipalKind,
    principal_id: Uuid,
    label: &str,
) -> Result<IssuedToken, AppError> {
    let id = Uuid::new_v4();
    let raw = random_token_value();

    sqlx::query(
        "INSERT INTO access_tokens (id, token_hash, principal_kind, principal_id, label, created_at, revoked_at) \
         VALUES (?, ?, ?, ?, ?, ?, NULL)",
    )
    .bind(id.to_string())
    .bind(hash_token(&raw))
    .bind(kind.as_str())
    .bind(principal_id.to_string())
    .bind(label)
    .bind(utc_now())
    .execute(pool)
    .await?;

    tracing::debug!(%principal_id, kind = %kind, label, "issued access token");

    Ok(IssuedToken { id, token: raw })
}

/// Marks a token dead in one atomic write. Revoking an unknown or
/// already-revoked token is a no-op success.
pub async fn revoke(pool: &SqlitePool, raw: &str) -> Result<(), AppError> {
    sqlx::query("UPDATE access_tokens SET revoked_at = ? WHERE token_hash = ? AND revoked_at IS NULL")
        .bind(utc_now())
        .bind(hash_token(raw))
        .execute(pool)
        .await?;

    Ok(())
}
