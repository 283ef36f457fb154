use anyhow::{Context, Result};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use serde_json::json;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::{tempdir, TempDir};
use tower::util::ServiceExt;
use uuid::Uuid;

use entraide::create_app;

async fn setup() -> Result<(Router, SqlitePool, TempDir)> {
    let dir = tempdir().context("failed to create tempdir")?;
    let db_path = dir.path().join("test_authz.db");
    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(
        std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"),
    )
    .await?;
    migrator.run(&pool).await?;

    let app = create_app(pool.clone()).await?;
    Ok((app, pool, dir))
}

fn request(method: &str, uri: &str, token: Option<&str>, body: Option<serde_json::Value>) -> Result<Request<Body>> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    Ok(builder.body(body)?)
}

async fn body_json(resp: axum::response::Response) -> Result<serde_json::Value> {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

async fn register_user(app: &Router, email: &str, role: &str) -> Result<(String, String)> {
    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/auth/register",
            None,
            Some(json!({
                "first_name": "Test",
                "last_name": "User",
                "email": email,
                "password": "password123",
                "role": role
            })),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body = body_json(resp).await?;
    Ok((
        body["token"].as_str().context("token")?.to_string(),
        body["user"]["id"].as_str().context("id")?.to_string(),
    ))
}

/// Admins cannot self-register; seed one the way the bootstrap CLI does.
async fn insert_admin(pool: &SqlitePool, email: &str, password: &str) -> Result<String> {
    let id = Uuid::new_v4();
    let hash = entraide::utils::hash_password(password)?;
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO users (id, first_name, last_name, email, password_hash, phone, address, role, created_at, updated_at) \
         VALUES (?, 'Platform', 'Admin', ?, ?, NULL, NULL, 'admin', ?, ?)",
    )
    .bind(id.to_string())
    .bind(email)
    .bind(hash)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(id.to_string())
}

async fn login(app: &Router, uri: &str, email: &str) -> Result<String> {
    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            uri,
            None,
            Some(json!({"email": email, "password": "password123"})),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await?;
    Ok(body["token"].as_str().context("token")?.to_string())
}

async fn register_association(app: &Router, email: &str, owner_id: Option<&str>) -> Result<(String, String)> {
    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/association/register",
            None,
            Some(json!({
                "name": "Helping Hands",
                "email": email,
                "password": "password123",
                "category": "Food",
                "owner_user_id": owner_id
            })),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body = body_json(resp).await?;
    Ok((
        body["token"].as_str().context("token")?.to_string(),
        body["association"]["id"].as_str().context("id")?.to_string(),
    ))
}

#[tokio::test]
async fn association_update_matrix() -> Result<()> {
    let (app, pool, _dir) = setup().await?;

    let (u1_token, u1_id) = register_user(&app, "u1@example.com", "donor").await?;
    let (u2_token, _u2_id) = register_user(&app, "u2@example.com", "donor").await?;
    insert_admin(&pool, "admin@example.com", "password123").await?;
    let admin_token = login(&app, "/auth/login", "admin@example.com").await?;

    let (_a1_token, a1_id) = register_association(&app, "a1@example.org", Some(&u1_id)).await?;

    let update = json!({"description": "Updated by test"});

    // Owner may update.
    let resp = app
        .clone()
        .oneshot(request("PUT", &format!("/associations/{a1_id}"), Some(&u1_token), Some(update.clone()))?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    // Unrelated user may not, and learns nothing more than "forbidden".
    let resp = app
        .clone()
        .oneshot(request("PUT", &format!("/associations/{a1_id}"), Some(&u2_token), Some(update.clone()))?)
        .await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body = body_json(resp).await?;
    assert_eq!(body["error"], "forbidden");

    // Platform admin always may.
    let resp = app
        .clone()
        .oneshot(request("PUT", &format!("/associations/{a1_id}"), Some(&admin_token), Some(update))?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn membership_admin_is_narrower_than_ownership() -> Result<()> {
    let (app, _pool, _dir) = setup().await?;

    let (owner_token, owner_id) = register_user(&app, "owner@example.com", "donor").await?;
    let (member_token, member_id) = register_user(&app, "member@example.com", "recipient").await?;
    let (_a_token, a_id) = register_association(&app, "assoc@example.org", Some(&owner_id)).await?;

    // Before being added, the member cannot update.
    let resp = app
        .clone()
        .oneshot(request(
            "PUT",
            &format!("/associations/{a_id}"),
            Some(&member_token),
            Some(json!({"description": "nope"})),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // Owner grants admin membership.
    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            &format!("/associations/{a_id}/members"),
            Some(&owner_token),
            Some(json!({"user_id": member_id, "role": "admin"})),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);

    // Member-admin can now update and list members...
    let resp = app
        .clone()
        .oneshot(request(
            "PUT",
            &format!("/associations/{a_id}"),
            Some(&member_token),
            Some(json!({"description": "collaborative update"})),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .clone()
        .oneshot(request("GET", &format!("/associations/{a_id}/members"), Some(&member_token), None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await?;
    assert_eq!(body.as_array().map(|a| a.len()), Some(1));

    // ...but may not delete the association.
    let resp = app
        .clone()
        .oneshot(request("DELETE", &format!("/associations/{a_id}"), Some(&member_token), None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // A plain (non-admin) membership grants nothing.
    let (plain_token, plain_id) = register_user(&app, "plain@example.com", "donor").await?;
    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            &format!("/associations/{a_id}/members"),
            Some(&owner_token),
            Some(json!({"user_id": plain_id, "role": "member"})),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = app
        .clone()
        .oneshot(request(
            "PUT",
            &format!("/associations/{a_id}"),
            Some(&plain_token),
            Some(json!({"description": "should fail"})),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    Ok(())
}

#[tokio::test]
async fn user_records_are_self_or_admin() -> Result<()> {
    let (app, pool, _dir) = setup().await?;

    let (u1_token, u1_id) = register_user(&app, "u1@example.com", "donor").await?;
    let (u2_token, _u2_id) = register_user(&app, "u2@example.com", "recipient").await?;
    insert_admin(&pool, "admin@example.com", "password123").await?;
    let admin_token = login(&app, "/auth/login", "admin@example.com").await?;

    // Self view and update.
    let resp = app
        .clone()
        .oneshot(request("GET", &format!("/users/{u1_id}"), Some(&u1_token), None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .clone()
        .oneshot(request(
            "PUT",
            &format!("/users/{u1_id}"),
            Some(&u1_token),
            Some(json!({"first_name": "Renamed"})),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await?;
    assert_eq!(body["first_name"], "Renamed");

    // Another user is denied.
    let resp = app
        .clone()
        .oneshot(request("GET", &format!("/users/{u1_id}"), Some(&u2_token), None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // Listing is admin-only.
    let resp = app
        .clone()
        .oneshot(request("GET", "/users", Some(&u1_token), None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = app
        .clone()
        .oneshot(request("GET", "/users", Some(&admin_token), None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn soft_delete_restore_flow_is_admin_gated() -> Result<()> {
    let (app, pool, _dir) = setup().await?;

    let (u1_token, u1_id) = register_user(&app, "u1@example.com", "donor").await?;
    insert_admin(&pool, "admin@example.com", "password123").await?;
    let admin_token = login(&app, "/auth/login", "admin@example.com").await?;

    // Self-delete.
    let resp = app
        .clone()
        .oneshot(request("DELETE", &format!("/users/{u1_id}"), Some(&u1_token), None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    // The deleted user shows up in the admin trash view.
    let resp = app
        .clone()
        .oneshot(request("GET", "/users/deleted/all", Some(&admin_token), None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await?;
    let deleted_ids: Vec<&str> = body
        .as_array()
        .context("array")?
        .iter()
        .filter_map(|u| u["id"].as_str())
        .collect();
    assert!(deleted_ids.contains(&u1_id.as_str()));

    // Admin restores; the user can log in again.
    let resp = app
        .clone()
        .oneshot(request("POST", &format!("/users/{u1_id}/restore"), Some(&admin_token), None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    let token = login(&app, "/auth/login", "u1@example.com").await?;
    let resp = app
        .clone()
        .oneshot(request("GET", "/auth/me", Some(&token), None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn association_trash_and_force_delete_are_admin_only() -> Result<()> {
    let (app, pool, _dir) = setup().await?;

    let (owner_token, owner_id) = register_user(&app, "owner@example.com", "donor").await?;
    insert_admin(&pool, "admin@example.com", "password123").await?;
    let admin_token = login(&app, "/auth/login", "admin@example.com").await?;
    let (_a_token, a_id) = register_association(&app, "assoc@example.org", Some(&owner_id)).await?;

    // Owner can soft delete their association.
    let resp = app
        .clone()
        .oneshot(request("DELETE", &format!("/associations/{a_id}"), Some(&owner_token), None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    // Trash view is admin-only.
    let resp = app
        .clone()
        .oneshot(request("GET", "/associations/trashed/all", Some(&owner_token), None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = app
        .clone()
        .oneshot(request("GET", "/associations/trashed/all", Some(&admin_token), None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    // Restore is admin-only: the owner is denied.
    let resp = app
        .clone()
        .oneshot(request("POST", &format!("/associations/{a_id}/restore"), Some(&owner_token), None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = app
        .clone()
        .oneshot(request("POST", &format!("/associations/{a_id}/restore"), Some(&admin_token), None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    // Force delete removes the row for good.
    let resp = app
        .clone()
        .oneshot(request("DELETE", &format!("/associations/{a_id}/force"), Some(&admin_token), None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = app
        .clone()
        .oneshot(request("GET", &format!("/associations/{a_id}"), Some(&admin_token), None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    Ok(())
}
