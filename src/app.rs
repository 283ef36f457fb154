use std::sync::Arc;

use axum::http::Method;
use axum::routing::{delete, get, patch, post, put};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::{PolicyEngine, SqliteMembershipDirectory};
use crate::errors::AppError;
use crate::routes::{aid_requests, association_auth, associations, auth, chat, health, offers, users};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub policy: Arc<PolicyEngine>,
}

impl AppState {
    pub fn new(pool: SqlitePool) -> Self {
        let membership = Arc::new(SqliteMembershipDirectory::new(pool.clone()));
        Self {
            pool,
            policy: Arc::new(PolicyEngine::new(membership)),
        }
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let state = AppState::new(pool);

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me))
        .route("/logout", post(auth::logout));

    let association_auth_routes = Router::new()
        .route("/register", post(association_auth::register))
        .route("/login", post(association_auth::login))
        .route("/messages", get(chat::association_messages));

    let user_routes = Router::new()
        .route("/", get(users::list_users))
        .route("/deleted/all", get(users::deleted_users))
        .route("/:id", get(users::get_user))
        .route("/:id", put(users::update_user))
        .route("/:id", delete(users::delete_user))
        .route("/:id/restore", post(users::restore_user))
        .route("/:id/force", delete(users::force_delete_user));

    let association_routes = Router::new()
        .route("/", get(associations::list_associations))
        .route("/trashed/all", get(associations::deleted_associations))
        .route("/:id", get(associations::get_association))
        .route("/:id", put(associations::update_association))
        .route("/:id", delete(associations::delete_association))
        .route("/:id/restore", post(associations::restore_association))
        .route("/:id/force", delete(associations::force_delete_association))
        .route("/:id/members", get(associations::list_members))
        .route("/:id/members", post(associations::add_member))
        .route("/:id/members/:user_id", delete(associations::remove_member))
        .route("/:id/offers", get(offers::association_offers))
        .route("/:id/requests", get(aid_requests::association_requests));

    let chat_routes = Router::new()
        .route("/association/:id", get(chat::conversation))
        .route("/association/:id/send", post(chat::send_to_association))
        .route("/user/:id/send", post(chat::send_to_user))
        .route("/mark-read/:sender_id", post(chat::mark_read));

    let router = Router::new()
        .route("/api/health", get(health::health))
        .nest("/auth", auth_routes)
        .nest("/association", association_auth_routes)
        .nest("/users", user_routes)
        .nest("/associations", association_routes)
        .nest("/chat", chat_routes)
        .route("/offers", post(offers::create_offer))
        .route("/offers/:id/status", patch(offers::update_offer_status))
        .route("/donor/offers", get(offers::donor_offers))
        .route("/requests", post(aid_requests::create_request))
        .route("/requests/:id/status", patch(aid_requests::update_request_status))
        .route("/recipient/requests", get(aid_requests::recipient_requests))
        .route("/user/messages", get(chat::user_messages))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}
