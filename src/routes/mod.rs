pub mod aid_requests;
pub mod association_auth;
pub mod associations;
pub mod auth;
pub mod chat;
pub mod health;
pub mod offers;
pub mod users;

use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
