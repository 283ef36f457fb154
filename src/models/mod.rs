pub mod aid_request;
pub mod association;
pub mod membership;
pub mod message;
pub mod offer;
pub mod user;
