//! Authentication: opaque bearer tokens and the per-request resolver.
//!
//! Tokens are random values handed out once at login; only a sha256 digest
//! is stored, so a database leak does not expose live credentials. Logout
//! revokes the presented token and nothing else.

mod resolver;
mod token;

pub use resolver::{resolve, CurrentPrincipal};
pub use token::{hash_token, issue, revoke, IssuedToken};
