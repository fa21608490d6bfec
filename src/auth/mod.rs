//! Authentication system
//!
//! Handles user records, credential validation, and home directory resolution.

pub mod authenticator;
pub mod store;

pub use authenticator::{AuthenticatedUser, SessionAuthenticator};
pub use store::{MemoryUserStore, UserRecord, UserStore};
