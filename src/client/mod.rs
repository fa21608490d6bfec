//! Client management
//!
//! Handles client control connections and their per-connection session state.

pub mod handler;
pub mod session;

pub use handler::handle_client;
pub use session::{Session, SessionState};
