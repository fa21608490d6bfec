//! Server core functionality
//!
//! This module contains the listener setup and accept loop, the context
//! shared with every control connection, and the status snapshot.

pub mod context;
pub mod core;
pub mod status;

pub use context::ServerContext;
pub use core::Server;
pub use status::ServerStatus;
