//! Jailed FTP server
//!
//! A passive-mode FTP server that confines every user to a home directory
//! below a shared, per-instance data directory, and publishes that directory
//! read-only over HTTP.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod protocol;
pub mod server;
pub mod storage;
pub mod transfer;
pub mod utils;

pub use config::ServerConfig;
pub use server::{Server, ServerStatus};
