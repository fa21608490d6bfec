//! Error types
//!
//! Defines domain-specific error types for each module of the FTP server.

use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid username: {0}")]
    InvalidUsername(String),
    #[error("Invalid password for user: {0}")]
    InvalidPassword(String),
    #[error("Home directory for {user} is unavailable: {source}")]
    HomeUnavailable {
        user: String,
        #[source]
        source: io::Error,
    },
}

/// User store errors
#[derive(Debug, Error)]
pub enum UserStoreError {
    #[error("Root of user {0} escapes the data directory")]
    RootEscapes(String),
    #[error("Username already taken: {0}")]
    DuplicateUsername(String),
    #[error("User id already taken: {0}")]
    DuplicateId(String),
}

/// Path resolution errors
#[derive(Debug, Error)]
pub enum PathError {
    #[error("Path escapes home directory: {0}")]
    EscapesJail(String),
    #[error("File not found: {0}")]
    NotFound(String),
    #[error("Not a directory: {0}")]
    NotADirectory(String),
    #[error("Not a regular file: {0}")]
    NotAFile(String),
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Data transfer errors
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("No data connection, use PASV first")]
    NoDataConnection,
    #[error("No passive ports available")]
    NoPortsAvailable,
    #[error("Failed to bind passive listener on {0}: {1}")]
    PortBindingFailed(SocketAddr, #[source] io::Error),
    #[error("Timed out waiting for data connection on port {0}")]
    DataConnectionTimeout(u16),
    #[error("Passive listener on port {0} was cancelled")]
    Cancelled(u16),
    #[error("Data connection failed: {0}")]
    Network(#[source] io::Error),
    #[error("Local file error: {0}")]
    LocalFile(#[source] io::Error),
    #[error("Passive mode requires an IPv4 address, got {0}")]
    UnsupportedAddress(std::net::IpAddr),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Source(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error(transparent)]
    Users(#[from] UserStoreError),
}

/// Fatal server errors
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Failed to bind {what} listener on {addr}: {source}")]
    Bind {
        what: &'static str,
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("Failed to prepare data directory {path}: {source}")]
    DataDir {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("Static file server failed: {0}")]
    Http(#[source] io::Error),
}
