//! Error handlers
//!
//! Converts recoverable session errors into FTP reply lines.

use crate::error::types::{AuthError, PathError, TransferError};
use crate::protocol::responses::*;
use log::warn;

/// Both credential failures share one reply so usernames cannot be probed.
pub fn auth_error_reply(err: &AuthError) -> String {
    match err {
        AuthError::InvalidUsername(_) | AuthError::InvalidPassword(_) => {
            format_response(NOT_LOGGED_IN, "Login incorrect.")
        }
        AuthError::HomeUnavailable { .. } => {
            format_response(SERVICE_UNAVAILABLE, "Home directory unavailable, try again later.")
        }
    }
}

pub fn path_error_reply(err: &PathError) -> String {
    match err {
        PathError::EscapesJail(_) => {
            format_response(NAME_NOT_ALLOWED, "Permission denied: path outside home directory.")
        }
        PathError::NotFound(p) => format_response(FILE_UNAVAILABLE, &format!("{p}: No such file or directory.")),
        PathError::NotADirectory(p) => format_response(FILE_UNAVAILABLE, &format!("{p}: Not a directory.")),
        PathError::NotAFile(p) => format_response(FILE_UNAVAILABLE, &format!("{p}: Not a regular file.")),
        PathError::Io { path, source } => {
            warn!("File system error on {}: {}", path, source);
            format_response(LOCAL_ERROR, "Requested action aborted: local error in processing.")
        }
    }
}

pub fn transfer_error_reply(err: &TransferError) -> String {
    match err {
        TransferError::NoDataConnection => format_response(CANT_OPEN_DATA, "Use PASV first."),
        TransferError::NoPortsAvailable => format_response(
            SERVICE_UNAVAILABLE,
            "No passive ports available, try again later.",
        ),
        TransferError::PortBindingFailed(..)
        | TransferError::DataConnectionTimeout(_)
        | TransferError::Cancelled(_)
        | TransferError::UnsupportedAddress(_) => {
            format_response(CANT_OPEN_DATA, "Can't open data connection.")
        }
        TransferError::Network(_) => {
            format_response(TRANSFER_ABORTED, "Connection closed; transfer aborted.")
        }
        TransferError::LocalFile(_) => {
            format_response(LOCAL_ERROR, "Requested action aborted: local error in processing.")
        }
    }
}
