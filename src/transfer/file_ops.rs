//! File transfer operations
//!
//! Moves file contents and listings over an established data connection.
//! Every helper consumes the connection, so its port lease is released when
//! the helper returns, whether the transfer succeeded or not.

use log::{info, warn};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::error::TransferError;
use crate::transfer::data_channel::DataConnection;

/// Streams `file` to the client. Returns the number of bytes sent.
pub async fn send_file(
    mut conn: DataConnection,
    mut file: File,
    name: &str,
    buffer_size: usize,
) -> Result<u64, TransferError> {
    let port = conn.port();
    match conn.send_from(&mut file, buffer_size).await {
        Ok(sent) => {
            conn.close().await;
            info!("Sent {} ({} bytes) over port {}", name, sent, port);
            Ok(sent)
        }
        Err(e) => {
            warn!("Download of {} over port {} aborted: {}", name, port, e);
            Err(e)
        }
    }
}

/// Writes everything the client sends into `file`. Returns the number of
/// bytes received.
pub async fn receive_file(
    mut conn: DataConnection,
    mut file: File,
    name: &str,
    buffer_size: usize,
) -> Result<u64, TransferError> {
    let port = conn.port();
    let received = match conn.receive_into(&mut file, buffer_size).await {
        Ok(received) => received,
        Err(e) => {
            warn!("Upload of {} over port {} aborted: {}", name, port, e);
            return Err(e);
        }
    };
    file.sync_all().await.map_err(TransferError::LocalFile)?;
    file.shutdown().await.map_err(TransferError::LocalFile)?;
    conn.close().await;
    info!("Received {} ({} bytes) over port {}", name, received, port);
    Ok(received)
}

/// Sends a rendered directory listing.
pub async fn send_listing(mut conn: DataConnection, listing: &str) -> Result<u64, TransferError> {
    let port = conn.port();
    let sent = conn.send_bytes(listing.as_bytes()).await?;
    conn.close().await;
    info!("Sent listing ({} bytes) over port {}", sent, port);
    Ok(sent)
}
