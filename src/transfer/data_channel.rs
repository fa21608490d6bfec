//! Module `data_channel`
//!
//! Passive-mode data connections. A PASV command binds a listener on a leased
//! port and spawns a task that accepts exactly one connection from the owner
//! of the control session. The listener is closed as soon as that connection
//! arrives, or when the accept window elapses. The lease travels with the
//! listener and then with the accepted stream, so the port is released when
//! the transfer finishes, fails, times out or is cancelled.

use log::{debug, info, warn};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::TransferError;
use crate::transfer::port_pool::{PassivePortAllocator, PortLease};

/// A passive listener waiting for the client to connect.
///
/// Dropping it aborts the accept task, closing the listener and releasing
/// its port.
pub struct PendingDataChannel {
    port: u16,
    accept_task: JoinHandle<()>,
    connection: oneshot::Receiver<Result<DataConnection, TransferError>>,
}

impl PendingDataChannel {
    /// Leases a port from `ports` and binds a passive listener on it.
    ///
    /// A port that fails to bind, usually because another process holds it,
    /// stays leased until a bind succeeds so the next attempt gets a different
    /// port. When every remaining port fails, the last bind error is returned.
    pub async fn open_in_pool(
        bind_ip: IpAddr,
        ports: &PassivePortAllocator,
        holder: u64,
        owner_ip: IpAddr,
        accept_timeout: Duration,
    ) -> Result<Self, TransferError> {
        let mut busy: Vec<(PortLease, TransferError)> = Vec::new();
        loop {
            let lease = match ports.acquire(holder) {
                Ok(lease) => lease,
                Err(e) => return Err(busy.pop().map_or(e, |(_, err)| err)),
            };
            let addr = SocketAddr::new(bind_ip, lease.port());
            match TcpListener::bind(addr).await {
                Ok(listener) => {
                    return Ok(Self::listen(listener, lease, owner_ip, accept_timeout));
                }
                Err(e) => {
                    warn!("Passive port {} unavailable, trying the next one: {}", addr, e);
                    busy.push((lease, TransferError::PortBindingFailed(addr, e)));
                }
            }
        }
    }

    /// Binds `bind_ip:lease.port()` and starts waiting for one inbound
    /// connection from `owner_ip`.
    pub async fn open_passive(
        bind_ip: IpAddr,
        lease: PortLease,
        owner_ip: IpAddr,
        accept_timeout: Duration,
    ) -> Result<Self, TransferError> {
        let addr = SocketAddr::new(bind_ip, lease.port());
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| TransferError::PortBindingFailed(addr, e))?;
        Ok(Self::listen(listener, lease, owner_ip, accept_timeout))
    }

    fn listen(
        listener: TcpListener,
        lease: PortLease,
        owner_ip: IpAddr,
        accept_timeout: Duration,
    ) -> Self {
        let port = lease.port();
        debug!("Passive listener bound on port {}", port);

        let (tx, connection) = oneshot::channel();
        let accept_task = tokio::spawn(async move {
            let result =
                match tokio::time::timeout(accept_timeout, accept_from(&listener, owner_ip)).await
                {
                    Ok(Ok(stream)) => Ok(DataConnection { stream, lease }),
                    Ok(Err(e)) => Err(TransferError::Network(e)),
                    Err(_) => {
                        warn!("No data connection on port {} within {:?}", port, accept_timeout);
                        Err(TransferError::DataConnectionTimeout(port))
                    }
                };
            drop(listener);
            // A closed receiver means the session moved on; the connection
            // and its lease are dropped here.
            let _ = tx.send(result);
        });

        Self {
            port,
            accept_task,
            connection,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Stops listening and waits until the listener is closed and the port is
    /// back in the pool.
    pub async fn cancel(mut self) {
        self.accept_task.abort();
        let _ = (&mut self.accept_task).await;
        debug!("Passive listener on port {} cancelled", self.port);
    }

    /// Waits for the client's data connection.
    pub async fn connect(mut self) -> Result<DataConnection, TransferError> {
        match (&mut self.connection).await {
            Ok(result) => result,
            Err(_) => Err(TransferError::Cancelled(self.port)),
        }
    }
}

impl Drop for PendingDataChannel {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

/// Accepts connections until one comes from `owner_ip`; others are refused.
async fn accept_from(listener: &TcpListener, owner_ip: IpAddr) -> std::io::Result<TcpStream> {
    loop {
        let (stream, peer) = listener.accept().await?;
        if same_host(peer.ip(), owner_ip) {
            info!("Data connection accepted from {}", peer);
            return Ok(stream);
        }
        warn!(
            "Rejected data connection from {} (control connection is from {})",
            peer, owner_ip
        );
    }
}

fn same_host(a: IpAddr, b: IpAddr) -> bool {
    a.to_canonical() == b.to_canonical()
}

/// An established data connection holding its port lease.
pub struct DataConnection {
    stream: TcpStream,
    lease: PortLease,
}

impl DataConnection {
    pub fn port(&self) -> u16 {
        self.lease.port()
    }

    /// Copies `source` to the client until EOF. Returns the number of bytes
    /// sent.
    pub async fn send_from<R>(&mut self, source: &mut R, buffer_size: usize) -> Result<u64, TransferError>
    where
        R: AsyncRead + Unpin,
    {
        let mut buffer = vec![0; buffer_size];
        let mut total = 0u64;
        loop {
            let n = source
                .read(&mut buffer)
                .await
                .map_err(TransferError::LocalFile)?;
            if n == 0 {
                break;
            }
            self.stream
                .write_all(&buffer[..n])
                .await
                .map_err(TransferError::Network)?;
            total += n as u64;
        }
        self.stream.flush().await.map_err(TransferError::Network)?;
        Ok(total)
    }

    /// Sends an in-memory payload, such as a directory listing.
    pub async fn send_bytes(&mut self, bytes: &[u8]) -> Result<u64, TransferError> {
        self.stream
            .write_all(bytes)
            .await
            .map_err(TransferError::Network)?;
        self.stream.flush().await.map_err(TransferError::Network)?;
        Ok(bytes.len() as u64)
    }

    /// Copies everything the client sends into `sink` until the client closes
    /// its side. Returns the number of bytes received.
    pub async fn receive_into<W>(&mut self, sink: &mut W, buffer_size: usize) -> Result<u64, TransferError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut buffer = vec![0; buffer_size];
        let mut total = 0u64;
        loop {
            let n = self
                .stream
                .read(&mut buffer)
                .await
                .map_err(TransferError::Network)?;
            if n == 0 {
                break;
            }
            sink.write_all(&buffer[..n])
                .await
                .map_err(TransferError::LocalFile)?;
            total += n as u64;
        }
        sink.flush().await.map_err(TransferError::LocalFile)?;
        Ok(total)
    }

    /// Shuts the connection down and releases the port.
    pub async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!("Data connection shutdown on port {}: {}", self.lease.port(), e);
        }
    }
}
