//! Client session state
//!
//! A `Session` belongs to exactly one control connection task and is dropped
//! with it. Dropping it also drops any pending passive listener, which
//! releases the leased port.

use std::net::SocketAddr;

use crate::auth::AuthenticatedUser;
use crate::transfer::PendingDataChannel;

/// Login progress of a control connection.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Connected,
    AwaitingPassword { username: String },
    Authenticated(AuthenticatedUser),
    Closed,
}

pub struct Session {
    id: u64,
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
    state: SessionState,
    cwd: String,
    pending_data: Option<PendingDataChannel>,
}

impl Session {
    pub fn new(id: u64, peer_addr: SocketAddr, local_addr: SocketAddr) -> Self {
        Self {
            id,
            peer_addr,
            local_addr,
            state: SessionState::Connected,
            cwd: "/".to_string(),
            pending_data: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Address of the server side of the control connection.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.state, SessionState::Authenticated(_))
    }

    pub fn user(&self) -> Option<&AuthenticatedUser> {
        match &self.state {
            SessionState::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    /// Records the USER argument; the session now waits for PASS.
    pub fn begin_login(&mut self, username: &str) {
        self.state = SessionState::AwaitingPassword {
            username: username.to_string(),
        };
    }

    pub fn pending_username(&self) -> Option<&str> {
        match &self.state {
            SessionState::AwaitingPassword { username } => Some(username),
            _ => None,
        }
    }

    pub fn login(&mut self, user: AuthenticatedUser) {
        self.state = SessionState::Authenticated(user);
        self.cwd = "/".to_string();
    }

    /// Back to `Connected` after a failed login.
    pub fn reset_login(&mut self) {
        self.state = SessionState::Connected;
    }

    /// Marks the session closed and cancels any pending passive listener.
    pub async fn close(&mut self) {
        self.state = SessionState::Closed;
        self.cancel_pending_data().await;
    }

    /// Virtual working directory, always absolute.
    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    pub fn set_cwd(&mut self, cwd: String) {
        self.cwd = cwd;
    }

    /// Stores a new passive listener. Call `cancel_pending_data` first to have
    /// the previous listener's port back before acquiring another.
    pub fn set_pending_data(&mut self, channel: PendingDataChannel) {
        self.pending_data = Some(channel);
    }

    pub fn take_pending_data(&mut self) -> Option<PendingDataChannel> {
        self.pending_data.take()
    }

    /// Cancels the pending listener, if any, and waits until its port is back
    /// in the pool.
    pub async fn cancel_pending_data(&mut self) {
        if let Some(channel) = self.pending_data.take() {
            channel.cancel().await;
        }
    }

    pub fn has_pending_data(&self) -> bool {
        self.pending_data.is_some()
    }
}
