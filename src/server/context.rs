//! Shared server context
//!
//! Everything a control connection task needs from the server. The port pool
//! and the user store behind the authenticator are the only mutable state
//! shared between sessions.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::auth::{SessionAuthenticator, UserStore};
use crate::config::ServerConfig;
use crate::error::ConfigError;
use crate::transfer::PassivePortAllocator;

pub struct ServerContext {
    pub config: ServerConfig,
    pub authenticator: SessionAuthenticator,
    pub ports: PassivePortAllocator,
    bind_ip: IpAddr,
    passive_ip: Option<Ipv4Addr>,
    next_session_id: AtomicU64,
}

impl ServerContext {
    pub fn new(
        config: ServerConfig,
        store: Arc<dyn UserStore>,
        instance_dir: PathBuf,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let bind_ip = config.bind_ip()?;
        let passive_ip = config.passive_ip()?;
        let ports = PassivePortAllocator::new(config.passive_port_min, config.passive_port_max);

        Ok(Self {
            authenticator: SessionAuthenticator::new(store, instance_dir),
            ports,
            bind_ip,
            passive_ip,
            next_session_id: AtomicU64::new(1),
            config,
        })
    }

    /// Address passive listeners bind to.
    pub fn bind_ip(&self) -> IpAddr {
        self.bind_ip
    }

    /// Address advertised in PASV replies when configured explicitly.
    pub fn passive_ip(&self) -> Option<Ipv4Addr> {
        self.passive_ip
    }

    pub fn data_connection_timeout(&self) -> Duration {
        self.config.data_connection_timeout()
    }

    pub fn buffer_size(&self) -> usize {
        self.config.buffer_size
    }

    pub fn next_session_id(&self) -> u64 {
        self.next_session_id.fetch_add(1, Ordering::Relaxed)
    }
}
