use log::{error, info};
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::auth::UserStore;
use crate::client::handle_client;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::http;
use crate::server::{ServerContext, ServerStatus};
use crate::storage::prepare_instance_dir;

pub struct Server {
    listener: TcpListener,
    static_listener: TcpListener,
    control_addr: SocketAddr,
    static_addr: SocketAddr,
    instance_dir: PathBuf,
    ctx: Arc<ServerContext>,
}

impl Server {
    /// Prepares the instance data directory and binds the control and static
    /// listeners. Either bind failing is fatal.
    pub async fn bind(config: ServerConfig, store: Arc<dyn UserStore>) -> Result<Self, ServerError> {
        config.validate()?;

        let base = config.base_data_path();
        let instance_dir = prepare_instance_dir(&base, config.instance_id.as_deref())
            .await
            .map_err(|source| ServerError::DataDir {
                path: base.display().to_string(),
                source,
            })?;

        let listener = bind_listener("control", config.control_socket()).await?;
        let static_listener = bind_listener("static", config.static_socket()).await?;
        let control_addr = local_addr("control", &listener)?;
        let static_addr = local_addr("static", &static_listener)?;

        let ctx = ServerContext::new(config, store, instance_dir.clone())?;
        info!(
            "Passive ports {}-{} available",
            ctx.config.passive_port_min, ctx.config.passive_port_max
        );

        Ok(Self {
            listener,
            static_listener,
            control_addr,
            static_addr,
            instance_dir,
            ctx: Arc::new(ctx),
        })
    }

    pub fn control_addr(&self) -> SocketAddr {
        self.control_addr
    }

    pub fn static_addr(&self) -> SocketAddr {
        self.static_addr
    }

    pub fn instance_dir(&self) -> &Path {
        &self.instance_dir
    }

    pub fn status(&self) -> ServerStatus {
        ServerStatus {
            listen_address: self.ctx.config.bind_address.clone(),
            control_port: self.control_addr.port(),
            static_port: self.static_addr.port(),
        }
    }

    /// Serves FTP and HTTP until the HTTP server stops. Each control
    /// connection runs in its own task.
    pub async fn run(self) -> Result<(), ServerError> {
        let status = self.status();
        let app = http::router(&self.instance_dir, status);
        let static_listener = self.static_listener;
        let mut http_task: JoinHandle<io::Result<()>> =
            tokio::spawn(async move { axum::serve(static_listener, app).await });

        info!(
            "FTP server listening on {}, static files on http://{}",
            self.control_addr, self.static_addr
        );

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        info!("New connection from {}", addr);
                        let ctx = Arc::clone(&self.ctx);
                        // Spawn a task for each client so accept loop doesn't block
                        tokio::spawn(handle_client(stream, addr, ctx));
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                    }
                },
                finished = &mut http_task => {
                    return match finished {
                        Ok(Ok(())) => Ok(()),
                        Ok(Err(e)) => Err(ServerError::Http(e)),
                        Err(e) => Err(ServerError::Http(io::Error::other(e))),
                    };
                }
            }
        }
    }
}

async fn bind_listener(what: &'static str, addr: String) -> Result<TcpListener, ServerError> {
    match TcpListener::bind(&addr).await {
        Ok(listener) => {
            info!("{} listener bound to {}", what, addr);
            Ok(listener)
        }
        Err(source) => {
            error!("Failed to bind {} listener to {}: {}", what, addr, source);
            Err(ServerError::Bind { what, addr, source })
        }
    }
}

fn local_addr(what: &'static str, listener: &TcpListener) -> Result<SocketAddr, ServerError> {
    listener.local_addr().map_err(|source| ServerError::Bind {
        what,
        addr: "<unknown>".to_string(),
        source,
    })
}
