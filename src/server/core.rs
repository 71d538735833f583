use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use crate::auth::CredentialStore;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::middleware::{AuditSink, LogAuditSink};
use crate::protocol::FrameWriter;
use crate::protocol::responses::status_frame;
use crate::protocol::Status;
use crate::server::context::ServerContext;
use crate::session::handle_connection;
use crate::storage::StorageManager;

pub struct Server {
    listener: TcpListener,
    context: Arc<ServerContext>,
    connection_slots: Arc<Semaphore>,
}

impl Server {
    /// Bind the listening socket and open the storage base directory.
    pub async fn bind(
        config: ServerConfig,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<Self, ServerError> {
        Self::bind_with(config, credentials, Arc::new(LogAuditSink)).await
    }

    /// Like [`Server::bind`] with a custom audit sink.
    pub async fn bind_with(
        config: ServerConfig,
        credentials: Arc<dyn CredentialStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, ServerError> {
        let storage = StorageManager::open(&config.storage_root_path())?
            .with_accounts(Arc::clone(&credentials));

        let socket = config.listen_socket();
        let listener = match TcpListener::bind(&socket).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("Failed to bind to {}: {}", socket, e);
                return Err(ServerError::Io(e));
            }
        };
        info!("Server bound to {}", listener.local_addr()?);

        let connection_slots = Arc::new(Semaphore::new(config.max_connections));
        let context = Arc::new(ServerContext {
            config,
            credentials,
            storage,
            audit,
        });

        Ok(Self {
            listener,
            context,
            connection_slots,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the task is cancelled.
    pub async fn start(self) {
        info!(
            "Starting RAX storage server on {} (max {} connections)",
            self.context.config.listen_socket(),
            self.context.config.max_connections
        );

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        warn!("Failed to set TCP_NODELAY for {}: {}", addr, e);
                    }

                    // Slot is held for the whole connection and released on drop
                    let permit = match Arc::clone(&self.connection_slots).try_acquire_owned() {
                        Ok(permit) => permit,
                        Err(_) => {
                            warn!("Rejecting {}: connection limit reached", addr);
                            tokio::spawn(reject_busy(stream, addr));
                            continue;
                        }
                    };

                    let context = Arc::clone(&self.context);

                    // Spawn a task for each client so accept loop doesn't block
                    tokio::spawn(async move {
                        handle_connection(stream, addr, context).await;
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                }
            }
        }
    }
}

/// Tell a client over the connection limit to retry later, then close.
async fn reject_busy(stream: TcpStream, addr: SocketAddr) {
    let mut writer = FrameWriter::new(stream);
    let frame = status_frame(Status::ServerBusy, "Too many connections, try again later");
    if let Err(e) = writer.write_frame(&frame).await {
        warn!("Failed to send SERVER_BUSY to {}: {}", addr, e);
    }
    let _ = writer.shutdown().await;
}
