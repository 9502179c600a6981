//! `DoodlewireServer` builder and accept loop.
//!
//! Ties the layers together: transport → protocol → gateway → rooms.

use std::net::SocketAddr;
use std::sync::Arc;

use doodlewire_protocol::{Codec, JsonCodec};
use doodlewire_room::{RoomConfig, RoomStore};
use doodlewire_transport::{Transport, WebSocketTransport};

use crate::DoodlewireError;
use crate::handler::handle_connection;

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<C: Codec> {
    pub(crate) store: RoomStore,
    pub(crate) codec: C,
}

/// Builder for configuring and starting a Doodlewire server.
///
/// # Example
///
/// ```rust,no_run
/// use doodlewire::prelude::*;
///
/// # async fn run() -> Result<(), DoodlewireError> {
/// let server = DoodlewireServer::builder()
///     .bind("0.0.0.0:8080")
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct DoodlewireServerBuilder {
    bind_addr: String,
    room_config: RoomConfig,
    store: Option<RoomStore>,
}

impl DoodlewireServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            room_config: RoomConfig::default(),
            store: None,
        }
    }

    /// Sets the address to bind the WebSocket listener to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the config for rooms created by this server.
    ///
    /// Ignored when an existing store is supplied with [`store`](Self::store).
    pub fn room_config(mut self, config: RoomConfig) -> Self {
        self.room_config = config;
        self
    }

    /// Uses an existing room store, e.g. one shared with the HTTP API.
    pub fn store(mut self, store: RoomStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Binds the listener. Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build(self) -> Result<DoodlewireServer<JsonCodec>, DoodlewireError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;
        let store = self
            .store
            .unwrap_or_else(|| RoomStore::new(self.room_config));

        let state = Arc::new(ServerState {
            store,
            codec: JsonCodec,
        });

        Ok(DoodlewireServer { transport, state })
    }
}

impl Default for DoodlewireServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Doodlewire real-time server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct DoodlewireServer<C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<C>>,
}

impl DoodlewireServer<JsonCodec> {
    /// Creates a new builder.
    pub fn builder() -> DoodlewireServerBuilder {
        DoodlewireServerBuilder::new()
    }
}

impl<C: Codec> DoodlewireServer<C> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// The room store shared by every connection.
    pub fn store(&self) -> RoomStore {
        self.state.store.clone()
    }

    /// Runs the accept loop.
    ///
    /// Spawns a handler task for each accepted connection. A failed
    /// accept or upgrade is logged and the loop carries on. Runs until
    /// the task is dropped.
    pub async fn run(mut self) -> Result<(), DoodlewireError> {
        tracing::info!("Doodlewire server running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
