//! Transport abstraction layer for Doodlewire.
//!
//! Provides the [`Transport`] and [`Connection`] traits that abstract over
//! the network protocol carrying the real-time room channel.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketTransport};

use std::fmt;
use std::net::SocketAddr;

/// Opaque identifier for a connection.
///
/// Rooms exclude senders from fan-out by this id, never by display name,
/// so two connections sharing a name are still told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// What the client told us while opening the channel.
///
/// Browsers cannot attach custom headers to a WebSocket upgrade, so
/// clients pass `roomId` and `playerName` as URL query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectInfo {
    /// Remote address, if known.
    pub peer: Option<SocketAddr>,
    /// Request path of the upgrade (e.g. `/ws`).
    pub path: String,
    /// Decoded query parameters in the order they appeared.
    pub query: Vec<(String, String)>,
}

impl ConnectInfo {
    /// Builds connection info from a path and a raw (still encoded) query.
    pub fn from_parts(
        peer: Option<SocketAddr>,
        path: &str,
        raw_query: Option<&str>,
    ) -> Self {
        let query = raw_query
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            peer,
            path: path.to_string(),
            query,
        }
    }

    /// Returns the first non-empty value for `name`.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, v)| k == name && !v.is_empty())
            .map(|(_, v)| v.as_str())
    }
}

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts the next incoming connection.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;
}

/// A single bidirectional channel carrying JSON text frames.
///
/// `send` and `recv` may be called concurrently from different tasks.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync;

    /// Sends a text frame to the remote peer.
    async fn send(&self, text: &str) -> Result<(), Self::Error>;

    /// Receives the next message from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;

    /// Returns the parameters captured when the connection was opened.
    fn info(&self) -> &ConnectInfo;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_new_and_into_inner() {
        let id = ConnectionId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(7);
        assert_eq!(id.to_string(), "conn-7");
    }

    #[test]
    fn test_connection_id_hash_works_as_map_key() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(ConnectionId::new(1), "alice");
        map.insert(ConnectionId::new(2), "bob");
        assert_eq!(map[&ConnectionId::new(1)], "alice");
    }

    #[test]
    fn test_connect_info_decodes_percent_encoded_params() {
        let info = ConnectInfo::from_parts(
            None,
            "/ws",
            Some("roomId=AB12CD&playerName=%E5%B0%8F%E6%98%8E"),
        );
        assert_eq!(info.query_param("roomId"), Some("AB12CD"));
        assert_eq!(info.query_param("playerName"), Some("小明"));
    }

    #[test]
    fn test_connect_info_plus_is_space() {
        let info =
            ConnectInfo::from_parts(None, "/", Some("playerName=Big+Al"));
        assert_eq!(info.query_param("playerName"), Some("Big Al"));
    }

    #[test]
    fn test_connect_info_empty_value_is_absent() {
        let info = ConnectInfo::from_parts(None, "/", Some("roomId=&x=1"));
        assert_eq!(info.query_param("roomId"), None);
        assert_eq!(info.query_param("x"), Some("1"));
    }

    #[test]
    fn test_connect_info_without_query() {
        let info = ConnectInfo::from_parts(None, "/", None);
        assert!(info.query.is_empty());
        assert_eq!(info.query_param("roomId"), None);
    }
}
