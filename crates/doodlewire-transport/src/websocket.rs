//! WebSocket transport implementation using `tokio-tungstenite`.

use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request, Response,
};

use crate::{
    ConnectInfo, Connection, ConnectionId, Transport, TransportError,
};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

/// A WebSocket-based [`Transport`] that listens for incoming connections.
pub struct WebSocketTransport {
    listener: TcpListener,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self { listener })
    }

    /// Returns the address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        let mut request_target: Option<(String, Option<String>)> = None;
        let ws = tokio_tungstenite::accept_hdr_async(
            stream,
            |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                request_target = Some((
                    req.uri().path().to_string(),
                    req.uri().query().map(str::to_string),
                ));
                Ok(resp)
            },
        )
        .await
        .map_err(|e| TransportError::HandshakeFailed(e.to_string()))?;

        let info = match &request_target {
            Some((path, query)) => {
                ConnectInfo::from_parts(Some(addr), path, query.as_deref())
            }
            None => ConnectInfo {
                peer: Some(addr),
                ..ConnectInfo::default()
            },
        };

        let id = ConnectionId::new(
            NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
        );
        tracing::debug!(%id, %addr, path = %info.path, "accepted WebSocket connection");

        let (sink, stream) = ws.split();
        Ok(WebSocketConnection {
            id,
            info,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        })
    }
}

/// A single WebSocket connection.
///
/// The socket is split so a writer task can push room events while the
/// reader is parked in [`Connection::recv`].
pub struct WebSocketConnection {
    id: ConnectionId,
    info: ConnectInfo,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    async fn send(&self, text: &str) -> Result<(), Self::Error> {
        let msg = Message::text(text.to_owned());
        self.sink.lock().await.send(msg).await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_bytes().to_vec()));
                }
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(data.into()));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // ping/pong/frame
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(
                        std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            e,
                        ),
                    ));
                }
            }
        }
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn info(&self) -> &ConnectInfo {
        &self.info
    }
}
