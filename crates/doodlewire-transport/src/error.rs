/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Binding the listener or accepting a TCP stream failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The TCP stream connected but the WebSocket upgrade did not complete.
    #[error("websocket handshake failed: {0}")]
    HandshakeFailed(String),

    /// Writing a frame failed; the peer is most likely gone.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Reading a frame failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),
}
