#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "ws")]
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    /// A text-mode portal was asked to send a frame that is not UTF-8.
    #[error("frame is not valid UTF-8 text")]
    InvalidText,
    #[error("handshake timeout")]
    HandshakeTimeout,
}
