/// Errors raised while turning a received frame into a [`crate::Packet`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("protobuf decoding error: {0}")]
    Protobuf(#[from] prost::DecodeError),
    #[error("json decoding error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid uint64 value `{0}`")]
    InvalidUint64(String),
    #[error("unknown delivery strategy {0}")]
    UnknownDeliveryStrategy(String),
    #[error("publication without payload")]
    EmptyPayload,
    #[error("frame carries no message")]
    MissingMessage,
    #[error("frame carries more than one message")]
    AmbiguousMessage,
}

/// Errors raised while turning a [`crate::Packet`] into a frame.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("malformed packets cannot be encoded")]
    MalformedPacket,
    #[error("json encoding error: {0}")]
    Json(#[from] serde_json::Error),
}
