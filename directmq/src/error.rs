use directmq_codec::error::EncodeError;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TopicError {
    #[error("invalid topic `{0}`, {1}")]
    InvalidTopic(String, &'static str),
    #[error("invalid level `{0}`, {1}")]
    InvalidLevel(String, &'static str),
}

#[derive(Debug, thiserror::Error)]
pub enum DirectMqError {
    #[error(transparent)]
    Topic(#[from] TopicError),
    #[error("publication payload must not be empty")]
    EmptyPayload,
    #[error("invalid node config, {0}")]
    InvalidConfig(&'static str),
    #[error("encoding error: {0}")]
    Encode(#[from] EncodeError),
    #[error("portal closed")]
    PortalClosed,
}
