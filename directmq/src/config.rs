use directmq_conf::Settings;
use directmq_utils::NodeId;

use crate::error::DirectMqError;

/// Hop limit used when the application does not choose one.
pub const DEFAULT_TTL: i32 = 32;
/// Frames that must not leave the receiving node.
pub const ONLY_DIRECT_CONNECTION_TTL: i32 = 1;
/// Frames that allow exactly one answer from the receiving node.
pub const ONLY_DIRECT_CONNECTION_WITH_RESPONSE_TTL: i32 = 2;
/// Message size limit meaning "unlimited".
pub const NO_MAX_MESSAGE_SIZE: u64 = 0;

/// Immutable per-node configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkNodeConfig {
    pub host_id: NodeId,
    /// TTL of frames originated by this node, always > 0.
    pub host_ttl: i32,
    /// Largest publication payload accepted from neighbors, [`NO_MAX_MESSAGE_SIZE`] for no limit.
    pub host_max_incoming_message_size: u64,
}

impl NetworkNodeConfig {
    pub fn new<S: Into<NodeId>>(host_id: S) -> Self {
        Self {
            host_id: host_id.into(),
            host_ttl: DEFAULT_TTL,
            host_max_incoming_message_size: NO_MAX_MESSAGE_SIZE,
        }
    }

    pub fn ttl(mut self, host_ttl: i32) -> Self {
        self.host_ttl = host_ttl;
        self
    }

    pub fn max_incoming_message_size(mut self, size: u64) -> Self {
        self.host_max_incoming_message_size = size;
        self
    }

    pub fn validate(&self) -> Result<(), DirectMqError> {
        if self.host_id.trim().is_empty() {
            return Err(DirectMqError::InvalidConfig("host id must not be empty"));
        }
        if self.host_ttl <= 0 {
            return Err(DirectMqError::InvalidConfig("host ttl must be greater than 0"));
        }
        Ok(())
    }
}

impl From<&Settings> for NetworkNodeConfig {
    fn from(settings: &Settings) -> Self {
        NetworkNodeConfig::new(settings.node.id.clone())
            .ttl(settings.node.ttl)
            .max_incoming_message_size(settings.node.max_message_size.as_u64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(NetworkNodeConfig::new("a").validate().is_ok());
        assert!(NetworkNodeConfig::new("").validate().is_err());
        assert!(NetworkNodeConfig::new("a").ttl(0).validate().is_err());
        let cfg = NetworkNodeConfig::new("a").ttl(3).max_incoming_message_size(10);
        assert_eq!(cfg.host_ttl, 3);
        assert_eq!(cfg.host_max_incoming_message_size, 10);
    }
}
