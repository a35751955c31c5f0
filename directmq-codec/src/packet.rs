use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Delivery semantics of a publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DeliveryStrategy {
    /// Every matching subscriber receives the payload.
    #[default]
    #[serde(rename = "AT_LEAST_ONCE")]
    AtLeastOnce,
    /// Exactly one matching subscriber, picked at random, receives the payload.
    #[serde(rename = "AT_MOST_ONCE")]
    AtMostOnce,
}

impl fmt::Display for DeliveryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryStrategy::AtLeastOnce => f.write_str("AT_LEAST_ONCE"),
            DeliveryStrategy::AtMostOnce => f.write_str("AT_MOST_ONCE"),
        }
    }
}

/// Routing header carried by every message.
///
/// `traversed` is the path vector of node ids the frame went through, every
/// hop appends its own id before forwarding.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DataFrame {
    pub ttl: i32,
    pub traversed: Vec<String>,
}

impl DataFrame {
    #[inline]
    pub fn new(ttl: i32, traversed: Vec<String>) -> Self {
        Self { ttl, traversed }
    }

    #[inline]
    pub fn last_hop(&self) -> Option<&str> {
        self.traversed.last().map(|s| s.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportedProtocolVersions {
    pub frame: DataFrame,
    pub supported_versions: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitConnection {
    pub frame: DataFrame,
    pub max_message_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionAccepted {
    pub frame: DataFrame,
    pub max_message_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GracefullyClose {
    pub frame: DataFrame,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminateNetwork {
    pub frame: DataFrame,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publish {
    pub frame: DataFrame,
    pub topic: String,
    pub delivery_strategy: DeliveryStrategy,
    pub payload: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscribe {
    pub frame: DataFrame,
    pub topic: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unsubscribe {
    pub frame: DataFrame,
    pub topic: String,
}

/// A received frame that could not be decoded into any known message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Malformed {
    pub data: Bytes,
    pub reason: String,
}

/// Every message exchanged between two bridged nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    SupportedProtocolVersions(SupportedProtocolVersions),
    InitConnection(InitConnection),
    ConnectionAccepted(ConnectionAccepted),
    GracefullyClose(GracefullyClose),
    TerminateNetwork(TerminateNetwork),
    Publish(Publish),
    Subscribe(Subscribe),
    Unsubscribe(Unsubscribe),
    Malformed(Malformed),
}

impl Packet {
    /// Routing header, `None` for malformed frames.
    pub fn frame(&self) -> Option<&DataFrame> {
        match self {
            Packet::SupportedProtocolVersions(m) => Some(&m.frame),
            Packet::InitConnection(m) => Some(&m.frame),
            Packet::ConnectionAccepted(m) => Some(&m.frame),
            Packet::GracefullyClose(m) => Some(&m.frame),
            Packet::TerminateNetwork(m) => Some(&m.frame),
            Packet::Publish(m) => Some(&m.frame),
            Packet::Subscribe(m) => Some(&m.frame),
            Packet::Unsubscribe(m) => Some(&m.frame),
            Packet::Malformed(_) => None,
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Packet::SupportedProtocolVersions(_) => "SupportedProtocolVersions",
            Packet::InitConnection(_) => "InitConnection",
            Packet::ConnectionAccepted(_) => "ConnectionAccepted",
            Packet::GracefullyClose(_) => "GracefullyClose",
            Packet::TerminateNetwork(_) => "TerminateNetwork",
            Packet::Publish(_) => "Publish",
            Packet::Subscribe(_) => "Subscribe",
            Packet::Unsubscribe(_) => "Unsubscribe",
            Packet::Malformed(_) => "Malformed",
        }
    }
}

macro_rules! impl_from_message {
    ($($variant:ident),*) => {
        $(
            impl From<$variant> for Packet {
                #[inline]
                fn from(m: $variant) -> Self {
                    Packet::$variant(m)
                }
            }
        )*
    };
}

impl_from_message!(
    SupportedProtocolVersions,
    InitConnection,
    ConnectionAccepted,
    GracefullyClose,
    TerminateNetwork,
    Publish,
    Subscribe,
    Unsubscribe,
    Malformed
);
