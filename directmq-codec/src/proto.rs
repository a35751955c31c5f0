//! `directmq.v1` protobuf messages.
//!
//! Field numbers are part of the wire contract and must not change.

use crate::error::{DecodeError, EncodeError};
use crate::packet::{self, Packet};

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DataFrame {
    #[prost(int32, tag = "1")]
    pub ttl: i32,
    #[prost(string, repeated, tag = "2")]
    pub traversed: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    #[prost(oneof = "data_frame::Message", tags = "3, 4, 5, 6, 7, 8, 9, 10")]
    pub message: ::core::option::Option<data_frame::Message>,
}

pub mod data_frame {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Message {
        #[prost(message, tag = "3")]
        SupportedProtocolVersions(super::SupportedProtocolVersions),
        #[prost(message, tag = "4")]
        InitConnection(super::InitConnection),
        #[prost(message, tag = "5")]
        ConnectionAccepted(super::ConnectionAccepted),
        #[prost(message, tag = "6")]
        Publish(super::Publish),
        #[prost(message, tag = "7")]
        Subscribe(super::Subscribe),
        #[prost(message, tag = "8")]
        Unsubscribe(super::Unsubscribe),
        #[prost(message, tag = "9")]
        GracefullyClose(super::GracefullyClose),
        #[prost(message, tag = "10")]
        TerminateNetwork(super::TerminateNetwork),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SupportedProtocolVersions {
    #[prost(uint32, repeated, tag = "1")]
    pub supported_protocol_versions: ::prost::alloc::vec::Vec<u32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InitConnection {
    #[prost(uint64, tag = "1")]
    pub max_message_size: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ConnectionAccepted {
    #[prost(uint64, tag = "1")]
    pub max_message_size: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Publish {
    #[prost(string, tag = "1")]
    pub topic: ::prost::alloc::string::String,
    #[prost(enumeration = "DeliveryStrategy", tag = "2")]
    pub delivery_strategy: i32,
    #[prost(uint64, tag = "3")]
    pub size: u64,
    #[prost(bytes = "bytes", tag = "4")]
    pub payload: ::bytes::Bytes,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Subscribe {
    #[prost(string, tag = "1")]
    pub topic: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Unsubscribe {
    #[prost(string, tag = "1")]
    pub topic: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GracefullyClose {
    #[prost(string, tag = "1")]
    pub reason: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TerminateNetwork {
    #[prost(string, tag = "1")]
    pub reason: ::prost::alloc::string::String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum DeliveryStrategy {
    AtLeastOnce = 0,
    AtMostOnce = 1,
}

impl From<packet::DeliveryStrategy> for DeliveryStrategy {
    fn from(s: packet::DeliveryStrategy) -> Self {
        match s {
            packet::DeliveryStrategy::AtLeastOnce => DeliveryStrategy::AtLeastOnce,
            packet::DeliveryStrategy::AtMostOnce => DeliveryStrategy::AtMostOnce,
        }
    }
}

impl From<DeliveryStrategy> for packet::DeliveryStrategy {
    fn from(s: DeliveryStrategy) -> Self {
        match s {
            DeliveryStrategy::AtLeastOnce => packet::DeliveryStrategy::AtLeastOnce,
            DeliveryStrategy::AtMostOnce => packet::DeliveryStrategy::AtMostOnce,
        }
    }
}

impl TryFrom<&Packet> for DataFrame {
    type Error = EncodeError;

    fn try_from(packet: &Packet) -> Result<Self, Self::Error> {
        use data_frame::Message;

        let frame = packet.frame().ok_or(EncodeError::MalformedPacket)?;
        let message = match packet {
            Packet::SupportedProtocolVersions(m) => {
                Message::SupportedProtocolVersions(SupportedProtocolVersions {
                    supported_protocol_versions: m.supported_versions.clone(),
                })
            }
            Packet::InitConnection(m) => {
                Message::InitConnection(InitConnection { max_message_size: m.max_message_size })
            }
            Packet::ConnectionAccepted(m) => {
                Message::ConnectionAccepted(ConnectionAccepted { max_message_size: m.max_message_size })
            }
            Packet::GracefullyClose(m) => Message::GracefullyClose(GracefullyClose { reason: m.reason.clone() }),
            Packet::TerminateNetwork(m) => {
                Message::TerminateNetwork(TerminateNetwork { reason: m.reason.clone() })
            }
            Packet::Publish(m) => Message::Publish(Publish {
                topic: m.topic.clone(),
                delivery_strategy: DeliveryStrategy::from(m.delivery_strategy) as i32,
                size: m.payload.len() as u64,
                payload: m.payload.clone(),
            }),
            Packet::Subscribe(m) => Message::Subscribe(Subscribe { topic: m.topic.clone() }),
            Packet::Unsubscribe(m) => Message::Unsubscribe(Unsubscribe { topic: m.topic.clone() }),
            Packet::Malformed(_) => return Err(EncodeError::MalformedPacket),
        };

        Ok(DataFrame { ttl: frame.ttl, traversed: frame.traversed.clone(), message: Some(message) })
    }
}

impl TryFrom<DataFrame> for Packet {
    type Error = DecodeError;

    fn try_from(df: DataFrame) -> Result<Self, Self::Error> {
        use data_frame::Message;

        let frame = packet::DataFrame::new(df.ttl, df.traversed);
        let packet = match df.message.ok_or(DecodeError::MissingMessage)? {
            Message::SupportedProtocolVersions(m) => {
                Packet::SupportedProtocolVersions(packet::SupportedProtocolVersions {
                    frame,
                    supported_versions: m.supported_protocol_versions,
                })
            }
            Message::InitConnection(m) => {
                Packet::InitConnection(packet::InitConnection { frame, max_message_size: m.max_message_size })
            }
            Message::ConnectionAccepted(m) => Packet::ConnectionAccepted(packet::ConnectionAccepted {
                frame,
                max_message_size: m.max_message_size,
            }),
            Message::Publish(m) => {
                let strategy = DeliveryStrategy::try_from(m.delivery_strategy)
                    .map_err(|_| DecodeError::UnknownDeliveryStrategy(m.delivery_strategy.to_string()))?;
                if m.payload.is_empty() {
                    return Err(DecodeError::EmptyPayload);
                }
                Packet::Publish(packet::Publish {
                    frame,
                    topic: m.topic,
                    delivery_strategy: strategy.into(),
                    payload: m.payload,
                })
            }
            Message::Subscribe(m) => Packet::Subscribe(packet::Subscribe { frame, topic: m.topic }),
            Message::Unsubscribe(m) => Packet::Unsubscribe(packet::Unsubscribe { frame, topic: m.topic }),
            Message::GracefullyClose(m) => {
                Packet::GracefullyClose(packet::GracefullyClose { frame, reason: m.reason })
            }
            Message::TerminateNetwork(m) => {
                Packet::TerminateNetwork(packet::TerminateNetwork { frame, reason: m.reason })
            }
        };
        Ok(packet)
    }
}
