//! JSON rendition of [`proto::DataFrame`] following the protobuf JSON mapping.
//!
//! Field names are lowerCamelCase, the `message` oneof is inlined into the
//! frame object, enums are written by name, `bytes` are base64 and `uint64`
//! values are strings (numbers are accepted as well when reading).

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DecodeError;
use crate::proto::{self, data_frame::Message};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct JsonFrame {
    #[serde(default, skip_serializing_if = "is_zero")]
    ttl: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    traversed: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    supported_protocol_versions: Option<JsonSupportedProtocolVersions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    init_connection: Option<JsonMaxMessageSize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    connection_accepted: Option<JsonMaxMessageSize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    publish: Option<JsonPublish>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    subscribe: Option<JsonTopic>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    unsubscribe: Option<JsonTopic>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    gracefully_close: Option<JsonReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    terminate_network: Option<JsonReason>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonSupportedProtocolVersions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    supported_protocol_versions: Vec<u32>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonMaxMessageSize {
    #[serde(default, skip_serializing_if = "is_zero_u64", with = "uint64")]
    max_message_size: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonPublish {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    topic: String,
    #[serde(default, skip_serializing_if = "is_default_strategy", with = "delivery_strategy")]
    delivery_strategy: i32,
    #[serde(default, skip_serializing_if = "is_zero_u64", with = "uint64")]
    size: u64,
    #[serde(default, skip_serializing_if = "Bytes::is_empty", with = "base64_bytes")]
    payload: Bytes,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct JsonTopic {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    topic: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct JsonReason {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    reason: String,
}

fn is_zero(v: &i32) -> bool {
    *v == 0
}

fn is_zero_u64(v: &u64) -> bool {
    *v == 0
}

fn is_default_strategy(v: &i32) -> bool {
    *v == proto::DeliveryStrategy::AtLeastOnce as i32
}

impl From<proto::DataFrame> for JsonFrame {
    fn from(df: proto::DataFrame) -> Self {
        let mut frame = JsonFrame { ttl: df.ttl, traversed: df.traversed, ..Default::default() };
        match df.message {
            Some(Message::SupportedProtocolVersions(m)) => {
                frame.supported_protocol_versions = Some(JsonSupportedProtocolVersions {
                    supported_protocol_versions: m.supported_protocol_versions,
                })
            }
            Some(Message::InitConnection(m)) => {
                frame.init_connection = Some(JsonMaxMessageSize { max_message_size: m.max_message_size })
            }
            Some(Message::ConnectionAccepted(m)) => {
                frame.connection_accepted = Some(JsonMaxMessageSize { max_message_size: m.max_message_size })
            }
            Some(Message::Publish(m)) => {
                frame.publish = Some(JsonPublish {
                    topic: m.topic,
                    delivery_strategy: m.delivery_strategy,
                    size: m.size,
                    payload: m.payload,
                })
            }
            Some(Message::Subscribe(m)) => frame.subscribe = Some(JsonTopic { topic: m.topic }),
            Some(Message::Unsubscribe(m)) => frame.unsubscribe = Some(JsonTopic { topic: m.topic }),
            Some(Message::GracefullyClose(m)) => frame.gracefully_close = Some(JsonReason { reason: m.reason }),
            Some(Message::TerminateNetwork(m)) => {
                frame.terminate_network = Some(JsonReason { reason: m.reason })
            }
            None => {}
        }
        frame
    }
}

impl TryFrom<JsonFrame> for proto::DataFrame {
    type Error = DecodeError;

    fn try_from(f: JsonFrame) -> Result<Self, Self::Error> {
        let mut messages = Vec::with_capacity(1);
        if let Some(m) = f.supported_protocol_versions {
            messages.push(Message::SupportedProtocolVersions(proto::SupportedProtocolVersions {
                supported_protocol_versions: m.supported_protocol_versions,
            }));
        }
        if let Some(m) = f.init_connection {
            messages.push(Message::InitConnection(proto::InitConnection { max_message_size: m.max_message_size }));
        }
        if let Some(m) = f.connection_accepted {
            messages.push(Message::ConnectionAccepted(proto::ConnectionAccepted {
                max_message_size: m.max_message_size,
            }));
        }
        if let Some(m) = f.publish {
            messages.push(Message::Publish(proto::Publish {
                topic: m.topic,
                delivery_strategy: m.delivery_strategy,
                size: m.size,
                payload: m.payload,
            }));
        }
        if let Some(m) = f.subscribe {
            messages.push(Message::Subscribe(proto::Subscribe { topic: m.topic }));
        }
        if let Some(m) = f.unsubscribe {
            messages.push(Message::Unsubscribe(proto::Unsubscribe { topic: m.topic }));
        }
        if let Some(m) = f.gracefully_close {
            messages.push(Message::GracefullyClose(proto::GracefullyClose { reason: m.reason }));
        }
        if let Some(m) = f.terminate_network {
            messages.push(Message::TerminateNetwork(proto::TerminateNetwork { reason: m.reason }));
        }

        if messages.len() > 1 {
            return Err(DecodeError::AmbiguousMessage);
        }
        Ok(proto::DataFrame { ttl: f.ttl, traversed: f.traversed, message: messages.pop() })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    String(String),
}

mod uint64 {
    use super::*;

    pub fn serialize<S: Serializer>(v: &u64, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&v.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        match NumberOrString::deserialize(d)? {
            NumberOrString::Number(n) => Ok(n),
            NumberOrString::String(s) => s
                .parse::<u64>()
                .map_err(|_| serde::de::Error::custom(DecodeError::InvalidUint64(s))),
        }
    }
}

mod delivery_strategy {
    use super::*;

    pub fn serialize<S: Serializer>(v: &i32, s: S) -> Result<S::Ok, S::Error> {
        match proto::DeliveryStrategy::try_from(*v) {
            Ok(proto::DeliveryStrategy::AtLeastOnce) => s.serialize_str("AT_LEAST_ONCE"),
            Ok(proto::DeliveryStrategy::AtMostOnce) => s.serialize_str("AT_MOST_ONCE"),
            Err(_) => s.serialize_i32(*v),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<i32, D::Error> {
        let strategy = match NumberOrString::deserialize(d)? {
            NumberOrString::Number(n) => {
                i32::try_from(n).ok().and_then(|n| proto::DeliveryStrategy::try_from(n).ok()).ok_or_else(
                    || serde::de::Error::custom(DecodeError::UnknownDeliveryStrategy(n.to_string())),
                )?
            }
            NumberOrString::String(s) => match s.as_str() {
                "AT_LEAST_ONCE" => proto::DeliveryStrategy::AtLeastOnce,
                "AT_MOST_ONCE" => proto::DeliveryStrategy::AtMostOnce,
                _ => return Err(serde::de::Error::custom(DecodeError::UnknownDeliveryStrategy(s))),
            },
        };
        Ok(strategy as i32)
    }
}

mod base64_bytes {
    use super::*;

    pub fn serialize<S: Serializer>(v: &Bytes, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(v))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Bytes, D::Error> {
        let text = String::deserialize(d)?;
        STANDARD
            .decode(&text)
            .or_else(|_| URL_SAFE.decode(&text))
            .map(Bytes::from)
            .map_err(|e| serde::de::Error::custom(DecodeError::Base64(e)))
    }
}
