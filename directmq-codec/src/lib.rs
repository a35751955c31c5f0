#![deny(unsafe_code)]

//! DirectMQ wire protocol
//!
//! ## Core Features:
//! - **Message Model**: [`Packet`] covers every frame two bridged nodes exchange,
//!   each carrying a [`DataFrame`] routing header (`ttl` + `traversed` path)
//! - **Two Formats**: protobuf binary (`prost`) and the protobuf JSON mapping (`serde_json`)
//! - **Malformed Frames**: undecodable input maps to [`Packet::Malformed`] so that the
//!   receiving edge can react instead of failing the read loop
//!
//! ```
//! use directmq_codec::{DataFrame, Format, Packet, ProtocolCodec, Subscribe};
//!
//! let codec = ProtocolCodec::new(Format::Binary);
//! let packet = Packet::Subscribe(Subscribe {
//!     frame: DataFrame::new(31, vec!["node-a".into()]),
//!     topic: "sensors/*".into(),
//! });
//! let frame = codec.encode(&packet).unwrap();
//! assert_eq!(codec.decode(frame), packet);
//! ```

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use prost::Message as _;
use serde::Deserialize;

/// Error types for encoding/decoding operations
pub mod error;

/// Protobuf message definitions
pub mod proto;

mod json;
mod packet;

pub use packet::{
    ConnectionAccepted, DataFrame, DeliveryStrategy, GracefullyClose, InitConnection, Malformed, Packet,
    Publish, Subscribe, SupportedProtocolVersions, TerminateNetwork, Unsubscribe,
};

use error::{DecodeError, EncodeError};

/// The only protocol version this implementation speaks.
pub const PROTOCOL_VERSION: u32 = 1;
/// Negotiated version of an edge that has not completed the version exchange.
pub const UNKNOWN_PROTOCOL_VERSION: u32 = 0;

/// Serialization used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Binary,
    Json,
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "binary" | "protobuf" => Ok(Format::Binary),
            "json" => Ok(Format::Json),
            _ => Err(format!("unknown protocol format `{s}`")),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Binary => f.write_str("binary"),
            Format::Json => f.write_str("json"),
        }
    }
}

/// Encodes packets into frames and decodes frames into packets.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtocolCodec {
    format: Format,
}

impl ProtocolCodec {
    #[inline]
    pub fn new(format: Format) -> Self {
        Self { format }
    }

    #[inline]
    pub fn format(&self) -> Format {
        self.format
    }

    /// Encodes one packet into a single frame.
    pub fn encode(&self, packet: &Packet) -> Result<Bytes, EncodeError> {
        let frame = proto::DataFrame::try_from(packet)?;
        match self.format {
            Format::Binary => Ok(Bytes::from(frame.encode_to_vec())),
            Format::Json => Ok(Bytes::from(serde_json::to_vec(&json::JsonFrame::from(frame))?)),
        }
    }

    /// Decodes one frame, failing on anything that is not a known message.
    pub fn try_decode(&self, data: &[u8]) -> Result<Packet, DecodeError> {
        let frame = match self.format {
            Format::Binary => proto::DataFrame::decode(data)?,
            Format::Json => proto::DataFrame::try_from(serde_json::from_slice::<json::JsonFrame>(data)?)?,
        };
        Packet::try_from(frame)
    }

    /// Decodes one frame, undecodable input yields [`Packet::Malformed`].
    pub fn decode(&self, data: Bytes) -> Packet {
        match self.try_decode(&data) {
            Ok(packet) => packet,
            Err(e) => Packet::Malformed(Malformed { data, reason: e.to_string() }),
        }
    }
}
