#![deny(unsafe_code)]

//! Portals: ordered, reliable frame channels between two DirectMQ nodes.
//!
//! A portal is anything that is both a `Stream` of received frames and a
//! `Sink` of frames to send. Frames are opaque byte buffers, the wire codec
//! lives one layer above.

use bytes::Bytes;
use futures::{Sink, Stream};

mod error;
mod memory;
mod portal;
mod server;
#[cfg(feature = "ws")]
mod ws;

pub use error::PortalError;
pub use memory::memory_pair;
pub use portal::{frame_codec, FramedPortal, FRAME_OVERHEAD};
pub use server::{connect_tcp, Acceptor, Builder, Listener};
#[cfg(feature = "ws")]
pub use ws::{connect_ws, WsMode, WsPortal};

pub type Error = anyhow::Error;
pub type Result<T> = anyhow::Result<T, Error>;

/// A bidirectional frame channel.
///
/// Implemented for every `Stream + Sink` pair of the right shape, so custom
/// transports only need to provide those two traits.
pub trait Portal:
    Stream<Item = std::result::Result<Bytes, PortalError>> + Sink<Bytes, Error = PortalError> + Send + Unpin + 'static
{
}

impl<T> Portal for T where
    T: Stream<Item = std::result::Result<Bytes, PortalError>>
        + Sink<Bytes, Error = PortalError>
        + Send
        + Unpin
        + 'static
{
}
