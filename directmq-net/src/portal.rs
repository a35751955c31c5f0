use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{ready, Sink, Stream};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::PortalError;

/// Room reserved on top of the message size limit for the frame header,
/// the topic and the traversed path.
pub const FRAME_OVERHEAD: usize = 64 * 1024;

/// Length delimited framing, `max_frame_length` 0 means unlimited.
pub fn frame_codec(max_frame_length: usize) -> LengthDelimitedCodec {
    let max = if max_frame_length == 0 { u32::MAX as usize } else { max_frame_length };
    LengthDelimitedCodec::builder().length_field_length(4).max_frame_length(max).new_codec()
}

/// A portal over any byte stream, using a 4 byte big-endian length prefix per frame.
pub struct FramedPortal<Io> {
    io: Framed<Io, LengthDelimitedCodec>,
    remote_addr: Option<SocketAddr>,
}

impl<Io> FramedPortal<Io>
where
    Io: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(io: Io, max_frame_length: usize) -> Self {
        Self { io: Framed::new(io, frame_codec(max_frame_length)), remote_addr: None }
    }

    pub fn with_remote_addr(mut self, remote_addr: SocketAddr) -> Self {
        self.remote_addr = Some(remote_addr);
        self
    }

    #[inline]
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    #[inline]
    pub fn get_ref(&self) -> &Io {
        self.io.get_ref()
    }
}

impl<Io> Stream for FramedPortal<Io>
where
    Io: AsyncRead + AsyncWrite + Unpin,
{
    type Item = Result<Bytes, PortalError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match ready!(Pin::new(&mut self.io).poll_next(cx)) {
            Some(Ok(frame)) => Poll::Ready(Some(Ok(frame.freeze()))),
            Some(Err(e)) => Poll::Ready(Some(Err(e.into()))),
            None => Poll::Ready(None),
        }
    }
}

impl<Io> Sink<Bytes> for FramedPortal<Io>
where
    Io: AsyncRead + AsyncWrite + Unpin,
{
    type Error = PortalError;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Sink::<Bytes>::poll_ready(Pin::new(&mut self.io), cx).map_err(PortalError::from)
    }

    fn start_send(mut self: Pin<&mut Self>, item: Bytes) -> Result<(), Self::Error> {
        Sink::<Bytes>::start_send(Pin::new(&mut self.io), item).map_err(PortalError::from)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Sink::<Bytes>::poll_flush(Pin::new(&mut self.io), cx).map_err(PortalError::from)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Sink::<Bytes>::poll_close(Pin::new(&mut self.io), cx).map_err(PortalError::from)
    }
}
