use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{ready, Sink, Stream};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Error as WSError;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::{PortalError, Result};

/// Which WebSocket message type carries outgoing frames.
///
/// Both types are accepted when reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WsMode {
    #[default]
    Binary,
    /// Frames must be UTF-8, pairs with the JSON wire format.
    Text,
}

/// A portal carrying one frame per WebSocket message.
pub struct WsPortal<S> {
    inner: WebSocketStream<S>,
    mode: WsMode,
}

impl<S> WsPortal<S> {
    pub fn new(inner: WebSocketStream<S>, mode: WsMode) -> Self {
        Self { inner, mode }
    }

    pub fn get_inner(&self) -> &WebSocketStream<S> {
        &self.inner
    }
}

impl<S> Stream for WsPortal<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    type Item = std::result::Result<Bytes, PortalError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match ready!(Pin::new(&mut self.inner).poll_next(cx)) {
                Some(Ok(Message::Binary(data))) => return Poll::Ready(Some(Ok(data))),
                Some(Ok(Message::Text(text))) => {
                    return Poll::Ready(Some(Ok(Bytes::copy_from_slice(text.as_bytes()))))
                }
                Some(Ok(Message::Close(_))) => return Poll::Ready(None),
                // control frames are answered by tungstenite itself
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {
                    continue
                }
                Some(Err(WSError::ConnectionClosed)) | Some(Err(WSError::AlreadyClosed)) => {
                    return Poll::Ready(None)
                }
                Some(Err(e)) => {
                    log::debug!("websocket read error: {e:?}");
                    return Poll::Ready(Some(Err(e.into())));
                }
                None => return Poll::Ready(None),
            }
        }
    }
}

impl<S> Sink<Bytes> for WsPortal<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    type Error = PortalError;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        Pin::new(&mut self.inner).poll_ready(cx).map_err(PortalError::from)
    }

    fn start_send(mut self: Pin<&mut Self>, item: Bytes) -> std::result::Result<(), Self::Error> {
        let msg = match self.mode {
            WsMode::Binary => Message::Binary(item),
            WsMode::Text => {
                let text = String::from_utf8(item.to_vec()).map_err(|_| PortalError::InvalidText)?;
                Message::Text(text.into())
            }
        };
        Pin::new(&mut self.inner).start_send(msg).map_err(PortalError::from)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        Pin::new(&mut self.inner).poll_flush(cx).map_err(PortalError::from)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        match ready!(Pin::new(&mut self.inner).poll_close(cx)) {
            Ok(()) | Err(WSError::ConnectionClosed) | Err(WSError::AlreadyClosed) => Poll::Ready(Ok(())),
            Err(e) => Poll::Ready(Err(e.into())),
        }
    }
}

/// Dials a `ws://` url.
pub async fn connect_ws(url: &str, mode: WsMode) -> Result<WsPortal<MaybeTlsStream<TcpStream>>> {
    let (ws_stream, _) = tokio_tungstenite::connect_async(url).await?;
    Ok(WsPortal::new(ws_stream, mode))
}
