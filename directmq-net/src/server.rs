use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};

use crate::{Error, FramedPortal, Result};

#[derive(Clone, Debug)]
pub struct Builder {
    /// The name of the listener, used in logs.
    pub name: String,
    ///The local address the listener binds to.
    pub laddr: SocketAddr,
    ///TCP_NODELAY
    pub nodelay: bool,
    ///Largest frame accepted from a peer, 0 means unlimited.
    pub max_frame_length: usize,
    ///Upper bound for the WebSocket upgrade of an accepted connection.
    pub handshake_timeout: Duration,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    pub fn new() -> Builder {
        Builder {
            name: Default::default(),
            laddr: SocketAddr::from(SocketAddrV4::new(Ipv4Addr::new(0, 0, 0, 0), 5883)),
            nodelay: true,
            max_frame_length: 0,
            handshake_timeout: Duration::from_secs(30),
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.into();
        self
    }

    pub fn laddr(mut self, laddr: SocketAddr) -> Self {
        self.laddr = laddr;
        self
    }

    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    pub fn max_frame_length(mut self, max_frame_length: usize) -> Self {
        self.max_frame_length = max_frame_length;
        self
    }

    pub fn handshake_timeout(mut self, handshake_timeout: Duration) -> Self {
        self.handshake_timeout = handshake_timeout;
        self
    }

    /// Binds the listening socket, must be called from within a tokio runtime.
    pub fn bind(self) -> Result<Listener> {
        let std_listener = std::net::TcpListener::bind(self.laddr)?;
        std_listener.set_nonblocking(true)?;
        let l = TcpListener::from_std(std_listener)?;
        log::info!("Starting {} Listening on {}", self.name, l.local_addr()?);
        Ok(Listener { cfg: Arc::new(self), l })
    }
}

pub struct Listener {
    pub cfg: Arc<Builder>,
    l: TcpListener,
}

impl Listener {
    /// The bound address, useful when binding to port 0.
    #[inline]
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.l.local_addr()?)
    }

    pub async fn accept(&self) -> Result<Acceptor> {
        let (socket, remote_addr) = self.l.accept().await?;
        if let Err(e) = socket.set_nodelay(self.cfg.nodelay) {
            return Err(Error::from(e));
        }
        Ok(Acceptor { socket, remote_addr, cfg: self.cfg.clone() })
    }
}

/// An accepted connection that has not yet been turned into a portal.
pub struct Acceptor {
    pub(crate) socket: TcpStream,
    pub remote_addr: SocketAddr,
    pub cfg: Arc<Builder>,
}

impl Acceptor {
    #[inline]
    pub fn tcp(self) -> FramedPortal<TcpStream> {
        FramedPortal::new(self.socket, self.cfg.max_frame_length).with_remote_addr(self.remote_addr)
    }

    #[cfg(feature = "ws")]
    #[inline]
    pub async fn ws(self, mode: crate::WsMode) -> Result<crate::WsPortal<TcpStream>> {
        match tokio::time::timeout(
            self.cfg.handshake_timeout,
            tokio_tungstenite::accept_async(self.socket),
        )
        .await
        {
            Ok(Ok(ws_stream)) => Ok(crate::WsPortal::new(ws_stream, mode)),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(crate::PortalError::HandshakeTimeout.into()),
        }
    }
}

/// Dials a peer and frames the connection.
pub async fn connect_tcp<A: ToSocketAddrs>(addr: A, max_frame_length: usize) -> Result<FramedPortal<TcpStream>> {
    let socket = TcpStream::connect(addr).await?;
    socket.set_nodelay(true)?;
    let remote_addr = socket.peer_addr()?;
    Ok(FramedPortal::new(socket, max_frame_length).with_remote_addr(remote_addr))
}
