#![deny(unsafe_code)]

use std::fmt;
use std::net::SocketAddr;
use std::ops::Deref;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use config::{builder::DefaultState, Config, ConfigBuilder, File};
use once_cell::sync::OnceCell;
use serde::de::{self, Deserializer};
use serde::Deserialize;

use directmq_codec::Format;
use directmq_net::{Result, FRAME_OVERHEAD};
use directmq_utils::*;

use self::logging::LogSettings;

pub use self::options::Options;

pub mod logging;
pub mod options;

/// Hop limit used when `node.ttl` is not configured.
pub const DEFAULT_NODE_TTL: i32 = 32;

static SETTINGS: OnceCell<Settings> = OnceCell::new();

#[derive(Clone)]
pub struct Settings(Arc<Inner>);

#[derive(Debug, Clone, Deserialize)]
pub struct Inner {
    #[serde(default)]
    pub node: Node,
    #[serde(default)]
    pub log: LogSettings,
    #[serde(rename = "listener")]
    #[serde(default)]
    pub listeners: Listeners,
    #[serde(default)]
    pub peers: Vec<PeerAddr>,
    #[serde(default = "Inner::peer_reconnect_interval_default", deserialize_with = "deserialize_duration")]
    pub peer_reconnect_interval: Duration,
    #[serde(default, skip)]
    pub opts: Options,
}

impl Inner {
    fn peer_reconnect_interval_default() -> Duration {
        Duration::from_secs(5)
    }
}

impl Deref for Settings {
    type Target = Inner;
    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl Settings {
    fn new(opts: Options) -> Result<Self> {
        let mut builder = Config::builder()
            .add_source(File::with_name("/etc/directmq/directmq").required(false))
            .add_source(File::with_name("directmq").required(false))
            .add_source(
                config::Environment::with_prefix("directmq")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(" ")
                    .with_list_parse_key("peers"),
            );

        if let Some(cfg) = opts.cfg_name.as_ref() {
            builder = builder.add_source(File::with_name(cfg).required(false));
        }

        Self::from_builder(builder, opts)
    }

    /// Builds settings from prepared sources, then applies command line overrides.
    pub fn from_builder(builder: ConfigBuilder<DefaultState>, opts: Options) -> Result<Self> {
        let mut inner: Inner = builder.build()?.try_deserialize()?;

        //Command line configuration overriding file configuration
        if let Some(id) = opts.node_id.as_ref() {
            inner.node.id.clone_from(id);
        }
        if let Some(ttl) = opts.ttl {
            inner.node.ttl = ttl;
        }

        if inner.node.id.trim().is_empty() {
            inner.node.id = generate_node_id();
        }
        if inner.node.ttl <= 0 {
            return Err(anyhow!("node.ttl must be greater than 0, got {}", inner.node.ttl));
        }

        inner.opts = opts;
        Ok(Self(Arc::new(inner)))
    }

    #[inline]
    pub fn instance() -> &'static Self {
        match SETTINGS.get() {
            Some(c) => c,
            None => {
                unreachable!("Settings not initialized");
            }
        }
    }

    #[inline]
    pub fn init(opts: Options) -> Result<&'static Self> {
        SETTINGS.set(Settings::new(opts)?).map_err(|_| anyhow!("Settings init failed"))?;
        SETTINGS.get().ok_or_else(|| anyhow!("Settings init failed"))
    }

    #[inline]
    pub fn logs() -> Result<()> {
        let cfg = Self::instance();
        log::debug!("Config info is {:?}", cfg.0);
        log::info!("node_id is {}", cfg.node.id);
        log::info!("node.ttl is {}", cfg.node.ttl);
        log::info!("node.max_message_size is {}", cfg.node.max_message_size);
        log::info!("node.format is {}", cfg.node.format);
        log::info!("log is {:?} at {}, file {:?}", cfg.log.target, cfg.log.level.as_str(), cfg.log.file);
        if !cfg.peers.is_empty() {
            log::info!("peers are {:?}", cfg.peers);
        }
        Ok(())
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Settings ...")?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Node {
    ///Host id, a random one is generated when empty
    #[serde(default)]
    pub id: NodeId,
    ///Hop limit of frames this node originates
    #[serde(default = "Node::ttl_default")]
    pub ttl: i32,
    ///Largest publication payload accepted from neighbors, 0 means unlimited
    #[serde(default)]
    pub max_message_size: Bytesize,
    #[serde(default)]
    pub format: Format,
}

impl Default for Node {
    #[inline]
    fn default() -> Self {
        Self {
            id: NodeId::default(),
            ttl: Self::ttl_default(),
            max_message_size: Bytesize::default(),
            format: Format::default(),
        }
    }
}

impl Node {
    fn ttl_default() -> i32 {
        DEFAULT_NODE_TTL
    }

    /// Frame length limit for portals, leaves room for the routing header.
    #[inline]
    pub fn max_frame_length(&self) -> usize {
        if self.max_message_size.is_unlimited() {
            0
        } else {
            self.max_message_size.as_usize().saturating_add(FRAME_OVERHEAD)
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Listeners {
    #[serde(default)]
    pub tcp: Option<Listener>,
    #[serde(default)]
    pub ws: Option<Listener>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Listener {
    pub addr: SocketAddr,
    #[serde(default = "Listener::nodelay_default")]
    pub nodelay: bool,
    #[serde(default = "Listener::handshake_timeout_default", deserialize_with = "deserialize_duration")]
    pub handshake_timeout: Duration,
    ///WebSocket only, send frames as text messages
    #[serde(default)]
    pub text: bool,
}

impl Listener {
    fn nodelay_default() -> bool {
        true
    }
    fn handshake_timeout_default() -> Duration {
        Duration::from_secs(30)
    }

    pub fn builder(&self, name: &str, max_frame_length: usize) -> directmq_net::Builder {
        directmq_net::Builder::new()
            .name(name)
            .laddr(self.addr)
            .nodelay(self.nodelay)
            .max_frame_length(max_frame_length)
            .handshake_timeout(self.handshake_timeout)
    }
}

/// A neighbor to dial, `tcp://host:port` or `ws://host:port/path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerAddr {
    Tcp(String),
    Ws(String),
}

impl FromStr for PeerAddr {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let url = url::Url::parse(s).map_err(|e| anyhow!("invalid peer address `{s}`, {e}"))?;
        match url.scheme() {
            "tcp" => {
                let host = url.host_str().ok_or_else(|| anyhow!("peer address `{s}` has no host"))?;
                let port = url.port().ok_or_else(|| anyhow!("peer address `{s}` has no port"))?;
                Ok(PeerAddr::Tcp(format!("{host}:{port}")))
            }
            "ws" | "wss" => Ok(PeerAddr::Ws(url.to_string())),
            scheme => Err(anyhow!("unsupported peer scheme `{scheme}` in `{s}`")),
        }
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerAddr::Tcp(addr) => write!(f, "tcp://{addr}"),
            PeerAddr::Ws(url) => f.write_str(url),
        }
    }
}

impl<'de> Deserialize<'de> for PeerAddr {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let addr = String::deserialize(deserializer)?;
        PeerAddr::from_str(&addr).map_err(de::Error::custom)
    }
}
