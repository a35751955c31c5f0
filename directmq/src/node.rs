//! The async face of a node: portals in, handlers and diagnostics out.

use std::sync::{Arc, Weak};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use directmq_codec::{DeliveryStrategy, Packet, ProtocolCodec};
use directmq_net::Portal;
use directmq_utils::NodeId;

use crate::config::NetworkNodeConfig;
use crate::diagnostics::DiagnosticsHandler;
use crate::edge::{EdgeId, EdgeInfo, EdgeStatus, Outbound};
use crate::error::DirectMqError;
use crate::native::Handler;
use crate::network::{Event, Network};
use crate::subscription::SubscriptionId;

enum Outgoing {
    Frame(Bytes),
    Close,
}

/// Outbound half of a portal, frames are handed to the writer task.
struct PortalLink {
    codec: ProtocolCodec,
    tx: mpsc::UnboundedSender<Outgoing>,
    cancel: CancellationToken,
}

impl Outbound for PortalLink {
    fn write(&mut self, packet: &Packet) -> Result<(), DirectMqError> {
        let data = self.codec.encode(packet)?;
        self.tx.send(Outgoing::Frame(data)).map_err(|_| DirectMqError::PortalClosed)
    }

    fn close(&mut self) {
        let _ = self.tx.send(Outgoing::Close);
        self.cancel.cancel();
    }
}

struct Inner {
    network: Mutex<Network>,
    codec: ProtocolCodec,
    diagnostics: RwLock<Option<Arc<dyn DiagnosticsHandler>>>,
}

impl Inner {
    /// Runs `f` on the locked network, then dispatches what it produced.
    fn handle<R>(&self, f: impl FnOnce(&mut Network) -> R) -> R {
        let (r, events) = {
            let mut network = self.network.lock();
            let r = f(&mut network);
            (r, network.take_events())
        };
        self.dispatch(events);
        r
    }

    fn dispatch(&self, events: Vec<Event>) {
        if events.is_empty() {
            return;
        }
        let diagnostics = self.diagnostics.read().clone();
        for event in events {
            match event {
                Event::Deliver { handler, topic, payload } => handler(&topic, payload),
                Event::Diagnostic(d) => {
                    if let Some(diagnostics) = diagnostics.as_ref() {
                        d.report(diagnostics.as_ref());
                    }
                }
            }
        }
    }
}

/// A DirectMQ node.
///
/// Cloning yields another handle to the same node. Edges spawn their reader
/// and writer on the current tokio runtime, so portals must be added from
/// within one.
#[derive(Clone)]
pub struct NetworkNode {
    inner: Arc<Inner>,
}

impl NetworkNode {
    pub fn new(config: NetworkNodeConfig, codec: ProtocolCodec) -> Result<Self, DirectMqError> {
        config.validate()?;
        log::info!(
            "node {} created, ttl: {}, max incoming message size: {}, format: {}",
            config.host_id,
            config.host_ttl,
            config.host_max_incoming_message_size,
            codec.format()
        );
        Ok(Self {
            inner: Arc::new(Inner {
                network: Mutex::new(Network::new(config)),
                codec,
                diagnostics: RwLock::new(None),
            }),
        })
    }

    #[inline]
    pub fn config(&self) -> NetworkNodeConfig {
        self.inner.network.lock().config().clone()
    }

    #[inline]
    pub fn codec(&self) -> ProtocolCodec {
        self.inner.codec
    }

    pub fn set_diagnostics<D: DiagnosticsHandler + 'static>(&self, diagnostics: D) {
        *self.inner.diagnostics.write() = Some(Arc::new(diagnostics));
    }

    /// Adopts a portal opened by the neighbor, which starts the handshake.
    pub fn add_listening_edge<P: Portal>(&self, portal: P) -> EdgeId {
        self.add_edge(portal, false)
    }

    /// Adopts a portal this node opened and starts the handshake.
    pub fn add_connecting_edge<P: Portal>(&self, portal: P) -> EdgeId {
        self.add_edge(portal, true)
    }

    fn add_edge<P: Portal>(&self, portal: P, initiator: bool) -> EdgeId {
        let (sink, stream) = portal.split();
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let link = PortalLink { codec: self.inner.codec, tx, cancel: cancel.clone() };

        let id = self.inner.handle(|network| network.add_edge(Box::new(link), initiator));
        log::debug!("edge {id} added, initiator: {initiator}");

        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(write_loop(weak.clone(), id, sink, rx));
        tokio::spawn(read_loop(weak, id, stream, cancel));
        id
    }

    /// Gracefully disconnects one edge, unknown ids are ignored.
    pub fn remove_edge<S: Into<String>>(&self, id: EdgeId, reason: S) {
        self.inner.handle(|network| network.disconnect_edge(id, reason));
    }

    /// Gracefully disconnects every edge.
    pub fn close_node(&self, reason: &str) {
        log::info!("closing node, reason: {reason}");
        self.inner.handle(|network| network.close(reason));
    }

    pub fn publish<P: Into<Bytes>>(
        &self,
        topic: &str,
        payload: P,
        delivery_strategy: DeliveryStrategy,
    ) -> Result<(), DirectMqError> {
        let payload = payload.into();
        self.inner.handle(|network| network.publish(topic, payload, delivery_strategy))
    }

    /// Registers `handler` for publications matching `topic`.
    pub fn subscribe<F>(&self, topic: &str, handler: F) -> Result<SubscriptionId, DirectMqError>
    where
        F: Fn(&str, Bytes) + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(handler);
        self.inner.handle(|network| network.subscribe(topic, handler))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.handle(|network| network.unsubscribe(id));
    }

    /// Ids of the directly connected neighbors.
    pub fn bridged_node_ids(&self) -> Vec<NodeId> {
        self.inner.network.lock().bridged_node_ids()
    }

    /// `None` once the edge is gone.
    pub fn edge_status(&self, id: EdgeId) -> Option<EdgeStatus> {
        self.inner.network.lock().edge_status(id)
    }

    pub fn edge_info(&self, id: EdgeId) -> Option<EdgeInfo> {
        self.inner.network.lock().edge(id).map(|e| e.info().clone())
    }
}

async fn write_loop<S>(inner: Weak<Inner>, id: EdgeId, mut sink: S, mut rx: mpsc::UnboundedReceiver<Outgoing>)
where
    S: futures::Sink<Bytes, Error = directmq_net::PortalError> + Unpin,
{
    while let Some(out) = rx.recv().await {
        match out {
            Outgoing::Frame(data) => {
                if let Err(e) = sink.send(data).await {
                    log::debug!("edge {id} write error, {e}");
                    if let Some(inner) = inner.upgrade() {
                        inner.handle(|network| network.disconnect_edge(id, format!("Failed to write frame: {e}")));
                    }
                    break;
                }
            }
            Outgoing::Close => break,
        }
    }
    if let Err(e) = sink.close().await {
        log::debug!("edge {id} close error, {e}");
    }
}

async fn read_loop<S>(inner: Weak<Inner>, id: EdgeId, mut stream: S, cancel: CancellationToken)
where
    S: futures::Stream<Item = Result<Bytes, directmq_net::PortalError>> + Unpin,
{
    loop {
        let item = tokio::select! {
            _ = cancel.cancelled() => break,
            item = stream.next() => item,
        };
        let Some(node) = inner.upgrade() else {
            break;
        };
        match item {
            Some(Ok(data)) => {
                let packet = node.codec.decode(data);
                if !node.handle(|network| network.on_packet(id, packet)) {
                    break;
                }
            }
            Some(Err(e)) => {
                node.handle(|network| network.disconnect_edge(id, format!("Failed to read frame: {e}")));
                break;
            }
            None => {
                node.handle(|network| network.disconnect_edge(id, "Portal closed"));
                break;
            }
        }
    }
    log::debug!("edge {id} reader stopped");
}
