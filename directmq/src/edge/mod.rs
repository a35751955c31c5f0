//! One connection to a neighboring node.

use directmq_codec::{DataFrame, Packet, TerminateNetwork};
use directmq_utils::NodeId;
use itertools::Itertools;

use crate::config::ONLY_DIRECT_CONNECTION_TTL;
use crate::error::DirectMqError;
use crate::network::{Action, Context};
use crate::subscription::SubscriptionList;

mod state;

pub(crate) use state::EdgeState;

/// Node-local edge handle.
pub type EdgeId = u64;

/// Lifecycle phase of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeStatus {
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
}

/// What is known about the neighbor, empty until the handshake completes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeInfo {
    pub bridged_node_id: NodeId,
    pub bridged_max_message_size: u64,
    pub bridged_supported_versions: Vec<u32>,
    pub negotiated_version: u32,
}

impl EdgeInfo {
    #[inline]
    fn reset(&mut self) {
        *self = EdgeInfo::default();
    }
}

/// Outgoing half of a portal as seen by the state machine.
///
/// `write` must not block, transports queue frames and report late write
/// failures back to the node.
pub trait Outbound: Send {
    fn write(&mut self, packet: &Packet) -> Result<(), DirectMqError>;

    fn close(&mut self);
}

pub struct Edge {
    id: EdgeId,
    link: Box<dyn Outbound>,
    info: EdgeInfo,
    subscriptions: SubscriptionList<()>,
    state: EdgeState,
}

impl Edge {
    pub(crate) fn new(id: EdgeId, link: Box<dyn Outbound>, initiator: bool) -> Self {
        Self {
            id,
            link,
            info: EdgeInfo::default(),
            subscriptions: SubscriptionList::new(),
            state: EdgeState::connecting(initiator),
        }
    }

    #[inline]
    pub fn id(&self) -> EdgeId {
        self.id
    }

    #[inline]
    pub fn info(&self) -> &EdgeInfo {
        &self.info
    }

    /// Patterns the neighbor asked for, one entry per received subscribe.
    #[inline]
    pub fn subscriptions(&self) -> &SubscriptionList<()> {
        &self.subscriptions
    }

    #[inline]
    pub fn status(&self) -> EdgeStatus {
        self.state.status()
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.status() == EdgeStatus::Connected
    }

    #[inline]
    pub fn is_disconnected(&self) -> bool {
        self.status() == EdgeStatus::Disconnected
    }

    #[inline]
    pub(crate) fn top_level_topics(&self) -> Vec<String> {
        self.subscriptions.top_level_topics()
    }

    /// Whether the frame came from this edge's neighbor.
    #[inline]
    fn is_origin(&self, frame: &DataFrame) -> bool {
        !self.info.bridged_node_id.is_empty() && frame.last_hop() == Some(self.info.bridged_node_id.as_str())
    }

    /// Frame for the next hop.
    fn updated_frame(&self, ctx: &Context<'_>, frame: &DataFrame) -> DataFrame {
        let mut traversed = frame.traversed.clone();
        traversed.push(ctx.config.host_id.clone());
        DataFrame::new(frame.ttl.saturating_sub(1), traversed)
    }

    /// Loop and TTL gate for an updated frame, a loop terminates the network.
    fn should_forward(&self, ctx: &mut Context<'_>, frame: &DataFrame) -> bool {
        if !frame.traversed.iter().all_unique() {
            let path = frame.traversed.join(" -> ");
            log::warn!("edge {} detected a routing loop: {path}", self.id);
            ctx.push(Action::Terminated(TerminateNetwork {
                frame: DataFrame::new(ONLY_DIRECT_CONNECTION_TTL, vec![]),
                reason: format!("Loop detected: {path}"),
            }));
            return false;
        }
        frame.ttl > 0
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorded {
        sent: Vec<Packet>,
        closed: bool,
    }

    /// An outbound link that keeps what is written, for driving edges by hand.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingLink {
        inner: Arc<Mutex<Recorded>>,
    }

    impl RecordingLink {
        pub(crate) fn take(&self) -> Vec<Packet> {
            std::mem::take(&mut self.inner.lock().sent)
        }

        pub(crate) fn is_closed(&self) -> bool {
            self.inner.lock().closed
        }
    }

    impl Outbound for RecordingLink {
        fn write(&mut self, packet: &Packet) -> Result<(), DirectMqError> {
            let mut inner = self.inner.lock();
            if inner.closed {
                return Err(DirectMqError::PortalClosed);
            }
            inner.sent.push(packet.clone());
            Ok(())
        }

        fn close(&mut self) {
            self.inner.lock().closed = true;
        }
    }
}
