//! Edge lifecycle: Connecting -> Connected -> Disconnecting -> Disconnected.
//!
//! The state only changes through [`Edge::transition`], which runs the entry
//! action of the new state exactly once. Disconnected is terminal and
//! Disconnecting may only move on to Disconnected.

use directmq_codec::{
    ConnectionAccepted, DataFrame, GracefullyClose, InitConnection, Packet, Publish, Subscribe,
    SupportedProtocolVersions, TerminateNetwork, Unsubscribe, PROTOCOL_VERSION, UNKNOWN_PROTOCOL_VERSION,
};

use super::{Edge, EdgeStatus};
use crate::config::{ONLY_DIRECT_CONNECTION_TTL, ONLY_DIRECT_CONNECTION_WITH_RESPONSE_TTL};
use crate::diagnostics::DiagnosticEvent;
use crate::network::{Action, Context};
use crate::topic::diff_overlapping;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Connecting {
    /// This side opened the connection and starts the version exchange.
    initiator: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Connected;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Disconnecting {
    reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Disconnected {
    reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EdgeState {
    Connecting(Connecting),
    Connected(Connected),
    Disconnecting(Disconnecting),
    Disconnected(Disconnected),
}

impl EdgeState {
    #[inline]
    pub(crate) fn connecting(initiator: bool) -> Self {
        EdgeState::Connecting(Connecting { initiator })
    }

    #[inline]
    fn disconnecting<S: Into<String>>(reason: S) -> Self {
        EdgeState::Disconnecting(Disconnecting { reason: reason.into() })
    }

    #[inline]
    fn disconnected<S: Into<String>>(reason: S) -> Self {
        EdgeState::Disconnected(Disconnected { reason: reason.into() })
    }

    #[inline]
    pub(crate) fn status(&self) -> EdgeStatus {
        match self {
            EdgeState::Connecting(_) => EdgeStatus::Connecting,
            EdgeState::Connected(_) => EdgeStatus::Connected,
            EdgeState::Disconnecting(_) => EdgeStatus::Disconnecting,
            EdgeState::Disconnected(_) => EdgeStatus::Disconnected,
        }
    }

    fn can_move_to(&self, next: &EdgeState) -> bool {
        match (self, next) {
            (EdgeState::Disconnected(_), _) => false,
            (EdgeState::Disconnecting(_), EdgeState::Disconnected(_)) => true,
            (EdgeState::Disconnecting(_), _) => false,
            _ => true,
        }
    }
}

impl Edge {
    /// Runs the entry action of the initial state.
    pub(crate) fn start(&mut self, ctx: &mut Context<'_>) {
        self.on_set(ctx);
    }

    fn transition(&mut self, ctx: &mut Context<'_>, next: EdgeState) {
        if !self.state.can_move_to(&next) {
            log::debug!("edge {} ignores transition {:?} -> {:?}", self.id, self.state.status(), next.status());
            return;
        }
        log::debug!(
            "edge {} ({}) {:?} -> {:?}",
            self.id,
            self.info.bridged_node_id,
            self.state.status(),
            next.status()
        );
        self.state = next;
        self.on_set(ctx);
    }

    fn on_set(&mut self, ctx: &mut Context<'_>) {
        match self.state {
            EdgeState::Connecting(Connecting { initiator }) => {
                if initiator {
                    let packet = Packet::SupportedProtocolVersions(SupportedProtocolVersions {
                        frame: DataFrame::new(ONLY_DIRECT_CONNECTION_WITH_RESPONSE_TTL, vec![ctx.config.host_id.clone()]),
                        supported_versions: vec![PROTOCOL_VERSION],
                    });
                    if let Err(e) = self.link.write(&packet) {
                        self.transition(
                            ctx,
                            EdgeState::disconnected(format!("Supported protocol version negotiation failed: {e}")),
                        );
                    }
                }
            }
            EdgeState::Connected(_) => {
                log::info!("edge {} connected to {}", self.id, self.info.bridged_node_id);
                ctx.diagnostic(DiagnosticEvent::ConnectionEstablished(self.info.bridged_node_id.clone()));
                ctx.push(Action::Sync(self.id));
            }
            EdgeState::Disconnecting(Disconnecting { ref reason }) => {
                let reason = reason.clone();
                let packet = Packet::GracefullyClose(GracefullyClose {
                    frame: DataFrame::new(ONLY_DIRECT_CONNECTION_TTL, vec![ctx.config.host_id.clone()]),
                    reason: reason.clone(),
                });
                if let Err(e) = self.link.write(&packet) {
                    log::debug!("edge {} could not say goodbye: {e}", self.id);
                }
                self.transition(ctx, EdgeState::disconnected(reason));
            }
            EdgeState::Disconnected(Disconnected { ref reason }) => {
                let reason = reason.clone();
                self.link.close();
                log::info!("edge {} lost connection to {:?}, reason: {reason}", self.id, self.info.bridged_node_id);
                ctx.diagnostic(DiagnosticEvent::ConnectionLost(self.info.bridged_node_id.clone(), reason));

                // everything the neighbor asked for is revoked on its behalf,
                // as if it had sent the unsubscriptions itself
                let bridged = self.info.bridged_node_id.clone();
                for topic in self.subscriptions.top_level_topics() {
                    ctx.push(Action::Unsubscribed(Unsubscribe {
                        frame: DataFrame::new(ctx.config.host_ttl, vec![bridged.clone()]),
                        topic,
                    }));
                }
                self.subscriptions.clear();
                self.info.reset();
            }
        }
    }

    /// Local request to drop the connection, a no-op once disconnecting.
    pub(crate) fn disconnect<S: Into<String>>(&mut self, ctx: &mut Context<'_>, reason: S) {
        match self.state {
            EdgeState::Connecting(_) | EdgeState::Connected(_) => {
                self.transition(ctx, EdgeState::disconnecting(reason))
            }
            EdgeState::Disconnecting(_) | EdgeState::Disconnected(_) => {}
        }
    }

    /// Handles one frame received from the neighbor.
    pub(crate) fn on_packet(&mut self, ctx: &mut Context<'_>, packet: Packet) {
        log::trace!("edge {} received {}", self.id, packet.name());
        match self.state {
            EdgeState::Connecting(_) => self.on_connecting_packet(ctx, packet),
            EdgeState::Connected(_) => self.on_connected_packet(ctx, packet),
            EdgeState::Disconnecting(_) | EdgeState::Disconnected(_) => {}
        }
    }

    fn on_connecting_packet(&mut self, ctx: &mut Context<'_>, packet: Packet) {
        match packet {
            Packet::SupportedProtocolVersions(m) => self.on_supported_protocol_versions(ctx, m),
            Packet::InitConnection(m) => self.on_init_connection(ctx, m),
            Packet::ConnectionAccepted(m) => self.on_connection_accepted(ctx, m),
            Packet::GracefullyClose(m) => self.transition(ctx, EdgeState::disconnected(m.reason)),
            Packet::TerminateNetwork(_) => self.transition(ctx, EdgeState::disconnected("Network terminated")),
            Packet::Publish(_) => self.disconnect(ctx, "Unexpected publish message in connection process"),
            Packet::Subscribe(_) => self.disconnect(ctx, "Unexpected subscribe message in connection process"),
            Packet::Unsubscribe(_) => self.disconnect(ctx, "Unexpected unsubscribe message in connection process"),
            Packet::Malformed(m) => {
                log::debug!("edge {} got a malformed frame: {}", self.id, m.reason);
                self.disconnect(ctx, "Malformed message in connection process")
            }
        }
    }

    fn on_supported_protocol_versions(&mut self, ctx: &mut Context<'_>, m: SupportedProtocolVersions) {
        // only one protocol version exists, anything else on offer is a mismatch
        if m.supported_versions.is_empty() || m.supported_versions.iter().any(|v| *v != PROTOCOL_VERSION) {
            return self.disconnect(
                ctx,
                format!("Supported protocol version negotiation failed: unsupported versions {:?}", m.supported_versions),
            );
        }
        self.info.bridged_supported_versions = m.supported_versions.clone();
        self.info.negotiated_version = PROTOCOL_VERSION;

        let host_id = ctx.config.host_id.clone();
        let packet = if m.frame.ttl == ONLY_DIRECT_CONNECTION_WITH_RESPONSE_TTL {
            let mut traversed = m.frame.traversed;
            traversed.push(host_id);
            Packet::SupportedProtocolVersions(SupportedProtocolVersions {
                frame: DataFrame::new(ONLY_DIRECT_CONNECTION_TTL, traversed),
                supported_versions: vec![PROTOCOL_VERSION],
            })
        } else {
            Packet::InitConnection(InitConnection {
                frame: DataFrame::new(ONLY_DIRECT_CONNECTION_TTL, vec![host_id]),
                max_message_size: ctx.config.host_max_incoming_message_size,
            })
        };
        if let Err(e) = self.link.write(&packet) {
            self.transition(ctx, EdgeState::disconnected(format!("Supported protocol version negotiation failed: {e}")));
        }
    }

    /// Both connection messages must follow the version exchange and come straight from the neighbor.
    fn check_bridged_frame(&self, frame: &DataFrame) -> Result<(), &'static str> {
        if self.info.negotiated_version == UNKNOWN_PROTOCOL_VERSION {
            return Err("protocol version not negotiated");
        }
        if frame.traversed.len() != 1 {
            return Err("frame must carry exactly the bridged node id");
        }
        Ok(())
    }

    fn on_init_connection(&mut self, ctx: &mut Context<'_>, m: InitConnection) {
        if let Err(e) = self.check_bridged_frame(&m.frame) {
            return self.disconnect(ctx, format!("Connection initialization failed: {e}"));
        }
        self.info.bridged_node_id = m.frame.traversed[0].clone();
        self.info.bridged_max_message_size = m.max_message_size;

        let packet = Packet::ConnectionAccepted(ConnectionAccepted {
            frame: DataFrame::new(ONLY_DIRECT_CONNECTION_TTL, vec![ctx.config.host_id.clone()]),
            max_message_size: ctx.config.host_max_incoming_message_size,
        });
        match self.link.write(&packet) {
            Ok(()) => self.transition(ctx, EdgeState::Connected(Connected)),
            Err(e) => {
                self.transition(ctx, EdgeState::disconnected(format!("Connection initialization failed: {e}")))
            }
        }
    }

    fn on_connection_accepted(&mut self, ctx: &mut Context<'_>, m: ConnectionAccepted) {
        if let Err(e) = self.check_bridged_frame(&m.frame) {
            return self.disconnect(ctx, format!("Connection acceptance failed: {e}"));
        }
        self.info.bridged_node_id = m.frame.traversed[0].clone();
        self.info.bridged_max_message_size = m.max_message_size;
        self.transition(ctx, EdgeState::Connected(Connected));
    }

    fn on_connected_packet(&mut self, ctx: &mut Context<'_>, packet: Packet) {
        match packet {
            Packet::SupportedProtocolVersions(_) => {
                self.disconnect(ctx, "Received supported protocol versions message in connected state")
            }
            Packet::InitConnection(_) => {
                self.disconnect(ctx, "Received connection initialization message in connected state")
            }
            Packet::ConnectionAccepted(_) => {
                self.disconnect(ctx, "Received connection accepted message in connected state")
            }
            Packet::Malformed(m) => {
                log::debug!("edge {} got a malformed frame: {}", self.id, m.reason);
                self.disconnect(ctx, "Malformed message received")
            }
            Packet::GracefullyClose(m) => self.transition(ctx, EdgeState::disconnected(m.reason)),
            Packet::TerminateNetwork(m) => {
                self.transition(ctx, EdgeState::disconnected(m.reason.clone()));
                ctx.push(Action::Terminated(m));
            }
            Packet::Publish(m) => ctx.push(Action::Published(m)),
            Packet::Subscribe(m) => self.on_subscribe(ctx, m),
            Packet::Unsubscribe(m) => self.on_unsubscribe(ctx, m),
        }
    }

    fn on_subscribe(&mut self, ctx: &mut Context<'_>, m: Subscribe) {
        let before = self.subscriptions.top_level_topics();
        if let Err(e) = self.subscriptions.add(&m.topic, ()) {
            return self.disconnect(ctx, format!("Invalid subscription received: {e}"));
        }
        self.announce_changes(ctx, &before, &m.frame);
    }

    fn on_unsubscribe(&mut self, ctx: &mut Context<'_>, m: Unsubscribe) {
        let Some(id) = self.subscriptions.find_by_pattern(&m.topic).map(|s| s.id()) else {
            log::debug!("edge {} ignores unsubscribe from unknown topic {}", self.id, m.topic);
            return;
        };
        let before = self.subscriptions.top_level_topics();
        self.subscriptions.remove(id);
        self.announce_changes(ctx, &before, &m.frame);
    }

    /// Turns a change of the neighbor's top-level set into network events.
    fn announce_changes(&mut self, ctx: &mut Context<'_>, before: &[String], frame: &DataFrame) {
        let (removed, added) = diff_overlapping(before, &self.subscriptions.top_level_topics());
        for topic in added {
            ctx.push(Action::Subscribed(Subscribe { frame: frame.clone(), topic }));
        }
        for topic in removed {
            ctx.push(Action::Unsubscribed(Unsubscribe { frame: frame.clone(), topic }));
        }
    }

    /// Forwards a publication, true when it was handed to the neighbor.
    pub(crate) fn handle_publish(&mut self, ctx: &mut Context<'_>, msg: &Publish) -> bool {
        if !self.is_connected() || self.is_origin(&msg.frame) {
            return false;
        }
        if !self.subscriptions.will_handle_topic(&msg.topic) {
            return false;
        }
        let frame = self.updated_frame(ctx, &msg.frame);
        if !self.should_forward(ctx, &frame) {
            return false;
        }
        let limit = self.info.bridged_max_message_size;
        if limit != 0 && msg.payload.len() as u64 > limit {
            log::debug!("edge {} drops {} bytes on {}, limit is {limit}", self.id, msg.payload.len(), msg.topic);
            return false;
        }

        let packet = Packet::Publish(Publish {
            frame,
            topic: msg.topic.clone(),
            delivery_strategy: msg.delivery_strategy,
            payload: msg.payload.clone(),
        });
        match self.link.write(&packet) {
            Ok(()) => true,
            Err(e) => {
                self.disconnect(ctx, format!("Failed to publish message: {e}"));
                false
            }
        }
    }

    pub(crate) fn handle_subscribe(&mut self, ctx: &mut Context<'_>, msg: &Subscribe) {
        if !self.is_connected() || self.is_origin(&msg.frame) {
            return;
        }
        let frame = self.updated_frame(ctx, &msg.frame);
        if !self.should_forward(ctx, &frame) {
            return;
        }
        let packet = Packet::Subscribe(Subscribe { frame, topic: msg.topic.clone() });
        if let Err(e) = self.link.write(&packet) {
            self.disconnect(ctx, format!("Failed to subscribe: {e}"));
        }
    }

    pub(crate) fn handle_unsubscribe(&mut self, ctx: &mut Context<'_>, msg: &Unsubscribe) {
        if !self.is_connected() || self.is_origin(&msg.frame) {
            return;
        }
        let frame = self.updated_frame(ctx, &msg.frame);
        if !self.should_forward(ctx, &frame) {
            return;
        }
        let packet = Packet::Unsubscribe(Unsubscribe { frame, topic: msg.topic.clone() });
        if let Err(e) = self.link.write(&packet) {
            self.disconnect(ctx, format!("Failed to unsubscribe: {e}"));
        }
    }

    /// Network-wide termination reaching this edge.
    pub(crate) fn handle_terminate(&mut self, ctx: &mut Context<'_>, msg: &TerminateNetwork) {
        match self.state {
            EdgeState::Connecting(_) => self.disconnect(ctx, format!("Network terminated: {}", msg.reason)),
            EdgeState::Connected(_) => {
                let mut traversed = msg.frame.traversed.clone();
                traversed.push(ctx.config.host_id.clone());
                let packet = Packet::TerminateNetwork(TerminateNetwork {
                    frame: DataFrame::new(ONLY_DIRECT_CONNECTION_TTL, traversed),
                    reason: msg.reason.clone(),
                });
                let next = match self.link.write(&packet) {
                    Ok(()) => EdgeState::disconnected(msg.reason.clone()),
                    Err(e) => EdgeState::disconnected(format!("Failed to terminate network edge: {e}")),
                };
                self.transition(ctx, next);
            }
            EdgeState::Disconnecting(_) | EdgeState::Disconnected(_) => {}
        }
    }

    /// Sends the current subscriptions of the rest of the node to a freshly connected neighbor.
    pub(crate) fn sync(&mut self, ctx: &mut Context<'_>, topics: Vec<String>) {
        if !self.is_connected() {
            return;
        }
        let frame = DataFrame::new(ctx.config.host_ttl - 1, vec![ctx.config.host_id.clone()]);
        if frame.ttl <= 0 {
            return;
        }
        for topic in topics {
            let packet = Packet::Subscribe(Subscribe { frame: frame.clone(), topic });
            if let Err(e) = self.link.write(&packet) {
                return self.disconnect(ctx, format!("Failed to exchange subscriptions: {e}"));
            }
        }
    }
}
