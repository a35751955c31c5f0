//! Observation hooks. Nothing reported here feeds back into routing.

use directmq_codec::{Publish, Subscribe, TerminateNetwork, Unsubscribe};
use directmq_utils::NodeId;

/// Callbacks for network observations, every method defaults to a no-op.
///
/// Callbacks run after the node lock is released, so they may call back into
/// the node.
pub trait DiagnosticsHandler: Send + Sync {
    fn on_connection_established(&self, _bridged_node_id: &str) {}

    fn on_connection_lost(&self, _bridged_node_id: &str, _reason: &str) {}

    fn on_publication(&self, _msg: &Publish) {}

    fn on_subscription(&self, _msg: &Subscribe) {}

    fn on_unsubscription(&self, _msg: &Unsubscribe) {}

    fn on_network_termination(&self, _msg: &TerminateNetwork) {}
}

/// Reports every observation through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDiagnostics;

impl DiagnosticsHandler for LogDiagnostics {
    fn on_connection_established(&self, bridged_node_id: &str) {
        log::info!("connection established with {bridged_node_id}");
    }

    fn on_connection_lost(&self, bridged_node_id: &str, reason: &str) {
        log::info!("connection lost with {bridged_node_id:?}, reason: {reason}");
    }

    fn on_publication(&self, msg: &Publish) {
        log::debug!(
            "publication on {} ({}, {} bytes), ttl: {}, traversed: {:?}",
            msg.topic,
            msg.delivery_strategy,
            msg.payload.len(),
            msg.frame.ttl,
            msg.frame.traversed
        );
    }

    fn on_subscription(&self, msg: &Subscribe) {
        log::debug!("subscription to {}, ttl: {}, traversed: {:?}", msg.topic, msg.frame.ttl, msg.frame.traversed);
    }

    fn on_unsubscription(&self, msg: &Unsubscribe) {
        log::debug!("unsubscription from {}, ttl: {}, traversed: {:?}", msg.topic, msg.frame.ttl, msg.frame.traversed);
    }

    fn on_network_termination(&self, msg: &TerminateNetwork) {
        log::warn!("network terminated, reason: {}, traversed: {:?}", msg.reason, msg.frame.traversed);
    }
}

/// An observation recorded under the node lock, reported after it is released.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum DiagnosticEvent {
    ConnectionEstablished(NodeId),
    ConnectionLost(NodeId, String),
    Publication(Publish),
    Subscription(Subscribe),
    Unsubscription(Unsubscribe),
    NetworkTermination(TerminateNetwork),
}

impl DiagnosticEvent {
    pub(crate) fn report(&self, handler: &dyn DiagnosticsHandler) {
        match self {
            DiagnosticEvent::ConnectionEstablished(id) => handler.on_connection_established(id),
            DiagnosticEvent::ConnectionLost(id, reason) => handler.on_connection_lost(id, reason),
            DiagnosticEvent::Publication(msg) => handler.on_publication(msg),
            DiagnosticEvent::Subscription(msg) => handler.on_subscription(msg),
            DiagnosticEvent::Unsubscription(msg) => handler.on_unsubscription(msg),
            DiagnosticEvent::NetworkTermination(msg) => handler.on_network_termination(msg),
        }
    }
}
