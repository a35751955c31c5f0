//! The routing core of one node.
//!
//! [`Network`] owns every participant: the native API and the edges. It is
//! driven synchronously under the node lock. Participants never call each
//! other directly, they queue [`Action`]s that the network drains in FIFO
//! order before returning, so an edge may react to events caused by another
//! edge without aliasing borrows. Handler deliveries and diagnostics are
//! collected as [`Event`]s and run by the caller once the lock is released.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use bytes::Bytes;
use directmq_codec::{DeliveryStrategy, Publish, Subscribe, TerminateNetwork, Unsubscribe};
use directmq_utils::{random_order, NodeId};

use crate::config::NetworkNodeConfig;
use crate::diagnostics::DiagnosticEvent;
use crate::edge::{Edge, EdgeId, EdgeStatus, Outbound};
use crate::error::DirectMqError;
use crate::native::{Handler, NativeApi};
use crate::subscription::SubscriptionId;

/// Work queued by a participant for the whole network.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Action {
    Published(Publish),
    Subscribed(Subscribe),
    Unsubscribed(Unsubscribe),
    Terminated(TerminateNetwork),
    /// Send the node's subscriptions to a freshly connected edge.
    Sync(EdgeId),
}

/// Work for the caller once the node lock is released.
pub(crate) enum Event {
    Deliver { handler: Handler, topic: String, payload: Bytes },
    Diagnostic(DiagnosticEvent),
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Deliver { topic, payload, .. } => write!(f, "Deliver({topic}, {} bytes)", payload.len()),
            Event::Diagnostic(e) => write!(f, "Diagnostic({e:?})"),
        }
    }
}

/// What a participant may touch while handling an event.
pub(crate) struct Context<'a> {
    pub config: &'a NetworkNodeConfig,
    actions: &'a mut VecDeque<Action>,
    events: &'a mut Vec<Event>,
}

impl Context<'_> {
    #[inline]
    pub(crate) fn push(&mut self, action: Action) {
        self.actions.push_back(action);
    }

    #[inline]
    pub(crate) fn diagnostic(&mut self, event: DiagnosticEvent) {
        self.events.push(Event::Diagnostic(event));
    }

    #[inline]
    pub(crate) fn deliver(&mut self, event: Event) {
        self.events.push(event);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Participant {
    Native,
    Edge(EdgeId),
}

pub(crate) struct Network {
    config: NetworkNodeConfig,
    native: NativeApi,
    edges: BTreeMap<EdgeId, Edge>,
    next_edge_id: EdgeId,
    actions: VecDeque<Action>,
    events: Vec<Event>,
}

impl Network {
    pub(crate) fn new(config: NetworkNodeConfig) -> Self {
        Self {
            config,
            native: NativeApi::default(),
            edges: BTreeMap::new(),
            next_edge_id: 1,
            actions: VecDeque::new(),
            events: Vec::new(),
        }
    }

    #[inline]
    pub(crate) fn config(&self) -> &NetworkNodeConfig {
        &self.config
    }

    /// Events collected since the last call.
    #[inline]
    pub(crate) fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    fn edge_ctx(&mut self, id: EdgeId) -> Option<(&mut Edge, Context<'_>)> {
        let Network { config, edges, actions, events, .. } = self;
        let edge = edges.get_mut(&id)?;
        Some((edge, Context { config, actions, events }))
    }

    pub(crate) fn add_edge(&mut self, link: Box<dyn Outbound>, initiator: bool) -> EdgeId {
        let id = self.next_edge_id;
        self.next_edge_id += 1;
        self.edges.insert(id, Edge::new(id, link, initiator));
        if let Some((edge, mut ctx)) = self.edge_ctx(id) {
            edge.start(&mut ctx);
        }
        self.run();
        id
    }

    /// Feeds one received frame to an edge, false once the edge is gone.
    pub(crate) fn on_packet(&mut self, id: EdgeId, packet: directmq_codec::Packet) -> bool {
        let Some((edge, mut ctx)) = self.edge_ctx(id) else {
            return false;
        };
        edge.on_packet(&mut ctx, packet);
        self.run();
        self.edges.contains_key(&id)
    }

    pub(crate) fn disconnect_edge<S: Into<String>>(&mut self, id: EdgeId, reason: S) {
        if let Some((edge, mut ctx)) = self.edge_ctx(id) {
            edge.disconnect(&mut ctx, reason);
        }
        self.run();
    }

    pub(crate) fn close(&mut self, reason: &str) {
        let ids = self.edges.keys().copied().collect::<Vec<_>>();
        for id in ids {
            if let Some((edge, mut ctx)) = self.edge_ctx(id) {
                edge.disconnect(&mut ctx, reason);
            }
        }
        self.run();
    }

    pub(crate) fn publish(
        &mut self,
        topic: &str,
        payload: Bytes,
        delivery_strategy: DeliveryStrategy,
    ) -> Result<(), DirectMqError> {
        let Network { config, native, actions, events, .. } = self;
        native.publish(&mut Context { config, actions, events }, topic, payload, delivery_strategy)?;
        self.run();
        Ok(())
    }

    pub(crate) fn subscribe(&mut self, topic: &str, handler: Handler) -> Result<SubscriptionId, DirectMqError> {
        let Network { config, native, actions, events, .. } = self;
        let id = native.subscribe(&mut Context { config, actions, events }, topic, handler)?;
        self.run();
        Ok(id)
    }

    pub(crate) fn unsubscribe(&mut self, id: SubscriptionId) {
        let Network { config, native, actions, events, .. } = self;
        native.unsubscribe(&mut Context { config, actions, events }, id);
        self.run();
    }

    /// Ids of the neighbors this node is currently connected to.
    pub(crate) fn bridged_node_ids(&self) -> Vec<NodeId> {
        self.edges.values().filter(|e| e.is_connected()).map(|e| e.info().bridged_node_id.clone()).collect()
    }

    #[inline]
    pub(crate) fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(&id)
    }

    pub(crate) fn edge_status(&self, id: EdgeId) -> Option<EdgeStatus> {
        self.edges.get(&id).map(|e| e.status())
    }

    fn run(&mut self) {
        while let Some(action) = self.actions.pop_front() {
            match action {
                Action::Published(msg) => self.published(msg),
                Action::Subscribed(msg) => self.subscribed(msg),
                Action::Unsubscribed(msg) => self.unsubscribed(msg),
                Action::Terminated(msg) => self.terminated(msg),
                Action::Sync(id) => self.sync(id),
            }
        }
        self.edges.retain(|id, edge| {
            if edge.is_disconnected() {
                log::debug!("edge {id} removed");
            }
            !edge.is_disconnected()
        });
    }

    fn published(&mut self, msg: Publish) {
        self.events.push(Event::Diagnostic(DiagnosticEvent::Publication(msg.clone())));

        let mut participants = std::iter::once(Participant::Native)
            .chain(self.edges.iter().filter(|(_, e)| !e.is_disconnected()).map(|(id, _)| Participant::Edge(*id)))
            .collect::<Vec<_>>();
        random_order(&mut participants);

        let Network { config, native, edges, actions, events, .. } = self;
        let mut ctx = Context { config, actions, events };
        for participant in participants {
            let handled = match participant {
                Participant::Native => native.handle_publish(&mut ctx, &msg),
                Participant::Edge(id) => edges.get_mut(&id).is_some_and(|e| e.handle_publish(&mut ctx, &msg)),
            };
            if handled && msg.delivery_strategy == DeliveryStrategy::AtMostOnce {
                break;
            }
        }
    }

    fn subscribed(&mut self, msg: Subscribe) {
        self.events.push(Event::Diagnostic(DiagnosticEvent::Subscription(msg.clone())));
        let Network { config, edges, actions, events, .. } = self;
        let mut ctx = Context { config, actions, events };
        for edge in edges.values_mut() {
            edge.handle_subscribe(&mut ctx, &msg);
        }
    }

    fn unsubscribed(&mut self, msg: Unsubscribe) {
        self.events.push(Event::Diagnostic(DiagnosticEvent::Unsubscription(msg.clone())));
        let Network { config, edges, actions, events, .. } = self;
        let mut ctx = Context { config, actions, events };
        for edge in edges.values_mut() {
            edge.handle_unsubscribe(&mut ctx, &msg);
        }
    }

    fn terminated(&mut self, msg: TerminateNetwork) {
        log::warn!("network terminated, reason: {}", msg.reason);
        self.events.push(Event::Diagnostic(DiagnosticEvent::NetworkTermination(msg.clone())));
        let Network { config, edges, actions, events, .. } = self;
        let mut ctx = Context { config, actions, events };
        for edge in edges.values_mut() {
            edge.handle_terminate(&mut ctx, &msg);
        }
    }

    /// Top-level topics of every other participant, one participant after another.
    fn sync(&mut self, id: EdgeId) {
        let mut topics = self.native.top_level_topics();
        for (other, edge) in self.edges.iter() {
            if *other != id && edge.is_connected() {
                topics.extend(edge.top_level_topics());
            }
        }
        if let Some((edge, mut ctx)) = self.edge_ctx(id) {
            edge.sync(&mut ctx, topics);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use directmq_codec::{DataFrame, GracefullyClose, Packet, SupportedProtocolVersions, PROTOCOL_VERSION};
    use parking_lot::Mutex;

    use super::*;
    use crate::edge::testing::RecordingLink;

    type Inbox = Arc<Mutex<Vec<(String, Bytes)>>>;

    fn inbox_handler(inbox: &Inbox) -> Handler {
        let inbox = inbox.clone();
        Arc::new(move |topic: &str, payload: Bytes| inbox.lock().push((topic.to_string(), payload)))
    }

    struct End {
        node: usize,
        edge: EdgeId,
        link: RecordingLink,
    }

    /// Nodes wired together with recording links, frames are moved by [`Mesh::pump`].
    struct Mesh {
        nodes: Vec<Network>,
        wires: Vec<(End, End)>,
        /// Every frame moved, as (sender, receiver, packet).
        history: Vec<(usize, usize, Packet)>,
        diagnostics: Vec<Vec<DiagnosticEvent>>,
    }

    impl Mesh {
        fn new(ids: &[&str], ttl: i32) -> Self {
            let nodes = ids.iter().map(|id| Network::new(NetworkNodeConfig::new(*id).ttl(ttl))).collect::<Vec<_>>();
            let diagnostics = ids.iter().map(|_| Vec::new()).collect();
            Self { nodes, wires: Vec::new(), history: Vec::new(), diagnostics }
        }

        /// `a` dials `b`.
        fn connect(&mut self, a: usize, b: usize) -> usize {
            let (la, lb) = (RecordingLink::default(), RecordingLink::default());
            let ea = self.nodes[a].add_edge(Box::new(la.clone()), true);
            let eb = self.nodes[b].add_edge(Box::new(lb.clone()), false);
            self.wires.push((End { node: a, edge: ea, link: la }, End { node: b, edge: eb, link: lb }));
            self.pump();
            self.wires.len() - 1
        }

        fn pump(&mut self) {
            loop {
                let mut moved = false;
                for w in 0..self.wires.len() {
                    for forward in [true, false] {
                        let (from, to) = if forward {
                            (&self.wires[w].0, &self.wires[w].1)
                        } else {
                            (&self.wires[w].1, &self.wires[w].0)
                        };
                        let (from_node, to_node, to_edge) = (from.node, to.node, to.edge);
                        for packet in from.link.take() {
                            moved = true;
                            self.history.push((from_node, to_node, packet.clone()));
                            self.nodes[to_node].on_packet(to_edge, packet);
                        }
                    }
                }
                self.flush();
                if !moved {
                    break;
                }
            }
        }

        /// Runs queued deliveries and keeps diagnostics.
        fn flush(&mut self) {
            for (i, node) in self.nodes.iter_mut().enumerate() {
                for event in node.take_events() {
                    match event {
                        Event::Deliver { handler, topic, payload } => handler(&topic, payload),
                        Event::Diagnostic(d) => self.diagnostics[i].push(d),
                    }
                }
            }
        }

        fn subscribe(&mut self, node: usize, topic: &str, inbox: &Inbox) -> SubscriptionId {
            let id = self.nodes[node].subscribe(topic, inbox_handler(inbox)).unwrap();
            self.pump();
            id
        }

        fn publish(&mut self, node: usize, topic: &str, payload: &'static [u8], strategy: DeliveryStrategy) {
            self.nodes[node].publish(topic, Bytes::from_static(payload), strategy).unwrap();
            self.pump();
        }

        fn sent(&self, from: usize, to: usize) -> Vec<&Packet> {
            self.history.iter().filter(|(f, t, _)| *f == from && *t == to).map(|(_, _, p)| p).collect()
        }

        fn neighbor_topics(&self, node: usize, wire: usize) -> Vec<String> {
            let (a, b) = &self.wires[wire];
            let end = if a.node == node { a } else { b };
            self.nodes[node].edge(end.edge).map(|e| e.subscriptions().topics()).unwrap_or_default()
        }
    }

    fn topics_of<'a>(packets: &[&'a Packet]) -> Vec<(&'static str, &'a str)> {
        packets
            .iter()
            .filter_map(|p| match p {
                Packet::Subscribe(m) => Some(("sub", m.topic.as_str())),
                Packet::Unsubscribe(m) => Some(("unsub", m.topic.as_str())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_handshake() {
        let mut mesh = Mesh::new(&["a", "b"], 32);
        mesh.connect(0, 1);

        let a_to_b = mesh.sent(0, 1);
        assert_eq!(
            *a_to_b[0],
            Packet::SupportedProtocolVersions(SupportedProtocolVersions {
                frame: DataFrame::new(2, vec!["a".into()]),
                supported_versions: vec![PROTOCOL_VERSION],
            })
        );
        assert!(matches!(a_to_b[1], Packet::InitConnection(m) if m.frame.traversed == vec!["a"]));
        let b_to_a = mesh.sent(1, 0);
        assert!(
            matches!(b_to_a[0], Packet::SupportedProtocolVersions(m) if m.frame.ttl == 1 && m.frame.traversed == vec!["a", "b"])
        );
        assert!(matches!(b_to_a[1], Packet::ConnectionAccepted(m) if m.frame.traversed == vec!["b"]));

        assert_eq!(mesh.nodes[0].bridged_node_ids(), vec!["b"]);
        assert_eq!(mesh.nodes[1].bridged_node_ids(), vec!["a"]);
        assert_eq!(mesh.diagnostics[0], vec![DiagnosticEvent::ConnectionEstablished("b".into())]);
        let (ea, eb) = (&mesh.wires[0].0, &mesh.wires[0].1);
        assert_eq!(mesh.nodes[0].edge(ea.edge).unwrap().info().negotiated_version, PROTOCOL_VERSION);
        assert_eq!(mesh.nodes[1].edge_status(eb.edge), Some(EdgeStatus::Connected));
    }

    #[test]
    fn test_hello_world() {
        let mut mesh = Mesh::new(&["a", "b"], 32);
        mesh.connect(0, 1);
        let inbox = Inbox::default();
        mesh.subscribe(1, "test", &inbox);
        assert_eq!(mesh.neighbor_topics(0, 0), vec!["test"]);

        mesh.publish(0, "test", b"Hello, World!", DeliveryStrategy::AtLeastOnce);
        assert_eq!(*inbox.lock(), vec![("test".to_string(), Bytes::from_static(b"Hello, World!"))]);
    }

    #[test]
    fn test_subscriptions_are_synchronized_on_connect() {
        let mut mesh = Mesh::new(&["a", "b", "c"], 32);
        let inbox = Inbox::default();
        mesh.subscribe(1, "early/*", &inbox);
        mesh.connect(0, 1);
        assert_eq!(mesh.neighbor_topics(0, 0), vec!["early/*"]);

        // c learns about a's subscription through b
        let a_inbox = Inbox::default();
        mesh.subscribe(0, "from/a", &a_inbox);
        let w = mesh.connect(2, 1);
        assert_eq!(mesh.neighbor_topics(2, w), vec!["early/*", "from/a"]);

        mesh.publish(2, "from/a", b"x", DeliveryStrategy::AtLeastOnce);
        assert_eq!(a_inbox.lock().len(), 1);
    }

    #[test]
    fn test_delivery_strategies() {
        let mut mesh = Mesh::new(&["a"], 32);
        let inbox = Inbox::default();
        for _ in 0..3 {
            mesh.subscribe(0, "t/*", &inbox);
        }
        mesh.publish(0, "t/x", b"all", DeliveryStrategy::AtLeastOnce);
        assert_eq!(inbox.lock().len(), 3);

        inbox.lock().clear();
        mesh.publish(0, "t/x", b"one", DeliveryStrategy::AtMostOnce);
        assert_eq!(inbox.lock().len(), 1);

        inbox.lock().clear();
        mesh.publish(0, "other", b"none", DeliveryStrategy::AtLeastOnce);
        assert!(inbox.lock().is_empty());
    }

    #[test]
    fn test_at_most_once_across_nodes() {
        let mut mesh = Mesh::new(&["a", "b", "c"], 32);
        mesh.connect(0, 1);
        mesh.connect(0, 2);
        let inbox = Inbox::default();
        mesh.subscribe(0, "t", &inbox);
        mesh.subscribe(1, "t", &inbox);
        mesh.subscribe(2, "t", &inbox);

        for _ in 0..20 {
            inbox.lock().clear();
            mesh.publish(0, "t", b"x", DeliveryStrategy::AtMostOnce);
            assert_eq!(inbox.lock().len(), 1);
        }
        inbox.lock().clear();
        mesh.publish(0, "t", b"x", DeliveryStrategy::AtLeastOnce);
        assert_eq!(inbox.lock().len(), 3);
    }

    #[test]
    fn test_at_most_once_spreads_over_participants() {
        let mut mesh = Mesh::new(&["a", "b", "c"], 32);
        mesh.connect(0, 1);
        mesh.connect(0, 2);
        let inboxes = [Inbox::default(), Inbox::default(), Inbox::default()];
        for (node, inbox) in inboxes.iter().enumerate() {
            mesh.subscribe(node, "t", inbox);
        }

        for _ in 0..300 {
            mesh.publish(0, "t", b"x", DeliveryStrategy::AtMostOnce);
        }
        let wins = inboxes.iter().map(|i| i.lock().len()).collect::<Vec<_>>();
        assert_eq!(wins.iter().sum::<usize>(), 300);
        assert!(wins.iter().all(|n| *n > 0), "uneven winners {wins:?}");
    }

    #[test]
    fn test_local_api_misuse() {
        let mut net = Network::new(NetworkNodeConfig::new("a"));
        assert!(matches!(
            net.publish("bad/", Bytes::from_static(b"x"), DeliveryStrategy::AtLeastOnce),
            Err(DirectMqError::Topic(_))
        ));
        assert!(matches!(net.publish("ok", Bytes::new(), DeliveryStrategy::AtLeastOnce), Err(DirectMqError::EmptyPayload)));
        assert!(net.subscribe("bad//", inbox_handler(&Inbox::default())).is_err());
        net.unsubscribe(42);
        assert!(net.take_events().is_empty());
    }

    #[test]
    fn test_hierarchy_collapse() {
        let mut mesh = Mesh::new(&["a", "b"], 32);
        mesh.connect(0, 1);
        let inbox = Inbox::default();
        mesh.subscribe(1, "topic1/subtopic1", &inbox);
        mesh.subscribe(1, "topic1/subtopic2", &inbox);
        let star = mesh.subscribe(1, "topic1/*", &inbox);

        assert_eq!(topics_of(&mesh.sent(1, 0)), vec![
            ("sub", "topic1/subtopic1"),
            ("sub", "topic1/subtopic2"),
            ("sub", "topic1/*"),
            ("unsub", "topic1/subtopic1"),
            ("unsub", "topic1/subtopic2"),
        ]);
        assert_eq!(mesh.nodes[0].edge(mesh.wires[0].0.edge).unwrap().top_level_topics(), vec!["topic1/*"]);

        // dropping the wildcard brings the specific topics back
        mesh.history.clear();
        mesh.nodes[1].unsubscribe(star);
        mesh.pump();
        assert_eq!(topics_of(&mesh.sent(1, 0)), vec![
            ("sub", "topic1/subtopic1"),
            ("sub", "topic1/subtopic2"),
            ("unsub", "topic1/*"),
        ]);
    }

    #[test]
    fn test_ttl_limits_propagation() {
        let mut mesh = Mesh::new(&["a", "b", "c"], 2);
        let ab = mesh.connect(0, 1);
        let bc = mesh.connect(1, 2);
        let inbox = Inbox::default();
        mesh.subscribe(2, "t", &inbox);

        // c -> b with ttl 1, b does not pass it on to a
        assert_eq!(mesh.neighbor_topics(1, bc), vec!["t"]);
        assert!(mesh.neighbor_topics(0, ab).is_empty());
        let c_to_b = mesh.sent(2, 1);
        assert!(c_to_b.iter().any(|p| matches!(p, Packet::Subscribe(m) if m.frame.ttl == 1 && m.frame.traversed == vec!["c"])));

        mesh.publish(0, "t", b"lost", DeliveryStrategy::AtLeastOnce);
        assert!(inbox.lock().is_empty());
        mesh.publish(1, "t", b"direct", DeliveryStrategy::AtLeastOnce);
        assert_eq!(inbox.lock().len(), 1);
    }

    #[test]
    fn test_expired_frame_is_not_forwarded() {
        let mut mesh = Mesh::new(&["a", "b", "c"], 32);
        mesh.connect(0, 1);
        let bc = mesh.connect(1, 2);
        let inbox = Inbox::default();
        mesh.subscribe(2, "t", &inbox);
        mesh.history.clear();

        let edge = mesh.wires[0].1.edge;
        mesh.nodes[1].on_packet(
            edge,
            Packet::Publish(Publish {
                frame: DataFrame::new(0, vec!["a".into()]),
                topic: "t".into(),
                delivery_strategy: DeliveryStrategy::AtLeastOnce,
                payload: Bytes::from_static(b"x"),
            }),
        );
        mesh.pump();
        assert!(mesh.sent(1, 2).is_empty());
        assert!(inbox.lock().is_empty());
        assert_eq!(mesh.neighbor_topics(1, bc), vec!["t"]);
    }

    #[test]
    fn test_loop_terminates_network() {
        let mut mesh = Mesh::new(&["a", "b", "c"], 32);
        mesh.connect(0, 1);
        mesh.connect(1, 2);
        mesh.connect(2, 0);
        let inbox = Inbox::default();
        mesh.subscribe(0, "x", &inbox);

        for i in 0..3 {
            assert!(mesh.nodes[i].bridged_node_ids().is_empty(), "node {i} still connected");
            assert!(mesh.diagnostics[i].iter().any(|d| matches!(d, DiagnosticEvent::NetworkTermination(m) if m.reason.starts_with("Loop detected: "))));
        }
        assert!(mesh.wires.iter().all(|(a, b)| a.link.is_closed() && b.link.is_closed()));
    }

    #[test]
    fn test_neighbors_sharing_an_id_terminate_network() {
        let mut mesh = Mesh::new(&["x", "x", "c"], 32);
        mesh.connect(0, 1);
        mesh.connect(1, 2);
        let inbox = Inbox::default();
        mesh.subscribe(0, "t", &inbox);

        for i in 0..3 {
            assert!(mesh.nodes[i].bridged_node_ids().is_empty(), "node {i} still connected");
        }
        assert!(mesh.diagnostics[1]
            .iter()
            .any(|d| matches!(d, DiagnosticEvent::NetworkTermination(m) if m.reason == "Loop detected: x -> x")));
    }

    #[test]
    fn test_message_size_limit() {
        let mut mesh = Mesh::new(&["a", "b"], 32);
        mesh.nodes[1] = Network::new(NetworkNodeConfig::new("b").max_incoming_message_size(4));
        mesh.connect(0, 1);
        let inbox = Inbox::default();
        mesh.subscribe(1, "t", &inbox);

        mesh.publish(0, "t", b"too long", DeliveryStrategy::AtLeastOnce);
        assert!(inbox.lock().is_empty());
        mesh.publish(0, "t", b"fits", DeliveryStrategy::AtLeastOnce);
        assert_eq!(inbox.lock().len(), 1);
    }

    #[test]
    fn test_disconnect_revokes_subscriptions() {
        let mut mesh = Mesh::new(&["a", "b", "c"], 32);
        let ab = mesh.connect(0, 1);
        let bc = mesh.connect(1, 2);
        let inbox = Inbox::default();
        mesh.subscribe(2, "t/*", &inbox);
        assert_eq!(mesh.neighbor_topics(0, ab), vec!["t/*"]);
        mesh.history.clear();

        let edge = mesh.wires[bc].0.edge;
        mesh.nodes[1].disconnect_edge(edge, "maintenance");
        mesh.pump();

        assert!(mesh.nodes[1].edge(edge).is_none());
        assert!(mesh.nodes[0].edge(mesh.wires[ab].0.edge).unwrap().subscriptions().is_empty());
        let revoke = mesh.sent(1, 0);
        assert!(matches!(revoke[0], Packet::Unsubscribe(m) if m.topic == "t/*" && m.frame.traversed == vec!["c", "b"] && m.frame.ttl == 31));
        assert!(mesh.sent(1, 2).iter().any(|p| matches!(p, Packet::GracefullyClose(m) if m.reason == "maintenance")));
        assert!(mesh.diagnostics[1].contains(&DiagnosticEvent::ConnectionLost("c".into(), "maintenance".into())));
        assert!(mesh.diagnostics[2].contains(&DiagnosticEvent::ConnectionLost("b".into(), "maintenance".into())));

        // idempotent
        mesh.nodes[1].disconnect_edge(edge, "again");
        mesh.pump();
        assert_eq!(mesh.nodes[0].bridged_node_ids(), vec!["b"]);
    }

    #[test]
    fn test_shared_topic_is_kept_until_last_unsubscribe() {
        let mut mesh = Mesh::new(&["a", "b", "c"], 32);
        let ab = mesh.connect(0, 1);
        mesh.connect(1, 2);
        let (bi, ci) = (Inbox::default(), Inbox::default());
        let b_sub = mesh.subscribe(1, "t", &bi);
        mesh.subscribe(2, "t", &ci);
        assert_eq!(mesh.neighbor_topics(0, ab), vec!["t", "t"]);

        mesh.nodes[1].unsubscribe(b_sub);
        mesh.pump();
        assert_eq!(mesh.neighbor_topics(0, ab), vec!["t"]);
        mesh.publish(0, "t", b"x", DeliveryStrategy::AtLeastOnce);
        assert_eq!(ci.lock().len(), 1);
        assert!(bi.lock().is_empty());
    }

    #[test]
    fn test_protocol_violations() {
        // publish during the handshake
        let mut net = Network::new(NetworkNodeConfig::new("b"));
        let link = RecordingLink::default();
        let id = net.add_edge(Box::new(link.clone()), false);
        let alive = net.on_packet(
            id,
            Packet::Publish(Publish {
                frame: DataFrame::new(3, vec!["a".into()]),
                topic: "t".into(),
                delivery_strategy: DeliveryStrategy::AtLeastOnce,
                payload: Bytes::from_static(b"x"),
            }),
        );
        assert!(!alive);
        assert_eq!(
            link.take(),
            vec![Packet::GracefullyClose(GracefullyClose {
                frame: DataFrame::new(1, vec!["b".into()]),
                reason: "Unexpected publish message in connection process".into(),
            })]
        );
        assert!(link.is_closed());

        // unsupported version offer
        let link = RecordingLink::default();
        let id = net.add_edge(Box::new(link.clone()), false);
        net.on_packet(
            id,
            Packet::SupportedProtocolVersions(SupportedProtocolVersions {
                frame: DataFrame::new(2, vec!["a".into()]),
                supported_versions: vec![1, 2],
            }),
        );
        assert!(net.edge(id).is_none());
        assert!(matches!(&link.take()[..], [Packet::GracefullyClose(_)]));

        // handshake message once connected
        let mut mesh = Mesh::new(&["a", "b"], 32);
        mesh.connect(0, 1);
        let edge = mesh.wires[0].1.edge;
        mesh.nodes[1].on_packet(
            edge,
            Packet::SupportedProtocolVersions(SupportedProtocolVersions {
                frame: DataFrame::new(2, vec!["a".into()]),
                supported_versions: vec![1],
            }),
        );
        mesh.pump();
        assert!(mesh.nodes[0].bridged_node_ids().is_empty());
        assert!(mesh.diagnostics[0].contains(&DiagnosticEvent::ConnectionLost(
            "b".into(),
            "Received supported protocol versions message in connected state".into()
        )));
    }

    #[test]
    fn test_close_node() {
        let mut mesh = Mesh::new(&["a", "b", "c"], 32);
        mesh.connect(0, 1);
        mesh.connect(0, 2);
        mesh.nodes[0].close("Node shutdown");
        mesh.pump();
        for i in 0..3 {
            assert!(mesh.nodes[i].bridged_node_ids().is_empty());
        }
        assert!(mesh.diagnostics[1].contains(&DiagnosticEvent::ConnectionLost("a".into(), "Node shutdown".into())));
    }
}
