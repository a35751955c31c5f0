use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;

use directmq::codec::{Subscribe, TerminateNetwork};
use directmq::net::memory_pair;
use directmq::{DeliveryStrategy, DiagnosticsHandler, Format, NetworkNode, NetworkNodeConfig, ProtocolCodec};

#[derive(Default)]
struct Observed {
    established: Vec<String>,
    lost: Vec<(String, String)>,
    subscriptions: Vec<String>,
    terminations: Vec<String>,
}

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Observed>>);

impl DiagnosticsHandler for Recorder {
    fn on_connection_established(&self, bridged_node_id: &str) {
        self.0.lock().established.push(bridged_node_id.into());
    }

    fn on_connection_lost(&self, bridged_node_id: &str, reason: &str) {
        self.0.lock().lost.push((bridged_node_id.into(), reason.into()));
    }

    fn on_subscription(&self, msg: &Subscribe) {
        self.0.lock().subscriptions.push(msg.topic.clone());
    }

    fn on_network_termination(&self, msg: &TerminateNetwork) {
        self.0.lock().terminations.push(msg.reason.clone());
    }
}

type Inbox = Arc<Mutex<Vec<(String, Bytes)>>>;

fn node(id: &str, ttl: i32, format: Format) -> (NetworkNode, Recorder) {
    let node = NetworkNode::new(NetworkNodeConfig::new(id).ttl(ttl), ProtocolCodec::new(format)).unwrap();
    let recorder = Recorder::default();
    node.set_diagnostics(recorder.clone());
    (node, recorder)
}

fn link(dialer: &NetworkNode, listener: &NetworkNode) {
    let (a, b) = memory_pair(64 * 1024);
    dialer.add_connecting_edge(a);
    listener.add_listening_edge(b);
}

fn subscribe(node: &NetworkNode, topic: &str) -> Inbox {
    let inbox = Inbox::default();
    let sink = inbox.clone();
    node.subscribe(topic, move |topic, payload| sink.lock().push((topic.to_string(), payload))).unwrap();
    inbox
}

async fn wait_for<F: Fn() -> bool>(what: &str, f: F) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !f() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {what}");
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn hello_world() {
    for format in [Format::Binary, Format::Json] {
        let (a, ra) = node("a", 32, format);
        let (b, _) = node("b", 32, format);
        link(&a, &b);
        wait_for("connection", || ra.0.lock().established == vec!["b"]).await;

        let inbox = subscribe(&b, "test");
        wait_for("subscription", || ra.0.lock().subscriptions.contains(&"test".to_string())).await;

        a.publish("test", "Hello, World!", DeliveryStrategy::AtLeastOnce).unwrap();
        wait_for("delivery", || !inbox.lock().is_empty()).await;
        settle().await;
        assert_eq!(*inbox.lock(), vec![("test".to_string(), Bytes::from_static(b"Hello, World!"))]);
    }
}

#[tokio::test]
async fn ttl_bounds_a_line() {
    let (a, _) = node("a", 2, Format::Binary);
    let (b, rb) = node("b", 2, Format::Binary);
    let (c, _) = node("c", 2, Format::Binary);
    link(&a, &b);
    link(&b, &c);
    wait_for("line", || b.bridged_node_ids().len() == 2).await;

    let inbox = subscribe(&c, "far/*");
    wait_for("subscription at b", || rb.0.lock().subscriptions.contains(&"far/*".to_string())).await;

    a.publish("far/away", "dropped", DeliveryStrategy::AtLeastOnce).unwrap();
    b.publish("far/near", "kept", DeliveryStrategy::AtLeastOnce).unwrap();
    wait_for("delivery", || !inbox.lock().is_empty()).await;
    settle().await;
    assert_eq!(*inbox.lock(), vec![("far/near".to_string(), Bytes::from_static(b"kept"))]);
}

#[tokio::test]
async fn hierarchy_collapse_reaches_neighbors() {
    let (a, ra) = node("a", 32, Format::Binary);
    let (b, _) = node("b", 32, Format::Binary);
    link(&a, &b);
    wait_for("connection", || !a.bridged_node_ids().is_empty()).await;

    let inbox = subscribe(&b, "topic1/subtopic1");
    subscribe(&b, "topic1/subtopic2");
    subscribe(&b, "topic1/*");
    wait_for("collapse", || ra.0.lock().subscriptions.len() == 3).await;
    assert_eq!(ra.0.lock().subscriptions, vec!["topic1/subtopic1", "topic1/subtopic2", "topic1/*"]);

    a.publish("topic1/subtopic1", "x", DeliveryStrategy::AtLeastOnce).unwrap();
    wait_for("delivery", || !inbox.lock().is_empty()).await;
}

#[tokio::test]
async fn at_most_once_picks_one_subscriber() {
    let (a, _) = node("a", 32, Format::Binary);
    let (b, rb) = node("b", 32, Format::Binary);
    let (c, rc) = node("c", 32, Format::Binary);
    link(&b, &a);
    link(&c, &a);
    wait_for("star", || a.bridged_node_ids().len() == 2).await;

    let (ib, ic) = (subscribe(&b, "jobs"), subscribe(&c, "jobs"));
    wait_for("subscriptions", || {
        rb.0.lock().subscriptions.len() == 2 && rc.0.lock().subscriptions.len() == 2
    })
    .await;

    for _ in 0..10 {
        a.publish("jobs", "work", DeliveryStrategy::AtMostOnce).unwrap();
    }
    wait_for("deliveries", || ib.lock().len() + ic.lock().len() == 10).await;
    settle().await;
    assert_eq!(ib.lock().len() + ic.lock().len(), 10);
}

#[tokio::test]
async fn loop_terminates_every_node() {
    let (a, ra) = node("a", 32, Format::Binary);
    let (b, rb) = node("b", 32, Format::Binary);
    let (c, rc) = node("c", 32, Format::Binary);
    link(&a, &b);
    link(&b, &c);
    link(&c, &a);
    wait_for("triangle", || [&a, &b, &c].iter().all(|n| n.bridged_node_ids().len() == 2)).await;

    subscribe(&a, "x");
    wait_for("teardown", || [&a, &b, &c].iter().all(|n| n.bridged_node_ids().is_empty())).await;
    for r in [&ra, &rb, &rc] {
        let observed = r.0.lock();
        assert!(observed.terminations.iter().any(|t| t.starts_with("Loop detected: ")));
    }
}

#[tokio::test]
async fn close_node_notifies_neighbors() {
    let (a, _) = node("a", 32, Format::Binary);
    let (b, rb) = node("b", 32, Format::Binary);
    link(&a, &b);
    wait_for("connection", || !b.bridged_node_ids().is_empty()).await;

    a.close_node("Node shutdown");
    wait_for("loss", || !rb.0.lock().lost.is_empty()).await;
    assert_eq!(rb.0.lock().lost, vec![("a".to_string(), "Node shutdown".to_string())]);
    assert!(a.bridged_node_ids().is_empty());
}
