//! Test agent: JSON commands on stdin, JSON notifications on stdout, one per line.

use std::io::Write;
use std::net::SocketAddr;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};

use directmq::codec::{Publish, Subscribe, TerminateNetwork, Unsubscribe};
use directmq::net::{connect_ws, Builder, WsMode};
use directmq::{
    DeliveryStrategy, DiagnosticsHandler, Format, NetworkNode, NetworkNodeConfig, ProtocolCodec, Result,
    SubscriptionId,
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UniversalCommand {
    setup: Option<SetupCommand>,
    listen: Option<ListenCommand>,
    connect: Option<ConnectCommand>,
    stop: Option<StopCommand>,
    publish: Option<PublishCommand>,
    subscribe_topic: Option<SubscribeTopicCommand>,
    unsubscribe_topic: Option<UnsubscribeTopicCommand>,
}

#[derive(Debug, Deserialize)]
struct SetupCommand {
    #[serde(rename = "TTL")]
    ttl: i32,
    #[serde(rename = "NodeID")]
    node_id: String,
    #[serde(rename = "MaxMessageSize", default)]
    max_message_size: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListenCommand {
    address: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ConnectCommand {
    address: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StopCommand {
    #[serde(default)]
    reason: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PublishCommand {
    topic: String,
    #[serde(default, with = "strategy")]
    delivery_strategy: DeliveryStrategy,
    #[serde(default, with = "payload")]
    payload: Vec<u8>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SubscribeTopicCommand {
    topic: String,
}

#[derive(Debug, Deserialize)]
struct UnsubscribeTopicCommand {
    #[serde(rename = "SubscriptionID")]
    subscription_id: SubscriptionId,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
struct UniversalNotification {
    #[serde(skip_serializing_if = "Option::is_none")]
    ready: Option<ReadyNotification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fatal: Option<FatalNotification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_received: Option<MessageReceivedNotification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subscribed: Option<SubscribedNotification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stopped: Option<StoppedNotification>,

    #[serde(skip_serializing_if = "Option::is_none")]
    connection_established: Option<ConnectionEstablishedNotification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    connection_lost: Option<ConnectionLostNotification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    on_publication: Option<OnPublicationNotification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    on_subscription: Option<FrameTopicNotification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    on_unsubscribe: Option<FrameTopicNotification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    on_network_termination: Option<OnNetworkTerminationNotification>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ReadyNotification {
    time: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct FatalNotification {
    err: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct MessageReceivedNotification {
    topic: String,
    #[serde(with = "payload")]
    payload: Vec<u8>,
}

#[derive(Debug, Serialize)]
struct SubscribedNotification {
    #[serde(rename = "SubscriptionID")]
    subscription_id: SubscriptionId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct StoppedNotification {
    reason: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ConnectionEstablishedNotification {
    bridged_node_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ConnectionLostNotification {
    bridged_node_id: String,
    reason: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct OnPublicationNotification {
    #[serde(rename = "TTL")]
    ttl: i32,
    traversed: Vec<String>,
    topic: String,
    #[serde(with = "strategy")]
    delivery_strategy: DeliveryStrategy,
    #[serde(with = "payload")]
    payload: Vec<u8>,
}

/// Shape of both the subscription and the unsubscription notification.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct FrameTopicNotification {
    #[serde(rename = "TTL")]
    ttl: i32,
    traversed: Vec<String>,
    topic: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct OnNetworkTerminationNotification {
    #[serde(rename = "TTL")]
    ttl: i32,
    traversed: Vec<String>,
    reason: String,
}

/// Delivery strategies travel as their protocol numbers.
mod strategy {
    use directmq::DeliveryStrategy;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(strategy: &DeliveryStrategy, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u8(match strategy {
            DeliveryStrategy::AtLeastOnce => 0,
            DeliveryStrategy::AtMostOnce => 1,
        })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DeliveryStrategy, D::Error> {
        match u8::deserialize(d)? {
            0 => Ok(DeliveryStrategy::AtLeastOnce),
            1 => Ok(DeliveryStrategy::AtMostOnce),
            n => Err(de::Error::custom(format!("unknown delivery strategy {n}"))),
        }
    }
}

/// Byte strings travel base64 encoded, `null` reads as empty.
mod payload {
    use base64::prelude::{Engine, BASE64_STANDARD};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(payload: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&BASE64_STANDARD.encode(payload))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        match Option::<String>::deserialize(d)? {
            Some(s) => BASE64_STANDARD.decode(s.as_bytes()).map_err(de::Error::custom),
            None => Ok(Vec::new()),
        }
    }
}

fn send(notification: &UniversalNotification) {
    let line = match serde_json::to_string(notification) {
        Ok(line) => line,
        Err(e) => {
            log::error!("failed to encode notification, {e}");
            return;
        }
    };
    let mut stdout = std::io::stdout().lock();
    if let Err(e) = writeln!(stdout, "{line}").and_then(|_| stdout.flush()) {
        log::error!("failed to write notification, {e}");
    }
}

fn fatal(err: String) -> anyhow::Error {
    send(&UniversalNotification { fatal: Some(FatalNotification { err: err.clone() }), ..Default::default() });
    anyhow!(err)
}

/// Mirrors every diagnostics callback as a notification.
struct AgentDiagnostics;

impl DiagnosticsHandler for AgentDiagnostics {
    fn on_connection_established(&self, bridged_node_id: &str) {
        send(&UniversalNotification {
            connection_established: Some(ConnectionEstablishedNotification { bridged_node_id: bridged_node_id.into() }),
            ..Default::default()
        });
    }

    fn on_connection_lost(&self, bridged_node_id: &str, reason: &str) {
        send(&UniversalNotification {
            connection_lost: Some(ConnectionLostNotification {
                bridged_node_id: bridged_node_id.into(),
                reason: reason.into(),
            }),
            ..Default::default()
        });
    }

    fn on_publication(&self, msg: &Publish) {
        send(&UniversalNotification {
            on_publication: Some(OnPublicationNotification {
                ttl: msg.frame.ttl,
                traversed: msg.frame.traversed.clone(),
                topic: msg.topic.clone(),
                delivery_strategy: msg.delivery_strategy,
                payload: msg.payload.to_vec(),
            }),
            ..Default::default()
        });
    }

    fn on_subscription(&self, msg: &Subscribe) {
        send(&UniversalNotification {
            on_subscription: Some(FrameTopicNotification {
                ttl: msg.frame.ttl,
                traversed: msg.frame.traversed.clone(),
                topic: msg.topic.clone(),
            }),
            ..Default::default()
        });
    }

    fn on_unsubscription(&self, msg: &Unsubscribe) {
        send(&UniversalNotification {
            on_unsubscribe: Some(FrameTopicNotification {
                ttl: msg.frame.ttl,
                traversed: msg.frame.traversed.clone(),
                topic: msg.topic.clone(),
            }),
            ..Default::default()
        });
    }

    fn on_network_termination(&self, msg: &TerminateNetwork) {
        send(&UniversalNotification {
            on_network_termination: Some(OnNetworkTerminationNotification {
                ttl: msg.frame.ttl,
                traversed: msg.frame.traversed.clone(),
                reason: msg.reason.clone(),
            }),
            ..Default::default()
        });
    }
}

#[derive(Default)]
struct Agent {
    node: Option<NetworkNode>,
}

impl Agent {
    fn node(&self) -> Result<&NetworkNode> {
        self.node.as_ref().ok_or_else(|| fatal("Node is not set up".into()))
    }

    /// Handles one command line, `Ok(false)` once the agent should exit.
    async fn handle(&mut self, cmd: UniversalCommand) -> Result<bool> {
        if let Some(setup) = cmd.setup {
            log::info!("setting up node {}", setup.node_id);
            let config = NetworkNodeConfig::new(setup.node_id)
                .ttl(setup.ttl)
                .max_incoming_message_size(setup.max_message_size);
            let node = NetworkNode::new(config, ProtocolCodec::new(Format::Json))
                .map_err(|e| fatal(format!("Failed to set up node: {e}")))?;
            node.set_diagnostics(AgentDiagnostics);
            self.node = Some(node);
        }

        if let Some(listen) = cmd.listen {
            let node = self.node()?.clone();
            let laddr = resolve(&listen.address).await.map_err(|e| fatal(format!("Failed to parse URL: {e}")))?;
            let listener = Builder::new()
                .name("agent/ws")
                .laddr(laddr)
                .max_frame_length(max_frame_length(&node))
                .bind()
                .map_err(|e| fatal(format!("Failed to listen on websocket: {e}")))?;
            tokio::spawn(crate::listen(node, listener, Some(WsMode::Text)));
        }

        if let Some(connect) = cmd.connect {
            let node = self.node()?;
            log::info!("connecting to {}", connect.address);
            let portal = connect_ws(&connect.address, WsMode::Text)
                .await
                .map_err(|e| fatal(format!("Failed to connect to websocket: {e}")))?;
            node.add_connecting_edge(portal);
        }

        if let Some(stop) = cmd.stop {
            self.node()?.close_node(&stop.reason);
            send(&UniversalNotification {
                stopped: Some(StoppedNotification { reason: stop.reason }),
                ..Default::default()
            });
            return Ok(false);
        }

        if let Some(publish) = cmd.publish {
            if let Err(e) = self.node()?.publish(&publish.topic, publish.payload, publish.delivery_strategy) {
                log::warn!("publish to {} failed, {e}", publish.topic);
            }
        }

        if let Some(subscribe) = cmd.subscribe_topic {
            // notifications name the subscribed pattern, not the publication topic
            let topic = subscribe.topic.clone();
            let id = self
                .node()?
                .subscribe(&subscribe.topic, move |_, payload| {
                    send(&UniversalNotification {
                        message_received: Some(MessageReceivedNotification {
                            topic: topic.clone(),
                            payload: payload.to_vec(),
                        }),
                        ..Default::default()
                    })
                })
                .map_err(|e| fatal(format!("Failed to subscribe to {}: {e}", subscribe.topic)))?;
            send(&UniversalNotification {
                subscribed: Some(SubscribedNotification { subscription_id: id }),
                ..Default::default()
            });
        }

        if let Some(unsubscribe) = cmd.unsubscribe_topic {
            self.node()?.unsubscribe(unsubscribe.subscription_id);
        }

        Ok(true)
    }
}

fn max_frame_length(node: &NetworkNode) -> usize {
    match node.config().host_max_incoming_message_size {
        0 => 0,
        n => usize::try_from(n).unwrap_or(usize::MAX).saturating_add(directmq::net::FRAME_OVERHEAD),
    }
}

/// Local address to bind for a `ws://host:port/path` listen address.
async fn resolve(address: &str) -> Result<SocketAddr> {
    let url = url::Url::parse(address)?;
    let host = url.host_str().ok_or_else(|| anyhow!("no host in `{address}`"))?;
    let port = url.port_or_known_default().ok_or_else(|| anyhow!("no port in `{address}`"))?;
    let resolved = tokio::net::lookup_host((host, port)).await?.next().ok_or_else(|| anyhow!("`{address}` does not resolve"));
    resolved
}

pub(crate) async fn run() -> Result<()> {
    log::info!("starting DirectMQ testing agent");
    send(&UniversalNotification {
        ready: Some(ReadyNotification { time: chrono::Local::now().to_rfc3339() }),
        ..Default::default()
    });

    let mut agent = Agent::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return Err(fatal("Error during command reading: EOF".into())),
            Err(e) => return Err(fatal(format!("Error during command reading: {e}"))),
        };
        if line.trim().is_empty() {
            continue;
        }
        let cmd = serde_json::from_str::<UniversalCommand>(&line)
            .map_err(|e| fatal(format!("Error during command unmarshalling: {e}")))?;
        if !agent.handle(cmd).await? {
            // leave time for the goodbye frames to be written
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        let cmd: UniversalCommand =
            serde_json::from_str(r#"{"Setup":{"TTL":4,"NodeID":"a","MaxMessageSize":1024},"Listen":null}"#).unwrap();
        let setup = cmd.setup.unwrap();
        assert_eq!((setup.ttl, setup.node_id.as_str(), setup.max_message_size), (4, "a", 1024));
        assert!(cmd.listen.is_none());

        let cmd: UniversalCommand = serde_json::from_str(
            r#"{"Publish":{"Topic":"t/x","DeliveryStrategy":1,"Payload":"SGVsbG8="}}"#,
        )
        .unwrap();
        let publish = cmd.publish.unwrap();
        assert_eq!(publish.delivery_strategy, DeliveryStrategy::AtMostOnce);
        assert_eq!(publish.payload, b"Hello");

        let cmd: UniversalCommand =
            serde_json::from_str(r#"{"UnsubscribeTopic":{"SubscriptionID":42}}"#).unwrap();
        assert_eq!(cmd.unsubscribe_topic.unwrap().subscription_id, 42);

        assert!(serde_json::from_str::<UniversalCommand>(r#"{"Publish":{"Topic":"t","DeliveryStrategy":7}}"#).is_err());
    }

    #[test]
    fn test_notification_shape() {
        let n = UniversalNotification {
            on_publication: Some(OnPublicationNotification {
                ttl: 3,
                traversed: vec!["a".into()],
                topic: "t".into(),
                delivery_strategy: DeliveryStrategy::AtLeastOnce,
                payload: b"hi".to_vec(),
            }),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_string(&n).unwrap(),
            r#"{"OnPublication":{"TTL":3,"Traversed":["a"],"Topic":"t","DeliveryStrategy":0,"Payload":"aGk="}}"#
        );

        let n = UniversalNotification {
            subscribed: Some(SubscribedNotification { subscription_id: 7 }),
            ..Default::default()
        };
        assert_eq!(serde_json::to_string(&n).unwrap(), r#"{"Subscribed":{"SubscriptionID":7}}"#);

        let n = UniversalNotification {
            connection_lost: Some(ConnectionLostNotification { bridged_node_id: "b".into(), reason: "bye".into() }),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_string(&n).unwrap(),
            r#"{"ConnectionLost":{"BridgedNodeId":"b","Reason":"bye"}}"#
        );
    }

    #[tokio::test]
    async fn test_resolve_listen_address() {
        assert_eq!(resolve("ws://127.0.0.1:8080/ws").await.unwrap(), "127.0.0.1:8080".parse().unwrap());
        assert!(resolve("not a url").await.is_err());
    }

    #[tokio::test]
    async fn test_commands_before_setup_fail() {
        let mut agent = Agent::default();
        let cmd: UniversalCommand = serde_json::from_str(r#"{"SubscribeTopic":{"Topic":"t"}}"#).unwrap();
        assert!(agent.handle(cmd).await.is_err());

        let cmd: UniversalCommand = serde_json::from_str(r#"{"Setup":{"TTL":32,"NodeID":"a"}}"#).unwrap();
        assert!(agent.handle(cmd).await.unwrap());
        let cmd: UniversalCommand = serde_json::from_str(r#"{"SubscribeTopic":{"Topic":"t"}}"#).unwrap();
        assert!(agent.handle(cmd).await.unwrap());
    }
}
