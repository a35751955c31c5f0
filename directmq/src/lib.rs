#![deny(unsafe_code)] // Enforce memory safety across the entire crate

//! # DirectMQ
//!
//! A decentralized publish/subscribe overlay. Every node is a peer, nodes
//! bridge to their neighbors over portals and propagate subscriptions and
//! publications hop by hop, bounded by a per-frame TTL.
//!
//! # Overall Example
//! ```rust,no_run
//!
//! use directmq::{DeliveryStrategy, NetworkNode, NetworkNodeConfig, ProtocolCodec};
//! use directmq::net::{connect_tcp, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let node = NetworkNode::new(NetworkNodeConfig::new("node-a"), ProtocolCodec::default())?;
//!     node.add_connecting_edge(connect_tcp("127.0.0.1:5883", 0).await?);
//!
//!     node.subscribe("sensors/*/temperature", |topic, payload| {
//!         println!("{topic}: {payload:?}");
//!     })?;
//!     node.publish("sensors/kitchen/temperature", "21.5", DeliveryStrategy::AtLeastOnce)?;
//!     Ok(())
//! }
//!
//! ```

/// Routing Core
pub mod config; // Node configuration and TTL constants
pub mod diagnostics; // Observation callbacks
pub mod edge; // Connection state machine
pub mod error; // Error types
mod native; // Local publish/subscribe participant
mod network; // Action queue and fan-out
pub mod node; // Async node handle
pub mod subscription; // Subscription lists
pub mod topic; // Topic validation, matching and collapsing

/// Process Support
pub mod logger; // slog backed `log` implementation

pub use config::{
    NetworkNodeConfig, DEFAULT_TTL, NO_MAX_MESSAGE_SIZE, ONLY_DIRECT_CONNECTION_TTL,
    ONLY_DIRECT_CONNECTION_WITH_RESPONSE_TTL,
};
pub use diagnostics::{DiagnosticsHandler, LogDiagnostics};
pub use edge::{EdgeId, EdgeInfo, EdgeStatus, Outbound};
pub use error::{DirectMqError, TopicError};
pub use native::Handler;
pub use node::NetworkNode;
pub use subscription::{Subscription, SubscriptionId, SubscriptionList};
pub use topic::{deduplicate_overlapping, diff_overlapping, is_valid_pattern, matches, Topic};

/// External Crate Re-exports
pub use directmq_codec as codec;
pub use directmq_codec::{DeliveryStrategy, Format, ProtocolCodec};
pub use directmq_conf as conf;
pub use directmq_net as net;
pub use directmq_net::{Error, Result};
pub use directmq_utils as utils;
