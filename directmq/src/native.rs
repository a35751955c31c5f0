use std::sync::Arc;

use bytes::Bytes;
use directmq_codec::{DataFrame, DeliveryStrategy, Publish, Subscribe, Unsubscribe};
use directmq_utils::random_order;

use crate::error::DirectMqError;
use crate::network::{Action, Context, Event};
use crate::subscription::{SubscriptionId, SubscriptionList};
use crate::topic::{diff_overlapping, Topic};

/// Receives `(publication topic, payload)` for every matching publication.
pub type Handler = Arc<dyn Fn(&str, Bytes) + Send + Sync>;

/// The local publish/subscribe API, one participant of the network.
#[derive(Default)]
pub(crate) struct NativeApi {
    subscriptions: SubscriptionList<Handler>,
}

impl NativeApi {
    pub(crate) fn publish(
        &self,
        ctx: &mut Context<'_>,
        topic: &str,
        payload: Bytes,
        delivery_strategy: DeliveryStrategy,
    ) -> Result<(), DirectMqError> {
        topic.parse::<Topic>()?;
        if payload.is_empty() {
            return Err(DirectMqError::EmptyPayload);
        }
        ctx.push(Action::Published(Publish {
            frame: DataFrame::new(ctx.config.host_ttl, vec![]),
            topic: topic.into(),
            delivery_strategy,
            payload,
        }));
        Ok(())
    }

    pub(crate) fn subscribe(
        &mut self,
        ctx: &mut Context<'_>,
        topic: &str,
        handler: Handler,
    ) -> Result<SubscriptionId, DirectMqError> {
        let before = self.subscriptions.top_level_topics();
        let id = self.subscriptions.add(topic, handler)?;
        self.announce_changes(ctx, &before);
        Ok(id)
    }

    /// Unknown ids are ignored.
    pub(crate) fn unsubscribe(&mut self, ctx: &mut Context<'_>, id: SubscriptionId) {
        let before = self.subscriptions.top_level_topics();
        if self.subscriptions.remove(id).is_none() {
            log::debug!("unsubscribe of unknown subscription {id}");
            return;
        }
        self.announce_changes(ctx, &before);
    }

    fn announce_changes(&self, ctx: &mut Context<'_>, before: &[String]) {
        let (removed, added) = diff_overlapping(before, &self.subscriptions.top_level_topics());
        for topic in added {
            ctx.push(Action::Subscribed(Subscribe { frame: DataFrame::new(ctx.config.host_ttl, vec![]), topic }));
        }
        for topic in removed {
            ctx.push(Action::Unsubscribed(Unsubscribe { frame: DataFrame::new(ctx.config.host_ttl, vec![]), topic }));
        }
    }

    /// Queues deliveries to local handlers, true when at least one matched.
    pub(crate) fn handle_publish(&self, ctx: &mut Context<'_>, msg: &Publish) -> bool {
        let mut subs = self.subscriptions.triggered_by(&msg.topic);
        if subs.is_empty() {
            return false;
        }
        random_order(&mut subs);
        if msg.delivery_strategy == DeliveryStrategy::AtMostOnce {
            subs.truncate(1);
        }
        for sub in subs {
            ctx.deliver(Event::Deliver {
                handler: sub.handler().clone(),
                topic: msg.topic.clone(),
                payload: msg.payload.clone(),
            });
        }
        true
    }

    #[inline]
    pub(crate) fn top_level_topics(&self) -> Vec<String> {
        self.subscriptions.top_level_topics()
    }
}
