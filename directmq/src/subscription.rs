use rand::Rng;

use crate::error::TopicError;
use crate::topic::{deduplicate_overlapping, is_valid_pattern, Topic};

pub type SubscriptionId = u64;

#[derive(Debug, Clone)]
pub struct Subscription<H> {
    id: SubscriptionId,
    topic: String,
    pattern: Topic,
    handler: H,
}

impl<H> Subscription<H> {
    #[inline]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    #[inline]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[inline]
    pub fn pattern(&self) -> &Topic {
        &self.pattern
    }

    #[inline]
    pub fn handler(&self) -> &H {
        &self.handler
    }
}

/// Subscriptions of one owner, kept in insertion order.
///
/// Patterns may repeat, every [`SubscriptionList::add`] creates a new entry
/// with its own random id.
#[derive(Debug, Clone)]
pub struct SubscriptionList<H> {
    subs: Vec<Subscription<H>>,
}

impl<H> Default for SubscriptionList<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> SubscriptionList<H> {
    pub fn new() -> Self {
        Self { subs: Vec::new() }
    }

    pub fn add(&mut self, topic: &str, handler: H) -> Result<SubscriptionId, TopicError> {
        let pattern = topic.parse::<Topic>()?;
        let id = self.next_id();
        self.subs.push(Subscription { id, topic: topic.into(), pattern, handler });
        Ok(id)
    }

    fn next_id(&self) -> SubscriptionId {
        let mut rng = rand::rng();
        loop {
            let id: SubscriptionId = rng.random();
            if !self.subs.iter().any(|s| s.id == id) {
                return id;
            }
        }
    }

    pub fn remove(&mut self, id: SubscriptionId) -> Option<Subscription<H>> {
        let pos = self.subs.iter().position(|s| s.id == id)?;
        Some(self.subs.remove(pos))
    }

    /// The first subscription with exactly this pattern.
    pub fn find_by_pattern(&self, topic: &str) -> Option<&Subscription<H>> {
        self.subs.iter().find(|s| s.topic == topic)
    }

    /// Subscriptions whose pattern matches the publication topic.
    pub fn triggered_by(&self, topic: &str) -> Vec<&Subscription<H>> {
        if !is_valid_pattern(topic) {
            return Vec::new();
        }
        self.subs.iter().filter(|s| s.pattern.matches_split(topic)).collect()
    }

    pub fn will_handle_topic(&self, topic: &str) -> bool {
        is_valid_pattern(topic) && self.subs.iter().any(|s| s.pattern.matches_split(topic))
    }

    /// Whether some pattern of the list covers `pattern`.
    pub fn already_handles_pattern(&self, pattern: &str) -> bool {
        match pattern.parse::<Topic>() {
            Ok(pattern) => self.subs.iter().any(|s| s.pattern.covers(&pattern)),
            Err(_) => false,
        }
    }

    /// All patterns, including repeated ones.
    pub fn topics(&self) -> Vec<String> {
        self.subs.iter().map(|s| s.topic.clone()).collect()
    }

    pub fn top_level_topics(&self) -> Vec<String> {
        deduplicate_overlapping(&self.subs.iter().map(|s| s.topic.as_str()).collect::<Vec<_>>())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subscription<H>> {
        self.subs.iter()
    }

    #[inline]
    pub fn clear(&mut self) {
        self.subs.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.subs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.subs.is_empty()
    }
}
