use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use island_broker::topic::WORD_SEPARATOR;
use parking_lot::RwLock;

use crate::subscriber::Subscriber;

/// Handle of one subscription, used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl Display for SubscriptionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[derive(Clone)]
pub struct Registration {
    pub id: SubscriptionId,
    pub queue: String,
    pub subscriber: Arc<dyn Subscriber>,
}

impl Registration {
    fn pattern(&self) -> &str {
        self.subscriber.routing_pattern().as_str()
    }
}

// Literal-prefixed patterns are bucketed by their first word; patterns that
// start with a wildcard can match any key and are always scanned.
#[derive(Default)]
struct Index {
    by_first_word: HashMap<String, Vec<Registration>>,
    wildcard: Vec<Registration>,
}

impl Index {
    fn bucket_mut(&mut self, registration: &Registration) -> &mut Vec<Registration> {
        match registration.subscriber.routing_pattern().literal_prefix() {
            Some(word) => self.by_first_word.entry(word.to_string()).or_default(),
            None => &mut self.wildcard,
        }
    }

    fn all(&self) -> impl Iterator<Item = &Registration> {
        self.by_first_word.values().flatten().chain(&self.wildcard)
    }
}

/// Local subscriptions of one service instance.
#[derive(Default)]
pub struct SubscriberRegistry {
    index: RwLock<Index>,
    last_id: AtomicU64,
}

impl SubscriberRegistry {
    pub fn insert(&self, queue: String, subscriber: Arc<dyn Subscriber>) -> SubscriptionId {
        let id = SubscriptionId(self.last_id.fetch_add(1, Ordering::Relaxed) + 1);
        let registration = Registration {
            id,
            queue,
            subscriber,
        };
        let mut index = self.index.write();
        index.bucket_mut(&registration).push(registration);
        id
    }

    pub fn remove(&self, id: SubscriptionId) -> Option<Registration> {
        let mut guard = self.index.write();
        let index = &mut *guard;
        let buckets = index
            .by_first_word
            .values_mut()
            .chain(std::iter::once(&mut index.wildcard));
        for bucket in buckets {
            if let Some(position) = bucket.iter().position(|r| r.id == id) {
                return Some(bucket.remove(position));
            }
        }
        None
    }

    /// Whether any registration still binds `pattern` on `queue`.
    pub fn binds(&self, queue: &str, pattern: &str) -> bool {
        self.index
            .read()
            .all()
            .any(|r| r.queue == queue && r.pattern() == pattern)
    }

    /// Subscribers matching `routing_key`, in registration order.
    pub fn matching(&self, routing_key: &str) -> Vec<Arc<dyn Subscriber>> {
        let first_word = routing_key
            .split(WORD_SEPARATOR)
            .next()
            .unwrap_or_default();
        let index = self.index.read();
        let mut matched: Vec<&Registration> = Vec::new();
        let candidates = index
            .by_first_word
            .get(first_word)
            .into_iter()
            .flatten()
            .chain(&index.wildcard);
        for registration in candidates {
            if registration.subscriber.matches(routing_key) {
                matched.push(registration);
            }
        }
        matched.sort_by_key(|r| r.id);
        matched
            .into_iter()
            .map(|r| Arc::clone(&r.subscriber))
            .collect()
    }

    pub fn clear(&self) -> usize {
        let mut index = self.index.write();
        let removed = index.all().count();
        *index = Index::default();
        removed
    }

    pub fn len(&self) -> usize {
        self.index.read().all().count()
    }
}
