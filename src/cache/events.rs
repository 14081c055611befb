//! Cache event system.
//!
//! Write operations publish events; an in-memory queue holds them until the
//! consumer turns them into invalidation work.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use super::lock::mutex_lock;

const SOURCE: &str = "cache::events";

/// Monotonic epoch for ordering events.
///
/// Each event gets a unique, monotonically increasing epoch number, used to
/// decide which event is "latest" when several touch the same entity.
pub type Epoch = u64;

/// Cache event with idempotency and ordering support.
#[derive(Debug, Clone)]
pub struct CacheEvent {
    /// Unique identifier for idempotency (UUIDv4).
    pub id: Uuid,
    /// Monotonic epoch for ordering within this process.
    pub epoch: Epoch,
    /// The type of cache event.
    pub kind: EventKind,
    /// When the event was created.
    pub timestamp: OffsetDateTime,
}

impl CacheEvent {
    pub fn new(kind: EventKind, epoch: Epoch) -> Self {
        Self {
            id: Uuid::new_v4(),
            epoch,
            kind,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// Types of cache events that trigger invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// An article was created, edited, published or unpublished.
    ArticleUpserted { article_id: Uuid, slug: String },
    /// An article was deleted.
    ArticleDeleted { article_id: Uuid, slug: String },
    /// A project was created or updated.
    ProjectUpserted { project_id: Uuid },
    /// A project was deleted.
    ProjectDeleted { project_id: Uuid },
    /// An article gained a first-time view.
    ArticleViewed { slug: String },
    /// Warm the cache on application startup.
    WarmupOnStartup,
}

/// In-memory event queue for cache invalidation.
///
/// A mutex-guarded deque is enough here since contention is low; only write
/// paths publish.
pub struct EventQueue {
    queue: Mutex<VecDeque<CacheEvent>>,
    epoch_counter: AtomicU64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            epoch_counter: AtomicU64::new(0),
        }
    }

    /// Get the next epoch number.
    pub fn next_epoch(&self) -> Epoch {
        self.epoch_counter.fetch_add(1, Ordering::SeqCst)
    }

    /// Publish an event to the queue.
    pub fn publish(&self, kind: EventKind) {
        let epoch = self.next_epoch();
        let event = CacheEvent::new(kind.clone(), epoch);

        info!(
            event_id = %event.id,
            event_epoch = event.epoch,
            event_kind = ?kind,
            "Cache event enqueued"
        );

        mutex_lock(&self.queue, SOURCE, "publish").push_back(event);
    }

    /// Drain up to `limit` events from the queue, FIFO.
    pub fn drain(&self, limit: usize) -> Vec<CacheEvent> {
        let mut queue = mutex_lock(&self.queue, SOURCE, "drain");
        let count = limit.min(queue.len());
        queue.drain(..count).collect()
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.queue, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        mutex_lock(&self.queue, SOURCE, "clear").clear();
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}
