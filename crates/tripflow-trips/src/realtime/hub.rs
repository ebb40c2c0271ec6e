//! Sharded registry of live trip subscribers.
//!
//! Each subscriber owns a bounded queue. Publishing never waits: a full
//! queue loses that one update for that one subscriber, and the loss is
//! counted. Dropping a [`Subscription`] unregisters it, and a trip's entry
//! disappears with its last subscriber.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, warn};
use tripflow_core::error::DomainError;
use tripflow_core::repository::StoredEvent;
use uuid::Uuid;

use crate::domain::aggregates::TripAggregate;
use crate::domain::states::TripState;

/// Metadata key carrying the message kind.
pub const EVENT_TYPE_KEY: &str = "eventType";
/// Message kind of the first message on every stream.
pub const SNAPSHOT_EVENT_TYPE: &str = "snapshot";
/// Message kind of keep-alive messages.
pub const HEARTBEAT_EVENT_TYPE: &str = "heartbeat";

/// Per-subscriber queue length unless configured otherwise.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;
/// Heartbeat period unless configured otherwise.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

const SHARD_COUNT: usize = 16;

/// One message on a trip update stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripUpdateEvent {
    /// The trip.
    pub trip_id: Uuid,
    /// State before the change; `None` for snapshots and heartbeats.
    pub old_status: Option<TripState>,
    /// State after the change.
    pub new_status: TripState,
    /// When the change happened.
    pub timestamp: DateTime<Utc>,
    /// Trip version after the change.
    pub version: i64,
    /// `eventType` plus kind-specific fields.
    pub metadata: Map<String, Value>,
}

impl TripUpdateEvent {
    /// Full current state of the trip, sent first on every stream.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the trip cannot be serialized.
    pub fn snapshot(trip: &TripAggregate) -> Result<Self, DomainError> {
        let body = serde_json::to_value(trip).map_err(|e| {
            DomainError::Infrastructure(format!("trip snapshot serialization failed: {e}"))
        })?;
        let mut metadata = Map::new();
        metadata.insert(EVENT_TYPE_KEY.to_owned(), SNAPSHOT_EVENT_TYPE.into());
        metadata.insert("trip".to_owned(), body);
        Ok(Self {
            trip_id: trip.id,
            old_status: None,
            new_status: trip.state,
            timestamp: trip.last_updated,
            version: trip.version,
            metadata,
        })
    }

    /// Change caused by one stored event.
    #[must_use]
    pub fn delta(old_status: TripState, new_status: TripState, event: &StoredEvent) -> Self {
        let mut metadata = Map::new();
        metadata.insert(EVENT_TYPE_KEY.to_owned(), event.event_type.clone().into());
        metadata.insert("eventId".to_owned(), event.event_id.to_string().into());
        if let Some(user_id) = &event.user_id {
            metadata.insert("userId".to_owned(), user_id.clone().into());
        }
        metadata.insert("data".to_owned(), event.payload.clone());
        Self {
            trip_id: event.aggregate_id,
            old_status: Some(old_status),
            new_status,
            timestamp: event.occurred_at,
            version: event.version,
            metadata,
        }
    }

    /// Keep-alive carrying the last state the stream has seen.
    #[must_use]
    pub fn heartbeat(trip_id: Uuid, status: TripState, version: i64, at: DateTime<Utc>) -> Self {
        let mut metadata = Map::new();
        metadata.insert(EVENT_TYPE_KEY.to_owned(), HEARTBEAT_EVENT_TYPE.into());
        Self {
            trip_id,
            old_status: None,
            new_status: status,
            timestamp: at,
            version,
            metadata,
        }
    }

    /// The `eventType` metadata value.
    #[must_use]
    pub fn event_type(&self) -> Option<&str> {
        self.metadata.get(EVENT_TYPE_KEY).and_then(Value::as_str)
    }
}

/// Tunables for a [`SubscriptionHub`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubConfig {
    /// Per-subscriber queue length. Values below 1 are treated as 1.
    pub queue_capacity: usize,
    /// Fixed period between heartbeats on each stream.
    pub heartbeat_interval: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

/// What happened to one published update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOutcome {
    /// Subscribers whose queue accepted the update.
    pub delivered: usize,
    /// Subscribers whose queue was full.
    pub dropped: usize,
    /// Subscribers found disconnected and removed.
    pub pruned: usize,
}

/// Subscriber counters for one trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TripSubscriptionStats {
    /// The trip.
    pub trip_id: Uuid,
    /// Live subscribers.
    pub subscribers: usize,
    /// Updates dropped on full queues since the entry was created.
    pub dropped_updates: u64,
}

/// Registry-wide counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HubStats {
    /// Trips with at least one subscriber.
    pub trips: usize,
    /// Live subscribers across all trips.
    pub subscribers: usize,
    /// Updates dropped since the hub was created.
    pub dropped_updates: u64,
    /// Per-trip breakdown.
    pub per_trip: Vec<TripSubscriptionStats>,
}

#[derive(Debug, Default)]
struct TripEntry {
    senders: HashMap<u64, mpsc::Sender<TripUpdateEvent>>,
    dropped: u64,
}

type Shard = Mutex<HashMap<Uuid, TripEntry>>;

#[derive(Debug)]
struct HubInner {
    shards: Vec<Shard>,
    config: HubConfig,
    next_id: AtomicU64,
    dropped_total: AtomicU64,
}

impl HubInner {
    fn shard(&self, trip_id: Uuid) -> std::sync::MutexGuard<'_, HashMap<Uuid, TripEntry>> {
        let index = usize::from(trip_id.as_bytes()[15]) % SHARD_COUNT;
        self.shards[index]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn unsubscribe(&self, trip_id: Uuid, subscriber_id: u64) {
        let mut shard = self.shard(trip_id);
        if let Some(entry) = shard.get_mut(&trip_id) {
            entry.senders.remove(&subscriber_id);
            if entry.senders.is_empty() {
                shard.remove(&trip_id);
            }
        }
        debug!(%trip_id, subscriber_id, "subscriber removed");
    }
}

/// Fan-out of trip updates to live streams.
///
/// Cheap to clone; clones share the registry.
#[derive(Debug, Clone)]
pub struct SubscriptionHub {
    inner: Arc<HubInner>,
}

impl Default for SubscriptionHub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

impl SubscriptionHub {
    /// Creates an empty hub.
    #[must_use]
    pub fn new(config: HubConfig) -> Self {
        Self {
            inner: Arc::new(HubInner {
                shards: (0..SHARD_COUNT).map(|_| Mutex::default()).collect(),
                config,
                next_id: AtomicU64::new(1),
                dropped_total: AtomicU64::new(0),
            }),
        }
    }

    /// The hub's configuration.
    #[must_use]
    pub fn config(&self) -> HubConfig {
        self.inner.config
    }

    /// Registers a subscriber for `trip_id`. `snapshot` is queued before
    /// anything else, so it is always the first message received.
    #[must_use]
    pub fn subscribe(&self, trip_id: Uuid, snapshot: TripUpdateEvent) -> Subscription {
        let (tx, rx) = mpsc::channel(self.inner.config.queue_capacity.max(1));
        let last_status = snapshot.new_status;
        let last_version = snapshot.version;
        // Capacity is at least 1 and nothing else has the sender yet.
        let queued = tx.try_send(snapshot);
        debug_assert!(queued.is_ok(), "fresh subscriber queue rejected the snapshot");
        if let Err(e) = queued {
            warn!(%trip_id, error = %e, "snapshot not queued");
        }

        let subscriber_id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .shard(trip_id)
            .entry(trip_id)
            .or_default()
            .senders
            .insert(subscriber_id, tx);
        debug!(%trip_id, subscriber_id, "subscriber added");

        Subscription {
            trip_id,
            receiver: rx,
            heartbeat_period: self.inner.config.heartbeat_interval,
            heartbeat: None,
            last_status,
            last_version,
            _guard: SubscriptionGuard {
                hub: Arc::clone(&self.inner),
                trip_id,
                subscriber_id,
            },
        }
    }

    /// Offers `update` to every subscriber of `trip_id` without waiting.
    pub fn publish(&self, trip_id: Uuid, update: &TripUpdateEvent) -> PublishOutcome {
        let mut outcome = PublishOutcome::default();
        {
            let mut shard = self.inner.shard(trip_id);
            let Some(entry) = shard.get_mut(&trip_id) else {
                return outcome;
            };
            let mut closed = Vec::new();
            for (&id, tx) in &entry.senders {
                match tx.try_send(update.clone()) {
                    Ok(()) => outcome.delivered += 1,
                    Err(TrySendError::Full(_)) => outcome.dropped += 1,
                    Err(TrySendError::Closed(_)) => closed.push(id),
                }
            }
            for id in &closed {
                entry.senders.remove(id);
            }
            outcome.pruned = closed.len();
            entry.dropped += outcome.dropped as u64;
            if entry.senders.is_empty() {
                shard.remove(&trip_id);
            }
        }

        if outcome.dropped > 0 {
            let dropped = outcome.dropped as u64;
            self.inner.dropped_total.fetch_add(dropped, Ordering::Relaxed);
            metrics::counter!("trip_updates_dropped_total").increment(dropped);
            warn!(
                %trip_id,
                version = update.version,
                dropped = outcome.dropped,
                "subscriber queue full, update dropped"
            );
        }
        outcome
    }

    /// Counters for one trip; `None` once it has no subscribers.
    #[must_use]
    pub fn trip_stats(&self, trip_id: Uuid) -> Option<TripSubscriptionStats> {
        self.inner
            .shard(trip_id)
            .get(&trip_id)
            .map(|entry| TripSubscriptionStats {
                trip_id,
                subscribers: entry.senders.len(),
                dropped_updates: entry.dropped,
            })
    }

    /// Counters for the whole hub.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        let mut per_trip = Vec::new();
        for shard in &self.inner.shards {
            let shard = shard.lock().unwrap_or_else(PoisonError::into_inner);
            per_trip.extend(shard.iter().map(|(&trip_id, entry)| TripSubscriptionStats {
                trip_id,
                subscribers: entry.senders.len(),
                dropped_updates: entry.dropped,
            }));
        }
        per_trip.sort_by_key(|s| s.trip_id);
        HubStats {
            trips: per_trip.len(),
            subscribers: per_trip.iter().map(|s| s.subscribers).sum(),
            dropped_updates: self.inner.dropped_total.load(Ordering::Relaxed),
            per_trip,
        }
    }
}

#[derive(Debug)]
struct SubscriptionGuard {
    hub: Arc<HubInner>,
    trip_id: Uuid,
    subscriber_id: u64,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.hub.unsubscribe(self.trip_id, self.subscriber_id);
    }
}

/// A live stream of updates for one trip.
///
/// Yields the snapshot, then deltas as they are published, with a heartbeat
/// on every tick of a fixed interval regardless of traffic. Dropping it
/// unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    trip_id: Uuid,
    receiver: mpsc::Receiver<TripUpdateEvent>,
    heartbeat_period: Duration,
    heartbeat: Option<Interval>,
    last_status: TripState,
    last_version: i64,
    _guard: SubscriptionGuard,
}

impl Subscription {
    /// The subscribed trip.
    #[must_use]
    pub fn trip_id(&self) -> Uuid {
        self.trip_id
    }

    /// Waits for the next message. Returns `None` only if the hub has
    /// released this subscriber.
    pub async fn next(&mut self) -> Option<TripUpdateEvent> {
        let period = self.heartbeat_period;
        let heartbeat = self.heartbeat.get_or_insert_with(|| {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        tokio::select! {
            biased;
            update = self.receiver.recv() => {
                let update = update?;
                self.last_status = update.new_status;
                self.last_version = self.last_version.max(update.version);
                Some(update)
            }
            _ = heartbeat.tick() => Some(TripUpdateEvent::heartbeat(
                self.trip_id,
                self.last_status,
                self.last_version,
                Utc::now(),
            )),
        }
    }

    /// Adapts the subscription into a `Stream`.
    pub fn into_stream(self) -> impl Stream<Item = TripUpdateEvent> + Send {
        futures::stream::unfold(self, |mut subscription| async move {
            let update = subscription.next().await?;
            Some((update, subscription))
        })
    }
}
