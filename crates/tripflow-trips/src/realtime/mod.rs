//! Real-time trip update fan-out.

mod hub;

pub use hub::{
    DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_QUEUE_CAPACITY, EVENT_TYPE_KEY, HEARTBEAT_EVENT_TYPE,
    HubConfig, HubStats, PublishOutcome, SNAPSHOT_EVENT_TYPE, Subscription, SubscriptionHub,
    TripSubscriptionStats, TripUpdateEvent,
};
