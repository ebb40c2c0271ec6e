//! Materialized trip snapshots (the query side).

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tripflow_core::error::DomainError;
use uuid::Uuid;

use crate::domain::aggregates::TripAggregate;

/// Queryable cache of folded trip aggregates.
///
/// The event store remains the source of truth; every row here can be
/// rebuilt by replaying a trip's events.
#[async_trait]
pub trait TripReadModel: Send + Sync {
    /// Upserts `trip` only if its version is newer than the stored row.
    /// Returns whether a write happened; a stale write is a silent no-op.
    async fn save_trip(&self, trip: &TripAggregate) -> Result<bool, DomainError>;

    /// Unconditionally overwrites the row. Only the rebuild path uses this.
    async fn replace_trip(&self, trip: &TripAggregate) -> Result<(), DomainError>;

    /// Loads one trip snapshot.
    async fn get_trip(&self, trip_id: Uuid) -> Result<Option<TripAggregate>, DomainError>;

    /// The rider's trips, newest request first.
    async fn get_trips_by_rider(
        &self,
        rider_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<TripAggregate>, DomainError>;

    /// The driver's trips, newest request first.
    async fn get_trips_by_driver(
        &self,
        driver_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<TripAggregate>, DomainError>;

    /// Every trip not in a terminal state, oldest request first.
    async fn get_active_trips(&self) -> Result<Vec<TripAggregate>, DomainError>;

    /// The rider's non-terminal trip, if any.
    async fn find_active_trip_for_rider(
        &self,
        rider_id: &str,
    ) -> Result<Option<TripAggregate>, DomainError>;

    /// The trip the driver is currently working (matched through in
    /// progress), if any.
    async fn find_active_trip_for_driver(
        &self,
        driver_id: &str,
    ) -> Result<Option<TripAggregate>, DomainError>;
}

/// Process-local read model.
#[derive(Debug, Default)]
pub struct InMemoryTripReadModel {
    trips: RwLock<HashMap<Uuid, TripAggregate>>,
}

impl InMemoryTripReadModel {
    /// Creates an empty read model.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn newest_first<F>(&self, filter: F, limit: u32, offset: u32) -> Vec<TripAggregate>
    where
        F: Fn(&TripAggregate) -> bool,
    {
        let trips = self.trips.read().await;
        let mut matching: Vec<&TripAggregate> = trips.values().filter(|t| filter(t)).collect();
        matching.sort_by(|a, b| {
            b.requested_at
                .cmp(&a.requested_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        matching
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TripReadModel for InMemoryTripReadModel {
    async fn save_trip(&self, trip: &TripAggregate) -> Result<bool, DomainError> {
        let mut trips = self.trips.write().await;
        match trips.get(&trip.id) {
            Some(stored) if stored.version >= trip.version => Ok(false),
            _ => {
                trips.insert(trip.id, trip.clone());
                Ok(true)
            }
        }
    }

    async fn replace_trip(&self, trip: &TripAggregate) -> Result<(), DomainError> {
        self.trips.write().await.insert(trip.id, trip.clone());
        Ok(())
    }

    async fn get_trip(&self, trip_id: Uuid) -> Result<Option<TripAggregate>, DomainError> {
        Ok(self.trips.read().await.get(&trip_id).cloned())
    }

    async fn get_trips_by_rider(
        &self,
        rider_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<TripAggregate>, DomainError> {
        Ok(self
            .newest_first(|t| t.rider_id == rider_id, limit, offset)
            .await)
    }

    async fn get_trips_by_driver(
        &self,
        driver_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<TripAggregate>, DomainError> {
        Ok(self
            .newest_first(|t| t.driver_id.as_deref() == Some(driver_id), limit, offset)
            .await)
    }

    async fn get_active_trips(&self) -> Result<Vec<TripAggregate>, DomainError> {
        let trips = self.trips.read().await;
        let mut active: Vec<TripAggregate> = trips
            .values()
            .filter(|t| t.state.is_active())
            .cloned()
            .collect();
        active.sort_by(|a, b| {
            a.requested_at
                .cmp(&b.requested_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(active)
    }

    async fn find_active_trip_for_rider(
        &self,
        rider_id: &str,
    ) -> Result<Option<TripAggregate>, DomainError> {
        let trips = self.trips.read().await;
        Ok(trips
            .values()
            .find(|t| t.rider_id == rider_id && t.state.is_active())
            .cloned())
    }

    async fn find_active_trip_for_driver(
        &self,
        driver_id: &str,
    ) -> Result<Option<TripAggregate>, DomainError> {
        let trips = self.trips.read().await;
        Ok(trips
            .values()
            .find(|t| {
                t.driver_id.as_deref() == Some(driver_id) && t.state.is_post_match_active()
            })
            .cloned())
    }
}
