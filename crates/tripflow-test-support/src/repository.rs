//! `EventRepository` implementations for tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tripflow_core::error::DomainError;
use tripflow_core::repository::{EventRepository, StoredEvent, validate_batch};
use uuid::Uuid;

/// A fully functional in-memory event store. Enforces the same append
/// contract as the PostgreSQL backend: atomic batches, versions continuing at
/// `current_max + 1`, conflicts on anything else.
#[derive(Debug, Default)]
pub struct InMemoryEventRepository {
    streams: Mutex<HashMap<Uuid, Vec<StoredEvent>>>,
    append_calls: AtomicUsize,
}

impl InMemoryEventRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a repository pre-populated with `events`, which must already be
    /// in version order per aggregate.
    #[must_use]
    pub fn with_events(events: Vec<StoredEvent>) -> Self {
        let repo = Self::new();
        {
            let mut streams = repo.streams.lock().unwrap();
            for event in events {
                streams.entry(event.aggregate_id).or_default().push(event);
            }
        }
        repo
    }

    /// Returns a snapshot of every stored event for `aggregate_id`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn events_for(&self, aggregate_id: Uuid) -> Vec<StoredEvent> {
        self.streams
            .lock()
            .unwrap()
            .get(&aggregate_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of `append_events` calls, successful or not.
    pub fn append_calls(&self) -> usize {
        self.append_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventRepository for InMemoryEventRepository {
    async fn get_events(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(self.events_for(aggregate_id))
    }

    async fn get_events_after_version(
        &self,
        aggregate_id: Uuid,
        version: i64,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(self
            .events_for(aggregate_id)
            .into_iter()
            .filter(|e| e.version > version)
            .collect())
    }

    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);
        validate_batch(aggregate_id, expected_version, events)?;

        let mut streams = self.streams.lock().unwrap();
        let stream = streams.entry(aggregate_id).or_default();
        let actual = stream.last().map_or(0, |e| e.version);
        if actual != expected_version {
            return Err(DomainError::ConcurrencyConflict {
                aggregate_id,
                expected: expected_version,
                actual,
            });
        }
        stream.extend_from_slice(events);
        Ok(())
    }
}

/// An event repository that always returns an infrastructure error. Useful for
/// testing error-handling paths.
#[derive(Debug)]
pub struct FailingEventRepository;

#[async_trait]
impl EventRepository for FailingEventRepository {
    async fn get_events(&self, _aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn get_events_after_version(
        &self,
        _aggregate_id: Uuid,
        _version: i64,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn append_events(
        &self,
        _aggregate_id: Uuid,
        _expected_version: i64,
        _events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }
}

/// Wraps an [`InMemoryEventRepository`] and rejects the first `conflicts`
/// appends with a concurrency conflict, as if another writer had won the
/// race. Reads always delegate.
#[derive(Debug)]
pub struct ConflictingEventRepository {
    inner: InMemoryEventRepository,
    remaining_conflicts: AtomicUsize,
}

impl ConflictingEventRepository {
    /// Create a repository that fails the next `conflicts` appends.
    #[must_use]
    pub fn new(inner: InMemoryEventRepository, conflicts: usize) -> Self {
        Self {
            inner,
            remaining_conflicts: AtomicUsize::new(conflicts),
        }
    }

    /// The wrapped store.
    pub fn inner(&self) -> &InMemoryEventRepository {
        &self.inner
    }
}

#[async_trait]
impl EventRepository for ConflictingEventRepository {
    async fn get_events(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        self.inner.get_events(aggregate_id).await
    }

    async fn get_events_after_version(
        &self,
        aggregate_id: Uuid,
        version: i64,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        self.inner.get_events_after_version(aggregate_id, version).await
    }

    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        let conflict = self
            .remaining_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if conflict {
            return Err(DomainError::ConcurrencyConflict {
                aggregate_id,
                expected: expected_version,
                actual: expected_version + 1,
            });
        }
        self.inner
            .append_events(aggregate_id, expected_version, events)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn make_event(aggregate_id: Uuid, version: i64) -> StoredEvent {
        StoredEvent {
            event_id: Uuid::new_v4(),
            aggregate_id,
            event_type: "trip.test".to_owned(),
            payload: serde_json::json!({ "n": version }),
            version,
            user_id: Some("r1".to_owned()),
            correlation_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_save_event_assigns_next_version() {
        // Arrange
        let repo = InMemoryEventRepository::new();
        let id = Uuid::new_v4();

        // Act
        repo.save_event(&make_event(id, 1)).await.unwrap();
        repo.save_event(&make_event(id, 2)).await.unwrap();

        // Assert
        let versions: Vec<i64> = repo.get_events(id).await.unwrap().iter().map(|e| e.version).collect();
        assert_eq!(versions, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_save_event_rejects_versions_below_one() {
        let repo = InMemoryEventRepository::new();
        let id = Uuid::new_v4();

        for version in [0, -1, i64::MIN] {
            let result = repo.save_event(&make_event(id, version)).await;
            assert!(
                matches!(result, Err(DomainError::Validation(_))),
                "version {version}: {result:?}"
            );
        }
        assert_eq!(repo.append_calls(), 0);
        assert!(repo.events_for(id).is_empty());
    }

    #[tokio::test]
    async fn test_save_event_rejects_duplicate_version() {
        // Arrange
        let repo = InMemoryEventRepository::new();
        let id = Uuid::new_v4();
        repo.save_event(&make_event(id, 1)).await.unwrap();
        let original = repo.events_for(id);

        // Act
        let result = repo.save_event(&make_event(id, 1)).await;

        // Assert
        match result.unwrap_err() {
            DomainError::ConcurrencyConflict { expected, actual, .. } => {
                assert_eq!(expected, 0);
                assert_eq!(actual, 1);
            }
            other => panic!("expected ConcurrencyConflict, got {other:?}"),
        }
        assert_eq!(repo.events_for(id), original);
    }

    #[tokio::test]
    async fn test_append_events_is_all_or_nothing() {
        // Arrange
        let repo = InMemoryEventRepository::new();
        let id = Uuid::new_v4();
        let batch = vec![make_event(id, 1), make_event(id, 3)];

        // Act
        let result = repo.append_events(id, 0, &batch).await;

        // Assert
        assert!(result.is_err());
        assert!(repo.events_for(id).is_empty());
    }

    #[tokio::test]
    async fn test_get_events_after_version_returns_tail() {
        // Arrange
        let id = Uuid::new_v4();
        let repo = InMemoryEventRepository::with_events(vec![
            make_event(id, 1),
            make_event(id, 2),
            make_event(id, 3),
        ]);

        // Act
        let tail = repo.get_events_after_version(id, 1).await.unwrap();

        // Assert
        assert_eq!(tail.iter().map(|e| e.version).collect::<Vec<_>>(), vec![2, 3]);
    }

    #[tokio::test]
    async fn test_conflicting_repository_conflicts_then_delegates() {
        // Arrange
        let repo = ConflictingEventRepository::new(InMemoryEventRepository::new(), 1);
        let id = Uuid::new_v4();

        // Act
        let first = repo.save_event(&make_event(id, 1)).await;
        let second = repo.save_event(&make_event(id, 1)).await;

        // Assert
        assert!(first.unwrap_err().is_concurrency_conflict());
        assert!(second.is_ok());
        assert_eq!(repo.inner().events_for(id).len(), 1);
    }
}
