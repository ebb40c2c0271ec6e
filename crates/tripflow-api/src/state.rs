//! Shared application state.

use std::sync::Arc;

use tripflow_core::clock::Clock;
use tripflow_core::repository::EventRepository;
use tripflow_trips::application::collaborators::{GreatCircleGeoService, RateCardPricing};
use tripflow_trips::application::command_handlers::TripLifecycleService;
use tripflow_trips::application::read_model::TripReadModel;
use tripflow_trips::realtime::{HubConfig, SubscriptionHub};

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Command side: the trip lifecycle service.
    pub service: Arc<TripLifecycleService>,
    /// Query side: the materialized trip view.
    pub read_model: Arc<dyn TripReadModel>,
    /// Event history, for replay and audit queries.
    pub event_repository: Arc<dyn EventRepository>,
}

impl AppState {
    /// Wires a service with the built-in geo and pricing collaborators over
    /// the given storage backends.
    #[must_use]
    pub fn new(
        event_repository: Arc<dyn EventRepository>,
        read_model: Arc<dyn TripReadModel>,
        hub_config: HubConfig,
        command_max_attempts: u32,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let service = TripLifecycleService::new(
            event_repository.clone(),
            read_model.clone(),
            Arc::new(GreatCircleGeoService),
            Arc::new(RateCardPricing),
            SubscriptionHub::new(hub_config),
            clock,
        )
        .with_max_attempts(command_max_attempts);
        Self {
            service: Arc::new(service),
            read_model,
            event_repository,
        }
    }
}
