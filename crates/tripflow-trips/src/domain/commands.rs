//! Commands for the Trip Lifecycle context.

use tripflow_core::command::Command;
use uuid::Uuid;

use super::location::GeoPoint;
use super::ports::VehicleType;

/// Command to request a new trip.
#[derive(Debug, Clone)]
pub struct RequestTrip {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The requesting rider.
    pub rider_id: String,
    /// Pickup point.
    pub pickup: GeoPoint,
    /// Drop-off point.
    pub destination: GeoPoint,
    /// Requested vehicle class.
    pub vehicle_type: VehicleType,
}

impl Command for RequestTrip {
    fn command_type(&self) -> &'static str {
        "trip.request"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn actor_id(&self) -> Option<&str> {
        Some(&self.rider_id)
    }
}

/// Command to mark that dispatch has started searching for a driver.
#[derive(Debug, Clone)]
pub struct StartMatching {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The trip.
    pub trip_id: Uuid,
}

impl Command for StartMatching {
    fn command_type(&self) -> &'static str {
        "trip.start_matching"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn actor_id(&self) -> Option<&str> {
        None
    }
}

/// Command to assign a driver to a trip.
#[derive(Debug, Clone)]
pub struct MatchDriver {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The trip.
    pub trip_id: Uuid,
    /// The accepting driver.
    pub driver_id: String,
    /// The driver's vehicle.
    pub vehicle_id: String,
    /// Driver's ETA to pickup in seconds.
    pub eta_seconds: i64,
    /// Fare agreed at match time, if it differs from the estimate.
    pub fare: Option<f64>,
}

impl Command for MatchDriver {
    fn command_type(&self) -> &'static str {
        "trip.match_driver"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn actor_id(&self) -> Option<&str> {
        Some(&self.driver_id)
    }
}

/// Command issued by the driver when heading to the pickup point.
#[derive(Debug, Clone)]
pub struct MarkDriverEnRoute {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The trip.
    pub trip_id: Uuid,
    /// The assigned driver.
    pub driver_id: String,
}

impl Command for MarkDriverEnRoute {
    fn command_type(&self) -> &'static str {
        "trip.mark_driver_en_route"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn actor_id(&self) -> Option<&str> {
        Some(&self.driver_id)
    }
}

/// Command issued by the driver on reaching the pickup point.
#[derive(Debug, Clone)]
pub struct MarkDriverArrived {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The trip.
    pub trip_id: Uuid,
    /// The assigned driver.
    pub driver_id: String,
}

impl Command for MarkDriverArrived {
    fn command_type(&self) -> &'static str {
        "trip.mark_driver_arrived"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn actor_id(&self) -> Option<&str> {
        Some(&self.driver_id)
    }
}

/// Command issued by the driver once the rider is on board.
#[derive(Debug, Clone)]
pub struct StartTrip {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The trip.
    pub trip_id: Uuid,
    /// The assigned driver.
    pub driver_id: String,
}

impl Command for StartTrip {
    fn command_type(&self) -> &'static str {
        "trip.start"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn actor_id(&self) -> Option<&str> {
        Some(&self.driver_id)
    }
}

/// Command issued by the driver at drop-off.
#[derive(Debug, Clone)]
pub struct CompleteTrip {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The trip.
    pub trip_id: Uuid,
    /// The assigned driver.
    pub driver_id: String,
    /// Final fare; priced from distance and duration when absent.
    pub actual_fare: Option<f64>,
    /// Driven distance in kilometers.
    pub distance_km: f64,
    /// Ride duration in seconds.
    pub duration_seconds: i64,
}

impl Command for CompleteTrip {
    fn command_type(&self) -> &'static str {
        "trip.complete"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn actor_id(&self) -> Option<&str> {
        Some(&self.driver_id)
    }
}

/// Command to cancel a trip, issued by its rider or driver.
#[derive(Debug, Clone)]
pub struct CancelTrip {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The trip.
    pub trip_id: Uuid,
    /// The cancelling user.
    pub user_id: String,
    /// Free-text reason.
    pub reason: String,
}

impl Command for CancelTrip {
    fn command_type(&self) -> &'static str {
        "trip.cancel"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn actor_id(&self) -> Option<&str> {
        Some(&self.user_id)
    }
}

/// System command to mark a trip as failed.
#[derive(Debug, Clone)]
pub struct FailTrip {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The trip.
    pub trip_id: Uuid,
    /// Why the trip failed.
    pub reason: String,
}

impl Command for FailTrip {
    fn command_type(&self) -> &'static str {
        "trip.fail"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn actor_id(&self) -> Option<&str> {
        None
    }
}

/// Command to dispute a completed trip, issued by its rider or driver.
#[derive(Debug, Clone)]
pub struct DisputeTrip {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The trip.
    pub trip_id: Uuid,
    /// The disputing user.
    pub user_id: String,
    /// Free-text reason.
    pub reason: String,
}

impl Command for DisputeTrip {
    fn command_type(&self) -> &'static str {
        "trip.dispute"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn actor_id(&self) -> Option<&str> {
        Some(&self.user_id)
    }
}

/// System command that settles a dispute.
#[derive(Debug, Clone)]
pub struct ResolveDispute {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The trip.
    pub trip_id: Uuid,
    /// Outcome description.
    pub resolution: String,
    /// Corrected fare, if any.
    pub adjusted_fare: Option<f64>,
}

impl Command for ResolveDispute {
    fn command_type(&self) -> &'static str {
        "trip.resolve_dispute"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn actor_id(&self) -> Option<&str> {
        None
    }
}

/// Position report from the rider or driver.
#[derive(Debug, Clone)]
pub struct UpdateLocation {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The trip.
    pub trip_id: Uuid,
    /// The reporting user.
    pub user_id: String,
    /// Reported position.
    pub location: GeoPoint,
}

impl Command for UpdateLocation {
    fn command_type(&self) -> &'static str {
        "trip.update_location"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn actor_id(&self) -> Option<&str> {
        Some(&self.user_id)
    }
}
