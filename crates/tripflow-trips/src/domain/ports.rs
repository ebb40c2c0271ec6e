//! Collaborator ports: geospatial estimation and pricing.
//!
//! Both are called synchronously while a command is being handled. Any
//! failure they report aborts the command with `DomainError::Dependency`.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tripflow_core::error::DomainError;

use super::location::GeoPoint;

/// Class of vehicle the rider asked for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleType {
    /// Standard car.
    #[default]
    Economy,
    /// Newer, roomier car.
    Comfort,
    /// Luxury car.
    Premium,
    /// Six-seater.
    Xl,
}

impl VehicleType {
    /// Persistent name of the vehicle class.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Economy => "economy",
            Self::Comfort => "comfort",
            Self::Premium => "premium",
            Self::Xl => "xl",
        }
    }
}

impl FromStr for VehicleType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Self::Economy, Self::Comfort, Self::Premium, Self::Xl]
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| DomainError::Validation(format!("unknown vehicle type: {s}")))
    }
}

/// Straight-line distance between two points.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceEstimate {
    /// Distance in meters.
    pub distance_meters: f64,
    /// Initial bearing from origin to destination, `0..360`.
    pub bearing_degrees: f64,
}

/// Travel-time estimate for a route.
#[derive(Debug, Clone, PartialEq)]
pub struct EtaEstimate {
    /// Expected travel time in seconds.
    pub duration_seconds: i64,
    /// Route length in meters.
    pub distance_meters: f64,
    /// Human-readable route description.
    pub route_summary: String,
}

/// Input to a price calculation.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRequest {
    /// Trip distance in kilometers.
    pub distance_km: f64,
    /// Trip duration in minutes.
    pub estimated_minutes: f64,
    /// Requested vehicle class.
    pub vehicle_type: VehicleType,
    /// Pickup point, used for area-based surge.
    pub pickup_area: GeoPoint,
    /// When the trip was requested.
    pub request_time: DateTime<Utc>,
}

/// A computed fare.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceQuote {
    /// Final fare including surge.
    pub total_fare: f64,
    /// Surge factor applied, `1.0` when none.
    pub surge_multiplier: f64,
    /// ISO 4217 currency code.
    pub currency: String,
}

/// Geospatial distance and ETA engine.
#[async_trait]
pub trait GeoService: Send + Sync {
    /// Distance and bearing between two points.
    async fn calculate_distance(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
    ) -> Result<DistanceEstimate, DomainError>;

    /// Travel time between two points for a vehicle class.
    async fn calculate_eta(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
        vehicle_type: VehicleType,
    ) -> Result<EtaEstimate, DomainError>;
}

/// Pricing and surge engine.
#[async_trait]
pub trait PricingService: Send + Sync {
    /// Computes the fare for a trip.
    async fn calculate_price(&self, request: &PriceRequest) -> Result<PriceQuote, DomainError>;
}
