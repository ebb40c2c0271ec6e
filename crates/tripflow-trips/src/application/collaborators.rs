//! Default geo and pricing collaborators.
//!
//! Self-contained estimators so the service runs without external engines.
//! Production deployments swap in real implementations of the ports.

use async_trait::async_trait;
use tripflow_core::error::DomainError;

use crate::domain::location::GeoPoint;
use crate::domain::ports::{
    DistanceEstimate, EtaEstimate, GeoService, PriceQuote, PriceRequest, PricingService,
    VehicleType,
};

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Multiplier from great-circle to expected road distance.
const ROAD_FACTOR: f64 = 1.3;

/// Haversine distance with per-vehicle average city speeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreatCircleGeoService;

impl GreatCircleGeoService {
    fn average_speed_kmh(vehicle_type: VehicleType) -> f64 {
        match vehicle_type {
            VehicleType::Economy | VehicleType::Xl => 28.0,
            VehicleType::Comfort => 30.0,
            VehicleType::Premium => 32.0,
        }
    }

    fn haversine(origin: GeoPoint, destination: GeoPoint) -> (f64, f64) {
        let (lat1, lon1) = (origin.latitude.to_radians(), origin.longitude.to_radians());
        let (lat2, lon2) = (
            destination.latitude.to_radians(),
            destination.longitude.to_radians(),
        );
        let d_lat = lat2 - lat1;
        let d_lon = lon2 - lon1;

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        let distance = 2.0 * EARTH_RADIUS_METERS * a.sqrt().atan2((1.0 - a).sqrt());

        let y = d_lon.sin() * lat2.cos();
        let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lon.cos();
        let bearing = y.atan2(x).to_degrees().rem_euclid(360.0);

        (distance, bearing)
    }
}

#[async_trait]
impl GeoService for GreatCircleGeoService {
    async fn calculate_distance(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
    ) -> Result<DistanceEstimate, DomainError> {
        origin.validate()?;
        destination.validate()?;
        let (distance_meters, bearing_degrees) = Self::haversine(origin, destination);
        Ok(DistanceEstimate {
            distance_meters,
            bearing_degrees,
        })
    }

    async fn calculate_eta(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
        vehicle_type: VehicleType,
    ) -> Result<EtaEstimate, DomainError> {
        origin.validate()?;
        destination.validate()?;
        let (straight, _) = Self::haversine(origin, destination);
        let distance_meters = straight * ROAD_FACTOR;
        let meters_per_second = Self::average_speed_kmh(vehicle_type) * 1000.0 / 3600.0;
        #[allow(clippy::cast_possible_truncation)]
        let duration_seconds = (distance_meters / meters_per_second).ceil() as i64;
        Ok(EtaEstimate {
            duration_seconds,
            distance_meters,
            route_summary: format!("{:.1} km direct route", distance_meters / 1000.0),
        })
    }
}

/// Per-vehicle tariff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateCard {
    /// Flat charge per trip.
    pub base_fare: f64,
    /// Charge per kilometer.
    pub per_km: f64,
    /// Charge per minute.
    pub per_minute: f64,
    /// Lowest fare charged.
    pub minimum_fare: f64,
}

/// Base + distance + time tariff with no surge.
#[derive(Debug, Clone, Default)]
pub struct RateCardPricing;

impl RateCardPricing {
    /// Tariff for `vehicle_type`.
    #[must_use]
    pub const fn rate_card(vehicle_type: VehicleType) -> RateCard {
        match vehicle_type {
            VehicleType::Economy => RateCard {
                base_fare: 2.50,
                per_km: 1.20,
                per_minute: 0.25,
                minimum_fare: 6.00,
            },
            VehicleType::Comfort => RateCard {
                base_fare: 3.50,
                per_km: 1.60,
                per_minute: 0.35,
                minimum_fare: 8.00,
            },
            VehicleType::Premium => RateCard {
                base_fare: 5.00,
                per_km: 2.40,
                per_minute: 0.50,
                minimum_fare: 12.00,
            },
            VehicleType::Xl => RateCard {
                base_fare: 4.00,
                per_km: 2.00,
                per_minute: 0.40,
                minimum_fare: 10.00,
            },
        }
    }
}

#[async_trait]
impl PricingService for RateCardPricing {
    async fn calculate_price(&self, request: &PriceRequest) -> Result<PriceQuote, DomainError> {
        if !request.distance_km.is_finite() || request.distance_km < 0.0 {
            return Err(DomainError::Validation(format!(
                "distance must be a non-negative number, got {}",
                request.distance_km
            )));
        }
        if !request.estimated_minutes.is_finite() || request.estimated_minutes < 0.0 {
            return Err(DomainError::Validation(format!(
                "duration must be a non-negative number, got {}",
                request.estimated_minutes
            )));
        }
        let card = Self::rate_card(request.vehicle_type);
        let raw = card.base_fare
            + card.per_km * request.distance_km
            + card.per_minute * request.estimated_minutes;
        let total_fare = (raw.max(card.minimum_fare) * 100.0).round() / 100.0;
        Ok(PriceQuote {
            total_fare,
            surge_multiplier: 1.0,
            currency: "USD".to_owned(),
        })
    }
}
