//! Geographic coordinates.

use serde::{Deserialize, Serialize};
use tripflow_core::error::DomainError;

/// A WGS84 coordinate pair in decimal degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude, `-90.0..=90.0`.
    pub latitude: f64,
    /// Longitude, `-180.0..=180.0`.
    pub longitude: f64,
}

impl GeoPoint {
    /// Builds a validated coordinate.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if either component is out of range
    /// or not finite.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, DomainError> {
        let point = Self {
            latitude,
            longitude,
        };
        point.validate()?;
        Ok(point)
    }

    /// Checks the coordinate ranges.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if either component is out of range
    /// or not finite.
    pub fn validate(&self) -> Result<(), DomainError> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(DomainError::Validation(format!(
                "latitude {} is outside -90..=90",
                self.latitude
            )));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(DomainError::Validation(format!(
                "longitude {} is outside -180..=180",
                self.longitude
            )));
        }
        Ok(())
    }
}
