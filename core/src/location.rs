//! Device location as a request filter.
//!
//! The provider is an external collaborator; only its contract lives here,
//! plus the fixed and unavailable providers used by hosts without location
//! services and by tests.

use async_trait::async_trait;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use thiserror::Error;

/// A coordinate. Encodes as `{"location": "<lat>,<lon>"}`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    pub fn as_query_value(&self) -> String {
        format!("{},{}", self.latitude, self.longitude)
    }
}

impl Serialize for Location {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry("location", &self.as_query_value())?;
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("location unavailable: {0}")]
    Unavailable(String),
}

/// Supplies one observed coordinate, or the reason there is none.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn location(&self) -> Result<Location, LocationError>;
}

/// Always reports the same coordinate.
#[derive(Debug, Clone, Copy)]
pub struct FixedLocationProvider {
    location: Location,
}

impl FixedLocationProvider {
    /// Campbell, California.
    pub const DEFAULT: Location = Location {
        latitude: 37.279138,
        longitude: -121.950346,
    };

    pub fn new(location: Location) -> Self {
        Self { location }
    }
}

impl Default for FixedLocationProvider {
    fn default() -> Self {
        Self::new(Self::DEFAULT)
    }
}

#[async_trait]
impl LocationProvider for FixedLocationProvider {
    async fn location(&self) -> Result<Location, LocationError> {
        Ok(self.location)
    }
}

/// Always fails with the configured error.
#[derive(Debug, Clone)]
pub struct UnavailableLocationProvider {
    error: LocationError,
}

impl UnavailableLocationProvider {
    pub fn new(error: LocationError) -> Self {
        Self { error }
    }
}

#[async_trait]
impl LocationProvider for UnavailableLocationProvider {
    async fn location(&self) -> Result<Location, LocationError> {
        Err(self.error.clone())
    }
}
