//! Great-circle proximity checks against the store location.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Mean Earth radius used by the haversine formula, in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// A validated WGS84 position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Rejects non-finite values and values outside [-90, 90] / [-180, 180].
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(Error::InvalidLocation(format!(
                "latitude {} is out of range",
                latitude
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(Error::InvalidLocation(format!(
                "longitude {} is out of range",
                longitude
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Haversine distance to `other` in meters.
    pub fn distance_to(&self, other: &Coordinates) -> f64 {
        distance(self.latitude, self.longitude, other.latitude, other.longitude)
    }
}

/// Haversine great-circle distance between two points, in meters.
pub fn distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Rounding can push `a` marginally past 1 for antipodal points.
    let c = 2.0 * a.clamp(0.0, 1.0).sqrt().asin();

    EARTH_RADIUS_METERS * c
}

pub fn is_within_radius(point: &Coordinates, center: &Coordinates, radius_meters: f64) -> bool {
    point.distance_to(center) <= radius_meters
}

/// Circular boundary around the store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoFence {
    center: Coordinates,
    radius_meters: f64,
}

impl GeoFence {
    pub fn new(center: Coordinates, radius_meters: f64) -> Result<Self> {
        if !radius_meters.is_finite() || radius_meters <= 0.0 {
            return Err(Error::InvalidLocation(format!(
                "geofence radius {} must be a positive number of meters",
                radius_meters
            )));
        }
        Ok(Self {
            center,
            radius_meters,
        })
    }

    pub fn center(&self) -> Coordinates {
        self.center
    }

    pub fn radius_meters(&self) -> f64 {
        self.radius_meters
    }

    pub fn contains(&self, point: &Coordinates) -> bool {
        is_within_radius(point, &self.center, self.radius_meters)
    }

    /// Returns the distance to the center when inside the fence, or
    /// `LocationRejected` carrying that distance otherwise.
    pub fn check(&self, point: &Coordinates) -> Result<f64> {
        let distance_meters = point.distance_to(&self.center);
        if distance_meters <= self.radius_meters {
            Ok(distance_meters)
        } else {
            Err(Error::LocationRejected {
                distance_meters: Some(distance_meters),
            })
        }
    }
}
