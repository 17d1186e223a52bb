//! Geographic positions and geodesic distance.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Mean earth radius in meters, spherical model.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A geographic position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
}

impl Position {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Great-circle distance to `other` in meters (haversine).
    ///
    /// A spherical earth is accurate to ~0.5% which is more than enough for
    /// radius filtering and nearest-first ordering of vessels.
    pub fn distance_to(&self, other: &Position) -> f64 {
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lon = (other.lon - self.lon).to_radians();

        let a = (d_lat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().asin();

        EARTH_RADIUS_M * c
    }
}

/// A position together with the time it was reported.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    pub position: Position,
    pub recorded_at: SystemTime,
}

impl PositionFix {
    pub fn now(position: Position) -> Self {
        Self {
            position,
            recorded_at: SystemTime::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_distance_to_self() {
        let p = Position::new(55.676, 12.568);
        assert!(p.distance_to(&p) < 1e-9);
    }

    #[test]
    fn one_millidegree_of_latitude_is_about_111_meters() {
        let a = Position::new(0.0, 0.0);
        let b = Position::new(0.001, 0.0);
        let d = a.distance_to(&b);
        assert!((d - 111.2).abs() < 1.0, "got {d}");
    }

    #[test]
    fn distance_is_symmetric() {
        let a = Position::new(55.676, 12.568); // Copenhagen
        let b = Position::new(57.708, 11.974); // Gothenburg
        let d1 = a.distance_to(&b);
        let d2 = b.distance_to(&a);
        assert!((d1 - d2).abs() < 1e-6);
        // Roughly 229 km as the crow flies.
        assert!(d1 > 200_000.0 && d1 < 260_000.0, "got {d1}");
    }
}
