use serde::{Deserialize, Serialize};

/// Mean Earth radius used by the haversine approximation.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

/// Great-circle distance in meters on a spherical Earth.
pub fn distance(a: Location, b: Location) -> f64 {
    let p = std::f64::consts::PI / 180.0;
    let h = 0.5 - ((b.lat - a.lat) * p).cos() / 2.0
        + (a.lat * p).cos() * (b.lat * p).cos() * (1.0 - ((b.lon - a.lon) * p).cos()) / 2.0;

    // Rounding can push h marginally outside [0, 1]
    2.0 * EARTH_RADIUS_METERS * h.clamp(0.0, 1.0).sqrt().asin()
}

pub fn within(a: Location, b: Location, radius_meters: f64) -> bool {
    distance(a, b) <= radius_meters
}
