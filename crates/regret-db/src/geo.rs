//! Great-circle math for the nearby query. SQLite has no geospatial index, so
//! candidates are narrowed with a lat/lon bounding box in SQL and filtered
//! exactly with the haversine distance afterwards.

use regret_types::models::GeoPoint;

/// Mean Earth radius (IUGG), meters.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

pub fn haversine_meters(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lat2) = (a.latitude.to_radians(), b.latitude.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Degrees. `lon` is `None` when the box would wrap the antimeridian or a pole,
/// in which case every longitude is a candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub lat: (f64, f64),
    pub lon: Option<(f64, f64)>,
}

impl BoundingBox {
    pub fn around(center: GeoPoint, radius_m: f64) -> Self {
        // Slightly oversized so float error never excludes a point on the circle
        let angular = (radius_m / EARTH_RADIUS_M) * 1.000_001;
        let lat_rad = center.latitude.to_radians();

        let min_lat = lat_rad - angular;
        let max_lat = lat_rad + angular;
        let lat = (
            min_lat.to_degrees().max(-90.0),
            max_lat.to_degrees().min(90.0),
        );

        if min_lat <= -std::f64::consts::FRAC_PI_2 || max_lat >= std::f64::consts::FRAC_PI_2 {
            return Self { lat, lon: None };
        }

        let ratio = angular.sin() / lat_rad.cos();
        if ratio >= 1.0 {
            return Self { lat, lon: None };
        }

        let delta = ratio.asin().to_degrees();
        let (min_lon, max_lon) = (center.longitude - delta, center.longitude + delta);
        if min_lon < -180.0 || max_lon > 180.0 {
            return Self { lat, lon: None };
        }

        Self {
            lat,
            lon: Some((min_lon, max_lon)),
        }
    }
}
