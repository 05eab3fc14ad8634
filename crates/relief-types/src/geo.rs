//! Small spherical geometry helpers used by the nearby queries.
//!
//! SQLite has no spatial index here, so the db layer prefilters rows with
//! a [`BoundingBox`] on plain `lon`/`lat` columns and then ranks the
//! survivors with [`haversine_m`].

use crate::models::{AffectedArea, AreaCoordinates};

/// Mean earth radius in metres (IUGG).
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Default search radius for nearby volunteers, resources and help requests.
pub const DEFAULT_NEARBY_RADIUS_M: f64 = 10_000.0;

/// Default radius used when matching point-shaped affected areas.
pub const DEFAULT_AREA_RADIUS_M: f64 = 50_000.0;

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum CoordinateError {
    #[error("longitude {0} is outside [-180, 180]")]
    Longitude(f64),
    #[error("latitude {0} is outside [-90, 90]")]
    Latitude(f64),
}

pub fn validate(longitude: f64, latitude: f64) -> Result<(), CoordinateError> {
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(CoordinateError::Longitude(longitude));
    }
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(CoordinateError::Latitude(latitude));
    }
    Ok(())
}

/// Great-circle distance between two `[lon, lat]` points in metres.
pub fn haversine_m(a: [f64; 2], b: [f64; 2]) -> f64 {
    let (lon1, lat1) = (a[0].to_radians(), a[1].to_radians());
    let (lon2, lat2) = (b[0].to_radians(), b[1].to_radians());

    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Box that contains every point within `radius_m` of `center`.
    /// Falls back to the full longitude range near the poles and across
    /// the antimeridian.
    pub fn around(center: [f64; 2], radius_m: f64) -> Self {
        let [lon, lat] = center;
        let dlat = (radius_m / EARTH_RADIUS_M).to_degrees();
        let min_lat = (lat - dlat).max(-90.0);
        let max_lat = (lat + dlat).min(90.0);

        let cos_lat = lat.to_radians().cos();
        if min_lat <= -90.0 || max_lat >= 90.0 || cos_lat < 1e-9 {
            return Self { min_lon: -180.0, max_lon: 180.0, min_lat, max_lat };
        }

        let dlon = dlat / cos_lat;
        let (min_lon, max_lon) = (lon - dlon, lon + dlon);
        if min_lon < -180.0 || max_lon > 180.0 {
            return Self { min_lon: -180.0, max_lon: 180.0, min_lat, max_lat };
        }

        Self { min_lon, max_lon, min_lat, max_lat }
    }
}

/// Ray casting over one linear ring. Points on an edge may land either way.
fn ring_contains(ring: &[[f64; 2]], point: [f64; 2]) -> bool {
    let [x, y] = point;
    let mut inside = false;
    let n = ring.len();
    if n < 3 {
        return false;
    }

    let mut j = n - 1;
    for i in 0..n {
        let [xi, yi] = ring[i];
        let [xj, yj] = ring[j];
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Whether `point` lies inside the polygon: in the outer ring, outside every hole.
pub fn polygon_contains(rings: &[Vec<[f64; 2]>], point: [f64; 2]) -> bool {
    match rings.split_first() {
        Some((outer, holes)) => {
            ring_contains(outer, point) && !holes.iter().any(|h| ring_contains(h, point))
        }
        None => false,
    }
}

/// Whether an affected area covers `point`. Point-shaped areas count as
/// covering everything within `radius_m`.
pub fn area_covers(area: &AffectedArea, point: [f64; 2], radius_m: f64) -> bool {
    match &area.coordinates {
        AreaCoordinates::Point(center) => haversine_m(*center, point) <= radius_m,
        AreaCoordinates::Polygon(rings) => polygon_contains(rings, point),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AreaKind;

    const MUMBAI: [f64; 2] = [72.8777, 19.0760];
    const PUNE: [f64; 2] = [73.8567, 18.5204];

    #[test]
    fn haversine_matches_known_distance() {
        // Mumbai to Pune is roughly 120 km as the crow flies.
        let d = haversine_m(MUMBAI, PUNE);
        assert!((115_000.0..125_000.0).contains(&d), "got {d}");
        assert_eq!(haversine_m(MUMBAI, MUMBAI), 0.0);
    }

    #[test]
    fn bounding_box_contains_radius() {
        let bbox = BoundingBox::around(MUMBAI, 10_000.0);
        assert!(bbox.min_lat < MUMBAI[1] && bbox.max_lat > MUMBAI[1]);
        assert!(bbox.min_lon < MUMBAI[0] && bbox.max_lon > MUMBAI[0]);
        // A point 10 km due north sits just inside the box.
        let north = [MUMBAI[0], MUMBAI[1] + 0.0899];
        assert!(north[1] <= bbox.max_lat);
        assert!(PUNE[1] < bbox.min_lat);
    }

    #[test]
    fn bounding_box_widens_across_antimeridian() {
        let bbox = BoundingBox::around([179.99, 0.0], 5_000.0);
        assert_eq!((bbox.min_lon, bbox.max_lon), (-180.0, 180.0));
    }

    #[test]
    fn polygon_with_hole() {
        let outer = vec![[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0], [0.0, 0.0]];
        let hole = vec![[4.0, 4.0], [6.0, 4.0], [6.0, 6.0], [4.0, 6.0], [4.0, 4.0]];
        let rings = vec![outer, hole];

        assert!(polygon_contains(&rings, [2.0, 2.0]));
        assert!(!polygon_contains(&rings, [5.0, 5.0]));
        assert!(!polygon_contains(&rings, [11.0, 5.0]));
        assert!(!polygon_contains(&[], [1.0, 1.0]));
    }

    #[test]
    fn point_area_uses_radius() {
        let area = AffectedArea {
            kind: AreaKind::Point,
            coordinates: AreaCoordinates::Point(MUMBAI),
            name: None,
            pincode: None,
            state: None,
            district: None,
        };
        assert!(area_covers(&area, PUNE, 150_000.0));
        assert!(!area_covers(&area, PUNE, DEFAULT_AREA_RADIUS_M));
    }

    #[test]
    fn validate_rejects_out_of_range() {
        assert!(validate(72.0, 19.0).is_ok());
        assert_eq!(validate(181.0, 0.0), Err(CoordinateError::Longitude(181.0)));
        assert_eq!(validate(0.0, -91.0), Err(CoordinateError::Latitude(-91.0)));
        assert!(validate(f64::NAN, 0.0).is_err());
    }
}
