use geo_types::Point;

/// Earth radius used by every distance in the service.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters (haversine).
pub fn distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();

    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Same as [`distance_meters`], in kilometers.
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    distance_meters(lat1, lon1, lat2, lon2) / 1000.0
}

pub fn point_distance_meters(a: Point<f64>, b: Point<f64>) -> f64 {
    distance_meters(a.y(), a.x(), b.y(), b.x())
}

/// Index of the point closest to `point`. Ties go to the first one in list
/// order; `None` for an empty list.
pub fn nearest_index(point: Point<f64>, points: &[Point<f64>]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, candidate) in points.iter().enumerate() {
        let d = point_distance_meters(point, *candidate);
        match best {
            Some((_, best_d)) if d >= best_d => {}
            _ => best = Some((idx, d)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// Coordinates coming off the wire must be finite and on the globe.
pub fn valid_coordinates(lat: f64, lng: f64) -> bool {
    lat.is_finite() && lng.is_finite() && (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng)
}
