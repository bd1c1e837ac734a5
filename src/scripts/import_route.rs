//! Loads a route's ordered stops from a GeoJSON file into PostgreSQL.
//!
//! Usage: `import_route <route name> <stops.geojson>`
//!
//! Every feature must be a Point with a `name` and an integer `order`.
//! `distance_to_next_m` is optional; when missing the straight-line
//! distance to the next stop is stored instead.

use bus_tracker::db;
use bus_tracker::queries::routes;
use bus_tracker::utils::geo_math::distance_meters;
use geojson::{FeatureCollection, Value};
use log::{error, info};
use std::env;
use std::fs;
use std::process;

#[derive(Debug, thiserror::Error)]
enum ImportError {
    #[error("Usage: import_route <route name> <stops.geojson>")]
    Usage,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),
    #[error("Feature {index}: {reason}")]
    Feature { index: usize, reason: String },
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),
    #[error("DATABASE_URL is not set")]
    MissingDatabaseUrl,
}

#[derive(Debug, Clone, PartialEq)]
struct ImportedStop {
    name: String,
    order: i32,
    latitude: f64,
    longitude: f64,
    distance_to_next_m: Option<f64>,
}

fn feature_error(index: usize, reason: &str) -> ImportError {
    ImportError::Feature {
        index,
        reason: reason.to_string(),
    }
}

fn parse_stops(raw: &str) -> Result<Vec<ImportedStop>, ImportError> {
    let collection: FeatureCollection = raw.parse()?;

    let mut stops = Vec::with_capacity(collection.features.len());
    for (index, feature) in collection.features.iter().enumerate() {
        let (longitude, latitude) = match feature.geometry.as_ref().map(|g| &g.value) {
            Some(Value::Point(coords)) if coords.len() >= 2 => (coords[0], coords[1]),
            _ => return Err(feature_error(index, "geometry must be a Point")),
        };
        let name = feature
            .property("name")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| feature_error(index, "missing `name`"))?;
        let order = feature
            .property("order")
            .and_then(|v| v.as_i64())
            .and_then(|o| i32::try_from(o).ok())
            .ok_or_else(|| feature_error(index, "missing integer `order`"))?;
        let distance_to_next_m = feature.property("distance_to_next_m").and_then(|v| v.as_f64());

        stops.push(ImportedStop {
            name: name.to_string(),
            order,
            latitude,
            longitude,
            distance_to_next_m,
        });
    }

    stops.sort_by_key(|s| s.order);
    fill_missing_distances(&mut stops);
    Ok(stops)
}

/// The last stop keeps `None`: it has no next hop.
fn fill_missing_distances(stops: &mut [ImportedStop]) {
    for i in 0..stops.len().saturating_sub(1) {
        if stops[i].distance_to_next_m.is_none() {
            let (a, b) = (&stops[i], &stops[i + 1]);
            let d = distance_meters(a.latitude, a.longitude, b.latitude, b.longitude);
            stops[i].distance_to_next_m = Some(d);
        }
    }
    if let Some(last) = stops.last_mut() {
        last.distance_to_next_m = None;
    }
}

async fn run() -> Result<(), ImportError> {
    let mut args = env::args().skip(1);
    let (route_name, path) = match (args.next(), args.next()) {
        (Some(name), Some(path)) => (name, path),
        _ => return Err(ImportError::Usage),
    };

    let stops = parse_stops(&fs::read_to_string(&path)?)?;
    info!("Parsed {} stops from {}", stops.len(), path);

    let db_url = env::var("DATABASE_URL").map_err(|_| ImportError::MissingDatabaseUrl)?;
    let mut client = db::connect_to_db(&db_url).await?;
    db::ensure_schema(&client).await?;

    let mut rows = Vec::with_capacity(stops.len());
    for stop in &stops {
        let id = routes::upsert_stop(&stop.name, stop.latitude, stop.longitude, &client).await?;
        rows.push((id, stop.order, stop.distance_to_next_m));
    }

    let route_id = routes::replace_route_stops(&route_name, &rows, &mut client).await?;
    info!("Route '{}' (id {}) now has {} stops", route_name, route_id, rows.len());
    Ok(())
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    env_logger::init();

    if let Err(e) = run().await {
        error!("{}", e);
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [85.30, 27.71]},
             "properties": {"name": "Jamal", "order": 2}},
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [85.30, 27.70]},
             "properties": {"name": "Ratna Park", "order": 1, "distance_to_next_m": 1200.0}},
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [85.30, 27.72]},
             "properties": {"name": "Lazimpat", "order": 3, "distance_to_next_m": 999.0}}
        ]
    }"#;

    #[test]
    fn test_parse_sorts_and_fills_distances() {
        let stops = parse_stops(SAMPLE).unwrap();
        let names: Vec<_> = stops.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Ratna Park", "Jamal", "Lazimpat"]);

        assert_eq!(stops[0].distance_to_next_m, Some(1200.0));
        let filled = stops[1].distance_to_next_m.unwrap();
        assert!((filled - 1112.0).abs() < 5.0, "got {}", filled);
        assert_eq!(stops[2].distance_to_next_m, None);
        assert_eq!(stops[0].latitude, 27.70);
    }

    #[test]
    fn test_rejects_features_without_order() {
        let raw = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [85.3, 27.7]},
             "properties": {"name": "Jamal"}}
        ]}"#;
        assert!(matches!(
            parse_stops(raw),
            Err(ImportError::Feature { index: 0, .. })
        ));
    }

    #[test]
    fn test_rejects_non_point_geometry() {
        let raw = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "geometry": {"type": "LineString", "coordinates": [[85.3, 27.7], [85.3, 27.8]]},
             "properties": {"name": "Jamal", "order": 1}}
        ]}"#;
        assert!(parse_stops(raw).is_err());
    }
}
