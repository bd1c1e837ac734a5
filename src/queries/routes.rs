use crate::queries::_structs::{BusRoute, RouteId, RouteStop, Stop, StopId};
use tokio_postgres::{Client, Error, Row};

fn stop_from_row(row: &Row) -> Stop {
    Stop {
        id: row.get("id"),
        name: row.get("name"),
        latitude: row.get("latitude"),
        longitude: row.get("longitude"),
    }
}

fn route_from_row(row: &Row) -> BusRoute {
    BusRoute {
        id: row.get("id"),
        name: row.get("name"),
        is_active: row.get("is_active"),
        reverse_route: row.get("reverse_route"),
    }
}

pub async fn find_stop(id: StopId, client: &Client) -> Result<Option<Stop>, Error> {
    let row = client
        .query_opt("SELECT id, name, latitude, longitude FROM stops WHERE id = $1", &[&id])
        .await?;
    Ok(row.as_ref().map(stop_from_row))
}

pub async fn find_stop_by_name(name: &str, client: &Client) -> Result<Option<Stop>, Error> {
    let row = client
        .query_opt(
            "SELECT id, name, latitude, longitude FROM stops WHERE lower(name) = lower($1) LIMIT 1",
            &[&name],
        )
        .await?;
    Ok(row.as_ref().map(stop_from_row))
}

pub async fn find_route(id: RouteId, client: &Client) -> Result<Option<BusRoute>, Error> {
    let row = client
        .query_opt(
            "SELECT id, name, is_active, reverse_route FROM bus_routes WHERE id = $1",
            &[&id],
        )
        .await?;
    Ok(row.as_ref().map(route_from_row))
}

pub async fn active_routes(client: &Client) -> Result<Vec<BusRoute>, Error> {
    let rows = client
        .query(
            "SELECT id, name, is_active, reverse_route FROM bus_routes WHERE is_active ORDER BY id",
            &[],
        )
        .await?;
    Ok(rows.iter().map(route_from_row).collect())
}

pub async fn route_stops(route_id: RouteId, client: &Client) -> Result<Vec<RouteStop>, Error> {
    let query = "
        SELECT
            s.id,
            s.name,
            s.latitude,
            s.longitude,
            rs.\"order\" AS stop_order,
            rs.distance_to_next_m
        FROM route_stops rs
        JOIN stops s ON s.id = rs.stop_id
        WHERE rs.route_id = $1
        ORDER BY rs.\"order\";
    ";

    let rows = client.query(query, &[&route_id]).await?;
    Ok(rows
        .iter()
        .map(|row| RouteStop {
            route_id,
            stop: stop_from_row(row),
            order: row.get("stop_order"),
            distance_to_next_m: row.get("distance_to_next_m"),
        })
        .collect())
}

/// Upserts a stop by name and returns its id.
pub async fn upsert_stop(name: &str, latitude: f64, longitude: f64, client: &Client) -> Result<StopId, Error> {
    let row = client
        .query_one(
            "INSERT INTO stops (name, latitude, longitude) VALUES ($1, $2, $3)
             ON CONFLICT (name) DO UPDATE SET latitude = EXCLUDED.latitude, longitude = EXCLUDED.longitude
             RETURNING id",
            &[&name, &latitude, &longitude],
        )
        .await?;
    Ok(row.get(0))
}

/// Creates the route if needed and replaces its stop list.
pub async fn replace_route_stops(
    route_name: &str,
    stops: &[(StopId, i32, Option<f64>)],
    client: &mut Client,
) -> Result<RouteId, Error> {
    let tx = client.transaction().await?;
    let row = tx
        .query_one(
            "INSERT INTO bus_routes (name, is_active) VALUES ($1, TRUE)
             ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
             RETURNING id",
            &[&route_name],
        )
        .await?;
    let route_id: RouteId = row.get(0);

    tx.execute("DELETE FROM route_stops WHERE route_id = $1", &[&route_id])
        .await?;
    for (stop_id, order, distance) in stops {
        tx.execute(
            "INSERT INTO route_stops (route_id, stop_id, \"order\", distance_to_next_m) VALUES ($1, $2, $3, $4)",
            &[&route_id, stop_id, order, distance],
        )
        .await?;
    }
    tx.commit().await?;
    Ok(route_id)
}
