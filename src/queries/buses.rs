use crate::queries::_structs::{
    Bus, BusId, Driver, DriverId, LiveFields, RouteId, Seat, SeatId, User, UserId,
};
use tokio_postgres::{Client, Error, Row};

const BUS_COLUMNS: &str = "id, number_plate, total_seats, driver_id, route_id, current_lat, current_lng,
    nearest_stop_index, eta_seconds, eta_smoothed_seconds, eta_passed_counter, updated_at";

const DRIVER_COLUMNS: &str = "id, user_id, phone, vehicle_number, verified, current_lat, current_lng";

fn bus_from_row(row: &Row) -> Bus {
    Bus {
        id: row.get("id"),
        number_plate: row.get("number_plate"),
        total_seats: row.get("total_seats"),
        driver_id: row.get("driver_id"),
        route_id: row.get("route_id"),
        live: LiveFields {
            current_lat: row.get("current_lat"),
            current_lng: row.get("current_lng"),
            nearest_stop_index: row.get("nearest_stop_index"),
            eta_seconds: row.get("eta_seconds"),
            eta_smoothed_seconds: row.get("eta_smoothed_seconds"),
            eta_passed_counter: row.get("eta_passed_counter"),
            updated_at: row.get("updated_at"),
        },
    }
}

fn driver_from_row(row: &Row) -> Driver {
    Driver {
        id: row.get("id"),
        user_id: row.get("user_id"),
        phone: row.get("phone"),
        vehicle_number: row.get("vehicle_number"),
        verified: row.get("verified"),
        current_lat: row.get("current_lat"),
        current_lng: row.get("current_lng"),
    }
}

fn seat_from_row(row: &Row) -> Seat {
    Seat {
        id: row.get("id"),
        bus_id: row.get("bus_id"),
        seat_number: row.get("seat_number"),
        is_available: row.get("is_available"),
    }
}

pub async fn find_user(id: UserId, client: &Client) -> Result<Option<User>, Error> {
    let row = client
        .query_opt("SELECT id, username FROM users WHERE id = $1", &[&id])
        .await?;
    Ok(row.map(|r| User {
        id: r.get(0),
        username: r.get(1),
    }))
}

pub async fn find_bus(id: BusId, client: &Client) -> Result<Option<Bus>, Error> {
    let query = format!("SELECT {} FROM buses WHERE id = $1", BUS_COLUMNS);
    let row = client.query_opt(query.as_str(), &[&id]).await?;
    Ok(row.as_ref().map(bus_from_row))
}

pub async fn buses_on_route(route_id: RouteId, client: &Client) -> Result<Vec<Bus>, Error> {
    let query = format!("SELECT {} FROM buses WHERE route_id = $1 ORDER BY id", BUS_COLUMNS);
    let rows = client.query(query.as_str(), &[&route_id]).await?;
    Ok(rows.iter().map(bus_from_row).collect())
}

pub async fn buses_for_driver(driver_id: DriverId, client: &Client) -> Result<Vec<Bus>, Error> {
    let query = format!("SELECT {} FROM buses WHERE driver_id = $1 ORDER BY id", BUS_COLUMNS);
    let rows = client.query(query.as_str(), &[&driver_id]).await?;
    Ok(rows.iter().map(bus_from_row).collect())
}

pub async fn find_driver(id: DriverId, client: &Client) -> Result<Option<Driver>, Error> {
    let query = format!("SELECT {} FROM drivers WHERE id = $1", DRIVER_COLUMNS);
    let row = client.query_opt(query.as_str(), &[&id]).await?;
    Ok(row.as_ref().map(driver_from_row))
}

pub async fn find_driver_by_user(user_id: UserId, client: &Client) -> Result<Option<Driver>, Error> {
    let query = format!("SELECT {} FROM drivers WHERE user_id = $1", DRIVER_COLUMNS);
    let row = client.query_opt(query.as_str(), &[&user_id]).await?;
    Ok(row.as_ref().map(driver_from_row))
}

/// Writes live fields (and optionally a new route) and mirrors the position
/// onto the driver, in one transaction. Returns false if the bus is missing.
pub async fn save_live(
    bus_id: BusId,
    route_id: Option<RouteId>,
    live: &LiveFields,
    client: &Client,
) -> Result<bool, Error> {
    let query = "
        WITH updated AS (
            UPDATE buses SET
                route_id = COALESCE($2, route_id),
                current_lat = $3,
                current_lng = $4,
                nearest_stop_index = $5,
                eta_seconds = $6,
                eta_smoothed_seconds = $7,
                eta_passed_counter = $8,
                updated_at = $9
            WHERE id = $1
            RETURNING driver_id
        )
        UPDATE drivers d SET current_lat = $3, current_lng = $4
        FROM updated
        WHERE d.id = updated.driver_id
        RETURNING d.id;
    ";

    let rows = client
        .query(
            query,
            &[
                &bus_id,
                &route_id,
                &live.current_lat,
                &live.current_lng,
                &live.nearest_stop_index,
                &live.eta_seconds,
                &live.eta_smoothed_seconds,
                &live.eta_passed_counter,
                &live.updated_at,
            ],
        )
        .await?;

    if rows.is_empty() {
        // The bus may exist with a dangling driver; check directly.
        let exists = client
            .query_opt("SELECT 1 FROM buses WHERE id = $1", &[&bus_id])
            .await?;
        return Ok(exists.is_some());
    }
    Ok(true)
}

pub async fn find_seat(id: SeatId, client: &Client) -> Result<Option<Seat>, Error> {
    let row = client
        .query_opt(
            "SELECT id, bus_id, seat_number, is_available FROM seats WHERE id = $1",
            &[&id],
        )
        .await?;
    Ok(row.as_ref().map(seat_from_row))
}

pub async fn set_seat_available(id: SeatId, available: bool, client: &Client) -> Result<Option<Seat>, Error> {
    let row = client
        .query_opt(
            "UPDATE seats SET is_available = $2 WHERE id = $1
             RETURNING id, bus_id, seat_number, is_available",
            &[&id, &available],
        )
        .await?;
    Ok(row.as_ref().map(seat_from_row))
}

pub async fn available_seats(bus_id: BusId, client: &Client) -> Result<i64, Error> {
    let row = client
        .query_one(
            "SELECT COUNT(*) FROM seats WHERE bus_id = $1 AND is_available",
            &[&bus_id],
        )
        .await?;
    Ok(row.get(0))
}
