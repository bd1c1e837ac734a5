use crate::queries::_structs::{BusId, DriverId, NewPickup, PickupId, PickupRequest, PickupStatus, UserId};
use chrono::{DateTime, Utc};
use tokio_postgres::{Client, Error, Row};

const PICKUP_COLUMNS: &str = "id, user_id, bus_id, stop, stop_id, message, status, seen_by_driver, created_at";

fn pickup_from_row(row: &Row) -> PickupRequest {
    PickupRequest {
        id: row.get("id"),
        user_id: row.get("user_id"),
        bus_id: row.get("bus_id"),
        stop: row.get("stop"),
        stop_id: row.get("stop_id"),
        message: row.get("message"),
        status: row.get("status"),
        seen_by_driver: row.get("seen_by_driver"),
        created_at: row.get("created_at"),
    }
}

pub async fn insert_pickup(pickup: &NewPickup, client: &Client) -> Result<PickupRequest, Error> {
    let query = format!(
        "INSERT INTO pickup_requests (user_id, bus_id, stop, stop_id, message, created_at)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING {}",
        PICKUP_COLUMNS
    );
    let row = client
        .query_one(
            query.as_str(),
            &[
                &pickup.user_id,
                &pickup.bus_id,
                &pickup.stop,
                &pickup.stop_id,
                &pickup.message,
                &pickup.created_at,
            ],
        )
        .await?;
    Ok(pickup_from_row(&row))
}

pub async fn pending_since(
    user_id: UserId,
    bus_id: BusId,
    since: DateTime<Utc>,
    client: &Client,
) -> Result<Option<PickupRequest>, Error> {
    let query = format!(
        "SELECT {} FROM pickup_requests
         WHERE user_id = $1 AND bus_id = $2 AND status = 'pending' AND created_at >= $3
         ORDER BY created_at DESC
         LIMIT 1",
        PICKUP_COLUMNS
    );
    let row = client.query_opt(query.as_str(), &[&user_id, &bus_id, &since]).await?;
    Ok(row.as_ref().map(pickup_from_row))
}

pub async fn find_pickup(id: PickupId, client: &Client) -> Result<Option<PickupRequest>, Error> {
    let query = format!("SELECT {} FROM pickup_requests WHERE id = $1", PICKUP_COLUMNS);
    let row = client.query_opt(query.as_str(), &[&id]).await?;
    Ok(row.as_ref().map(pickup_from_row))
}

pub async fn set_status(id: PickupId, status: PickupStatus, client: &Client) -> Result<u64, Error> {
    client
        .execute("UPDATE pickup_requests SET status = $2 WHERE id = $1", &[&id, &status])
        .await
}

pub async fn mark_seen(id: PickupId, client: &Client) -> Result<u64, Error> {
    client
        .execute("UPDATE pickup_requests SET seen_by_driver = TRUE WHERE id = $1", &[&id])
        .await
}

pub async fn for_driver(driver_id: DriverId, limit: i64, client: &Client) -> Result<Vec<PickupRequest>, Error> {
    let query = format!(
        "SELECT {} FROM pickup_requests
         WHERE bus_id IN (SELECT id FROM buses WHERE driver_id = $1)
         ORDER BY created_at DESC, id DESC
         LIMIT $2",
        PICKUP_COLUMNS
    );
    let rows = client.query(query.as_str(), &[&driver_id, &limit]).await?;
    Ok(rows.iter().map(pickup_from_row).collect())
}

pub async fn count_unseen_for_driver(driver_id: DriverId, client: &Client) -> Result<i64, Error> {
    let row = client
        .query_one(
            "SELECT COUNT(*) FROM pickup_requests p
             JOIN buses b ON b.id = p.bus_id
             WHERE b.driver_id = $1 AND NOT p.seen_by_driver",
            &[&driver_id],
        )
        .await?;
    Ok(row.get(0))
}

pub async fn mark_all_seen_for_driver(driver_id: DriverId, client: &Client) -> Result<u64, Error> {
    client
        .execute(
            "UPDATE pickup_requests p SET seen_by_driver = TRUE
             FROM buses b
             WHERE p.bus_id = b.id AND b.driver_id = $1 AND NOT p.seen_by_driver",
            &[&driver_id],
        )
        .await
}
