use crate::queries::_structs::{Message, NewMessage, UserId};
use tokio_postgres::{Client, Error, Row};

fn message_from_row(row: &Row) -> Message {
    Message {
        id: row.get("id"),
        sender_id: row.get("sender_id"),
        recipient_id: row.get("recipient_id"),
        bus_id: row.get("bus_id"),
        content: row.get("content"),
        created_at: row.get("created_at"),
        read: row.get("read"),
    }
}

pub async fn insert_message(message: &NewMessage, client: &Client) -> Result<Message, Error> {
    let row = client
        .query_one(
            "INSERT INTO messages (sender_id, recipient_id, bus_id, content, created_at)
             VALUES ($1, $2, (SELECT id FROM buses WHERE id = $3), $4, $5)
             RETURNING id, sender_id, recipient_id, bus_id, content, created_at, read",
            &[
                &message.sender_id,
                &message.recipient_id,
                &message.bus_id,
                &message.content,
                &message.created_at,
            ],
        )
        .await?;
    Ok(message_from_row(&row))
}

pub async fn last_sender_to(user_id: UserId, client: &Client) -> Result<Option<UserId>, Error> {
    let row = client
        .query_opt(
            "SELECT sender_id FROM messages
             WHERE recipient_id = $1 AND sender_id <> $1
             ORDER BY created_at DESC, id DESC
             LIMIT 1",
            &[&user_id],
        )
        .await?;
    Ok(row.map(|r| r.get(0)))
}

pub async fn conversation(a: UserId, b: UserId, limit: i64, client: &Client) -> Result<Vec<Message>, Error> {
    let rows = client
        .query(
            "SELECT * FROM (
                 SELECT id, sender_id, recipient_id, bus_id, content, created_at, read FROM messages
                 WHERE (sender_id = $1 AND recipient_id = $2) OR (sender_id = $2 AND recipient_id = $1)
                 ORDER BY created_at DESC, id DESC
                 LIMIT $3
             ) recent
             ORDER BY created_at, id",
            &[&a, &b, &limit],
        )
        .await?;
    Ok(rows.iter().map(message_from_row).collect())
}

pub async fn delete_conversation(a: UserId, b: UserId, client: &Client) -> Result<u64, Error> {
    client
        .execute(
            "DELETE FROM messages
             WHERE (sender_id = $1 AND recipient_id = $2) OR (sender_id = $2 AND recipient_id = $1)",
            &[&a, &b],
        )
        .await
}
