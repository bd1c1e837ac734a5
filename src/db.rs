use tokio_postgres::{Client, Error, NoTls};
use tracing::{error, info};

const SCHEMA: &str = include_str!("../sql/schema.sql");

/// Opens a PostgreSQL connection and drives it on a background task.
pub async fn connect_to_db(db_url: &str) -> Result<Client, Error> {
    let (client, connection) = tokio_postgres::connect(db_url, NoTls).await?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            error!("Database connection error: {}", e);
        }
    });

    Ok(client)
}

/// Creates missing tables. Safe to run on every start.
pub async fn ensure_schema(client: &Client) -> Result<(), Error> {
    client.batch_execute(SCHEMA).await?;
    info!("Database schema verified");
    Ok(())
}
