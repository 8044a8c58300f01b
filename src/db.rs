use std::str::FromStr;

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use tracing::debug;

use crate::error::Result;

pub type DB = SqlitePool;

/// Opens (creating if needed) the database at `path` and brings the schema
/// up to date.
pub async fn open(path: &str) -> Result<DB> {
    let opts = SqliteConnectOptions::from_str(path)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(opts)
        .await?;

    migrate(&pool).await?;
    debug!(path, "database ready");
    Ok(pool)
}

pub async fn migrate(pool: &DB) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
