//! SQLite connection setup for the local annotation store

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};

use crate::annotations::{ServiceError, SqliteAnnotationService};
use crate::config::DatabaseConfig;

/// Create a connection pool and make sure the schema exists
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, ServiceError> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    SqliteAnnotationService::new(pool.clone()).init().await?;
    tracing::info!("Annotation database ready at {}", database_url);

    Ok(pool)
}

/// Open the configured database as an annotation service
pub async fn open_annotation_service(config: &DatabaseConfig) -> Result<SqliteAnnotationService, ServiceError> {
    let pool = create_pool(&config.url).await?;
    Ok(SqliteAnnotationService::new(pool))
}
