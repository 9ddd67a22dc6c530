use std::ops::Deref;
use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

#[derive(Clone, Debug)]
pub struct FeedDatabase(SqlitePool);

impl FeedDatabase {
    /// Open (creating if missing) the feed database and run migrations.
    pub async fn connect(path: &Path) -> Result<Self, FeedDatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(FeedDatabaseError::Io)?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(FeedDatabaseError::Unavailable)?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(FeedDatabaseError::MigrationFailed)?;
        Ok(FeedDatabase(pool))
    }
}

impl Deref for FeedDatabase {
    type Target = SqlitePool;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FeedDatabaseError {
    #[error("error occurred while attempting database migration: {0}")]
    MigrationFailed(sqlx::migrate::MigrateError),

    #[error("unable to perform initial connection and check of the database: {0}")]
    Unavailable(sqlx::Error),

    #[error(transparent)]
    Io(std::io::Error),
}
