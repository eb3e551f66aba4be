use std::{str::FromStr, time::Duration};

use sea_orm::SqlxSqliteConnector;
use sea_orm_migration::MigratorTrait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use utils_core::assets::database_path;

pub mod entities;
pub mod models;
pub mod retry;
pub mod types;

pub use sea_orm::{
    ConnectionTrait, DatabaseConnection as DbPool, DatabaseTransaction, DbErr, TransactionTrait,
};

#[derive(Clone)]
pub struct DBService {
    pub pool: DbPool,
}

pub fn default_database_url() -> String {
    format!("sqlite://{}", database_path().to_string_lossy())
}

impl DBService {
    /// Opens the database named by `database_url`, or `db.sqlite` in the asset dir.
    pub async fn new(database_url: Option<&str>) -> Result<DBService, DbErr> {
        let database_url = match database_url {
            Some(url) => url.to_string(),
            None => default_database_url(),
        };
        Self::connect(&database_url).await
    }

    pub async fn connect(database_url: &str) -> Result<DBService, DbErr> {
        if !database_url.starts_with("sqlite:") {
            return Err(DbErr::Custom(format!(
                "Unsupported database url: {database_url}"
            )));
        }
        let in_memory = database_url.contains(":memory:");
        let mut options = SqliteConnectOptions::from_str(database_url)
            .map_err(|err| DbErr::Custom(format!("Invalid database url: {err}")))?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(30));
        if !in_memory {
            options = options
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal);
        }

        // Every connection to `:memory:` is a separate database.
        let pool_options = if in_memory {
            SqlitePoolOptions::new().max_connections(1)
        } else {
            SqlitePoolOptions::new()
        };
        let sqlx_pool = pool_options
            .connect_with(options)
            .await
            .map_err(|err| DbErr::Custom(format!("Failed to open database: {err}")))?;

        let pool = SqlxSqliteConnector::from_sqlx_sqlite_pool(sqlx_pool);
        db_migration::Migrator::up(&pool, None).await?;
        tracing::debug!(in_memory, "Database ready");
        Ok(DBService { pool })
    }
}

#[cfg(test)]
mod tests {
    use super::DBService;
    use crate::models::board::{Board, CreateBoard};

    #[tokio::test]
    async fn connect_runs_migrations() {
        let db = DBService::connect("sqlite::memory:").await.unwrap();
        let board = Board::create(
            &db.pool,
            &CreateBoard {
                name: "Roadmap".to_string(),
                description: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(Board::find_all(&db.pool).await.unwrap()[0].id, board.id);
    }

    #[tokio::test]
    async fn rejects_malformed_url() {
        assert!(DBService::connect("postgres://nope").await.is_err());
    }
}
