//! Postgres pool and migrations

pub mod queries;

use std::collections::HashMap;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::migrate::Migrator;
use sqlx::PgPool;
use tracing::{debug, info, warn};

const MAX_CONNECTIONS: u32 = 10;

pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect(database_url)
        .await
        .context("cannot connect to PostgreSQL")?;

    Ok(pool)
}

/// Apply the embedded migrations. Before running, the `_sqlx_migrations`
/// bookkeeping is reconciled with this binary so that squashed migrations and
/// CRLF checkouts do not block startup.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    let migrator = sqlx::migrate!("./migrations");
    info!(count = migrator.iter().count(), "Running database migrations");

    if migration_table_exists(pool).await? {
        reconcile_migration_table(pool, &migrator).await?;
    }
    migrator.run(pool).await.context("database migration failed")?;

    info!("Database migrations complete");
    Ok(())
}

async fn migration_table_exists(pool: &PgPool) -> Result<bool> {
    let exists = sqlx::query_scalar::<_, bool>("SELECT to_regclass('_sqlx_migrations') IS NOT NULL")
        .fetch_one(pool)
        .await?;
    Ok(exists)
}

/// Drop records of migrations this binary no longer carries and refresh
/// stored checksums of the ones it does.
async fn reconcile_migration_table(pool: &PgPool, migrator: &Migrator) -> Result<()> {
    let known: HashMap<i64, &[u8]> = migrator
        .iter()
        .filter(|m| !m.migration_type.is_down_migration())
        .map(|m| (m.version, m.checksum.as_ref()))
        .collect();

    let applied: Vec<(i64, Vec<u8>)> =
        sqlx::query_as("SELECT version, checksum FROM _sqlx_migrations ORDER BY version")
            .fetch_all(pool)
            .await?;

    for (version, stored) in applied {
        match known.get(&version) {
            None => {
                warn!(version, "Forgetting applied migration missing from this build");
                sqlx::query("DELETE FROM _sqlx_migrations WHERE version = $1")
                    .bind(version)
                    .execute(pool)
                    .await?;
            }
            Some(checksum) if stored.as_slice() != *checksum => {
                debug!(version, "Refreshing stored migration checksum");
                sqlx::query("UPDATE _sqlx_migrations SET checksum = $2 WHERE version = $1")
                    .bind(version)
                    .bind(*checksum)
                    .execute(pool)
                    .await?;
            }
            Some(_) => {}
        }
    }

    Ok(())
}
