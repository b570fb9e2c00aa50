//! # Database Migration System
//!
//! Incremental schema migrations with version tracking.
//!
//! Migrations are discovered from a directory using a timestamp-based naming
//! convention, `YYYYMMDDHHMMSS_description.sql`, and applied in version order.
//! Applied versions are recorded in `loyalty_schema_migrations`.
//!
//! ## Concurrency Control
//!
//! Several worker processes may start against the same database at once. The
//! whole run holds a session-level advisory lock on one dedicated connection:
//!
//! ```sql
//! SELECT pg_advisory_lock(7305118204551)
//! ```
//!
//! so exactly one process applies outstanding migrations while the others
//! wait and then find nothing left to do.

use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::constants::database::{MIGRATIONS_TABLE, MIGRATION_LOCK_KEY};

/// Represents a single database migration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    /// Version timestamp (YYYYMMDDHHMMSS format)
    pub version: String,
    /// Human-readable migration name
    pub name: String,
    /// Full path to the SQL file
    pub path: PathBuf,
}

/// Manages database schema migrations with concurrency safety.
pub struct DatabaseMigrations;

impl DatabaseMigrations {
    /// Apply every outstanding migration found in `migrations_dir`
    ///
    /// Returns the versions applied by this call.
    pub async fn run_all(pool: &PgPool, migrations_dir: &Path) -> Result<Vec<String>, sqlx::Error> {
        let migrations = Self::discover_migrations(migrations_dir)?;
        let mut conn = pool.acquire().await?;

        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(&mut *conn)
            .await?;

        let result = Self::run_outstanding_migrations(&mut conn, &migrations).await;

        // Always release the lock
        sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(&mut *conn)
            .await?;

        result
    }

    async fn run_outstanding_migrations(
        conn: &mut PoolConnection<Postgres>,
        migrations: &BTreeMap<String, Migration>,
    ) -> Result<Vec<String>, sqlx::Error> {
        Self::ensure_migration_table(conn).await?;
        let applied_migrations = Self::get_applied_migrations(conn).await?;

        let mut applied = Vec::new();
        for migration in migrations.values() {
            if applied_migrations.contains(&migration.version) {
                continue;
            }

            info!(
                version = %migration.version,
                name = %migration.name,
                "Applying migration"
            );
            let sql = fs::read_to_string(&migration.path).map_err(sqlx::Error::Io)?;
            sqlx::raw_sql(&sql).execute(&mut **conn).await?;
            Self::record_migration(conn, &migration.version).await?;
            applied.push(migration.version.clone());
        }

        if applied.is_empty() {
            debug!("Database schema is up to date");
        }
        Ok(applied)
    }

    /// Discover all migration files in `migrations_dir`, keyed by version
    pub fn discover_migrations(
        migrations_dir: &Path,
    ) -> Result<BTreeMap<String, Migration>, sqlx::Error> {
        if !migrations_dir.exists() {
            return Ok(BTreeMap::new());
        }

        let mut migrations = BTreeMap::new();

        for entry in fs::read_dir(migrations_dir).map_err(sqlx::Error::Io)? {
            let entry = entry.map_err(sqlx::Error::Io)?;
            let path = entry.path();

            if path.is_file() && path.extension().map(|s| s == "sql").unwrap_or(false) {
                if let Some(filename) = path.file_stem().and_then(|s| s.to_str()) {
                    if let Some((version, name)) = Self::parse_migration_filename(filename) {
                        migrations.insert(
                            version.clone(),
                            Migration {
                                version,
                                name,
                                path,
                            },
                        );
                    }
                }
            }
        }

        Ok(migrations)
    }

    /// Parse migration filename to extract version and name
    fn parse_migration_filename(filename: &str) -> Option<(String, String)> {
        // Expected format: YYYYMMDDHHMMSS_migration_name
        if filename.len() < 15 || !filename.is_char_boundary(14) {
            return None;
        }

        let (version_part, name_part) = filename.split_at(14);

        if !version_part.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }

        let name = name_part
            .strip_prefix('_')
            .unwrap_or(name_part)
            .replace('_', " ");

        Some((version_part.to_string(), name))
    }

    async fn ensure_migration_table(conn: &mut PoolConnection<Postgres>) -> Result<(), sqlx::Error> {
        sqlx::raw_sql(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {MIGRATIONS_TABLE} (
                version VARCHAR(14) PRIMARY KEY,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#
        ))
        .execute(&mut **conn)
        .await?;

        Ok(())
    }

    async fn get_applied_migrations(
        conn: &mut PoolConnection<Postgres>,
    ) -> Result<HashSet<String>, sqlx::Error> {
        let versions =
            sqlx::query_scalar::<_, String>(&format!("SELECT version FROM {MIGRATIONS_TABLE}"))
                .fetch_all(&mut **conn)
                .await?;

        Ok(versions.into_iter().collect())
    }

    async fn record_migration(
        conn: &mut PoolConnection<Postgres>,
        version: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(&format!(
            "INSERT INTO {MIGRATIONS_TABLE} (version) VALUES ($1)"
        ))
        .bind(version)
        .execute(&mut **conn)
        .await?;

        Ok(())
    }
}
