//! Postgres bulk loader for normalized fixture rows.

use std::fmt;

use courtside_core::{FixtureEvent, LoadResult, FIXTURE_COLUMNS};
use sqlx::postgres::{PgConnectOptions, PgConnection, Postgres};
use sqlx::{Connection, QueryBuilder};
use thiserror::Error;
use tracing::{error, info, info_span, warn, Instrument};

pub const CRATE_NAME: &str = "courtside-store";

pub const DEFAULT_SCHEMA: &str = "sample";
pub const DEFAULT_TABLE: &str = "fixtures";

/// Rows per INSERT statement; every page runs in the same transaction.
pub const INSERT_PAGE_SIZE: usize = 1000;

const MAX_IDENTIFIER_LEN: usize = 63;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("DB_PORT must be a positive integer, got {0:?}")]
    InvalidPort(String),
    #[error("invalid SQL identifier {0:?}")]
    InvalidIdentifier(String),
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Raw connection settings, as supplied by the environment.
#[derive(Clone, Default)]
pub struct DbConfig {
    pub host: Option<String>,
    pub port: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("name", &self.name)
            .finish()
    }
}

impl DbConfig {
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("DB_HOST").ok(),
            port: std::env::var("DB_PORT").ok(),
            user: std::env::var("DB_USER").ok(),
            password: std::env::var("DB_PASSWORD").ok(),
            name: std::env::var("DB_NAME").ok(),
        }
    }

    /// Check that every setting is present and non-blank and that the port
    /// is a positive integer. Performs no I/O. Host and port are trimmed;
    /// user, password and database name are kept verbatim.
    pub fn validate(&self) -> Result<ValidatedDbConfig, ConfigError> {
        let host = required(&self.host, "DB_HOST")?.trim().to_string();
        let port_text = required(&self.port, "DB_PORT")?.trim().to_string();
        let user = required(&self.user, "DB_USER")?;
        let password = required(&self.password, "DB_PASSWORD")?;
        let name = required(&self.name, "DB_NAME")?;

        let port = match port_text.parse::<u16>() {
            Ok(port) if port > 0 => port,
            _ => return Err(ConfigError::InvalidPort(port_text)),
        };

        Ok(ValidatedDbConfig {
            host,
            port,
            user,
            password,
            name,
        })
    }
}

fn required(value: &Option<String>, var: &'static str) -> Result<String, ConfigError> {
    match value.as_deref() {
        Some(v) if !v.trim().is_empty() => Ok(v.to_string()),
        _ => Err(ConfigError::Missing(var)),
    }
}

#[derive(Clone)]
pub struct ValidatedDbConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    password: String,
    pub name: String,
}

impl fmt::Debug for ValidatedDbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatedDbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl ValidatedDbConfig {
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.name)
    }

    pub async fn connect(&self) -> Result<PgConnection, sqlx::Error> {
        PgConnection::connect_with(&self.connect_options()).await
    }
}

/// A validated `schema.table` destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedTable {
    schema: String,
    table: String,
}

impl QualifiedTable {
    pub fn new(schema: &str, table: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            schema: identifier(schema)?,
            table: identifier(table)?,
        })
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn quoted(&self) -> String {
        format!("\"{}\".\"{}\"", self.schema, self.table)
    }
}

impl Default for QualifiedTable {
    fn default() -> Self {
        Self {
            schema: DEFAULT_SCHEMA.to_string(),
            table: DEFAULT_TABLE.to_string(),
        }
    }
}

impl fmt::Display for QualifiedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

fn identifier(name: &str) -> Result<String, ConfigError> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid_start && valid_rest && name.len() <= MAX_IDENTIFIER_LEN {
        Ok(name.to_string())
    } else {
        Err(ConfigError::InvalidIdentifier(name.to_string()))
    }
}

/// `INSERT INTO ... (cols) VALUES (...), (...)` for one page of rows. The
/// column list is the fixture column order; absent values bind as NULL.
pub fn insert_builder(target: &QualifiedTable, rows: &[FixtureEvent]) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(format!(
        "INSERT INTO {} ({}) ",
        target.quoted(),
        FIXTURE_COLUMNS.join(", ")
    ));
    builder.push_values(rows, |mut b, row| {
        for value in row.values() {
            b.push_bind(value.map(str::to_string));
        }
    });
    builder
}

pub fn create_schema_sql(target: &QualifiedTable) -> String {
    format!("CREATE SCHEMA IF NOT EXISTS \"{}\"", target.schema())
}

pub fn create_table_sql(target: &QualifiedTable) -> String {
    let columns = FIXTURE_COLUMNS
        .iter()
        .map(|c| format!("    {c} TEXT NULL"))
        .collect::<Vec<_>>()
        .join(",\n");
    format!("CREATE TABLE IF NOT EXISTS {} (\n{columns}\n)", target.quoted())
}

/// Inserts fixture batches. Opens one connection per call and always closes it.
#[derive(Debug, Clone)]
pub struct BulkLoader {
    config: DbConfig,
}

impl BulkLoader {
    pub fn new(config: DbConfig) -> Self {
        Self { config }
    }

    pub fn from_env() -> Self {
        Self::new(DbConfig::from_env())
    }

    /// Insert `rows` into `schema.table`, reporting every outcome as a `LoadResult`.
    pub async fn load(&self, rows: &[FixtureEvent], schema: &str, table: &str) -> LoadResult {
        match self.try_load(rows, schema, table).await {
            Ok(result) => result,
            Err(err) => {
                error!(error = %err, "fixture load rejected by configuration");
                LoadResult::failed(format!("Configuration error: {err}"))
            }
        }
    }

    /// Like [`BulkLoader::load`], but configuration problems are returned as
    /// `Err` before any connection is attempted.
    pub async fn try_load(
        &self,
        rows: &[FixtureEvent],
        schema: &str,
        table: &str,
    ) -> Result<LoadResult, ConfigError> {
        let db = self.config.validate()?;
        let target = QualifiedTable::new(schema, table)?;

        if rows.is_empty() {
            info!(%target, "no fixture rows to insert");
            return Ok(LoadResult {
                success: true,
                message: format!("No rows to insert into {target}"),
                rows_inserted: 0,
            });
        }

        let span = info_span!("fixtures_load", %target, rows = rows.len());
        Ok(load_rows(&db, rows, &target).instrument(span).await)
    }

    /// Create the destination schema and table when missing.
    pub async fn ensure_table(&self, schema: &str, table: &str) -> Result<(), LoadError> {
        let db = self.config.validate()?;
        let target = QualifiedTable::new(schema, table)?;
        let mut conn = db.connect().await?;
        let created = create_in(&mut conn, &target).await;
        close(conn).await;
        created?;
        info!(%target, "fixture table ready");
        Ok(())
    }
}

async fn create_in(conn: &mut PgConnection, target: &QualifiedTable) -> Result<(), sqlx::Error> {
    sqlx::query(&create_schema_sql(target)).execute(&mut *conn).await?;
    sqlx::query(&create_table_sql(target)).execute(&mut *conn).await?;
    Ok(())
}

async fn load_rows(db: &ValidatedDbConfig, rows: &[FixtureEvent], target: &QualifiedTable) -> LoadResult {
    let mut conn = match db.connect().await {
        Ok(conn) => conn,
        Err(err) => {
            error!(error = %err, "database connection failed");
            return LoadResult::failed(format!("Failed to insert data: {err}"));
        }
    };

    let inserted = insert_rows(&mut conn, rows, target).await;
    close(conn).await;

    match inserted {
        Ok(count) => {
            info!(rows = count, "fixtures inserted");
            LoadResult::inserted(count, &target.to_string())
        }
        Err(err) => {
            error!(error = %err, "fixture insert rolled back");
            LoadResult::failed(format!("Failed to insert data: {err}"))
        }
    }
}

async fn insert_rows(
    conn: &mut PgConnection,
    rows: &[FixtureEvent],
    target: &QualifiedTable,
) -> Result<usize, sqlx::Error> {
    let mut tx = conn.begin().await?;
    for page in rows.chunks(INSERT_PAGE_SIZE) {
        let mut builder = insert_builder(target, page);
        let executed = builder.build().execute(&mut *tx).await;
        if let Err(err) = executed {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "rollback failed");
            }
            return Err(err);
        }
    }
    tx.commit().await?;
    Ok(rows.len())
}

async fn close(conn: PgConnection) {
    if let Err(err) = conn.close().await {
        warn!(error = %err, "closing database connection failed");
    }
}
