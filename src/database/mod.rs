//! src/database/mod.rs
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use regex::Regex;
use secrecy::ExposeSecret;
use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool, Row};

use crate::configuration::DatabaseSettings;
use crate::environment;

mod session;
pub use session::Session;

#[derive(thiserror::Error, Debug)]
pub enum DatabaseError {
    #[error("Destructive database operations are not allowed in safe mode.")]
    SafeMode,
    #[error("The `{0}` command must be available in the system path.")]
    MissingTool(&'static str),
    #[error("`{0}` is not a valid regular expression.")]
    InvalidPattern(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

/// Manages a connection pool plus the administrative operations that go with
/// owning a database: listing tables, truncating data, schema reports, and
/// `pg_dump`/`psql` round trips.
pub struct Database {
    pool: PgPool,
    settings: DatabaseSettings,
    safe_mode: bool,
    const_tables: Vec<String>,
    const_table_patterns: Vec<Regex>,
}

impl Database {
    /// Build a pool from settings. Connections are established on first use,
    /// verified before each checkout, and dropped after five idle minutes.
    pub fn connect(settings: &DatabaseSettings) -> Result<Self, DatabaseError> {
        let mut settings = settings.clone();
        settings.host = resolve_host(&settings.host, *environment::IN_DOCKER);

        let pool = PgPoolOptions::new()
            .test_before_acquire(true)
            .idle_timeout(Duration::from_secs(5 * 60))
            .connect_lazy(settings.connection_string().expose_secret())?;

        Ok(Self {
            pool,
            settings,
            safe_mode: false,
            const_tables: Vec::new(),
            const_table_patterns: Vec::new(),
        })
    }

    /// In safe mode, operations that destroy data are refused.
    pub fn with_safe_mode(mut self, enabled: bool) -> Self {
        self.safe_mode = enabled;
        self
    }

    /// Mark tables as constant by name. `clear` will not touch them.
    pub fn with_const_tables<I>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        self.const_tables.extend(names);
        self
    }

    /// Mark tables as constant by regular expressions matched against the
    /// table name.
    pub fn with_const_table_patterns<I, S>(mut self, patterns: I) -> Result<Self, DatabaseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for pattern in patterns {
            let pattern = pattern.as_ref();
            let compiled =
                Regex::new(pattern).map_err(|_| DatabaseError::InvalidPattern(pattern.into()))?;
            self.const_table_patterns.push(compiled);
        }
        Ok(self)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn settings(&self) -> &DatabaseSettings {
        &self.settings
    }

    /// A typed session over this database's pool.
    pub fn session(&self) -> Session {
        Session::new(self.pool.clone())
    }

    /// Whether the database can be reached right now.
    #[tracing::instrument(name = "Ping database", skip(self))]
    pub async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    /// Sorted base-table names in the `public` schema. `const_filter` keeps
    /// only constant (`Some(true)`) or non-constant (`Some(false)`) tables;
    /// `empty_filter` does the same for empty tables.
    #[tracing::instrument(name = "List database tables", skip(self))]
    pub async fn tables(
        &self,
        const_filter: Option<bool>,
        empty_filter: Option<bool>,
    ) -> Result<Vec<String>, DatabaseError> {
        let rows = sqlx::query(
            "SELECT table_name::text AS table_name \
             FROM information_schema.tables \
             WHERE table_schema = 'public' AND table_type = 'BASE TABLE' \
             ORDER BY table_name",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut tables: Vec<String> = rows
            .into_iter()
            .map(|row| row.get::<String, _>("table_name"))
            .collect();

        if let Some(want_const) = const_filter {
            tables.retain(|table| self.is_const_table(table) == want_const);
        }

        if let Some(want_empty) = empty_filter {
            let mut filtered = Vec::with_capacity(tables.len());
            for table in tables {
                if self.is_empty_table(&table).await? == want_empty {
                    filtered.push(table);
                }
            }
            tables = filtered;
        }

        Ok(tables)
    }

    /// Number of rows in a table.
    pub async fn row_count(&self, table: &str) -> Result<i64, DatabaseError> {
        let sql = format!("SELECT COUNT(*) AS count FROM {}", quote_identifier(table));
        let row = sqlx::query(&sql).fetch_one(&self.pool).await?;
        Ok(row.get::<i64, _>("count"))
    }

    /// Truncate tables and re-align their sequences. Constant tables are
    /// skipped unless `include_const` is set. Refused in safe mode. Returns
    /// the names of the truncated tables.
    #[tracing::instrument(name = "Clear database tables", skip(self))]
    pub async fn clear(&self, include_const: bool) -> Result<Vec<String>, DatabaseError> {
        if self.safe_mode {
            return Err(DatabaseError::SafeMode);
        }

        let const_filter = if include_const { None } else { Some(false) };
        let tables = self.tables(const_filter, None).await?;

        let mut transaction = self.pool.begin().await?;
        for table in &tables {
            let sql = format!("TRUNCATE TABLE {} CASCADE", quote_identifier(table));
            (&mut *transaction).execute(sql.as_str()).await?;
        }
        (&mut *transaction).execute(SQL_FIX_SEQUENCES).await?;
        transaction.commit().await?;

        Ok(tables)
    }

    /// Snapshot the `public` schema: columns, views, key usage, indexes, and
    /// check constraints, plus a digest that changes when any of them do.
    #[tracing::instrument(name = "Report database schema", skip(self))]
    pub async fn schema(&self) -> Result<SchemaReport, DatabaseError> {
        let mut schema = serde_json::Map::new();

        for (name, select) in SCHEMA_SELECTS {
            // Column positions churn on unrelated DDL, so they are excluded
            // from the report and the digest.
            let sql = format!(
                "SELECT to_jsonb(t) - 'ordinal_position' - 'position_in_unique_constraint' \
                 FROM ({}) AS t",
                select
            );
            let rows: Vec<Value> = sqlx::query_scalar(&sql).fetch_all(&self.pool).await?;
            schema.insert((*name).to_string(), Value::Array(rows));
        }

        let schema = Value::Object(schema);
        let canonical =
            serde_json::to_vec(&schema).context("Failed to serialize the schema report")?;
        let digest = hex::encode(Sha256::digest(&canonical));

        Ok(SchemaReport { schema, digest })
    }

    /// Export table data with `pg_dump`. When the destination has a file
    /// extension it is used as-is; otherwise it is treated as a directory
    /// receiving a timestamped `.sql` file. Returns the written path.
    #[tracing::instrument(name = "Dump database", skip(self))]
    pub async fn dump(
        &self,
        destination: &Path,
        const_filter: Option<bool>,
    ) -> Result<PathBuf, DatabaseError> {
        if !tool_available("pg_dump") {
            return Err(DatabaseError::MissingTool("pg_dump"));
        }

        let tables = match const_filter {
            None => Vec::new(),
            Some(want_const) => self.tables(Some(want_const), None).await?,
        };

        let dump_file = resolve_dump_file(destination, Utc::now());
        if let Some(parent) = dump_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut command = tokio::process::Command::new("pg_dump");
        command
            .arg(&self.settings.database_name)
            .arg("--schema=public")
            .args(["--host", &self.settings.host])
            .args(["--port", &self.settings.port.to_string()])
            .args(["--username", &self.settings.username])
            .arg("--file")
            .arg(&dump_file)
            .arg("--data-only")
            .arg("--disable-triggers")
            .env("PGPASSWORD", self.settings.password.expose_secret());

        for table in &tables {
            command.arg(format!("--table={}", table));
        }

        run_tool(command, "pg_dump").await?;

        Ok(dump_file)
    }

    /// Import a dump produced by [`Database::dump`] with `psql`, inside a
    /// single transaction that stops at the first error.
    #[tracing::instrument(name = "Load database dump", skip(self))]
    pub async fn load(&self, dump_file: &Path) -> Result<(), DatabaseError> {
        if !tool_available("psql") {
            return Err(DatabaseError::MissingTool("psql"));
        }

        let mut command = tokio::process::Command::new("psql");
        command
            .arg(&self.settings.database_name)
            .args(["--host", &self.settings.host])
            .args(["--port", &self.settings.port.to_string()])
            .args(["--username", &self.settings.username])
            .arg("--single-transaction")
            .args(["--variable", "ON_ERROR_STOP=1"])
            .arg("--file")
            .arg(dump_file)
            .env("PGPASSWORD", self.settings.password.expose_secret());

        run_tool(command, "psql").await
    }

    /// Discard all pooled connections.
    pub async fn dispose(&self) {
        self.pool.close().await;
    }

    fn is_const_table(&self, table: &str) -> bool {
        self.const_tables.iter().any(|name| name == table)
            || self
                .const_table_patterns
                .iter()
                .any(|pattern| pattern.is_match(table))
    }

    async fn is_empty_table(&self, table: &str) -> Result<bool, sqlx::Error> {
        let sql = format!("SELECT TRUE FROM {} LIMIT 1", quote_identifier(table));
        let first = sqlx::query(&sql).fetch_optional(&self.pool).await?;
        Ok(first.is_none())
    }
}

/// Schema snapshot plus a hex SHA-256 digest of its canonical JSON form.
#[derive(Debug, serde::Serialize)]
pub struct SchemaReport {
    pub schema: Value,
    pub digest: String,
}

const SCHEMA_SELECTS: &[(&str, &str)] = &[
    (
        "columns",
        "SELECT * FROM information_schema.columns WHERE table_schema = 'public'",
    ),
    (
        "views",
        "SELECT * FROM information_schema.views WHERE table_schema = 'public'",
    ),
    (
        "keys",
        "SELECT * FROM information_schema.key_column_usage WHERE table_schema = 'public'",
    ),
    (
        "indexes",
        "SELECT * FROM pg_catalog.pg_indexes WHERE schemaname = 'public'",
    ),
    (
        "constraints",
        "SELECT * FROM information_schema.check_constraints WHERE constraint_schema = 'public'",
    ),
];

/// A host of the form `external:docker` names two endpoints for the same
/// server; pick the right one for where this process runs.
fn resolve_host(host: &str, in_docker: bool) -> String {
    match host.split_once(':') {
        Some((external, docker)) => {
            if in_docker { docker } else { external }.to_string()
        }
        None => host.to_string(),
    }
}

fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn resolve_dump_file(destination: &Path, now: DateTime<Utc>) -> PathBuf {
    let has_extension = destination
        .file_name()
        .map(|name| name.to_string_lossy().contains('.'))
        .unwrap_or(false);

    if has_extension {
        destination.to_path_buf()
    } else {
        destination.join(format!("{}.sql", now.format("%Y-%m-%dT%H-%M-%SZ")))
    }
}

fn tool_available(name: &str) -> bool {
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&paths).any(|dir| dir.join(name).is_file())
}

async fn run_tool(
    mut command: tokio::process::Command,
    name: &'static str,
) -> Result<(), DatabaseError> {
    let output = command.output().await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DatabaseError::Unexpected(anyhow::anyhow!(
            "{} failed with {}: {}",
            name,
            output.status,
            stderr.trim()
        )));
    }
    Ok(())
}

// Taken from https://wiki.postgresql.org/wiki/Fixing_Sequences.
const SQL_FIX_SEQUENCES: &str = r#"
    DO $$
    DECLARE
    command TEXT;
    BEGIN
        FOR command IN (
            SELECT 'SELECT setval('
                        || quote_literal(quote_ident(tables.schemaname)
                        || '.'
                        || quote_ident(sequences.relname))
                        || ', coalesce(max(' || quote_ident(columns.attname) || '), 1))'
                    || ' FROM '
                    || quote_ident(tables.schemaname)
                    || '.'
                    || quote_ident(class.relname)
                    || ';'
            FROM pg_class AS sequences,
                pg_depend AS depends,
                pg_class AS class,
                pg_attribute AS columns,
                pg_tables AS tables
            WHERE sequences.relkind = 'S'
            AND sequences.oid = depends.objid
            AND depends.refobjid = class.oid
            AND depends.refobjid = columns.attrelid
            AND depends.refobjsubid = columns.attnum
            AND class.relname = tables.tablename
            ORDER BY class.relname
        )
        LOOP
            EXECUTE command;
        END LOOP;
    END $$;
    "#;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use claims::assert_ok;
    use secrecy::Secret;

    fn settings() -> DatabaseSettings {
        DatabaseSettings {
            username: "app".into(),
            password: Secret::new("hunter2".into()),
            port: 5432,
            host: "127.0.0.1".into(),
            database_name: "inventory".into(),
        }
    }

    #[test]
    fn a_plain_host_is_used_as_is() {
        assert_eq!(resolve_host("127.0.0.1", false), "127.0.0.1");
        assert_eq!(resolve_host("127.0.0.1", true), "127.0.0.1");
    }

    #[test]
    fn a_split_host_picks_a_side_per_runtime() {
        assert_eq!(resolve_host("127.0.0.1:db", false), "127.0.0.1");
        assert_eq!(resolve_host("127.0.0.1:db", true), "db");
    }

    #[test]
    fn identifiers_are_quoted_and_escaped() {
        assert_eq!(quote_identifier("users"), r#""users""#);
        assert_eq!(quote_identifier(r#"we"ird"#), r#""we""ird""#);
    }

    #[tokio::test]
    async fn const_tables_match_by_name_and_pattern() {
        let database = assert_ok!(Database::connect(&settings()))
            .with_const_tables(["roles".to_string()])
            .with_const_table_patterns(["^ref_"]);
        let database = assert_ok!(database);

        assert!(database.is_const_table("roles"));
        assert!(database.is_const_table("ref_countries"));
        assert!(!database.is_const_table("users"));
    }

    #[tokio::test]
    async fn a_bad_const_pattern_is_reported() {
        let database = assert_ok!(Database::connect(&settings()));
        let result = database.with_const_table_patterns(["("]);
        assert!(matches!(result, Err(DatabaseError::InvalidPattern(_))));
    }

    #[test]
    fn a_destination_with_an_extension_is_used_directly() {
        let now = Utc.with_ymd_and_hms(2023, 11, 5, 12, 30, 0).unwrap();
        let file = resolve_dump_file(Path::new("/tmp/backup.sql"), now);
        assert_eq!(file, PathBuf::from("/tmp/backup.sql"));
    }

    #[test]
    fn a_directory_destination_gets_a_timestamped_file() {
        let now = Utc.with_ymd_and_hms(2023, 11, 5, 12, 30, 0).unwrap();
        let file = resolve_dump_file(Path::new("/tmp/backups"), now);
        assert_eq!(file, PathBuf::from("/tmp/backups/2023-11-05T12-30-00Z.sql"));
    }

    #[tokio::test]
    async fn safe_mode_refuses_to_clear() {
        let database = assert_ok!(Database::connect(&settings())).with_safe_mode(true);
        let result = database.clear(false).await;
        assert!(matches!(result, Err(DatabaseError::SafeMode)));
    }
}
