use anyhow::{Context, Result};
use rusqlite::{
    params, params_from_iter,
    types::{ToSqlOutput, Value as SqlValue},
    Connection, ToSql,
};
use std::{fs, path::Path};
use tracing::debug;

/// DDL compiled in for runs that do not point at their own script.
pub const BUNDLED_SCHEMA: &str = include_str!("../../schema/offline_schema.sql");

/// One cell bound into an insert.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Real(f64),
}

impl From<Option<String>> for Value {
    fn from(v: Option<String>) -> Self {
        v.map_or(Value::Null, Value::Text)
    }
}

impl From<Option<f64>> for Value {
    fn from(v: Option<f64>) -> Self {
        v.map_or(Value::Null, Value::Real)
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Text(s) => ToSqlOutput::from(s.as_str()),
            Value::Real(v) => ToSqlOutput::from(*v),
        })
    }
}

/// Rows ready for a single bulk insert.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Open (creating if needed) the database at `path`, and its directory.
pub fn open_database(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating database directory {}", parent.display()))?;
    }
    Connection::open(path).with_context(|| format!("opening database {}", path.display()))
}

/// Run the DDL script at `schema`, or [`BUNDLED_SCHEMA`] when `None`.
pub fn apply_schema(conn: &Connection, schema: Option<&Path>) -> Result<()> {
    let ddl = match schema {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("reading schema script {}", path.display()))?,
        None => BUNDLED_SCHEMA.to_string(),
    };
    conn.execute_batch(&ddl).with_context(|| match schema {
        Some(path) => format!("applying schema script {}", path.display()),
        None => "applying bundled schema".to_string(),
    })?;
    debug!(bundled = schema.is_none(), "schema applied");
    Ok(())
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn insert_sql(table: &str, columns: &[String]) -> String {
    let cols: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    let marks = vec!["?"; columns.len()].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        cols.join(", "),
        marks
    )
}

/// Append every row of `data` to `table`. Returns the number inserted.
pub fn insert_rows(conn: &Connection, table: &str, data: &Table) -> Result<usize> {
    if data.rows.is_empty() {
        return Ok(0);
    }
    let sql = insert_sql(table, &data.columns);
    let mut stmt = conn
        .prepare(&sql)
        .with_context(|| format!("preparing insert into {}", table))?;

    let mut inserted = 0;
    for (i, row) in data.rows.iter().enumerate() {
        inserted += stmt
            .execute(params_from_iter(row.iter()))
            .with_context(|| format!("inserting row {} into {}", i, table))?;
    }
    Ok(inserted)
}

/// Stamp the single `AppMeta` row describing this bundle.
pub fn insert_app_meta(
    conn: &Connection,
    bundle_version: &str,
    schema_version: i64,
    row_count: i64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO AppMeta (bundleVersion, schemaVersion, rowCount) VALUES (?1, ?2, ?3)",
        params![bundle_version, schema_version, row_count],
    )
    .context("inserting AppMeta row")?;
    Ok(())
}
