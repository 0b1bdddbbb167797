//! Schema probes
//!
//! Read-only checks against the live catalogue. Migration units build their
//! applicability checks and in-upgrade guards from these.

use crate::backends::{DatabaseConnection, DatabaseValue, SqlDialect};
use crate::error::MigrateResult;

/// Whether a table exists in the current schema
pub async fn table_exists(conn: &mut dyn DatabaseConnection, table: &str) -> MigrateResult<bool> {
    let sql = match conn.dialect() {
        SqlDialect::PostgreSQL => {
            "SELECT COUNT(*) AS found FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name = $1"
        }
        SqlDialect::SQLite => "SELECT COUNT(*) AS found FROM sqlite_master WHERE type = 'table' AND name = $1",
    };
    count_positive(conn, sql, vec![DatabaseValue::from(table)]).await
}

/// Whether a column exists on a table in the current schema
pub async fn column_exists(conn: &mut dyn DatabaseConnection, table: &str, column: &str) -> MigrateResult<bool> {
    let sql = match conn.dialect() {
        SqlDialect::PostgreSQL => {
            "SELECT COUNT(*) AS found FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = $1 AND column_name = $2"
        }
        SqlDialect::SQLite => "SELECT COUNT(*) AS found FROM pragma_table_info($1) WHERE name = $2",
    };
    count_positive(conn, sql, vec![DatabaseValue::from(table), DatabaseValue::from(column)]).await
}

/// Whether an index exists in the current schema
pub async fn index_exists(conn: &mut dyn DatabaseConnection, index: &str) -> MigrateResult<bool> {
    let sql = match conn.dialect() {
        SqlDialect::PostgreSQL => {
            "SELECT COUNT(*) AS found FROM pg_indexes WHERE schemaname = current_schema() AND indexname = $1"
        }
        SqlDialect::SQLite => "SELECT COUNT(*) AS found FROM sqlite_master WHERE type = 'index' AND name = $1",
    };
    count_positive(conn, sql, vec![DatabaseValue::from(index)]).await
}

async fn count_positive(
    conn: &mut dyn DatabaseConnection,
    sql: &str,
    params: Vec<DatabaseValue>,
) -> MigrateResult<bool> {
    let row = conn.fetch_one(sql, &params).await?;
    Ok(row.get_i64("found")? > 0)
}
