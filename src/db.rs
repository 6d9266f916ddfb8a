use std::path::Path;

use rusqlite::Connection;

use crate::error::Result;
use crate::models::{AccountKind, Side};

const IMPORTS_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS imports (
    id INTEGER PRIMARY KEY,
    filename TEXT NOT NULL,
    import_date TEXT DEFAULT (datetime('now')),
    record_count INTEGER,
    date_range_start TEXT,
    date_range_end TEXT,
    checksum TEXT
);
";

/// Transaction table for one account kind. The two kinds only differ in the
/// names of their amount columns.
pub fn transactions_schema(kind: AccountKind) -> String {
    let table = kind.table();
    let primary = kind.column(Side::Primary);
    let secondary = kind.column(Side::Secondary);
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
    id TEXT PRIMARY KEY NOT NULL,
    description TEXT NOT NULL,
    date TEXT NOT NULL,
    {primary} REAL,
    {secondary} REAL,
    balance REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_{table}_date ON {table} (date);
"
    )
}

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection, kind: AccountKind) -> Result<()> {
    conn.execute_batch(&transactions_schema(kind))?;
    conn.execute_batch(IMPORTS_SCHEMA)?;
    Ok(())
}
