use std::path::Path;

use chrono::NaiveDateTime;
use rusqlite::{Connection, Row};
use tracing::{debug, info};

use crate::db::{get_connection, init_db};
use crate::error::{MidasError, Result};
use crate::models::{hash_id, AccountKind, OrderBy, Side, TransactionRecord, DATE_FORMAT};
use crate::query::Query;

pub struct IngestResult {
    pub inserted: usize,
    pub skipped: usize,
}

/// Append-only, deduplicated ledger of one account, backed by a SQLite file.
pub struct TransactionStore {
    conn: Connection,
    kind: AccountKind,
}

impl TransactionStore {
    pub fn open(db_path: &Path, kind: AccountKind) -> Result<Self> {
        let conn = get_connection(db_path)?;
        init_db(&conn, kind)?;
        Ok(Self { conn, kind })
    }

    pub fn kind(&self) -> AccountKind {
        self.kind
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Column list in the order `map_record` expects.
    pub(crate) fn select_columns(&self) -> String {
        format!(
            "id, description, date, {}, {}, balance",
            self.kind.column(Side::Primary),
            self.kind.column(Side::Secondary)
        )
    }

    /// SQL for the signed delta of a row.
    pub(crate) fn delta_expr(&self) -> String {
        format!(
            "(COALESCE({}, 0) - COALESCE({}, 0))",
            self.kind.column(Side::Primary),
            self.kind.column(Side::Secondary)
        )
    }

    pub(crate) fn order_expr(&self, order: OrderBy) -> String {
        match order {
            OrderBy::Date => "date".to_string(),
            OrderBy::Amount => self.delta_expr(),
            OrderBy::Description => "description".to_string(),
        }
    }

    /// Inserts the record unless one with the same content hash exists.
    /// Returns whether a row was written.
    pub fn insert(&self, record: &TransactionRecord) -> Result<bool> {
        let id = hash_id(
            &record.description,
            &record.date,
            record.primary,
            record.secondary,
            record.balance,
        );
        let sql = format!(
            "INSERT OR IGNORE INTO {} ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            self.kind.table(),
            self.select_columns()
        );
        let changed = self.conn.execute(
            &sql,
            rusqlite::params![
                id,
                record.description,
                record.date.format(DATE_FORMAT).to_string(),
                record.primary,
                record.secondary,
                record.balance,
            ],
        )?;
        if changed == 0 {
            debug!(id = %id, "skipping duplicate transaction");
        }
        Ok(changed == 1)
    }

    /// Inserts a statement's worth of records. Statements are either fully
    /// ascending or fully descending by date, so when chronological order is
    /// required anything not ascending is reversed rather than sorted.
    /// Otherwise records go in as given.
    pub fn ingest_batch(
        &self,
        mut records: Vec<TransactionRecord>,
        chronological_order_required: bool,
    ) -> Result<IngestResult> {
        let ascending = records.windows(2).all(|w| w[0].date <= w[1].date);
        if chronological_order_required && !ascending {
            debug!("batch is not in chronological order, reversing");
            records.reverse();
        }

        let mut inserted = 0usize;
        let mut skipped = 0usize;
        for record in &records {
            if self.insert(record)? {
                inserted += 1;
            } else {
                skipped += 1;
            }
        }
        info!(inserted, skipped, "ingested batch");
        Ok(IngestResult { inserted, skipped })
    }

    pub fn all(&self, order: OrderBy, ascending: bool) -> Result<Vec<TransactionRecord>> {
        let dir = if ascending { "ASC" } else { "DESC" };
        let sql = format!(
            "SELECT {} FROM {} ORDER BY {} {dir}, rowid {dir}",
            self.select_columns(),
            self.kind.table(),
            self.order_expr(order)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], map_record)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    #[cfg(test)]
    pub fn get(&self, id: &str) -> Result<Option<TransactionRecord>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = ?1",
            self.select_columns(),
            self.kind.table()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query_map([id], map_record)?;
        Ok(rows.next().transpose()?)
    }

    pub fn len(&self) -> Result<usize> {
        let sql = format!("SELECT count(*) FROM {}", self.kind.table());
        let n: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(n as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Earliest record in ledger order (date, then insertion order).
    pub fn first(&self) -> Result<Option<TransactionRecord>> {
        self.edge("ASC")
    }

    /// Latest record in ledger order.
    pub fn last(&self) -> Result<Option<TransactionRecord>> {
        self.edge("DESC")
    }

    fn edge(&self, dir: &str) -> Result<Option<TransactionRecord>> {
        let sql = format!(
            "SELECT {} FROM {} ORDER BY date {dir}, rowid {dir} LIMIT 1",
            self.select_columns(),
            self.kind.table()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query_map([], map_record)?;
        Ok(rows.next().transpose()?)
    }

    /// Current balance: the running balance stored on the latest record.
    pub fn balance(&self) -> Result<f64> {
        self.last()?
            .map(|r| r.balance)
            .ok_or(MidasError::EmptyResult)
    }

    /// Permanently removes the given records. Returns how many were deleted.
    pub fn delete(&self, ids: &[String]) -> Result<usize> {
        let sql = format!("DELETE FROM {} WHERE id = ?1", self.kind.table());
        let mut stmt = self.conn.prepare(&sql)?;
        let mut deleted = 0usize;
        for id in ids {
            deleted += stmt.execute([id])?;
        }
        info!(deleted, "deleted transactions");
        Ok(deleted)
    }

    pub fn query(&self) -> Query<'_> {
        Query::new(self)
    }

    pub fn is_file_imported(&self, checksum: &str) -> Result<bool> {
        let mut stmt = self.conn.prepare("SELECT 1 FROM imports WHERE checksum = ?1")?;
        Ok(stmt.exists([checksum])?)
    }

    pub fn record_import(
        &self,
        filename: &str,
        records: &[TransactionRecord],
        checksum: &str,
    ) -> Result<()> {
        let min_date = records.iter().map(|r| r.date).min();
        let max_date = records.iter().map(|r| r.date).max();
        self.conn.execute(
            "INSERT INTO imports (filename, record_count, date_range_start, date_range_end, checksum) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                filename,
                records.len() as i64,
                min_date.map(|d| d.format(DATE_FORMAT).to_string()),
                max_date.map(|d| d.format(DATE_FORMAT).to_string()),
                checksum,
            ],
        )?;
        Ok(())
    }
}

pub(crate) fn map_record(row: &Row<'_>) -> rusqlite::Result<TransactionRecord> {
    let raw_date: String = row.get(2)?;
    let date = NaiveDateTime::parse_from_str(&raw_date, DATE_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(TransactionRecord {
        id: row.get(0)?,
        description: row.get(1)?,
        date,
        primary: row.get(3)?,
        secondary: row.get(4)?,
        balance: row.get(5)?,
    })
}
