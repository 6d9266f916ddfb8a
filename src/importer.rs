use std::collections::HashMap;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{MidasError, Result};
use crate::models::{AccountKind, ParsedRow};
use crate::reconciler::infer_missing_balances;
use crate::store::TransactionStore;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Blank cells are `Ok(None)`. Accepts `$`, thousands separators, quotes and
/// parenthesised negatives.
pub fn parse_amount(raw: &str) -> std::result::Result<Option<f64>, std::num::ParseFloatError> {
    let s = raw.replace([',', '"', '$'], "");
    let s = s.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    if let Some(inner) = s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        return inner.trim().parse::<f64>().map(|v| Some(-v));
    }
    s.parse().map(Some)
}

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%m/%d/%Y %H:%M:%S"];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

pub fn parse_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(raw, f).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn latin1_to_string(data: &[u8]) -> String {
    data.iter().map(|&b| b as char).collect()
}

fn parse_error(row: usize, message: impl Into<String>) -> MidasError {
    MidasError::Parse {
        row,
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// Statement layouts
// ---------------------------------------------------------------------------

/// Plain export: `date, description, amount-1, amount-2, balance`, no header.
const STANDARD_COLUMNS: [usize; 5] = [0, 1, 2, 3, 4];
/// Wide export: account id, date, description, amount-1, amount-2, balance.
const WIDE_ACCOUNT_COLUMN: usize = 2;
const WIDE_COLUMNS: [usize; 5] = [3, 5, 7, 8, 13];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatementLayout {
    Standard,
    Wide,
}

fn row_from_record(
    kind: AccountKind,
    record: &csv::StringRecord,
    columns: [usize; 5],
    row: usize,
) -> Result<ParsedRow> {
    let need = columns.iter().max().copied().unwrap_or(0) + 1;
    if record.len() < need {
        return Err(parse_error(
            row,
            format!("expected at least {need} columns, found {}", record.len()),
        ));
    }
    let [c_date, c_desc, c_first, c_second, c_balance] = columns;
    let date = parse_date(&record[c_date])
        .ok_or_else(|| parse_error(row, format!("invalid date '{}'", record[c_date].trim())))?;
    let amount = |col: usize| {
        parse_amount(&record[col])
            .map_err(|_| parse_error(row, format!("invalid amount '{}'", record[col].trim())))
    };
    let (primary, secondary) = kind.amounts_from_columns(amount(c_first)?, amount(c_second)?);
    Ok(ParsedRow {
        date,
        description: record[c_desc].trim().to_string(),
        primary,
        secondary,
        balance: amount(c_balance)?,
    })
}

fn csv_records(content: &str) -> Result<Vec<csv::StringRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());
    Ok(rdr.records().collect::<std::result::Result<Vec<_>, _>>()?)
}

/// Parses statement contents into rows in file order. Non-UTF-8 input is
/// treated as a Latin-1 wide export, keeping only the most frequent account.
pub fn parse_statement(kind: AccountKind, data: &[u8]) -> Result<(StatementLayout, Vec<ParsedRow>)> {
    match std::str::from_utf8(data) {
        Ok(content) => {
            let rows = csv_records(content)?
                .iter()
                .enumerate()
                .map(|(i, rec)| row_from_record(kind, rec, STANDARD_COLUMNS, i + 1))
                .collect::<Result<Vec<_>>>()?;
            Ok((StatementLayout::Standard, rows))
        }
        Err(_) => {
            debug!("statement is not valid UTF-8, reading as Latin-1 wide export");
            let records = csv_records(&latin1_to_string(data))?;
            let account = most_common_account(&records);
            let mut rows = Vec::new();
            for (i, rec) in records.iter().enumerate() {
                if rec.get(WIDE_ACCOUNT_COLUMN).map(str::trim) != account.as_deref() {
                    continue;
                }
                rows.push(row_from_record(kind, rec, WIDE_COLUMNS, i + 1)?);
            }
            Ok((StatementLayout::Wide, rows))
        }
    }
}

/// Most frequent value of the account column; ties go to the first seen.
fn most_common_account(records: &[csv::StringRecord]) -> Option<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();
    for rec in records {
        let Some(acct) = rec.get(WIDE_ACCOUNT_COLUMN).map(str::trim) else {
            continue;
        };
        let n = counts.entry(acct).or_insert(0);
        if *n == 0 {
            order.push(acct);
        }
        *n += 1;
    }
    let mut best: Option<(&str, usize)> = None;
    for acct in order {
        let n = counts[acct];
        if best.map_or(true, |(_, b)| n > b) {
            best = Some((acct, n));
        }
    }
    best.map(|(a, _)| a.to_string())
}

/// Statements are either ascending or descending; reverse the latter.
pub fn chronological(mut rows: Vec<ParsedRow>) -> Vec<ParsedRow> {
    if !rows.windows(2).all(|w| w[0].date <= w[1].date) {
        rows.reverse();
    }
    rows
}

// ---------------------------------------------------------------------------
// import_file
// ---------------------------------------------------------------------------

pub struct ImportResult {
    pub imported: usize,
    pub skipped: usize,
    pub duplicate_file: bool,
}

pub fn import_file(store: &TransactionStore, file_path: &Path) -> Result<ImportResult> {
    let data = std::fs::read(file_path)?;
    let checksum = compute_checksum(&data);
    if store.is_file_imported(&checksum)? {
        info!(file = %file_path.display(), "file already imported");
        return Ok(ImportResult {
            imported: 0,
            skipped: 0,
            duplicate_file: true,
        });
    }

    let (layout, rows) = parse_statement(store.kind(), &data)?;
    debug!(?layout, rows = rows.len(), "parsed statement");
    let records = infer_missing_balances(chronological(rows))?;
    let result = store.ingest_batch(records.clone(), true)?;

    store.record_import(
        file_path.file_name().and_then(|n| n.to_str()).unwrap_or(""),
        &records,
        &checksum,
    )?;

    Ok(ImportResult {
        imported: result.inserted,
        skipped: result.skipped,
        duplicate_file: false,
    })
}
