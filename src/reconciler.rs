use chrono::NaiveDate;
use tracing::info;

use crate::error::{MidasError, Result};
use crate::models::{round2, OrderBy, ParsedRow, TransactionRecord};
use crate::query::Aggregate;
use crate::store::TransactionStore;

pub struct ReconcileResult {
    pub is_valid: bool,
    pub transactions_total: f64,
    pub balance_change: f64,
    pub discrepancy: f64,
}

/// Compares the signed sum of the ledger with the change in running balance.
/// The stored balance of the first record already includes that record, so
/// the opening balance is recovered by undoing its amount.
pub fn reconcile(store: &TransactionStore) -> Result<ReconcileResult> {
    reconcile_sum(store, store.query().sum()?)
}

/// Same as `reconcile`, but only transactions inside the date window are
/// summed. The balance change still spans the whole ledger.
pub fn reconcile_in_range(
    store: &TransactionStore,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<ReconcileResult> {
    let sum = store.query().filter_date_range(start, end, false).sum()?;
    reconcile_sum(store, sum)
}

fn reconcile_sum(store: &TransactionStore, sum: Aggregate<f64>) -> Result<ReconcileResult> {
    let transactions_total = sum.scalar().unwrap_or(0.0);
    let (Some(first), Some(last)) = (store.first()?, store.last()?) else {
        info!("account has no transactions");
        return Ok(ReconcileResult {
            is_valid: true,
            transactions_total,
            balance_change: 0.0,
            discrepancy: 0.0,
        });
    };
    let balance_change = round2(last.balance - first.balance_before());
    let transactions_total = round2(transactions_total);
    Ok(ReconcileResult {
        is_valid: transactions_total == balance_change,
        transactions_total,
        balance_change,
        discrepancy: round2(balance_change - transactions_total),
    })
}

pub fn check_validity(store: &TransactionStore) -> Result<bool> {
    Ok(reconcile(store)?.is_valid)
}

pub fn check_validity_in_range(
    store: &TransactionStore,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<bool> {
    Ok(reconcile_in_range(store, start, end)?.is_valid)
}

// ---------------------------------------------------------------------------
// Duplicates
// ---------------------------------------------------------------------------

fn same_entry(a: &TransactionRecord, b: &TransactionRecord) -> bool {
    a.date == b.date
        && a.balance == b.balance
        && a.primary == b.primary
        && a.secondary == b.secondary
}

/// Pairs of distinct records with identical date, balance and amounts.
/// Descriptions may differ. Each unordered pair is reported once.
pub fn find_possible_duplicates(
    store: &TransactionStore,
) -> Result<Vec<(TransactionRecord, TransactionRecord)>> {
    let all = store.all(OrderBy::Date, true)?;
    let mut pairs = Vec::new();
    for (i, a) in all.iter().enumerate() {
        for b in &all[i + 1..] {
            if same_entry(a, b) {
                pairs.push((a.clone(), b.clone()));
            }
        }
    }
    Ok(pairs)
}

/// Irreversibly deletes the chosen records. Confirmation is up to the caller.
pub fn remove_duplicates(store: &TransactionStore, ids: &[String]) -> Result<usize> {
    store.delete(ids)
}

// ---------------------------------------------------------------------------
// Balance continuity
// ---------------------------------------------------------------------------

pub struct BalanceBreak {
    pub previous: TransactionRecord,
    pub record: TransactionRecord,
    pub expected: f64,
}

/// Adjacent records whose running balances do not follow from the amounts.
pub fn find_balance_breaks(store: &TransactionStore) -> Result<Vec<BalanceBreak>> {
    let all = store.all(OrderBy::Date, true)?;
    Ok(all
        .windows(2)
        .filter_map(|w| {
            let expected = round2(w[0].balance + w[1].delta());
            (expected != round2(w[1].balance)).then(|| BalanceBreak {
                previous: w[0].clone(),
                record: w[1].clone(),
                expected,
            })
        })
        .collect())
}

/// Builds records from chronologically ordered rows, filling blank balances
/// from the neighbouring rows. Fails if no row carries a balance.
pub fn infer_missing_balances(rows: Vec<ParsedRow>) -> Result<Vec<TransactionRecord>> {
    let mut balances: Vec<Option<f64>> = rows.iter().map(|r| r.balance).collect();
    let Some(anchor) = balances.iter().position(Option::is_some) else {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        return Err(MidasError::Parse {
            row: 1,
            message: "no balance to infer from".to_string(),
        });
    };

    for i in (0..anchor).rev() {
        let next = balances[i + 1].unwrap_or_default();
        balances[i] = Some(round2(next - rows[i + 1].delta()));
    }
    for i in anchor + 1..rows.len() {
        if balances[i].is_none() {
            let prev = balances[i - 1].unwrap_or_default();
            balances[i] = Some(round2(prev + rows[i].delta()));
        }
    }

    Ok(rows
        .into_iter()
        .zip(balances)
        .map(|(row, balance)| {
            TransactionRecord::new(
                row.description,
                row.date,
                row.primary,
                row.secondary,
                balance.unwrap_or_default(),
            )
        })
        .collect())
}
