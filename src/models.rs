use chrono::NaiveDateTime;
use clap::ValueEnum;
use sha2::{Digest, Sha256};

/// Storage format for transaction timestamps. Sorts lexicographically.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum AccountKind {
    /// Deposits and withdrawals.
    Debit,
    /// Charges and payments; a charge raises the balance owed.
    Credit,
}

impl AccountKind {
    pub const ALL: [AccountKind; 2] = [AccountKind::Debit, AccountKind::Credit];

    pub fn key(&self) -> &'static str {
        match self {
            Self::Debit => "debit",
            Self::Credit => "credit",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Debit => "Debit",
            Self::Credit => "Credit",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            Self::Debit => "debit_transactions",
            Self::Credit => "credit_transactions",
        }
    }

    pub fn column(&self, side: Side) -> &'static str {
        match (self, side) {
            (Self::Debit, Side::Primary) => "deposit",
            (Self::Debit, Side::Secondary) => "withdrawal",
            (Self::Credit, Side::Primary) => "charge",
            (Self::Credit, Side::Secondary) => "payment",
        }
    }

    /// Maps the two statement amount columns onto (primary, secondary).
    /// Debit statements list the withdrawal first, credit statements the charge.
    pub fn amounts_from_columns(
        &self,
        first: Option<f64>,
        second: Option<f64>,
    ) -> (Option<f64>, Option<f64>) {
        match self {
            Self::Debit => (second, first),
            Self::Credit => (first, second),
        }
    }
}

/// Which of the two amount fields of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Period {
    Day,
    Week,
    Month,
    Year,
}

impl Period {
    /// strftime pattern producing the group label.
    pub fn sql_format(&self) -> &'static str {
        match self {
            Self::Day => "%Y-%m-%d",
            Self::Week => "%Y-W%W",
            Self::Month => "%Y-%m",
            Self::Year => "%Y",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OrderBy {
    Date,
    Amount,
    Description,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    pub id: String,
    pub description: String,
    pub date: NaiveDateTime,
    pub primary: Option<f64>,
    pub secondary: Option<f64>,
    pub balance: f64,
}

impl TransactionRecord {
    pub fn new(
        description: impl Into<String>,
        date: NaiveDateTime,
        primary: Option<f64>,
        secondary: Option<f64>,
        balance: f64,
    ) -> Self {
        let description = description.into();
        let id = hash_id(&description, &date, primary, secondary, balance);
        Self {
            id,
            description,
            date,
            primary,
            secondary,
            balance,
        }
    }

    /// Signed effect on the balance: primary minus secondary, nulls as zero.
    pub fn delta(&self) -> f64 {
        self.primary.unwrap_or(0.0) - self.secondary.unwrap_or(0.0)
    }

    /// Balance before this transaction was applied.
    pub fn balance_before(&self) -> f64 {
        match (self.primary, self.secondary) {
            (Some(p), _) => self.balance - p,
            (None, Some(s)) => self.balance + s,
            (None, None) => self.balance,
        }
    }
}

fn fmt_amount(value: Option<f64>) -> String {
    value.map_or_else(|| "None".to_string(), |v| v.to_string())
}

/// Content hash used as the dedup key of a record.
pub fn hash_id(
    description: &str,
    date: &NaiveDateTime,
    primary: Option<f64>,
    secondary: Option<f64>,
    balance: f64,
) -> String {
    let identifier = format!(
        "{description}:{}:{}:{}:{balance}",
        date.format(DATE_FORMAT),
        fmt_amount(primary),
        fmt_amount(secondary),
    );
    let mut hasher = Sha256::new();
    hasher.update(identifier.as_bytes());
    hex::encode(hasher.finalize())
}

/// Round to cents. Adding 0.0 folds -0.0 into 0.0.
pub fn round2(val: f64) -> f64 {
    (val * 100.0).round() / 100.0 + 0.0
}

/// Intermediate representation from the CSV importer before a record is built.
/// `balance` is `None` when the statement cell was blank.
#[derive(Debug, Clone)]
pub struct ParsedRow {
    pub date: NaiveDateTime,
    pub description: String,
    pub primary: Option<f64>,
    pub secondary: Option<f64>,
    pub balance: Option<f64>,
}

impl ParsedRow {
    pub fn delta(&self) -> f64 {
        self.primary.unwrap_or(0.0) - self.secondary.unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_hash_id_is_deterministic() {
        let a = TransactionRecord::new("Coffee", day(1), None, Some(3.5), 96.5);
        let b = TransactionRecord::new("Coffee", day(1), None, Some(3.5), 96.5);
        assert_eq!(a.id, b.id);
        assert_eq!(a.id.len(), 64);
    }

    #[test]
    fn test_hash_id_distinguishes_sides() {
        let a = TransactionRecord::new("Refund", day(1), Some(10.0), None, 110.0);
        let b = TransactionRecord::new("Refund", day(1), None, Some(10.0), 110.0);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_delta_and_balance_before() {
        let deposit = TransactionRecord::new("Pay", day(1), Some(100.0), None, 100.0);
        assert_eq!(deposit.delta(), 100.0);
        assert_eq!(deposit.balance_before(), 0.0);

        let withdrawal = TransactionRecord::new("Rent", day(2), None, Some(30.0), 70.0);
        assert_eq!(withdrawal.delta(), -30.0);
        assert_eq!(withdrawal.balance_before(), 100.0);
    }

    #[test]
    fn test_amounts_from_columns() {
        assert_eq!(
            AccountKind::Debit.amounts_from_columns(Some(5.0), None),
            (None, Some(5.0))
        );
        assert_eq!(
            AccountKind::Credit.amounts_from_columns(Some(5.0), None),
            (Some(5.0), None)
        );
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(0.1 + 0.2), 0.3);
        assert_eq!(round2(70.004), 70.0);
        assert_eq!(round2(-0.001).to_string(), "0");
    }
}
