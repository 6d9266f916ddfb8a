use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::params_from_iter;

use crate::categories::{CategoryId, CategoryRegistry};
use crate::error::{MidasError, Result};
use crate::models::{round2, OrderBy, Period, Side, TransactionRecord};
use crate::store::{map_record, TransactionStore};

/// What a description filter matches against.
pub enum DescriptionFilter<'a> {
    /// Description contains this string.
    Literal(String),
    /// Description contains any of these strings.
    AnyOf(Vec<String>),
    /// Description contains any keyword of the category or its subcategories.
    Category(&'a CategoryRegistry, CategoryId),
}

impl DescriptionFilter<'_> {
    fn keywords(&self) -> Vec<String> {
        match self {
            Self::Literal(s) => vec![s.clone()],
            Self::AnyOf(items) => items.clone(),
            Self::Category(registry, id) => registry.keywords_of_id(*id, true).into_iter().collect(),
        }
    }
}

/// Result of an aggregate: one value, or one value per period label.
#[derive(Debug, Clone, PartialEq)]
pub enum Aggregate<T> {
    Scalar(T),
    Grouped(Vec<(String, T)>),
}

impl<T> Aggregate<T> {
    pub fn scalar(self) -> Option<T> {
        match self {
            Self::Scalar(v) => Some(v),
            Self::Grouped(_) => None,
        }
    }

    #[cfg(test)]
    pub fn grouped(self) -> Option<Vec<(String, T)>> {
        match self {
            Self::Scalar(_) => None,
            Self::Grouped(v) => Some(v),
        }
    }
}

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Accumulates a conjunction of filters over one account's ledger, then runs
/// a single aggregate. Every filter method returns the builder for chaining;
/// terminal methods consume it.
pub struct Query<'s> {
    store: &'s TransactionStore,
    clauses: Vec<String>,
    params: Vec<Value>,
    group: Option<Period>,
    orderings: Vec<OrderBy>,
    ascending: bool,
}

impl<'s> Query<'s> {
    pub fn new(store: &'s TransactionStore) -> Self {
        Self {
            store,
            clauses: Vec::new(),
            params: Vec::new(),
            group: None,
            orderings: Vec::new(),
            ascending: true,
        }
    }

    fn push(mut self, clause: String, invert: bool, params: Vec<Value>) -> Self {
        let clause = if invert { format!("NOT ({clause})") } else { clause };
        self.clauses.push(clause);
        self.params.extend(params);
        self
    }

    /// `included = false` keeps only records where that amount is null,
    /// i.e. drops that kind of transaction.
    pub fn filter_include(self, side: Side, included: bool) -> Self {
        if included {
            return self;
        }
        let column = self.store.kind().column(side);
        self.push(format!("{column} IS NULL"), false, Vec::new())
    }

    /// Inclusive day range; either bound may be open. `invert` selects
    /// the records outside whatever bounds were given.
    pub fn filter_date_range(
        self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        invert: bool,
    ) -> Self {
        let day = "substr(date, 1, 10)";
        let fmt = |d: NaiveDate| Value::Text(d.format("%Y-%m-%d").to_string());
        match (start, end) {
            (Some(s), Some(e)) => self.push(format!("{day} BETWEEN ? AND ?"), invert, vec![fmt(s), fmt(e)]),
            (Some(s), None) => self.push(format!("{day} >= ?"), invert, vec![fmt(s)]),
            (None, Some(e)) => self.push(format!("{day} <= ?"), invert, vec![fmt(e)]),
            (None, None) => self,
        }
    }

    /// Case-insensitive substring match on the description. With no keywords
    /// at all, a plain filter matches nothing and an inverted one is skipped.
    pub fn filter_description(self, pattern: DescriptionFilter<'_>, invert: bool) -> Self {
        let keywords = pattern.keywords();
        if keywords.is_empty() {
            return if invert {
                self
            } else {
                self.push("0".to_string(), false, Vec::new())
            };
        }
        let clause = vec!["description LIKE ? ESCAPE '\\'"; keywords.len()].join(" OR ");
        let params = keywords
            .iter()
            .map(|k| Value::Text(format!("%{}%", escape_like(k))))
            .collect();
        self.push(clause, invert, params)
    }

    /// Inclusive range on whichever amount field is set. A record with no
    /// amount at all counts as 0.
    pub fn filter_amount(self, min: Option<f64>, max: Option<f64>, invert: bool) -> Self {
        let kind = self.store.kind();
        let amount = format!(
            "COALESCE({}, {}, 0)",
            kind.column(Side::Primary),
            kind.column(Side::Secondary)
        );
        match (min, max) {
            (Some(lo), Some(hi)) => self.push(
                format!("{amount} BETWEEN ? AND ?"),
                invert,
                vec![Value::Real(lo), Value::Real(hi)],
            ),
            (Some(lo), None) => self.push(format!("{amount} >= ?"), invert, vec![Value::Real(lo)]),
            (None, Some(hi)) => self.push(format!("{amount} <= ?"), invert, vec![Value::Real(hi)]),
            (None, None) => self,
        }
    }

    pub fn group_by(mut self, period: Period) -> Self {
        self.group = Some(period);
        self
    }

    /// Requests an ordering for `transactions`. Only one may be requested.
    pub fn order_by(mut self, key: OrderBy) -> Self {
        self.orderings.push(key);
        self
    }

    pub fn ascending(mut self, ascending: bool) -> Self {
        self.ascending = ascending;
        self
    }

    fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            let parts: Vec<String> = self.clauses.iter().map(|c| format!("({c})")).collect();
            format!(" WHERE {}", parts.join(" AND "))
        }
    }

    fn period_expr(period: Period) -> String {
        format!("strftime('{}', date)", period.sql_format())
    }

    /// Runs `SELECT <select>` over all matching records as one row.
    fn scalar<T>(
        &self,
        select: &str,
        map: impl Fn(&rusqlite::Row<'_>, usize) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let sql = format!(
            "SELECT {select} FROM {}{}",
            self.store.kind().table(),
            self.where_sql()
        );
        let value = self
            .store
            .conn()
            .query_row(&sql, params_from_iter(self.params.iter()), |row| map(row, 0))?;
        Ok(value)
    }

    /// Like `scalar`, but one row per period when grouped, with the period
    /// label as column 0.
    fn rows<T>(
        &self,
        select: &str,
        map: impl Fn(&rusqlite::Row<'_>, usize) -> rusqlite::Result<T>,
    ) -> Result<Aggregate<T>> {
        let table = self.store.kind().table();
        let conn = self.store.conn();
        match self.group {
            None => Ok(Aggregate::Scalar(self.scalar(select, map)?)),
            Some(period) => {
                let sql = format!(
                    "SELECT {} AS period, {select} FROM {table}{} GROUP BY period ORDER BY period",
                    Self::period_expr(period),
                    self.where_sql()
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(self.params.iter()), |row| {
                    Ok((row.get::<_, String>(0)?, map(row, 1)?))
                })?;
                Ok(Aggregate::Grouped(
                    rows.collect::<std::result::Result<Vec<_>, _>>()?,
                ))
            }
        }
    }

    fn sum_columns(&self) -> String {
        let kind = self.store.kind();
        format!(
            "SUM({}), SUM({})",
            kind.column(Side::Primary),
            kind.column(Side::Secondary)
        )
    }

    pub fn count(self) -> Result<Aggregate<usize>> {
        self.rows("count(*)", |row, i| Ok(row.get::<_, i64>(i)? as usize))
    }

    /// Σprimary − Σsecondary, rounded to cents.
    pub fn sum(self) -> Result<Aggregate<f64>> {
        let select = self.sum_columns();
        self.rows(&select, |row, i| {
            let primary: Option<f64> = row.get(i)?;
            let secondary: Option<f64> = row.get(i + 1)?;
            Ok(round2(primary.unwrap_or(0.0) - secondary.unwrap_or(0.0)))
        })
    }

    /// Ungrouped: `sum / count`, failing with `EmptyResult` when nothing
    /// matches. Grouped: mean of the per-record deltas in each period.
    pub fn average(self) -> Result<Aggregate<f64>> {
        if self.group.is_some() {
            let select = format!("AVG({})", self.store.delta_expr());
            return self.rows(&select, |row, i| Ok(round2(row.get::<_, f64>(i)?)));
        }
        let select = format!("count(*), {}", self.sum_columns());
        let (count, total) = self.scalar(&select, |row, i| {
            let count: i64 = row.get(i)?;
            let primary: Option<f64> = row.get(i + 1)?;
            let secondary: Option<f64> = row.get(i + 2)?;
            Ok((count, round2(primary.unwrap_or(0.0) - secondary.unwrap_or(0.0))))
        })?;
        if count == 0 {
            return Err(MidasError::EmptyResult);
        }
        Ok(Aggregate::Scalar(total / count as f64))
    }

    /// Matching records in the requested order (date by default, ties in
    /// insertion order). Grouping does not apply here.
    pub fn transactions(self) -> Result<Vec<TransactionRecord>> {
        if self.orderings.len() > 1 {
            return Err(MidasError::InvalidUsage(
                "only one ordering can be used at a time".to_string(),
            ));
        }
        let order = self.orderings.first().copied().unwrap_or(OrderBy::Date);
        let dir = if self.ascending { "ASC" } else { "DESC" };
        let sql = format!(
            "SELECT {} FROM {}{} ORDER BY {} {dir}, rowid {dir}",
            self.store.select_columns(),
            self.store.kind().table(),
            self.where_sql(),
            self.store.order_expr(order)
        );
        let mut stmt = self.store.conn().prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(self.params.iter()), map_record)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Records whose description matches no keyword of any registered category.
    pub fn transactions_without_category(
        self,
        registry: &CategoryRegistry,
    ) -> Result<Vec<TransactionRecord>> {
        registry
            .ids()
            .into_iter()
            .fold(self, |q, id| {
                q.filter_description(DescriptionFilter::Category(registry, id), true)
            })
            .transactions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AccountKind;
    use crate::store::tests::{at, deposit, test_store, withdrawal};

    fn two_day_ledger() -> (tempfile::TempDir, TransactionStore) {
        let (dir, store) = test_store(AccountKind::Debit);
        store.insert(&deposit("Paycheck", at(2024, 1, 1), 100.0, 100.0)).unwrap();
        store.insert(&withdrawal("Groceries", at(2024, 1, 2), 30.0, 70.0)).unwrap();
        (dir, store)
    }

    fn descriptions(records: Vec<TransactionRecord>) -> Vec<String> {
        records.into_iter().map(|r| r.description).collect()
    }

    #[test]
    fn test_two_day_scenario() {
        let (_dir, store) = two_day_ledger();
        assert_eq!(store.query().sum().unwrap(), Aggregate::Scalar(70.0));
        assert_eq!(store.query().count().unwrap(), Aggregate::Scalar(2));
        assert_eq!(store.query().average().unwrap(), Aggregate::Scalar(35.0));
    }

    #[test]
    fn test_sum_matches_split_by_side() {
        let (_dir, store) = two_day_ledger();
        store.insert(&withdrawal("Coffee", at(2024, 1, 3), 4.35, 65.65)).unwrap();
        let deposits = store
            .query()
            .filter_include(Side::Secondary, false)
            .sum()
            .unwrap()
            .scalar()
            .unwrap();
        let withdrawals = store
            .query()
            .filter_include(Side::Primary, false)
            .sum()
            .unwrap()
            .scalar()
            .unwrap();
        assert_eq!(deposits, 100.0);
        assert_eq!(withdrawals, -34.35);
        assert_eq!(
            store.query().sum().unwrap(),
            Aggregate::Scalar(round2(deposits + withdrawals))
        );
    }

    #[test]
    fn test_filter_amount_min() {
        let (_dir, store) = two_day_ledger();
        let found = store.query().filter_amount(Some(50.0), None, false).transactions().unwrap();
        assert_eq!(descriptions(found), vec!["Paycheck"]);
    }

    #[test]
    fn test_filter_amount_inverted_range() {
        let (_dir, store) = two_day_ledger();
        let found = store
            .query()
            .filter_amount(Some(20.0), Some(40.0), true)
            .transactions()
            .unwrap();
        assert_eq!(descriptions(found), vec!["Paycheck"]);
    }

    #[test]
    fn test_filter_amount_inverted_is_complement() {
        let (_dir, store) = test_store(AccountKind::Debit);
        store
            .insert(&TransactionRecord::new("Note", at(2024, 1, 1), None, None, 0.0))
            .unwrap();
        store.insert(&deposit("Paycheck", at(2024, 1, 2), 100.0, 100.0)).unwrap();
        let count = |invert| {
            store
                .query()
                .filter_amount(Some(50.0), None, invert)
                .count()
                .unwrap()
                .scalar()
                .unwrap()
        };
        assert_eq!(count(false), 1);
        assert_eq!(count(true), 1);
        assert_eq!(count(false) + count(true), store.len().unwrap());
    }

    #[test]
    fn test_filter_date_range_inclusive_and_inverted() {
        let (_dir, store) = two_day_ledger();
        let day2 = NaiveDate::from_ymd_opt(2024, 1, 2);
        let inside = store.query().filter_date_range(day2, day2, false).count().unwrap();
        assert_eq!(inside, Aggregate::Scalar(1));

        let outside = store.query().filter_date_range(day2, None, true).transactions().unwrap();
        assert_eq!(descriptions(outside), vec!["Paycheck"]);

        let before_end = store.query().filter_date_range(None, day2, true).count().unwrap();
        assert_eq!(before_end, Aggregate::Scalar(0));
    }

    #[test]
    fn test_filter_date_range_covers_whole_day() {
        let (_dir, store) = test_store(AccountKind::Debit);
        let late = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap().and_hms_opt(23, 59, 0).unwrap();
        store.insert(&deposit("Late", late, 1.0, 1.0)).unwrap();
        let d = NaiveDate::from_ymd_opt(2024, 3, 5);
        assert_eq!(store.query().filter_date_range(None, d, false).count().unwrap(), Aggregate::Scalar(1));
    }

    #[test]
    fn test_filter_description_any_of_is_case_insensitive() {
        let (_dir, store) = two_day_ledger();
        let found = store
            .query()
            .filter_description(DescriptionFilter::AnyOf(vec!["grocer".into(), "rent".into()]), false)
            .transactions()
            .unwrap();
        assert_eq!(descriptions(found), vec!["Groceries"]);

        let rest = store
            .query()
            .filter_description(DescriptionFilter::Literal("PAY".into()), true)
            .transactions()
            .unwrap();
        assert_eq!(descriptions(rest), vec!["Groceries"]);
    }

    #[test]
    fn test_filter_description_escapes_wildcards() {
        let (_dir, store) = two_day_ledger();
        store.insert(&withdrawal("100% juice", at(2024, 1, 3), 3.0, 67.0)).unwrap();
        let found = store
            .query()
            .filter_description(DescriptionFilter::Literal("0%".into()), false)
            .transactions()
            .unwrap();
        assert_eq!(descriptions(found), vec!["100% juice"]);
        let underscore = store
            .query()
            .filter_description(DescriptionFilter::Literal("_".into()), false)
            .count()
            .unwrap();
        assert_eq!(underscore, Aggregate::Scalar(0));
    }

    #[test]
    fn test_empty_keyword_set_asymmetry() {
        let (_dir, store) = two_day_ledger();
        let none = store
            .query()
            .filter_description(DescriptionFilter::AnyOf(Vec::new()), false)
            .count()
            .unwrap();
        assert_eq!(none, Aggregate::Scalar(0));
        let all = store
            .query()
            .filter_description(DescriptionFilter::AnyOf(Vec::new()), true)
            .count()
            .unwrap();
        assert_eq!(all, Aggregate::Scalar(2));
    }

    #[test]
    fn test_filter_by_category_uses_subcategory_keywords() {
        let (_dir, store) = two_day_ledger();
        let mut reg = CategoryRegistry::new();
        let food = reg.add("Food", None, &[]).unwrap();
        reg.add("Groceries", Some("Food"), &["GROCER"]);
        let total = store
            .query()
            .filter_description(DescriptionFilter::Category(&reg, food), false)
            .sum()
            .unwrap();
        assert_eq!(total, Aggregate::Scalar(-30.0));
    }

    #[test]
    fn test_filter_include_false_keeps_other_kind() {
        let (_dir, store) = two_day_ledger();
        let found = store
            .query()
            .filter_include(Side::Primary, false)
            .transactions()
            .unwrap();
        assert_eq!(descriptions(found), vec!["Groceries"]);
        let both_excluded = store
            .query()
            .filter_include(Side::Primary, false)
            .filter_include(Side::Secondary, false)
            .count()
            .unwrap();
        assert_eq!(both_excluded, Aggregate::Scalar(0));
    }

    #[test]
    fn test_average_of_nothing_is_empty_result() {
        let (_dir, store) = two_day_ledger();
        let err = store
            .query()
            .filter_amount(Some(1000.0), None, false)
            .average()
            .unwrap_err();
        assert!(matches!(err, MidasError::EmptyResult));
    }

    #[test]
    fn test_group_by_month_count() {
        let (_dir, store) = two_day_ledger();
        store.insert(&withdrawal("Rent", at(2024, 2, 1), 50.0, 20.0)).unwrap();
        let grouped = store.query().group_by(Period::Month).count().unwrap().grouped().unwrap();
        assert_eq!(
            grouped,
            vec![("2024-01".to_string(), 2), ("2024-02".to_string(), 1)]
        );
        let total: usize = grouped.iter().map(|(_, n)| n).sum();
        assert_eq!(store.query().count().unwrap(), Aggregate::Scalar(total));
    }

    #[test]
    fn test_group_by_sum_and_average() {
        let (_dir, store) = two_day_ledger();
        store.insert(&withdrawal("Rent", at(2025, 2, 1), 50.0, 20.0)).unwrap();
        let sums = store.query().group_by(Period::Year).sum().unwrap();
        assert_eq!(
            sums,
            Aggregate::Grouped(vec![("2024".to_string(), 70.0), ("2025".to_string(), -50.0)])
        );
        let avgs = store.query().group_by(Period::Day).average().unwrap().grouped().unwrap();
        assert_eq!(avgs.len(), 3);
        assert_eq!(avgs[0], ("2024-01-01".to_string(), 100.0));
        assert_eq!(avgs[1], ("2024-01-02".to_string(), -30.0));
    }

    #[test]
    fn test_group_by_week_labels() {
        let (_dir, store) = two_day_ledger();
        let grouped = store.query().group_by(Period::Week).count().unwrap().grouped().unwrap();
        // 2024-01-01 is a Monday, so both days fall in week 01.
        assert_eq!(grouped, vec![("2024-W01".to_string(), 2)]);
    }

    #[test]
    fn test_two_orderings_is_invalid_usage() {
        let (_dir, store) = two_day_ledger();
        let err = store
            .query()
            .order_by(OrderBy::Date)
            .order_by(OrderBy::Amount)
            .transactions()
            .unwrap_err();
        assert!(matches!(err, MidasError::InvalidUsage(_)));
    }

    #[test]
    fn test_transactions_ordering() {
        let (_dir, store) = two_day_ledger();
        let by_desc = store.query().order_by(OrderBy::Description).transactions().unwrap();
        assert_eq!(descriptions(by_desc), vec!["Groceries", "Paycheck"]);
        let newest_first = store.query().ascending(false).transactions().unwrap();
        assert_eq!(descriptions(newest_first), vec!["Groceries", "Paycheck"]);
    }

    #[test]
    fn test_transactions_without_category() {
        let (_dir, store) = two_day_ledger();
        store.insert(&withdrawal("STARBUCKS 123", at(2024, 1, 3), 5.0, 65.0)).unwrap();
        let mut reg = CategoryRegistry::new();
        reg.add("Food", None, &["grocer"]);
        reg.add("Coffee", Some("Food"), &["starbucks"]);
        reg.add("Empty", None, &[]);
        let found = store.query().transactions_without_category(&reg).unwrap();
        assert_eq!(descriptions(found), vec!["Paycheck"]);
    }

    #[test]
    fn test_credit_account_sign_convention() {
        let (_dir, store) = test_store(AccountKind::Credit);
        store
            .insert(&TransactionRecord::new("Amazon", at(2024, 1, 1), Some(80.0), None, 80.0))
            .unwrap();
        store
            .insert(&TransactionRecord::new("Payment", at(2024, 1, 5), None, Some(50.0), 30.0))
            .unwrap();
        assert_eq!(store.query().sum().unwrap(), Aggregate::Scalar(30.0));
        let charges = store.query().filter_include(Side::Secondary, false).count().unwrap();
        assert_eq!(charges, Aggregate::Scalar(1));
    }
}
