//! Monthly reports and budget usage built on the aggregation helpers

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::aggregate::{self, percent_variance, round1};
use crate::record::Record;
use crate::{Error, Result};

/// A calendar month
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Month {
    pub year: i32,
    pub month: u32,
}

impl Month {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(Error::Validation(format!("month out of range: {}", month)));
        }
        Ok(Self { year, month })
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn current() -> Self {
        Self::of(chrono::Local::now().date_naive())
    }

    pub fn previous(&self) -> Self {
        if self.month == 1 {
            Self { year: self.year - 1, month: 12 }
        } else {
            Self { year: self.year, month: self.month - 1 }
        }
    }

    /// Keep records whose `date_field` falls in this month
    pub fn filter<'a>(&self, records: &'a [Record], date_field: &str) -> Vec<&'a Record> {
        let key = self.to_string();
        records
            .iter()
            .filter(|r| aggregate::month_of(r, date_field).as_deref() == Some(key.as_str()))
            .collect()
    }
}

impl FromStr for Month {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::Validation(format!("expected YYYY-MM, got '{}'", s));
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        let year = year.parse().map_err(|_| invalid())?;
        let month = month.parse().map_err(|_| invalid())?;
        Self::new(year, month)
    }
}

impl std::fmt::Display for Month {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl Serialize for Month {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Income and spending for one month compared with the month before
#[derive(Debug, Clone, Serialize)]
pub struct MonthlyReport {
    pub month: Month,
    pub income: f64,
    pub expenses: f64,
    pub net: f64,
    /// Share of income not spent, in percent
    pub savings_rate: f64,
    pub income_variance: f64,
    pub expense_variance: f64,
    pub expenses_by_category: BTreeMap<String, f64>,
}

/// Build the report for `month` from full income and expense record sets
pub fn monthly_report(month: Month, income: &[Record], expenses: &[Record]) -> MonthlyReport {
    let totals = |records: &[Record], m: Month| -> f64 {
        aggregate::monthly_totals(records, "date", "amount")
            .get(&m.to_string())
            .copied()
            .unwrap_or(0.0)
    };

    let income_now = totals(income, month);
    let expenses_now = totals(expenses, month);
    let income_before = totals(income, month.previous());
    let expenses_before = totals(expenses, month.previous());

    let in_month: Vec<Record> = month.filter(expenses, "date").into_iter().cloned().collect();
    let net = income_now - expenses_now;
    let savings_rate = if income_now > 0.0 { round1(net / income_now * 100.0) } else { 0.0 };

    MonthlyReport {
        month,
        income: income_now,
        expenses: expenses_now,
        net,
        savings_rate,
        income_variance: percent_variance(income_now, income_before),
        expense_variance: percent_variance(expenses_now, expenses_before),
        expenses_by_category: aggregate::group_and_sum(&in_month, "category", "amount"),
    }
}

/// Spending against one budget line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetUsage {
    pub category: String,
    pub limit: f64,
    pub spent: f64,
    pub remaining: f64,
    pub percent_used: f64,
}

impl BudgetUsage {
    pub fn is_over(&self) -> bool {
        self.spent > self.limit
    }
}

/// Compare the month's budgets against the month's expenses, per category.
///
/// Several budget lines for the same category are added together.
pub fn budget_usage(month: Month, budgets: &[Record], expenses: &[Record]) -> Vec<BudgetUsage> {
    let key = month.to_string();
    let month_budgets: Vec<Record> = budgets
        .iter()
        .filter(|b| b.str_field("month") == Some(key.as_str()))
        .cloned()
        .collect();
    let month_expenses: Vec<Record> = month.filter(expenses, "date").into_iter().cloned().collect();

    let limits = aggregate::group_and_sum(&month_budgets, "category", "amount");
    let spent = aggregate::group_and_sum(&month_expenses, "category", "amount");

    limits
        .into_iter()
        .map(|(category, limit)| {
            let spent = spent.get(&category).copied().unwrap_or(0.0);
            let percent_used = if limit > 0.0 { round1(spent / limit * 100.0) } else { 0.0 };
            BudgetUsage {
                category,
                limit,
                spent,
                remaining: limit - spent,
                percent_used,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn records(values: Vec<Value>) -> Vec<Record> {
        values.into_iter().map(|v| Record::try_from(v).unwrap()).collect()
    }

    #[test]
    fn test_month_parsing() {
        let m: Month = "2024-01".parse().unwrap();
        assert_eq!(m.previous().to_string(), "2023-12");
        assert_eq!(m.to_string(), "2024-01");
        assert!("2024-13".parse::<Month>().is_err());
        assert!("January".parse::<Month>().is_err());
    }

    #[test]
    fn test_monthly_report() {
        let income = records(vec![
            json!({"id": "i1", "date": "2024-02-25", "amount": 2000}),
            json!({"id": "i2", "date": "2024-03-25", "amount": 3000}),
        ]);
        let expenses = records(vec![
            json!({"id": "e1", "date": "2024-02-03", "amount": 1000, "category": "rent"}),
            json!({"id": "e2", "date": "2024-03-03", "amount": 1000, "category": "rent"}),
            json!({"id": "e3", "date": "2024-03-09", "amount": 500, "category": "food"}),
        ]);

        let report = monthly_report("2024-03".parse().unwrap(), &income, &expenses);
        assert_eq!(report.income, 3000.0);
        assert_eq!(report.expenses, 1500.0);
        assert_eq!(report.net, 1500.0);
        assert_eq!(report.savings_rate, 50.0);
        assert_eq!(report.income_variance, 50.0);
        assert_eq!(report.expense_variance, 50.0);
        assert_eq!(report.expenses_by_category["food"], 500.0);
        assert_eq!(report.expenses_by_category.len(), 2);
    }

    #[test]
    fn test_report_for_empty_history() {
        let report = monthly_report(Month::new(2024, 1).unwrap(), &[], &[]);
        assert_eq!(report.income_variance, 0.0);
        assert_eq!(report.savings_rate, 0.0);
    }

    #[test]
    fn test_budget_usage() {
        let budgets = records(vec![
            json!({"id": "b1", "month": "2024-03", "category": "food", "amount": 400}),
            json!({"id": "b2", "month": "2024-03", "category": "fun", "amount": 100}),
            json!({"id": "b3", "month": "2024-04", "category": "food", "amount": 999}),
        ]);
        let expenses = records(vec![
            json!({"id": "e1", "date": "2024-03-03", "amount": 100, "category": "food"}),
            json!({"id": "e2", "date": "2024-03-09", "amount": 150, "category": "fun"}),
            json!({"id": "e3", "date": "2024-04-01", "amount": 50, "category": "food"}),
        ]);

        let usage = budget_usage("2024-03".parse().unwrap(), &budgets, &expenses);
        assert_eq!(usage.len(), 2);

        assert_eq!(usage[0].category, "food");
        assert_eq!(usage[0].remaining, 300.0);
        assert_eq!(usage[0].percent_used, 25.0);
        assert!(!usage[0].is_over());

        assert_eq!(usage[1].category, "fun");
        assert!(usage[1].is_over());
        assert_eq!(usage[1].percent_used, 150.0);
    }
}
