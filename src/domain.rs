//! Domain record kinds
//!
//! Typed views over the ledger collections. The store itself is schemaless;
//! these types only fix field names and value shapes so the CLI and reports
//! agree with what is indexed:
//! - `Income`, `Expense`: dated amounts with a category
//! - `Account`, `Transfer`: balances and movements between accounts
//! - `Loan`, `Debt`, `InterModuleLoan`: money owed, with a status
//! - `Goal`, `Budget`, `Category`, `RecurringItem`: planning records

use chrono::{Days, Months, NaiveDate};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::record::{Record, parse_valid};
use crate::{Error, Result};

/// A typed record stored in a fixed collection
pub trait LedgerRecord: Serialize + DeserializeOwned {
    const COLLECTION: &'static str;

    fn id(&self) -> &str;
}

macro_rules! ledger_record {
    ($ty:ty, $collection:literal) => {
        impl LedgerRecord for $ty {
            const COLLECTION: &'static str = $collection;

            fn id(&self) -> &str {
                &self.id
            }
        }
    };
}

/// Settlement state of loans and debts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    #[default]
    Active,
    Repaid,
    Overdue,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Active => "active",
            LoanStatus::Repaid => "repaid",
            LoanStatus::Overdue => "overdue",
        }
    }
}

impl FromStr for LoanStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "active" | "open" | "pending" => Ok(LoanStatus::Active),
            "repaid" | "paid" | "settled" => Ok(LoanStatus::Repaid),
            "overdue" | "late" => Ok(LoanStatus::Overdue),
            _ => Err(Error::Validation(format!("Unknown loan status: {}", s))),
        }
    }
}

impl std::fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalStatus {
    #[default]
    Active,
    Achieved,
    Abandoned,
}

/// Whether a category or recurring item is money in or out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowKind {
    Income,
    Expense,
}

impl FlowKind {
    /// Collection that concrete entries of this kind are stored in
    pub fn collection(&self) -> &'static str {
        match self {
            FlowKind::Income => Income::COLLECTION,
            FlowKind::Expense => Expense::COLLECTION,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    /// The occurrence after `date`. Month arithmetic clamps to the last day
    /// of shorter months.
    pub fn next_after(&self, date: NaiveDate) -> Option<NaiveDate> {
        match self {
            Frequency::Daily => date.checked_add_days(Days::new(1)),
            Frequency::Weekly => date.checked_add_days(Days::new(7)),
            Frequency::Monthly => date.checked_add_months(Months::new(1)),
            Frequency::Yearly => date.checked_add_months(Months::new(12)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Income {
    pub id: String,
    pub date: NaiveDate,
    pub amount: f64,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}
ledger_record!(Income, "income");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: String,
    pub date: NaiveDate,
    pub amount: f64,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}
ledger_record!(Expense, "expenses");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub balance: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}
ledger_record!(Account, "accounts");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: String,
    pub date: NaiveDate,
    pub amount: f64,
    pub from_account: String,
    pub to_account: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}
ledger_record!(Transfer, "transfers");

/// Money lent to someone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub id: String,
    pub counterparty: String,
    pub amount: f64,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub status: LoanStatus,
}
ledger_record!(Loan, "loans");

/// Money owed to someone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Debt {
    pub id: String,
    pub creditor: String,
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub status: LoanStatus,
    #[serde(default)]
    pub priority: Priority,
}
ledger_record!(Debt, "debts");

impl Debt {
    /// Unpaid and past its due date on `today`
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.status != LoanStatus::Repaid && self.due_date.is_some_and(|due| due < today)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: String,
    pub name: String,
    pub target: f64,
    #[serde(default)]
    pub saved: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<NaiveDate>,
    #[serde(default)]
    pub status: GoalStatus,
}
ledger_record!(Goal, "goals");

impl Goal {
    /// Percentage of the target saved so far, capped at 100
    pub fn progress(&self) -> f64 {
        if self.target <= 0.0 {
            return 0.0;
        }
        (self.saved / self.target * 100.0).clamp(0.0, 100.0)
    }
}

/// Spending limit for one category in one month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    pub id: String,
    /// `YYYY-MM`
    pub month: String,
    pub category: String,
    pub amount: f64,
}
ledger_record!(Budget, "budgets");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub kind: FlowKind,
}
ledger_record!(Category, "categories");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringItem {
    pub id: String,
    pub name: String,
    pub amount: f64,
    pub category: String,
    pub kind: FlowKind,
    pub frequency: Frequency,
    pub next_date: NaiveDate,
}
ledger_record!(RecurringItem, "recurring");

impl RecurringItem {
    pub fn is_due(&self, today: NaiveDate) -> bool {
        self.next_date <= today
    }

    /// Materialize the current occurrence as an income/expense record and
    /// move `next_date` forward by one period.
    pub fn post(&mut self) -> Result<(&'static str, Record)> {
        let entry = Record::new()
            .with("id", Record::generate_id())
            .with("date", self.next_date.to_string())
            .with("amount", self.amount)
            .with("category", self.category.clone())
            .with("note", self.name.clone())
            .with("recurring_id", self.id.clone());

        self.next_date = self.frequency.next_after(self.next_date).ok_or_else(|| {
            Error::Validation(format!("next date of '{}' is out of range", self.name))
        })?;
        Ok((self.kind.collection(), entry))
    }
}

/// Loan between two otherwise separate ledgers (e.g. household and business)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterModuleLoan {
    pub id: String,
    pub source: String,
    pub destination: String,
    pub amount: f64,
    pub date: NaiveDate,
    #[serde(default)]
    pub status: LoanStatus,
}
ledger_record!(InterModuleLoan, "inter_module_loans");

/// Recurring items with an occurrence on or before `today`
pub fn due_recurring(records: &[Record], today: NaiveDate) -> Vec<RecurringItem> {
    parse_valid::<RecurringItem>(RecurringItem::COLLECTION, records)
        .into_iter()
        .filter(|item| item.is_due(today))
        .collect()
}

/// Unpaid debts past due, highest priority first, then earliest due date
pub fn overdue_debts(records: &[Record], today: NaiveDate) -> Vec<Debt> {
    let mut debts: Vec<Debt> = parse_valid::<Debt>(Debt::COLLECTION, records)
        .into_iter()
        .filter(|debt| debt.is_overdue(today))
        .collect();
    debts.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.due_date.cmp(&b.due_date)));
    debts
}

pub fn active_goals(records: &[Record]) -> Vec<Goal> {
    parse_valid::<Goal>(Goal::COLLECTION, records)
        .into_iter()
        .filter(|goal| goal.status == GoalStatus::Active)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Store, default_registry};

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_collections_exist_in_default_registry() {
        let registry = default_registry();
        for name in [
            Income::COLLECTION,
            Expense::COLLECTION,
            Account::COLLECTION,
            Transfer::COLLECTION,
            Loan::COLLECTION,
            Debt::COLLECTION,
            Goal::COLLECTION,
            Budget::COLLECTION,
            Category::COLLECTION,
            RecurringItem::COLLECTION,
            InterModuleLoan::COLLECTION,
        ] {
            assert!(registry.contains(name), "{} not declared", name);
        }
    }

    #[test]
    fn test_typed_round_trip_and_index_fields() {
        let store = Store::open_in_memory(default_registry()).unwrap();
        let records = store.writer();

        let loan = InterModuleLoan {
            id: "l1".into(),
            source: "household".into(),
            destination: "business".into(),
            amount: 250.0,
            date: date("2024-03-01"),
            status: LoanStatus::Active,
        };
        records.put_typed(&loan).unwrap();

        assert_eq!(records.get_typed::<InterModuleLoan>("l1").unwrap(), loan);
        assert_eq!(records.all_typed::<InterModuleLoan>().unwrap(), vec![loan.clone()]);

        let active = records
            .query_by_index("inter_module_loans", "status", &serde_json::json!("active"))
            .unwrap();
        assert_eq!(active.len(), 1);
    }

    #[test]
    fn test_account_kind_serializes_as_type() {
        let account = Account {
            id: "a".into(),
            name: "Checking".into(),
            kind: "bank".into(),
            balance: 10.0,
            currency: None,
        };
        let record = Record::from_typed(&account).unwrap();
        assert_eq!(record.str_field("type"), Some("bank"));
        assert!(!record.contains("currency"));
    }

    #[test]
    fn test_loan_status_parsing() {
        assert_eq!("Paid".parse::<LoanStatus>().unwrap(), LoanStatus::Repaid);
        assert_eq!("late".parse::<LoanStatus>().unwrap(), LoanStatus::Overdue);
        assert!("forgotten".parse::<LoanStatus>().is_err());
    }

    #[test]
    fn test_monthly_frequency_clamps() {
        assert_eq!(
            Frequency::Monthly.next_after(date("2024-01-31")),
            Some(date("2024-02-29"))
        );
        assert_eq!(Frequency::Weekly.next_after(date("2024-12-28")), Some(date("2025-01-04")));
    }

    #[test]
    fn test_recurring_post_advances() {
        let mut rent = RecurringItem {
            id: "r1".into(),
            name: "Rent".into(),
            amount: 900.0,
            category: "housing".into(),
            kind: FlowKind::Expense,
            frequency: Frequency::Monthly,
            next_date: date("2024-05-01"),
        };
        assert!(rent.is_due(date("2024-05-03")));

        let (collection, entry) = rent.post().unwrap();
        assert_eq!(collection, "expenses");
        assert_eq!(entry.str_field("date"), Some("2024-05-01"));
        assert_eq!(entry.number("amount"), 900.0);
        assert_eq!(rent.next_date, date("2024-06-01"));
        assert!(!rent.is_due(date("2024-05-03")));
    }

    #[test]
    fn test_debt_overdue_and_goal_progress() {
        let debt = Debt {
            id: "d".into(),
            creditor: "Bank".into(),
            amount: 100.0,
            due_date: Some(date("2024-01-10")),
            status: LoanStatus::Active,
            priority: Priority::High,
        };
        assert!(debt.is_overdue(date("2024-01-11")));
        assert!(!debt.is_overdue(date("2024-01-10")));

        let goal = Goal {
            id: "g".into(),
            name: "Bike".into(),
            target: 400.0,
            saved: 100.0,
            deadline: None,
            status: GoalStatus::Active,
        };
        assert_eq!(goal.progress(), 25.0);
    }

    #[test]
    fn test_due_recurring_skips_malformed_rows() {
        let rows: Vec<Record> = [
            serde_json::json!({
                "id": "r1", "name": "Rent", "amount": 900, "category": "housing",
                "kind": "expense", "frequency": "monthly", "next_date": "2024-05-01"
            }),
            serde_json::json!({"id": "r2", "name": "half typed"}),
            serde_json::json!({
                "id": "r3", "name": "Salary", "amount": 3000, "category": "work",
                "kind": "income", "frequency": "monthly", "next_date": "2024-05-25"
            }),
        ]
        .into_iter()
        .map(|v| Record::try_from(v).unwrap())
        .collect();

        let due = due_recurring(&rows, date("2024-05-03"));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, "r1");
        assert_eq!(due_recurring(&rows, date("2024-06-01")).len(), 2);
    }

    #[test]
    fn test_overdue_debts_by_priority() {
        let debt = |id: &str, due: &str, status: LoanStatus, priority: Priority| {
            Record::from_typed(&Debt {
                id: id.into(),
                creditor: "bank".into(),
                amount: 100.0,
                due_date: Some(date(due)),
                status,
                priority,
            })
            .unwrap()
        };
        let rows = vec![
            debt("low", "2024-01-01", LoanStatus::Active, Priority::Low),
            debt("paid", "2024-01-01", LoanStatus::Repaid, Priority::High),
            debt("high", "2024-02-01", LoanStatus::Overdue, Priority::High),
            debt("future", "2025-01-01", LoanStatus::Active, Priority::High),
            Record::new().with("id", "broken").with("amount", "lots"),
        ];

        let overdue = overdue_debts(&rows, date("2024-03-01"));
        let ids: Vec<_> = overdue.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["high", "low"]);
    }

    #[test]
    fn test_active_goals() {
        let goal = |id: &str, status: GoalStatus| {
            Record::from_typed(&Goal {
                id: id.into(),
                name: id.into(),
                target: 1000.0,
                saved: 250.0,
                deadline: None,
                status,
            })
            .unwrap()
        };
        let rows = vec![goal("car", GoalStatus::Active), goal("boat", GoalStatus::Abandoned)];

        let active = active_goals(&rows);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].progress(), 25.0);
    }
}
