//! Aggregation helpers
//!
//! Pure functions over in-memory record sets. Nothing here touches the store.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde_json::Value;

use crate::record::Record;

/// Bucket for records whose group field is absent, null or blank
pub const UNCATEGORIZED: &str = "uncategorized";

/// Group key for a field value
fn bucket_key(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => UNCATEGORIZED.to_string(),
        Some(Value::String(s)) if s.trim().is_empty() => UNCATEGORIZED.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Partition records by the value of `field`, keeping encounter order
/// inside each bucket.
pub fn group_by<'a>(records: &'a [Record], field: &str) -> BTreeMap<String, Vec<&'a Record>> {
    let mut groups: BTreeMap<String, Vec<&Record>> = BTreeMap::new();
    for record in records {
        groups
            .entry(bucket_key(record.get(field)))
            .or_default()
            .push(record);
    }
    groups
}

/// Partition by `group_field` and reduce each bucket to the sum of `sum_field`
pub fn group_and_sum(records: &[Record], group_field: &str, sum_field: &str) -> BTreeMap<String, f64> {
    let mut totals: BTreeMap<String, f64> = BTreeMap::new();
    for record in records {
        *totals.entry(bucket_key(record.get(group_field))).or_default() += record.number(sum_field);
    }
    totals
}

/// Total of `field` across all records; missing or non-numeric values are zero
pub fn sum(records: &[Record], field: &str) -> f64 {
    records.iter().map(|r| r.number(field)).sum()
}

/// Percentage change from `previous` to `current`, rounded to one decimal.
///
/// A zero baseline never divides: it is a full positive swing (100) when
/// `current > 0`, and no change (0) otherwise.
pub fn percent_variance(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        return if current > 0.0 { 100.0 } else { 0.0 };
    }
    round1((current - previous) / previous * 100.0)
}

pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// `YYYY-MM` of a record's date field.
///
/// Accepts `YYYY-MM-DD`, RFC 3339 timestamps and bare `YYYY-MM`.
pub fn month_of(record: &Record, date_field: &str) -> Option<String> {
    let raw = record.str_field(date_field)?.trim();
    let head = raw.get(..10).unwrap_or(raw);
    if let Ok(date) = NaiveDate::parse_from_str(head, "%Y-%m-%d") {
        return Some(date.format("%Y-%m").to_string());
    }
    NaiveDate::parse_from_str(&format!("{}-01", raw), "%Y-%m-%d")
        .ok()
        .map(|d| d.format("%Y-%m").to_string())
}

/// Sum of `sum_field` per `YYYY-MM`; records without a parseable date are skipped
pub fn monthly_totals(records: &[Record], date_field: &str, sum_field: &str) -> BTreeMap<String, f64> {
    let mut totals: BTreeMap<String, f64> = BTreeMap::new();
    for record in records {
        if let Some(month) = month_of(record, date_field) {
            *totals.entry(month).or_default() += record.number(sum_field);
        }
    }
    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records(values: Vec<Value>) -> Vec<Record> {
        values.into_iter().map(|v| Record::try_from(v).unwrap()).collect()
    }

    fn sample() -> Vec<Record> {
        records(vec![
            json!({"id": "1", "category": "food", "amount": 12.5, "date": "2024-03-02"}),
            json!({"id": "2", "category": "rent", "amount": 800, "date": "2024-03-01"}),
            json!({"id": "3", "category": "food", "amount": "7.5", "date": "2024-04-10"}),
            json!({"id": "4", "amount": 3, "date": "2024-04-11"}),
            json!({"id": "5", "category": "", "amount": "n/a", "date": "bad"}),
        ])
    }

    #[test]
    fn test_group_by_keeps_order_and_uncategorized() {
        let records = sample();
        let groups = group_by(&records, "category");

        let food: Vec<_> = groups["food"].iter().filter_map(|r| r.str_field("id")).collect();
        assert_eq!(food, vec!["1", "3"]);

        let other: Vec<_> = groups[UNCATEGORIZED]
            .iter()
            .filter_map(|r| r.str_field("id"))
            .collect();
        assert_eq!(other, vec!["4", "5"]);
        assert_eq!(groups.len(), 3);
    }

    #[test]
    fn test_group_and_sum_matches_filtered_sum() {
        let records = sample();
        let totals = group_and_sum(&records, "category", "amount");

        for (category, members) in group_by(&records, "category") {
            let owned: Vec<Record> = members.into_iter().cloned().collect();
            assert_eq!(totals[&category], sum(&owned, "amount"));
        }
        assert_eq!(totals["food"], 20.0);
        assert_eq!(totals[UNCATEGORIZED], 3.0);
    }

    #[test]
    fn test_sum_treats_missing_as_zero() {
        assert_eq!(sum(&sample(), "amount"), 823.0);
        assert_eq!(sum(&sample(), "nothing"), 0.0);
        assert_eq!(sum(&[], "amount"), 0.0);
    }

    #[test]
    fn test_numeric_group_keys() {
        let records = records(vec![json!({"year": 2024, "v": 1}), json!({"year": 2024, "v": 2})]);
        assert_eq!(group_and_sum(&records, "year", "v")["2024"], 3.0);
    }

    #[test]
    fn test_percent_variance_boundaries() {
        assert_eq!(percent_variance(0.0, 0.0), 0.0);
        assert_eq!(percent_variance(50.0, 0.0), 100.0);
        assert_eq!(percent_variance(-5.0, 0.0), 0.0);
        assert_eq!(percent_variance(150.0, 100.0), 50.0);
        assert_eq!(percent_variance(50.0, 100.0), -50.0);
        assert_eq!(percent_variance(1.0, 3.0), -66.7);
    }

    #[test]
    fn test_monthly_totals() {
        let totals = monthly_totals(&sample(), "date", "amount");
        assert_eq!(totals["2024-03"], 812.5);
        assert_eq!(totals["2024-04"], 10.5);
        assert_eq!(totals.len(), 2);
    }

    #[test]
    fn test_month_of_formats() {
        let r = Record::new()
            .with("a", "2024-07-15T10:00:00Z")
            .with("b", "2024-07")
            .with("c", "July");
        assert_eq!(month_of(&r, "a").as_deref(), Some("2024-07"));
        assert_eq!(month_of(&r, "b").as_deref(), Some("2024-07"));
        assert_eq!(month_of(&r, "c"), None);
    }
}
