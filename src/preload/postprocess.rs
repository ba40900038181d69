//! Ordering and de-duplication applied after rows are fetched.
//!
//! Association order is authoritative. Distinct runs afterwards and keeps
//! the first record per distinct value, so the survivor of each duplicate
//! group is the one the declared order puts first.

use crate::models::{value_key, Record};
use crate::query_builder::conditions::split_reference;
use crate::query_builder::{Direction, OrderBy};
use crate::registry::DistinctOn;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashSet;

/// Total order over JSON scalars, NULL sorting last ascending
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Bool(_) => 0,
            Value::Number(_) => 1,
            Value::String(_) => 2,
            Value::Array(_) | Value::Object(_) => 3,
            Value::Null => 4,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(i), Some(j)) => i.cmp(&j),
            _ => {
                let x = x.as_f64().unwrap_or(f64::NAN);
                let y = y.as_f64().unwrap_or(f64::NAN);
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (x, y) if rank(x) == rank(y) => x.to_string().cmp(&y.to_string()),
        (x, y) => rank(x).cmp(&rank(y)),
    }
}

/// Compare two records under `order`. Order columns may be bare or
/// alias-qualified; only the column part is read.
pub fn compare_records(a: &Record, b: &Record, order: &[OrderBy]) -> Ordering {
    for entry in order {
        let column = column_part(&entry.column);
        let left = a.get(column).unwrap_or(&Value::Null);
        let right = b.get(column).unwrap_or(&Value::Null);
        let ordering = match entry.direction {
            Direction::Asc => compare_values(left, right),
            Direction::Desc => compare_values(right, left),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Stable sort by `order`, then primary key ascending
pub fn sort_records(records: &mut [Record], order: &[OrderBy]) {
    records.sort_by(|a, b| {
        compare_records(a, b, order).then_with(|| {
            compare_values(
                a.id().unwrap_or(&Value::Null),
                b.id().unwrap_or(&Value::Null),
            )
        })
    });
}

/// Keep the first record for each distinct value
pub fn distinct_records(records: Vec<Record>, on: &DistinctOn) -> Vec<Record> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| {
            let key = match on {
                DistinctOn::PrimaryKey => format!(
                    "{}:{}",
                    record.class_name(),
                    record.id().map(value_key).unwrap_or_default()
                ),
                DistinctOn::Column(column) => record
                    .get(column_part(column))
                    .map(value_key)
                    .unwrap_or_default(),
            };
            seen.insert(key)
        })
        .collect()
}

/// Order (declared order, then primary key), then de-duplicate one
/// association's records
pub fn finalize(
    mut records: Vec<Record>,
    order: &[OrderBy],
    distinct: Option<&DistinctOn>,
) -> Vec<Record> {
    sort_records(&mut records, order);
    match distinct {
        Some(on) => distinct_records(records, on),
        None => records,
    }
}

fn column_part(column: &str) -> &str {
    split_reference(column).map_or(column, |(_, c)| c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: i64, score: Value) -> Record {
        Record::new(
            "Post",
            "id",
            json!({"id": id, "score": score}).as_object().cloned().unwrap(),
        )
    }

    fn ids(records: &[Record]) -> Vec<i64> {
        records
            .iter()
            .filter_map(|r| r.id().and_then(Value::as_i64))
            .collect()
    }

    #[test]
    fn test_null_sorts_last_ascending() {
        let mut records = vec![record(1, Value::Null), record(2, json!(5)), record(3, json!(1))];
        sort_records(&mut records, &[OrderBy::asc("score")]);
        assert_eq!(ids(&records), vec![3, 2, 1]);
        sort_records(&mut records, &[OrderBy::desc("posts.score")]);
        assert_eq!(ids(&records), vec![1, 2, 3]);
    }

    #[test]
    fn test_order_is_authoritative_and_distinct_keeps_first() {
        let records = vec![record(1, json!(3)), record(2, json!(7)), record(3, json!(3))];
        let result = finalize(
            records,
            &[OrderBy::desc("id")],
            Some(&DistinctOn::Column("score".to_string())),
        );
        assert_eq!(ids(&result), vec![3, 2]);
    }

    #[test]
    fn test_distinct_on_primary_key() {
        let records = vec![record(1, json!(1)), record(1, json!(1)), record(2, json!(1))];
        assert_eq!(ids(&distinct_records(records, &DistinctOn::PrimaryKey)), vec![1, 2]);
    }

    #[test]
    fn test_mixed_numbers_compare_numerically() {
        assert_eq!(compare_values(&json!(2), &json!(10.5)), Ordering::Less);
        assert_eq!(compare_values(&json!("b"), &json!("a")), Ordering::Greater);
        assert_eq!(compare_values(&Value::Null, &json!(1)), Ordering::Greater);
    }
}
