//! Single-table inheritance: discriminant filtering and row marshaling.

use graphload_core::marshal::marshal;
use graphload_core::test_helpers::{fixtures, InMemoryDatabase};
use serde_json::json;
use std::sync::Arc;

fn balloons() -> Arc<InMemoryDatabase> {
    let db = Arc::new(InMemoryDatabase::new());
    db.insert("users", json!({"id": 1, "name": "ann", "email": null}));
    db.insert(
        "balloons",
        json!({"id": 1, "user_id": 1, "color": "silver", "type": "Mylar"}),
    );
    db.insert(
        "balloons",
        json!({"id": 2, "user_id": 1, "color": "red", "type": "Latex"}),
    );
    db
}

#[tokio::test]
async fn test_base_query_marshals_each_row_to_its_child_class() {
    let engine = fixtures::engine(balloons());

    let all = engine.query("Balloon").order_asc("id").all().await.unwrap();
    let classes: Vec<&str> = all.iter().map(|b| b.class_name()).collect();
    assert_eq!(classes, vec!["Mylar", "Latex"]);
}

#[test]
fn test_discriminant_predicate_appears_once() {
    let engine = fixtures::engine(balloons());

    let sql = engine.query("Balloon").sql().unwrap();
    assert_eq!(sql.matches(r#""type" IN"#).count(), 1, "{sql}");
    assert!(sql.contains(r#""balloons"."type" IN ('Mylar', 'Latex', 'Animal')"#), "{sql}");

    // Latex has a further child; the filter is still a single predicate
    let sql = engine.query("Latex").sql().unwrap();
    assert_eq!(sql.matches(r#""type" IN"#).count(), 1, "{sql}");
    assert!(sql.contains(r#"IN ('Latex', 'Animal')"#), "{sql}");
}

#[tokio::test]
async fn test_child_query_reads_only_its_family() {
    let db = balloons();
    db.insert(
        "balloons",
        json!({"id": 3, "user_id": 1, "color": "green", "type": "Animal"}),
    );
    let engine = fixtures::engine(db);

    let latex = engine.query("Latex").order_asc("id").all().await.unwrap();
    let classes: Vec<&str> = latex.iter().map(|b| b.class_name()).collect();
    assert_eq!(classes, vec!["Latex", "Animal"]);

    let mylar = engine.query("Mylar").count().await.unwrap();
    assert_eq!(mylar, 1);
}

#[tokio::test]
async fn test_preloaded_sti_rows_keep_their_classes() {
    let engine = fixtures::engine(balloons());

    let user = engine
        .query("User")
        .preload(["balloons"])
        .first()
        .await
        .unwrap()
        .expect("user exists");
    let classes: Vec<&str> = user
        .many("balloons")
        .unwrap()
        .iter()
        .map(|b| b.class_name())
        .collect();
    assert_eq!(classes, vec!["Mylar", "Latex"]);
}

#[test]
fn test_unknown_discriminant_degrades_to_queried_class() {
    let registry = fixtures::registry();
    let row = json!({"id": 9, "type": "Zeppelin"})
        .as_object()
        .cloned()
        .unwrap();

    let record = marshal(&registry, row, "Balloon");
    assert_eq!(record.class_name(), "Balloon");
}

#[test]
fn test_join_through_sti_target_filters_once() {
    let engine = fixtures::engine(balloons());

    let sql = engine.query("User").joins("balloons").sql().unwrap();
    assert_eq!(sql.matches(r#""type" IN"#).count(), 1, "{sql}");
    assert!(sql.contains(r#"INNER JOIN "balloons" AS "balloons""#), "{sql}");
}
