use graphload_core::query_builder::joins::{JoinStep, JoinType};
use graphload_core::query_builder::{Operator, WhereClause};

fn step(join_type: JoinType, to_alias: &str) -> JoinStep {
    JoinStep {
        from_alias: "posts".to_string(),
        to_table: "comments".to_string(),
        to_alias: to_alias.to_string(),
        join_type,
        on: vec![WhereClause::columns(
            &format!("{to_alias}.post_id"),
            Operator::Eq,
            "posts.id",
        )],
        applied_scopes: Vec::new(),
        target_class: "Comment".to_string(),
        association: "comments".to_string(),
    }
}

#[test]
fn test_inner_join() {
    assert_eq!(
        step(JoinType::Inner, "c").to_sql(),
        r#"INNER JOIN "comments" AS "c" ON "c"."post_id" = "posts"."id""#
    );
}

#[test]
fn test_left_join() {
    assert_eq!(
        step(JoinType::Left, "c").to_sql(),
        r#"LEFT JOIN "comments" AS "c" ON "c"."post_id" = "posts"."id""#
    );
}

#[test]
fn test_additional_on_conditions() {
    let mut join = step(JoinType::Inner, "comments");
    join.on.push(WhereClause::eq("comments.body", "ok"));
    assert_eq!(
        join.to_sql(),
        r#"INNER JOIN "comments" AS "comments" ON "comments"."post_id" = "posts"."id" AND "comments"."body" = 'ok'"#
    );
}

#[test]
fn test_join_without_conditions() {
    let mut join = step(JoinType::Inner, "c");
    join.on.clear();
    assert_eq!(join.to_sql(), r#"INNER JOIN "comments" AS "c" ON 1=1"#);
}

#[test]
fn test_same_join_ignores_join_type() {
    let inner = step(JoinType::Inner, "c");
    assert!(inner.is_same_join(&step(JoinType::Left, "c")));
    assert!(!inner.is_same_join(&step(JoinType::Inner, "d")));
}
