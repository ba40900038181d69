use graphload_core::query_builder::conditions::*;
use serde_json::{json, Value};

#[test]
fn test_simple_condition() {
    let condition = Condition::Simple {
        field: "name".to_string(),
        operator: Operator::Eq,
        value: Value::String("test".to_string()),
    };
    assert_eq!(condition.to_sql(), r#""name" = 'test'"#);
}

#[test]
fn test_comparison_operators() {
    let cases = [
        (Operator::NotEq, "<>"),
        (Operator::Lt, "<"),
        (Operator::Lte, "<="),
        (Operator::Gt, ">"),
        (Operator::Gte, ">="),
    ];
    for (operator, expected) in cases {
        assert_eq!(
            WhereClause::simple("score", operator, json!(3)).to_sql(),
            format!(r#""score" {expected} 3"#)
        );
    }
}

#[test]
fn test_null_values_render_null_tests() {
    assert_eq!(
        WhereClause::simple("email", Operator::Eq, Value::Null).to_sql(),
        r#""email" IS NULL"#
    );
    assert_eq!(
        WhereClause::simple("email", Operator::NotEq, Value::Null).to_sql(),
        r#""email" IS NOT NULL"#
    );
}

#[test]
fn test_in_condition() {
    let condition = Condition::In {
        field: "id".to_string(),
        values: vec![json!(1), json!(2), json!(3)],
    };
    assert_eq!(condition.to_sql(), r#""id" IN (1, 2, 3)"#);

    assert_eq!(WhereClause::not_in_condition("id", vec![]).to_sql(), "1=1");
    assert_eq!(
        WhereClause::not_in_condition("type", vec![json!("Mylar")]).to_sql(),
        r#""type" NOT IN ('Mylar')"#
    );
}

#[test]
fn test_between_condition() {
    let clause = WhereClause::between("p.score", json!(1), json!(4));
    assert_eq!(clause.to_sql(), r#""p"."score" BETWEEN 1 AND 4"#);
}

#[test]
fn test_like_condition() {
    let clause = WhereClause::simple("title", Operator::Like, json!("fir%"));
    assert_eq!(clause.to_sql(), r#""title" LIKE 'fir%'"#);
}

#[test]
fn test_column_comparison() {
    let clause = WhereClause::columns("p.user_id", Operator::Eq, "u.id");
    assert_eq!(clause.to_sql(), r#""p"."user_id" = "u"."id""#);
}

#[test]
fn test_string_values_are_escaped() {
    assert_eq!(format_value(&json!("bob's")), "'bob''s'");
    assert_eq!(format_value(&json!(true)), "true");
    assert_eq!(format_value(&Value::Null), "NULL");
}

#[test]
fn test_identifiers_are_quoted() {
    assert_eq!(quote_column("posts.title"), r#""posts"."title""#);
    assert_eq!(quote_column("p.*"), r#""p".*"#);
    assert_eq!(quote_ident(r#"we"ird"#), r#""we""ird""#);
}

#[test]
fn test_grouping_and_negation() {
    let clause = WhereClause::and(vec![
        Condition::IsNotNull {
            field: "email".to_string(),
        },
        Condition::Group(WhereClause::or(vec![
            Condition::IsNull {
                field: "deleted_at".to_string(),
            },
            Condition::Simple {
                field: "admin".to_string(),
                operator: Operator::Eq,
                value: json!(true),
            },
        ])),
    ]);
    assert_eq!(
        clause.to_sql(),
        r#"("email" IS NOT NULL AND ("deleted_at" IS NULL OR "admin" = true))"#
    );
    assert_eq!(
        WhereClause::eq("published", true).negate().to_sql(),
        r#"NOT ("published" = true)"#
    );
}

#[test]
fn test_qualify_and_fields() {
    assert_eq!(qualify("posts", "title"), "posts.title");
    assert_eq!(qualify("posts", "u.name"), "u.name");

    let clause = WhereClause::matching(&json!({"title": "x", "u.name": "ann"})).qualified("posts");
    let mut fields = clause.fields();
    fields.sort();
    assert_eq!(fields, vec!["posts.title", "u.name"]);
}

#[test]
fn test_empty_clauses() {
    assert_eq!(WhereClause::and(vec![]).to_sql(), "1=1");
    assert_eq!(WhereClause::any(vec![]).to_sql(), "1=0");
    assert!(WhereClause::matching(&json!({})).is_empty());
}
