use graphload_core::query_builder::{
    AggregateFunction, DeleteCommand, Distinct, JoinStep, JoinType, Operator, OrderBy,
    Pagination, ProjectedColumn, Projection, SelectCommand, WhereClause,
};
use serde_json::json;

fn users_with_posts() -> SelectCommand {
    let mut query = SelectCommand::new("users", "u");
    query.joins.push(JoinStep {
        from_alias: "u".to_string(),
        to_table: "posts".to_string(),
        to_alias: "p".to_string(),
        join_type: JoinType::Inner,
        on: vec![WhereClause::columns("p.user_id", Operator::Eq, "u.id")],
        applied_scopes: Vec::new(),
        target_class: "Post".to_string(),
        association: "posts".to_string(),
    });
    query
}

#[test]
fn test_basic_query_building() {
    let mut query = SelectCommand::new("posts", "posts");
    query.where_clauses.push(WhereClause::eq("posts.published", true));
    query.order_by.push(OrderBy::desc("posts.score"));
    query.pagination = Some(Pagination::limit_only(10));

    assert_eq!(
        query.build_sql(),
        r#"SELECT "posts".* FROM "posts" AS "posts" WHERE "posts"."published" = true ORDER BY "posts"."score" DESC LIMIT 10"#
    );
}

#[test]
fn test_join_query_building() {
    let mut query = users_with_posts();
    query.where_clauses.push(WhereClause::eq("p.title", "first"));

    let sql = query.build_sql();
    assert!(sql.starts_with(r#"SELECT "u".* FROM "users" AS "u" INNER JOIN "posts" AS "p""#));
    assert!(sql.ends_with(r#"WHERE "p"."title" = 'first'"#));
}

#[test]
fn test_where_clauses_are_anded() {
    let mut query = SelectCommand::new("posts", "posts");
    query.where_clauses.push(WhereClause::eq("posts.user_id", 1));
    query
        .where_clauses
        .push(WhereClause::any(vec![
            WhereClause::eq("posts.score", 1),
            WhereClause::is_null("posts.score"),
        ]));

    assert!(query.build_sql().ends_with(
        r#"WHERE "posts"."user_id" = 1 AND ("posts"."score" = 1 OR "posts"."score" IS NULL)"#
    ));
}

#[test]
fn test_distinct_variants() {
    let mut query = SelectCommand::new("posts", "posts");
    query.distinct = Distinct::All;
    assert!(query.build_sql().starts_with(r#"SELECT DISTINCT "posts".*"#));

    query.distinct = Distinct::On(vec!["posts.user_id".to_string()]);
    query.order_by.push(OrderBy::asc("posts.user_id"));
    assert!(query
        .build_sql()
        .starts_with(r#"SELECT DISTINCT ON ("posts"."user_id") "posts".*"#));
}

#[test]
fn test_labeled_projection() {
    let mut query = users_with_posts();
    query.projection = Projection::Columns(vec![
        ProjectedColumn {
            column: "u.id".to_string(),
            label: "u.id".to_string(),
        },
        ProjectedColumn {
            column: "p.title".to_string(),
            label: "p.title".to_string(),
        },
    ]);

    assert!(query
        .build_sql()
        .starts_with(r#"SELECT "u"."id" AS "u.id", "p"."title" AS "p.title" FROM"#));
}

#[test]
fn test_count_and_aggregate_projections() {
    let mut query = users_with_posts();
    query.projection = Projection::Count {
        distinct: Some("u.id".to_string()),
    };
    assert!(query.build_sql().starts_with(r#"SELECT COUNT(DISTINCT "u"."id") AS"#));

    query.projection = Projection::Aggregate {
        function: AggregateFunction::Avg,
        column: "p.score".to_string(),
    };
    assert!(query.build_sql().starts_with(r#"SELECT AVG("p"."score") AS"#));
}

#[test]
fn test_paged_select() {
    let mut query = SelectCommand::new("posts", "posts");
    query.order_by.push(OrderBy::asc("posts.id"));
    query.pagination = Some(Pagination::new(Some(3), 2));

    assert!(query
        .build_sql()
        .ends_with(r#"ORDER BY "posts"."id" ASC LIMIT 2 OFFSET 4"#));
}

#[test]
fn test_delete_command() {
    let command = DeleteCommand::new("comments", vec![WhereClause::eq("comments.id", json!(7))]);
    assert_eq!(
        command.build_sql(),
        r#"DELETE FROM "comments" AS "comments" WHERE "comments"."id" = 7"#
    );
}
