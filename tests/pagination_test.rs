//! Offset and cursor pagination over the query facade.

use graphload_core::error::{CompilationError, GraphloadError};
use graphload_core::test_helpers::{fixtures, InMemoryDatabase};
use graphload_core::{Engine, PageRequest, Query, Record, ScrollRequest};
use serde_json::{json, Value};
use std::sync::Arc;

fn setup() -> Engine {
    let db = Arc::new(InMemoryDatabase::new());
    fixtures::seed(&db);
    fixtures::engine(db)
}

fn ids(records: &[Record]) -> Vec<i64> {
    records
        .iter()
        .filter_map(|r| r.id().and_then(Value::as_i64))
        .collect()
}

async fn scroll_all(query: &Query, page_size: u32) -> Vec<i64> {
    let mut seen = Vec::new();
    let mut cursor = None;
    loop {
        let page = query
            .scroll_paginate(ScrollRequest::new(page_size).after(cursor))
            .await
            .unwrap();
        assert!(page.results.len() <= page_size as usize);
        seen.extend(ids(&page.results));
        match page.cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    seen
}

#[tokio::test]
async fn test_two_pages_of_two() {
    let engine = setup();
    let posts = engine.query("Post").order_asc("id");

    let first = posts.paginate(PageRequest::new(2).page(1)).await.unwrap();
    assert_eq!(first.record_count, 4);
    assert_eq!(first.page_count, 2);
    assert_eq!(first.current_page, 1);
    assert_eq!(ids(&first.results), vec![10, 11]);

    let second = posts.paginate(PageRequest::new(2).page(2)).await.unwrap();
    assert_eq!(ids(&second.results), vec![12, 13]);
}

#[tokio::test]
async fn test_missing_or_zero_page_is_the_first_page() {
    let engine = setup();
    let posts = engine.query("Post").order_asc("id");

    for request in [PageRequest::new(2), PageRequest::new(2).page(0)] {
        let page = posts.paginate(request).await.unwrap();
        assert_eq!(page.current_page, 1);
        assert_eq!(ids(&page.results), vec![10, 11]);
    }
}

#[tokio::test]
async fn test_pages_concatenate_to_the_full_result() {
    let engine = setup();
    let posts = engine.query("Post").order_desc("score");
    let full = ids(&posts.all().await.unwrap());

    for size in 1..=5 {
        let first = posts.paginate(PageRequest::new(size)).await.unwrap();
        let mut collected = ids(&first.results);
        for page in 2..=first.page_count as u32 {
            let next = posts
                .paginate(PageRequest::new(size).page(page))
                .await
                .unwrap();
            collected.extend(ids(&next.results));
        }
        assert_eq!(collected, full, "page size {size}");
    }
}

#[tokio::test]
async fn test_page_beyond_the_end_is_empty() {
    let engine = setup();
    let page = engine
        .query("Post")
        .paginate(PageRequest::new(3).page(9))
        .await
        .unwrap();
    assert_eq!(page.page_count, 2);
    assert!(page.results.is_empty());
}

#[tokio::test]
async fn test_scroll_by_primary_key() {
    let engine = setup();
    let posts = engine.query("Post");

    let first = posts.scroll_paginate(ScrollRequest::new(3)).await.unwrap();
    assert_eq!(ids(&first.results), vec![10, 11, 12]);
    assert_eq!(first.cursor, Some(json!(12)));

    let rest = posts
        .scroll_paginate(ScrollRequest::new(3).after(first.cursor))
        .await
        .unwrap();
    assert_eq!(ids(&rest.results), vec![13]);
    assert_eq!(rest.cursor, None);
}

#[tokio::test]
async fn test_scroll_follows_the_explicit_order() {
    let engine = setup();
    let db = Arc::new(InMemoryDatabase::new());
    fixtures::seed(&db);
    // ties and a NULL on the sort column
    db.insert(
        "posts",
        json!({"id": 14, "user_id": 2, "title": "tie", "score": 4, "published": true}),
    );
    db.insert(
        "posts",
        json!({"id": 15, "user_id": 2, "title": "unscored", "score": null, "published": true}),
    );
    let engine_with_ties = fixtures::engine(db);

    for engine in [engine, engine_with_ties] {
        for query in [
            engine.query("Post").order_desc("score"),
            engine.query("Post").order_asc("score"),
            engine.query("Post").order_asc("published").order_desc("score"),
        ] {
            let full = ids(&query.clone().order_asc("id").all().await.unwrap());
            for size in 1..=4 {
                assert_eq!(scroll_all(&query, size).await, full, "page size {size}");
            }
        }
    }
}

#[tokio::test]
async fn test_scroll_with_filters_and_joins() {
    let engine = setup();
    let query = engine
        .query("Post")
        .joins("comments")
        .where_clause(graphload_core::query_builder::WhereClause::eq("published", true))
        .distinct();

    assert_eq!(scroll_all(&query, 1).await, vec![10, 13]);
}

#[tokio::test]
async fn test_pagination_rejects_explicit_limit_and_offset() {
    let engine = setup();

    let err = engine
        .query("Post")
        .limit(2)
        .paginate(PageRequest::new(2))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GraphloadError::Compilation(CompilationError::IncompatibleCombination(_))
    ));

    let err = engine
        .query("Post")
        .offset(1)
        .scroll_paginate(ScrollRequest::new(2))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GraphloadError::Compilation(CompilationError::IncompatibleCombination(_))
    ));
}

#[tokio::test]
async fn test_pagination_rejects_left_join_preload() {
    let engine = setup();

    for result in [
        engine
            .query("User")
            .left_join_preload(["posts"])
            .scroll_paginate(ScrollRequest::new(2))
            .await
            .map(|_| ()),
        engine
            .query("User")
            .left_join_preload(["posts"])
            .paginate(PageRequest::new(2))
            .await
            .map(|_| ()),
    ] {
        assert!(matches!(
            result,
            Err(GraphloadError::Compilation(
                CompilationError::IncompatibleCombination(_)
            ))
        ));
    }
}

#[tokio::test]
async fn test_zero_page_size_is_rejected() {
    let engine = setup();
    let err = engine
        .query("Post")
        .paginate(PageRequest::new(0))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GraphloadError::Compilation(CompilationError::InvalidPageSize(0))
    ));
}

#[tokio::test]
async fn test_paginated_results_carry_preloads() {
    let engine = setup();
    let page = engine
        .query("User")
        .preload(["posts"])
        .paginate(PageRequest::new(2))
        .await
        .unwrap();

    let counts: Vec<usize> = page
        .results
        .iter()
        .map(|u| u.many("posts").unwrap().len())
        .collect();
    assert_eq!(counts, vec![3, 1]);
}
