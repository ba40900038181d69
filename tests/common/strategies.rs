use proptest::prelude::*;
use proptest::strategy::Just;
use serde_json::{json, Value};

/// Association paths from `User` over the fixture schema, one to three hops
pub fn user_path_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("posts".to_string()),
        Just("comments".to_string()),
        Just("pets".to_string()),
        Just("balloons".to_string()),
        Just("compositions".to_string()),
        Just("posts.comments".to_string()),
        Just("posts.tags".to_string()),
        Just("posts.distinct_tags".to_string()),
        Just("posts.ratings".to_string()),
        Just("posts.taggings.tag".to_string()),
        Just("compositions.ratings".to_string()),
        Just("posts.comments.post".to_string()),
    ]
}

/// Preload argument sets for `User`; aliases stay unique per level
pub fn user_preload_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::sample::subsequence(
        vec![
            "posts.comments",
            "posts.distinct_tags",
            "posts.top_ratings",
            "pets",
            "balloons",
            "compositions.ratings",
        ],
        1..=4,
    )
    .prop_map(|paths| paths.into_iter().map(str::to_string).collect())
}

/// A score, sometimes NULL, for generated post rows
pub fn score_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        4 => (0i64..6).prop_map(|s| json!(s)),
        1 => Just(Value::Null),
    ]
}

/// Extra post rows for user 2 with ids starting at 100
pub fn extra_posts_strategy() -> impl Strategy<Value = Vec<Value>> {
    prop::collection::vec((score_strategy(), any::<bool>()), 0..8).prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(index, (score, published))| {
                json!({
                    "id": 100 + index as i64,
                    "user_id": 2,
                    "title": format!("generated {index}"),
                    "score": score,
                    "published": published,
                })
            })
            .collect()
    })
}

/// Explicit `(column, descending)` orderings over post columns
pub fn post_order_strategy() -> impl Strategy<Value = Vec<(String, bool)>> {
    prop::collection::vec(
        (
            prop_oneof![
                Just("score".to_string()),
                Just("published".to_string()),
                Just("user_id".to_string()),
            ],
            any::<bool>(),
        ),
        0..3,
    )
}
