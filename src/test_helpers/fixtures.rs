//! Blog-style schema shared by unit and integration tests.
//!
//! ```text
//! User ──< Post ──< Comment
//!  │        ├──< Tagging >── Tag        (tags / distinct_tags through taggings)
//!  │        └──< Rating (rateable: Post | Composition)
//!  │                 ├── rateable_comments  (through rateable, Post only)
//!  │                 └── rateable_authors   (through rateable, ambiguous)
//!  ├──< Composition ──< Rating
//!  ├──< Balloon  (STI: Mylar, Latex ──> Animal)
//!  └──< Pet      (soft delete on deleted_at)
//! ```

use super::in_memory::InMemoryDatabase;
use crate::database::TransactionHandle;
use crate::engine::Engine;
use crate::error::ConfigurationError;
use crate::hooks::{HookError, LifecycleHooks};
use crate::models::{DbType, ModelClass, Record};
use crate::query_builder::Direction;
use crate::registry::{AssociationDescriptor as A, ModelRegistry, RegistryBuilder};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;

pub fn try_registry() -> Result<ModelRegistry, ConfigurationError> {
    let mut builder = RegistryBuilder::new();
    builder
        .register_model(
            ModelClass::new("User", "users")
                .column("id", DbType::BigInt)
                .column("name", DbType::Text)
                .column("email", DbType::Text),
        )?
        .register_model(
            ModelClass::new("Post", "posts")
                .column("id", DbType::BigInt)
                .column("user_id", DbType::BigInt)
                .column("title", DbType::Text)
                .column("score", DbType::Integer)
                .column("published", DbType::Boolean),
        )?
        .register_model(
            ModelClass::new("Comment", "comments")
                .column("id", DbType::BigInt)
                .column("post_id", DbType::BigInt)
                .column("body", DbType::Text),
        )?
        .register_model(
            ModelClass::new("Composition", "compositions")
                .column("id", DbType::BigInt)
                .column("user_id", DbType::BigInt)
                .column("name", DbType::Text),
        )?
        .register_model(
            ModelClass::new("Rating", "ratings")
                .column("id", DbType::BigInt)
                .column("rateable_id", DbType::BigInt)
                .column("rateable_type", DbType::Text)
                .column("rating", DbType::Integer),
        )?
        .register_model(
            ModelClass::new("Tag", "tags")
                .column("id", DbType::BigInt)
                .column("name", DbType::Text),
        )?
        .register_model(
            ModelClass::new("Tagging", "taggings")
                .column("id", DbType::BigInt)
                .column("post_id", DbType::BigInt)
                .column("tag_id", DbType::BigInt),
        )?
        .register_model(
            ModelClass::new("Balloon", "balloons")
                .column("id", DbType::BigInt)
                .column("user_id", DbType::BigInt)
                .column("color", DbType::Text)
                .column("type", DbType::Text)
                .sti_base(),
        )?
        .register_model(ModelClass::sti_child("Mylar", "Balloon", "Mylar"))?
        .register_model(ModelClass::sti_child("Latex", "Balloon", "Latex"))?
        .register_model(ModelClass::sti_child("Animal", "Latex", "Animal"))?
        .register_model(
            ModelClass::new("Pet", "pets")
                .column("id", DbType::BigInt)
                .column("user_id", DbType::BigInt)
                .column("name", DbType::Text)
                .column("deleted_at", DbType::Timestamp)
                .soft_delete("deleted_at"),
        )?;

    builder
        .register("User", A::has_many("posts", "Post").dependent_destroy())?
        .register("User", A::has_many_through("comments", "posts"))?
        .register("User", A::has_many("compositions", "Composition"))?
        .register("User", A::has_many("balloons", "Balloon"))?
        .register("User", A::has_many("pets", "Pet"))?
        .register("Post", A::belongs_to("user", "User"))?
        .register("Post", A::has_many("comments", "Comment").dependent_destroy())?
        .register("Post", A::has_many("taggings", "Tagging"))?
        .register("Post", A::has_many_through("tags", "taggings"))?
        .register(
            "Post",
            A::has_many_through("distinct_tags", "taggings")
                .source("tag")
                .distinct(),
        )?
        .register(
            "Post",
            A::has_many("ratings", "Rating")
                .polymorphic()
                .foreign_key("rateable_id"),
        )?
        .register(
            "Post",
            A::has_many("top_ratings", "Rating")
                .polymorphic()
                .foreign_key("rateable_id")
                .order("rating", Direction::Desc),
        )?
        .register("Comment", A::belongs_to("post", "Post"))?
        .register("Composition", A::belongs_to("user", "User"))?
        .register(
            "Composition",
            A::has_many("ratings", "Rating")
                .polymorphic()
                .foreign_key("rateable_id"),
        )?
        .register(
            "Rating",
            A::belongs_to_polymorphic("rateable", &["Post", "Composition"])
                .foreign_key("rateable_id"),
        )?
        .register(
            "Rating",
            A::has_many_through("rateable_comments", "rateable").source("comments"),
        )?
        .register(
            "Rating",
            A::has_many_through("rateable_authors", "rateable").source("user"),
        )?
        .register("Tagging", A::belongs_to("post", "Post"))?
        .register("Tagging", A::belongs_to("tag", "Tag"))?
        .register("Tag", A::has_many("taggings", "Tagging"))?
        .register("Balloon", A::belongs_to("user", "User"))?
        .register("Pet", A::belongs_to("user", "User"))?;

    builder.build()
}

pub fn registry() -> ModelRegistry {
    try_registry().expect("fixture registry should build")
}

pub fn engine(db: Arc<InMemoryDatabase>) -> Engine {
    Engine::new(registry(), db)
}

/// A record of `class` as if it had been fetched
pub fn record(class: &str, attributes: Value) -> Record {
    let attributes = attributes.as_object().cloned().unwrap_or_default();
    Record::new(class, "id", attributes)
}

/// Two authors with posts, comments, tags, ratings, balloons and pets;
/// a third user owns nothing
pub fn seed(db: &InMemoryDatabase) {
    db.insert_all(
        "users",
        vec![
            json!({"id": 1, "name": "ann", "email": "ann@example.com"}),
            json!({"id": 2, "name": "bob", "email": "bob@example.com"}),
            json!({"id": 3, "name": "cat", "email": null}),
        ],
    );
    db.insert_all(
        "posts",
        vec![
            json!({"id": 10, "user_id": 1, "title": "first", "score": 3, "published": true}),
            json!({"id": 11, "user_id": 1, "title": "second", "score": 5, "published": false}),
            json!({"id": 12, "user_id": 1, "title": "third", "score": 1, "published": true}),
            json!({"id": 13, "user_id": 2, "title": "bob's", "score": 4, "published": true}),
        ],
    );
    db.insert_all(
        "comments",
        vec![
            json!({"id": 100, "post_id": 10, "body": "nice"}),
            json!({"id": 101, "post_id": 10, "body": "agreed"}),
            json!({"id": 102, "post_id": 11, "body": "hm"}),
            json!({"id": 103, "post_id": 13, "body": "ok"}),
        ],
    );
    db.insert_all(
        "tags",
        vec![json!({"id": 1, "name": "rust"}), json!({"id": 2, "name": "sql"})],
    );
    db.insert_all(
        "taggings",
        vec![
            json!({"id": 1, "post_id": 10, "tag_id": 1}),
            json!({"id": 2, "post_id": 10, "tag_id": 1}),
            json!({"id": 3, "post_id": 10, "tag_id": 2}),
            json!({"id": 4, "post_id": 11, "tag_id": 2}),
        ],
    );
    db.insert_all(
        "compositions",
        vec![json!({"id": 20, "user_id": 1, "name": "sonata"})],
    );
    db.insert_all(
        "ratings",
        vec![
            json!({"id": 1, "rateable_id": 10, "rateable_type": "Post", "rating": 2}),
            json!({"id": 2, "rateable_id": 10, "rateable_type": "Post", "rating": 4}),
            json!({"id": 3, "rateable_id": 10, "rateable_type": "Post", "rating": 4}),
            json!({"id": 4, "rateable_id": 11, "rateable_type": "Post", "rating": 5}),
            json!({"id": 5, "rateable_id": 20, "rateable_type": "Composition", "rating": 3}),
            json!({"id": 6, "rateable_id": 10, "rateable_type": "Composition", "rating": 1}),
        ],
    );
    db.insert_all(
        "balloons",
        vec![
            json!({"id": 1, "user_id": 1, "color": "red", "type": "Mylar"}),
            json!({"id": 2, "user_id": 1, "color": "blue", "type": "Latex"}),
            json!({"id": 3, "user_id": 2, "color": "green", "type": "Animal"}),
        ],
    );
    db.insert_all(
        "pets",
        vec![
            json!({"id": 1, "user_id": 1, "name": "rex", "deleted_at": null}),
            json!({"id": 2, "user_id": 1, "name": "old", "deleted_at": "2024-01-01T00:00:00Z"}),
        ],
    );
}

/// Hooks that remember every destroyed record and can be told to fail
#[derive(Debug, Default)]
pub struct RecordingHooks {
    destroyed: Mutex<Vec<(String, Value)>>,
    fail_on: Mutex<Option<String>>,
}

impl RecordingHooks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// `(class, primary key)` of each destroyed record, in hook order
    pub fn destroyed(&self) -> Vec<(String, Value)> {
        self.destroyed.lock().clone()
    }

    pub fn fail_on(&self, class: &str) {
        *self.fail_on.lock() = Some(class.to_string());
    }
}

#[async_trait]
impl LifecycleHooks for RecordingHooks {
    async fn after_destroy(
        &self,
        record: &Record,
        _transaction: Option<&TransactionHandle>,
    ) -> Result<(), HookError> {
        if self.fail_on.lock().as_deref() == Some(record.class_name()) {
            return Err(format!("refusing to destroy {}", record.class_name()).into());
        }
        self.destroyed.lock().push((
            record.class_name().to_string(),
            record.id().cloned().unwrap_or(Value::Null),
        ));
        Ok(())
    }
}
