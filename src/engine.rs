//! # Engine
//!
//! The process-wide entry point: a frozen [`ModelRegistry`], the SQL
//! execution layer, the lifecycle hook collaborator and the engine
//! configuration, shared behind `Arc`s. Cloning an engine is cheap and
//! every [`Query`] carries its own clone.

use crate::config::EngineConfig;
use crate::database::executor::run_delete;
use crate::database::{SqlExecutor, TransactionHandle};
use crate::error::{CompilationError, GraphloadError, Result};
use crate::hooks::{LifecycleHooks, NoopHooks};
use crate::logging::log_preload_operation;
use crate::models::{value_key, Record};
use crate::preload::{self, build_tree, PreloadArg, PreloadContext, PreloadNode, PreloadStrategy};
use crate::query::{Query, QueryState};
use crate::query_builder::conditions::qualify;
use crate::query_builder::{DeleteCommand, WhereClause};
use crate::registry::{Dependent, ModelRegistry};
use futures::future::{BoxFuture, FutureExt};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone)]
pub struct Engine {
    registry: Arc<ModelRegistry>,
    executor: Arc<dyn SqlExecutor>,
    hooks: Arc<dyn LifecycleHooks>,
    config: Arc<EngineConfig>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("models", &self.registry.class_names().count())
            .field("config", &self.config)
            .finish()
    }
}

impl Engine {
    pub fn new(registry: ModelRegistry, executor: Arc<dyn SqlExecutor>) -> Self {
        info!(
            models = registry.class_names().count(),
            "graphload engine initialized"
        );
        Self {
            registry: Arc::new(registry),
            executor,
            hooks: Arc::new(NoopHooks),
            config: Arc::new(EngineConfig::default()),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn LifecycleHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn executor(&self) -> &dyn SqlExecutor {
        self.executor.as_ref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn preload_context<'e>(
        &'e self,
        transaction: Option<&'e TransactionHandle>,
        passthrough: &'e Map<String, Value>,
    ) -> PreloadContext<'e> {
        PreloadContext {
            registry: &self.registry,
            executor: self.executor.as_ref(),
            transaction,
            passthrough,
            max_depth: self.config.max_association_depth,
            log_sql: self.config.log_sql,
        }
    }

    /// Query over every `class` row visible under its default scopes
    pub fn query(&self, class: &str) -> Query {
        match self.registry.class(class) {
            Ok(model) => Query::new(self.clone(), QueryState::new(class, &model.table)),
            Err(err) => {
                let mut state = QueryState::new(class, class);
                state.defer(err.into());
                Query::new(self.clone(), state)
            }
        }
    }

    /// Batch-load associations onto already-fetched records.
    ///
    /// Always issues fresh fetches; previously loaded values under the
    /// requested aliases are replaced, other loaded associations are kept.
    pub async fn load<I, A>(
        &self,
        records: &mut [Record],
        args: I,
        transaction: Option<&TransactionHandle>,
    ) -> Result<()>
    where
        I: IntoIterator<Item = A>,
        A: Into<PreloadArg>,
    {
        let args: Vec<PreloadArg> = args.into_iter().map(Into::into).collect();
        let nodes = build_tree(&args)?;
        self.validate_for(records, &nodes)?;
        if records.is_empty() || nodes.is_empty() {
            return Ok(());
        }

        let passthrough = Map::new();
        let ctx = self.preload_context(transaction, &passthrough);
        preload::preload(&ctx, records, &nodes).await?;
        log_preload_operation(
            PreloadStrategy::Batched.as_str(),
            records[0].class_name(),
            nodes.iter().map(PreloadNode::size).sum(),
            records.len(),
            "success",
        );
        Ok(())
    }

    /// Like [`Engine::load`], but each class's records are re-read once
    /// with the whole tree left joined into the same statement
    pub async fn left_join_load<I, A>(
        &self,
        records: &mut [Record],
        args: I,
        transaction: Option<&TransactionHandle>,
    ) -> Result<()>
    where
        I: IntoIterator<Item = A>,
        A: Into<PreloadArg>,
    {
        let args: Vec<PreloadArg> = args.into_iter().map(Into::into).collect();
        let nodes = build_tree(&args)?;
        self.validate_for(records, &nodes)?;
        if records.is_empty() || nodes.is_empty() {
            return Ok(());
        }

        let mut ids_by_class: HashMap<String, Vec<Value>> = HashMap::new();
        for record in records.iter() {
            if let Some(id) = record.id() {
                ids_by_class
                    .entry(record.class_name().to_string())
                    .or_default()
                    .push(id.clone());
            }
        }

        let mut reloaded: HashMap<(String, String), Record> = HashMap::new();
        for (class, ids) in ids_by_class {
            let primary_key = self.registry.class(&class)?.primary_key.clone();
            let mut query = self
                .query(&class)
                .without_default_scopes()
                .where_clause(WhereClause::in_condition(&primary_key, ids))
                .left_join_preload(args.clone());
            if let Some(tx) = transaction {
                query = query.transaction(tx);
            }
            for record in query.all().await? {
                if let Some(id) = record.id() {
                    reloaded.insert((class.clone(), value_key(id)), record.clone());
                }
            }
        }

        for record in records.iter_mut() {
            let Some(id) = record.id() else { continue };
            let key = (record.class_name().to_string(), value_key(id));
            let Some(source) = reloaded.get(&key) else { continue };
            for node in &nodes {
                if let Ok(value) = source.association(&node.alias) {
                    record.set_association(&node.alias, value.clone());
                }
            }
        }
        Ok(())
    }

    fn validate_for(
        &self,
        records: &[Record],
        nodes: &[PreloadNode],
    ) -> std::result::Result<(), CompilationError> {
        let classes: HashSet<&str> = records.iter().map(Record::class_name).collect();
        for class in classes {
            preload::validate(&self.registry, class, nodes)?;
        }
        Ok(())
    }

    /// Delete `record` and, depth first, every record reachable through
    /// `dependent: destroy` associations. Calls the lifecycle hooks once
    /// per deleted record and returns the number of deleted rows.
    pub async fn destroy(
        &self,
        record: &Record,
        transaction: Option<&TransactionHandle>,
    ) -> Result<u64> {
        let mut visited = HashSet::new();
        let deleted = self
            .destroy_cascade(record.clone(), transaction, &mut visited)
            .await?;
        info!(
            model = %record.class_name(),
            records = visited.len(),
            rows = deleted,
            "destroy completed"
        );
        Ok(deleted)
    }

    fn destroy_cascade<'a>(
        &'a self,
        record: Record,
        transaction: Option<&'a TransactionHandle>,
        visited: &'a mut HashSet<(String, String)>,
    ) -> BoxFuture<'a, Result<u64>> {
        async move {
            let class_name = record.class_name().to_string();
            let class = self.registry.class(&class_name)?;
            let Some(id) = record.id().cloned() else {
                return Err(CompilationError::UnknownColumn {
                    model: class_name,
                    column: record.primary_key_column().to_string(),
                }
                .into());
            };
            if !visited.insert((class_name.clone(), value_key(&id))) {
                return Ok(0);
            }

            let dependents: Vec<PreloadArg> = self
                .registry
                .associations_of(&class_name)
                .into_iter()
                .filter(|d| matches!(d.dependent, Some(Dependent::Destroy)))
                .map(|d| PreloadArg::new(&d.name))
                .collect();

            let mut deleted = 0;
            if !dependents.is_empty() {
                let nodes = build_tree(&dependents)?;
                let passthrough = Map::new();
                let mut owner = [record.clone()];
                {
                    let ctx = self.preload_context(transaction, &passthrough);
                    preload::preload(&ctx, &mut owner, &nodes).await?;
                }
                let [owner] = owner;
                for node in &nodes {
                    let children: Vec<Record> = owner
                        .association(&node.alias)?
                        .records()
                        .into_iter()
                        .cloned()
                        .collect();
                    debug!(
                        model = %class_name,
                        association = %node.association,
                        children = children.len(),
                        "destroying dependents"
                    );
                    for child in children {
                        deleted += self.destroy_cascade(child, transaction, visited).await?;
                    }
                }
            }

            let command = DeleteCommand::new(
                &class.table,
                vec![WhereClause::eq(&qualify(&class.table, &class.primary_key), id)],
            );
            deleted += run_delete(self.executor(), &command, transaction, self.config.log_sql).await?;

            self.hooks
                .after_destroy(&record, transaction)
                .await
                .map_err(|source| GraphloadError::Hook {
                    model: class_name,
                    source,
                })?;
            Ok(deleted)
        }
        .boxed()
    }
}
