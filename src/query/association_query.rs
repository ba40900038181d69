//! Queries scoped to one record's association.

use super::builder::Query;
use super::state::{Focus, QueryState};
use crate::engine::Engine;
use crate::error::CompilationError;
use crate::models::Record;
use crate::query_builder::conditions::qualify;
use crate::query_builder::WhereClause;

impl Engine {
    /// Query over the records `record.association` points at.
    ///
    /// The statement is rooted at the owner's table, pinned to the owner's
    /// primary key and inner joined along the association; rows are read
    /// from the association's alias. Builder calls and terminal methods
    /// apply to the association's target.
    pub fn association_query(&self, record: &Record, association: &str) -> Query {
        let owner = record.class_name();
        let table = match self.registry().class(owner) {
            Ok(class) => class.table.clone(),
            Err(err) => {
                let mut state = QueryState::new(owner, owner);
                state.defer(err.into());
                return Query::new(self.clone(), state);
            }
        };
        let root_alias = if table == association {
            format!("{table}_owner")
        } else {
            table
        };

        let mut state = QueryState::new(owner, &root_alias);
        state.focus = Some(Focus {
            association: association.to_string(),
            alias: association.to_string(),
        });
        match record.id() {
            Some(id) => {
                // stored qualified, so it is not re-qualified to the focus alias
                let pin =
                    WhereClause::eq(&qualify(&root_alias, record.primary_key_column()), id.clone());
                Query::new(self.clone(), state).where_clause(pin)
            }
            None => {
                state.defer(CompilationError::UnknownColumn {
                    model: owner.to_string(),
                    column: record.primary_key_column().to_string(),
                });
                Query::new(self.clone(), state)
            }
        }
    }
}
