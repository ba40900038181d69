use super::conditions::{quote_ident, WhereClause};

/// Represents different types of SQL JOINs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinType {
    Inner,
    Left,
}

impl JoinType {
    pub fn to_sql(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
        }
    }
}

/// One compiled hop of an association path.
///
/// Built while a single query is compiled and discarded once the SQL is
/// emitted.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinStep {
    pub from_alias: String,
    pub to_table: String,
    pub to_alias: String,
    pub join_type: JoinType,
    pub on: Vec<WhereClause>,
    /// Names of the default scopes folded into `on`
    pub applied_scopes: Vec<String>,
    /// Model class the joined rows marshal into
    pub target_class: String,
    /// Association that produced this step
    pub association: String,
}

impl JoinStep {
    /// Convert to SQL string
    pub fn to_sql(&self) -> String {
        let mut sql = format!(
            "{} {} AS {}",
            self.join_type.to_sql(),
            quote_ident(&self.to_table),
            quote_ident(&self.to_alias)
        );

        if self.on.is_empty() {
            sql.push_str(" ON 1=1");
        } else {
            let parts: Vec<String> = self.on.iter().map(WhereClause::to_sql).collect();
            sql.push_str(&format!(" ON {}", parts.join(" AND ")));
        }

        sql
    }

    /// Same table under the same alias with the same join condition
    pub fn is_same_join(&self, other: &JoinStep) -> bool {
        self.to_alias == other.to_alias && self.to_table == other.to_table && self.on == other.on
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_builder::conditions::Operator;

    fn posts_step(join_type: JoinType) -> JoinStep {
        JoinStep {
            from_alias: "users".to_string(),
            to_table: "posts".to_string(),
            to_alias: "posts".to_string(),
            join_type,
            on: vec![WhereClause::columns("posts.user_id", Operator::Eq, "users.id")],
            applied_scopes: Vec::new(),
            target_class: "Post".to_string(),
            association: "posts".to_string(),
        }
    }

    #[test]
    fn test_inner_join() {
        assert_eq!(
            posts_step(JoinType::Inner).to_sql(),
            r#"INNER JOIN "posts" AS "posts" ON "posts"."user_id" = "users"."id""#
        );
    }

    #[test]
    fn test_left_join_with_scope() {
        let mut step = posts_step(JoinType::Left);
        step.on.push(WhereClause::is_null("posts.deleted_at"));
        assert_eq!(
            step.to_sql(),
            r#"LEFT JOIN "posts" AS "posts" ON "posts"."user_id" = "users"."id" AND "posts"."deleted_at" IS NULL"#
        );
    }

    #[test]
    fn test_same_join_detection() {
        let a = posts_step(JoinType::Inner);
        let mut b = posts_step(JoinType::Inner);
        assert!(a.is_same_join(&b));
        b.to_table = "comments".to_string();
        assert!(!a.is_same_join(&b));
    }
}
