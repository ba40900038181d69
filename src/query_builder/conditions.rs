use serde_json::Value;

/// Comparison operators usable in a [`Condition`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
    ILike,
}

impl Operator {
    pub fn to_sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::NotEq => "<>",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Like => "LIKE",
            Operator::ILike => "ILIKE",
        }
    }
}

/// Represents different types of SQL conditions
///
/// Field names are either bare column names or `alias.column` references.
/// Bare names are qualified against a table alias by [`Condition::qualified`].
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Simple {
        field: String,
        operator: Operator,
        value: Value,
    },
    /// Column-to-column comparison, used for join conditions
    Columns {
        left: String,
        operator: Operator,
        right: String,
    },
    In {
        field: String,
        values: Vec<Value>,
    },
    NotIn {
        field: String,
        values: Vec<Value>,
    },
    Between {
        field: String,
        start: Value,
        end: Value,
    },
    IsNull {
        field: String,
    },
    IsNotNull {
        field: String,
    },
    Group(WhereClause),
    Raw {
        sql: String,
    },
}

impl Condition {
    /// Convert condition to SQL string
    pub fn to_sql(&self) -> String {
        match self {
            Condition::Simple {
                field,
                operator,
                value,
            } => {
                if value.is_null() {
                    // `= NULL` never matches; emit the null test instead
                    match operator {
                        Operator::NotEq => format!("{} IS NOT NULL", quote_column(field)),
                        _ => format!("{} IS NULL", quote_column(field)),
                    }
                } else {
                    format!(
                        "{} {} {}",
                        quote_column(field),
                        operator.to_sql(),
                        format_value(value)
                    )
                }
            }
            Condition::Columns {
                left,
                operator,
                right,
            } => format!(
                "{} {} {}",
                quote_column(left),
                operator.to_sql(),
                quote_column(right)
            ),
            Condition::In { field, values } => {
                if values.is_empty() {
                    return "1=0".to_string();
                }
                let value_list = values
                    .iter()
                    .map(format_value)
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{} IN ({value_list})", quote_column(field))
            }
            Condition::NotIn { field, values } => {
                if values.is_empty() {
                    return "1=1".to_string();
                }
                let value_list = values
                    .iter()
                    .map(format_value)
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{} NOT IN ({value_list})", quote_column(field))
            }
            Condition::Between { field, start, end } => {
                format!(
                    "{} BETWEEN {} AND {}",
                    quote_column(field),
                    format_value(start),
                    format_value(end)
                )
            }
            Condition::IsNull { field } => {
                format!("{} IS NULL", quote_column(field))
            }
            Condition::IsNotNull { field } => {
                format!("{} IS NOT NULL", quote_column(field))
            }
            Condition::Group(clause) => clause.to_sql(),
            Condition::Raw { sql } => sql.clone(),
        }
    }

    /// Prefix every bare field name with `alias`
    pub fn qualified(&self, alias: &str) -> Condition {
        match self {
            Condition::Simple {
                field,
                operator,
                value,
            } => Condition::Simple {
                field: qualify(alias, field),
                operator: *operator,
                value: value.clone(),
            },
            Condition::Columns {
                left,
                operator,
                right,
            } => Condition::Columns {
                left: qualify(alias, left),
                operator: *operator,
                right: qualify(alias, right),
            },
            Condition::In { field, values } => Condition::In {
                field: qualify(alias, field),
                values: values.clone(),
            },
            Condition::NotIn { field, values } => Condition::NotIn {
                field: qualify(alias, field),
                values: values.clone(),
            },
            Condition::Between { field, start, end } => Condition::Between {
                field: qualify(alias, field),
                start: start.clone(),
                end: end.clone(),
            },
            Condition::IsNull { field } => Condition::IsNull {
                field: qualify(alias, field),
            },
            Condition::IsNotNull { field } => Condition::IsNotNull {
                field: qualify(alias, field),
            },
            Condition::Group(clause) => Condition::Group(clause.qualified(alias)),
            Condition::Raw { sql } => Condition::Raw { sql: sql.clone() },
        }
    }

    /// Every field reference in this condition, recursively
    pub fn fields(&self) -> Vec<&str> {
        match self {
            Condition::Simple { field, .. }
            | Condition::In { field, .. }
            | Condition::NotIn { field, .. }
            | Condition::Between { field, .. }
            | Condition::IsNull { field }
            | Condition::IsNotNull { field } => vec![field.as_str()],
            Condition::Columns { left, right, .. } => vec![left.as_str(), right.as_str()],
            Condition::Group(clause) => clause.fields(),
            Condition::Raw { .. } => Vec::new(),
        }
    }
}

/// Represents a WHERE clause that can contain multiple conditions
#[derive(Debug, Clone, PartialEq)]
pub struct WhereClause {
    pub conditions: Vec<Condition>,
    pub operator: LogicalOperator,
    pub negated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOperator {
    And,
    Or,
}

impl WhereClause {
    fn single(condition: Condition) -> Self {
        Self {
            conditions: vec![condition],
            operator: LogicalOperator::And,
            negated: false,
        }
    }

    /// Create a simple WHERE clause with a single condition
    pub fn simple(field: &str, operator: Operator, value: Value) -> Self {
        Self::single(Condition::Simple {
            field: field.to_string(),
            operator,
            value,
        })
    }

    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self::simple(field, Operator::Eq, value.into())
    }

    pub fn not_eq(field: &str, value: impl Into<Value>) -> Self {
        Self::simple(field, Operator::NotEq, value.into())
    }

    /// Column-to-column comparison
    pub fn columns(left: &str, operator: Operator, right: &str) -> Self {
        Self::single(Condition::Columns {
            left: left.to_string(),
            operator,
            right: right.to_string(),
        })
    }

    /// Create WHERE IN clause
    pub fn in_condition(field: &str, values: Vec<Value>) -> Self {
        Self::single(Condition::In {
            field: field.to_string(),
            values,
        })
    }

    /// Create WHERE NOT IN clause
    pub fn not_in_condition(field: &str, values: Vec<Value>) -> Self {
        Self::single(Condition::NotIn {
            field: field.to_string(),
            values,
        })
    }

    pub fn between(field: &str, start: Value, end: Value) -> Self {
        Self::single(Condition::Between {
            field: field.to_string(),
            start,
            end,
        })
    }

    /// Create WHERE IS NULL clause
    pub fn is_null(field: &str) -> Self {
        Self::single(Condition::IsNull {
            field: field.to_string(),
        })
    }

    /// Create WHERE IS NOT NULL clause
    pub fn is_not_null(field: &str) -> Self {
        Self::single(Condition::IsNotNull {
            field: field.to_string(),
        })
    }

    /// Create raw SQL condition
    pub fn raw(sql: &str) -> Self {
        Self::single(Condition::Raw {
            sql: sql.to_string(),
        })
    }

    /// Build an equality clause from a JSON object of `column: value` pairs.
    ///
    /// Null values become `IS NULL` and arrays become `IN (...)`.
    pub fn matching(pairs: &Value) -> Self {
        let conditions = match pairs {
            Value::Object(map) => map
                .iter()
                .map(|(field, value)| match value {
                    Value::Null => Condition::IsNull {
                        field: field.clone(),
                    },
                    Value::Array(values) => Condition::In {
                        field: field.clone(),
                        values: values.clone(),
                    },
                    other => Condition::Simple {
                        field: field.clone(),
                        operator: Operator::Eq,
                        value: other.clone(),
                    },
                })
                .collect(),
            _ => Vec::new(),
        };
        Self::and(conditions)
    }

    /// Combine multiple conditions with AND
    pub fn and(conditions: Vec<Condition>) -> Self {
        Self {
            conditions,
            operator: LogicalOperator::And,
            negated: false,
        }
    }

    /// Combine multiple conditions with OR
    pub fn or(conditions: Vec<Condition>) -> Self {
        Self {
            conditions,
            operator: LogicalOperator::Or,
            negated: false,
        }
    }

    /// OR together whole clauses
    pub fn any(clauses: Vec<WhereClause>) -> Self {
        Self::or(clauses.into_iter().map(Condition::Group).collect())
    }

    /// Wrap this clause in NOT (...)
    pub fn negate(mut self) -> Self {
        self.negated = !self.negated;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn qualified(&self, alias: &str) -> Self {
        Self {
            conditions: self.conditions.iter().map(|c| c.qualified(alias)).collect(),
            operator: self.operator,
            negated: self.negated,
        }
    }

    pub fn fields(&self) -> Vec<&str> {
        self.conditions.iter().flat_map(|c| c.fields()).collect()
    }

    /// Convert to SQL string
    pub fn to_sql(&self) -> String {
        let body = if self.conditions.is_empty() {
            match self.operator {
                LogicalOperator::And => "1=1".to_string(),
                LogicalOperator::Or => "1=0".to_string(),
            }
        } else if self.conditions.len() == 1 {
            self.conditions[0].to_sql()
        } else {
            let operator_str = match self.operator {
                LogicalOperator::And => " AND ",
                LogicalOperator::Or => " OR ",
            };

            let condition_sqls: Vec<String> = self.conditions.iter().map(|c| c.to_sql()).collect();

            format!("({})", condition_sqls.join(operator_str))
        };

        if self.negated {
            format!("NOT ({body})")
        } else {
            body
        }
    }
}

impl From<Condition> for WhereClause {
    fn from(condition: Condition) -> Self {
        WhereClause::single(condition)
    }
}

/// Prefix a bare column with `alias`; `alias.column` references pass through
pub fn qualify(alias: &str, field: &str) -> String {
    if field.contains('.') {
        field.to_string()
    } else {
        format!("{alias}.{field}")
    }
}

/// Split `alias.column` into its parts
pub fn split_reference(field: &str) -> Option<(&str, &str)> {
    field.split_once('.')
}

/// Quote a single SQL identifier
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote a possibly alias-qualified column reference
pub fn quote_column(field: &str) -> String {
    if field == "*" {
        return field.to_string();
    }
    match split_reference(field) {
        Some((alias, "*")) => format!("{}.*", quote_ident(alias)),
        Some((alias, column)) => format!("{}.{}", quote_ident(alias), quote_ident(column)),
        None => quote_ident(field),
    }
}

/// Format a JSON value for SQL
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        _ => format!("'{}'", value.to_string().replace('\'', "''")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_simple_condition_sql() {
        let clause = WhereClause::eq("posts.title", "it's");
        assert_eq!(clause.to_sql(), r#""posts"."title" = 'it''s'"#);
    }

    #[test]
    fn test_null_equality_becomes_is_null() {
        let clause = WhereClause::eq("deleted_at", Value::Null);
        assert_eq!(clause.to_sql(), r#""deleted_at" IS NULL"#);
    }

    #[test]
    fn test_empty_in_never_matches() {
        let clause = WhereClause::in_condition("id", vec![]);
        assert_eq!(clause.to_sql(), "1=0");
    }

    #[test]
    fn test_qualification_leaves_references_alone() {
        let clause = WhereClause::and(vec![
            Condition::IsNull {
                field: "deleted_at".to_string(),
            },
            Condition::Simple {
                field: "p.name".to_string(),
                operator: Operator::Eq,
                value: json!("x"),
            },
        ])
        .qualified("users");
        assert_eq!(clause.fields(), vec!["users.deleted_at", "p.name"]);
    }

    #[test]
    fn test_negated_any() {
        let clause = WhereClause::any(vec![WhereClause::eq("a", 1), WhereClause::eq("b", 2)]).negate();
        assert_eq!(clause.to_sql(), r#"NOT (("a" = 1 OR "b" = 2))"#);
    }

    #[test]
    fn test_matching_object() {
        let clause = WhereClause::matching(&json!({"name": "Ann", "deleted_at": null, "id": [1, 2]}));
        let sql = clause.to_sql();
        assert!(sql.contains(r#""name" = 'Ann'"#));
        assert!(sql.contains(r#""deleted_at" IS NULL"#));
        assert!(sql.contains(r#""id" IN (1, 2)"#));
    }
}
