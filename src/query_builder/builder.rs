use super::conditions::{quote_column, quote_ident, WhereClause};
use super::joins::JoinStep;
use super::pagination::Pagination;
use crate::constants::projection_labels;

/// Sort direction of an ORDER BY entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn to_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// One ORDER BY entry over a (possibly alias-qualified) column
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderBy {
    pub column: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn asc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            direction: Direction::Desc,
        }
    }

    pub fn to_sql(&self) -> String {
        format!("{} {}", quote_column(&self.column), self.direction.to_sql())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Min,
    Max,
    Sum,
    Avg,
}

impl AggregateFunction {
    pub fn to_sql(&self) -> &'static str {
        match self {
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Avg => "AVG",
        }
    }
}

/// A projected column and the label it comes back under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectedColumn {
    pub column: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// Every column of one alias, returned under bare column names
    All(String),
    Columns(Vec<ProjectedColumn>),
    Count { distinct: Option<String> },
    Aggregate {
        function: AggregateFunction,
        column: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Distinct {
    #[default]
    None,
    All,
    On(Vec<String>),
}

/// Structured SELECT handed to the execution layer
///
/// The execution layer may render it with [`SelectCommand::build_sql`] or
/// evaluate the structure directly.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectCommand {
    pub table: String,
    pub alias: String,
    pub projection: Projection,
    pub joins: Vec<JoinStep>,
    pub where_clauses: Vec<WhereClause>,
    pub order_by: Vec<OrderBy>,
    pub pagination: Option<Pagination>,
    pub distinct: Distinct,
}

impl SelectCommand {
    /// Create a select over every column of `table` under `alias`
    pub fn new(table: &str, alias: &str) -> Self {
        Self {
            table: table.to_string(),
            alias: alias.to_string(),
            projection: Projection::All(alias.to_string()),
            joins: Vec::new(),
            where_clauses: Vec::new(),
            order_by: Vec::new(),
            pagination: None,
            distinct: Distinct::None,
        }
    }

    /// Build the complete SQL query string
    pub fn build_sql(&self) -> String {
        self.render(None)
    }

    /// Build the query with each ORDER BY column also projected as
    /// `{prefix}{index}`, so an enclosing SELECT can repeat the ordering.
    /// Counts and aggregates are rendered unchanged.
    pub fn build_sql_with_sort_keys(&self, prefix: &str) -> String {
        self.render(Some(prefix))
    }

    /// Whether [`SelectCommand::build_sql_with_sort_keys`] adds columns
    pub fn has_sort_keys(&self) -> bool {
        !self.order_by.is_empty()
            && matches!(self.projection, Projection::All(_) | Projection::Columns(_))
    }

    fn render(&self, sort_key_prefix: Option<&str>) -> String {
        let mut sql = String::from("SELECT ");

        match &self.distinct {
            Distinct::None => {}
            Distinct::All => sql.push_str("DISTINCT "),
            Distinct::On(columns) => {
                let quoted: Vec<String> = columns.iter().map(|c| quote_column(c)).collect();
                sql.push_str(&format!("DISTINCT ON ({}) ", quoted.join(", ")));
            }
        }

        sql.push_str(&self.projection_sql());
        if let Some(prefix) = sort_key_prefix.filter(|_| self.has_sort_keys()) {
            for (index, order) in self.order_by.iter().enumerate() {
                sql.push_str(&format!(
                    ", {} AS {}",
                    quote_column(&order.column),
                    quote_ident(&format!("{prefix}{index}"))
                ));
            }
        }

        sql.push_str(&format!(
            " FROM {} AS {}",
            quote_ident(&self.table),
            quote_ident(&self.alias)
        ));

        for join in &self.joins {
            sql.push(' ');
            sql.push_str(&join.to_sql());
        }

        if !self.where_clauses.is_empty() {
            sql.push_str(" WHERE ");
            let where_parts: Vec<String> =
                self.where_clauses.iter().map(WhereClause::to_sql).collect();
            sql.push_str(&where_parts.join(" AND "));
        }

        if !self.order_by.is_empty() {
            let order_parts: Vec<String> = self.order_by.iter().map(OrderBy::to_sql).collect();
            sql.push_str(&format!(" ORDER BY {}", order_parts.join(", ")));
        }

        if let Some(ref pagination) = self.pagination {
            sql.push_str(&pagination.to_sql());
        }

        sql
    }

    fn projection_sql(&self) -> String {
        match &self.projection {
            Projection::All(alias) => format!("{}.*", quote_ident(alias)),
            Projection::Columns(columns) => columns
                .iter()
                .map(|c| format!("{} AS {}", quote_column(&c.column), quote_ident(&c.label)))
                .collect::<Vec<_>>()
                .join(", "),
            Projection::Count { distinct: None } => {
                format!("COUNT(*) AS {}", quote_ident(projection_labels::COUNT))
            }
            Projection::Count {
                distinct: Some(column),
            } => format!(
                "COUNT(DISTINCT {}) AS {}",
                quote_column(column),
                quote_ident(projection_labels::COUNT)
            ),
            Projection::Aggregate { function, column } => format!(
                "{}({}) AS {}",
                function.to_sql(),
                quote_column(column),
                quote_ident(projection_labels::AGGREGATE)
            ),
        }
    }
}

/// Structured DELETE handed to the execution layer
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteCommand {
    pub table: String,
    pub where_clauses: Vec<WhereClause>,
}

impl DeleteCommand {
    pub fn new(table: &str, where_clauses: Vec<WhereClause>) -> Self {
        Self {
            table: table.to_string(),
            where_clauses,
        }
    }

    pub fn build_sql(&self) -> String {
        let mut sql = format!(
            "DELETE FROM {} AS {}",
            quote_ident(&self.table),
            quote_ident(&self.table)
        );
        if !self.where_clauses.is_empty() {
            let parts: Vec<String> = self.where_clauses.iter().map(WhereClause::to_sql).collect();
            sql.push_str(&format!(" WHERE {}", parts.join(" AND ")));
        }
        sql
    }
}
