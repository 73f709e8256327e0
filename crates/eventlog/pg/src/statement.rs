//! Fluent SQL statement builder.
//!
//! [`SqlBuilder`] accumulates a select list, a source (table or union of
//! other builders), joins, two predicate groups, ordering, limit and offset.
//! Predicates are written with `?` placeholders; [`SqlBuilder::render`]
//! replaces them with `$1..$n` and returns the values in the same order.
//!
//! The two predicate groups are combined as `(OR-group) AND (AND-group)`.
//! Identifiers (tables, columns) are trusted internal strings; only values
//! travel as parameters.
//!
//! ```ignore
//! let statement = SqlBuilder::new()
//!     .from("events")
//!     .where_and("events.context = ?", ["Order"])
//!     .order("events.global_position ASC")
//!     .limit(10)
//!     .render();
//! // SELECT * FROM events WHERE (events.context = $1) ORDER BY events.global_position ASC LIMIT 10
//! ```

use serde_json::Value;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::{Query, QueryAs};
use sqlx::{FromRow, PgExecutor, Postgres};
use uuid::Uuid;

/// Parameter list for predicates without placeholders.
pub const NO_VALUES: [SqlValue; 0] = [];

/// A statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(String),
    Int(i32),
    BigInt(i64),
    Uuid(Uuid),
    Json(Value),
    TextArray(Vec<String>),
    UuidArray(Vec<Uuid>),
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<&String> for SqlValue {
    fn from(value: &String) -> Self {
        SqlValue::Text(value.clone())
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Int(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::BigInt(value)
    }
}

impl From<Uuid> for SqlValue {
    fn from(value: Uuid) -> Self {
        SqlValue::Uuid(value)
    }
}

impl From<Value> for SqlValue {
    fn from(value: Value) -> Self {
        SqlValue::Json(value)
    }
}

impl From<Vec<String>> for SqlValue {
    fn from(value: Vec<String>) -> Self {
        SqlValue::TextArray(value)
    }
}

impl From<Vec<Uuid>> for SqlValue {
    fn from(value: Vec<Uuid>) -> Self {
        SqlValue::UuidArray(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Fragment {
    sql: String,
    values: Vec<SqlValue>,
}

impl Fragment {
    fn new<I, V>(sql: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        let values: Vec<SqlValue> = values.into_iter().map(Into::into).collect();
        debug_assert_eq!(
            sql.matches('?').count(),
            values.len(),
            "placeholder count mismatch in `{sql}`"
        );
        Self {
            sql: sql.to_string(),
            values,
        }
    }

    fn render(&self, params: &mut Vec<SqlValue>) -> String {
        let mut values = self.values.iter();
        let mut out = String::with_capacity(self.sql.len() + 8);
        for ch in self.sql.chars() {
            if ch == '?' {
                if let Some(value) = values.next() {
                    params.push(value.clone());
                    out.push('$');
                    out.push_str(&params.len().to_string());
                    continue;
                }
            }
            out.push(ch);
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Source {
    Table(String),
    Union { members: Vec<SqlBuilder>, alias: String },
}

/// Fluent builder of parameterized SELECT statements.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlBuilder {
    select: Vec<String>,
    source: Source,
    joins: Vec<Fragment>,
    where_and: Vec<Fragment>,
    where_or: Vec<Fragment>,
    order: Vec<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

impl Default for SqlBuilder {
    fn default() -> Self {
        Self {
            select: Vec::new(),
            source: Source::Table(String::new()),
            joins: Vec::new(),
            where_and: Vec::new(),
            where_or: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
        }
    }
}

impl SqlBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a selected expression. Selects `*` when none is added.
    pub fn select(mut self, expression: impl Into<String>) -> Self {
        self.select.push(expression.into());
        self
    }

    pub fn from(mut self, table: impl Into<String>) -> Self {
        self.source = Source::Table(table.into());
        self
    }

    /// Add a join clause, e.g. `LEFT JOIN partitions ON partitions.id = events.link_partition_id`.
    pub fn join<I, V>(mut self, clause: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        self.joins.push(Fragment::new(clause, values));
        self
    }

    /// Add a predicate to the AND-group.
    pub fn where_and<I, V>(mut self, predicate: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        self.where_and.push(Fragment::new(predicate, values));
        self
    }

    /// Add a predicate to the OR-group.
    pub fn where_or<I, V>(mut self, predicate: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        self.where_or.push(Fragment::new(predicate, values));
        self
    }

    pub fn order(mut self, clause: impl Into<String>) -> Self {
        self.order.push(clause.into());
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Combine builders with `UNION ALL` into a derived table.
    ///
    /// The columns of the union follow the first member's select list.
    /// Returns `None` for an empty list.
    pub fn union_all(members: Vec<SqlBuilder>) -> Option<SqlBuilder> {
        if members.is_empty() {
            return None;
        }
        Some(Self {
            source: Source::Union {
                members,
                alias: "combined".to_string(),
            },
            ..Self::default()
        })
    }

    /// Produce the SQL text and its ordered parameter values.
    pub fn render(&self) -> Statement {
        let mut values = Vec::new();
        let sql = self.render_into(&mut values);
        Statement { sql, values }
    }

    fn render_into(&self, params: &mut Vec<SqlValue>) -> String {
        let select = if self.select.is_empty() {
            "*".to_string()
        } else {
            self.select.join(", ")
        };

        let source = match &self.source {
            Source::Table(table) => table.clone(),
            Source::Union { members, alias } => {
                let parts: Vec<String> = members
                    .iter()
                    .map(|member| format!("({})", member.render_into(params)))
                    .collect();
                format!("({}) {}", parts.join(" UNION ALL "), alias)
            }
        };

        let mut sql = format!("SELECT {select} FROM {source}");

        for join in &self.joins {
            sql.push(' ');
            sql.push_str(&join.render(params));
        }

        let or_group = render_group(&self.where_or, " OR ", params);
        let and_group = render_group(&self.where_and, " AND ", params);
        match (or_group, and_group) {
            (Some(or_group), Some(and_group)) => {
                sql.push_str(&format!(" WHERE ({or_group}) AND ({and_group})"))
            }
            (Some(group), None) | (None, Some(group)) => {
                sql.push_str(&format!(" WHERE {group}"))
            }
            (None, None) => {}
        }

        if !self.order.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order.join(", "));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }
        sql
    }
}

fn render_group(
    fragments: &[Fragment],
    separator: &str,
    params: &mut Vec<SqlValue>,
) -> Option<String> {
    if fragments.is_empty() {
        return None;
    }
    let parts: Vec<String> = fragments
        .iter()
        .map(|fragment| format!("({})", fragment.render(params)))
        .collect();
    Some(parts.join(separator))
}

/// A rendered statement: SQL text with `$n` placeholders and its values.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

impl Statement {
    pub fn into_parts(self) -> (String, Vec<SqlValue>) {
        (self.sql, self.values)
    }

    /// Fetch every row mapped into `O`.
    pub async fn fetch_all<'e, O, E>(&self, executor: E) -> Result<Vec<O>, sqlx::Error>
    where
        O: for<'r> FromRow<'r, PgRow> + Send + Unpin,
        E: PgExecutor<'e>,
    {
        bind_query_as::<O>(&self.sql, &self.values)
            .fetch_all(executor)
            .await
    }

    /// Fetch at most one row mapped into `O`.
    pub async fn fetch_optional<'e, O, E>(&self, executor: E) -> Result<Option<O>, sqlx::Error>
    where
        O: for<'r> FromRow<'r, PgRow> + Send + Unpin,
        E: PgExecutor<'e>,
    {
        bind_query_as::<O>(&self.sql, &self.values)
            .fetch_optional(executor)
            .await
    }

    /// Execute the statement, returning the affected row count.
    pub async fn execute<'e, E>(&self, executor: E) -> Result<u64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        Ok(bind_query(&self.sql, &self.values)
            .execute(executor)
            .await?
            .rows_affected())
    }
}

/// Bind `values` in order onto a plain query.
pub fn bind_query<'q>(sql: &'q str, values: &[SqlValue]) -> Query<'q, Postgres, PgArguments> {
    let mut query = sqlx::query(sql);
    for value in values {
        query = match value.clone() {
            SqlValue::Text(v) => query.bind(v),
            SqlValue::Int(v) => query.bind(v),
            SqlValue::BigInt(v) => query.bind(v),
            SqlValue::Uuid(v) => query.bind(v),
            SqlValue::Json(v) => query.bind(v),
            SqlValue::TextArray(v) => query.bind(v),
            SqlValue::UuidArray(v) => query.bind(v),
        };
    }
    query
}

/// Bind `values` in order onto a query mapped into `O`.
pub fn bind_query_as<'q, O>(
    sql: &'q str,
    values: &[SqlValue],
) -> QueryAs<'q, Postgres, O, PgArguments>
where
    O: for<'r> FromRow<'r, PgRow>,
{
    let mut query = sqlx::query_as::<_, O>(sql);
    for value in values {
        query = match value.clone() {
            SqlValue::Text(v) => query.bind(v),
            SqlValue::Int(v) => query.bind(v),
            SqlValue::BigInt(v) => query.bind(v),
            SqlValue::Uuid(v) => query.bind(v),
            SqlValue::Json(v) => query.bind(v),
            SqlValue::TextArray(v) => query.bind(v),
            SqlValue::UuidArray(v) => query.bind(v),
        };
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_star_by_default() {
        let statement = SqlBuilder::new().from("events").render();
        assert_eq!(statement.sql, "SELECT * FROM events");
        assert!(statement.values.is_empty());
    }

    #[test]
    fn test_placeholders_are_numbered_in_order() {
        let statement = SqlBuilder::new()
            .select("id")
            .select("type")
            .from("events")
            .where_and("context = ? AND stream_name = ?", ["Order", "OrderCreated"])
            .where_and("stream_revision >= ?", [3])
            .order("stream_revision ASC")
            .limit(10)
            .offset(5)
            .render();

        assert_eq!(
            statement.sql,
            "SELECT id, type FROM events WHERE (context = $1 AND stream_name = $2) AND (stream_revision >= $3) \
             ORDER BY stream_revision ASC LIMIT 10 OFFSET 5"
        );
        assert_eq!(
            statement.values,
            vec![
                SqlValue::Text("Order".into()),
                SqlValue::Text("OrderCreated".into()),
                SqlValue::Int(3),
            ]
        );
    }

    #[test]
    fn test_or_group_is_combined_with_and_group() {
        let statement = SqlBuilder::new()
            .from("events")
            .where_and("type = ANY(?)", [vec!["A".to_string(), "B".to_string()]])
            .where_or("context = ?", ["Order"])
            .where_or("context = ?", ["Invoice"])
            .render();

        assert_eq!(
            statement.sql,
            "SELECT * FROM events WHERE ((context = $1) OR (context = $2)) AND ((type = ANY($3)))"
        );
        assert_eq!(statement.values.len(), 3);
        assert_eq!(statement.values[0], SqlValue::Text("Order".into()));
        assert_eq!(
            statement.values[2],
            SqlValue::TextArray(vec!["A".into(), "B".into()])
        );
    }

    #[test]
    fn test_or_group_alone() {
        let statement = SqlBuilder::new()
            .from("events")
            .where_or("context = ?", ["Order"])
            .where_or("context = ?", ["Invoice"])
            .render();
        assert_eq!(
            statement.sql,
            "SELECT * FROM events WHERE (context = $1) OR (context = $2)"
        );
    }

    #[test]
    fn test_join_parameters_precede_where_parameters() {
        let statement = SqlBuilder::new()
            .from("events")
            .join(
                "JOIN partitions ON partitions.context = events.context AND partitions.table_name = ?",
                ["contexts_abc"],
            )
            .where_and("events.stream_id = ?", ["1"])
            .render();

        assert!(statement.sql.contains("partitions.table_name = $1"));
        assert!(statement.sql.ends_with("WHERE (events.stream_id = $2)"));
    }

    #[test]
    fn test_union_numbering_continues_across_members() {
        let first = SqlBuilder::new()
            .select("id")
            .from("event_types_aaaaaa")
            .where_and("stream_id = ?", ["1"])
            .limit(1);
        let second = SqlBuilder::new()
            .select("id")
            .from("event_types_bbbbbb")
            .where_and("stream_id = ?", ["2"])
            .limit(1);

        let statement = SqlBuilder::union_all(vec![first, second])
            .unwrap()
            .where_and("id IS NOT NULL", NO_VALUES)
            .order("id")
            .render();

        assert_eq!(
            statement.sql,
            "SELECT * FROM ((SELECT id FROM event_types_aaaaaa WHERE (stream_id = $1) LIMIT 1) \
             UNION ALL (SELECT id FROM event_types_bbbbbb WHERE (stream_id = $2) LIMIT 1)) combined \
             WHERE (id IS NOT NULL) ORDER BY id"
        );
        assert_eq!(
            statement.into_parts().1,
            vec![SqlValue::Text("1".into()), SqlValue::Text("2".into())]
        );
    }

    #[test]
    fn test_union_of_nothing() {
        assert!(SqlBuilder::union_all(Vec::new()).is_none());
    }
}
