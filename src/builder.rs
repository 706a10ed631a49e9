//! The fluent per-table query builder.
//!
//! A [`QueryBuilder`] is bound to one [`Connection`] and one validated base
//! table. Chainable setters accumulate a [`QuerySpec`]; terminal calls render
//! it through the active dialect, execute it, and reset every clause except
//! the base table. Chainers never panic and never fail: the first validation
//! problem is stashed and surfaced by the terminal call, before any SQL is
//! sent.
//!
//! Conditions come in several calling conventions, unified by the
//! [`IntoCondition`] trait:
//!
//! ```no_run
//! # use quern::{Connection, nested, bound};
//! # fn demo(conn: &Connection) -> quern::Result<()> {
//! let mut q = conn.table("users")?;
//! q.filter("deleted_at IS NULL")                  // raw fragment
//!     .filter([("role", "admin")])                // column/value pairs
//!     .filter(("logins >= ?", 10))                // positional parameter
//!     .filter(bound("name LIKE :pat", [("pat", "a%")])) // named parameters
//!     .filter(("id", "not in", vec![1i64, 2]))    // column, operator, value
//!     .or_filter(nested(|q| {                     // parenthesized group
//!         q.filter([("role", "editor")]).or_filter([("role", "owner")]);
//!     }));
//! # Ok(())
//! # }
//! ```

use crate::connection::Connection;
use crate::dialect::SqlDialect;
use crate::driver::{ExecResult, Row};
use crate::error::{Error, Result};
use crate::schema::SchemaView;
use crate::spec::{Combine, Join, JoinKind, Operator, QuerySpec, Rendered};
use crate::value::{Bindings, Value};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Pagination metadata attached to a paged [`RowSet`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    /// Full matching count, ignoring offset and limit.
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
    pub offset: u64,
}

/// An ordered collection of result rows, optionally carrying page metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    rows: Vec<Row>,
    page: Option<PageInfo>,
}

impl RowSet {
    fn plain(rows: Vec<Row>) -> Self {
        Self { rows, page: None }
    }

    fn paged(rows: Vec<Row>, page: PageInfo) -> Self {
        Self {
            rows,
            page: Some(page),
        }
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn page_info(&self) -> Option<&PageInfo> {
        self.page.as_ref()
    }
}

impl std::ops::Deref for RowSet {
    type Target = [Row];

    fn deref(&self) -> &[Row] {
        &self.rows
    }
}

impl IntoIterator for RowSet {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

/// What a terminal call would have sent, captured in debug mode.
#[derive(Debug, Clone, PartialEq)]
pub struct DebugOutput {
    pub query: String,
    pub bindings: Bindings,
    pub options: DebugOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugOptions {
    pub kind: StatementKind,
    pub fail_on_error: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

enum Clause {
    Where,
    Having,
}

/// Fluent accumulator for one statement on one table.
pub struct QueryBuilder<'c> {
    conn: &'c Connection,
    table: String,
    primary_key: String,
    spec: QuerySpec,
    debug: bool,
    debug_output: Option<DebugOutput>,
    pending_error: Option<Error>,
}

impl std::fmt::Debug for QueryBuilder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("table", &self.table)
            .field("primary_key", &self.primary_key)
            .field("spec", &self.spec)
            .field("debug", &self.debug)
            .field("debug_output", &self.debug_output)
            .field("pending_error", &self.pending_error)
            .finish_non_exhaustive()
    }
}

impl<'c> QueryBuilder<'c> {
    /// `table` is the physical name, already validated by
    /// [`Connection::table`].
    pub(crate) fn new(conn: &'c Connection, table: String) -> Self {
        let spec = QuerySpec::new(table.clone());
        Self {
            conn,
            table,
            primary_key: "id".to_string(),
            spec,
            debug: false,
            debug_output: None,
            pending_error: None,
        }
    }

    /// The physical base table this builder is bound to.
    pub fn table(&self) -> &str {
        &self.table
    }

    // --- chainable setters -------------------------------------------------

    /// Restrict the selected columns. Unresolvable names are dropped at
    /// render time; an empty selection means `*`.
    pub fn select<S: AsRef<str>>(&mut self, columns: &[S]) -> &mut Self {
        self.spec.columns = columns.iter().map(|c| c.as_ref().to_string()).collect();
        self
    }

    pub fn distinct(&mut self, distinct: bool) -> &mut Self {
        self.spec.distinct = distinct;
        self
    }

    /// Join another table. The target is prefix-applied and validated; the ON
    /// fragment is used verbatim.
    pub fn join(&mut self, kind: JoinKind, table: &str, on: &str) -> &mut Self {
        if self.pending_error.is_some() {
            return self;
        }
        let physical = self.conn.physical_table(table);
        if !self.conn.validate_table(&physical) {
            self.pending_error = Some(self.conn.unknown_table_error(&physical));
            return self;
        }
        self.spec.joins.push(Join {
            kind,
            table: physical,
            on: on.to_string(),
        });
        self
    }

    pub fn left_join(&mut self, table: &str, on: &str) -> &mut Self {
        self.join(JoinKind::Left, table, on)
    }

    pub fn right_join(&mut self, table: &str, on: &str) -> &mut Self {
        self.join(JoinKind::Right, table, on)
    }

    pub fn inner_join(&mut self, table: &str, on: &str) -> &mut Self {
        self.join(JoinKind::Inner, table, on)
    }

    /// Stage column/value pairs for insert or update. Columns absent from
    /// the schema are skipped at render time.
    pub fn values<K, V, I>(&mut self, values: I) -> &mut Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        for (column, value) in values {
            self.spec.values.push((column.into(), value.into()));
        }
        self
    }

    /// Stage a single column/value pair.
    pub fn value(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        self.spec.values.push((column.to_string(), value.into()));
        self
    }

    /// Add a WHERE condition, AND-joined to whatever is already there.
    pub fn filter(&mut self, condition: impl IntoCondition) -> &mut Self {
        self.add_condition(condition, Combine::And, Clause::Where)
    }

    pub fn and_filter(&mut self, condition: impl IntoCondition) -> &mut Self {
        self.add_condition(condition, Combine::And, Clause::Where)
    }

    pub fn or_filter(&mut self, condition: impl IntoCondition) -> &mut Self {
        self.add_condition(condition, Combine::Or, Clause::Where)
    }

    /// Add a HAVING condition; same calling conventions as [`filter`].
    ///
    /// [`filter`]: QueryBuilder::filter
    pub fn having(&mut self, condition: impl IntoCondition) -> &mut Self {
        self.add_condition(condition, Combine::And, Clause::Having)
    }

    pub fn and_having(&mut self, condition: impl IntoCondition) -> &mut Self {
        self.add_condition(condition, Combine::And, Clause::Having)
    }

    pub fn or_having(&mut self, condition: impl IntoCondition) -> &mut Self {
        self.add_condition(condition, Combine::Or, Clause::Having)
    }

    /// Raw GROUP BY fragment.
    pub fn group(&mut self, fragment: &str) -> &mut Self {
        self.spec.group_sql = fragment.to_string();
        self
    }

    /// Raw ORDER BY fragment.
    pub fn order(&mut self, fragment: &str) -> &mut Self {
        self.spec.order_sql = fragment.to_string();
        self
    }

    pub fn offset(&mut self, offset: u64) -> &mut Self {
        self.spec.offset = offset;
        self
    }

    pub fn limit(&mut self, limit: u64) -> &mut Self {
        self.spec.limit = Some(limit);
        self
    }

    /// Override the primary key name used by [`find`] and [`column`].
    ///
    /// [`find`]: QueryBuilder::find
    /// [`column`]: QueryBuilder::column
    pub fn primary_key(&mut self, name: &str) -> &mut Self {
        self.primary_key = name.to_string();
        self
    }

    /// Make this statement propagate a driver failure instead of recording
    /// it in the trace.
    pub fn fail_on_error(&mut self, fail: bool) -> &mut Self {
        self.spec.fail_on_error = fail;
        self
    }

    /// When enabled, terminal calls render but do not execute; the rendered
    /// statement is retrievable via [`take_debug`].
    ///
    /// [`take_debug`]: QueryBuilder::take_debug
    pub fn debug(&mut self, debug: bool) -> &mut Self {
        self.debug = debug;
        self
    }

    pub fn take_debug(&mut self) -> Option<DebugOutput> {
        self.debug_output.take()
    }

    // --- terminal operations -----------------------------------------------

    /// Execute the accumulated SELECT and return every matching row.
    pub fn all(&mut self) -> Result<RowSet> {
        let result = self.do_rows();
        self.reset();
        result.map(RowSet::plain)
    }

    /// Like [`all`], decoding each row into a typed record.
    ///
    /// [`all`]: QueryBuilder::all
    pub fn all_as<T: DeserializeOwned>(&mut self) -> Result<Vec<T>> {
        let result = self.do_rows();
        self.reset();
        result?
            .iter()
            .map(|row| serde_json::from_value(row.to_json()).map_err(Error::from))
            .collect()
    }

    /// Execute with offset 0 and limit 1, returning the single row if any.
    pub fn first(&mut self) -> Result<Option<Row>> {
        self.spec.offset = 0;
        self.spec.limit = Some(1);
        let result = self.do_rows();
        self.reset();
        result.map(|rows| rows.into_iter().next())
    }

    /// Alias for [`first`].
    ///
    /// [`first`]: QueryBuilder::first
    pub fn row(&mut self) -> Result<Option<Row>> {
        self.first()
    }

    /// Alias for [`first`].
    ///
    /// [`first`]: QueryBuilder::first
    pub fn one(&mut self) -> Result<Option<Row>> {
        self.first()
    }

    /// Equality lookup on the primary key.
    pub fn find(&mut self, id: impl Into<Value>) -> Result<Option<Row>> {
        let primary_key = self.primary_key.clone();
        self.find_by(&primary_key, id)
    }

    /// Equality lookup on a named column.
    pub fn find_by(&mut self, column: &str, value: impl Into<Value>) -> Result<Option<Row>> {
        self.filter((column, Operator::Eq, value.into()));
        self.first()
    }

    /// Run a COUNT over the accumulated filters (order ignored), then the
    /// limited select for the requested page. Pages are numbered from 1.
    pub fn page(&mut self, page: u64, page_size: u64) -> Result<RowSet> {
        let result = self.do_page(page, page_size);
        self.reset();
        result
    }

    /// Fetch one column as a flat list, ordered by the primary key ascending
    /// so extraction and paging stay deterministic.
    pub fn column(&mut self, name: &str) -> Result<Vec<Value>> {
        let result = self.do_column(name);
        self.reset();
        result
    }

    pub fn count(&mut self) -> Result<i64> {
        let result = self.do_aggregate("COUNT", "*");
        self.reset();
        result.map(|value| scalar_i64(&value))
    }

    pub fn min(&mut self, column: &str) -> Result<Value> {
        let result = self.do_aggregate("MIN", column);
        self.reset();
        result
    }

    pub fn max(&mut self, column: &str) -> Result<Value> {
        let result = self.do_aggregate("MAX", column);
        self.reset();
        result
    }

    pub fn avg(&mut self, column: &str) -> Result<Value> {
        let result = self.do_aggregate("AVG", column);
        self.reset();
        result
    }

    pub fn sum(&mut self, column: &str) -> Result<Value> {
        let result = self.do_aggregate("SUM", column);
        self.reset();
        result
    }

    /// Execute an INSERT from the staged values. Returns the last-inserted
    /// id, or `None` when the failure was swallowed into the trace.
    pub fn insert(&mut self) -> Result<Option<i64>> {
        let result = self.do_statement(StatementKind::Insert);
        self.reset();
        result.map(|outcome| outcome.and_then(|r| r.last_insert_id))
    }

    /// Execute an UPDATE from the staged values and filters. `Ok(false)`
    /// means the failure was swallowed into the trace.
    pub fn update(&mut self) -> Result<bool> {
        let result = self.do_statement(StatementKind::Update);
        self.reset();
        result.map(|outcome| outcome.is_some())
    }

    /// Execute a DELETE constrained by the accumulated filters.
    pub fn delete(&mut self) -> Result<bool> {
        let result = self.do_statement(StatementKind::Delete);
        self.reset();
        result.map(|outcome| outcome.is_some())
    }

    // --- internals ---------------------------------------------------------

    fn add_condition(
        &mut self,
        condition: impl IntoCondition,
        joiner: Combine,
        clause: Clause,
    ) -> &mut Self {
        if self.pending_error.is_some() {
            return self;
        }
        let mut bindings = std::mem::take(&mut self.spec.bindings);
        let rendered = {
            let mut cx = ConditionCx {
                conn: self.conn,
                table: &self.table,
                bindings: &mut bindings,
            };
            condition.render(&mut cx)
        };
        self.spec.bindings = bindings;
        match rendered {
            Ok(fragment) => {
                let target = match clause {
                    Clause::Where => &mut self.spec.where_sql,
                    Clause::Having => &mut self.spec.having_sql,
                };
                QuerySpec::compose(target, &fragment, joiner);
            }
            Err(e) => self.pending_error = Some(e),
        }
        self
    }

    fn render(&mut self, kind: StatementKind) -> Result<Rendered> {
        if let Some(e) = self.pending_error.take() {
            return Err(e);
        }
        let dialect = self.conn.dialect().renderer();
        let schema: &dyn SchemaView = self.conn;
        match kind {
            StatementKind::Select => dialect.select(schema, &mut self.spec),
            StatementKind::Insert => dialect.insert(schema, &mut self.spec),
            StatementKind::Update => dialect.update(schema, &mut self.spec),
            StatementKind::Delete => dialect.delete(&mut self.spec),
        }
    }

    fn capture_debug(&mut self, kind: StatementKind, rendered: &Rendered) -> bool {
        if !self.debug {
            return false;
        }
        self.debug_output = Some(DebugOutput {
            query: rendered.query.clone(),
            bindings: rendered.bindings.clone(),
            options: DebugOptions {
                kind,
                fail_on_error: self.spec.fail_on_error,
            },
        });
        true
    }

    fn do_rows(&mut self) -> Result<Vec<Row>> {
        let rendered = self.render(StatementKind::Select)?;
        if self.capture_debug(StatementKind::Select, &rendered) {
            return Ok(Vec::new());
        }
        // The one-shot flag is always consumed, even when fail_on_error
        // already forces propagation for this statement.
        let one_shot = self.conn.take_fail_flag();
        let fail = self.spec.fail_on_error || one_shot;
        Ok(self
            .conn
            .try_query(&rendered.query, &rendered.bindings, fail)?
            .unwrap_or_default())
    }

    fn do_statement(&mut self, kind: StatementKind) -> Result<Option<ExecResult>> {
        let rendered = self.render(kind)?;
        if self.capture_debug(kind, &rendered) {
            return Ok(Some(ExecResult::default()));
        }
        let one_shot = self.conn.take_fail_flag();
        let fail = self.spec.fail_on_error || one_shot;
        self.conn
            .try_execute(&rendered.query, &rendered.bindings, fail)
    }

    fn do_page(&mut self, page: u64, page_size: u64) -> Result<RowSet> {
        let page = page.max(1);
        let offset = (page - 1) * page_size;

        if self.debug {
            self.spec.offset = offset;
            self.spec.limit = Some(page_size);
            let rendered = self.render(StatementKind::Select)?;
            self.capture_debug(StatementKind::Select, &rendered);
            return Ok(RowSet::paged(
                Vec::new(),
                PageInfo {
                    total: 0,
                    page,
                    page_size,
                    offset,
                },
            ));
        }

        if let Some(e) = self.pending_error.take() {
            return Err(e);
        }

        // COUNT over a clone of the accumulated spec, with any order cleared.
        let mut count_spec = self.spec.clone();
        count_spec.order_sql.clear();
        count_spec.offset = 0;
        count_spec.limit = None;
        count_spec.columns.clear();
        count_spec.select_exprs = vec!["COUNT(*) AS aggregation".to_string()];
        let dialect = self.conn.dialect().renderer();
        let counted = dialect.select(self.conn, &mut count_spec)?;

        // One take of the one-shot flag covers both statements of the page.
        let one_shot = self.conn.take_fail_flag();
        let fail = self.spec.fail_on_error || one_shot;
        let total = self
            .conn
            .try_query(&counted.query, &counted.bindings, fail)?
            .and_then(|rows| rows.into_iter().next())
            .and_then(|row| row.get("aggregation").cloned())
            .map(|value| scalar_i64(&value).max(0) as u64)
            .unwrap_or(0);

        self.spec.offset = offset;
        self.spec.limit = Some(page_size);
        let rendered = self.render(StatementKind::Select)?;
        let rows = self
            .conn
            .try_query(&rendered.query, &rendered.bindings, fail)?
            .unwrap_or_default();

        Ok(RowSet::paged(
            rows,
            PageInfo {
                total,
                page,
                page_size,
                offset,
            },
        ))
    }

    fn do_column(&mut self, name: &str) -> Result<Vec<Value>> {
        let dialect = self.conn.dialect().renderer();
        if dialect
            .column_name(self.conn, &self.table, name, false)
            .is_none()
        {
            return Err(self.conn.unknown_column_error(&self.table, name));
        }
        let order_column = dialect
            .column_name(self.conn, &self.table, &self.primary_key, false)
            .ok_or_else(|| self.conn.unknown_column_error(&self.table, &self.primary_key))?;
        self.spec.columns = vec![name.to_string()];
        self.spec.order_sql = format!("{order_column} ASC");
        let rows = self.do_rows()?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.into_values().next())
            .collect())
    }

    fn do_aggregate(&mut self, func: &str, column: &str) -> Result<Value> {
        let dialect = self.conn.dialect().renderer();
        let target = if column == "*" {
            "*".to_string()
        } else {
            dialect
                .column_name(self.conn, &self.table, column, false)
                .ok_or_else(|| self.conn.unknown_column_error(&self.table, column))?
        };
        self.spec.order_sql.clear();
        self.spec.columns.clear();
        self.spec.select_exprs = vec![format!("{func}({target}) AS aggregation")];
        self.spec.offset = 0;
        self.spec.limit = Some(1);
        let rows = self.do_rows()?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.get("aggregation").cloned())
            .unwrap_or(Value::Int(0)))
    }

    fn reset(&mut self) {
        self.spec = QuerySpec::new(self.table.clone());
        self.primary_key = "id".to_string();
        self.debug = false;
    }
}

fn scalar_i64(value: &Value) -> i64 {
    match value {
        Value::Int(n) => *n,
        Value::Float(f) => *f as i64,
        Value::Bool(b) => *b as i64,
        Value::Text(s) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

fn label_of(column: &str) -> &str {
    column.rsplit('.').next().unwrap_or(column)
}

/// Shared state handed to a condition while it renders: the dialect, the
/// schema whitelist, the default table, and the statement's bindings.
pub struct ConditionCx<'a> {
    conn: &'a Connection,
    table: &'a str,
    bindings: &'a mut Bindings,
}

impl ConditionCx<'_> {
    fn dialect(&self) -> &'static dyn SqlDialect {
        self.conn.dialect().renderer()
    }

    /// Validated, quoted, table-qualified column.
    fn column(&self, name: &str) -> Result<String> {
        self.dialect()
            .column_name(self.conn, self.table, name, true)
            .ok_or_else(|| self.conn.unknown_column_error(self.table, name))
    }
}

/// One calling convention for [`QueryBuilder::filter`] and
/// [`QueryBuilder::having`].
pub trait IntoCondition {
    fn render(self, cx: &mut ConditionCx<'_>) -> Result<String>;
}

/// Raw fragment, used verbatim.
impl IntoCondition for &str {
    fn render(self, _cx: &mut ConditionCx<'_>) -> Result<String> {
        Ok(self.to_string())
    }
}

impl IntoCondition for String {
    fn render(self, _cx: &mut ConditionCx<'_>) -> Result<String> {
        Ok(self)
    }
}

/// Column/value equality pairs, AND-joined. `Null` renders as `IS NULL`.
impl<'s, V: Into<Value>, const N: usize> IntoCondition for [(&'s str, V); N] {
    fn render(self, cx: &mut ConditionCx<'_>) -> Result<String> {
        pairs_condition(self.into_iter().map(|(c, v)| (c, v.into())), cx)
    }
}

impl<'s, V: Into<Value>> IntoCondition for Vec<(&'s str, V)> {
    fn render(self, cx: &mut ConditionCx<'_>) -> Result<String> {
        pairs_condition(self.into_iter().map(|(c, v)| (c, v.into())), cx)
    }
}

/// Fragment with a single positional parameter: the first `?` is replaced by
/// a generated binding.
impl<'a, V: Into<Value>> IntoCondition for (&'a str, V) {
    fn render(self, cx: &mut ConditionCx<'_>) -> Result<String> {
        let (fragment, value) = self;
        if !fragment.contains('?') {
            return Err(Error::InvalidValue(format!(
                "fragment '{fragment}' has no ? placeholder"
            )));
        }
        let expr = cx.dialect().value_expr("param", value.into(), cx.bindings);
        Ok(fragment.replacen('?', &expr, 1))
    }
}

/// `column, operator, value` with the operator parsed from text.
impl<'a, 'b, V: Into<Value>> IntoCondition for (&'a str, &'b str, V) {
    fn render(self, cx: &mut ConditionCx<'_>) -> Result<String> {
        let operator: Operator = self.1.parse()?;
        triple_condition(self.0, operator, self.2.into(), cx)
    }
}

impl<'a, V: Into<Value>> IntoCondition for (&'a str, Operator, V) {
    fn render(self, cx: &mut ConditionCx<'_>) -> Result<String> {
        triple_condition(self.0, self.1, self.2.into(), cx)
    }
}

fn pairs_condition<'s>(
    pairs: impl IntoIterator<Item = (&'s str, Value)>,
    cx: &mut ConditionCx<'_>,
) -> Result<String> {
    let mut parts = Vec::new();
    for (column, value) in pairs {
        let column_sql = cx.column(column)?;
        let part = match value {
            Value::Null => format!("{column_sql} IS NULL"),
            other => {
                let expr = cx.dialect().value_expr(label_of(column), other, cx.bindings);
                format!("{column_sql} = {expr}")
            }
        };
        parts.push(part);
    }
    Ok(parts.join(" AND "))
}

fn triple_condition(
    column: &str,
    operator: Operator,
    value: Value,
    cx: &mut ConditionCx<'_>,
) -> Result<String> {
    let column_sql = cx.column(column)?;
    let label = label_of(column);
    match operator {
        Operator::In | Operator::NotIn => {
            let Value::List(items) = value else {
                return Err(Error::InvalidValue(format!(
                    "{operator} requires a list of values"
                )));
            };
            if items.is_empty() {
                return Err(Error::InvalidValue(format!(
                    "{operator} requires a non-empty list"
                )));
            }
            let exprs: Vec<String> = items
                .into_iter()
                .map(|item| cx.dialect().value_expr(label, item, cx.bindings))
                .collect();
            Ok(format!("{column_sql} {operator} ({})", exprs.join(", ")))
        }
        Operator::Between | Operator::NotBetween => {
            let Value::List(items) = value else {
                return Err(Error::InvalidValue(format!(
                    "{operator} requires a two-element list"
                )));
            };
            let [low, high] = <[Value; 2]>::try_from(items).map_err(|_| {
                Error::InvalidValue(format!("{operator} requires exactly two bounds"))
            })?;
            let low = cx.dialect().value_expr(label, low, cx.bindings);
            let high = cx.dialect().value_expr(label, high, cx.bindings);
            Ok(format!("{column_sql} {operator} {low} AND {high}"))
        }
        _ => {
            if matches!(value, Value::List(_)) {
                return Err(Error::InvalidValue(format!(
                    "list values require IN, NOT IN, BETWEEN or NOT BETWEEN, got {operator}"
                )));
            }
            match (operator, &value) {
                (Operator::Eq | Operator::Is, Value::Null) => {
                    Ok(format!("{column_sql} IS NULL"))
                }
                (Operator::Ne | Operator::IsNot, Value::Null) => {
                    Ok(format!("{column_sql} IS NOT NULL"))
                }
                _ => {
                    let expr = cx.dialect().value_expr(label, value, cx.bindings);
                    Ok(format!("{column_sql} {operator} {expr}"))
                }
            }
        }
    }
}

/// Parenthesized sub-expression built on a child builder; see [`nested`].
pub struct Nested<F>(F);

/// Build a parenthesized condition group with its own builder on the same
/// table. The group's bindings are merged into the parent statement.
pub fn nested<F>(f: F) -> Nested<F>
where
    F: for<'a, 'b> FnOnce(&'a mut QueryBuilder<'b>),
{
    Nested(f)
}

impl<F> IntoCondition for Nested<F>
where
    F: for<'a, 'b> FnOnce(&'a mut QueryBuilder<'b>),
{
    fn render(self, cx: &mut ConditionCx<'_>) -> Result<String> {
        let mut child = QueryBuilder::new(cx.conn, cx.table.to_string());
        (self.0)(&mut child);
        if let Some(e) = child.pending_error.take() {
            return Err(e);
        }
        let fragment = std::mem::take(&mut child.spec.where_sql);
        if fragment.is_empty() {
            return Ok(String::new());
        }
        cx.bindings.merge(std::mem::take(&mut child.spec.bindings));
        Ok(format!("({fragment})"))
    }
}

/// Fragment with caller-supplied named bindings; see [`bound`].
pub struct Bound {
    fragment: String,
    params: Vec<(String, Value)>,
}

/// Attach a raw fragment together with named bindings. Names may carry the
/// leading `:` or not.
pub fn bound<K, V, I>(fragment: impl Into<String>, params: I) -> Bound
where
    K: Into<String>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    Bound {
        fragment: fragment.into(),
        params: params
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .collect(),
    }
}

impl IntoCondition for Bound {
    fn render(self, cx: &mut ConditionCx<'_>) -> Result<String> {
        for (name, value) in self.params {
            let name = name.trim_start_matches(':').to_string();
            cx.bindings.set(name, value.encoded());
        }
        Ok(self.fragment)
    }
}
