//! SQL rendering: the shared dialect contract and its backends.
//!
//! A dialect is pure: it turns a [`QuerySpec`] into a [`Rendered`] statement
//! (text plus named bindings) and never touches a connection beyond asking a
//! [`SchemaView`] whether an identifier is valid. The bulk of the contract is
//! implemented once as provided methods; [`MysqlDialect`] and
//! [`SqliteDialect`] supply only the parts that genuinely differ: quote
//! character, DSN shape, column-type templates, introspection queries.

mod mysql;
mod sqlite;

pub use mysql::MysqlDialect;
pub use sqlite::SqliteDialect;

use crate::connection::ConnectionConfig;
use crate::error::{Error, Result};
use crate::schema::SchemaView;
use crate::spec::{Join, QuerySpec, Rendered};
use crate::value::{Bindings, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// The supported backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dialect {
    Mysql,
    Sqlite,
}

impl Dialect {
    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Mysql => "mysql",
            Dialect::Sqlite => "sqlite",
        }
    }

    /// The rendering implementation for this backend.
    pub fn renderer(&self) -> &'static dyn SqlDialect {
        match self {
            Dialect::Mysql => &MysqlDialect,
            Dialect::Sqlite => &SqliteDialect,
        }
    }
}

impl FromStr for Dialect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "mysql" => Ok(Dialect::Mysql),
            "sqlite" => Ok(Dialect::Sqlite),
            other => Err(Error::InvalidDialect(other.to_string())),
        }
    }
}

/// Column types available to the DDL helpers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    /// Auto-incrementing integer primary key.
    Id,
    Varchar(u16),
    Text,
    Int,
    Timestamp,
    Bool,
}

/// One column in a table definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub ty: Option<ColumnType>,
    pub nullable: bool,
    pub default: Option<Value>,
    pub unique: bool,
    /// Name of the index key this column belongs to; columns sharing a key
    /// form one composite index.
    pub index: Option<String>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty: Some(ty),
            nullable: false,
            default: None,
            unique: false,
            index: None,
        }
    }

    /// A definition with no type yet; rendering one is a hard error.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: None,
            nullable: false,
            default: None,
            unique: false,
            index: None,
        }
    }

    pub fn id(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Id)
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn indexed(mut self, key: impl Into<String>) -> Self {
        self.index = Some(key.into());
        self
    }
}

/// The rendering contract.
///
/// Provided methods carry the shared assembly logic; required methods are the
/// per-backend hooks.
pub trait SqlDialect {
    fn name(&self) -> &'static str;

    /// The identifier-quoting character.
    fn quote_char(&self) -> char;

    /// Raw SQL for the database-side current timestamp.
    fn now_literal(&self) -> &'static str;

    /// Sentinel bound as LIMIT when only an offset was requested.
    fn unbounded_limit(&self) -> i64;

    /// Data-source string for this backend, without credentials. Validates
    /// that the config carries the fields the backend requires.
    fn dsn(&self, config: &ConnectionConfig) -> Result<String>;

    /// Introspection query listing all tables (single-column result).
    fn table_list_sql(&self) -> String;

    /// Introspection query listing the columns of `table`.
    fn column_list_sql(&self, table: &str) -> String;

    /// Result column carrying the column name in [`column_list_sql`] rows.
    ///
    /// [`column_list_sql`]: SqlDialect::column_list_sql
    fn column_label_key(&self) -> &'static str;

    /// DDL template for one column type.
    fn column_type_sql(&self, column: &str, ty: &ColumnType) -> Result<String>;

    /// Whether plain (non-unique) indexes can live inside CREATE TABLE.
    fn inline_index_support(&self) -> bool;

    // --- shared contract -------------------------------------------------

    /// Quote an identifier, doubling embedded quote characters. The wildcard
    /// `*` is never quoted.
    fn quote_identifier(&self, name: &str) -> String {
        if name == "*" {
            return name.to_string();
        }
        let q = self.quote_char();
        let mut out = String::with_capacity(name.len() + 2);
        out.push(q);
        for c in name.chars() {
            out.push(c);
            if c == q {
                out.push(q);
            }
        }
        out.push(q);
        out
    }

    /// Exact inverse of [`quote_identifier`] for any identifier not
    /// containing an unescaped quote character.
    ///
    /// [`quote_identifier`]: SqlDialect::quote_identifier
    fn unquote_identifier(&self, name: &str) -> String {
        let q = self.quote_char();
        if name.len() >= 2 && name.starts_with(q) && name.ends_with(q) {
            let inner = &name[q.len_utf8()..name.len() - q.len_utf8()];
            let doubled: String = [q, q].iter().collect();
            inner.replace(&doubled, &q.to_string())
        } else {
            name.to_string()
        }
    }

    /// Split a possibly table-qualified identifier into `(table, column)`,
    /// defaulting the table when unqualified.
    fn split_identifier(&self, default_table: &str, name: &str) -> Result<(String, String)> {
        let parts: Vec<&str> = name.split('.').collect();
        match parts.as_slice() {
            [column] => Ok((
                default_table.to_string(),
                self.unquote_identifier(column.trim()),
            )),
            [table, column] => Ok((
                self.unquote_identifier(table.trim()),
                self.unquote_identifier(column.trim()),
            )),
            _ => Err(Error::InvalidIdentifier(name.to_string())),
        }
    }

    /// Validate a column against the schema and return its quoted, possibly
    /// table-qualified form. `None` when the identifier does not resolve.
    fn column_name(
        &self,
        schema: &dyn SchemaView,
        default_table: &str,
        column: &str,
        qualify: bool,
    ) -> Option<String> {
        let (table, col) = self.split_identifier(default_table, column).ok()?;
        let qualified = qualify || table != default_table;
        if col == "*" {
            return Some(if qualified {
                format!("{}.*", self.quote_identifier(&table))
            } else {
                "*".to_string()
            });
        }
        if !schema.has_column(&table, &col) {
            return None;
        }
        Some(if qualified {
            format!(
                "{}.{}",
                self.quote_identifier(&table),
                self.quote_identifier(&col)
            )
        } else {
            self.quote_identifier(&col)
        })
    }

    /// Assemble a SELECT from the spec, validating and qualifying each
    /// requested column and silently dropping unresolvable ones.
    fn select(&self, schema: &dyn SchemaView, spec: &mut QuerySpec) -> Result<Rendered> {
        let qualify = !spec.joins.is_empty();
        let mut rendered = Vec::with_capacity(spec.columns.len() + spec.select_exprs.len());
        for col in &spec.columns {
            if col == "*" {
                rendered.push("*".to_string());
            } else if let Some(name) = self.column_name(schema, &spec.table, col, qualify) {
                rendered.push(name);
            }
        }
        // Aggregate expressions are built by the crate, never taken from
        // caller input, so they bypass column validation.
        rendered.extend(spec.select_exprs.iter().cloned());
        let columns = if rendered.is_empty() {
            "*".to_string()
        } else {
            rendered.join(", ")
        };

        let mut sql = String::from("SELECT ");
        if spec.distinct {
            sql.push_str("DISTINCT ");
        }
        sql.push_str(&columns);
        sql.push_str(" FROM ");
        sql.push_str(&self.quote_identifier(&spec.table));
        sql.push_str(&self.join_clause(&spec.joins));
        sql.push_str(&self.where_clause(&spec.where_sql));
        sql.push_str(&self.group_clause(&spec.group_sql));
        sql.push_str(&self.having_clause(&spec.having_sql));
        sql.push_str(&self.order_clause(&spec.order_sql));
        let limit = self.limit_clause(spec.offset, spec.limit, &mut spec.bindings);
        sql.push_str(&limit);

        Ok(Rendered {
            query: sql,
            bindings: std::mem::take(&mut spec.bindings),
        })
    }

    fn insert(&self, schema: &dyn SchemaView, spec: &mut QuerySpec) -> Result<Rendered> {
        let values = std::mem::take(&mut spec.values);
        let (columns, binds) = self.value_list(schema, &spec.table, &values, &mut spec.bindings);
        if columns.is_empty() {
            return Err(Error::InvalidValue(format!(
                "no insertable values for table '{}'",
                spec.table
            )));
        }
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.quote_identifier(&spec.table),
            columns,
            binds
        );
        Ok(Rendered {
            query: sql,
            bindings: std::mem::take(&mut spec.bindings),
        })
    }

    fn update(&self, schema: &dyn SchemaView, spec: &mut QuerySpec) -> Result<Rendered> {
        let values = std::mem::take(&mut spec.values);
        let set = self.value_set(schema, &spec.table, &values, &mut spec.bindings);
        if set.is_empty() {
            return Err(Error::InvalidValue(format!(
                "no updatable values for table '{}'",
                spec.table
            )));
        }
        let mut sql = format!("UPDATE {} SET {}", self.quote_identifier(&spec.table), set);
        sql.push_str(&self.where_clause(&spec.where_sql));
        Ok(Rendered {
            query: sql,
            bindings: std::mem::take(&mut spec.bindings),
        })
    }

    fn delete(&self, spec: &mut QuerySpec) -> Result<Rendered> {
        let mut sql = format!("DELETE FROM {}", self.quote_identifier(&spec.table));
        sql.push_str(&self.where_clause(&spec.where_sql));
        Ok(Rendered {
            query: sql,
            bindings: std::mem::take(&mut spec.bindings),
        })
    }

    /// Render the insert-mode values: `(columns, binding placeholders)`.
    /// Columns absent from the schema are skipped entirely, not merely left
    /// unbound.
    fn value_list(
        &self,
        schema: &dyn SchemaView,
        table: &str,
        values: &[(String, Value)],
        bindings: &mut Bindings,
    ) -> (String, String) {
        let mut columns = Vec::with_capacity(values.len());
        let mut binds = Vec::with_capacity(values.len());
        for (column, value) in values {
            if !schema.has_column(table, column) {
                continue;
            }
            columns.push(self.quote_identifier(column));
            binds.push(self.value_expr(column, value.clone(), bindings));
        }
        (columns.join(", "), binds.join(", "))
    }

    /// Render the update-mode values: `col = bind, col2 = bind2`.
    fn value_set(
        &self,
        schema: &dyn SchemaView,
        table: &str,
        values: &[(String, Value)],
        bindings: &mut Bindings,
    ) -> String {
        let mut parts = Vec::with_capacity(values.len());
        for (column, value) in values {
            if !schema.has_column(table, column) {
                continue;
            }
            parts.push(format!(
                "{} = {}",
                self.quote_identifier(column),
                self.value_expr(column, value.clone(), bindings)
            ));
        }
        parts.join(", ")
    }

    /// The expression standing for one value: a binding placeholder, or raw
    /// SQL for the fixed literal passthroughs.
    fn value_expr(&self, label: &str, value: Value, bindings: &mut Bindings) -> String {
        match value {
            Value::Now => self.now_literal().to_string(),
            Value::Null => "NULL".to_string(),
            other => format!(":{}", bindings.add(label, other.encoded())),
        }
    }

    fn where_clause(&self, fragment: &str) -> String {
        if fragment.is_empty() {
            String::new()
        } else {
            format!(" WHERE {fragment}")
        }
    }

    fn having_clause(&self, fragment: &str) -> String {
        if fragment.is_empty() {
            String::new()
        } else {
            format!(" HAVING {fragment}")
        }
    }

    fn group_clause(&self, fragment: &str) -> String {
        if fragment.is_empty() {
            String::new()
        } else {
            format!(" GROUP BY {fragment}")
        }
    }

    fn order_clause(&self, fragment: &str) -> String {
        if fragment.is_empty() {
            String::new()
        } else {
            format!(" ORDER BY {fragment}")
        }
    }

    fn join_clause(&self, joins: &[Join]) -> String {
        let mut sql = String::new();
        for join in joins {
            sql.push(' ');
            sql.push_str(join.kind.as_sql());
            sql.push(' ');
            sql.push_str(&self.quote_identifier(&join.table));
            sql.push_str(" ON (");
            sql.push_str(&join.on);
            sql.push(')');
        }
        sql
    }

    /// Offset and limit are always bound as parameters, never interpolated.
    /// Renders nothing when the offset is 0 and no limit is set.
    fn limit_clause(&self, offset: u64, limit: Option<u64>, bindings: &mut Bindings) -> String {
        if offset == 0 && limit.is_none() {
            return String::new();
        }
        let limit_value = limit.map(|l| l as i64).unwrap_or(self.unbounded_limit());
        let limit_name = bindings.add("limit", Value::Int(limit_value));
        if offset == 0 {
            format!(" LIMIT :{limit_name}")
        } else {
            let offset_name = bindings.add("offset", Value::Int(offset as i64));
            format!(" LIMIT :{limit_name} OFFSET :{offset_name}")
        }
    }

    // --- DDL ---------------------------------------------------------------

    /// One column definition line.
    fn create_column(&self, def: &ColumnDef) -> Result<String> {
        let ty = def
            .ty
            .as_ref()
            .ok_or_else(|| Error::MissingColumnType(def.name.clone()))?;
        let mut sql = format!(
            "{} {}",
            self.quote_identifier(&def.name),
            self.column_type_sql(&def.name, ty)?
        );
        if matches!(ty, ColumnType::Id) {
            // The Id template carries its own constraints.
            return Ok(sql);
        }
        if !def.nullable {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &def.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&self.default_literal(&def.name, default)?);
        }
        if def.unique {
            sql.push_str(" UNIQUE");
        }
        Ok(sql)
    }

    /// The parenthesized body of a CREATE TABLE: column definitions followed
    /// by any inline index constraints, grouped per key name.
    fn create_table_inner(&self, cols: &[ColumnDef]) -> Result<String> {
        let mut parts = Vec::with_capacity(cols.len());
        for def in cols {
            parts.push(self.create_column(def)?);
        }
        if self.inline_index_support() {
            for (key, members) in index_groups(cols) {
                let quoted: Vec<String> =
                    members.iter().map(|c| self.quote_identifier(c)).collect();
                parts.push(format!(
                    "KEY {} ({})",
                    self.quote_identifier(&key),
                    quoted.join(", ")
                ));
            }
        }
        Ok(parts.join(",\n  "))
    }

    /// CREATE TABLE plus, for backends without inline index support, one
    /// CREATE INDEX statement per key.
    fn create_table(&self, table: &str, cols: &[ColumnDef]) -> Result<Vec<String>> {
        let inner = self.create_table_inner(cols)?;
        let mut statements = vec![format!(
            "CREATE TABLE {} (\n  {}\n)",
            self.quote_identifier(table),
            inner
        )];
        if !self.inline_index_support() {
            for (key, members) in index_groups(cols) {
                let quoted: Vec<String> =
                    members.iter().map(|c| self.quote_identifier(c)).collect();
                statements.push(format!(
                    "CREATE INDEX {} ON {} ({})",
                    self.quote_identifier(&format!("{table}_{key}")),
                    self.quote_identifier(table),
                    quoted.join(", ")
                ));
            }
        }
        Ok(statements)
    }

    fn drop_table(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", self.quote_identifier(table))
    }

    /// Literal rendering of a DDL default. Only scalars are representable.
    fn default_literal(&self, column: &str, value: &Value) -> Result<String> {
        match value {
            Value::Null => Ok("NULL".to_string()),
            Value::Bool(b) => Ok(if *b { "1" } else { "0" }.to_string()),
            Value::Int(n) => Ok(n.to_string()),
            Value::Float(n) => Ok(n.to_string()),
            Value::Text(s) => Ok(format!("'{}'", s.replace('\'', "''"))),
            Value::Now => Ok("CURRENT_TIMESTAMP".to_string()),
            Value::List(_) | Value::Bytes(_) => Err(Error::InvalidValue(format!(
                "default for column '{column}' must be a scalar"
            ))),
        }
    }
}

fn index_groups(cols: &[ColumnDef]) -> Vec<(String, Vec<String>)> {
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for def in cols {
        if let Some(key) = &def.index {
            groups.entry(key.clone()).or_default().push(def.name.clone());
        }
    }
    groups.into_iter().collect()
}
