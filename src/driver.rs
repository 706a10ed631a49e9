//! Synchronous drivers behind the connection.
//!
//! A [`Driver`] runs one rendered statement at a time against a live handle
//! and converts backend rows into [`Row`]s. The connection decides failure
//! semantics (trace, swallow, one-shot fail); a driver only reports what the
//! backend said. [`SqliteDriver`] wraps `rusqlite`, [`MysqlDriver`] wraps the
//! sync `mysql` crate; both bind the `:name` placeholders produced by the
//! dialects as real driver-level parameters.

use crate::connection::ConnectionConfig;
use crate::error::{Error, Result};
use crate::value::{Bindings, Value};
use serde::ser::SerializeMap;
use serde::Serialize;

/// Outcome of a statement with no result set.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ExecResult {
    pub affected: u64,
    pub last_insert_id: Option<i64>,
}

/// One result row: column names in select order mapped to values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    entries: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, column: impl Into<String>, value: Value) {
        self.entries.push((column.into(), value));
    }

    /// Value of the named column, if present.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, value)| value)
    }

    pub fn into_values(self) -> impl Iterator<Item = Value> {
        self.entries.into_iter().map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The row as a JSON object, for decoding into typed records.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::with_capacity(self.entries.len());
        for (name, value) in &self.entries {
            let json = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
            map.insert(name.clone(), json);
        }
        serde_json::Value::Object(map)
    }
}

impl Serialize for Row {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<K: Into<String>, const N: usize> From<[(K, Value); N]> for Row {
    fn from(entries: [(K, Value); N]) -> Self {
        let mut row = Row::new();
        for (name, value) in entries {
            row.push(name, value);
        }
        row
    }
}

/// A synchronous database driver: one in-flight statement, blocking calls.
///
/// Implemented by the bundled [`SqliteDriver`] and [`MysqlDriver`]; tests
/// substitute their own scripted implementations.
pub trait Driver {
    /// Run a statement with no result set.
    fn execute(&mut self, sql: &str, bindings: &Bindings) -> Result<ExecResult>;

    /// Run a statement returning rows.
    fn query(&mut self, sql: &str, bindings: &Bindings) -> Result<Vec<Row>>;
}

fn driver_err(e: impl std::fmt::Display) -> Error {
    Error::Driver(e.to_string())
}

// --- SQLite ----------------------------------------------------------------

/// Driver over an embedded SQLite database (file-backed or in-memory).
pub struct SqliteDriver {
    handle: rusqlite::Connection,
}

impl SqliteDriver {
    pub fn open(config: &ConnectionConfig) -> Result<Self> {
        let handle = match &config.path {
            Some(path) => rusqlite::Connection::open(path),
            None => rusqlite::Connection::open_in_memory(),
        }
        .map_err(driver_err)?;
        Ok(Self { handle })
    }

    pub fn in_memory() -> Result<Self> {
        let handle = rusqlite::Connection::open_in_memory().map_err(driver_err)?;
        Ok(Self { handle })
    }
}

fn sqlite_value(value: &Value) -> Result<rusqlite::types::Value> {
    use rusqlite::types::Value as Sql;
    Ok(match value {
        Value::Null => Sql::Null,
        Value::Bool(b) => Sql::Integer(*b as i64),
        Value::Int(n) => Sql::Integer(*n),
        Value::Float(n) => Sql::Real(*n),
        Value::Text(s) => Sql::Text(s.clone()),
        Value::Bytes(b) => Sql::Blob(b.clone()),
        Value::List(_) => {
            let Value::Text(s) = value.clone().encoded() else {
                return Err(Error::InvalidValue("list value failed to encode".into()));
            };
            Sql::Text(s)
        }
        Value::Now => {
            return Err(Error::InvalidValue(
                "literal passthrough cannot be bound as a parameter".into(),
            ));
        }
    })
}

fn bind_sqlite(stmt: &mut rusqlite::Statement<'_>, bindings: &Bindings) -> Result<()> {
    for (name, value) in bindings.iter() {
        // Placeholders carry the `:` sigil at the SQL level.
        let index = stmt
            .parameter_index(&format!(":{name}"))
            .map_err(driver_err)?;
        if let Some(index) = index {
            stmt.raw_bind_parameter(index, sqlite_value(value)?)
                .map_err(driver_err)?;
        }
    }
    Ok(())
}

impl Driver for SqliteDriver {
    fn execute(&mut self, sql: &str, bindings: &Bindings) -> Result<ExecResult> {
        let mut stmt = self.handle.prepare(sql).map_err(driver_err)?;
        bind_sqlite(&mut stmt, bindings)?;
        let affected = stmt.raw_execute().map_err(driver_err)? as u64;
        drop(stmt);
        let rowid = self.handle.last_insert_rowid();
        Ok(ExecResult {
            affected,
            last_insert_id: (rowid != 0).then_some(rowid),
        })
    }

    fn query(&mut self, sql: &str, bindings: &Bindings) -> Result<Vec<Row>> {
        let mut stmt = self.handle.prepare(sql).map_err(driver_err)?;
        bind_sqlite(&mut stmt, bindings)?;
        let names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let mut out = Vec::new();
        let mut rows = stmt.raw_query();
        while let Some(row) = rows.next().map_err(driver_err)? {
            let mut shaped = Row::new();
            for (i, name) in names.iter().enumerate() {
                use rusqlite::types::ValueRef;
                let value = match row.get_ref(i).map_err(driver_err)? {
                    ValueRef::Null => Value::Null,
                    ValueRef::Integer(n) => Value::Int(n),
                    ValueRef::Real(f) => Value::Float(f),
                    ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
                    ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
                };
                shaped.push(name.clone(), value);
            }
            out.push(shaped);
        }
        Ok(out)
    }
}

// --- MySQL -----------------------------------------------------------------

/// Driver over a live MySQL server (TCP or unix socket).
pub struct MysqlDriver {
    handle: mysql::Conn,
}

impl MysqlDriver {
    pub fn open(config: &ConnectionConfig) -> Result<Self> {
        let mut opts = mysql::OptsBuilder::new()
            .db_name(config.database.clone())
            .user(config.user.clone())
            .pass(config.password.clone());
        if let Some(socket) = &config.socket {
            opts = opts.socket(Some(socket.clone()));
        } else {
            opts = opts.ip_or_hostname(config.host.clone());
            if let Some(port) = config.port {
                opts = opts.tcp_port(port);
            }
        }
        if let Some(charset) = &config.charset {
            opts = opts.init(vec![format!("SET NAMES {charset}")]);
        }
        let handle = mysql::Conn::new(opts).map_err(driver_err)?;
        Ok(Self { handle })
    }
}

fn mysql_value(value: &Value) -> Result<mysql::Value> {
    use mysql::Value as My;
    Ok(match value {
        Value::Null => My::NULL,
        Value::Bool(b) => My::Int(*b as i64),
        Value::Int(n) => My::Int(*n),
        Value::Float(n) => My::Double(*n),
        Value::Text(s) => My::Bytes(s.clone().into_bytes()),
        Value::Bytes(b) => My::Bytes(b.clone()),
        Value::List(_) => {
            let Value::Text(s) = value.clone().encoded() else {
                return Err(Error::InvalidValue("list value failed to encode".into()));
            };
            My::Bytes(s.into_bytes())
        }
        Value::Now => {
            return Err(Error::InvalidValue(
                "literal passthrough cannot be bound as a parameter".into(),
            ));
        }
    })
}

fn mysql_params(bindings: &Bindings) -> Result<mysql::Params> {
    if bindings.is_empty() {
        return Ok(mysql::Params::Empty);
    }
    let mut named = std::collections::HashMap::new();
    for (name, value) in bindings.iter() {
        named.insert(name.as_bytes().to_vec(), mysql_value(value)?);
    }
    Ok(mysql::Params::Named(named))
}

fn from_mysql(value: mysql::Value) -> Value {
    use mysql::Value as My;
    match value {
        My::NULL => Value::Null,
        My::Int(n) => Value::Int(n),
        My::UInt(n) => Value::Int(n as i64),
        My::Float(f) => Value::Float(f as f64),
        My::Double(f) => Value::Float(f),
        My::Bytes(b) => match String::from_utf8(b) {
            Ok(s) => Value::Text(s),
            Err(e) => Value::Bytes(e.into_bytes()),
        },
        My::Date(y, mo, d, h, mi, s, _) => {
            Value::Text(format!("{y:04}-{mo:02}-{d:02} {h:02}:{mi:02}:{s:02}"))
        }
        My::Time(neg, days, h, mi, s, _) => {
            let sign = if neg { "-" } else { "" };
            let hours = u32::from(h) + days * 24;
            Value::Text(format!("{sign}{hours:02}:{mi:02}:{s:02}"))
        }
    }
}

impl Driver for MysqlDriver {
    fn execute(&mut self, sql: &str, bindings: &Bindings) -> Result<ExecResult> {
        use mysql::prelude::Queryable;
        let result = self
            .handle
            .exec_iter(sql, mysql_params(bindings)?)
            .map_err(driver_err)?;
        Ok(ExecResult {
            affected: result.affected_rows(),
            last_insert_id: result.last_insert_id().map(|id| id as i64),
        })
    }

    fn query(&mut self, sql: &str, bindings: &Bindings) -> Result<Vec<Row>> {
        use mysql::prelude::Queryable;
        let result = self
            .handle
            .exec_iter(sql, mysql_params(bindings)?)
            .map_err(driver_err)?;
        let mut out = Vec::new();
        for row in result {
            let row = row.map_err(driver_err)?;
            let columns = row.columns();
            let values = row.unwrap();
            let mut shaped = Row::new();
            for (column, value) in columns.iter().zip(values) {
                shaped.push(column.name_str().into_owned(), from_mysql(value));
            }
            out.push(shaped);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_row_access() {
        let row = Row::from([("id", Value::Int(1)), ("name", Value::from("ada"))]);
        assert_eq!(row.get("name"), Some(&Value::Text("ada".into())));
        assert_eq!(row.get("ghost"), None);
        assert_eq!(row.columns().collect::<Vec<_>>(), vec!["id", "name"]);
        assert_eq!(
            row.to_json(),
            serde_json::json!({"id": 1, "name": "ada"})
        );
    }

    #[test]
    fn test_sqlite_execute_and_query() {
        let mut driver = SqliteDriver::in_memory().unwrap();
        driver
            .execute("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)", &Bindings::new())
            .unwrap();

        let mut bindings = Bindings::new();
        bindings.set("name", Value::from("ada"));
        let result = driver
            .execute("INSERT INTO t (name) VALUES (:name)", &bindings)
            .unwrap();
        assert_eq!(result.affected, 1);
        assert_eq!(result.last_insert_id, Some(1));

        let mut bindings = Bindings::new();
        bindings.set("id", Value::Int(1));
        let rows = driver
            .query("SELECT id, name FROM t WHERE id = :id", &bindings)
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("name"), Some(&Value::Text("ada".into())));
        assert_eq!(rows[0].get("id"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_sqlite_error_is_wrapped() {
        let mut driver = SqliteDriver::in_memory().unwrap();
        let err = driver.query("SELECT * FROM missing", &Bindings::new());
        assert!(matches!(err, Err(Error::Driver(_))));
    }

    #[test]
    fn test_unbound_literal_is_rejected() {
        assert!(sqlite_value(&Value::Now).is_err());
        assert!(mysql_value(&Value::Now).is_err());
        assert_eq!(
            sqlite_value(&Value::from(vec![1i64, 2])).unwrap(),
            rusqlite::types::Value::Text("[1,2]".into())
        );
    }
}
