//! The live connection: statement execution, result shaping, schema cache.
//!
//! A [`Connection`] owns a boxed [`Driver`] and is deliberately synchronous
//! and not `Sync`: it caches only the most recent statement outcome, so one
//! in-flight statement at a time is the contract. Side-by-side connections
//! are held in a [`Registry`] keyed by connection id.
//!
//! Failure semantics: by default a driver failure is recorded in the trace
//! and surfaced as an empty result; [`Connection::fail_on_next_query`] makes
//! the next statement propagate the error instead, and always resets after
//! one statement regardless of outcome.

use crate::builder::QueryBuilder;
use crate::dialect::{Dialect, SqlDialect};
use crate::driver::{Driver, ExecResult, MysqlDriver, Row, SqliteDriver};
use crate::error::{Error, Result};
use crate::schema::{did_you_mean, SchemaView};
use crate::value::Bindings;
use serde::de::DeserializeOwned;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Connection parameters. Immutable once a connection is opened.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    pub dialect: Dialect,
    /// Identifier for registry lookups when several connections coexist.
    pub id: String,
    pub host: Option<String>,
    pub socket: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub charset: Option<String>,
    /// Database file for file-backed SQLite; `None` means in-memory.
    pub path: Option<PathBuf>,
    /// Prepended to every logical table name before validation.
    pub prefix: String,
}

impl ConnectionConfig {
    fn base(dialect: Dialect) -> Self {
        Self {
            dialect,
            id: "default".to_string(),
            host: None,
            socket: None,
            port: None,
            database: None,
            user: None,
            password: None,
            charset: None,
            path: None,
            prefix: String::new(),
        }
    }

    pub fn mysql(database: impl Into<String>) -> Self {
        let mut config = Self::base(Dialect::Mysql);
        config.database = Some(database.into());
        config
    }

    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        let mut config = Self::base(Dialect::Sqlite);
        config.path = Some(path.into());
        config
    }

    pub fn sqlite_in_memory() -> Self {
        Self::base(Dialect::Sqlite)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_socket(mut self, socket: impl Into<String>) -> Self {
        self.socket = Some(socket.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }
}

/// One attempted statement: text, bindings, and the error if it failed.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceEntry {
    pub query: String,
    pub bindings: Bindings,
    pub error: Option<String>,
}

/// A live database connection with a cached table/column whitelist.
pub struct Connection {
    config: ConnectionConfig,
    driver: RefCell<Box<dyn Driver>>,
    tables: RefCell<Option<Vec<String>>>,
    columns: RefCell<BTreeMap<String, Vec<String>>>,
    trace: RefCell<Vec<TraceEntry>>,
    last_error: RefCell<Option<String>>,
    last_insert_id: Cell<Option<i64>>,
    last_affected: Cell<u64>,
    fail_next: Cell<bool>,
}

impl Connection {
    /// Open the driver the config's dialect calls for.
    ///
    /// The dialect's DSN builder validates the config first, so a missing
    /// host or database fails here with [`Error::Config`] before any I/O.
    pub fn connect(config: ConnectionConfig) -> Result<Self> {
        let dsn = config.dialect.renderer().dsn(&config)?;
        debug!(target: "quern", dsn = %dsn, id = %config.id, "connecting");
        let driver: Box<dyn Driver> = match config.dialect {
            Dialect::Sqlite => Box::new(SqliteDriver::open(&config)?),
            Dialect::Mysql => Box::new(MysqlDriver::open(&config)?),
        };
        Ok(Self::with_driver(config, driver))
    }

    /// Wrap an already-open driver. Used by tests and embedders that manage
    /// the handle themselves.
    pub fn with_driver(config: ConnectionConfig, driver: Box<dyn Driver>) -> Self {
        Self {
            config,
            driver: RefCell::new(driver),
            tables: RefCell::new(None),
            columns: RefCell::new(BTreeMap::new()),
            trace: RefCell::new(Vec::new()),
            last_error: RefCell::new(None),
            last_insert_id: Cell::new(None),
            last_affected: Cell::new(0),
            fail_next: Cell::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn dialect(&self) -> Dialect {
        self.config.dialect
    }

    /// The physical (prefix-applied) name of a logical table.
    pub fn physical_table(&self, name: &str) -> String {
        format!("{}{}", self.config.prefix, name)
    }

    /// Start a query on a table. The entry point for all building: the name
    /// is validated against the whitelist immediately and an unknown table is
    /// a hard error.
    pub fn table(&self, name: &str) -> Result<QueryBuilder<'_>> {
        let physical = self.physical_table(name);
        if !self.validate_table(&physical) {
            return Err(self.unknown_table_error(&physical));
        }
        Ok(QueryBuilder::new(self, physical))
    }

    // --- execution ---------------------------------------------------------

    /// Run a statement with no result set, returning the affected-row count.
    /// A swallowed failure returns `Ok(0)`.
    pub fn execute(&self, sql: &str, bindings: &Bindings) -> Result<u64> {
        let fail = self.take_fail_flag();
        Ok(self
            .try_execute(sql, bindings, fail)?
            .map(|result| result.affected)
            .unwrap_or(0))
    }

    /// Run a statement returning rows. A swallowed failure returns an empty
    /// list.
    pub fn query(&self, sql: &str, bindings: &Bindings) -> Result<Vec<Row>> {
        let fail = self.take_fail_flag();
        Ok(self.try_query(sql, bindings, fail)?.unwrap_or_default())
    }

    /// Like [`query`], decoding each row into a typed record.
    ///
    /// [`query`]: Connection::query
    pub fn query_as<T: DeserializeOwned>(&self, sql: &str, bindings: &Bindings) -> Result<Vec<T>> {
        self.query(sql, bindings)?
            .iter()
            .map(|row| serde_json::from_value(row.to_json()).map_err(Error::from))
            .collect()
    }

    /// `None` means the failure was swallowed into the trace.
    pub(crate) fn try_execute(
        &self,
        sql: &str,
        bindings: &Bindings,
        fail: bool,
    ) -> Result<Option<ExecResult>> {
        debug!(target: "quern", query = sql, bindings = bindings.len(), "execute");
        let outcome = self.driver.borrow_mut().execute(sql, bindings);
        match outcome {
            Ok(result) => {
                self.record(sql, bindings, None);
                self.last_affected.set(result.affected);
                if result.last_insert_id.is_some() {
                    self.last_insert_id.set(result.last_insert_id);
                }
                Ok(Some(result))
            }
            Err(e) => self.failed(sql, bindings, e, fail).map(|_| None),
        }
    }

    pub(crate) fn try_query(
        &self,
        sql: &str,
        bindings: &Bindings,
        fail: bool,
    ) -> Result<Option<Vec<Row>>> {
        debug!(target: "quern", query = sql, bindings = bindings.len(), "query");
        let outcome = self.driver.borrow_mut().query(sql, bindings);
        match outcome {
            Ok(rows) => {
                self.record(sql, bindings, None);
                Ok(Some(rows))
            }
            Err(e) => self.failed(sql, bindings, e, fail).map(|_| None),
        }
    }

    fn failed(&self, sql: &str, bindings: &Bindings, error: Error, fail: bool) -> Result<()> {
        let message = error.to_string();
        self.record(sql, bindings, Some(message.clone()));
        *self.last_error.borrow_mut() = Some(message);
        if fail {
            Err(error)
        } else {
            warn!(target: "quern", query = sql, error = %error, "statement failed, recorded in trace");
            Ok(())
        }
    }

    fn record(&self, sql: &str, bindings: &Bindings, error: Option<String>) {
        if error.is_none() {
            *self.last_error.borrow_mut() = None;
        }
        self.trace.borrow_mut().push(TraceEntry {
            query: sql.to_string(),
            bindings: bindings.clone(),
            error,
        });
    }

    // --- diagnostics -------------------------------------------------------

    /// Every attempted statement, success or failure, in order.
    pub fn trace(&self) -> Vec<TraceEntry> {
        self.trace.borrow().clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.borrow().clone()
    }

    pub fn last_insert_id(&self) -> Option<i64> {
        self.last_insert_id.get()
    }

    pub fn last_affected(&self) -> u64 {
        self.last_affected.get()
    }

    /// One-shot: make the next failed statement propagate instead of being
    /// swallowed into the trace.
    pub fn fail_on_next_query(&self, fail: bool) {
        self.fail_next.set(fail);
    }

    pub(crate) fn take_fail_flag(&self) -> bool {
        self.fail_next.replace(false)
    }

    // --- schema whitelist --------------------------------------------------

    /// Whether `table` exists in the live schema. Populates the whitelist on
    /// first call by issuing the dialect's table-listing query.
    pub fn validate_table(&self, table: &str) -> bool {
        self.table_names().iter().any(|name| name == table)
    }

    /// Whether `table.column` exists. False immediately when the table itself
    /// is unknown.
    pub fn validate_column(&self, table: &str, column: &str) -> bool {
        if !self.validate_table(table) {
            return false;
        }
        self.column_names(table).iter().any(|name| name == column)
    }

    /// Drop the cached whitelist, forcing re-introspection. Needed after DDL
    /// issued through this connection.
    pub fn refresh_schema(&self) {
        *self.tables.borrow_mut() = None;
        self.columns.borrow_mut().clear();
    }

    pub(crate) fn table_names(&self) -> Vec<String> {
        if let Some(tables) = self.tables.borrow().as_ref() {
            return tables.clone();
        }
        let sql = self.dialect().renderer().table_list_sql();
        let names: Vec<String> = self
            .introspect(&sql)
            .iter()
            .filter_map(|row| row.values().next())
            .filter_map(text_of)
            .collect();
        *self.tables.borrow_mut() = Some(names.clone());
        names
    }

    pub(crate) fn column_names(&self, table: &str) -> Vec<String> {
        if let Some(columns) = self.columns.borrow().get(table) {
            return columns.clone();
        }
        let renderer = self.dialect().renderer();
        let sql = renderer.column_list_sql(table);
        let label = renderer.column_label_key();
        let names: Vec<String> = self
            .introspect(&sql)
            .iter()
            .filter_map(|row| row.get(label).or_else(|| row.values().next()))
            .filter_map(text_of)
            .collect();
        self.columns
            .borrow_mut()
            .insert(table.to_string(), names.clone());
        names
    }

    /// Introspection bypasses the one-shot fail flag: it belongs to the next
    /// caller statement, not to whitelist population.
    fn introspect(&self, sql: &str) -> Vec<Row> {
        self.try_query(sql, &Bindings::new(), false)
            .unwrap_or_default()
            .unwrap_or_default()
    }

    pub(crate) fn unknown_table_error(&self, table: &str) -> Error {
        let names = self.table_names();
        Error::InvalidTable {
            table: table.to_string(),
            suggestion: did_you_mean(table, names.iter().map(String::as_str)),
        }
    }

    pub(crate) fn unknown_column_error(&self, table: &str, column: &str) -> Error {
        let names = self.column_names(table);
        Error::InvalidColumn {
            table: table.to_string(),
            column: column.to_string(),
            suggestion: did_you_mean(column, names.iter().map(String::as_str)),
        }
    }
}

impl SchemaView for Connection {
    fn has_table(&self, table: &str) -> bool {
        self.validate_table(table)
    }

    fn has_column(&self, table: &str, column: &str) -> bool {
        self.validate_column(table, column)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.config.id)
            .field("dialect", &self.config.dialect)
            .finish_non_exhaustive()
    }
}

fn text_of(value: &crate::value::Value) -> Option<String> {
    match value {
        crate::value::Value::Text(s) => Some(s.clone()),
        _ => None,
    }
}

/// Explicitly injected set of named connections.
///
/// Holds one [`Connection`] per id; callers pass the registry (or a borrowed
/// connection) to whatever needs database access instead of reaching for
/// process-global state.
#[derive(Debug, Default)]
pub struct Registry {
    connections: BTreeMap<String, Connection>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a connection and register it under its config id, replacing any
    /// previous connection with the same id.
    pub fn connect(&mut self, config: ConnectionConfig) -> Result<&Connection> {
        let connection = Connection::connect(config)?;
        Ok(self.insert(connection))
    }

    /// Register an already-built connection.
    pub fn insert(&mut self, connection: Connection) -> &Connection {
        let id = connection.id().to_string();
        self.connections.insert(id.clone(), connection);
        &self.connections[&id]
    }

    pub fn get(&self, id: &str) -> Option<&Connection> {
        self.connections.get(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<Connection> {
        self.connections.remove(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.connections.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use pretty_assertions::assert_eq;

    /// Scripted driver: canned introspection answers, optional failure on
    /// everything else.
    struct MockDriver {
        tables: Vec<&'static str>,
        columns: Vec<&'static str>,
        fail_statements: bool,
    }

    impl MockDriver {
        fn new() -> Self {
            Self {
                tables: vec!["users", "posts"],
                columns: vec!["id", "name", "role"],
                fail_statements: false,
            }
        }
    }

    impl Driver for MockDriver {
        fn execute(&mut self, _sql: &str, _bindings: &Bindings) -> crate::Result<ExecResult> {
            if self.fail_statements {
                return Err(Error::Driver("mock failure".into()));
            }
            Ok(ExecResult {
                affected: 1,
                last_insert_id: Some(42),
            })
        }

        fn query(&mut self, sql: &str, _bindings: &Bindings) -> crate::Result<Vec<Row>> {
            if sql.contains("sqlite_master") {
                return Ok(self
                    .tables
                    .iter()
                    .map(|name| Row::from([("name", Value::from(*name))]))
                    .collect());
            }
            if sql.contains("pragma_table_info") {
                return Ok(self
                    .columns
                    .iter()
                    .map(|name| Row::from([("name", Value::from(*name))]))
                    .collect());
            }
            if self.fail_statements {
                return Err(Error::Driver("mock failure".into()));
            }
            Ok(vec![Row::from([("id", Value::Int(1))])])
        }
    }

    fn mock_connection() -> Connection {
        Connection::with_driver(
            ConnectionConfig::sqlite_in_memory(),
            Box::new(MockDriver::new()),
        )
    }

    fn failing_connection() -> Connection {
        let mut driver = MockDriver::new();
        driver.fail_statements = true;
        Connection::with_driver(ConnectionConfig::sqlite_in_memory(), Box::new(driver))
    }

    #[test]
    fn test_whitelist_is_cached() {
        let conn = mock_connection();
        assert!(conn.validate_table("users"));
        assert!(conn.validate_table("posts"));
        assert!(!conn.validate_table("ghosts"));
        assert!(conn.validate_column("users", "role"));
        assert!(!conn.validate_column("users", "email"));
        assert!(!conn.validate_column("ghosts", "id"));

        // One table-listing query plus one column-listing query, despite the
        // repeated checks.
        let introspections = conn.trace().len();
        assert_eq!(introspections, 2);
        conn.validate_table("users");
        conn.validate_column("users", "name");
        assert_eq!(conn.trace().len(), introspections);
    }

    #[test]
    fn test_refresh_schema_reintrospects() {
        let conn = mock_connection();
        assert!(conn.validate_table("users"));
        let before = conn.trace().len();
        conn.refresh_schema();
        assert!(conn.validate_table("users"));
        assert!(conn.trace().len() > before);
    }

    #[test]
    fn test_swallowed_failure_recorded_in_trace() {
        let conn = failing_connection();
        let rows = conn.query("SELECT nope", &Bindings::new()).unwrap();
        assert!(rows.is_empty());
        assert_eq!(conn.last_error(), Some("driver error: mock failure".into()));

        let entry = conn.trace().last().cloned().unwrap();
        assert_eq!(entry.query, "SELECT nope");
        assert_eq!(entry.error, Some("driver error: mock failure".into()));
    }

    #[test]
    fn test_fail_on_next_query_is_one_shot() {
        let conn = failing_connection();
        conn.fail_on_next_query(true);
        let err = conn.execute("DELETE broken", &Bindings::new());
        assert!(matches!(err, Err(Error::Driver(_))));

        // Flag consumed: the next failure is swallowed again.
        assert_eq!(conn.execute("DELETE broken", &Bindings::new()).unwrap(), 0);
    }

    #[test]
    fn test_fail_flag_resets_even_on_success() {
        let conn = mock_connection();
        conn.fail_on_next_query(true);
        conn.execute("UPDATE fine", &Bindings::new()).unwrap();
        assert!(!conn.take_fail_flag());
    }

    #[test]
    fn test_execute_captures_last_state() {
        let conn = mock_connection();
        let affected = conn.execute("INSERT", &Bindings::new()).unwrap();
        assert_eq!(affected, 1);
        assert_eq!(conn.last_affected(), 1);
        assert_eq!(conn.last_insert_id(), Some(42));
        assert_eq!(conn.last_error(), None);
    }

    #[test]
    fn test_table_entry_point_validates() {
        let conn = mock_connection();
        assert!(conn.table("users").is_ok());

        let err = conn.table("userz").unwrap_err();
        assert_eq!(
            err.to_string(),
            "table 'userz' not found. Did you mean 'users'?"
        );
    }

    #[test]
    fn test_prefix_applies_to_table_lookup() {
        let mut driver = MockDriver::new();
        driver.tables = vec!["app_users"];
        let conn = Connection::with_driver(
            ConnectionConfig::sqlite_in_memory().with_prefix("app_"),
            Box::new(driver),
        );
        let builder = conn.table("users").unwrap();
        assert_eq!(builder.table(), "app_users");
    }

    #[test]
    fn test_query_as_decodes_rows() {
        #[derive(Debug, PartialEq, serde::Deserialize)]
        struct Rec {
            id: i64,
        }
        let conn = mock_connection();
        let recs: Vec<Rec> = conn.query_as("SELECT id", &Bindings::new()).unwrap();
        assert_eq!(recs, vec![Rec { id: 1 }]);
    }

    #[test]
    fn test_registry() {
        let mut registry = Registry::new();
        assert!(registry.is_empty());
        registry.insert(mock_connection());
        registry.insert(Connection::with_driver(
            ConnectionConfig::sqlite_in_memory().with_id("analytics"),
            Box::new(MockDriver::new()),
        ));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.ids().collect::<Vec<_>>(), vec!["analytics", "default"]);
        assert!(registry.get("analytics").is_some());
        assert!(registry.remove("default").is_some());
        assert!(registry.get("default").is_none());
    }
}
