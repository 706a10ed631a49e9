//! quern: schema-validated SQL building and execution.
//!
//! quern lets application code express relational queries (select, insert,
//! update, delete, joins, aggregates, pagination) without writing raw SQL
//! strings. Two guarantees hold throughout:
//!
//! - every caller-supplied value becomes a named binding (the only
//!   exceptions are the fixed literal passthroughs [`Value::Now`] and
//!   [`Value::Null`]);
//! - no table or column name reaches SQL text unless it has been confirmed
//!   against the connection's cached schema whitelist (or is the wildcard
//!   `*`).
//!
//! Rendering is dialect-pluggable (a MySQL-flavored and an SQLite-flavored
//! backend ship in the box) and execution goes through a small synchronous
//! [`Driver`] behind each [`Connection`].
//!
//! # Example
//!
//! ```no_run
//! use quern::{Connection, ConnectionConfig, Value};
//!
//! fn main() -> quern::Result<()> {
//!     let conn = Connection::connect(ConnectionConfig::sqlite("app.db"))?;
//!
//!     let id = conn
//!         .table("users")?
//!         .values([("name", Value::from("ada")), ("role", Value::from("admin"))])
//!         .insert()?;
//!
//!     let admins = conn
//!         .table("users")?
//!         .filter([("role", "admin")])
//!         .order("name")
//!         .page(1, 20)?;
//!     println!("{} of {:?} admins, first id {:?}", admins.len(), admins.page_info(), id);
//!     Ok(())
//! }
//! ```

mod builder;
mod connection;
mod dialect;
mod driver;
mod error;
mod schema;
mod spec;
mod value;

pub use builder::{
    bound, nested, Bound, ConditionCx, DebugOptions, DebugOutput, IntoCondition, Nested, PageInfo,
    QueryBuilder, RowSet, StatementKind,
};
pub use connection::{Connection, ConnectionConfig, Registry, TraceEntry};
pub use dialect::{
    ColumnDef, ColumnType, Dialect, MysqlDialect, SqlDialect, SqliteDialect,
};
pub use driver::{Driver, ExecResult, MysqlDriver, Row, SqliteDriver};
pub use error::{Error, Result};
pub use schema::{did_you_mean, SchemaView, StaticSchema};
pub use spec::{Combine, Join, JoinKind, Operator, QuerySpec, Rendered};
pub use value::{Bindings, Value};
