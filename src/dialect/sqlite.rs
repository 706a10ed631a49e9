use crate::connection::ConnectionConfig;
use crate::dialect::{ColumnType, SqlDialect};
use crate::error::{Error, Result};

/// SQLite-flavored rendering: double-quote quoting, type affinities, indexes
/// created outside CREATE TABLE.
pub struct SqliteDialect;

impl SqlDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quote_char(&self) -> char {
        '"'
    }

    fn now_literal(&self) -> &'static str {
        "CURRENT_TIMESTAMP"
    }

    fn unbounded_limit(&self) -> i64 {
        // A negative LIMIT means unbounded in SQLite.
        -1
    }

    fn dsn(&self, config: &ConnectionConfig) -> Result<String> {
        match &config.path {
            Some(path) => Ok(format!("sqlite://{}", path.display())),
            None => Ok("sqlite://:memory:".to_string()),
        }
    }

    fn table_list_sql(&self) -> String {
        "SELECT name FROM sqlite_master \
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name"
            .to_string()
    }

    fn column_list_sql(&self, table: &str) -> String {
        format!(
            "SELECT name FROM pragma_table_info('{}')",
            table.replace('\'', "''")
        )
    }

    fn column_label_key(&self) -> &'static str {
        "name"
    }

    fn column_type_sql(&self, column: &str, ty: &ColumnType) -> Result<String> {
        Ok(match ty {
            ColumnType::Id => "INTEGER PRIMARY KEY AUTOINCREMENT".to_string(),
            ColumnType::Varchar(0) => {
                return Err(Error::UnsupportedColumnType {
                    column: column.to_string(),
                    reason: "VARCHAR length must be at least 1".to_string(),
                });
            }
            ColumnType::Varchar(_) | ColumnType::Text | ColumnType::Timestamp => {
                "TEXT".to_string()
            }
            ColumnType::Int | ColumnType::Bool => "INTEGER".to_string(),
        })
    }

    fn inline_index_support(&self) -> bool {
        false
    }
}
