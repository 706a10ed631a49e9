use crate::connection::ConnectionConfig;
use crate::dialect::{ColumnType, SqlDialect};
use crate::error::{Error, Result};

/// MySQL-flavored rendering: backtick quoting, `NOW()`, inline KEY clauses.
pub struct MysqlDialect;

impl SqlDialect for MysqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_char(&self) -> char {
        '`'
    }

    fn now_literal(&self) -> &'static str {
        "NOW()"
    }

    fn unbounded_limit(&self) -> i64 {
        // MySQL has no "no limit" sentinel; the manual suggests a very large
        // row count when only an offset is wanted.
        i64::MAX
    }

    fn dsn(&self, config: &ConnectionConfig) -> Result<String> {
        let database = config
            .database
            .as_deref()
            .ok_or_else(|| Error::Config("mysql connection requires a database name".into()))?;
        let user = config.user.as_deref().unwrap_or("");
        if let Some(socket) = &config.socket {
            return Ok(format!("mysql://{user}@unix({socket})/{database}"));
        }
        let host = config.host.as_deref().ok_or_else(|| {
            Error::Config("mysql connection requires a host or a socket path".into())
        })?;
        let port = config.port.unwrap_or(3306);
        Ok(format!("mysql://{user}@{host}:{port}/{database}"))
    }

    fn table_list_sql(&self) -> String {
        "SHOW TABLES".to_string()
    }

    fn column_list_sql(&self, table: &str) -> String {
        format!("SHOW COLUMNS FROM {}", self.quote_identifier(table))
    }

    fn column_label_key(&self) -> &'static str {
        "Field"
    }

    fn column_type_sql(&self, column: &str, ty: &ColumnType) -> Result<String> {
        Ok(match ty {
            ColumnType::Id => "INT UNSIGNED NOT NULL AUTO_INCREMENT PRIMARY KEY".to_string(),
            ColumnType::Varchar(0) => {
                return Err(Error::UnsupportedColumnType {
                    column: column.to_string(),
                    reason: "VARCHAR length must be at least 1".to_string(),
                });
            }
            ColumnType::Varchar(n) => format!("VARCHAR({n})"),
            ColumnType::Text => "TEXT".to_string(),
            ColumnType::Int => "INT".to_string(),
            ColumnType::Timestamp => "DATETIME".to_string(),
            ColumnType::Bool => "TINYINT(1)".to_string(),
        })
    }

    fn inline_index_support(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionConfig;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_dsn_excludes_password() {
        let config = ConnectionConfig::mysql("app")
            .with_host("db.internal")
            .with_user("svc")
            .with_password("s3cret");
        let dsn = MysqlDialect.dsn(&config).unwrap();
        assert_eq!(dsn, "mysql://svc@db.internal:3306/app");
        assert!(!dsn.contains("s3cret"));
    }

    #[test]
    fn test_dsn_prefers_socket() {
        let config = ConnectionConfig::mysql("app")
            .with_host("ignored")
            .with_socket("/var/run/mysqld/mysqld.sock");
        assert_eq!(
            MysqlDialect.dsn(&config).unwrap(),
            "mysql://@unix(/var/run/mysqld/mysqld.sock)/app"
        );
    }

    #[test]
    fn test_dsn_requires_endpoint() {
        let config = ConnectionConfig::mysql("app");
        assert!(matches!(
            MysqlDialect.dsn(&config),
            Err(Error::Config(_))
        ));
    }
}
