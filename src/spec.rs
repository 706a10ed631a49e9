//! The structured, dialect-agnostic representation of one statement.

use crate::error::Error;
use crate::value::{Bindings, Value};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Comparison operators allowed in `column, operator, value` conditions.
///
/// Closed set: anything else fails to parse with
/// [`Error::InvalidOperator`](crate::Error::InvalidOperator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    Eq,
    Gte,
    Gt,
    Lte,
    Lt,
    Ne,
    /// MySQL's null-safe equality (`<=>`).
    NullSafeEq,
    Is,
    IsNot,
    Between,
    NotBetween,
    Like,
    NotLike,
    SoundsLike,
    Regexp,
    NotRegexp,
    In,
    NotIn,
}

impl Operator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Gte => ">=",
            Operator::Gt => ">",
            Operator::Lte => "<=",
            Operator::Lt => "<",
            Operator::Ne => "<>",
            Operator::NullSafeEq => "<=>",
            Operator::Is => "IS",
            Operator::IsNot => "IS NOT",
            Operator::Between => "BETWEEN",
            Operator::NotBetween => "NOT BETWEEN",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::SoundsLike => "SOUNDS LIKE",
            Operator::Regexp => "REGEXP",
            Operator::NotRegexp => "NOT REGEXP",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
        }
    }

    /// Operators whose right-hand side is a list of values.
    pub fn takes_list(&self) -> bool {
        matches!(
            self,
            Operator::In | Operator::NotIn | Operator::Between | Operator::NotBetween
        )
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_sql())
    }
}

impl FromStr for Operator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "=" => Ok(Operator::Eq),
            ">=" => Ok(Operator::Gte),
            ">" => Ok(Operator::Gt),
            "<=" => Ok(Operator::Lte),
            "<" => Ok(Operator::Lt),
            "<>" | "!=" => Ok(Operator::Ne),
            "<=>" => Ok(Operator::NullSafeEq),
            "IS" => Ok(Operator::Is),
            "IS NOT" => Ok(Operator::IsNot),
            "BETWEEN" => Ok(Operator::Between),
            "NOT BETWEEN" => Ok(Operator::NotBetween),
            "LIKE" => Ok(Operator::Like),
            "NOT LIKE" => Ok(Operator::NotLike),
            "SOUNDS LIKE" => Ok(Operator::SoundsLike),
            "REGEXP" => Ok(Operator::Regexp),
            "NOT REGEXP" => Ok(Operator::NotRegexp),
            "IN" => Ok(Operator::In),
            "NOT IN" => Ok(Operator::NotIn),
            other => Err(Error::InvalidOperator(other.to_string())),
        }
    }
}

/// Join kinds allowed in a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinKind {
    Left,
    Right,
    Inner,
}

impl JoinKind {
    pub fn as_sql(&self) -> &'static str {
        match self {
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Inner => "INNER JOIN",
        }
    }
}

impl FromStr for JoinKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "LEFT" => Ok(JoinKind::Left),
            "RIGHT" => Ok(JoinKind::Right),
            "INNER" => Ok(JoinKind::Inner),
            other => Err(Error::InvalidJoinKind(other.to_string())),
        }
    }
}

/// One join in a query: target table, raw ON fragment, kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Join {
    pub kind: JoinKind,
    pub table: String,
    pub on: String,
}

/// How a new where/having fragment attaches to the existing expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Combine {
    #[default]
    And,
    Or,
}

impl Combine {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Combine::And => "AND",
            Combine::Or => "OR",
        }
    }
}

/// The structured specification of one statement, accumulated by the
/// builder and rendered exactly once by the dialect.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySpec {
    /// Physical (prefix-applied) table name.
    pub table: String,
    /// Requested columns; empty means `*`. Every entry is validated against
    /// the schema at render time and dropped when it does not resolve.
    pub columns: Vec<String>,
    /// Internally generated select expressions (aggregates). Rendered after
    /// the validated columns, verbatim; never caller-supplied.
    pub(crate) select_exprs: Vec<String>,
    pub distinct: bool,
    pub joins: Vec<Join>,
    pub where_sql: String,
    pub group_sql: String,
    pub having_sql: String,
    pub order_sql: String,
    pub offset: u64,
    pub limit: Option<u64>,
    /// Ordered column/value pairs for insert and update.
    pub values: Vec<(String, Value)>,
    pub bindings: Bindings,
    pub fail_on_error: bool,
}

impl QuerySpec {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    /// Attach `fragment` to an existing expression with the given joiner.
    pub(crate) fn compose(current: &mut String, fragment: &str, joiner: Combine) {
        if fragment.is_empty() {
            return;
        }
        if current.is_empty() {
            current.push_str(fragment);
        } else {
            current.push(' ');
            current.push_str(joiner.as_sql());
            current.push(' ');
            current.push_str(fragment);
        }
    }
}

/// A rendered statement: the only artifact crossing into the connection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rendered {
    pub query: String,
    pub bindings: Bindings,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_operator_parse() {
        assert_eq!("=".parse::<Operator>().unwrap(), Operator::Eq);
        assert_eq!("!=".parse::<Operator>().unwrap(), Operator::Ne);
        assert_eq!("not in".parse::<Operator>().unwrap(), Operator::NotIn);
        assert_eq!("is not".parse::<Operator>().unwrap(), Operator::IsNot);

        let err = "maybe".parse::<Operator>().unwrap_err();
        assert!(matches!(err, Error::InvalidOperator(ref s) if s == "MAYBE"));
    }

    #[test]
    fn test_join_kind_parse() {
        assert_eq!("left".parse::<JoinKind>().unwrap(), JoinKind::Left);
        assert!(matches!(
            "cross".parse::<JoinKind>(),
            Err(Error::InvalidJoinKind(_))
        ));
    }

    #[test]
    fn test_compose() {
        let mut expr = String::new();
        QuerySpec::compose(&mut expr, "a = :a", Combine::And);
        QuerySpec::compose(&mut expr, "b = :b", Combine::Or);
        QuerySpec::compose(&mut expr, "", Combine::And);
        assert_eq!(expr, "a = :a OR b = :b");
    }
}
