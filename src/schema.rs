//! Schema whitelist views and fuzzy suggestions.
//!
//! Rendering never embeds an identifier in SQL text without confirming it
//! against a [`SchemaView`]. The live view is a [`Connection`]'s cached
//! whitelist; [`StaticSchema`] backs offline rendering and tests.
//!
//! [`Connection`]: crate::Connection

use std::collections::BTreeMap;
use strsim::levenshtein;

/// Read-only view over known-valid table and column names.
pub trait SchemaView {
    fn has_table(&self, table: &str) -> bool;

    /// Returns false immediately if the table itself is unknown.
    fn has_column(&self, table: &str, column: &str) -> bool;
}

/// A fixed, in-memory whitelist.
#[derive(Debug, Clone, Default)]
pub struct StaticSchema {
    tables: BTreeMap<String, Vec<String>>,
}

impl StaticSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table and its columns.
    pub fn add_table(&mut self, table: &str, columns: &[&str]) -> &mut Self {
        self.tables.insert(
            table.to_string(),
            columns.iter().map(|c| c.to_string()).collect(),
        );
        self
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(|k| k.as_str())
    }
}

impl SchemaView for StaticSchema {
    fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    fn has_column(&self, table: &str, column: &str) -> bool {
        self.tables
            .get(table)
            .is_some_and(|cols| cols.iter().any(|c| c == column))
    }
}

/// Best candidate within a small Levenshtein distance, for error messages.
pub fn did_you_mean<'a, I>(input: &str, candidates: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<(usize, &str)> = None;
    for cand in candidates {
        let dist = levenshtein(&input.to_lowercase(), &cand.to_lowercase());
        if best.is_none_or(|(d, _)| dist < d) {
            best = Some((dist, cand));
        }
    }
    // Only suggest close matches: a third of the length, at least one edit.
    match best {
        Some((dist, cand)) if dist <= (input.len() / 3).max(1) => Some(cand.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_schema() {
        let mut schema = StaticSchema::new();
        schema.add_table("users", &["id", "name", "role"]);

        assert!(schema.has_table("users"));
        assert!(!schema.has_table("posts"));
        assert!(schema.has_column("users", "role"));
        assert!(!schema.has_column("users", "email"));
        assert!(!schema.has_column("posts", "id"));
    }

    #[test]
    fn test_did_you_mean() {
        let tables = ["users", "posts", "comments"];
        assert_eq!(
            did_you_mean("userz", tables.iter().copied()),
            Some("users".to_string())
        );
        assert_eq!(did_you_mean("qzx", tables.iter().copied()), None);
    }
}
