//! Table-name extraction from INSERT statements.
//!
//! This is not a SQL parser. A statement counts as an insert when its
//! upper-cased text contains the word `INSERT`; the table is whatever sits
//! between `INSERT INTO` and the first `(` of a statement that goes on to a
//! `VALUES` clause. Quoting and schema qualifiers are kept as written.

use regex::Regex;

/// Result of inspecting one statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// Not an INSERT; nothing to record.
    NotInsert,
    /// An INSERT into the given table (trimmed, lower-cased).
    Table(String),
    /// An INSERT outside the `INSERT INTO t (...) VALUES` shape.
    Unsupported,
}

/// Compiled patterns for table extraction.
#[derive(Debug, Clone)]
pub struct Extractor {
    whitespace: Regex,
    insert: Regex,
    table: Regex,
}

impl Extractor {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            whitespace: Regex::new(r"\s+")?,
            insert: Regex::new(r"\bINSERT\b")?,
            table: Regex::new(r"INSERT INTO([^(]*)\(.*VALUES")?,
        })
    }

    /// Classify `sql` and pull out the target table of an insert.
    pub fn extract(&self, sql: &str) -> Extraction {
        let normalized = self.whitespace.replace_all(sql, " ").to_uppercase();
        if !self.insert.is_match(&normalized) {
            return Extraction::NotInsert;
        }

        let table = self
            .table
            .captures(&normalized)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_lowercase());

        match table {
            Some(t) if !t.is_empty() => Extraction::Table(t),
            _ => Extraction::Unsupported,
        }
    }
}
