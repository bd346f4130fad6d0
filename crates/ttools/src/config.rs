//! Configuration for hooked drivers.

use regex::Regex;
use serde::{Deserialize, Serialize};
use ttools_core::error::ConfigError;
use ttools_core::{Error, Value};

/// SQL flavour of the wrapped database, used for the auxiliary statements
/// cleanup and bootstrap issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Sqlite,
    #[default]
    MySql,
    /// No auxiliary statements at all.
    Generic,
}

impl Dialect {
    /// Statement that turns off foreign-key enforcement for the session.
    pub fn disable_constraints(self) -> Option<&'static str> {
        match self {
            Dialect::Sqlite => Some("PRAGMA foreign_keys = OFF"),
            Dialect::MySql => Some("SET foreign_key_checks = 0"),
            Dialect::Generic => None,
        }
    }

    /// Statement (with parameters) that resets `table`'s auto-increment counter.
    pub fn reset_sequence(self, table: &str) -> Option<(String, Vec<Value>)> {
        match self {
            // Registry keys are lower-cased; the catalog keeps declared case.
            Dialect::Sqlite => Some((
                "DELETE FROM sqlite_sequence WHERE name = ? COLLATE NOCASE".to_string(),
                vec![Value::from(table)],
            )),
            Dialect::MySql => Some((format!("ALTER TABLE {table} AUTO_INCREMENT = 1"), Vec::new())),
            Dialect::Generic => None,
        }
    }

    /// Query returning a row only if the counters [`Dialect::reset_sequence`]
    /// touches exist. `None` means they always do.
    ///
    /// SQLite creates `sqlite_sequence` with the first AUTOINCREMENT table.
    pub fn sequence_table_lookup(self) -> Option<&'static str> {
        match self {
            Dialect::Sqlite => {
                Some("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'sqlite_sequence'")
            }
            Dialect::MySql | Dialect::Generic => None,
        }
    }

    pub fn supports_databases(self) -> bool {
        matches!(self, Dialect::MySql)
    }

    pub fn create_database(self, name: &str) -> Option<String> {
        self.supports_databases()
            .then(|| format!("CREATE DATABASE IF NOT EXISTS {name}"))
    }

    pub fn use_database(self, name: &str) -> Option<String> {
        self.supports_databases().then(|| format!("USE {name}"))
    }

    pub fn drop_database(self, name: &str) -> Option<String> {
        self.supports_databases()
            .then(|| format!("DROP DATABASE IF EXISTS {name}"))
    }
}

/// What to do when an auxiliary statement (constraint toggle, sequence
/// reset, scratch database drop) fails during cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuxiliaryPolicy {
    /// Log a warning and keep going.
    #[default]
    Tolerant,
    /// Fail the close with a hook error.
    Strict,
}

/// Rendering of statement trace lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceFormat {
    /// Structured `tracing` fields with the statement as the message.
    #[default]
    Text,
    /// One JSON object per statement.
    Json,
}

/// A database created when a connection opens and optionally dropped when
/// the last one closes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScratchDatabase {
    pub name: String,
    pub drop_on_close: bool,
}

/// Configuration for a [`HookedDriver`](crate::HookedDriver).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HookConfig {
    pub dialect: Dialect,
    /// Primary-key column used by cleanup DELETEs.
    pub id_column: String,
    /// Per-driver tracing switch; `None` defers to [`set_tracing`](crate::set_tracing).
    pub trace: Option<bool>,
    pub trace_format: TraceFormat,
    pub auxiliary_policy: AuxiliaryPolicy,
    /// Disable foreign-key checks before deleting.
    pub disable_constraints: bool,
    /// Reset auto-increment counters after deleting.
    pub reset_sequences: bool,
    /// Statements run on every physical connection right after it opens.
    pub setup_statements: Vec<String>,
    pub scratch_database: Option<ScratchDatabase>,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            id_column: "id".to_string(),
            trace: None,
            trace_format: TraceFormat::default(),
            auxiliary_policy: AuxiliaryPolicy::default(),
            disable_constraints: true,
            reset_sequences: true,
            setup_statements: Vec::new(),
            scratch_database: None,
        }
    }
}

impl HookConfig {
    /// Default configuration for `dialect`.
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            ..Default::default()
        }
    }

    /// Set the SQL dialect.
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Set the primary-key column.
    pub fn id_column(mut self, column: impl Into<String>) -> Self {
        self.id_column = column.into();
        self
    }

    /// Force tracing on or off for this driver, or defer to the global switch.
    pub fn trace(mut self, trace: Option<bool>) -> Self {
        self.trace = trace;
        self
    }

    pub fn trace_format(mut self, format: TraceFormat) -> Self {
        self.trace_format = format;
        self
    }

    pub fn auxiliary_policy(mut self, policy: AuxiliaryPolicy) -> Self {
        self.auxiliary_policy = policy;
        self
    }

    pub fn disable_constraints(mut self, enabled: bool) -> Self {
        self.disable_constraints = enabled;
        self
    }

    pub fn reset_sequences(mut self, enabled: bool) -> Self {
        self.reset_sequences = enabled;
        self
    }

    /// Append a statement to run after every physical open.
    pub fn setup_statement(mut self, sql: impl Into<String>) -> Self {
        self.setup_statements.push(sql.into());
        self
    }

    /// Create (and select) `name` on open; drop it on the last close if asked.
    pub fn scratch_database(mut self, name: impl Into<String>, drop_on_close: bool) -> Self {
        self.scratch_database = Some(ScratchDatabase {
            name: name.into(),
            drop_on_close,
        });
        self
    }

    /// Check the configuration before any connection is opened.
    pub fn validate(&self) -> Result<(), Error> {
        let ident = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").map_err(|e| {
            Error::Config(ConfigError {
                message: "identifier pattern failed to compile".to_string(),
                source: Some(Box::new(e)),
            })
        })?;

        if !ident.is_match(&self.id_column) {
            return Err(config_error(format!(
                "id column {:?} is not a plain identifier",
                self.id_column
            )));
        }

        if let Some(scratch) = &self.scratch_database {
            if !self.dialect.supports_databases() {
                return Err(config_error(format!(
                    "dialect {:?} cannot create scratch database {}",
                    self.dialect, scratch.name
                )));
            }
            if !ident.is_match(&scratch.name) {
                return Err(config_error(format!(
                    "scratch database name {:?} is not a plain identifier",
                    scratch.name
                )));
            }
        }

        Ok(())
    }

    /// DELETE statement cleanup prepares for `table`.
    pub fn delete_sql(&self, table: &str) -> String {
        format!("DELETE FROM {} WHERE {} = ?", table, self.id_column)
    }
}

fn config_error(message: String) -> Error {
    Error::Config(ConfigError {
        message,
        source: None,
    })
}
