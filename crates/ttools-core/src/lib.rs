//! Core types and traits for ttools.
//!
//! This crate provides the contract shared by wrapped drivers and the hook layer:
//!
//! - `Driver` trait for opening connections from a data source name
//! - `Connection` and `TransactionOps` traits for executing statements
//! - `ExecResult` for rows affected plus the generated row id
//! - `Outcome` re-export from asupersync for cancel-correct operations
//! - `Cx` context for structured concurrency

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod connection;
pub mod error;
pub mod row;
pub mod value;

pub use connection::{
    Connection, Driver, ExecResult, IsolationLevel, PreparedStatement, TransactionOps,
};
pub use error::{Error, HookError, HookErrorKind, Result, settle};
pub use row::{FromValue, Row};
pub use value::Value;
