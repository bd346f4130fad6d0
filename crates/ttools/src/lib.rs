//! ttools - test-database hooks for SQL drivers.
//!
//! Wrapping a [`Driver`] gives connections that:
//!
//! - trace every statement they run (SQL, arguments, elapsed time, errors)
//! - remember the id generated by every successful `INSERT`
//! - delete all remembered rows when the last open connection closes
//!
//! Tests can share one database freely: whatever they insert is gone once the
//! final connection is closed, and nothing else is touched.
//!
//! # Quick Start
//!
//! ```ignore
//! use ttools::prelude::*;
//! use ttools_sqlite::SqliteDriver;
//!
//! async fn example(cx: &Cx) -> Result<()> {
//!     let driver = HookedDriver::new(SqliteDriver::new(), HookConfig::new(Dialect::Sqlite))?;
//!     let conn = settle(driver.open(cx, "test.db").await)?;
//!
//!     settle(
//!         conn.execute(cx, "INSERT INTO users (id, name) VALUES (?, ?)", &[
//!             Value::BigInt(ttools::id()),
//!             Value::Text("alice".into()),
//!         ])
//!         .await,
//!     )?;
//!
//!     // Last connection: the user row is deleted here.
//!     conn.close(cx).await
//! }
//! ```
//!
//! # Tracing
//!
//! Statement tracing is off by default. Turn it on process-wide with
//! [`set_tracing`] or per driver with [`HookConfig::trace`]. Entries go to a
//! [`StatementLog`]; the default [`TracingLog`] emits `tracing` events under
//! the `ttools::sql` target.

pub mod cleanup;
pub mod config;
pub mod extract;
pub mod hooks;
pub mod idgen;
pub mod refcount;
pub mod registry;
pub mod trace;
pub mod wrap;

pub use ttools_core::{
    Connection, Cx, Driver, Error, ExecResult, HookError, HookErrorKind, IsolationLevel, Outcome,
    PreparedStatement, Result, Row, TransactionOps, Value, settle,
};

pub use cleanup::CleanupReport;
pub use config::{AuxiliaryPolicy, Dialect, HookConfig, ScratchDatabase, TraceFormat};
pub use hooks::{ConnId, HookPoint};
pub use idgen::{IdGenerator, id};
pub use trace::{MemoryLog, StatementLog, TraceEntry, TracingLog, set_tracing, tracing_enabled};
pub use wrap::{HookedConnection, HookedDriver, HookedTransaction, wrap};

/// Common imports.
///
/// ```ignore
/// use ttools::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Connection, Cx, Dialect, Driver, Error, HookConfig, HookedDriver, Outcome, Result, Value,
        id, settle, wrap,
    };
}
