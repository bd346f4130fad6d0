//! SQLite driver for ttools.
//!
//! Implements the `Driver`, `Connection` and `TransactionOps` traits from
//! ttools-core over libsqlite3 (bundled via `libsqlite3-sys`), so it can be
//! wrapped by the hook layer in the `ttools` crate. The data source name is
//! the database file path.
//!
//! `execute_result` reads the generated rowid under the same lock as the
//! statement, which is what lets the hooks register inserted rows reliably
//! when several tasks share one connection.
//!
//! ```rust,ignore
//! use ttools_core::{Connection, Cx, Driver, Value, settle};
//! use ttools_sqlite::SqliteDriver;
//!
//! let cx = Cx::for_testing();
//! let conn = settle(SqliteDriver::new().open(&cx, "/tmp/app.db").await)?;
//! conn.execute_raw("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")?;
//! let res = settle(
//!     conn.execute_result(&cx, "INSERT INTO users (name) VALUES (?)", &[Value::from("Alice")])
//!         .await,
//! )?;
//! assert_eq!(res.last_insert_id, Some(1));
//! ```
//!
//! `SqliteConnection` is `Send + Sync`; a mutex guards the handle.

// FFI bindings require unsafe code
#![allow(unsafe_code)]

pub mod connection;
pub mod ffi;
pub mod types;

pub use connection::{SqliteConfig, SqliteConnection, SqliteDriver, SqliteTransaction};
