//! Hook points and the dispatcher that drives them.
//!
//! Every intercepted operation is bracketed by a pre hook, which hands out a
//! [`HookToken`], and a post hook, which consumes that token together with the
//! operation's outcome. Post hooks trace the statement and, for successful
//! INSERTs, register the generated id for cleanup.

use crate::config::HookConfig;
use crate::extract::{Extraction, Extractor};
use crate::refcount::Ledger;
use crate::trace::{StatementLog, TraceEntry, tracing_enabled};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use ttools_core::error::ConfigError;
use ttools_core::{
    Connection, Cx, Error, ExecResult, HookError, HookErrorKind, Outcome, Value, settle,
};

/// Interception points, one pre/post pair each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HookPoint {
    Open,
    Exec,
    Query,
    Begin,
    Commit,
    Rollback,
    Close,
}

/// Correlates a pre hook with its post hook.
///
/// Created when the operation starts and consumed by the matching post hook;
/// never stored.
#[derive(Debug)]
#[must_use = "a hook token must be handed to the matching post hook"]
pub struct HookToken {
    point: HookPoint,
    started: Instant,
}

impl HookToken {
    pub fn start(point: HookPoint) -> Self {
        Self {
            point,
            started: Instant::now(),
        }
    }

    pub fn point(&self) -> HookPoint {
        self.point
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Identity of one logical connection, unique per hooked driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConnId(u64);

impl ConnId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// What a post hook knows about the statement it observes.
#[derive(Debug, Clone, Copy)]
pub struct StatementDescriptor<'a> {
    pub sql: &'a str,
    pub params: &'a [Value],
    pub conn: ConnId,
}

impl<'a> StatementDescriptor<'a> {
    pub fn new(sql: &'a str, params: &'a [Value], conn: ConnId) -> Self {
        Self { sql, params, conn }
    }
}

/// The hook set shared by every connection of one hooked driver.
pub struct Dispatcher {
    config: HookConfig,
    extractor: Extractor,
    ledger: Arc<Ledger>,
    log: Arc<dyn StatementLog>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .field("ledger", &self.ledger)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(config: HookConfig, log: Arc<dyn StatementLog>) -> Result<Self, Error> {
        config.validate()?;
        let extractor = Extractor::new().map_err(|e| {
            Error::Config(ConfigError {
                message: "statement patterns failed to compile".to_string(),
                source: Some(Box::new(e)),
            })
        })?;
        Ok(Self {
            config,
            extractor,
            ledger: Arc::new(Ledger::new()),
            log,
        })
    }

    pub fn config(&self) -> &HookConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Whether statements are traced, honoring the per-driver override.
    pub fn tracing(&self) -> bool {
        self.config.trace.unwrap_or_else(tracing_enabled)
    }

    /// Pre hook for any point.
    pub fn pre(&self, point: HookPoint) -> HookToken {
        HookToken::start(point)
    }

    /// Post hook for operations that only get traced: queries, transaction
    /// boundaries, and auxiliary statements.
    pub fn post_query<T>(
        &self,
        token: HookToken,
        stmt: &StatementDescriptor<'_>,
        outcome: Outcome<T, Error>,
    ) -> Outcome<T, Error> {
        self.trace(&token, stmt, &outcome);
        outcome
    }

    /// Post hook for statement execution.
    ///
    /// A failed or cancelled execution is returned unchanged. A successful
    /// INSERT registers its generated id. An INSERT whose table cannot be
    /// extracted turns the result into a parse error, and one that wrote rows
    /// without reporting an id into a bookkeeping error.
    pub fn post_exec(
        &self,
        token: HookToken,
        stmt: &StatementDescriptor<'_>,
        outcome: Outcome<ExecResult, Error>,
    ) -> Outcome<ExecResult, Error> {
        self.trace(&token, stmt, &outcome);
        match outcome {
            Outcome::Ok(result) => match self.record_insert(stmt, &result) {
                Ok(()) => Outcome::Ok(result),
                Err(e) => Outcome::Err(e),
            },
            other => other,
        }
    }

    fn trace<T>(&self, token: &HookToken, stmt: &StatementDescriptor<'_>, outcome: &Outcome<T, Error>) {
        if !self.tracing() {
            return;
        }
        let error = match outcome {
            Outcome::Ok(_) => None,
            Outcome::Err(e) => Some(e.to_string()),
            Outcome::Cancelled(reason) => Some(format!("cancelled: {reason:?}")),
            Outcome::Panicked(payload) => Some(format!("panicked: {payload:?}")),
        };
        self.log.record(TraceEntry {
            point: token.point(),
            sql: stmt.sql.to_string(),
            args: stmt.params.to_vec(),
            elapsed: token.elapsed(),
            conn: stmt.conn,
            error,
        });
    }

    fn record_insert(&self, stmt: &StatementDescriptor<'_>, result: &ExecResult) -> Result<(), Error> {
        let table = match self.extractor.extract(stmt.sql) {
            Extraction::NotInsert => return Ok(()),
            Extraction::Table(table) => table,
            Extraction::Unsupported => {
                return Err(HookError::new(
                    HookErrorKind::Parse,
                    "failed to parse table name from insert",
                )
                .with_sql(stmt.sql)
                .into());
            }
        };

        let Some(id) = result.last_insert_id else {
            if result.rows_affected > 0 {
                return Err(HookError::new(
                    HookErrorKind::Bookkeeping,
                    format!("insert into {table} reported no generated id"),
                )
                .with_sql(stmt.sql)
                .into());
            }
            tracing::debug!(conn = %stmt.conn, table = %table, "insert wrote no rows");
            return Ok(());
        };

        if !self.ledger.record(&table, id)? {
            tracing::debug!(conn = %stmt.conn, table = %table, id, "id already registered");
        }
        Ok(())
    }

    /// Run a statement issued by the hook layer itself (setup, cleanup),
    /// traced under `point`.
    pub async fn run_statement<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        id: ConnId,
        point: HookPoint,
        sql: &str,
        params: &[Value],
    ) -> Result<u64, Error> {
        let token = self.pre(point);
        let outcome = conn.execute(cx, sql, params).await;
        settle(self.post_query(token, &StatementDescriptor::new(sql, params, id), outcome))
    }

    /// Open hook: bootstrap the scratch database and run setup statements on
    /// a freshly opened physical connection.
    #[tracing::instrument(level = "debug", skip(self, cx, conn))]
    pub async fn on_open<C: Connection>(&self, cx: &Cx, conn: &C, id: ConnId) -> Result<(), Error> {
        if let Some(scratch) = &self.config.scratch_database {
            let dialect = self.config.dialect;
            let bootstrap = [
                dialect.create_database(&scratch.name),
                dialect.use_database(&scratch.name),
            ];
            for sql in bootstrap.iter().flatten() {
                self.run_statement(cx, conn, id, HookPoint::Open, sql, &[])
                    .await?;
            }
        }

        for sql in &self.config.setup_statements {
            self.run_statement(cx, conn, id, HookPoint::Open, sql, &[])
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::MemoryLog;

    fn dispatcher(trace: bool) -> (Dispatcher, Arc<MemoryLog>) {
        let log = Arc::new(MemoryLog::new());
        let config = HookConfig::default().trace(Some(trace));
        let dispatcher = Dispatcher::new(config, log.clone()).unwrap();
        (dispatcher, log)
    }

    fn exec(d: &Dispatcher, sql: &str, outcome: Outcome<ExecResult, Error>) -> Outcome<ExecResult, Error> {
        let token = d.pre(HookPoint::Exec);
        d.post_exec(token, &StatementDescriptor::new(sql, &[], ConnId::new(1)), outcome)
    }

    #[test]
    fn successful_insert_is_registered() {
        let (d, log) = dispatcher(true);
        let out = exec(&d, "INSERT INTO t1 (id) VALUES (?)", Outcome::Ok(ExecResult::inserted(5)));
        assert!(matches!(out, Outcome::Ok(r) if r.last_insert_id == Some(5)));
        assert_eq!(d.ledger().pending_ids("t1"), vec![5]);

        let entries = log.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].point, HookPoint::Exec);
        assert_eq!(entries[0].conn, ConnId::new(1));
    }

    #[test]
    fn failed_insert_is_not_registered_or_masked() {
        let (d, _) = dispatcher(false);
        let out = exec(
            &d,
            "INSERT INTO t1 (id) VALUES (?)",
            Outcome::Err(Error::Custom("duplicate key".to_string())),
        );
        match out {
            Outcome::Err(Error::Custom(msg)) => assert_eq!(msg, "duplicate key"),
            other => panic!("expected driver error, got {other:?}"),
        }
        assert_eq!(d.ledger().pending_rows(), 0);
    }

    #[test]
    fn unsupported_insert_is_a_parse_error() {
        let (d, _) = dispatcher(false);
        let out = exec(
            &d,
            "INSERT INTO t1 SELECT * FROM t2",
            Outcome::Ok(ExecResult::affected(3)),
        );
        match out {
            Outcome::Err(e) => {
                assert_eq!(e.hook_kind(), Some(HookErrorKind::Parse));
                assert_eq!(e.sql(), Some("INSERT INTO t1 SELECT * FROM t2"));
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn insert_without_id_is_a_bookkeeping_error() {
        let (d, _) = dispatcher(false);
        let out = exec(&d, "INSERT INTO t1 (id) VALUES (?)", Outcome::Ok(ExecResult::affected(1)));
        match out {
            Outcome::Err(e) => {
                assert_eq!(e.hook_kind(), Some(HookErrorKind::Bookkeeping));
                assert_eq!(e.sql(), Some("INSERT INTO t1 (id) VALUES (?)"));
            }
            other => panic!("expected bookkeeping error, got {other:?}"),
        }
        assert_eq!(d.ledger().pending_rows(), 0);
    }

    #[test]
    fn insert_that_wrote_nothing_is_skipped() {
        let (d, _) = dispatcher(false);
        let out = exec(
            &d,
            "INSERT INTO t1 (id) VALUES (?) ON CONFLICT DO NOTHING",
            Outcome::Ok(ExecResult::affected(0)),
        );
        assert!(matches!(out, Outcome::Ok(r) if r.rows_affected == 0));
        assert_eq!(d.ledger().pending_rows(), 0);
    }

    #[test]
    fn tracing_off_records_nothing() {
        let (d, log) = dispatcher(false);
        let token = d.pre(HookPoint::Query);
        let _ = d.post_query(
            token,
            &StatementDescriptor::new("SELECT 1", &[], ConnId::new(2)),
            Outcome::<(), Error>::Ok(()),
        );
        assert!(log.is_empty());
    }

    #[test]
    fn failed_statement_trace_carries_error() {
        let (d, log) = dispatcher(true);
        let token = d.pre(HookPoint::Query);
        let _ = d.post_query(
            token,
            &StatementDescriptor::new("SELECT nope", &[], ConnId::new(2)),
            Outcome::<(), Error>::Err(Error::Custom("no such column".to_string())),
        );
        assert_eq!(log.entries()[0].error.as_deref(), Some("no such column"));
    }

    #[test]
    fn conn_id_display() {
        assert_eq!(ConnId::new(12).to_string(), "conn#12");
    }
}
