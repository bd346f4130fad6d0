//! Deletion of registered rows when the last connection closes.
//!
//! Cleanup runs on the closing connection before it is physically closed:
//!
//! 1. disable foreign-key checks (dialect permitting)
//! 2. per table, newest first: prepare one DELETE and run it for every id,
//!    then reset the table's auto-increment counter if the database keeps
//!    counters at all
//! 3. drop the scratch database, if configured to
//!
//! A failed DELETE stops the run. Ids not yet deleted go back to the registry
//! and the error is returned from `close`. Auxiliary statements (steps 1, 3
//! and the counter lookup and reset) follow the configured [`AuxiliaryPolicy`].

use crate::config::AuxiliaryPolicy;
use crate::hooks::{ConnId, Dispatcher, HookPoint, StatementDescriptor};
use crate::registry::PendingTable;
use ttools_core::{Connection, Cx, Error, HookError, HookErrorKind, Value, settle};

/// Summary of one cleanup pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Tables whose rows were deleted.
    pub tables: usize,
    /// Ids a DELETE was executed for.
    pub ids: usize,
    /// Rows the database reported deleted.
    pub rows_deleted: u64,
    /// Auxiliary statements that failed and were tolerated.
    pub auxiliary_failures: usize,
}

/// Run cleanup for `pending` on `conn`.
#[tracing::instrument(
    level = "debug",
    skip(dispatcher, cx, conn, pending),
    fields(conn = %id, tables = pending.len())
)]
pub async fn run<C: Connection>(
    dispatcher: &Dispatcher,
    cx: &Cx,
    conn: &C,
    id: ConnId,
    pending: Vec<PendingTable>,
) -> Result<CleanupReport, Error> {
    let config = dispatcher.config();
    let dialect = config.dialect;
    let drop_database = config
        .scratch_database
        .as_ref()
        .filter(|scratch| scratch.drop_on_close)
        .and_then(|scratch| dialect.drop_database(&scratch.name));

    let mut run = CleanupRun {
        dispatcher,
        cx,
        conn,
        id,
        report: CleanupReport::default(),
    };

    if pending.is_empty() && drop_database.is_none() {
        tracing::debug!("nothing to clean up");
        return Ok(run.report);
    }

    // Newest table first, so children go before the parents they reference.
    let tables: Vec<PendingTable> = pending.into_iter().rev().collect();

    if !tables.is_empty() && config.disable_constraints {
        if let Some(sql) = dialect.disable_constraints() {
            if let Err(e) = run.auxiliary(sql, &[]).await {
                restore(dispatcher, &tables);
                return Err(e);
            }
        }
    }

    let reset_sequences = if config.reset_sequences && !tables.is_empty() {
        match run.has_sequences().await {
            Ok(present) => present,
            Err(e) => {
                restore(dispatcher, &tables);
                return Err(e);
            }
        }
    } else {
        false
    };

    for (pos, table) in tables.iter().enumerate() {
        if let Err((deleted, e)) = run.delete_rows(table).await {
            dispatcher
                .ledger()
                .restore(&table.table, table.ids[deleted..].to_vec());
            restore(dispatcher, &tables[pos + 1..]);
            return Err(e);
        }

        if reset_sequences {
            if let Some((sql, params)) = dialect.reset_sequence(&table.table) {
                if let Err(e) = run.auxiliary(&sql, &params).await {
                    restore(dispatcher, &tables[pos + 1..]);
                    return Err(e);
                }
            }
        }
    }

    if let Some(sql) = drop_database {
        run.auxiliary(&sql, &[]).await?;
    }

    tracing::debug!(
        tables = run.report.tables,
        ids = run.report.ids,
        rows_deleted = run.report.rows_deleted,
        auxiliary_failures = run.report.auxiliary_failures,
        "cleanup finished"
    );
    Ok(run.report)
}

/// Put untouched tables back, oldest first-insert ahead.
fn restore(dispatcher: &Dispatcher, tables: &[PendingTable]) {
    for table in tables {
        dispatcher.ledger().restore(&table.table, table.ids.clone());
    }
}

struct CleanupRun<'a, C> {
    dispatcher: &'a Dispatcher,
    cx: &'a Cx,
    conn: &'a C,
    id: ConnId,
    report: CleanupReport,
}

impl<C: Connection> CleanupRun<'_, C> {
    /// Delete every id of one table. On failure, returns how many ids were
    /// deleted before it.
    async fn delete_rows(&mut self, pending: &PendingTable) -> Result<(), (usize, Error)> {
        let sql = self.dispatcher.config().delete_sql(&pending.table);

        let stmt = settle(self.conn.prepare(self.cx, &sql).await)
            .map_err(|e| (0, cleanup_error(&sql, e)))?;

        for (done, row_id) in pending.ids.iter().enumerate() {
            let params = [Value::BigInt(*row_id)];
            let token = self.dispatcher.pre(HookPoint::Close);
            let outcome = self.conn.execute_prepared(self.cx, &stmt, &params).await;
            let outcome = self.dispatcher.post_query(
                token,
                &StatementDescriptor::new(&sql, &params, self.id),
                outcome,
            );
            let rows = settle(outcome).map_err(|e| (done, cleanup_error(&sql, e)))?;
            self.report.rows_deleted += rows;
            self.report.ids += 1;
        }

        self.report.tables += 1;
        Ok(())
    }

    /// Whether the dialect's auto-increment counters exist in this database.
    async fn has_sequences(&mut self) -> Result<bool, Error> {
        let Some(sql) = self.dispatcher.config().dialect.sequence_table_lookup() else {
            return Ok(true);
        };
        let token = self.dispatcher.pre(HookPoint::Close);
        let outcome = self.conn.query_one(self.cx, sql, &[]).await;
        let outcome = self.dispatcher.post_query(
            token,
            &StatementDescriptor::new(sql, &[], self.id),
            outcome,
        );
        match settle(outcome) {
            Ok(Some(_)) => Ok(true),
            Ok(None) => {
                tracing::debug!(conn = %self.id, "no auto-increment counters; skipping reset");
                Ok(false)
            }
            Err(e) => self.tolerate(sql, e).map(|()| false),
        }
    }

    async fn auxiliary(&mut self, sql: &str, params: &[Value]) -> Result<(), Error> {
        let result = self
            .dispatcher
            .run_statement(self.cx, self.conn, self.id, HookPoint::Close, sql, params)
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) => self.tolerate(sql, e),
        }
    }

    /// Apply the auxiliary policy to a failed statement.
    fn tolerate(&mut self, sql: &str, e: Error) -> Result<(), Error> {
        match self.dispatcher.config().auxiliary_policy {
            AuxiliaryPolicy::Tolerant => {
                tracing::warn!(
                    conn = %self.id,
                    sql = %sql,
                    error = %e,
                    "auxiliary cleanup statement failed; continuing"
                );
                self.report.auxiliary_failures += 1;
                Ok(())
            }
            AuxiliaryPolicy::Strict => Err(HookError::new(
                HookErrorKind::Auxiliary,
                "auxiliary cleanup statement failed",
            )
            .with_sql(sql)
            .caused_by(e)
            .into()),
        }
    }
}

fn cleanup_error(sql: &str, cause: Error) -> Error {
    HookError::new(HookErrorKind::Cleanup, "failed to delete inserted rows")
        .with_sql(sql)
        .caused_by(cause)
        .into()
}
