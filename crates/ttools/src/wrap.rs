//! Hooked driver, connection, and transaction wrappers.
//!
//! [`HookedDriver`] wraps any [`Driver`]; every connection it opens routes its
//! operations through the shared [`Dispatcher`].

use crate::cleanup::{self, CleanupReport};
use crate::config::HookConfig;
use crate::hooks::{ConnId, Dispatcher, HookPoint, HookToken, StatementDescriptor};
use crate::refcount::{ConnectionLease, Release};
use crate::trace::{StatementLog, TracingLog};
use std::future::Future;
use std::sync::Arc;
use ttools_core::{
    Connection, Cx, Driver, Error, ExecResult, IsolationLevel, Outcome, PreparedStatement, Row,
    TransactionOps, Value,
};

/// Wrap `driver` with the default [`HookConfig`].
pub fn wrap<D: Driver>(driver: D) -> Result<HookedDriver<D>, Error> {
    HookedDriver::new(driver, HookConfig::default())
}

/// A driver whose connections trace statements and delete the rows they
/// inserted once the last of them closes.
///
/// Clones share one registry and one open count; wrapping the driver again
/// starts a fresh one.
pub struct HookedDriver<D> {
    driver: D,
    dispatcher: Arc<Dispatcher>,
}

impl<D: Clone> Clone for HookedDriver<D> {
    fn clone(&self) -> Self {
        Self {
            driver: self.driver.clone(),
            dispatcher: Arc::clone(&self.dispatcher),
        }
    }
}

impl<D: std::fmt::Debug> std::fmt::Debug for HookedDriver<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookedDriver")
            .field("driver", &self.driver)
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

impl<D: Driver> HookedDriver<D> {
    /// Wrap `driver`, tracing through `tracing` in the configured format.
    pub fn new(driver: D, config: HookConfig) -> Result<Self, Error> {
        let log = Arc::new(TracingLog::new(config.trace_format));
        Self::with_log(driver, config, log)
    }

    /// Wrap `driver`, sending statement traces to `log`.
    pub fn with_log(driver: D, config: HookConfig, log: Arc<dyn StatementLog>) -> Result<Self, Error> {
        let dispatcher = Arc::new(Dispatcher::new(config, log)?);
        Ok(Self { driver, dispatcher })
    }

    pub fn config(&self) -> &HookConfig {
        self.dispatcher.config()
    }

    /// The wrapped driver.
    pub fn inner(&self) -> &D {
        &self.driver
    }

    /// Logical connections currently open.
    pub fn open_connections(&self) -> usize {
        self.dispatcher.ledger().open_connections()
    }

    /// Rows registered for deletion and not yet cleaned up.
    pub fn pending_rows(&self) -> usize {
        self.dispatcher.ledger().pending_rows()
    }

    /// Ids registered for `table`, in insertion order.
    pub fn pending_ids(&self, table: &str) -> Vec<i64> {
        self.dispatcher.ledger().pending_ids(&table.to_lowercase())
    }

    /// Forget every registered row without deleting it.
    pub fn forget_pending(&self) {
        self.dispatcher.ledger().clear();
    }
}

impl<D: Driver> Driver for HookedDriver<D> {
    type Conn = HookedConnection<D::Conn>;

    fn open(&self, cx: &Cx, dsn: &str) -> impl Future<Output = Outcome<Self::Conn, Error>> + Send {
        let dispatcher = Arc::clone(&self.dispatcher);
        async move {
            let token = dispatcher.pre(HookPoint::Open);
            let conn = match self.driver.open(cx, dsn).await {
                Outcome::Ok(conn) => conn,
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(reason) => return Outcome::Cancelled(reason),
                Outcome::Panicked(payload) => return Outcome::Panicked(payload),
            };

            let id = dispatcher.ledger().next_conn_id();
            if let Err(e) = dispatcher.on_open(cx, &conn, id).await {
                if let Err(close_err) = conn.close(cx).await {
                    tracing::warn!(conn = %id, error = %close_err, "close after failed setup also failed");
                }
                return Outcome::Err(e);
            }

            let lease = ConnectionLease::acquire(dispatcher.ledger(), id);
            tracing::debug!(
                conn = %id,
                elapsed_us = u64::try_from(token.elapsed().as_micros()).unwrap_or(u64::MAX),
                "opened hooked connection"
            );
            Outcome::Ok(HookedConnection {
                inner: conn,
                dispatcher,
                lease,
            })
        }
    }
}

/// A connection opened through a [`HookedDriver`].
pub struct HookedConnection<C> {
    inner: C,
    dispatcher: Arc<Dispatcher>,
    lease: ConnectionLease,
}

impl<C> HookedConnection<C> {
    pub fn id(&self) -> ConnId {
        self.lease.conn()
    }

    /// The physical connection. Statements issued on it bypass the hooks.
    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: Connection> HookedConnection<C> {
    /// Close this connection and return the cleanup report if it was the
    /// last one open.
    #[tracing::instrument(level = "debug", skip(self, cx), fields(conn = %self.id()))]
    pub async fn close_with_report(self, cx: &Cx) -> Result<Option<CleanupReport>, Error> {
        let Self {
            inner,
            dispatcher,
            lease,
        } = self;
        let id = lease.conn();
        let token = dispatcher.pre(HookPoint::Close);

        let cleanup = match lease.release() {
            Ok(Release::Last(pending)) => cleanup::run(&dispatcher, cx, &inner, id, pending)
                .await
                .map(Some),
            Ok(Release::Remaining(open)) => {
                tracing::debug!(open, "other connections still open; cleanup deferred");
                Ok(None)
            }
            Err(e) => Err(e),
        };

        // The physical close happens whether or not cleanup succeeded.
        let closed = inner.close(cx).await;
        tracing::debug!(
            elapsed_us = u64::try_from(token.elapsed().as_micros()).unwrap_or(u64::MAX),
            "closed hooked connection"
        );

        let report = cleanup?;
        closed?;
        Ok(report)
    }

    fn finish_exec(
        &self,
        token: HookToken,
        sql: &str,
        params: &[Value],
        outcome: Outcome<ExecResult, Error>,
    ) -> Outcome<ExecResult, Error> {
        self.dispatcher
            .post_exec(token, &StatementDescriptor::new(sql, params, self.id()), outcome)
    }

    fn finish<T>(
        &self,
        token: HookToken,
        sql: &str,
        params: &[Value],
        outcome: Outcome<T, Error>,
    ) -> Outcome<T, Error> {
        self.dispatcher
            .post_query(token, &StatementDescriptor::new(sql, params, self.id()), outcome)
    }
}

impl<C: Connection> Connection for HookedConnection<C> {
    type Tx<'conn>
        = HookedTransaction<'conn, C::Tx<'conn>>
    where
        Self: 'conn;

    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        async move {
            let token = self.dispatcher.pre(HookPoint::Query);
            let outcome = self.inner.query(cx, sql, params).await;
            self.finish(token, sql, params, outcome)
        }
    }

    fn query_one(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send {
        async move {
            let token = self.dispatcher.pre(HookPoint::Query);
            let outcome = self.inner.query_one(cx, sql, params).await;
            self.finish(token, sql, params, outcome)
        }
    }

    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let pending = self.execute_result(cx, sql, params);
        async move { pending.await.map(|result| result.rows_affected) }
    }

    fn execute_result(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<ExecResult, Error>> + Send {
        async move {
            let token = self.dispatcher.pre(HookPoint::Exec);
            let outcome = self.inner.execute_result(cx, sql, params).await;
            self.finish_exec(token, sql, params, outcome)
        }
    }

    fn insert(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<i64, Error>> + Send {
        async move {
            let token = self.dispatcher.pre(HookPoint::Exec);
            let outcome = self.inner.insert(cx, sql, params).await.map(ExecResult::inserted);
            self.finish_exec(token, sql, params, outcome)
                .map(|result| result.last_insert_id.unwrap_or_default())
        }
    }

    fn batch(
        &self,
        cx: &Cx,
        statements: &[(String, Vec<Value>)],
    ) -> impl Future<Output = Outcome<Vec<u64>, Error>> + Send {
        async move {
            let mut results = Vec::with_capacity(statements.len());
            for (sql, params) in statements {
                match self.execute_result(cx, sql, params).await {
                    Outcome::Ok(result) => results.push(result.rows_affected),
                    Outcome::Err(e) => return Outcome::Err(e),
                    Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                    Outcome::Panicked(p) => return Outcome::Panicked(p),
                }
            }
            Outcome::Ok(results)
        }
    }

    fn begin(&self, cx: &Cx) -> impl Future<Output = Outcome<Self::Tx<'_>, Error>> + Send {
        self.begin_with(cx, IsolationLevel::default())
    }

    fn begin_with(
        &self,
        cx: &Cx,
        isolation: IsolationLevel,
    ) -> impl Future<Output = Outcome<Self::Tx<'_>, Error>> + Send {
        async move {
            let token = self.dispatcher.pre(HookPoint::Begin);
            let outcome = self.inner.begin_with(cx, isolation).await;
            self.finish(token, "BEGIN", &[], outcome)
                .map(|tx| HookedTransaction::new(tx, &self.dispatcher, self.id()))
        }
    }

    fn prepare(
        &self,
        cx: &Cx,
        sql: &str,
    ) -> impl Future<Output = Outcome<PreparedStatement, Error>> + Send {
        self.inner.prepare(cx, sql)
    }

    fn query_prepared(
        &self,
        cx: &Cx,
        stmt: &PreparedStatement,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        async move {
            let token = self.dispatcher.pre(HookPoint::Query);
            let outcome = self.inner.query_prepared(cx, stmt, params).await;
            self.finish(token, stmt.sql(), params, outcome)
        }
    }

    fn execute_prepared(
        &self,
        cx: &Cx,
        stmt: &PreparedStatement,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let pending = self.execute_prepared_result(cx, stmt, params);
        async move { pending.await.map(|result| result.rows_affected) }
    }

    fn execute_prepared_result(
        &self,
        cx: &Cx,
        stmt: &PreparedStatement,
        params: &[Value],
    ) -> impl Future<Output = Outcome<ExecResult, Error>> + Send {
        async move {
            let token = self.dispatcher.pre(HookPoint::Exec);
            let outcome = self.inner.execute_prepared_result(cx, stmt, params).await;
            self.finish_exec(token, stmt.sql(), params, outcome)
        }
    }

    fn ping(&self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        self.inner.ping(cx)
    }

    async fn close(self, cx: &Cx) -> ttools_core::Result<()> {
        self.close_with_report(cx).await.map(|_| ())
    }
}

/// A transaction on a [`HookedConnection`].
///
/// `T` is only `Send`, so the returned futures never borrow `self`; the inner
/// future is built up front and the hook state is copied out.
pub struct HookedTransaction<'conn, T> {
    inner: T,
    dispatcher: &'conn Dispatcher,
    conn: ConnId,
}

impl<'conn, T> HookedTransaction<'conn, T> {
    fn new(inner: T, dispatcher: &'conn Dispatcher, conn: ConnId) -> Self {
        Self {
            inner,
            dispatcher,
            conn,
        }
    }
}

impl<T: TransactionOps> TransactionOps for HookedTransaction<'_, T> {
    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let (dispatcher, conn) = (self.dispatcher, self.conn);
        let token = dispatcher.pre(HookPoint::Query);
        let pending = self.inner.query(cx, sql, params);
        async move {
            let outcome = pending.await;
            dispatcher.post_query(token, &StatementDescriptor::new(sql, params, conn), outcome)
        }
    }

    fn query_one(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send {
        let (dispatcher, conn) = (self.dispatcher, self.conn);
        let token = dispatcher.pre(HookPoint::Query);
        let pending = self.inner.query_one(cx, sql, params);
        async move {
            let outcome = pending.await;
            dispatcher.post_query(token, &StatementDescriptor::new(sql, params, conn), outcome)
        }
    }

    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let pending = self.execute_result(cx, sql, params);
        async move { pending.await.map(|result| result.rows_affected) }
    }

    fn execute_result(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<ExecResult, Error>> + Send {
        let (dispatcher, conn) = (self.dispatcher, self.conn);
        let token = dispatcher.pre(HookPoint::Exec);
        let pending = self.inner.execute_result(cx, sql, params);
        async move {
            let outcome = pending.await;
            dispatcher.post_exec(token, &StatementDescriptor::new(sql, params, conn), outcome)
        }
    }

    fn savepoint(&self, cx: &Cx, name: &str) -> impl Future<Output = Outcome<(), Error>> + Send {
        self.inner.savepoint(cx, name)
    }

    fn rollback_to(&self, cx: &Cx, name: &str) -> impl Future<Output = Outcome<(), Error>> + Send {
        self.inner.rollback_to(cx, name)
    }

    fn release(&self, cx: &Cx, name: &str) -> impl Future<Output = Outcome<(), Error>> + Send {
        self.inner.release(cx, name)
    }

    async fn commit(self, cx: &Cx) -> Outcome<(), Error> {
        let Self {
            inner,
            dispatcher,
            conn,
        } = self;
        let token = dispatcher.pre(HookPoint::Commit);
        let outcome = inner.commit(cx).await;
        dispatcher.post_query(token, &StatementDescriptor::new("COMMIT", &[], conn), outcome)
    }

    async fn rollback(self, cx: &Cx) -> Outcome<(), Error> {
        let Self {
            inner,
            dispatcher,
            conn,
        } = self;
        let token = dispatcher.pre(HookPoint::Rollback);
        let outcome = inner.rollback(cx).await;
        dispatcher.post_query(token, &StatementDescriptor::new("ROLLBACK", &[], conn), outcome)
    }
}
