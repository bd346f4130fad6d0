//! A recording in-memory driver for hook tests.
//!
//! Every statement a mock connection receives is appended to a shared log.
//! INSERTs report a generated id: the first parameter when it is an integer,
//! otherwise the next value of a shared counter.

#![allow(dead_code)]

use asupersync::runtime::RuntimeBuilder;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use ttools::{
    Connection, Cx, Driver, Error, ExecResult, IsolationLevel, Outcome, PreparedStatement, Row,
    TransactionOps, Value,
};

pub fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

pub fn block_on<F: Future>(future: F) -> F::Output {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    rt.block_on(future)
}

#[derive(Debug)]
pub struct MockState {
    statements: Mutex<Vec<String>>,
    failures: Mutex<Vec<String>>,
    report_ids: AtomicBool,
    next_id: AtomicI64,
    next_stmt: AtomicU64,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            statements: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
            report_ids: AtomicBool::new(true),
            next_id: AtomicI64::new(100),
            next_stmt: AtomicU64::new(0),
            opened: AtomicUsize::new(0),
            closed: AtomicUsize::new(0),
        }
    }
}

impl MockState {
    /// Every statement received so far, in order.
    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }

    /// Statements starting with `prefix`.
    pub fn statements_starting(&self, prefix: &str) -> Vec<String> {
        self.statements()
            .into_iter()
            .filter(|sql| sql.starts_with(prefix))
            .collect()
    }

    pub fn clear_statements(&self) {
        self.statements.lock().unwrap().clear();
    }

    /// Fail every statement containing `pattern`.
    pub fn fail_on(&self, pattern: &str) {
        self.failures.lock().unwrap().push(pattern.to_string());
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    pub fn set_report_ids(&self, report: bool) {
        self.report_ids.store(report, Ordering::SeqCst);
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    fn run(&self, sql: &str, params: &[Value]) -> Outcome<ExecResult, Error> {
        self.statements.lock().unwrap().push(sql.to_string());

        if self
            .failures
            .lock()
            .unwrap()
            .iter()
            .any(|pattern| sql.contains(pattern.as_str()))
        {
            return Outcome::Err(Error::Custom(format!("mock failure: {sql}")));
        }

        let upper = sql.trim_start().to_uppercase();
        if upper.starts_with("INSERT") {
            if !self.report_ids.load(Ordering::SeqCst) {
                return Outcome::Ok(ExecResult::affected(1));
            }
            let id = match params.first() {
                Some(Value::BigInt(id)) => *id,
                Some(Value::Int(id)) => i64::from(*id),
                _ => self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            };
            return Outcome::Ok(ExecResult::inserted(id));
        }
        if upper.starts_with("DELETE") {
            return Outcome::Ok(ExecResult::affected(1));
        }
        Outcome::Ok(ExecResult::default())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockDriver {
    pub state: Arc<MockState>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Driver for MockDriver {
    type Conn = MockConnection;

    fn open(&self, _cx: &Cx, dsn: &str) -> impl Future<Output = Outcome<Self::Conn, Error>> + Send {
        let state = Arc::clone(&self.state);
        let failed = state
            .failures
            .lock()
            .unwrap()
            .iter()
            .any(|pattern| pattern == dsn);
        async move {
            if failed {
                return Outcome::Err(Error::Custom(format!("cannot open {dsn}")));
            }
            state.opened.fetch_add(1, Ordering::SeqCst);
            Outcome::Ok(MockConnection { state })
        }
    }
}

#[derive(Debug)]
pub struct MockConnection {
    state: Arc<MockState>,
}

impl Connection for MockConnection {
    type Tx<'conn>
        = MockTransaction<'conn>
    where
        Self: 'conn;

    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let outcome = self.state.run(sql, params).map(|_| Vec::new());
        async move { outcome }
    }

    fn query_one(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send {
        let outcome = self.state.run(sql, params).map(|_| None);
        async move { outcome }
    }

    fn execute(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let outcome = self.state.run(sql, params).map(|r| r.rows_affected);
        async move { outcome }
    }

    fn execute_result(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<ExecResult, Error>> + Send {
        let outcome = self.state.run(sql, params);
        async move { outcome }
    }

    fn insert(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<i64, Error>> + Send {
        let outcome = self
            .state
            .run(sql, params)
            .map(|r| r.last_insert_id.unwrap_or_default());
        async move { outcome }
    }

    fn batch(
        &self,
        _cx: &Cx,
        statements: &[(String, Vec<Value>)],
    ) -> impl Future<Output = Outcome<Vec<u64>, Error>> + Send {
        let mut affected = Vec::with_capacity(statements.len());
        let mut failure = None;
        for (sql, params) in statements {
            match self.state.run(sql, params) {
                Outcome::Ok(r) => affected.push(r.rows_affected),
                other => {
                    failure = Some(other.map(|_| Vec::new()));
                    break;
                }
            }
        }
        async move { failure.unwrap_or(Outcome::Ok(affected)) }
    }

    fn begin(&self, cx: &Cx) -> impl Future<Output = Outcome<Self::Tx<'_>, Error>> + Send {
        self.begin_with(cx, IsolationLevel::default())
    }

    fn begin_with(
        &self,
        _cx: &Cx,
        _isolation: IsolationLevel,
    ) -> impl Future<Output = Outcome<Self::Tx<'_>, Error>> + Send {
        let outcome = self
            .state
            .run("BEGIN", &[])
            .map(|_| MockTransaction { conn: self });
        async move { outcome }
    }

    fn prepare(
        &self,
        _cx: &Cx,
        sql: &str,
    ) -> impl Future<Output = Outcome<PreparedStatement, Error>> + Send {
        let id = self.state.next_stmt.fetch_add(1, Ordering::SeqCst) + 1;
        let stmt = PreparedStatement::new(id, sql.to_string(), sql.matches('?').count());
        async move { Outcome::Ok(stmt) }
    }

    fn query_prepared(
        &self,
        cx: &Cx,
        stmt: &PreparedStatement,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        self.query(cx, stmt.sql(), params)
    }

    fn execute_prepared(
        &self,
        cx: &Cx,
        stmt: &PreparedStatement,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        self.execute(cx, stmt.sql(), params)
    }

    fn execute_prepared_result(
        &self,
        cx: &Cx,
        stmt: &PreparedStatement,
        params: &[Value],
    ) -> impl Future<Output = Outcome<ExecResult, Error>> + Send {
        self.execute_result(cx, stmt.sql(), params)
    }

    fn ping(&self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        async { Outcome::Ok(()) }
    }

    async fn close(self, _cx: &Cx) -> ttools::Result<()> {
        self.state.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct MockTransaction<'conn> {
    conn: &'conn MockConnection,
}

impl TransactionOps for MockTransaction<'_> {
    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        self.conn.query(cx, sql, params)
    }

    fn query_one(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send {
        self.conn.query_one(cx, sql, params)
    }

    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        self.conn.execute(cx, sql, params)
    }

    fn execute_result(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<ExecResult, Error>> + Send {
        self.conn.execute_result(cx, sql, params)
    }

    fn savepoint(&self, _cx: &Cx, name: &str) -> impl Future<Output = Outcome<(), Error>> + Send {
        let outcome = self.conn.state.run(&format!("SAVEPOINT {name}"), &[]).map(|_| ());
        async move { outcome }
    }

    fn rollback_to(&self, _cx: &Cx, name: &str) -> impl Future<Output = Outcome<(), Error>> + Send {
        let outcome = self
            .conn
            .state
            .run(&format!("ROLLBACK TO SAVEPOINT {name}"), &[])
            .map(|_| ());
        async move { outcome }
    }

    fn release(&self, _cx: &Cx, name: &str) -> impl Future<Output = Outcome<(), Error>> + Send {
        let outcome = self
            .conn
            .state
            .run(&format!("RELEASE SAVEPOINT {name}"), &[])
            .map(|_| ());
        async move { outcome }
    }

    async fn commit(self, _cx: &Cx) -> Outcome<(), Error> {
        self.conn.state.run("COMMIT", &[]).map(|_| ())
    }

    async fn rollback(self, _cx: &Cx) -> Outcome<(), Error> {
        self.conn.state.run("ROLLBACK", &[]).map(|_| ())
    }
}
