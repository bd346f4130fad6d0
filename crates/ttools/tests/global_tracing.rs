//! The process-wide tracing switch. Kept in its own test binary so flipping
//! it cannot race with other tests.

mod common;

use asupersync::Cx;
use common::{MockDriver, block_on, unwrap_outcome};
use std::collections::HashSet;
use std::sync::Arc;
use ttools::prelude::*;
use ttools::{MemoryLog, TraceFormat, set_tracing, tracing_enabled};

fn run_statements(driver: &HookedDriver<MockDriver>) {
    let cx = Cx::for_testing();
    block_on(async {
        let conn = unwrap_outcome(driver.open(&cx, "db").await);
        unwrap_outcome(conn.query(&cx, "SELECT 1", &[]).await);
        unwrap_outcome(conn.execute(&cx, "UPDATE t1 SET n = n + 1", &[]).await);
        conn.close(&cx).await.expect("close");
    });
}

#[test]
fn global_switch_applies_unless_overridden() {
    let log = Arc::new(MemoryLog::new());
    let follows = HookedDriver::with_log(MockDriver::new(), HookConfig::default(), log.clone())
        .expect("valid hook config");

    let pinned_log = Arc::new(MemoryLog::new());
    let pinned = HookedDriver::with_log(
        MockDriver::new(),
        HookConfig::default().trace(Some(false)),
        pinned_log.clone(),
    )
    .expect("valid hook config");

    assert!(!tracing_enabled());
    run_statements(&follows);
    assert!(log.is_empty());

    set_tracing(true);
    run_statements(&follows);
    run_statements(&pinned);
    set_tracing(false);

    assert_eq!(log.len(), 2);
    assert!(pinned_log.is_empty());

    run_statements(&follows);
    assert_eq!(log.len(), 2);
}

#[test]
fn json_format_is_accepted() {
    // Output goes to the tracing subscriber; this only checks the driver path.
    let config = HookConfig::default()
        .trace(Some(true))
        .trace_format(TraceFormat::Json);
    let driver = HookedDriver::new(MockDriver::new(), config).expect("valid hook config");
    run_statements(&driver);
    assert_eq!(driver.open_connections(), 0);
}

#[test]
fn generated_ids_are_unique_across_threads() {
    let handles: Vec<_> = (0..10)
        .map(|_| std::thread::spawn(|| (0..5_000).map(|_| ttools::id()).collect::<Vec<_>>()))
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        for id in handle.join().expect("id thread") {
            assert!(seen.insert(id), "duplicate id {id}");
        }
    }
    assert_eq!(seen.len(), 50_000);
}
