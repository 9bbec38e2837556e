//! Integration tests for the execution engine
//!
//! This suite covers:
//! - Per-host outcome bucketing (ok / failed / unreachable)
//! - The zero-match global error
//! - Guaranteed, exactly-once runtime teardown on every exit path
//! - Safety-filter rejection short-circuiting execution
//! - Check mode
//! - The end-to-end single-host shell flow

mod common;

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{CountingScratch, HostBehavior, MockConnectionFactory};
use opsgate::callback::ResultCollector;
use opsgate::config::EngineConfig;
use opsgate::executor::ExecutionEngine;
use opsgate::inventory::{HostDescriptor, Inventory};

fn descriptor(name: &str, ip: &str) -> HostDescriptor {
    HostDescriptor {
        hostname: Some(name.to_string()),
        password: Some("x".to_string()),
        ..HostDescriptor::new(ip)
    }
}

fn engine_with(factory: Arc<MockConnectionFactory>) -> ExecutionEngine {
    ExecutionEngine::new(EngineConfig::default().with_forks(4)).with_factory(factory)
}

// ============================================================================
// Outcome Bucketing
// ============================================================================

#[tokio::test]
async fn test_outcomes_land_in_their_buckets() {
    let factory = Arc::new(
        MockConnectionFactory::new()
            .with_host("alpha", HostBehavior::Ok("done\n".to_string()))
            .with_host("beta", HostBehavior::Fail(1, "boom".to_string()))
            .with_host("gamma", HostBehavior::Unreachable),
    );
    let engine = engine_with(Arc::clone(&factory));

    let inventory = Inventory::build(&[
        descriptor("alpha", "10.0.0.1"),
        descriptor("beta", "10.0.0.2"),
        descriptor("gamma", "10.0.0.3"),
    ])
    .unwrap();

    let collector = Arc::new(ResultCollector::new());
    engine
        .run_module(&inventory, "shell", "uptime", "all", &collector)
        .await;

    let results = collector.snapshot();
    assert_eq!(results.ok.len(), 1);
    assert_eq!(results.failed.len(), 1);
    assert_eq!(results.unreachable.len(), 1);
    assert!(results.error.is_none());

    assert_eq!(results.ok[0].host, "alpha");
    assert_eq!(results.failed[0].host, "beta");
    assert_eq!(results.unreachable[0].host, "gamma");
    assert_eq!(factory.connect_count(), 3);
}

#[tokio::test]
async fn test_each_host_reports_exactly_once() {
    let factory = Arc::new(
        MockConnectionFactory::new()
            .with_host("a", HostBehavior::Ok(String::new()))
            .with_host("b", HostBehavior::Ok(String::new())),
    );
    let engine = engine_with(factory);

    let inventory = Inventory::build(&[
        descriptor("a", "10.0.0.1"),
        descriptor("b", "10.0.0.2"),
    ])
    .unwrap();

    let collector = Arc::new(ResultCollector::new());
    engine
        .run_module(&inventory, "shell", "true", "all", &collector)
        .await;

    let results = collector.snapshot();
    assert_eq!(results.len(), 2);
    assert_eq!(results.ok.len(), 2);
}

// ============================================================================
// Zero-Match Handling
// ============================================================================

#[tokio::test]
async fn test_zero_match_sets_global_error() {
    let engine = engine_with(Arc::new(MockConnectionFactory::new()));
    let inventory = Inventory::build(&[descriptor("alpha", "10.0.0.1")]).unwrap();

    let collector = Arc::new(ResultCollector::new());
    engine
        .run_module(&inventory, "shell", "uptime", "no-such-group", &collector)
        .await;

    let results = collector.snapshot();
    assert!(results.is_empty());
    let error = results.error.expect("global error must be set");
    assert!(!error.is_empty());
    assert!(error.contains("no hosts matched"));
}

// ============================================================================
// Teardown Guarantees
// ============================================================================

fn engine_with_counting_scratch(
    factory: Arc<MockConnectionFactory>,
    purges: Arc<AtomicUsize>,
) -> ExecutionEngine {
    engine_with(factory).with_scratch_factory(Arc::new(move || {
        Box::new(CountingScratch::new(Arc::clone(&purges)))
    }))
}

#[tokio::test]
async fn test_teardown_runs_exactly_once_on_success() {
    let purges = Arc::new(AtomicUsize::new(0));
    let factory = Arc::new(
        MockConnectionFactory::new().with_host("alpha", HostBehavior::Ok(String::new())),
    );
    let engine = engine_with_counting_scratch(factory, Arc::clone(&purges));

    let inventory = Inventory::build(&[descriptor("alpha", "10.0.0.1")]).unwrap();
    let collector = Arc::new(ResultCollector::new());
    engine
        .run_module(&inventory, "shell", "true", "all", &collector)
        .await;

    assert_eq!(purges.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_teardown_runs_exactly_once_on_zero_match() {
    let purges = Arc::new(AtomicUsize::new(0));
    let engine = engine_with_counting_scratch(
        Arc::new(MockConnectionFactory::new()),
        Arc::clone(&purges),
    );

    let inventory = Inventory::build(&[descriptor("alpha", "10.0.0.1")]).unwrap();
    let collector = Arc::new(ResultCollector::new());
    engine
        .run_module(&inventory, "shell", "true", "nothing", &collector)
        .await;

    assert_eq!(purges.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_teardown_runs_exactly_once_on_host_failures() {
    let purges = Arc::new(AtomicUsize::new(0));
    let factory = Arc::new(
        MockConnectionFactory::new().with_host("gamma", HostBehavior::Unreachable),
    );
    let engine = engine_with_counting_scratch(factory, Arc::clone(&purges));

    let inventory = Inventory::build(&[descriptor("gamma", "10.0.0.3")]).unwrap();
    let collector = Arc::new(ResultCollector::new());
    engine
        .run_module(&inventory, "shell", "true", "all", &collector)
        .await;

    assert_eq!(purges.load(Ordering::SeqCst), 1);
    assert_eq!(collector.snapshot().unreachable.len(), 1);
}

// ============================================================================
// Safety Rejection
// ============================================================================

#[tokio::test]
async fn test_protected_variable_reference_is_rejected_before_execution() {
    let factory = Arc::new(
        MockConnectionFactory::new().with_host("alpha", HostBehavior::Ok(String::new())),
    );
    let engine = engine_with(Arc::clone(&factory));

    let inventory = Inventory::build(&[descriptor("alpha", "10.0.0.1")]).unwrap();
    let collector = Arc::new(ResultCollector::new());

    let notice = engine
        .run_named_module(
            &inventory,
            "shell",
            "cat {{ ansible_ssh_pass }}",
            "all",
            &collector,
        )
        .await
        .expect("must be rejected");

    assert_eq!(notice.variable, "ansible_ssh_pass");
    assert!(collector.snapshot().is_empty());
    assert_eq!(factory.connect_count(), 0);
}

#[tokio::test]
async fn test_clean_arguments_pass_the_filter() {
    let factory = Arc::new(
        MockConnectionFactory::new().with_host("alpha", HostBehavior::Ok(String::new())),
    );
    let engine = engine_with(factory);

    let inventory = Inventory::build(&[descriptor("alpha", "10.0.0.1")]).unwrap();
    let collector = Arc::new(ResultCollector::new());

    let notice = engine
        .run_named_module(&inventory, "shell", "uptime", "all", &collector)
        .await;

    assert!(notice.is_none());
    assert_eq!(collector.snapshot().ok.len(), 1);
}

// ============================================================================
// Check Mode
// ============================================================================

#[tokio::test]
async fn test_check_mode_skips_execution() {
    let factory = Arc::new(MockConnectionFactory::new());
    let engine = ExecutionEngine::new(EngineConfig::default().with_check(true))
        .with_factory(factory.clone());

    let inventory = Inventory::build(&[descriptor("alpha", "10.0.0.1")]).unwrap();
    let collector = Arc::new(ResultCollector::new());
    engine
        .run_module(&inventory, "shell", "reboot", "all", &collector)
        .await;

    let results = collector.snapshot();
    assert_eq!(results.ok.len(), 1);
    assert_eq!(results.ok[0].result["check_mode"], true);
    assert_eq!(factory.connect_count(), 0);
}

// ============================================================================
// Playbook Execution
// ============================================================================

#[tokio::test]
async fn test_playbook_runs_tasks_in_order() {
    let factory = Arc::new(
        MockConnectionFactory::new().with_host("alpha", HostBehavior::Ok("ok\n".to_string())),
    );
    let engine = engine_with(factory);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("site.yml");
    std::fs::write(
        &path,
        "- hosts: all\n  tasks:\n    - name: first\n      shell: uptime\n    - name: second\n      shell: date\n",
    )
    .unwrap();

    let inventory = Inventory::build(&[descriptor("alpha", "10.0.0.1")]).unwrap();
    let collector = Arc::new(ResultCollector::new());
    let notice = engine.run_playbook(&inventory, &path, &collector).await;

    assert!(notice.is_none());
    let results = collector.snapshot();
    assert_eq!(results.ok.len(), 2);
    assert_eq!(results.ok[0].task_name, "first");
    assert_eq!(results.ok[1].task_name, "second");
}

#[tokio::test]
async fn test_playbook_referencing_secret_is_rejected() {
    let engine = engine_with(Arc::new(MockConnectionFactory::new()));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("leak.yml");
    std::fs::write(
        &path,
        "- hosts: all\n  tasks:\n    - name: leak\n      shell: echo {{ ansible_become_pass }}\n",
    )
    .unwrap();

    let inventory = Inventory::build(&[descriptor("alpha", "10.0.0.1")]).unwrap();
    let collector = Arc::new(ResultCollector::new());
    let notice = engine.run_playbook(&inventory, &path, &collector).await;

    assert_eq!(notice.unwrap().variable, "ansible_become_pass");
    assert!(collector.snapshot().is_empty());
}

#[tokio::test]
async fn test_missing_playbook_yields_empty_result() {
    let engine = engine_with(Arc::new(MockConnectionFactory::new()));
    let inventory = Inventory::build(&[descriptor("alpha", "10.0.0.1")]).unwrap();
    let collector = Arc::new(ResultCollector::new());

    let notice = engine
        .run_playbook(&inventory, Path::new("/no/such/playbook.yml"), &collector)
        .await;

    assert!(notice.is_none());
    assert!(collector.snapshot().is_empty());
}

// ============================================================================
// End to End
// ============================================================================

#[tokio::test]
async fn test_single_host_shell_flow() {
    let factory = Arc::new(
        MockConnectionFactory::new().with_host("git", HostBehavior::Ok(String::new())),
    );
    let engine = engine_with(factory);

    let inventory = Inventory::build(&[descriptor("git", "192.168.5.2")]).unwrap();
    let collector = Arc::new(ResultCollector::new());
    let notice = engine
        .run_named_module(&inventory, "shell", "echo hi", "git", &collector)
        .await;

    assert!(notice.is_none());
    let results = collector.snapshot();
    assert_eq!(results.ok.len(), 1);
    assert_eq!(results.ok[0].host, "git");
    assert_eq!(results.ok[0].result["stdout"], "hi");
    assert!(results.ok[0].success);
}
