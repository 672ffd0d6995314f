use crate::common::{self, FailingProvider, TestProject};
use semdex::{MemoryStore, ProgressStatus, ScanCoordinator, ScanState, SimilarityIndexStore};
use tokio_util::sync::CancellationToken;

#[test]
fn test_scan_aborts_after_max_exceptions() {
    let project = TestProject::new();
    for i in 0..10 {
        project.add_file(&format!("file{i:02}.txt"), &format!("content number {i}"));
    }

    let scope = common::scope("code", 1);
    let options = project.scan_options();
    assert_eq!(options.max_exceptions, 5);

    let provider = FailingProvider::default();
    let mut store = MemoryStore::new();
    let report = ScanCoordinator::new(scope.clone(), options)
        .run(&mut store, &provider, &CancellationToken::new())
        .unwrap();

    assert_eq!(report.state, ScanState::Aborted);
    assert_eq!(provider.calls(), 6);
    assert_eq!(report.counts.exception, 6);
    assert_eq!(report.files_seen, 6);
    assert_eq!(report.rows_reconciled, 0);
    assert_eq!(report.errors.len(), 6);

    // Files reached before the abort exist but carry no parts.
    for file in store.files_in_scope(&scope).unwrap() {
        assert_eq!(file.state, ProgressStatus::Started);
        assert!(store.parts_for_file(file.id).unwrap().is_empty());
    }
}

#[test]
fn test_aborted_scan_keeps_committed_work() {
    let project = TestProject::new();
    project.add_file("a.txt", "alpha");
    project.add_file("b.txt", "beta");

    let scope = common::scope("code", 1);
    let mut store = MemoryStore::new();
    ScanCoordinator::new(scope.clone(), project.scan_options())
        .run(&mut store, &common::CountingProvider::new(), &CancellationToken::new())
        .unwrap();
    assert_eq!(store.part_count(), 2);

    for i in 0..3 {
        project.add_file(&format!("new{i}.txt"), "fresh text");
    }
    let mut options = project.scan_options();
    options.max_exceptions = 1;
    let provider = FailingProvider::default();
    let report = ScanCoordinator::new(scope, options)
        .run(&mut store, &provider, &CancellationToken::new())
        .unwrap();

    assert_eq!(report.state, ScanState::Aborted);
    assert_eq!(provider.calls(), 2);
    assert_eq!(store.part_count(), 2);
}
