use crate::common::{self, CancelingProvider, CountingProvider, TestProject, sample_text};
use semdex::{MemoryStore, ProgressStatus, ScanCoordinator, ScanState, SimilarityIndexStore};
use tokio_util::sync::CancellationToken;

#[test]
fn test_canceled_scan_deletes_nothing() {
    let project = TestProject::new();
    project.add_file("a.rs", sample_text::PARSER);
    let removed = project.add_file("b.rs", sample_text::NETWORK);

    let scope = common::scope("code", 1);
    let scan = ScanCoordinator::new(scope.clone(), project.scan_options());
    let mut store = MemoryStore::new();
    scan.run(&mut store, &CountingProvider::new(), &CancellationToken::new())
        .unwrap();

    project.remove_file("b.rs");
    project.add_file("a.rs", "fn a_changed() {}");

    let token = CancellationToken::new();
    let provider = CancelingProvider::new(token.clone());
    let report = scan.run(&mut store, &provider, &token).unwrap();

    assert_eq!(report.state, ScanState::Canceled);
    assert_eq!(report.counts.canceled, 1);
    assert_eq!(report.rows_reconciled, 0);

    let stale = store.find_file(&scope, &removed).unwrap().unwrap();
    assert_eq!(stale.state, ProgressStatus::Started);
    assert_eq!(store.parts_for_file(stale.id).unwrap().len(), 1);
}

#[test]
fn test_removed_file_is_reconciled_after_clean_scan() {
    let project = TestProject::new();
    project.add_file("a.rs", sample_text::PARSER);
    let removed = project.add_file("b.rs", sample_text::NETWORK);

    let scope = common::scope("code", 1);
    let scan = ScanCoordinator::new(scope.clone(), project.scan_options());
    let provider = CountingProvider::new();
    let mut store = MemoryStore::new();
    let token = CancellationToken::new();
    scan.run(&mut store, &provider, &token).unwrap();
    assert_eq!(store.part_count(), 2);

    project.remove_file("b.rs");
    let report = scan.run(&mut store, &provider, &token).unwrap();

    assert_eq!(report.state, ScanState::Completed);
    assert_eq!(report.counts.skipped, 1);
    // One file row plus its part.
    assert_eq!(report.rows_reconciled, 2);
    assert!(store.find_file(&scope, &removed).unwrap().is_none());
    assert_eq!(store.part_count(), 1);
    assert_eq!(common::file_count(&store, &scope), 1);
}

#[test]
fn test_failed_file_blocks_reconciliation() {
    let project = TestProject::new();
    project.add_file("a.rs", sample_text::PARSER);
    let removed = project.add_file("b.rs", sample_text::NETWORK);

    let scope = common::scope("code", 1);
    let scan = ScanCoordinator::new(scope.clone(), project.scan_options());
    let provider = CountingProvider::new();
    let mut store = MemoryStore::new();
    let token = CancellationToken::new();
    scan.run(&mut store, &provider, &token).unwrap();

    project.remove_file("b.rs");
    std::fs::write(project.path().join("blob.bin"), [0xff, 0xfe, 0x00, 0xc3]).unwrap();
    let report = scan.run(&mut store, &provider, &token).unwrap();

    assert_eq!(report.state, ScanState::Completed);
    assert_eq!(report.counts.failed, 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.rows_reconciled, 0);
    assert!(store.find_file(&scope, &removed).unwrap().is_some());
}

#[test]
fn test_other_scopes_are_untouched() {
    let project = TestProject::new();
    project.add_file("a.rs", sample_text::PARSER);

    let code = common::scope("code", 1);
    let docs = common::scope("docs", 1);
    let provider = CountingProvider::new();
    let mut store = MemoryStore::new();
    let token = CancellationToken::new();
    ScanCoordinator::new(docs.clone(), project.scan_options())
        .run(&mut store, &provider, &token)
        .unwrap();

    project.remove_file("a.rs");
    project.add_file("c.rs", sample_text::NETWORK);
    ScanCoordinator::new(code.clone(), project.scan_options())
        .run(&mut store, &provider, &token)
        .unwrap();

    assert_eq!(common::file_count(&store, &docs), 1);
    assert_eq!(common::file_count(&store, &code), 1);
}
