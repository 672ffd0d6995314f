use crate::common::{self, CountingProvider, TestProject, sample_text};
use semdex::{MemoryStore, ProgressStatus, ScanCoordinator, ScanState, SimilarityIndexStore};
use tokio_util::sync::CancellationToken;

#[test]
fn test_second_scan_skips_everything() {
    let project = TestProject::new();
    project.add_file("src/parser.rs", sample_text::PARSER);
    project.add_file("src/net.rs", sample_text::NETWORK);
    project.add_file("README.md", sample_text::README);

    let scope = common::scope("code", 1);
    let scan = ScanCoordinator::new(scope.clone(), project.scan_options());
    let provider = CountingProvider::new();
    let mut store = MemoryStore::new();
    let token = CancellationToken::new();

    let first = scan.run(&mut store, &provider, &token).unwrap();
    assert_eq!(first.state, ScanState::Completed);
    assert_eq!(first.counts.updated, 3);
    assert_eq!(provider.calls(), 3);
    let parts_before = store.part_count();

    let second = scan.run(&mut store, &provider, &token).unwrap();
    assert_eq!(second.state, ScanState::Completed);
    assert_eq!(second.counts.skipped, 3);
    assert_eq!(second.counts.updated, 0);
    assert_eq!(second.rows_reconciled, 0);
    assert_eq!(provider.calls(), 3, "no provider call for unchanged files");
    assert_eq!(store.part_count(), parts_before);

    for file in store.files_in_scope(&scope).unwrap() {
        assert_eq!(file.state, ProgressStatus::Completed);
        for part in store.parts_for_file(file.id).unwrap() {
            assert_eq!(part.state, ProgressStatus::Completed);
        }
    }
}
