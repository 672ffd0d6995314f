use crate::common::{self, CountingProvider, TestProject, sample_text};
use semdex::retrieve::{build_context, find_similar_scored, load_hits};
use semdex::{GroupFlag, ScanCoordinator, ScanState, SimilarityIndexStore, SqliteStore};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

#[test]
fn test_scan_persists_and_searches() {
    let project = TestProject::new();
    project.add_file("src/parser.rs", sample_text::PARSER);
    project.add_file("src/net.rs", sample_text::NETWORK);
    let index_dir = TempDir::new().unwrap();
    let index_path = index_dir.path().join(".semdex").join("index.db");

    let scope = common::scope("code", 0b0100);
    let mut options = project.scan_options();
    options.flag_name = Some("sources".to_string());
    let scan = ScanCoordinator::new(scope.clone(), options);
    let provider = CountingProvider::new();
    let token = CancellationToken::new();

    {
        let mut store = SqliteStore::open(&index_path).unwrap();
        let report = scan.run(&mut store, &provider, &token).unwrap();
        assert_eq!(report.state, ScanState::Completed);
        assert_eq!(report.counts.updated, 2);
    }

    let mut store = SqliteStore::open(&index_path).unwrap();
    let report = scan.run(&mut store, &provider, &token).unwrap();
    assert_eq!(report.counts.skipped, 2);
    assert_eq!(provider.calls(), 2);

    let stats = store.group_stats().unwrap();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].group_name, "code");
    assert_eq!(stats[0].flag_name, "sources");
    assert_eq!(stats[0].part_count, 2);

    let query = CountingProvider::vector(sample_text::PARSER);
    let ranked = find_similar_scored(&store, "", GroupFlag::new(0b0110), &query, 1).unwrap();
    let hits = load_hits(&store, &ranked).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].path, project.path().join("src/parser.rs"));
    assert_eq!(hits[0].text, common::chunked(sample_text::PARSER));

    let context = build_context("Context:", &hits);
    assert!(context.contains("=== BEGIN FILE CHUNK:"));
    assert!(context.contains(&common::chunked(sample_text::PARSER)));
}

#[test]
fn test_removed_file_reconciled_on_disk() {
    let project = TestProject::new();
    project.add_file("a.rs", sample_text::PARSER);
    let removed = project.add_file("b.rs", sample_text::NETWORK);
    let index_dir = TempDir::new().unwrap();

    let scope = common::scope("code", 1);
    let scan = ScanCoordinator::new(scope.clone(), project.scan_options());
    let provider = CountingProvider::new();
    let token = CancellationToken::new();
    let mut store = SqliteStore::open(&index_dir.path().join("index.db")).unwrap();
    scan.run(&mut store, &provider, &token).unwrap();

    project.remove_file("b.rs");
    let report = scan.run(&mut store, &provider, &token).unwrap();
    assert_eq!(report.rows_reconciled, 2);
    assert!(store.find_file(&scope, &removed).unwrap().is_none());
    assert_eq!(common::file_count(&store, &scope), 1);
}
