use crate::common::{self, CountingProvider, TestProject, sample_text};
use semdex::{MemoryStore, ScanCoordinator, SimilarityIndexStore};
use std::path::Path;
use tokio_util::sync::CancellationToken;

fn part_ids(store: &MemoryStore, scope: &semdex::IndexScope, path: &Path) -> Vec<semdex::FilePartId> {
    let file = store.find_file(scope, path).unwrap().unwrap();
    store
        .parts_for_file(file.id)
        .unwrap()
        .into_iter()
        .map(|p| p.id)
        .collect()
}

#[test]
fn test_only_changed_file_is_reembedded() {
    let project = TestProject::new();
    let parser = project.add_file("parser.rs", sample_text::PARSER);
    let net = project.add_file("net.rs", sample_text::NETWORK);
    let readme = project.add_file("README.md", sample_text::README);

    let scope = common::scope("code", 1);
    let scan = ScanCoordinator::new(scope.clone(), project.scan_options());
    let provider = CountingProvider::new();
    let mut store = MemoryStore::new();
    let token = CancellationToken::new();
    scan.run(&mut store, &provider, &token).unwrap();

    let net_before = part_ids(&store, &scope, &net);
    let readme_before = part_ids(&store, &scope, &readme);
    let parser_before = part_ids(&store, &scope, &parser);

    project.add_file("parser.rs", "fn parse_v2() { completely different text }");
    let report = scan.run(&mut store, &provider, &token).unwrap();

    assert_eq!(report.counts.updated, 1);
    assert_eq!(report.counts.skipped, 2);
    assert_eq!(provider.calls(), 4);

    assert_eq!(part_ids(&store, &scope, &net), net_before);
    assert_eq!(part_ids(&store, &scope, &readme), readme_before);

    let parser_after = part_ids(&store, &scope, &parser);
    assert_eq!(parser_after.len(), 1);
    assert!(parser_after.iter().all(|id| !parser_before.contains(id)));
    let parts = store.get_parts(&parser_after).unwrap();
    assert_eq!(parts[0].text, "fn parse_v2 completely different text");
    assert_eq!(common::file_count(&store, &scope), 3);
}

#[test]
fn test_model_change_reembeds_unchanged_text() {
    let project = TestProject::new();
    project.add_file("a.txt", sample_text::README);

    let scope = common::scope("docs", 1);
    let provider = CountingProvider::new();
    let mut store = MemoryStore::new();
    let token = CancellationToken::new();
    ScanCoordinator::new(scope.clone(), project.scan_options())
        .run(&mut store, &provider, &token)
        .unwrap();

    let mut options = project.scan_options();
    options.indexer.model = "other-model".to_string();
    let report = ScanCoordinator::new(scope.clone(), options)
        .run(&mut store, &provider, &token)
        .unwrap();

    assert_eq!(report.counts.updated, 1);
    let file = store.files_in_scope(&scope).unwrap().remove(0);
    let parts = store.parts_for_file(file.id).unwrap();
    assert_eq!(parts[0].embedding_model, "other-model");
}

#[test]
fn test_editing_middle_chunk_replaces_whole_part_set() {
    let project = TestProject::new();
    let doc = project.add_file(
        "notes.txt",
        "alpha beta gamma delta epsilon zeta eta theta iota",
    );
    let net = project.add_file("net.rs", sample_text::NETWORK);
    let readme = project.add_file("README.md", sample_text::README);

    let scope = common::scope("docs", 1);
    let mut options = project.scan_options();
    options.indexer.max_tokens_per_chunk = 3;
    let scan = ScanCoordinator::new(scope.clone(), options);
    let provider = CountingProvider::new();
    let mut store = MemoryStore::new();
    let token = CancellationToken::new();
    scan.run(&mut store, &provider, &token).unwrap();

    let doc_before = part_ids(&store, &scope, &doc);
    assert_eq!(doc_before.len(), 3);
    let net_before = part_ids(&store, &scope, &net);
    let readme_before = part_ids(&store, &scope, &readme);

    project.add_file(
        "notes.txt",
        "alpha beta gamma DELTA rewritten ZETA eta theta iota",
    );
    let report = scan.run(&mut store, &provider, &token).unwrap();
    assert_eq!(report.counts.updated, 1);
    assert_eq!(report.counts.skipped, 2);
    assert_eq!(provider.calls(), 4);

    assert!(store.get_parts(&doc_before).unwrap().is_empty());
    let doc_after = part_ids(&store, &scope, &doc);
    assert_eq!(doc_after.len(), 3);
    assert!(doc_after.iter().all(|id| !doc_before.contains(id)));

    let file = store.find_file(&scope, &doc).unwrap().unwrap();
    let parts = store.parts_for_file(file.id).unwrap();
    let texts: Vec<&str> = parts.iter().map(|p| p.text.as_str()).collect();
    assert_eq!(
        texts,
        vec!["alpha beta gamma", "DELTA rewritten ZETA", "eta theta iota"]
    );
    assert!(parts.iter().enumerate().all(|(i, p)| p.index == i as u32 && p.count == 3));

    assert_eq!(part_ids(&store, &scope, &net), net_before);
    assert_eq!(part_ids(&store, &scope, &readme), readme_before);
}
