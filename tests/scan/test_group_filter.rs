use crate::common::{self, CountingProvider, TestProject, sample_text};
use semdex::retrieve::find_similar;
use semdex::{FilePartId, GroupFlag, MemoryStore, ScanCoordinator, SimilarityIndexStore};
use tokio_util::sync::CancellationToken;

fn ids_in(store: &MemoryStore, scope: &semdex::IndexScope) -> Vec<FilePartId> {
    let mut ids = Vec::new();
    for file in store.files_in_scope(scope).unwrap() {
        ids.extend(store.parts_for_file(file.id).unwrap().into_iter().map(|p| p.id));
    }
    ids.sort();
    ids
}

#[test]
fn test_flag_filter_over_scanned_scopes() {
    let code_project = TestProject::new();
    code_project.add_file("parser.rs", sample_text::PARSER);
    let docs_project = TestProject::new();
    docs_project.add_file("guide.md", sample_text::README);

    let code = common::scope("repo", 0b0010);
    let docs = common::scope("repo", 0b1000);
    let provider = CountingProvider::new();
    let mut store = MemoryStore::new();
    let token = CancellationToken::new();
    ScanCoordinator::new(code.clone(), code_project.scan_options())
        .run(&mut store, &provider, &token)
        .unwrap();
    ScanCoordinator::new(docs.clone(), docs_project.scan_options())
        .run(&mut store, &provider, &token)
        .unwrap();

    let query = CountingProvider::vector(sample_text::PARSER);
    let code_ids = ids_in(&store, &code);
    let docs_ids = ids_in(&store, &docs);

    let mut everything = find_similar(&store, "", GroupFlag::empty(), &query, 10).unwrap();
    everything.sort();
    let mut expected: Vec<FilePartId> = code_ids.iter().chain(&docs_ids).copied().collect();
    expected.sort();
    assert_eq!(everything, expected);

    let mut masked = find_similar(&store, "", GroupFlag::new(0b0110), &query, 10).unwrap();
    masked.sort();
    assert_eq!(masked, code_ids);

    let docs_only = find_similar(&store, "repo", GroupFlag::new(0b1000), &query, 10).unwrap();
    assert_eq!(docs_only, docs_ids);

    assert!(
        find_similar(&store, "other", GroupFlag::empty(), &query, 10)
            .unwrap()
            .is_empty()
    );
}

#[test]
fn test_best_match_ranks_first() {
    let project = TestProject::new();
    project.add_file("parser.rs", sample_text::PARSER);
    project.add_file("net.rs", sample_text::NETWORK);
    project.add_file("README.md", sample_text::README);

    let scope = common::scope("code", 1);
    let mut store = MemoryStore::new();
    ScanCoordinator::new(scope.clone(), project.scan_options())
        .run(&mut store, &CountingProvider::new(), &CancellationToken::new())
        .unwrap();

    let query = CountingProvider::vector(sample_text::NETWORK);
    let found = find_similar(&store, "code", GroupFlag::new(1), &query, 1).unwrap();
    let parts = store.get_parts(&found).unwrap();
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0].text, common::chunked(sample_text::NETWORK));
}
