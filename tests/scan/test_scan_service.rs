use crate::common::{self, CountingProvider, TestProject, sample_text};
use parking_lot::Mutex;
use semdex::{MemoryStore, ScanEvent, ScanService, ScanState};
use std::sync::Arc;

#[test]
fn test_service_streams_events_and_report() {
    let project = TestProject::new();
    project.add_file("a.rs", sample_text::PARSER);
    project.add_file("b.rs", sample_text::NETWORK);

    let provider = Arc::new(CountingProvider::new());
    let mut service = ScanService::new(Arc::new(Mutex::new(MemoryStore::new())), provider.clone());
    let (tx, rx) = crossbeam_channel::unbounded();
    service
        .start(common::scope("code", 1), project.scan_options(), Some(tx))
        .unwrap();

    let mut finished = 0;
    let mut last_state = None;
    for event in rx.iter() {
        match event {
            ScanEvent::FileFinished { .. } => finished += 1,
            ScanEvent::Finished { state, .. } => {
                last_state = Some(state);
                break;
            }
            _ => {}
        }
    }
    assert_eq!(finished, 2);
    assert_eq!(last_state, Some(ScanState::Completed));

    let report = service.wait().unwrap().unwrap();
    assert_eq!(report.counts.updated, 2);
    assert_eq!(provider.calls(), 2);
    assert_eq!(service.store().lock().part_count(), 2);
}

#[test]
fn test_cancel_through_service() {
    let project = TestProject::new();
    for i in 0..5 {
        project.add_file(&format!("f{i}.txt"), "some words here");
    }

    let mut service = ScanService::new(
        Arc::new(Mutex::new(MemoryStore::new())),
        Arc::new(CountingProvider::new()),
    );
    let store = Arc::clone(service.store());
    let guard = store.lock();
    let token = service
        .start(common::scope("code", 1), project.scan_options(), None)
        .unwrap();
    service.cancel();
    assert!(token.is_cancelled());
    drop(guard);

    let report = service.wait().unwrap().unwrap();
    assert_eq!(report.state, ScanState::Canceled);
    assert_eq!(store.lock().file_count(), 0);
}
