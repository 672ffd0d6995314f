//! Similarity retrieval over stored parts and context rendering.

use crate::storage::{SimilarityIndexStore, StorageResult};
use crate::types::{FileId, FilePartId, GroupFilter, GroupFlag};
use crate::vector::{Score, TopK, codec};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, warn};

/// One retrieved chunk, resolved to its file.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub part_id: FilePartId,
    pub file_id: FileId,
    pub path: PathBuf,
    pub index: u32,
    pub count: u32,
    pub score: f32,
    pub text: String,
}

/// Ids of the `take` parts most similar to `query`, best first.
///
/// An empty `group_name` and a zero `group_flag` match everything; a non-zero
/// flag matches parts sharing at least one bit with it.
pub fn find_similar<S: SimilarityIndexStore + ?Sized>(
    store: &S,
    group_name: &str,
    group_flag: GroupFlag,
    query: &[f32],
    take: usize,
) -> StorageResult<Vec<FilePartId>> {
    Ok(find_similar_scored(store, group_name, group_flag, query, take)?
        .into_iter()
        .map(|(id, _)| id)
        .collect())
}

/// Like [`find_similar`], keeping each part's score.
pub fn find_similar_scored<S: SimilarityIndexStore + ?Sized>(
    store: &S,
    group_name: &str,
    group_flag: GroupFlag,
    query: &[f32],
    take: usize,
) -> StorageResult<Vec<(FilePartId, Score)>> {
    if take == 0 {
        return Ok(Vec::new());
    }

    let filter = GroupFilter::new(group_name, group_flag);
    let mut top = TopK::new(query, take);
    let mut candidates = 0usize;
    let mut visitor = |id: FilePartId, bytes: &[u8]| match codec::decode(bytes) {
        Ok(vector) => {
            candidates += 1;
            top.push(id, &vector);
        }
        Err(e) => warn!("Skipping part {id}: {e}"),
    };
    store.visit_embeddings(&filter, &mut visitor)?;

    debug!("Ranked {candidates} candidates, keeping {}", top.len());
    Ok(top.into_scored())
}

/// Loads the parts and files behind ranked ids, keeping the ranking order.
pub fn load_hits<S: SimilarityIndexStore + ?Sized>(
    store: &S,
    ranked: &[(FilePartId, Score)],
) -> StorageResult<Vec<SearchHit>> {
    let ids: Vec<FilePartId> = ranked.iter().map(|(id, _)| *id).collect();
    let scores: HashMap<FilePartId, Score> = ranked.iter().copied().collect();
    let mut paths: HashMap<FileId, PathBuf> = HashMap::new();

    let mut hits = Vec::with_capacity(ids.len());
    for part in store.get_parts(&ids)? {
        let path = match paths.get(&part.file_id) {
            Some(path) => path.clone(),
            None => {
                let Some(file) = store.get_file(part.file_id)? else {
                    warn!("Part {} has no file {}", part.id, part.file_id);
                    continue;
                };
                paths.insert(part.file_id, file.url.clone());
                file.url
            }
        };
        hits.push(SearchHit {
            part_id: part.id,
            file_id: part.file_id,
            path,
            index: part.index,
            count: part.count,
            score: scores.get(&part.id).map(Score::get).unwrap_or(Score::MIN.get()),
            text: part.text,
        });
    }
    Ok(hits)
}

/// Wraps one chunk in file markers.
pub fn format_chunk(path: &str, text: &str) -> String {
    format!("=== BEGIN FILE CHUNK: {path} ===\n{text}\n=== END FILE CHUNK: {path} ===\n")
}

/// Instructions followed by every hit rendered with [`format_chunk`].
pub fn build_context(instructions: &str, hits: &[SearchHit]) -> String {
    let mut context = String::new();
    let instructions = instructions.trim();
    if !instructions.is_empty() {
        context.push_str(instructions);
        context.push_str("\n\n");
    }
    for hit in hits {
        context.push_str(&format_chunk(&hit.path.display().to_string(), &hit.text));
        context.push('\n');
    }
    context
}
