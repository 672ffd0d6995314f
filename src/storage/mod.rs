//! Persistence port for files, their embedded parts and group metadata.
//!
//! The indexer and the scan coordinator only ever talk to
//! [`SimilarityIndexStore`]. Two implementations ship with the crate: the
//! in-memory [`MemoryStore`] and the SQLite-backed [`SqliteStore`].

pub mod error;
pub mod memory;
pub mod sqlite;

pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::indexing::fingerprint::Digest;
use crate::types::{FileId, FilePartId, GroupFilter, GroupFlag, IndexScope, ProgressStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// A stored file row.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    pub id: FileId,
    pub group_name: String,
    pub group_flag: GroupFlag,
    pub url: PathBuf,
    pub name: String,
    pub hash: Digest,
    pub size: u64,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub state: ProgressStatus,
    pub is_enabled: bool,
}

/// Values for a file row about to be inserted.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub group_name: String,
    pub group_flag: GroupFlag,
    pub url: PathBuf,
    pub name: String,
    pub hash: Digest,
    pub size: u64,
    pub state: ProgressStatus,
}

impl NewFile {
    pub fn new(scope: &IndexScope, url: &Path, hash: Digest, size: u64) -> Self {
        Self {
            group_name: scope.group_name.clone(),
            group_flag: scope.group_flag,
            url: url.to_path_buf(),
            name: url
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            hash,
            size,
            state: ProgressStatus::Started,
        }
    }
}

/// A stored chunk of a file with its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct FilePart {
    pub id: FilePartId,
    pub file_id: FileId,
    pub index: u32,
    pub count: u32,
    pub hash: Digest,
    pub embedding_model: String,
    pub embedding_size: u32,
    /// Vector bytes as produced by [`crate::vector::codec::encode`].
    pub embedding: Vec<u8>,
    pub text: String,
    pub text_tokens: u32,
    pub group_name: String,
    pub group_flag: GroupFlag,
    pub state: ProgressStatus,
    pub is_enabled: bool,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

/// Values for a part row about to be inserted.
#[derive(Debug, Clone)]
pub struct NewFilePart {
    pub index: u32,
    pub count: u32,
    pub hash: Digest,
    pub embedding_model: String,
    pub embedding_size: u32,
    pub embedding: Vec<u8>,
    pub text: String,
    pub text_tokens: u32,
    pub group_name: String,
    pub group_flag: GroupFlag,
    pub state: ProgressStatus,
}

/// Descriptive metadata for a `(name, flag)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Group {
    pub name: String,
    #[serde(serialize_with = "serialize_flag")]
    pub flag: GroupFlag,
    pub flag_name: String,
}

/// Part counts per `(group_name, group_flag)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupStat {
    pub group_name: String,
    #[serde(serialize_with = "serialize_flag")]
    pub group_flag: GroupFlag,
    pub flag_name: String,
    pub part_count: usize,
}

fn serialize_flag<S: serde::Serializer>(flag: &GroupFlag, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(flag.bits())
}

/// Callback receiving candidate embeddings during a similarity query.
pub type EmbeddingVisitor<'a> = dyn FnMut(FilePartId, &[u8]) + 'a;

/// Persistence port for the embedding index.
///
/// Stores are single-session: reads take `&self`, writes `&mut self`. File
/// scope matching (`find_file`, `set_state`, `delete_by_state`) is exact on
/// `(group_name, group_flag)`; query filtering (`visit_embeddings`) uses the
/// wildcard rules of [`GroupFilter`].
pub trait SimilarityIndexStore: Send {
    // Files

    /// Inserts a file row. Fails with [`StorageError::Duplicate`] if an enabled
    /// file already exists for the same scope and url.
    fn insert_file(&mut self, file: NewFile) -> StorageResult<FileId>;
    fn get_file(&self, id: FileId) -> StorageResult<Option<FileRecord>>;
    /// The enabled file for `url` in `scope`, if any.
    fn find_file(&self, scope: &IndexScope, url: &Path) -> StorageResult<Option<FileRecord>>;
    fn files_in_scope(&self, scope: &IndexScope) -> StorageResult<Vec<FileRecord>>;
    fn set_file_state(&mut self, id: FileId, state: ProgressStatus) -> StorageResult<()>;
    fn set_file_enabled(&mut self, id: FileId, enabled: bool) -> StorageResult<()>;
    /// Deletes a file and its parts. Returns whether the file existed.
    fn delete_file(&mut self, id: FileId) -> StorageResult<bool>;

    // Parts

    /// Parts of a file ordered by index.
    fn parts_for_file(&self, file_id: FileId) -> StorageResult<Vec<FilePart>>;
    /// Parts with the given ids, in the order the ids were given. Unknown ids
    /// are skipped.
    fn get_parts(&self, ids: &[FilePartId]) -> StorageResult<Vec<FilePart>>;
    /// Atomically replaces every part of `file_id` with `parts`.
    fn replace_parts(
        &mut self,
        file_id: FileId,
        parts: Vec<NewFilePart>,
    ) -> StorageResult<Vec<FilePartId>>;
    fn set_parts_state(&mut self, file_id: FileId, state: ProgressStatus) -> StorageResult<usize>;
    fn delete_parts_for_file(&mut self, file_id: FileId) -> StorageResult<usize>;

    // Groups

    /// Creates or updates a group. `None` keeps an existing label.
    fn upsert_group(
        &mut self,
        name: &str,
        flag: GroupFlag,
        flag_name: Option<&str>,
    ) -> StorageResult<Group>;
    fn get_group(&self, name: &str, flag: GroupFlag) -> StorageResult<Option<Group>>;
    fn list_groups(&self) -> StorageResult<Vec<Group>>;
    /// Deletes groups no file references. Returns the number removed.
    fn prune_groups(&mut self) -> StorageResult<usize>;

    // Bulk state

    /// Sets the state of every file and part in `scope`. Returns rows touched.
    fn set_state(&mut self, scope: &IndexScope, state: ProgressStatus) -> StorageResult<usize>;
    /// Deletes every part and file in `scope` whose state is `state`, plus the
    /// parts of deleted files. Returns rows deleted.
    fn delete_by_state(&mut self, scope: &IndexScope, state: ProgressStatus)
    -> StorageResult<usize>;

    // Queries

    /// Streams `(part id, embedding bytes)` for every enabled part of an
    /// enabled file accepted by `filter`.
    fn visit_embeddings(
        &self,
        filter: &GroupFilter,
        visitor: &mut EmbeddingVisitor<'_>,
    ) -> StorageResult<()>;
    /// Part counts per group, ordered by name then flag.
    fn group_stats(&self) -> StorageResult<Vec<GroupStat>>;
}

#[cfg(test)]
pub(crate) mod conformance {
    //! Behaviour every store implementation must share.

    use super::*;
    use crate::indexing::fingerprint::{chunk_hash, file_hash};

    pub fn scope(name: &str, flag: u64) -> IndexScope {
        IndexScope::new(name, GroupFlag::new(flag))
    }

    pub fn new_part(scope: &IndexScope, index: u32, count: u32, text: &str) -> NewFilePart {
        NewFilePart {
            index,
            count,
            hash: chunk_hash(text),
            embedding_model: "mock".to_string(),
            embedding_size: 2,
            embedding: crate::vector::codec::encode(&[index as f32, 1.0]),
            text: text.to_string(),
            text_tokens: 1,
            group_name: scope.group_name.clone(),
            group_flag: scope.group_flag,
            state: ProgressStatus::Completed,
        }
    }

    fn add_file<S: SimilarityIndexStore>(store: &mut S, scope: &IndexScope, url: &str) -> FileId {
        store
            .insert_file(NewFile::new(scope, Path::new(url), file_hash(url.as_bytes()), 10))
            .unwrap()
    }

    pub fn file_round_trip<S: SimilarityIndexStore>(store: &mut S) {
        let code = scope("code", 1);
        let id = add_file(store, &code, "/repo/src/lib.rs");

        let file = store.get_file(id).unwrap().unwrap();
        assert_eq!(file.name, "lib.rs");
        assert_eq!(file.state, ProgressStatus::Started);
        assert!(file.is_enabled);
        assert!(file.hash.matches(&file_hash(b"/repo/src/lib.rs")));

        let found = store
            .find_file(&code, Path::new("/repo/src/lib.rs"))
            .unwrap()
            .unwrap();
        assert_eq!(found.id, id);
        assert!(
            store
                .find_file(&scope("code", 2), Path::new("/repo/src/lib.rs"))
                .unwrap()
                .is_none()
        );

        let duplicate = store.insert_file(NewFile::new(
            &code,
            Path::new("/repo/src/lib.rs"),
            file_hash(b"x"),
            1,
        ));
        assert!(matches!(duplicate, Err(StorageError::Duplicate { .. })));

        store.set_file_state(id, ProgressStatus::Completed).unwrap();
        assert_eq!(
            store.get_file(id).unwrap().unwrap().state,
            ProgressStatus::Completed
        );
        assert!(matches!(
            store.set_file_state(FileId(9999), ProgressStatus::Completed),
            Err(StorageError::NotFound { .. })
        ));
    }

    pub fn parts_replace_and_cascade<S: SimilarityIndexStore>(store: &mut S) {
        let scope = scope("code", 1);
        let id = add_file(store, &scope, "/repo/a.rs");

        let first = store
            .replace_parts(id, vec![new_part(&scope, 0, 2, "one"), new_part(&scope, 1, 2, "two")])
            .unwrap();
        assert_eq!(first.len(), 2);

        let second = store
            .replace_parts(id, vec![new_part(&scope, 0, 1, "three")])
            .unwrap();
        let parts = store.parts_for_file(id).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].id, second[0]);
        assert_eq!(parts[0].text, "three");
        assert!(store.get_parts(&first).unwrap().is_empty());

        assert_eq!(store.set_parts_state(id, ProgressStatus::Started).unwrap(), 1);
        assert_eq!(
            store.parts_for_file(id).unwrap()[0].state,
            ProgressStatus::Started
        );

        assert!(store.delete_file(id).unwrap());
        assert!(store.get_file(id).unwrap().is_none());
        assert!(store.get_parts(&second).unwrap().is_empty());
        assert!(!store.delete_file(id).unwrap());
    }

    pub fn get_parts_keeps_order<S: SimilarityIndexStore>(store: &mut S) {
        let scope = scope("code", 1);
        let id = add_file(store, &scope, "/repo/a.rs");
        let ids = store
            .replace_parts(
                id,
                vec![
                    new_part(&scope, 0, 3, "a"),
                    new_part(&scope, 1, 3, "b"),
                    new_part(&scope, 2, 3, "c"),
                ],
            )
            .unwrap();

        let wanted = vec![ids[2], FilePartId(-5), ids[0]];
        let texts: Vec<String> = store
            .get_parts(&wanted)
            .unwrap()
            .into_iter()
            .map(|p| p.text)
            .collect();
        assert_eq!(texts, vec!["c", "a"]);
    }

    pub fn sentinel_and_reconcile<S: SimilarityIndexStore>(store: &mut S) {
        let code = scope("code", 1);
        let other = scope("code", 2);
        let kept = add_file(store, &code, "/repo/kept.rs");
        let removed = add_file(store, &code, "/repo/removed.rs");
        let foreign = add_file(store, &other, "/repo/kept.rs");
        for id in [kept, removed] {
            store.replace_parts(id, vec![new_part(&code, 0, 1, "x")]).unwrap();
        }
        store.replace_parts(foreign, vec![new_part(&other, 0, 1, "x")]).unwrap();

        // Two files and two parts in scope.
        assert_eq!(store.set_state(&code, ProgressStatus::Started).unwrap(), 4);

        store.set_file_state(kept, ProgressStatus::Completed).unwrap();
        store.set_parts_state(kept, ProgressStatus::Completed).unwrap();

        assert_eq!(store.delete_by_state(&code, ProgressStatus::Started).unwrap(), 2);
        assert!(store.get_file(removed).unwrap().is_none());
        assert!(store.get_file(kept).unwrap().is_some());
        assert!(store.get_file(foreign).unwrap().is_some());
        assert_eq!(store.parts_for_file(foreign).unwrap().len(), 1);
        assert_eq!(store.files_in_scope(&code).unwrap().len(), 1);
    }

    pub fn groups<S: SimilarityIndexStore>(store: &mut S) {
        let code = scope("code", 1);
        store.upsert_group("code", GroupFlag::new(1), Some("Sources")).unwrap();
        store.upsert_group("code", GroupFlag::new(4), Some("Tests")).unwrap();

        let kept = store.upsert_group("code", GroupFlag::new(1), None).unwrap();
        assert_eq!(kept.flag_name, "Sources");
        let renamed = store
            .upsert_group("code", GroupFlag::new(1), Some("Src"))
            .unwrap();
        assert_eq!(renamed.flag_name, "Src");

        let id = add_file(store, &code, "/repo/a.rs");
        store
            .replace_parts(id, vec![new_part(&code, 0, 2, "a"), new_part(&code, 1, 2, "b")])
            .unwrap();

        assert_eq!(store.list_groups().unwrap().len(), 2);
        assert_eq!(store.prune_groups().unwrap(), 1);
        let groups = store.list_groups().unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].flag, GroupFlag::new(1));
        assert!(store.get_group("code", GroupFlag::new(4)).unwrap().is_none());

        let stats = store.group_stats().unwrap();
        assert_eq!(
            stats,
            vec![GroupStat {
                group_name: "code".to_string(),
                group_flag: GroupFlag::new(1),
                flag_name: "Src".to_string(),
                part_count: 2,
            }]
        );
    }

    pub fn visit_filters<S: SimilarityIndexStore>(store: &mut S) {
        let eight = scope("code", 0b1000);
        let two = scope("code", 0b0010);
        let docs = scope("docs", 0b1000);
        let mut ids = Vec::new();
        for (scope, url) in [(&eight, "/a"), (&two, "/b"), (&docs, "/c")] {
            let id = add_file(store, scope, url);
            ids.push(store.replace_parts(id, vec![new_part(scope, 0, 1, url)]).unwrap()[0]);
        }

        let collect = |store: &S, filter: GroupFilter| {
            let mut seen = Vec::new();
            store
                .visit_embeddings(&filter, &mut |id, bytes| {
                    assert_eq!(bytes.len(), 8);
                    seen.push(id);
                })
                .unwrap();
            seen.sort();
            seen
        };

        assert_eq!(collect(store, GroupFilter::any()).len(), 3);
        assert_eq!(
            collect(store, GroupFilter::new("code", GroupFlag::ANY)),
            vec![ids[0], ids[1]]
        );
        assert_eq!(
            collect(store, GroupFilter::new("", GroupFlag::new(0b0110))),
            vec![ids[1]]
        );
        assert_eq!(
            collect(store, GroupFilter::new("", GroupFlag::new(0b1000))),
            vec![ids[0], ids[2]]
        );

        let disabled = store
            .find_file(&docs, Path::new("/c"))
            .unwrap()
            .unwrap()
            .id;
        store.set_file_enabled(disabled, false).unwrap();
        assert_eq!(collect(store, GroupFilter::any()).len(), 2);
    }
}
