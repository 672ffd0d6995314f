//! In-memory reference store.
//!
//! Keeps every row in ordered maps. Useful for tests and for short-lived
//! indexes that never need to outlive the process.

use super::{
    EmbeddingVisitor, FilePart, FileRecord, Group, GroupStat, NewFile, NewFilePart,
    SimilarityIndexStore, StorageError, StorageResult,
};
use crate::types::{FileId, FilePartId, GroupFilter, GroupFlag, IndexScope, ProgressStatus};
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

#[derive(Debug, Default)]
pub struct MemoryStore {
    files: BTreeMap<FileId, FileRecord>,
    parts: BTreeMap<FilePartId, FilePart>,
    groups: BTreeMap<(String, GroupFlag), Group>,
    next_file_id: i64,
    next_part_id: i64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    fn file_mut(&mut self, id: FileId) -> StorageResult<&mut FileRecord> {
        self.files.get_mut(&id).ok_or(StorageError::NotFound {
            entity: "file",
            id: id.value(),
        })
    }

    fn part_ids_of(&self, file_id: FileId) -> Vec<FilePartId> {
        self.parts
            .values()
            .filter(|part| part.file_id == file_id)
            .map(|part| part.id)
            .collect()
    }
}

impl SimilarityIndexStore for MemoryStore {
    fn insert_file(&mut self, file: NewFile) -> StorageResult<FileId> {
        let scope = IndexScope::new(file.group_name.clone(), file.group_flag);
        if self.find_file(&scope, &file.url)?.is_some() {
            return Err(StorageError::Duplicate {
                group_name: file.group_name,
                url: file.url,
            });
        }

        self.next_file_id += 1;
        let id = FileId(self.next_file_id);
        let now = Utc::now();
        self.files.insert(
            id,
            FileRecord {
                id,
                group_name: file.group_name,
                group_flag: file.group_flag,
                url: file.url,
                name: file.name,
                hash: file.hash,
                size: file.size,
                created: now,
                modified: now,
                state: file.state,
                is_enabled: true,
            },
        );
        Ok(id)
    }

    fn get_file(&self, id: FileId) -> StorageResult<Option<FileRecord>> {
        Ok(self.files.get(&id).cloned())
    }

    fn find_file(&self, scope: &IndexScope, url: &Path) -> StorageResult<Option<FileRecord>> {
        Ok(self
            .files
            .values()
            .find(|f| f.is_enabled && f.url == url && scope.contains(&f.group_name, f.group_flag))
            .cloned())
    }

    fn files_in_scope(&self, scope: &IndexScope) -> StorageResult<Vec<FileRecord>> {
        Ok(self
            .files
            .values()
            .filter(|f| scope.contains(&f.group_name, f.group_flag))
            .cloned()
            .collect())
    }

    fn set_file_state(&mut self, id: FileId, state: ProgressStatus) -> StorageResult<()> {
        let file = self.file_mut(id)?;
        file.state = state;
        file.modified = Utc::now();
        Ok(())
    }

    fn set_file_enabled(&mut self, id: FileId, enabled: bool) -> StorageResult<()> {
        let file = self.file_mut(id)?;
        file.is_enabled = enabled;
        file.modified = Utc::now();
        Ok(())
    }

    fn delete_file(&mut self, id: FileId) -> StorageResult<bool> {
        self.delete_parts_for_file(id)?;
        Ok(self.files.remove(&id).is_some())
    }

    fn parts_for_file(&self, file_id: FileId) -> StorageResult<Vec<FilePart>> {
        let mut parts: Vec<FilePart> = self
            .parts
            .values()
            .filter(|part| part.file_id == file_id)
            .cloned()
            .collect();
        parts.sort_by_key(|part| (part.index, part.id));
        Ok(parts)
    }

    fn get_parts(&self, ids: &[FilePartId]) -> StorageResult<Vec<FilePart>> {
        Ok(ids.iter().filter_map(|id| self.parts.get(id).cloned()).collect())
    }

    fn replace_parts(
        &mut self,
        file_id: FileId,
        parts: Vec<NewFilePart>,
    ) -> StorageResult<Vec<FilePartId>> {
        if !self.files.contains_key(&file_id) {
            return Err(StorageError::NotFound {
                entity: "file",
                id: file_id.value(),
            });
        }

        self.delete_parts_for_file(file_id)?;

        let now = Utc::now();
        let mut ids = Vec::with_capacity(parts.len());
        for part in parts {
            self.next_part_id += 1;
            let id = FilePartId(self.next_part_id);
            self.parts.insert(
                id,
                FilePart {
                    id,
                    file_id,
                    index: part.index,
                    count: part.count,
                    hash: part.hash,
                    embedding_model: part.embedding_model,
                    embedding_size: part.embedding_size,
                    embedding: part.embedding,
                    text: part.text,
                    text_tokens: part.text_tokens,
                    group_name: part.group_name,
                    group_flag: part.group_flag,
                    state: part.state,
                    is_enabled: true,
                    created: now,
                    modified: now,
                },
            );
            ids.push(id);
        }
        Ok(ids)
    }

    fn set_parts_state(&mut self, file_id: FileId, state: ProgressStatus) -> StorageResult<usize> {
        let now = Utc::now();
        let mut touched = 0;
        for part in self.parts.values_mut().filter(|p| p.file_id == file_id) {
            part.state = state;
            part.modified = now;
            touched += 1;
        }
        Ok(touched)
    }

    fn delete_parts_for_file(&mut self, file_id: FileId) -> StorageResult<usize> {
        let ids = self.part_ids_of(file_id);
        for id in &ids {
            self.parts.remove(id);
        }
        Ok(ids.len())
    }

    fn upsert_group(
        &mut self,
        name: &str,
        flag: GroupFlag,
        flag_name: Option<&str>,
    ) -> StorageResult<Group> {
        let group = self
            .groups
            .entry((name.to_string(), flag))
            .or_insert_with(|| Group {
                name: name.to_string(),
                flag,
                flag_name: String::new(),
            });
        if let Some(label) = flag_name {
            group.flag_name = label.to_string();
        }
        Ok(group.clone())
    }

    fn get_group(&self, name: &str, flag: GroupFlag) -> StorageResult<Option<Group>> {
        Ok(self.groups.get(&(name.to_string(), flag)).cloned())
    }

    fn list_groups(&self) -> StorageResult<Vec<Group>> {
        Ok(self.groups.values().cloned().collect())
    }

    fn prune_groups(&mut self) -> StorageResult<usize> {
        let referenced: BTreeSet<(&str, GroupFlag)> = self
            .files
            .values()
            .map(|f| (f.group_name.as_str(), f.group_flag))
            .collect();
        let orphans: Vec<(String, GroupFlag)> = self
            .groups
            .keys()
            .filter(|(name, flag)| !referenced.contains(&(name.as_str(), *flag)))
            .cloned()
            .collect();
        for key in &orphans {
            self.groups.remove(key);
        }
        Ok(orphans.len())
    }

    fn set_state(&mut self, scope: &IndexScope, state: ProgressStatus) -> StorageResult<usize> {
        let now = Utc::now();
        let mut touched = 0;
        for file in self
            .files
            .values_mut()
            .filter(|f| scope.contains(&f.group_name, f.group_flag))
        {
            file.state = state;
            file.modified = now;
            touched += 1;
        }
        for part in self
            .parts
            .values_mut()
            .filter(|p| scope.contains(&p.group_name, p.group_flag))
        {
            part.state = state;
            part.modified = now;
            touched += 1;
        }
        Ok(touched)
    }

    fn delete_by_state(
        &mut self,
        scope: &IndexScope,
        state: ProgressStatus,
    ) -> StorageResult<usize> {
        let doomed_files: BTreeSet<FileId> = self
            .files
            .values()
            .filter(|f| f.state == state && scope.contains(&f.group_name, f.group_flag))
            .map(|f| f.id)
            .collect();

        let before = self.parts.len();
        self.parts.retain(|_, p| {
            let stale = p.state == state && scope.contains(&p.group_name, p.group_flag);
            !(stale || doomed_files.contains(&p.file_id))
        });
        let mut deleted = before - self.parts.len();

        for id in &doomed_files {
            if self.files.remove(id).is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    fn visit_embeddings(
        &self,
        filter: &GroupFilter,
        visitor: &mut EmbeddingVisitor<'_>,
    ) -> StorageResult<()> {
        for part in self.parts.values() {
            if !part.is_enabled || !filter.matches(&part.group_name, part.group_flag) {
                continue;
            }
            let file_enabled = self
                .files
                .get(&part.file_id)
                .is_some_and(|file| file.is_enabled);
            if file_enabled {
                visitor(part.id, part.embedding.as_slice());
            }
        }
        Ok(())
    }

    fn group_stats(&self) -> StorageResult<Vec<GroupStat>> {
        let mut counts: BTreeMap<(String, GroupFlag), usize> = BTreeMap::new();
        for part in self.parts.values() {
            *counts
                .entry((part.group_name.clone(), part.group_flag))
                .or_default() += 1;
        }
        Ok(counts
            .into_iter()
            .map(|((group_name, group_flag), part_count)| GroupStat {
                flag_name: self
                    .groups
                    .get(&(group_name.clone(), group_flag))
                    .map(|g| g.flag_name.clone())
                    .unwrap_or_default(),
                group_name,
                group_flag,
                part_count,
            })
            .collect())
    }
}
