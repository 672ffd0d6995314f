//! SQLite-backed store.
//!
//! Files, parts and groups live in three tables. Embeddings are stored as
//! BLOBs in the codec layout; similarity is computed in Rust while rows stream
//! out of the query, so no embedding is held longer than one visitor call.

use super::{
    EmbeddingVisitor, FilePart, FileRecord, Group, GroupStat, NewFile, NewFilePart,
    SimilarityIndexStore, StorageError, StorageResult,
};
use crate::indexing::fingerprint::Digest;
use crate::types::{FileId, FilePartId, GroupFilter, GroupFlag, IndexScope, ProgressStatus};
use chrono::Utc;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row, ToSql, params};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    group_name TEXT NOT NULL,
    group_flag INTEGER NOT NULL,
    url TEXT NOT NULL,
    name TEXT NOT NULL,
    hash_type TEXT NOT NULL,
    hash BLOB NOT NULL,
    size INTEGER NOT NULL,
    created TEXT NOT NULL,
    modified TEXT NOT NULL,
    state INTEGER NOT NULL,
    is_enabled INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS file_parts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    part_index INTEGER NOT NULL,
    part_count INTEGER NOT NULL,
    hash_type TEXT NOT NULL,
    hash BLOB NOT NULL,
    embedding_model TEXT NOT NULL,
    embedding_size INTEGER NOT NULL,
    embedding BLOB NOT NULL,
    text TEXT NOT NULL,
    text_tokens INTEGER NOT NULL,
    group_name TEXT NOT NULL,
    group_flag INTEGER NOT NULL,
    state INTEGER NOT NULL,
    is_enabled INTEGER NOT NULL DEFAULT 1,
    created TEXT NOT NULL,
    modified TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS file_groups (
    name TEXT NOT NULL,
    flag INTEGER NOT NULL,
    flag_name TEXT NOT NULL DEFAULT '',
    PRIMARY KEY (name, flag)
);

CREATE INDEX IF NOT EXISTS idx_files_scope ON files(group_name, group_flag, url);
CREATE INDEX IF NOT EXISTS idx_parts_file ON file_parts(file_id, part_index);
CREATE INDEX IF NOT EXISTS idx_parts_group ON file_parts(group_name, group_flag);
";

const FILE_COLUMNS: &str = "id, group_name, group_flag, url, name, hash_type, hash, size, \
     created, modified, state, is_enabled";

const PART_COLUMNS: &str = "id, file_id, part_index, part_count, hash_type, hash, \
     embedding_model, embedding_size, embedding, text, text_tokens, group_name, group_flag, \
     state, is_enabled, created, modified";

impl ToSql for ProgressStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.code()))
    }
}

impl FromSql for ProgressStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let code = i64::column_result(value)?;
        ProgressStatus::from_code(code).ok_or(FromSqlError::OutOfRange(code))
    }
}

impl ToSql for GroupFlag {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_i64()))
    }
}

impl FromSql for GroupFlag {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        i64::column_result(value).map(GroupFlag::from_i64)
    }
}

/// Urls are stored as text; a lossy conversion would merge distinct paths.
fn url_text(url: &Path) -> StorageResult<&str> {
    url.to_str().ok_or_else(|| StorageError::InvalidRecord {
        column: "url",
        reason: format!("path is not valid UTF-8: {}", url.display()),
    })
}

fn file_from_row(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    let hash_type: String = row.get(5)?;
    Ok(FileRecord {
        id: FileId(row.get(0)?),
        group_name: row.get(1)?,
        group_flag: row.get(2)?,
        url: PathBuf::from(row.get::<_, String>(3)?),
        name: row.get(4)?,
        hash: Digest::from_parts(&hash_type, row.get(6)?),
        size: row.get::<_, i64>(7)? as u64,
        created: row.get(8)?,
        modified: row.get(9)?,
        state: row.get(10)?,
        is_enabled: row.get(11)?,
    })
}

fn part_from_row(row: &Row<'_>) -> rusqlite::Result<FilePart> {
    let hash_type: String = row.get(4)?;
    Ok(FilePart {
        id: FilePartId(row.get(0)?),
        file_id: FileId(row.get(1)?),
        index: row.get::<_, i64>(2)? as u32,
        count: row.get::<_, i64>(3)? as u32,
        hash: Digest::from_parts(&hash_type, row.get(5)?),
        embedding_model: row.get(6)?,
        embedding_size: row.get::<_, i64>(7)? as u32,
        embedding: row.get(8)?,
        text: row.get(9)?,
        text_tokens: row.get::<_, i64>(10)? as u32,
        group_name: row.get(11)?,
        group_flag: row.get(12)?,
        state: row.get(13)?,
        is_enabled: row.get(14)?,
        created: row.get(15)?,
        modified: row.get(16)?,
    })
}

fn group_from_row(row: &Row<'_>) -> rusqlite::Result<Group> {
    Ok(Group {
        name: row.get(0)?,
        flag: row.get(1)?,
        flag_name: row.get(2)?,
    })
}

/// Index store persisted in a single SQLite database file.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens or creates the database at `path`, creating parent directories.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        conn.execute_batch(SCHEMA)?;
        debug!("Opened index database at {}", path.display());
        Ok(Self { conn })
    }

    /// Opens a private in-memory database (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    fn require_file(&self, id: FileId) -> StorageResult<()> {
        let exists = self
            .conn
            .query_row("SELECT 1 FROM files WHERE id = ?1", params![id.value()], |_| {
                Ok(())
            })
            .optional()?;
        exists.ok_or(StorageError::NotFound {
            entity: "file",
            id: id.value(),
        })
    }
}

impl SimilarityIndexStore for SqliteStore {
    fn insert_file(&mut self, file: NewFile) -> StorageResult<FileId> {
        let scope = IndexScope::new(file.group_name.clone(), file.group_flag);
        if self.find_file(&scope, &file.url)?.is_some() {
            return Err(StorageError::Duplicate {
                group_name: file.group_name,
                url: file.url,
            });
        }

        let now = Utc::now();
        self.conn.execute(
            "INSERT INTO files (group_name, group_flag, url, name, hash_type, hash, size,
                                created, modified, state, is_enabled)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 1)",
            params![
                file.group_name,
                file.group_flag,
                url_text(&file.url)?,
                file.name,
                file.hash.hash_type.as_str(),
                file.hash.bytes,
                file.size as i64,
                now,
                now,
                file.state,
            ],
        )?;
        Ok(FileId(self.conn.last_insert_rowid()))
    }

    fn get_file(&self, id: FileId) -> StorageResult<Option<FileRecord>> {
        let sql = format!("SELECT {FILE_COLUMNS} FROM files WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id.value()], file_from_row)
            .optional()?)
    }

    fn find_file(&self, scope: &IndexScope, url: &Path) -> StorageResult<Option<FileRecord>> {
        let sql = format!(
            "SELECT {FILE_COLUMNS} FROM files
             WHERE group_name = ?1 AND group_flag = ?2 AND url = ?3 AND is_enabled = 1
             ORDER BY id LIMIT 1"
        );
        Ok(self
            .conn
            .query_row(
                &sql,
                params![scope.group_name, scope.group_flag, url_text(url)?],
                file_from_row,
            )
            .optional()?)
    }

    fn files_in_scope(&self, scope: &IndexScope) -> StorageResult<Vec<FileRecord>> {
        let sql = format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE group_name = ?1 AND group_flag = ?2 ORDER BY id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![scope.group_name, scope.group_flag], file_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn set_file_state(&mut self, id: FileId, state: ProgressStatus) -> StorageResult<()> {
        let changed = self.conn.execute(
            "UPDATE files SET state = ?1, modified = ?2 WHERE id = ?3",
            params![state, Utc::now(), id.value()],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound {
                entity: "file",
                id: id.value(),
            });
        }
        Ok(())
    }

    fn set_file_enabled(&mut self, id: FileId, enabled: bool) -> StorageResult<()> {
        let changed = self.conn.execute(
            "UPDATE files SET is_enabled = ?1, modified = ?2 WHERE id = ?3",
            params![enabled, Utc::now(), id.value()],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound {
                entity: "file",
                id: id.value(),
            });
        }
        Ok(())
    }

    fn delete_file(&mut self, id: FileId) -> StorageResult<bool> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM file_parts WHERE file_id = ?1", params![id.value()])?;
        let deleted = tx.execute("DELETE FROM files WHERE id = ?1", params![id.value()])?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    fn parts_for_file(&self, file_id: FileId) -> StorageResult<Vec<FilePart>> {
        let sql = format!(
            "SELECT {PART_COLUMNS} FROM file_parts WHERE file_id = ?1 ORDER BY part_index, id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![file_id.value()], part_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn get_parts(&self, ids: &[FilePartId]) -> StorageResult<Vec<FilePart>> {
        let sql = format!("SELECT {PART_COLUMNS} FROM file_parts WHERE id = ?1");
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let mut parts = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(part) = stmt
                .query_row(params![id.value()], part_from_row)
                .optional()?
            {
                parts.push(part);
            }
        }
        Ok(parts)
    }

    fn replace_parts(
        &mut self,
        file_id: FileId,
        parts: Vec<NewFilePart>,
    ) -> StorageResult<Vec<FilePartId>> {
        self.require_file(file_id)?;

        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM file_parts WHERE file_id = ?1", params![file_id.value()])?;

        let now = Utc::now();
        let mut ids = Vec::with_capacity(parts.len());
        {
            let mut stmt = tx.prepare(
                "INSERT INTO file_parts (file_id, part_index, part_count, hash_type, hash,
                    embedding_model, embedding_size, embedding, text, text_tokens,
                    group_name, group_flag, state, is_enabled, created, modified)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, 1, ?14, ?15)",
            )?;
            for part in &parts {
                stmt.execute(params![
                    file_id.value(),
                    part.index as i64,
                    part.count as i64,
                    part.hash.hash_type.as_str(),
                    part.hash.bytes,
                    part.embedding_model,
                    part.embedding_size as i64,
                    part.embedding,
                    part.text,
                    part.text_tokens as i64,
                    part.group_name,
                    part.group_flag,
                    part.state,
                    now,
                    now,
                ])?;
                ids.push(FilePartId(tx.last_insert_rowid()));
            }
        }
        tx.commit()?;
        Ok(ids)
    }

    fn set_parts_state(&mut self, file_id: FileId, state: ProgressStatus) -> StorageResult<usize> {
        Ok(self.conn.execute(
            "UPDATE file_parts SET state = ?1, modified = ?2 WHERE file_id = ?3",
            params![state, Utc::now(), file_id.value()],
        )?)
    }

    fn delete_parts_for_file(&mut self, file_id: FileId) -> StorageResult<usize> {
        Ok(self.conn.execute(
            "DELETE FROM file_parts WHERE file_id = ?1",
            params![file_id.value()],
        )?)
    }

    fn upsert_group(
        &mut self,
        name: &str,
        flag: GroupFlag,
        flag_name: Option<&str>,
    ) -> StorageResult<Group> {
        match flag_name {
            Some(label) => self.conn.execute(
                "INSERT INTO file_groups (name, flag, flag_name) VALUES (?1, ?2, ?3)
                 ON CONFLICT(name, flag) DO UPDATE SET flag_name = excluded.flag_name",
                params![name, flag, label],
            )?,
            None => self.conn.execute(
                "INSERT OR IGNORE INTO file_groups (name, flag, flag_name) VALUES (?1, ?2, '')",
                params![name, flag],
            )?,
        };

        self.get_group(name, flag)?
            .ok_or_else(|| StorageError::InvalidRecord {
                column: "file_groups",
                reason: format!("group '{name}' vanished after upsert"),
            })
    }

    fn get_group(&self, name: &str, flag: GroupFlag) -> StorageResult<Option<Group>> {
        Ok(self
            .conn
            .query_row(
                "SELECT name, flag, flag_name FROM file_groups WHERE name = ?1 AND flag = ?2",
                params![name, flag],
                group_from_row,
            )
            .optional()?)
    }

    fn list_groups(&self) -> StorageResult<Vec<Group>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, flag, flag_name FROM file_groups")?;
        let mut groups = stmt
            .query_map([], group_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        groups.sort_by(|a, b| a.name.cmp(&b.name).then(a.flag.cmp(&b.flag)));
        Ok(groups)
    }

    fn prune_groups(&mut self) -> StorageResult<usize> {
        Ok(self.conn.execute(
            "DELETE FROM file_groups WHERE NOT EXISTS (
                 SELECT 1 FROM files f
                 WHERE f.group_name = file_groups.name AND f.group_flag = file_groups.flag
             )",
            [],
        )?)
    }

    fn set_state(&mut self, scope: &IndexScope, state: ProgressStatus) -> StorageResult<usize> {
        let now = Utc::now();
        let tx = self.conn.transaction()?;
        let files = tx.execute(
            "UPDATE files SET state = ?1, modified = ?2 WHERE group_name = ?3 AND group_flag = ?4",
            params![state, now, scope.group_name, scope.group_flag],
        )?;
        let parts = tx.execute(
            "UPDATE file_parts SET state = ?1, modified = ?2
             WHERE group_name = ?3 AND group_flag = ?4",
            params![state, now, scope.group_name, scope.group_flag],
        )?;
        tx.commit()?;
        Ok(files + parts)
    }

    fn delete_by_state(
        &mut self,
        scope: &IndexScope,
        state: ProgressStatus,
    ) -> StorageResult<usize> {
        let tx = self.conn.transaction()?;
        let parts = tx.execute(
            "DELETE FROM file_parts
             WHERE (group_name = ?1 AND group_flag = ?2 AND state = ?3)
                OR file_id IN (
                    SELECT id FROM files WHERE group_name = ?1 AND group_flag = ?2 AND state = ?3
                )",
            params![scope.group_name, scope.group_flag, state],
        )?;
        let files = tx.execute(
            "DELETE FROM files WHERE group_name = ?1 AND group_flag = ?2 AND state = ?3",
            params![scope.group_name, scope.group_flag, state],
        )?;
        tx.commit()?;
        Ok(parts + files)
    }

    fn visit_embeddings(
        &self,
        filter: &GroupFilter,
        visitor: &mut EmbeddingVisitor<'_>,
    ) -> StorageResult<()> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT p.id, p.embedding FROM file_parts p
             JOIN files f ON f.id = p.file_id
             WHERE p.is_enabled = 1 AND f.is_enabled = 1
               AND (?1 = '' OR p.group_name = ?1)
               AND (?2 = 0 OR (p.group_flag & ?2) != 0)",
        )?;
        let mut rows = stmt.query(params![filter.group_name, filter.group_flag])?;
        while let Some(row) = rows.next()? {
            let id = FilePartId(row.get(0)?);
            match row.get_ref(1)? {
                ValueRef::Blob(bytes) => visitor(id, bytes),
                other => warn!(
                    "Skipping part {id}: embedding column has type {:?}",
                    other.data_type()
                ),
            }
        }
        Ok(())
    }

    fn group_stats(&self) -> StorageResult<Vec<GroupStat>> {
        let mut stmt = self.conn.prepare(
            "SELECT p.group_name, p.group_flag, COALESCE(g.flag_name, ''), COUNT(*)
             FROM file_parts p
             LEFT JOIN file_groups g ON g.name = p.group_name AND g.flag = p.group_flag
             GROUP BY p.group_name, p.group_flag",
        )?;
        let mut stats = stmt
            .query_map([], |row| {
                Ok(GroupStat {
                    group_name: row.get(0)?,
                    group_flag: row.get(1)?,
                    flag_name: row.get(2)?,
                    part_count: row.get::<_, i64>(3)? as usize,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        stats.sort_by(|a, b| {
            a.group_name
                .cmp(&b.group_name)
                .then(a.group_flag.cmp(&b.group_flag))
        });
        Ok(stats)
    }
}
