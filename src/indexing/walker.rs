//! File system walker for discovering files to embed
//!
//! This module provides directory traversal with support for:
//! - .gitignore rules
//! - A per-directory custom ignore file (`.semdexignore` by default)
//! - Include and exclude patterns in gitignore syntax, relative to the root
//! - Hidden file handling

use ignore::WalkBuilder;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{IndexError, IndexResult};

/// Default name of the per-directory ignore file.
pub const DEFAULT_IGNORE_FILE: &str = ".semdexignore";

/// Which files a walk yields.
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// When non-empty, a file must match at least one of these.
    pub include_patterns: Vec<String>,
    /// A file matching any of these is skipped.
    pub exclude_patterns: Vec<String>,
    /// Per-directory ignore file honored in addition to `.gitignore`.
    pub ignore_file: String,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            ignore_file: DEFAULT_IGNORE_FILE.to_string(),
        }
    }
}

/// Compiled include/exclude rules for one scan root.
#[derive(Debug)]
pub struct PathFilter {
    include: Option<Gitignore>,
    exclude: Option<Gitignore>,
}

impl PathFilter {
    pub fn new(root: &Path, options: &WalkOptions) -> IndexResult<Self> {
        Ok(Self {
            include: compile(root, &options.include_patterns)?,
            exclude: compile(root, &options.exclude_patterns)?,
        })
    }

    /// Eligibility of a path relative to the scan root.
    pub fn is_eligible(&self, relative: &Path) -> bool {
        let included = self.include.as_ref().is_none_or(|include| {
            include
                .matched_path_or_any_parents(relative, false)
                .is_ignore()
        });
        let excluded = self.exclude.as_ref().is_some_and(|exclude| {
            exclude
                .matched_path_or_any_parents(relative, false)
                .is_ignore()
        });
        included && !excluded
    }
}

/// Builds a matcher from pattern lines. Blank lines and `#` comments are not
/// rules; when no rule remains there is no matcher.
fn compile(root: &Path, patterns: &[String]) -> IndexResult<Option<Gitignore>> {
    let rules: Vec<&str> = patterns
        .iter()
        .map(|line| line.trim_end())
        .filter(|line| !line.trim().is_empty() && !line.trim_start().starts_with('#'))
        .collect();
    if rules.is_empty() {
        return Ok(None);
    }

    let mut builder = GitignoreBuilder::new(root);
    for rule in rules {
        builder
            .add_line(None, rule)
            .map_err(|e| IndexError::ConfigError {
                reason: format!("invalid path pattern '{rule}': {e}"),
            })?;
    }
    let matcher = builder.build().map_err(|e| IndexError::ConfigError {
        reason: format!("failed to compile path patterns: {e}"),
    })?;
    Ok(Some(matcher))
}

/// Walks directories to find files to index
#[derive(Debug)]
pub struct FileWalker {
    options: WalkOptions,
}

impl FileWalker {
    pub fn new(options: WalkOptions) -> Self {
        Self { options }
    }

    /// Compiles the include/exclude rules for `root`.
    pub fn filter(&self, root: &Path) -> IndexResult<PathFilter> {
        PathFilter::new(root, &self.options)
    }

    /// Walk a directory and return an iterator of eligible files
    pub fn walk(&self, root: &Path) -> IndexResult<impl Iterator<Item = PathBuf> + use<>> {
        Ok(self.walk_filtered(root, self.filter(root)?))
    }

    /// Walk a directory with rules compiled up front by [`FileWalker::filter`].
    ///
    /// Paths that are not valid UTF-8 are skipped, since file urls are stored
    /// as text.
    pub fn walk_filtered(
        &self,
        root: &Path,
        filter: PathFilter,
    ) -> impl Iterator<Item = PathBuf> + use<> {
        let root_owned = root.to_path_buf();

        let mut builder = WalkBuilder::new(root);
        builder
            .hidden(true) // Skip hidden files and directories
            .git_ignore(true) // Respect .gitignore files
            .git_global(false)
            .git_exclude(true) // Respect .git/info/exclude
            .follow_links(false) // Don't follow symlinks
            .max_depth(None)
            .require_git(false) // Allow gitignore to work in non-git directories
            .sort_by_file_path(|a, b| a.cmp(b));

        if !self.options.ignore_file.is_empty() {
            builder.add_custom_ignore_filename(&self.options.ignore_file);
        }

        builder
            .build()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Skipping unreadable entry: {e}");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
            .filter_map(move |entry| {
                let path = entry.into_path();
                if path.to_str().is_none() {
                    warn!("Skipping non-UTF-8 path {}", path.display());
                    return None;
                }
                let relative = path.strip_prefix(&root_owned).unwrap_or(&path);
                if filter.is_eligible(relative) {
                    Some(path)
                } else {
                    debug!("Filtered out {}", relative.display());
                    None
                }
            })
    }

    /// Count files that would be indexed (useful for dry runs)
    pub fn count_files(&self, root: &Path) -> IndexResult<usize> {
        Ok(self.walk(root)?.count())
    }
}
