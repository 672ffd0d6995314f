//! Configuration module for semdex.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `SEMDEX_` and use double
//! underscores to separate nested levels:
//! - `SEMDEX_EMBEDDING__MODEL=BGESmallENV15` sets `embedding.model`
//! - `SEMDEX_SCAN__MAX_EXCEPTIONS=10` sets `scan.max_exceptions`
//! - `SEMDEX_GROUP__FLAG=4` sets `group.flag`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::indexing::indexer::{DEFAULT_MAX_TOKENS_PER_CHUNK, IndexerOptions};
use crate::indexing::scan::{DEFAULT_MAX_EXCEPTIONS, ScanOptions};
use crate::indexing::walker::{DEFAULT_IGNORE_FILE, WalkOptions};
use crate::types::{GroupFlag, IndexScope};

/// Directory holding the settings file and the default index.
pub const CONFIG_DIR: &str = ".semdex";
const SETTINGS_FILE: &str = "settings.toml";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Path to the SQLite index file
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    /// Workspace root directory (where .semdex is located)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    /// Global debug mode
    #[serde(default = "default_false")]
    pub debug: bool,

    #[serde(default)]
    pub scan: ScanConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub group: GroupConfig,

    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScanConfig {
    /// Directories to scan (relative paths resolve against the workspace root)
    #[serde(default = "default_roots")]
    pub roots: Vec<PathBuf>,

    /// Gitignore-style patterns a file must match (empty means everything)
    #[serde(default)]
    pub include_patterns: Vec<String>,

    /// Gitignore-style patterns that exclude a file
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// Per-directory ignore file name
    #[serde(default = "default_ignore_file")]
    pub ignore_file: String,

    /// Abort once more than this many files fail inside the provider
    #[serde(default = "default_max_exceptions")]
    pub max_exceptions: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    /// Model to use for embeddings
    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens_per_chunk: usize,

    /// Re-embed unchanged text produced by a different model
    #[serde(default = "default_true")]
    pub match_model: bool,

    /// Where downloaded models are cached
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    #[serde(default = "default_true")]
    pub show_download_progress: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GroupConfig {
    /// Group the scanned files belong to
    #[serde(default = "default_group_name")]
    pub name: String,

    /// Flag bits of the group; 0 is reserved for query wildcards
    #[serde(default = "default_group_flag")]
    pub flag: u64,

    /// Optional label for the flag
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flag_name: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SearchConfig {
    /// Number of chunks returned by a search
    #[serde(default = "default_take")]
    pub take: usize,

    /// Text placed before the retrieved chunks
    #[serde(default = "default_instructions")]
    pub instructions: String,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_index_path() -> PathBuf {
    PathBuf::from(CONFIG_DIR).join("index.db")
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_roots() -> Vec<PathBuf> {
    vec![PathBuf::from(".")]
}
fn default_ignore_file() -> String {
    DEFAULT_IGNORE_FILE.to_string()
}
fn default_max_exceptions() -> usize {
    DEFAULT_MAX_EXCEPTIONS
}
fn default_embedding_model() -> String {
    "AllMiniLML6V2".to_string()
}
fn default_max_tokens() -> usize {
    DEFAULT_MAX_TOKENS_PER_CHUNK
}
fn default_cache_dir() -> PathBuf {
    models_dir()
}
fn default_group_name() -> String {
    "default".to_string()
}
fn default_group_flag() -> u64 {
    1
}
fn default_take() -> usize {
    4
}
fn default_instructions() -> String {
    "Use the following file chunks as context.".to_string()
}

/// Shared cache directory for downloaded embedding models.
pub fn models_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("semdex")
        .join("models")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            index_path: default_index_path(),
            workspace_root: None,
            debug: false,
            scan: ScanConfig::default(),
            embedding: EmbeddingConfig::default(),
            group: GroupConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            roots: default_roots(),
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            ignore_file: default_ignore_file(),
            max_exceptions: default_max_exceptions(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            max_tokens_per_chunk: default_max_tokens(),
            match_model: true,
            cache_dir: default_cache_dir(),
            show_download_progress: true,
        }
    }
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            name: default_group_name(),
            flag: default_group_flag(),
            flag_name: None,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            take: default_take(),
            instructions: default_instructions(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(SETTINGS_FILE));

        Self::figment(&config_path)
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                if settings.workspace_root.is_none() {
                    settings.workspace_root = Self::workspace_root();
                }
                settings
            })
    }

    /// Load configuration from a specific file, still honoring the environment
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path.as_ref()).extract().map_err(Box::new)
    }

    fn figment(config_path: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_path))
            // Double underscore separates nested levels, single underscore
            // stays part of the field name
            .merge(Env::prefixed("SEMDEX_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
    }

    /// Find the settings file by looking for .semdex in the current
    /// directory and its ancestors
    fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(CONFIG_DIR).join(SETTINGS_FILE))
    }

    /// Get the workspace root directory (where .semdex is located)
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;
        current
            .ancestors()
            .find(|ancestor| ancestor.join(CONFIG_DIR).is_dir())
            .map(Path::to_path_buf)
    }

    /// Check if configuration is properly initialized
    pub fn check_init() -> Result<(), String> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(SETTINGS_FILE));

        if !config_path.exists() {
            return Err("No configuration file found".to_string());
        }

        match std::fs::read_to_string(&config_path) {
            Ok(content) => {
                if let Err(e) = toml::from_str::<Settings>(&content) {
                    return Err(format!(
                        "Configuration file is corrupted: {e}\nRun 'semdex init --force' to regenerate."
                    ));
                }
            }
            Err(e) => {
                return Err(format!("Cannot read configuration file: {e}"));
            }
        }

        Ok(())
    }

    /// Resolves a configured path against the workspace root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        match &self.workspace_root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }

    pub fn index_file(&self) -> PathBuf {
        self.resolve(&self.index_path)
    }

    /// Scope scanned and searched by default.
    pub fn scope(&self) -> IndexScope {
        IndexScope::new(self.group.name.clone(), GroupFlag::new(self.group.flag))
    }

    pub fn indexer_options(&self) -> IndexerOptions {
        IndexerOptions {
            model: self.embedding.model.clone(),
            max_tokens_per_chunk: self.embedding.max_tokens_per_chunk,
            match_model: self.embedding.match_model,
        }
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            roots: self.scan.roots.iter().map(|r| self.resolve(r)).collect(),
            walk: WalkOptions {
                include_patterns: self.scan.include_patterns.clone(),
                exclude_patterns: self.scan.exclude_patterns.clone(),
                ignore_file: self.scan.ignore_file.clone(),
            },
            max_exceptions: self.scan.max_exceptions,
            indexer: self.indexer_options(),
            flag_name: self.group.flag_name.clone(),
        }
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file with helpful comments
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        Self::init_config_file_in(Path::new("."), force)
    }

    pub fn init_config_file_in(
        root: &Path,
        force: bool,
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = root.join(CONFIG_DIR).join(SETTINGS_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let template = format!(
            r#"# semdex configuration file

# Version of the configuration schema
version = 1

# SQLite index file (relative to the workspace root)
index_path = ".semdex/index.db"

# Global debug mode
debug = false

[scan]
# Directories to scan
roots = ["."]

# Gitignore-style patterns; an empty include list means every file
include_patterns = []
exclude_patterns = []

# Per-directory ignore file, honored next to .gitignore
ignore_file = "{ignore_file}"

# Abort a scan once more than this many files fail while embedding
max_exceptions = {max_exceptions}

[embedding]
# Model to use for embeddings (see `semdex config --models`)
model = "AllMiniLML6V2"

# Chunks never exceed this many tokens
max_tokens_per_chunk = {max_tokens}

# Re-embed unchanged text when it was embedded by another model
match_model = true

# Cache directory for downloaded models
cache_dir = "{cache_dir}"

[group]
# Files of one scan share a group name and flag bits.
# Searches with flag 0 match every flag.
name = "default"
flag = 1
# flag_name = "source"

[search]
# Number of chunks returned by a search
take = 4

# Text placed before the retrieved chunks
instructions = "Use the following file chunks as context."
"#,
            ignore_file = DEFAULT_IGNORE_FILE,
            max_exceptions = DEFAULT_MAX_EXCEPTIONS,
            max_tokens = DEFAULT_MAX_TOKENS_PER_CHUNK,
            cache_dir = models_dir().display().to_string().replace('\\', "/"),
        );

        std::fs::write(&config_path, template)?;

        if force {
            println!("Overwrote configuration at: {}", config_path.display());
        } else {
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
        }

        Self::create_default_ignore_file(root, force)?;

        Ok(config_path)
    }

    /// Create a default .semdexignore file with helpful patterns
    fn create_default_ignore_file(root: &Path, force: bool) -> Result<(), Box<dyn std::error::Error>> {
        let ignore_path = root.join(DEFAULT_IGNORE_FILE);

        if !force && ignore_path.exists() {
            println!("Found existing {DEFAULT_IGNORE_FILE} file");
            return Ok(());
        }

        let default_content = r#"# semdex ignore patterns (gitignore syntax)
# https://git-scm.com/docs/gitignore

# The index itself
.semdex/

# Build artifacts
target/
build/
dist/
*.o
*.so
*.dylib
*.exe
*.dll

# Binary and media files
*.png
*.jpg
*.gif
*.pdf
*.zip
*.gz

# Temporary files
*.tmp
*.bak
*.swp
*~

# Dependency directories
node_modules/
vendor/
.venv/
__pycache__/
"#;

        std::fs::write(&ignore_path, default_content)?;
        println!("Created default {DEFAULT_IGNORE_FILE} file");

        Ok(())
    }
}
