//! Settings provider.
//!
//! Handles loading, validating, and resolving `comic-shelf.toml`. Stock
//! defaults are the base layer; the user's file only needs the keys it wants
//! to change.
//!
//! ## Config File Location
//!
//! The CLI looks for `comic-shelf.toml` in the directory given by `--config`
//! (the current directory by default). Relative paths inside the file are
//! resolved against that directory:
//!
//! ```text
//! ~/Comics-Archive/
//! ├── comic-shelf.toml
//! ├── .comic-shelf/
//! │   ├── library.xml        # catalog
//! │   ├── thumbs/            # cover thumbnails
//! │   └── tmp/               # scratch space for extraction and injection
//! ├── Comics/
//! └── Manga/
//! ```
//!
//! ## Configuration Options
//!
//! ```toml
//! data_dir = ".comic-shelf"   # holds library.xml
//! # temp_dir = ".comic-shelf/tmp"
//! # thumb_dir = ".comic-shelf/thumbs"
//! group_by_publisher = true
//! manage_files = false
//!
//! [comics]
//! enabled = true
//! dir = "Comics"
//!
//! [manga]
//! enabled = false
//! dir = "Manga"
//!
//! [tools]
//! seven_zip = "7z"
//! rar = "rar"
//! pdftoppm = "pdftoppm"
//! timeout_ms = 5000
//!
//! [thumbnails]
//! size = 512
//! quality = 85
//!
//! [processing]
//! # max_processes = 4
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// File name looked up in the config directory.
pub const CONFIG_FILENAME: &str = "comic-shelf.toml";

/// Catalog file name inside the data directory.
pub const LIBRARY_FILENAME: &str = "library.xml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("Failed to create directory {}: {source}", path.display())]
    Dir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Archive settings loaded from `comic-shelf.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Directory holding `library.xml` (and the default thumb/temp dirs).
    pub data_dir: PathBuf,
    /// Scratch directory for page extraction and metadata injection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,
    /// Where cover thumbnails live.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumb_dir: Option<PathBuf>,
    /// Browse Publisher → Series → Volume → Title instead of starting at Series.
    pub group_by_publisher: bool,
    /// Move imported and edited files into `Publisher/Series/Volume/`.
    pub manage_files: bool,
    pub comics: RootConfig,
    pub manga: RootConfig,
    pub tools: ToolsConfig,
    pub thumbnails: ThumbnailsConfig,
    pub processing: ProcessingConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".comic-shelf"),
            temp_dir: None,
            thumb_dir: None,
            group_by_publisher: true,
            manage_files: false,
            comics: RootConfig {
                enabled: true,
                dir: PathBuf::from("Comics"),
            },
            manga: RootConfig {
                enabled: false,
                dir: PathBuf::from("Manga"),
            },
            tools: ToolsConfig::default(),
            thumbnails: ThumbnailsConfig::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl Settings {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tools.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "tools.timeout_ms must be greater than zero".into(),
            ));
        }
        if self.thumbnails.size == 0 {
            return Err(ConfigError::Validation(
                "thumbnails.size must be greater than zero".into(),
            ));
        }
        if !(1..=100).contains(&self.thumbnails.quality) {
            return Err(ConfigError::Validation(
                "thumbnails.quality must be 1-100".into(),
            ));
        }
        for (name, root) in [("comics", &self.comics), ("manga", &self.manga)] {
            if root.enabled && root.dir.as_os_str().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "{name}.dir must be set when {name}.enabled is true"
                )));
            }
        }
        if self.comics.enabled && self.manga.enabled && self.comics.dir == self.manga.dir {
            return Err(ConfigError::Validation(
                "comics.dir and manga.dir must differ".into(),
            ));
        }
        if self.manage_files && self.roots().is_empty() {
            return Err(ConfigError::Validation(
                "manage_files needs comics or manga enabled".into(),
            ));
        }
        Ok(())
    }

    /// Make every relative path absolute against `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.data_dir);
        if let Some(dir) = self.temp_dir.as_mut() {
            resolve(dir);
        }
        if let Some(dir) = self.thumb_dir.as_mut() {
            resolve(dir);
        }
        resolve(&mut self.comics.dir);
        resolve(&mut self.manga.dir);
    }

    pub fn comics_root(&self) -> Option<&Path> {
        self.comics.enabled.then_some(self.comics.dir.as_path())
    }

    pub fn manga_root(&self) -> Option<&Path> {
        self.manga.enabled.then_some(self.manga.dir.as_path())
    }

    /// Enabled roots in scan order: comics first, then manga.
    pub fn roots(&self) -> Vec<&Path> {
        self.comics_root()
            .into_iter()
            .chain(self.manga_root())
            .collect()
    }

    /// True if `path` lies under the configured manga root.
    pub fn is_manga_path(&self, path: &Path) -> bool {
        self.manga_root().is_some_and(|root| path.starts_with(root))
    }

    pub fn library_file(&self) -> PathBuf {
        self.data_dir.join(LIBRARY_FILENAME)
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("tmp"))
    }

    pub fn thumb_dir(&self) -> PathBuf {
        self.thumb_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("thumbs"))
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tools.timeout_ms)
    }

    /// Create the data, temp and thumbnail directories plus enabled roots.
    ///
    /// Failure here is fatal for the session: nothing downstream can work
    /// without scratch space or a place for the catalog.
    pub fn prepare_dirs(&self) -> Result<(), ConfigError> {
        let mut dirs = vec![self.data_dir.clone(), self.temp_dir(), self.thumb_dir()];
        dirs.extend(self.roots().into_iter().map(Path::to_path_buf));
        for dir in dirs {
            fs::create_dir_all(&dir).map_err(|source| ConfigError::Dir {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

/// One library root (comics or manga).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RootConfig {
    pub enabled: bool,
    pub dir: PathBuf,
}

/// External programs used for containers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolsConfig {
    /// 7-Zip executable, used for listing, extraction and 7z/zip updates.
    pub seven_zip: String,
    /// RAR executable, used only to update `.cbr`/`.rar` files.
    pub rar: String,
    /// Poppler's page rasterizer, used for PDF pages.
    pub pdftoppm: String,
    /// Upper bound on any single tool invocation.
    pub timeout_ms: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            seven_zip: "7z".to_string(),
            rar: "rar".to_string(),
            pdftoppm: "pdftoppm".to_string(),
            timeout_ms: 5000,
        }
    }
}

/// Cover thumbnail settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThumbnailsConfig {
    /// Bounding box edge in pixels; aspect ratio is preserved.
    pub size: u32,
    /// JPEG quality (1-100).
    pub quality: u8,
}

impl Default for ThumbnailsConfig {
    fn default() -> Self {
        Self {
            size: 512,
            quality: 85,
        }
    }
}

/// Parallel hashing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel hashing workers during a scan.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock defaults as a `toml::Value::Table`, the base layer
/// user overrides are merged onto.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(Settings::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read `comic-shelf.toml` from a directory as a raw TOML value.
///
/// `Ok(None)` when the file does not exist.
pub fn load_raw_config(dir: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let path = dir.join(CONFIG_FILENAME);
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&path)?;
    Ok(Some(toml::from_str(&content)?))
}

/// Merge the overlay onto the defaults, deserialize, and validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<Settings, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let settings: Settings = merged.try_into()?;
    settings.validate()?;
    Ok(settings)
}

/// Load settings from `comic-shelf.toml` in `dir`, with paths resolved
/// against `dir`.
pub fn load_config(dir: &Path) -> Result<Settings, ConfigError> {
    let mut settings = resolve_config(load_raw_config(dir)?)?;
    settings.resolve_paths(dir);
    Ok(settings)
}

/// Returns a fully-commented stock `comic-shelf.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# comic-shelf configuration
# ========================
# All settings are optional. Values shown below are the defaults.
# Relative paths are resolved against the directory holding this file.
# Unknown keys will cause an error.

# Directory holding library.xml. Thumbnails and scratch files default to
# subdirectories of it.
data_dir = ".comic-shelf"

# Scratch space for page extraction and metadata injection.
# temp_dir = ".comic-shelf/tmp"

# Cover thumbnails, named Series-Volume-Number-Title.jpg.
# thumb_dir = ".comic-shelf/thumbs"

# Browse by Publisher first. When false, browsing starts at Series.
group_by_publisher = true

# Move imported files into Publisher/Series/Volume/ and rename them
# "Series Vol. V No. N - Title.ext".
manage_files = false

# ---------------------------------------------------------------------------
# Library roots (scanned in this order)
# ---------------------------------------------------------------------------
[comics]
enabled = true
dir = "Comics"

[manga]
# Files under this root are tagged Manga=Yes, everything else Manga=No.
enabled = false
dir = "Manga"

# ---------------------------------------------------------------------------
# External tools
# ---------------------------------------------------------------------------
[tools]
seven_zip = "7z"
rar = "rar"
pdftoppm = "pdftoppm"
# A tool that runs longer than this is killed and the operation fails.
timeout_ms = 5000

# ---------------------------------------------------------------------------
# Thumbnails
# ---------------------------------------------------------------------------
[thumbnails]
# Bounding box in pixels; the cover keeps its aspect ratio.
size = 512
quality = 85

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel hashing workers during a scan.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
