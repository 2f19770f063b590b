//! Uniform access to comic containers.
//!
//! A comic is either an archive (7z, zip or rar family) or a PDF. Both
//! variants implement [`Container`]: list the entries, count pages, read and
//! inject the embedded `ComicInfo` metadata, and extract one page to a
//! scratch file. Everything above this module is format-agnostic.
//!
//! | Kind | Extensions | Listing / extraction | Metadata |
//! |---|---|---|---|
//! | Archive | `cbz` `zip` `cb7` `7z` `cbr` `rar` | `7z l` / `7z e` | `ComicInfo.xml` entry, updated with `7z u` or `rar u` |
//! | Pdf | `pdf` | page tree / `pdftoppm` | `/ComicInfo` stream in the document catalog |
//!
//! ## Errors
//!
//! - [`ContainerError::Logic`]: caller contract violations (page index out
//!   of range, unsupported file type). Never worth retrying.
//! - [`ContainerError::Process`]: a tool failed to start, exited non-zero,
//!   crashed or ran past the timeout. Scratch files are left as they are.
//! - [`ContainerError::Pdf`]: malformed or locked document, failed render.
//! - [`ContainerError::File`]: scratch file I/O.

pub mod archive;
pub mod pdf;
pub mod process;

use crate::context::Context;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

pub use archive::ArchiveContainer;
pub use pdf::PdfContainer;
pub use process::{SystemRunner, ToolOutput, ToolRunner};

/// Name of the embedded metadata entry inside archives.
pub const METADATA_ENTRY: &str = "ComicInfo.xml";

/// Page image extensions recognized inside archives.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff", "gif", "bmp"];

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("Logic error: {0}")]
    Logic(String),
    #[error("File error on {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Process error: {0}")]
    Process(String),
    #[error("PDF error: {0}")]
    Pdf(String),
}

impl ContainerError {
    pub(crate) fn file(path: &Path) -> impl FnOnce(std::io::Error) -> ContainerError + '_ {
        move |source| ContainerError::File {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Archive flavour; decides the update command and the `-t` type flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArchiveFormat {
    SevenZip,
    Zip,
    Rar,
}

impl ArchiveFormat {
    /// Value for 7-Zip's `-t` switch.
    pub fn type_flag(self) -> &'static str {
        match self {
            ArchiveFormat::SevenZip => "7z",
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::Rar => "rar",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ContainerKind {
    Archive(ArchiveFormat),
    Pdf,
    Unsupported,
}

impl ContainerKind {
    /// Resolve from the file extension, case-insensitively.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("7z" | "cb7") => ContainerKind::Archive(ArchiveFormat::SevenZip),
            Some("zip" | "cbz") => ContainerKind::Archive(ArchiveFormat::Zip),
            Some("rar" | "cbr") => ContainerKind::Archive(ArchiveFormat::Rar),
            Some("pdf") => ContainerKind::Pdf,
            _ => ContainerKind::Unsupported,
        }
    }

    pub fn is_supported(self) -> bool {
        self != ContainerKind::Unsupported
    }

    /// Human-readable file type.
    pub fn describe(self) -> &'static str {
        match self {
            ContainerKind::Archive(ArchiveFormat::Zip) => "Comic Book Archive (ZIP/cbz)",
            ContainerKind::Archive(ArchiveFormat::SevenZip) => "Comic Book Archive (7z/cb7)",
            ContainerKind::Archive(ArchiveFormat::Rar) => "Comic Book Archive (RAR/cbr)",
            ContainerKind::Pdf => "Portable Document Format (PDF)",
            ContainerKind::Unsupported => "Unsupported",
        }
    }
}

/// True if an archive entry name looks like a page image.
pub fn is_page_image(entry: &str) -> bool {
    Path::new(entry)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|i| ext.eq_ignore_ascii_case(i)))
}

/// One comic file's container.
pub trait Container: Send {
    fn kind(&self) -> ContainerKind;

    fn path(&self) -> &Path;

    /// Entry names in container order. PDFs report one synthetic entry per page.
    fn list_entries(&self) -> Vec<String>;

    /// Number of extractable page images.
    fn page_count(&self) -> usize;

    fn has_embedded_metadata(&self) -> bool;

    /// Raw bytes of the embedded metadata document.
    fn read_metadata_bytes(&self) -> Result<Vec<u8>, ContainerError>;

    /// Create or replace the embedded metadata document.
    fn inject_metadata_bytes(&mut self, bytes: &[u8]) -> Result<(), ContainerError>;

    /// Extract page `index` to a scratch file and return its path. The
    /// caller owns (and removes) the file.
    fn extract_page(&self, index: usize) -> Result<PathBuf, ContainerError>;
}

/// Open the container for `path`, picking the variant from its extension.
pub fn open(path: &Path, context: &Arc<Context>) -> Result<Box<dyn Container>, ContainerError> {
    match ContainerKind::from_path(path) {
        ContainerKind::Archive(format) => Ok(Box::new(ArchiveContainer::open(
            path,
            format,
            Arc::clone(context),
        )?)),
        ContainerKind::Pdf => Ok(Box::new(PdfContainer::open(path, Arc::clone(context))?)),
        ContainerKind::Unsupported => Err(ContainerError::Logic(format!(
            "{} is an unsupported type",
            path.display()
        ))),
    }
}
