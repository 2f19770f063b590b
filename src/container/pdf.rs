//! PDF containers.
//!
//! The page count comes from the page tree. Metadata lives in a stream
//! object referenced from the document catalog under `/ComicInfo` with
//! `/Subtype /XML`. Writes go to `<stem>_NEW.pdf` next to the original,
//! which is then renamed over it. Pages are rasterized one at a time with
//! `pdftoppm -f N -l N -jpeg -singlefile`.

use super::{Container, ContainerError, ContainerKind};
use crate::context::Context;
use lopdf::{Document, Object, ObjectId, Stream, dictionary};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Catalog key of the metadata stream.
pub const METADATA_KEY: &[u8] = b"ComicInfo";

/// Output prefix handed to `pdftoppm`; it appends `.jpg`.
const RENDER_PREFIX: &str = "extracted_image";

pub struct PdfContainer {
    path: PathBuf,
    document: Document,
    pages: usize,
    context: Arc<Context>,
}

fn pdf_error(path: &Path, what: &str, e: impl std::fmt::Display) -> ContainerError {
    ContainerError::Pdf(format!("{what} {}: {e}", path.display()))
}

impl PdfContainer {
    pub fn open(path: &Path, context: Arc<Context>) -> Result<Self, ContainerError> {
        let document = Document::load(path).map_err(|e| pdf_error(path, "cannot load", e))?;
        if document.is_encrypted() {
            return Err(ContainerError::Pdf(format!(
                "{} is encrypted",
                path.display()
            )));
        }
        let pages = document.get_pages().len();
        debug!(path = %path.display(), pages, "opened pdf");
        Ok(Self {
            path: path.to_path_buf(),
            document,
            pages,
            context,
        })
    }

    fn catalog_id(&self) -> Result<ObjectId, ContainerError> {
        self.document
            .trailer
            .get(b"Root")
            .and_then(Object::as_reference)
            .map_err(|e| pdf_error(&self.path, "no catalog in", e))
    }

    /// Object id of the existing metadata stream, if any.
    fn metadata_id(&self) -> Option<ObjectId> {
        let catalog = self.document.get_object(self.catalog_id().ok()?).ok()?;
        let id = catalog.as_dict().ok()?.get(METADATA_KEY).ok()?.as_reference().ok()?;
        self.document.get_object(id).ok()?.as_stream().ok()?;
        Some(id)
    }

    fn metadata_stream(&self) -> Option<&Stream> {
        let id = self.metadata_id()?;
        self.document.get_object(id).ok()?.as_stream().ok()
    }

    fn write_in_place(&mut self) -> Result<(), ContainerError> {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let staged = self.path.with_file_name(format!("{stem}_NEW.pdf"));
        self.document
            .save(&staged)
            .map_err(|e| pdf_error(&staged, "cannot write", e))?;
        fs::rename(&staged, &self.path).map_err(ContainerError::file(&self.path))?;
        Ok(())
    }
}

impl Container for PdfContainer {
    fn kind(&self) -> ContainerKind {
        ContainerKind::Pdf
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn list_entries(&self) -> Vec<String> {
        (1..=self.pages).map(|n| format!("page-{n:04}.jpg")).collect()
    }

    fn page_count(&self) -> usize {
        self.pages
    }

    fn has_embedded_metadata(&self) -> bool {
        self.metadata_stream().is_some_and(|s| !s.content.is_empty())
    }

    fn read_metadata_bytes(&self) -> Result<Vec<u8>, ContainerError> {
        let stream = self.metadata_stream().ok_or_else(|| {
            ContainerError::Logic(format!("{} has no ComicInfo stream", self.path.display()))
        })?;
        // Unfiltered streams have nothing to decompress.
        Ok(stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone()))
    }

    fn inject_metadata_bytes(&mut self, bytes: &[u8]) -> Result<(), ContainerError> {
        match self.metadata_id() {
            Some(id) => {
                let stream = self
                    .document
                    .get_object_mut(id)
                    .and_then(Object::as_stream_mut)
                    .map_err(|e| pdf_error(&self.path, "cannot update metadata in", e))?;
                stream.dict.set("Subtype", Object::Name(b"XML".to_vec()));
                stream.set_plain_content(bytes.to_vec());
            }
            None => {
                let stream = Stream::new(
                    dictionary! { "Subtype" => Object::Name(b"XML".to_vec()) },
                    bytes.to_vec(),
                );
                let id = self.document.add_object(stream);
                let catalog_id = self.catalog_id()?;
                self.document
                    .get_object_mut(catalog_id)
                    .and_then(Object::as_dict_mut)
                    .map_err(|e| pdf_error(&self.path, "cannot update catalog of", e))?
                    .set(METADATA_KEY, Object::Reference(id));
            }
        }
        self.write_in_place()?;
        info!(path = %self.path.display(), bytes = bytes.len(), "injected metadata");
        Ok(())
    }

    fn extract_page(&self, index: usize) -> Result<PathBuf, ContainerError> {
        if index >= self.pages {
            return Err(ContainerError::Logic(format!(
                "page {index} out of range for {} ({} pages)",
                self.path.display(),
                self.pages
            )));
        }
        let dir = self.context.settings().temp_dir();
        fs::create_dir_all(&dir).map_err(ContainerError::file(&dir))?;

        let page = (index + 1).to_string();
        let prefix = dir.join(RENDER_PREFIX);
        let pdftoppm = &self.context.settings().tools.pdftoppm;
        self.context.run_tool(
            pdftoppm,
            &[
                OsStr::new("-f"),
                OsStr::new(&page),
                OsStr::new("-l"),
                OsStr::new(&page),
                OsStr::new("-jpeg"),
                OsStr::new("-singlefile"),
                self.path.as_os_str(),
                prefix.as_os_str(),
            ],
        )?;

        let rendered = prefix.with_extension("jpg");
        if !rendered.is_file() {
            return Err(ContainerError::Pdf(format!(
                "rendering page {page} of {} produced no image",
                self.path.display()
            )));
        }
        Ok(rendered)
    }
}
