//! The `library.xml` catalog file.
//!
//! ```xml
//! <?xml version="1.0"?>
//! <Library>
//!   <Comics>
//!     <Comic>
//!       <Title>Night of the Owls</Title>
//!       <Series>Batman</Series>
//!       <Pages>
//!         <Page Image="0" Type="FrontCover"/>
//!       </Pages>
//!       <Path>/comics/DC/Batman/2/Batman Vol. 2 No. 5 - Night of the Owls.cbz</Path>
//!       <Hash>9f86d0...</Hash>
//!     </Comic>
//!   </Comics>
//! </Library>
//! ```
//!
//! Writes go to a sibling `.tmp` file that is renamed into place, so a crash
//! mid-write never leaves a truncated catalog behind.

use super::CatalogError;
use crate::comic::ComicRecord;
use crate::metadata::ComicInfo;
use crate::metadata::xml::{self, XmlError};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// One `<Comic>` element as read back from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredComic {
    pub path: PathBuf,
    /// Empty when the element had no `Hash`; such entries are always
    /// re-read from the file.
    pub hash: String,
    pub info: ComicInfo,
}

fn write_error(path: &Path) -> impl FnOnce(XmlError) -> CatalogError + '_ {
    move |source| CatalogError::XmlWrite {
        path: path.to_path_buf(),
        source,
    }
}

fn read_error(path: &Path) -> impl FnOnce(XmlError) -> CatalogError + '_ {
    move |source| CatalogError::XmlRead {
        path: path.to_path_buf(),
        source,
    }
}

pub fn write_library<'a>(
    path: &Path,
    records: impl IntoIterator<Item = &'a ComicRecord>,
) -> Result<(), CatalogError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(CatalogError::dir(parent))?;
    }
    let staged = path.with_extension("xml.tmp");
    let file = File::create(&staged).map_err(CatalogError::file(&staged))?;
    let mut writer = Writer::new_with_indent(BufWriter::new(file), b' ', 2);

    write_document(&mut writer, records).map_err(write_error(path))?;

    writer
        .into_inner()
        .flush()
        .map_err(CatalogError::file(&staged))?;
    fs::rename(&staged, path).map_err(CatalogError::file(path))?;
    Ok(())
}

fn write_document<'a, W: Write>(
    writer: &mut Writer<W>,
    records: impl IntoIterator<Item = &'a ComicRecord>,
) -> Result<(), XmlError> {
    xml::emit(writer, Event::Decl(BytesDecl::new("1.0", None, None)))?;
    xml::emit(writer, Event::Start(BytesStart::new("Library")))?;
    xml::emit(writer, Event::Start(BytesStart::new("Comics")))?;
    for record in records {
        xml::emit(writer, Event::Start(BytesStart::new("Comic")))?;
        xml::write_body(writer, record.info(), None)?;
        xml::write_text_element(writer, "Path", &record.path().to_string_lossy())?;
        if !record.hash().is_empty() {
            xml::write_text_element(writer, "Hash", record.hash())?;
        }
        xml::emit(writer, Event::End(BytesEnd::new("Comic")))?;
    }
    xml::emit(writer, Event::End(BytesEnd::new("Comics")))?;
    xml::emit(writer, Event::End(BytesEnd::new("Library")))
}

/// Read every `<Comic>` in document order. Unknown elements are skipped; a
/// `<Comic>` without a `Path` is a read error.
pub fn read_library(path: &Path) -> Result<Vec<StoredComic>, CatalogError> {
    let file = File::open(path).map_err(CatalogError::file(path))?;
    let mut reader = Reader::from_reader(BufReader::new(file));
    read_comics(&mut reader).map_err(read_error(path))
}

fn read_comics<R: std::io::BufRead>(reader: &mut Reader<R>) -> Result<Vec<StoredComic>, XmlError> {
    let mut comics = Vec::new();
    let mut buf = Vec::new();
    let mut saw_root = false;

    loop {
        buf.clear();
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| XmlError::Read(e.to_string()))?;
        match event {
            Event::Start(e) => match e.local_name().as_ref() {
                b"Library" | b"Comics" => saw_root = true,
                b"Comic" => {
                    let body = xml::read_body(reader)?;
                    let path = body
                        .path
                        .filter(|p| !p.is_empty())
                        .ok_or_else(|| XmlError::Read("Comic element without a Path".into()))?;
                    comics.push(StoredComic {
                        path: PathBuf::from(path),
                        hash: body.hash.unwrap_or_default(),
                        info: body.info,
                    });
                }
                _ => xml::skip_element(reader, e.name().as_ref())?,
            },
            Event::Empty(e) if e.local_name().as_ref() == b"Library" => saw_root = true,
            Event::Eof if saw_root => return Ok(comics),
            Event::Eof => return Err(XmlError::Read("no Library element".into())),
            _ => {}
        }
    }
}
