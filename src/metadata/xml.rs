//! ComicInfo XML encoding and decoding.
//!
//! ```xml
//! <?xml version="1.0"?>
//! <ComicInfo>
//!   <Title>Night of the Owls</Title>
//!   <Series>Batman</Series>
//!   <Pages>
//!     <Page Image="0" Type="FrontCover"/>
//!     <Page Image="1"/>
//!   </Pages>
//! </ComicInfo>
//! ```
//!
//! Only non-empty tags are written. Page attributes other than `Image` are
//! written only when non-empty. Decoding matches elements by local name, so
//! the `ci:`-prefixed form stored inside PDFs decodes the same way.
//!
//! The element body reader is shared with the catalog file, whose `<Comic>`
//! elements carry the same children plus `Path` and `Hash`.

use super::{ComicInfo, Page, PageList, Tag};
use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::QName;
use std::io::{BufRead, Write};
use thiserror::Error;

/// Namespace bound to the `ci` prefix in PDF-embedded metadata.
pub const COMICINFO_NAMESPACE: &str =
    "http://comicrack.cyolito.com/downloads/ComicRack/Support-Files/ComicInfoSchema.zip";

const PDF_PREFIX: &str = "ci";

#[derive(Error, Debug)]
pub enum XmlError {
    #[error("XML read error: {0}")]
    Read(String),
    #[error("XML write error: {0}")]
    Write(String),
}

fn read_err(err: impl std::fmt::Display) -> XmlError {
    XmlError::Read(err.to_string())
}

fn write_err(err: impl std::fmt::Display) -> XmlError {
    XmlError::Write(err.to_string())
}

/// Result of decoding a ComicInfo document.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub info: ComicInfo,
    /// A `<Page>` carried an `Image` that did not match its position and was
    /// replaced by a default page.
    pub pages_repaired: bool,
}

/// Children of a ComicInfo-shaped element, including the catalog-only
/// `Path` and `Hash`.
#[derive(Debug, Default)]
pub(crate) struct Body {
    pub info: ComicInfo,
    pub pages_repaired: bool,
    pub path: Option<String>,
    pub hash: Option<String>,
}

// ============================================================================
// Encoding
// ============================================================================

/// Encode as a plain `ComicInfo.xml` document.
pub fn encode(info: &ComicInfo) -> Result<Vec<u8>, XmlError> {
    encode_document(info, None)
}

/// Encode with the `ci` namespace prefix used inside PDFs.
pub fn encode_namespaced(info: &ComicInfo) -> Result<Vec<u8>, XmlError> {
    encode_document(info, Some(PDF_PREFIX))
}

fn encode_document(info: &ComicInfo, prefix: Option<&str>) -> Result<Vec<u8>, XmlError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    emit(&mut writer, Event::Decl(BytesDecl::new("1.0", None, None)))?;

    let root_name = qualify(prefix, "ComicInfo");
    let mut root = BytesStart::new(root_name.as_str());
    if let Some(prefix) = prefix {
        root.push_attribute((format!("xmlns:{prefix}").as_str(), COMICINFO_NAMESPACE));
    }
    emit(&mut writer, Event::Start(root))?;
    write_body(&mut writer, info, prefix)?;
    emit(&mut writer, Event::End(BytesEnd::new(root_name.as_str())))?;

    Ok(writer.into_inner())
}

/// Write the non-empty tags followed by the `Pages` block.
pub(crate) fn write_body<W: Write>(
    writer: &mut Writer<W>,
    info: &ComicInfo,
    prefix: Option<&str>,
) -> Result<(), XmlError> {
    for tag in info.tags().filter(|t| !t.value().is_empty()) {
        write_text_element(writer, &qualify(prefix, tag.name()), tag.value())?;
    }

    let pages_name = qualify(prefix, "Pages");
    let page_name = qualify(prefix, "Page");
    emit(writer, Event::Start(BytesStart::new(pages_name.as_str())))?;
    for page in &info.pages {
        let mut element = BytesStart::new(page_name.as_str());
        for (name, value) in page.attributes() {
            if name == "Image" || !value.is_empty() {
                element.push_attribute((name, value));
            }
        }
        emit(writer, Event::Empty(element))?;
    }
    emit(writer, Event::End(BytesEnd::new(pages_name.as_str())))
}

pub(crate) fn write_text_element<W: Write>(
    writer: &mut Writer<W>,
    name: &str,
    value: &str,
) -> Result<(), XmlError> {
    emit(writer, Event::Start(BytesStart::new(name)))?;
    emit(writer, Event::Text(BytesText::new(value)))?;
    emit(writer, Event::End(BytesEnd::new(name)))
}

pub(crate) fn emit<W: Write>(writer: &mut Writer<W>, event: Event<'_>) -> Result<(), XmlError> {
    writer.write_event(event).map_err(write_err)
}

fn qualify(prefix: Option<&str>, name: &str) -> String {
    match prefix {
        Some(p) => format!("{p}:{name}"),
        None => name.to_string(),
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode a ComicInfo document. Any root element name is accepted.
pub fn decode(bytes: &[u8]) -> Result<Decoded, XmlError> {
    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_event_into(&mut buf).map_err(read_err)? {
            Event::Start(_) => {
                let body = read_body(&mut reader)?;
                return Ok(Decoded {
                    info: body.info,
                    pages_repaired: body.pages_repaired,
                });
            }
            Event::Empty(_) => {
                return Ok(Decoded {
                    info: ComicInfo::default(),
                    pages_repaired: false,
                });
            }
            Event::Eof => return Err(XmlError::Read("document has no root element".into())),
            _ => {}
        }
    }
}

/// Read children until the end tag of the element whose start was just
/// consumed.
pub(crate) fn read_body<R: BufRead>(reader: &mut Reader<R>) -> Result<Body, XmlError> {
    let mut body = Body::default();
    let mut buf = Vec::new();
    let mut inner = Vec::new();

    loop {
        buf.clear();
        match reader.read_event_into(&mut buf).map_err(read_err)? {
            Event::Start(e) => {
                let local = e.local_name();
                match local.as_ref() {
                    b"Pages" => {
                        let (pages, repaired) = read_pages(reader, &mut inner)?;
                        body.info.pages = pages;
                        body.pages_repaired |= repaired;
                    }
                    b"Path" => body.path = Some(read_text(reader, &mut inner)?),
                    b"Hash" => body.hash = Some(read_text(reader, &mut inner)?),
                    name => match std::str::from_utf8(name).ok().and_then(Tag::from_name) {
                        Some(tag) => {
                            let value = read_text(reader, &mut inner)?;
                            body.info.set(tag, value);
                        }
                        None => {
                            inner.clear();
                            reader
                                .read_to_end_into(e.name(), &mut inner)
                                .map_err(read_err)?;
                        }
                    },
                }
            }
            Event::End(_) => return Ok(body),
            Event::Eof => return Err(XmlError::Read("unexpected end of document".into())),
            _ => {}
        }
    }
}

fn read_pages<R: BufRead>(
    reader: &mut Reader<R>,
    buf: &mut Vec<u8>,
) -> Result<(PageList, bool), XmlError> {
    let mut pages = PageList::default();
    let mut repaired = false;
    let mut skip = Vec::new();

    loop {
        buf.clear();
        match reader.read_event_into(buf).map_err(read_err)? {
            Event::Empty(e) if e.local_name().as_ref() == b"Page" => {
                repaired |= push_page(&mut pages, &e)?;
            }
            Event::Start(e) => {
                if e.local_name().as_ref() == b"Page" {
                    repaired |= push_page(&mut pages, &e)?;
                }
                skip.clear();
                reader.read_to_end_into(e.name(), &mut skip).map_err(read_err)?;
            }
            Event::End(_) => return Ok((pages, repaired)),
            Event::Eof => return Err(XmlError::Read("unterminated Pages element".into())),
            _ => {}
        }
    }
}

/// Append the page described by `element`. A page whose `Image` is not its
/// ordinal is replaced by a default page; returns true in that case.
fn push_page(pages: &mut PageList, element: &BytesStart<'_>) -> Result<bool, XmlError> {
    let ordinal = pages.len();
    let mut page = Page::default();
    for attr in element.attributes() {
        let attr = attr.map_err(read_err)?;
        let name = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value().map_err(read_err)?.into_owned();
        page.set_attribute(&name, value);
    }

    if page.image == ordinal.to_string() {
        pages.push(page);
        Ok(false)
    } else {
        pages.push(Page::new(ordinal));
        Ok(true)
    }
}

/// Concatenated text content up to the current element's end tag. Nested
/// elements are skipped.
fn read_text<R: BufRead>(reader: &mut Reader<R>, buf: &mut Vec<u8>) -> Result<String, XmlError> {
    let mut text = String::new();
    let mut skip = Vec::new();

    loop {
        buf.clear();
        match reader.read_event_into(buf).map_err(read_err)? {
            Event::Text(t) => text.push_str(&t.unescape().map_err(read_err)?),
            Event::CData(c) => text.push_str(&String::from_utf8_lossy(&c.into_inner())),
            Event::Start(e) => {
                skip.clear();
                reader.read_to_end_into(e.name(), &mut skip).map_err(read_err)?;
            }
            Event::End(_) => return Ok(text),
            Event::Eof => return Err(XmlError::Read("unexpected end of document".into())),
            _ => {}
        }
    }
}

/// Skip the rest of an element given its qualified name.
pub(crate) fn skip_element<R: BufRead>(reader: &mut Reader<R>, name: &[u8]) -> Result<(), XmlError> {
    let mut skip = Vec::new();
    reader
        .read_to_end_into(QName(name), &mut skip)
        .map(|_| ())
        .map_err(read_err)
}
