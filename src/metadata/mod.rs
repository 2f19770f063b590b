//! The ComicInfo metadata record.
//!
//! A [`ComicInfo`] always holds exactly 28 string tags, in the fixed order of
//! [`Tag::ALL`], plus an ordered [`PageList`]. An empty string means "unset";
//! there is no separate notion of a missing tag.
//!
//! Lookups by index or by name never fail: unknown keys resolve to a shared
//! null tag whose name and value are empty. Catalog merges and attribute
//! index rebuilds do these lookups in tight loops. Callers that want to
//! distinguish "unknown" from "empty" use [`ComicInfo::lookup`].

mod page;
pub mod xml;

pub use page::{Page, PageList, PageType};
pub use xml::{COMICINFO_NAMESPACE, Decoded, XmlError, decode, encode, encode_namespaced};

use serde::Serialize;
use std::fmt;

/// One of the 28 ComicInfo fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Tag {
    Title,
    Series,
    Number,
    Count,
    Volume,
    AlternateSeries,
    AlternateNumber,
    AlternateCount,
    Summary,
    Notes,
    Year,
    Month,
    Writer,
    Penciller,
    Inker,
    Colorist,
    Letterer,
    CoverArtist,
    Editor,
    Publisher,
    Imprint,
    Genre,
    Web,
    PageCount,
    LanguageISO,
    Format,
    BlackAndWhite,
    Manga,
}

impl Tag {
    pub const COUNT: usize = 28;

    /// Every tag in schema order.
    pub const ALL: [Tag; Tag::COUNT] = [
        Tag::Title,
        Tag::Series,
        Tag::Number,
        Tag::Count,
        Tag::Volume,
        Tag::AlternateSeries,
        Tag::AlternateNumber,
        Tag::AlternateCount,
        Tag::Summary,
        Tag::Notes,
        Tag::Year,
        Tag::Month,
        Tag::Writer,
        Tag::Penciller,
        Tag::Inker,
        Tag::Colorist,
        Tag::Letterer,
        Tag::CoverArtist,
        Tag::Editor,
        Tag::Publisher,
        Tag::Imprint,
        Tag::Genre,
        Tag::Web,
        Tag::PageCount,
        Tag::LanguageISO,
        Tag::Format,
        Tag::BlackAndWhite,
        Tag::Manga,
    ];

    /// XML element name.
    pub fn name(self) -> &'static str {
        match self {
            Tag::Title => "Title",
            Tag::Series => "Series",
            Tag::Number => "Number",
            Tag::Count => "Count",
            Tag::Volume => "Volume",
            Tag::AlternateSeries => "AlternateSeries",
            Tag::AlternateNumber => "AlternateNumber",
            Tag::AlternateCount => "AlternateCount",
            Tag::Summary => "Summary",
            Tag::Notes => "Notes",
            Tag::Year => "Year",
            Tag::Month => "Month",
            Tag::Writer => "Writer",
            Tag::Penciller => "Penciller",
            Tag::Inker => "Inker",
            Tag::Colorist => "Colorist",
            Tag::Letterer => "Letterer",
            Tag::CoverArtist => "CoverArtist",
            Tag::Editor => "Editor",
            Tag::Publisher => "Publisher",
            Tag::Imprint => "Imprint",
            Tag::Genre => "Genre",
            Tag::Web => "Web",
            Tag::PageCount => "PageCount",
            Tag::LanguageISO => "LanguageISO",
            Tag::Format => "Format",
            Tag::BlackAndWhite => "BlackAndWhite",
            Tag::Manga => "Manga",
        }
    }

    /// Exact, case-sensitive element name match.
    pub fn from_name(name: &str) -> Option<Tag> {
        Tag::ALL.into_iter().find(|tag| tag.name() == name)
    }

    pub fn from_index(index: usize) -> Option<Tag> {
        Tag::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Tags that make up the thumbnail name and the managed file name.
    pub fn is_identifying(self) -> bool {
        matches!(self, Tag::Series | Tag::Volume | Tag::Number | Tag::Title)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A tag paired with its value. The null tag has no [`Tag`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataTag {
    tag: Option<Tag>,
    value: String,
}

static NULL_TAG: MetadataTag = MetadataTag {
    tag: None,
    value: String::new(),
};

impl MetadataTag {
    fn new(tag: Tag) -> Self {
        Self {
            tag: Some(tag),
            value: String::new(),
        }
    }

    /// The shared sentinel returned for unknown keys.
    pub fn null() -> &'static MetadataTag {
        &NULL_TAG
    }

    pub fn is_null(&self) -> bool {
        self.tag.is_none()
    }

    pub fn tag(&self) -> Option<Tag> {
        self.tag
    }

    /// Element name, or `""` for the null tag.
    pub fn name(&self) -> &'static str {
        self.tag.map(Tag::name).unwrap_or("")
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

/// The full ComicInfo record: 28 tags plus the page list.
///
/// Equality compares every tag value and the whole page list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComicInfo {
    tags: Vec<MetadataTag>,
    pub pages: PageList,
}

impl Default for ComicInfo {
    fn default() -> Self {
        Self {
            tags: Tag::ALL.into_iter().map(MetadataTag::new).collect(),
            pages: PageList::default(),
        }
    }
}

impl ComicInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of a tag; `""` when unset.
    pub fn get(&self, tag: Tag) -> &str {
        &self.tags[tag.index()].value
    }

    /// Set a tag, returning the previous value if it changed.
    pub fn set(&mut self, tag: Tag, value: impl Into<String>) -> Option<String> {
        let value = value.into();
        let slot = &mut self.tags[tag.index()].value;
        if *slot == value {
            return None;
        }
        Some(std::mem::replace(slot, value))
    }

    /// Positional lookup; out-of-range indices yield the null tag.
    pub fn tag_at(&self, index: usize) -> &MetadataTag {
        self.tags.get(index).unwrap_or(&NULL_TAG)
    }

    /// Name lookup; unknown names yield the null tag.
    pub fn tag_named(&self, name: &str) -> &MetadataTag {
        Tag::from_name(name)
            .map(|tag| &self.tags[tag.index()])
            .unwrap_or(&NULL_TAG)
    }

    /// Name lookup that reports unknown names as `None`.
    pub fn lookup(&self, name: &str) -> Option<&MetadataTag> {
        Tag::from_name(name).map(|tag| &self.tags[tag.index()])
    }

    /// All 28 tags in schema order.
    pub fn tags(&self) -> impl Iterator<Item = &MetadataTag> {
        self.tags.iter()
    }

    /// True when every tag is empty. Pages do not count.
    pub fn is_null(&self) -> bool {
        self.tags.iter().all(|t| t.value.is_empty())
    }

    /// True if any identifying tag differs from `other`.
    pub fn identity_differs(&self, other: &ComicInfo) -> bool {
        Tag::ALL
            .into_iter()
            .filter(|t| t.is_identifying())
            .any(|t| self.get(t) != other.get(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_order_and_names() {
        assert_eq!(Tag::ALL.len(), 28);
        assert_eq!(Tag::ALL[0], Tag::Title);
        assert_eq!(Tag::ALL[27], Tag::Manga);
        for (i, tag) in Tag::ALL.into_iter().enumerate() {
            assert_eq!(tag.index(), i);
            assert_eq!(Tag::from_index(i), Some(tag));
            assert_eq!(Tag::from_name(tag.name()), Some(tag));
        }
        assert_eq!(Tag::Letterer.name(), "Letterer");
        assert_eq!(Tag::LanguageISO.to_string(), "LanguageISO");
    }

    #[test]
    fn unknown_keys_resolve_to_null_tag() {
        let info = ComicInfo::new();
        assert!(info.tag_at(28).is_null());
        assert!(info.tag_named("Letter").is_null());
        assert!(info.tag_named("title").is_null());
        assert_eq!(info.tag_named("Nope").name(), "");
        assert_eq!(info.tag_named("Nope").value(), "");
        assert!(info.lookup("Nope").is_none());
    }

    #[test]
    fn lookup_by_index_and_name_agree() {
        let mut info = ComicInfo::new();
        info.set(Tag::Writer, "Scott Snyder");
        assert_eq!(info.tag_at(Tag::Writer.index()).value(), "Scott Snyder");
        assert_eq!(info.tag_named("Writer").value(), "Scott Snyder");
        assert_eq!(info.lookup("Writer").map(|t| t.tag()), Some(Some(Tag::Writer)));
    }

    #[test]
    fn set_reports_previous_value_only_on_change() {
        let mut info = ComicInfo::new();
        assert_eq!(info.set(Tag::Series, "Batman"), Some(String::new()));
        assert_eq!(info.set(Tag::Series, "Batman"), None);
        assert_eq!(info.set(Tag::Series, "Robin"), Some("Batman".to_string()));
        assert_eq!(info.get(Tag::Series), "Robin");
    }

    #[test]
    fn null_until_any_tag_set() {
        let mut info = ComicInfo::new();
        info.pages = PageList::sequential(3);
        assert!(info.is_null());
        info.set(Tag::Year, "2012");
        assert!(!info.is_null());
    }

    #[test]
    fn equality_covers_tags_and_pages() {
        let mut a = ComicInfo::new();
        a.set(Tag::Title, "Court of Owls");
        a.pages = PageList::sequential(2);
        let mut b = a.clone();
        assert_eq!(a, b);

        b.pages = PageList::sequential(3);
        assert_ne!(a, b);

        let mut c = a.clone();
        c.set(Tag::Notes, "x");
        assert_ne!(a, c);
    }

    #[test]
    fn identity_ignores_non_identifying_tags() {
        let mut a = ComicInfo::new();
        a.set(Tag::Series, "Batman");
        let mut b = a.clone();
        b.set(Tag::Writer, "Someone");
        assert!(!a.identity_differs(&b));
        b.set(Tag::Number, "5");
        assert!(a.identity_differs(&b));
    }
}
