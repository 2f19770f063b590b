use std::fmt;
use std::str::FromStr;

/// Page role values from the ComicInfo schema.
///
/// `Advertisment` keeps the schema's spelling on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    FrontCover,
    InnerCover,
    Roundup,
    Story,
    Advertisement,
    Editorial,
    Letters,
    Preview,
    BackCover,
    Other,
    Deleted,
}

impl PageType {
    pub fn as_str(self) -> &'static str {
        match self {
            PageType::FrontCover => "FrontCover",
            PageType::InnerCover => "InnerCover",
            PageType::Roundup => "Roundup",
            PageType::Story => "Story",
            PageType::Advertisement => "Advertisment",
            PageType::Editorial => "Editorial",
            PageType::Letters => "Letters",
            PageType::Preview => "Preview",
            PageType::BackCover => "BackCover",
            PageType::Other => "Other",
            PageType::Deleted => "Deleted",
        }
    }
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "FrontCover" => PageType::FrontCover,
            "InnerCover" => PageType::InnerCover,
            "Roundup" => PageType::Roundup,
            "Story" => PageType::Story,
            "Advertisment" | "Advertisement" => PageType::Advertisement,
            "Editorial" => PageType::Editorial,
            "Letters" => PageType::Letters,
            "Preview" => PageType::Preview,
            "BackCover" => PageType::BackCover,
            "Other" => PageType::Other,
            "Deleted" => PageType::Deleted,
            other => return Err(format!("unknown page type '{other}'")),
        })
    }
}

/// One `<Page>` entry. Attribute values are kept verbatim so unknown
/// `Type` values survive a round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub image: String,
    pub kind: String,
    pub double_page: String,
    pub image_size: String,
    pub key: String,
    pub image_width: String,
    pub image_height: String,
}

impl Page {
    /// Default page for position `index`.
    pub fn new(index: usize) -> Self {
        Self {
            image: index.to_string(),
            ..Self::default()
        }
    }

    pub fn page_type(&self) -> Option<PageType> {
        self.kind.parse().ok()
    }

    /// Attributes in serialization order. `Image` always comes first.
    pub fn attributes(&self) -> [(&'static str, &str); 7] {
        [
            ("Image", self.image.as_str()),
            ("Type", self.kind.as_str()),
            ("DoublePage", self.double_page.as_str()),
            ("ImageSize", self.image_size.as_str()),
            ("Key", self.key.as_str()),
            ("ImageWidth", self.image_width.as_str()),
            ("ImageHeight", self.image_height.as_str()),
        ]
    }

    /// Assign an attribute by XML name. Unknown names are ignored.
    pub fn set_attribute(&mut self, name: &str, value: String) {
        match name {
            "Image" => self.image = value,
            "Type" => self.kind = value,
            "DoublePage" => self.double_page = value,
            "ImageSize" => self.image_size = value,
            "Key" => self.key = value,
            "ImageWidth" => self.image_width = value,
            "ImageHeight" => self.image_height = value,
            _ => {}
        }
    }
}

/// Ordered pages of a comic. Page `i` carries `Image == i`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageList(Vec<Page>);

impl PageList {
    /// `count` default pages numbered from zero.
    pub fn sequential(count: usize) -> Self {
        Self((0..count).map(Page::new).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Page> {
        self.0.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Page> {
        self.0.get_mut(index)
    }

    pub fn push(&mut self, page: Page) {
        self.0.push(page);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Page> {
        self.0.iter()
    }

    /// Index of the first `FrontCover` page, else 0.
    pub fn front_cover(&self) -> usize {
        self.0
            .iter()
            .position(|p| p.page_type() == Some(PageType::FrontCover))
            .unwrap_or(0)
    }
}

impl<'a> IntoIterator for &'a PageList {
    type Item = &'a Page;
    type IntoIter = std::slice::Iter<'a, Page>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
