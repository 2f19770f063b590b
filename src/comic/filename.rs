//! Best-effort metadata from a comic's file name.
//!
//! Used when a container carries no (or unreadable) embedded metadata. The
//! base name is split into alternating word and separator tokens, then walked
//! left to right with a cursor that says which field the next free-text token
//! belongs to:
//!
//! - `"Batman Vol. 2 No. 5 - Night of the Owls"` → Series `Batman`,
//!   Volume `2`, Number `5`, Title `Night of the Owls`
//! - `"The_Walking_Dead_100"` → Series `The Walking Dead`, Number `100`
//! - `"Saga #54 March 2018"` → Series `Saga`, Number `54`, Month `March`,
//!   Year `2018`
//!
//! Word characters are alphanumerics and `'`; every maximal run of anything
//! else is a single token, so `" - "`, `". "` and `" #"` each arrive whole.

use crate::metadata::{ComicInfo, Tag};
use chrono::Datelike;

const MONTHS: &[&str] = &[
    "January", "Jan", "February", "Feb", "March", "Mar", "April", "Apr", "May", "June", "Jun",
    "July", "Jul", "August", "Aug", "September", "Sep", "October", "Oct", "November", "Nov",
    "December", "Dec", "Spring", "Summer", "Fall", "Autumn", "Winter",
];

const EARLIEST_YEAR: i32 = 1800;

/// Fields recovered from a file name. Empty strings mean "not found".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFileName {
    pub series: String,
    pub title: String,
    pub volume: String,
    pub number: String,
    pub year: String,
    pub month: String,
}

impl ParsedFileName {
    /// Copy every recovered field into `info`, overwriting what is there.
    pub fn apply(&self, info: &mut ComicInfo) {
        info.set(Tag::Series, self.series.as_str());
        info.set(Tag::Title, self.title.as_str());
        info.set(Tag::Volume, self.volume.as_str());
        info.set(Tag::Number, self.number.as_str());
        info.set(Tag::Year, self.year.as_str());
        info.set(Tag::Month, self.month.as_str());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Series,
    Title,
    Volume,
    Number,
    Year,
    Month,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '\''
}

fn tokenize(name: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut in_word = None;
    for (i, c) in name.char_indices() {
        let word = is_word_char(c);
        if in_word.is_some_and(|w| w != word) {
            tokens.push(&name[start..i]);
            start = i;
        }
        in_word = Some(word);
    }
    if start < name.len() {
        tokens.push(&name[start..]);
    }
    tokens
}

fn as_int(token: &str) -> Option<i32> {
    if token.is_empty() || !token.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}

fn is_number_marker(token: &str) -> bool {
    token.eq_ignore_ascii_case("No") || token.eq_ignore_ascii_case("Number") || token.contains('#')
}

fn is_volume_marker(token: &str) -> bool {
    token.eq_ignore_ascii_case("Vol") || token.eq_ignore_ascii_case("Volume")
}

fn is_month(token: &str) -> bool {
    MONTHS.iter().any(|m| m.eq_ignore_ascii_case(token))
}

fn is_blank_separator(token: &str) -> bool {
    token.chars().all(|c| matches!(c, '.' | '_' | ' '))
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse a file name against the current year. Everything after the last
/// `.` is treated as the extension and dropped.
pub fn parse_file_name(name: &str) -> ParsedFileName {
    parse_file_name_in(name, chrono::Local::now().year())
}

/// Parse with an explicit upper bound for year detection.
pub fn parse_file_name_in(name: &str, current_year: i32) -> ParsedFileName {
    let stem = std::path::Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name);
    let tokens = tokenize(stem);

    let mut parsed = ParsedFileName::default();
    let mut cursor = Field::Series;

    for (i, &token) in tokens.iter().enumerate() {
        let int = as_int(token);
        let next_is_int = tokens
            .get(i + 1)
            .and_then(|t| as_int(t))
            .or_else(|| tokens.get(i + 2).and_then(|t| as_int(t)))
            .is_some();
        let has_series = !parsed.series.trim().is_empty();

        if has_series && is_number_marker(token) && next_is_int {
            cursor = Field::Number;
        } else if has_series && is_volume_marker(token) && next_is_int {
            cursor = Field::Volume;
        } else if int.is_some() && matches!(cursor, Field::Number | Field::Volume) {
            let slot = match cursor {
                Field::Number => &mut parsed.number,
                _ => &mut parsed.volume,
            };
            *slot = token.to_string();
        } else if has_series && is_month(token) {
            cursor = Field::Month;
            parsed.month = token.to_string();
        } else if has_series && int.is_some_and(|y| (EARLIEST_YEAR..=current_year).contains(&y)) {
            cursor = Field::Year;
            parsed.year = token.to_string();
        } else if has_series && parsed.number.is_empty() && int.is_some() {
            cursor = Field::Number;
            parsed.number = token.to_string();
        } else if has_series && token == " - " {
            cursor = Field::Title;
        } else if matches!(cursor, Field::Series | Field::Title) {
            let text = match cursor {
                Field::Series => &mut parsed.series,
                _ => &mut parsed.title,
            };
            if is_blank_separator(token) {
                text.push(' ');
            } else {
                text.push_str(token);
            }
        }
    }

    parsed.series = normalize(&parsed.series);
    parsed.title = normalize(&parsed.title);
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(name: &str) -> ParsedFileName {
        parse_file_name_in(name, 2026)
    }

    #[test]
    fn tokens_alternate_words_and_separators() {
        assert_eq!(
            tokenize("Batman Vol. 2 - Owls"),
            vec!["Batman", " ", "Vol", ". ", "2", " - ", "Owls"]
        );
        assert_eq!(tokenize("#12"), vec!["#", "12"]);
        assert_eq!(tokenize("Rocket's_Raccoon"), vec!["Rocket's", "_", "Raccoon"]);
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn full_identity_with_markers() {
        let p = parse("Batman Vol. 2 No. 5 - Night of the Owls.cbz");
        assert_eq!(p.series, "Batman");
        assert_eq!(p.volume, "2");
        assert_eq!(p.number, "5");
        assert_eq!(p.title, "Night of the Owls");
        assert_eq!(p.year, "");
    }

    #[test]
    fn underscores_become_spaces() {
        let p = parse("The_Walking_Dead_100.cbr");
        assert_eq!(p.series, "The Walking Dead");
        assert_eq!(p.number, "100");
    }

    #[test]
    fn hash_marker_month_and_year() {
        let p = parse("Saga #54 March 2018.cbz");
        assert_eq!(p.series, "Saga");
        assert_eq!(p.number, "54");
        assert_eq!(p.month, "March");
        assert_eq!(p.year, "2018");
    }

    #[test]
    fn month_match_is_case_insensitive_and_includes_seasons() {
        assert_eq!(parse("Annual winter 1999").month, "winter");
        assert_eq!(parse("Annual DEC 1999").month, "DEC");
    }

    #[test]
    fn year_bounds() {
        // Above the current year it is just a number.
        let p = parse("Hellboy 2099");
        assert_eq!(p.year, "");
        assert_eq!(p.number, "2099");

        let p = parse("Hellboy 2019");
        assert_eq!(p.year, "2019");
        assert_eq!(p.number, "");

        let p = parse("Hellboy 1799");
        assert_eq!(p.number, "1799");
    }

    #[test]
    fn leading_number_stays_in_series() {
        let p = parse("2000 AD.cbz");
        assert_eq!(p.series, "2000 AD");
        assert_eq!(p.year, "");
    }

    #[test]
    fn dash_only_opens_title_after_series() {
        let p = parse(" - Prologue.cbz");
        assert_eq!(p.title, "");
        assert_eq!(p.series, "- Prologue");
    }

    #[test]
    fn marker_without_following_int_is_text() {
        let p = parse("Issue No Man's Land.cbz");
        assert_eq!(p.series, "Issue No Man's Land");
        assert_eq!(p.number, "");
    }

    #[test]
    fn volume_without_number() {
        let p = parse("Sandman Volume 3 - Dream Country");
        assert_eq!(p.series, "Sandman");
        assert_eq!(p.volume, "3");
        assert_eq!(p.number, "");
        assert_eq!(p.title, "Dream Country");
    }

    #[test]
    fn punctuation_is_kept_and_whitespace_collapsed() {
        let p = parse("Spider-Man.. Blue.cbz");
        assert_eq!(p.series, "Spider-Man Blue");
    }

    #[test]
    fn apply_overwrites_fields() {
        let mut info = ComicInfo::new();
        info.set(Tag::Series, "Old");
        info.set(Tag::Writer, "Kept");
        parse("Batman Vol. 2 No. 5 - Night of the Owls.cbz").apply(&mut info);
        assert_eq!(info.get(Tag::Series), "Batman");
        assert_eq!(info.get(Tag::Title), "Night of the Owls");
        assert_eq!(info.get(Tag::Writer), "Kept");
    }

    #[test]
    fn current_year_variant_accepts_this_year() {
        let year = chrono::Local::now().year();
        assert_eq!(parse_file_name(&format!("Hellboy {year}")).year, year.to_string());
    }
}
