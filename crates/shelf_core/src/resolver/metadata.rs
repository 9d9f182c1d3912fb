use crate::library::types::{
    BookRecord, MAX_GENRES, RecordSource, UNCATEGORIZED, UNKNOWN_AUTHOR, UNKNOWN_TITLE, clean_list,
};
use crate::resolver::open_library::cover_url;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s{2,}").expect("Regex must be valid"));

static YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})\b").expect("Regex must be valid"));

/// Raw metadata as a source returns it, before any defaults are filled in.
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookMetadata {
    pub title: Option<String>,
    /// Authors in the order the source lists them.
    pub authors: Vec<String>,
    /// Subjects or genres in the order the source lists them.
    pub genres: Vec<String>,
    pub description: Option<String>,
    pub cover_url: Option<String>,
    pub page_count: Option<u32>,
    pub publisher: Option<String>,
    pub publish_year: Option<i32>,
    pub language: Option<String>,
    pub series: Option<String>,
    pub series_order: Option<f32>,
}

impl BookMetadata {
    /// Normalizes the metadata into a record:
    /// missing title, authors and genres get placeholders, genres are capped at five, a
    /// description is synthesized from title and authors if the source had none, and the cover
    /// falls back to the Open Library cover of the ISBN.
    #[must_use]
    #[allow(clippy::missing_inline_in_public_items, reason = "Called once per lookup")]
    pub fn into_record(
        self,
        isbn: &str,
        source: RecordSource,
        date_added: DateTime<Utc>,
    ) -> BookRecord {
        let title = self
            .title
            .map(|title| title.trim().to_owned())
            .filter(|title| !title.is_empty())
            .unwrap_or_else(|| UNKNOWN_TITLE.to_owned());

        let mut authors = clean_list(self.authors);
        if authors.is_empty() {
            authors.push(UNKNOWN_AUTHOR.to_owned());
        }

        let mut genres: Vec<String> = Vec::new();
        for genre in clean_list(self.genres) {
            if !genres.iter().any(|known| known.eq_ignore_ascii_case(&genre)) {
                genres.push(genre);
            }
        }
        genres.truncate(MAX_GENRES);
        if genres.is_empty() {
            genres.push(UNCATEGORIZED.to_owned());
        }

        let description = self
            .description
            .map(|description| description.trim().to_owned())
            .filter(|description| !description.is_empty())
            .unwrap_or_else(|| format!("{title} by {}", authors.join(", ")));

        let cover_url = self
            .cover_url
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| cover_url(isbn));

        let mut record = BookRecord::new(isbn.to_owned(), title, authors, date_added);
        record.genres = genres;
        record.description = description;
        record.cover_url = cover_url;
        record.page_count = self.page_count.unwrap_or(0);
        record.publisher = self.publisher;
        record.publish_year = self.publish_year;
        record.language = self.language;
        record.series = self.series;
        record.series_order = self.series_order;
        record.source = Some(source);
        record
    }
}

/// Extracts a trimmed, whitespace-collapsed string from a JSON value. Empty strings count as
/// missing.
pub(crate) fn to_string(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .map(|s| WHITESPACE_RUN.replace_all(s, " ").to_string())
        .filter(|s| !s.is_empty())
}

/// Reads a page count that may come as a number or a numeric string. Zero counts as missing.
pub(crate) fn to_page_count(value: &Value) -> Option<u32> {
    let count = match value {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64)),
        Value::String(text) => text.trim().parse::<u64>().ok(),
        _ => None,
    };
    count.and_then(|c| u32::try_from(c).ok()).filter(|c| *c > 0)
}

/// Finds the first four-digit year in free text such as "May 5, 2009".
pub(crate) fn extract_year(text: &str) -> Option<i32> {
    YEAR.captures(text)
        .and_then(|captures| captures.get(1))
        .and_then(|year| year.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap()
    }

    #[test]
    fn empty_metadata_gets_placeholders() {
        let record = BookMetadata::default().into_record("9780140449136", RecordSource::Primary, now());
        assert_eq!(record.title, UNKNOWN_TITLE);
        assert_eq!(record.authors, vec![UNKNOWN_AUTHOR.to_owned()]);
        assert_eq!(record.genres, vec![UNCATEGORIZED.to_owned()]);
        assert_eq!(record.description, "Unknown Title by Unknown Author");
        assert_eq!(
            record.cover_url,
            "https://covers.openlibrary.org/b/isbn/9780140449136-L.jpg"
        );
        assert_eq!(record.source, Some(RecordSource::Primary));
        assert_eq!(record.date_added, now());
    }

    #[test]
    fn genres_are_deduplicated_and_capped() {
        let metadata = BookMetadata {
            title: Some("The Odyssey".to_owned()),
            authors: vec!["Homer".to_owned(), "Robert Fagles".to_owned()],
            genres: ["Epic", "epic", "Poetry", "Greek", "Classics", "Mythology", "Travel"]
                .map(str::to_owned)
                .to_vec(),
            ..BookMetadata::default()
        };
        let record = metadata.into_record("9780140449136", RecordSource::Llm, now());
        assert_eq!(record.genres, vec!["Epic", "Poetry", "Greek", "Classics", "Mythology"]);
        assert_eq!(record.description, "The Odyssey by Homer, Robert Fagles");
    }

    #[test]
    fn string_helpers() {
        assert_eq!(to_string(&json!("  The   Odyssey ")), Some("The Odyssey".to_owned()));
        assert_eq!(to_string(&json!("   ")), None);
        assert_eq!(to_string(&json!(42)), None);
        assert_eq!(to_page_count(&json!(541)), Some(541));
        assert_eq!(to_page_count(&json!("541")), Some(541));
        assert_eq!(to_page_count(&json!(0)), None);
        assert_eq!(to_page_count(&json!(-3)), None);
        assert_eq!(extract_year("May 5, 2009"), Some(2009));
        assert_eq!(extract_year("unknown"), None);
    }
}
