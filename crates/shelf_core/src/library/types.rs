use chrono::{DateTime, Utc};
use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

/// Title used when no source knows the title of a book.
pub const UNKNOWN_TITLE: &str = "Unknown Title";
/// Author used when no source lists any author.
pub const UNKNOWN_AUTHOR: &str = "Unknown Author";
/// Genre used when no source lists any subject.
pub const UNCATEGORIZED: &str = "Uncategorized";
/// Upper bound on the number of genres kept per book.
pub const MAX_GENRES: usize = 5;
/// Prefix of the identifiers given to manually entered books without an ISBN.
pub const MANUAL_ISBN_PREFIX: &str = "manual-";

/// Where a user is with a book.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ReadingStatus {
    #[default]
    Unread,
    Reading,
    Read,
    Wishlist,
}

impl ReadingStatus {
    /// Every status, in display order.
    pub const ALL: [Self; 4] = [Self::Unread, Self::Reading, Self::Read, Self::Wishlist];

    #[must_use]
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unread => "unread",
            Self::Reading => "reading",
            Self::Read => "read",
            Self::Wishlist => "wishlist",
        }
    }
}

impl fmt::Display for ReadingStatus {
    #[inline]
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown reading status `{0}`, expected one of unread, reading, read, wishlist")]
pub struct UnknownStatus(pub String);

impl FromStr for ReadingStatus {
    type Err = UnknownStatus;

    #[inline]
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| UnknownStatus(value.to_owned()))
    }
}

/// A star rating. Only values from 1 to 5 can be constructed or deserialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Rating(u8);

#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("rating must be between 1 and 5, got {0}")]
pub struct InvalidRating(pub u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    /// # Errors
    /// Fails if `value` lies outside of `1..=5`.
    #[inline]
    pub const fn new(value: u8) -> Result<Self, InvalidRating> {
        if value >= Self::MIN && value <= Self::MAX {
            Ok(Self(value))
        } else {
            Err(InvalidRating(value))
        }
    }

    #[must_use]
    #[inline]
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Rating {
    type Error = InvalidRating;

    #[inline]
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Rating> for u8 {
    #[inline]
    fn from(rating: Rating) -> Self {
        rating.0
    }
}

impl fmt::Display for Rating {
    #[inline]
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}/{}", self.0, Self::MAX)
    }
}

/// Which path produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordSource {
    /// The free bibliographic source (Open Library).
    Primary,
    /// The generative text model fallback.
    Llm,
    /// Typed in by the user.
    Manual,
}

impl RecordSource {
    #[must_use]
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Llm => "llm",
            Self::Manual => "manual",
        }
    }
}

impl FromStr for RecordSource {
    type Err = String;

    #[inline]
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "primary" => Ok(Self::Primary),
            "llm" => Ok(Self::Llm),
            "manual" => Ok(Self::Manual),
            other => Err(format!("unknown record source `{other}`")),
        }
    }
}

/// One book in a library. `isbn` is the key within a library.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookRecord {
    pub isbn: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default, alias = "genre")]
    pub genres: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub cover_url: String,
    #[serde(default)]
    pub page_count: u32,
    /// Set once when the record is created, never changed afterwards.
    pub date_added: DateTime<Utc>,
    #[serde(default)]
    pub reading_status: ReadingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<Rating>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,
    /// Position within `series`, fractional for novellas such as "1.5".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_order: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<RecordSource>,
}

impl BookRecord {
    /// A record with the given identity and every other field at its default.
    #[must_use]
    #[inline]
    pub const fn new(
        isbn: String,
        title: String,
        authors: Vec<String>,
        date_added: DateTime<Utc>,
    ) -> Self {
        Self {
            isbn,
            title,
            authors,
            genres: Vec::new(),
            description: String::new(),
            cover_url: String::new(),
            page_count: 0,
            date_added,
            reading_status: ReadingStatus::Unread,
            rating: None,
            notes: String::new(),
            favorite: false,
            publisher: None,
            publish_year: None,
            language: None,
            series: None,
            series_order: None,
            source: None,
        }
    }

    /// Whether the record was given a synthetic identifier instead of a real ISBN.
    #[must_use]
    #[inline]
    pub fn is_manual_isbn(&self) -> bool {
        self.isbn.starts_with(MANUAL_ISBN_PREFIX)
    }

    /// Authors joined for display, e.g. "Terry Pratchett, Neil Gaiman".
    #[must_use]
    #[inline]
    pub fn authors_display(&self) -> String {
        self.authors.join(", ")
    }
}

/// Fields a user types in when adding a book by hand. Bypasses the resolver.
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManualEntry {
    pub isbn: Option<String>,
    pub title: String,
    pub authors: Vec<String>,
    pub genres: Vec<String>,
    pub description: String,
    pub cover_url: String,
    pub page_count: u32,
    pub reading_status: ReadingStatus,
    pub publisher: Option<String>,
    pub publish_year: Option<i32>,
    pub language: Option<String>,
    pub series: Option<String>,
    pub series_order: Option<f32>,
}

impl ManualEntry {
    #[must_use]
    #[inline]
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_owned(),
            ..Self::default()
        }
    }

    /// Turns the entry into a record added at `now`. Without an ISBN the record gets a synthetic
    /// identifier derived from the timestamp.
    #[must_use]
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub fn into_record(self, now: DateTime<Utc>) -> BookRecord {
        let isbn = self
            .isbn
            .map(|isbn| isbn.trim().to_owned())
            .filter(|isbn| !isbn.is_empty())
            .unwrap_or_else(|| format!("{MANUAL_ISBN_PREFIX}{}", now.timestamp_millis()));
        let title = match self.title.trim() {
            "" => UNKNOWN_TITLE.to_owned(),
            title => title.to_owned(),
        };
        let authors = clean_list(self.authors);

        let mut record = BookRecord::new(isbn, title, authors, now);
        record.genres = clean_list(self.genres);
        record.description = self.description;
        record.cover_url = self.cover_url;
        record.page_count = self.page_count;
        record.reading_status = self.reading_status;
        record.publisher = self.publisher;
        record.publish_year = self.publish_year;
        record.language = self.language;
        record.series = self.series;
        record.series_order = self.series_order;
        record.source = Some(RecordSource::Manual);
        record
    }
}

/// Trims every entry and drops the empty ones.
pub(crate) fn clean_list(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;
    use pretty_assertions::assert_eq;

    fn added_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 18, 30, 0).unwrap()
    }

    #[test]
    fn rating_bounds() {
        assert!(Rating::new(0).is_err());
        assert_eq!(Rating::new(1).unwrap().get(), 1);
        assert_eq!(Rating::new(5).unwrap().get(), 5);
        assert_eq!(Rating::new(6), Err(InvalidRating(6)));
    }

    #[test]
    fn rating_rejected_on_deserialize() {
        let json = r#"{"isbn":"9780140449136","title":"The Odyssey","dateAdded":"2024-03-09T18:30:00Z","rating":7}"#;
        assert!(serde_json::from_str::<BookRecord>(json).is_err());
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("Reading".parse::<ReadingStatus>(), Ok(ReadingStatus::Reading));
        assert_eq!(" wishlist ".parse::<ReadingStatus>(), Ok(ReadingStatus::Wishlist));
        assert!("finished".parse::<ReadingStatus>().is_err());
    }

    #[test]
    fn record_serializes_with_camel_case_keys() {
        let mut record = BookRecord::new(
            "9780140449136".to_owned(),
            "The Odyssey".to_owned(),
            vec!["Homer".to_owned()],
            added_at(),
        );
        record.cover_url = "https://covers.openlibrary.org/b/isbn/9780140449136-L.jpg".to_owned();
        record.rating = Some(Rating::new(4).unwrap());
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["coverUrl"], record.cover_url.as_str());
        assert_eq!(value["dateAdded"], "2024-03-09T18:30:00Z");
        assert_eq!(value["readingStatus"], "unread");
        assert_eq!(value["rating"], 4);
        assert!(value.get("series").is_none());
    }

    #[test]
    fn record_accepts_minimal_json_and_genre_alias() {
        let json = r#"{"isbn":"9780140449136","title":"The Odyssey","genre":["Epic"],"dateAdded":"2024-03-09T18:30:00Z"}"#;
        let record: BookRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.genres, vec!["Epic".to_owned()]);
        assert_eq!(record.reading_status, ReadingStatus::Unread);
        assert!(!record.favorite);
        assert_eq!(record.rating, None);
    }

    #[test]
    fn manual_entry_without_isbn_gets_synthetic_id() {
        let mut entry = ManualEntry::new("  Notes from the Attic ");
        entry.authors = vec!["  Jane Doe ".to_owned(), String::new()];
        let record = entry.into_record(added_at());

        assert_eq!(record.isbn, format!("manual-{}", added_at().timestamp_millis()));
        assert!(record.is_manual_isbn());
        assert_eq!(record.title, "Notes from the Attic");
        assert_eq!(record.authors, vec!["Jane Doe".to_owned()]);
        assert_eq!(record.source, Some(RecordSource::Manual));
        assert_eq!(record.date_added, added_at());
    }

    #[test]
    fn manual_entry_keeps_given_isbn() {
        let mut entry = ManualEntry::new("");
        entry.isbn = Some("9780140449136".to_owned());
        let record = entry.into_record(added_at());
        assert_eq!(record.isbn, "9780140449136");
        assert_eq!(record.title, UNKNOWN_TITLE);
    }
}
