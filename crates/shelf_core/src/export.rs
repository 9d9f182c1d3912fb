//! Export and import of a library as JSON or CSV.
use crate::library::types::BookRecord;
use chrono::{DateTime, SecondsFormat, Utc};
use core::str::FromStr;
use csv::{QuoteStyle, ReaderBuilder, Terminator, WriterBuilder};
use serde::Deserialize;
use std::path::Path;

/// Column order of the CSV export.
pub const CSV_HEADER: [&str; 8] = [
    "isbn",
    "title",
    "authors",
    "genre",
    "dateAdded",
    "description",
    "pageCount",
    "coverUrl",
];

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to write CSV: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV output is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("row {row}: {reason}")]
    InvalidRow { row: usize, reason: String },
    #[error("unknown format `{0}`, expected json or csv")]
    UnknownFormat(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    /// Guesses the format from a file extension.
    #[must_use]
    #[inline]
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|extension| extension.to_str())
            .and_then(|extension| extension.parse().ok())
    }

    #[must_use]
    #[inline]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    #[inline]
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            _ => Err(ExportError::UnknownFormat(value.to_owned())),
        }
    }
}

/// Serializes `books` in the given format.
/// # Errors
/// Fails if serialization fails.
#[inline]
pub fn export(books: &[BookRecord], format: ExportFormat) -> Result<String, ExportError> {
    match format {
        ExportFormat::Json => to_json(books),
        ExportFormat::Csv => to_csv(books),
    }
}

/// Parses records in the given format.
/// # Errors
/// Fails on malformed input.
#[inline]
pub fn import(input: &str, format: ExportFormat) -> Result<Vec<BookRecord>, ExportError> {
    match format {
        ExportFormat::Json => from_json(input),
        ExportFormat::Csv => from_csv(input),
    }
}

/// Pretty-printed JSON array of all records.
/// # Errors
/// Fails if serialization fails.
#[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
pub fn to_json(books: &[BookRecord]) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(books)?)
}

/// # Errors
/// Fails if `input` is not a JSON array of records.
#[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
pub fn from_json(input: &str) -> Result<Vec<BookRecord>, ExportError> {
    Ok(serde_json::from_str(input)?)
}

/// CSV with a plain header row. List fields are joined with commas; every non-numeric value is
/// quoted and embedded quotes are doubled.
/// # Errors
/// Fails if writing the CSV fails.
#[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
pub fn to_csv(books: &[BookRecord]) -> Result<String, ExportError> {
    let mut buffer = CSV_HEADER.join(",").into_bytes();
    buffer.push(b'\n');
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::NonNumeric)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(buffer);
    for book in books {
        let authors = book.authors.join(", ");
        let genres = book.genres.join(", ");
        let date_added = book.date_added.to_rfc3339_opts(SecondsFormat::Millis, true);
        let page_count = book.page_count.to_string();
        writer.write_record([
            book.isbn.as_str(),
            book.title.as_str(),
            authors.as_str(),
            genres.as_str(),
            date_added.as_str(),
            book.description.as_str(),
            page_count.as_str(),
            book.cover_url.as_str(),
        ])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|error| ExportError::Io(error.into_error()))?;
    Ok(String::from_utf8(bytes)?)
}

#[derive(Deserialize)]
struct CsvRow {
    isbn: String,
    title: String,
    #[serde(default)]
    authors: String,
    #[serde(default)]
    genre: String,
    #[serde(rename = "dateAdded")]
    date_added: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "pageCount", default)]
    page_count: String,
    #[serde(rename = "coverUrl", default)]
    cover_url: String,
}

/// Reads the CSV export back. Fields the CSV does not carry (status, rating, notes, ...) take
/// their defaults.
/// # Errors
/// Fails on malformed CSV, a missing ISBN, or an unparseable date or page count.
#[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
pub fn from_csv(input: &str) -> Result<Vec<BookRecord>, ExportError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Fields)
        .from_reader(input.as_bytes());
    let mut books = Vec::new();
    for (index, row) in reader.deserialize::<CsvRow>().enumerate() {
        let row = row?;
        let row_number = index + 1;
        let invalid = |reason: String| ExportError::InvalidRow {
            row: row_number,
            reason,
        };
        if row.isbn.is_empty() {
            return Err(invalid("missing isbn".to_owned()));
        }
        let date_added = DateTime::parse_from_rfc3339(&row.date_added)
            .map_err(|error| invalid(format!("bad dateAdded `{}`: {error}", row.date_added)))?
            .with_timezone(&Utc);
        let page_count = if row.page_count.is_empty() {
            0
        } else {
            row.page_count
                .parse()
                .map_err(|error| invalid(format!("bad pageCount `{}`: {error}", row.page_count)))?
        };

        let mut record = BookRecord::new(row.isbn, row.title, split_list(&row.authors), date_added);
        record.genres = split_list(&row.genre);
        record.description = row.description;
        record.page_count = page_count;
        record.cover_url = row.cover_url;
        books.push(record);
    }
    Ok(books)
}

fn split_list(joined: &str) -> Vec<String> {
    joined
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests are predefined and guaranteed to be Some/Ok"
)]
mod tests {
    use super::*;
    use crate::library::types::{Rating, ReadingStatus, RecordSource};
    use chrono::TimeZone as _;
    use pretty_assertions::assert_eq;

    fn sample_library() -> Vec<BookRecord> {
        let mut odyssey = BookRecord::new(
            "9780140449136".to_owned(),
            "The Odyssey".to_owned(),
            vec!["Homer".to_owned(), "Robert Fagles".to_owned()],
            Utc.with_ymd_and_hms(2024, 6, 1, 9, 15, 0).unwrap(),
        );
        odyssey.genres = vec!["Epic".to_owned(), "Classics".to_owned()];
        odyssey.description = "Sing to me of the man, \"Muse\", the man of twists and turns".to_owned();
        odyssey.cover_url = "https://covers.openlibrary.org/b/isbn/9780140449136-L.jpg".to_owned();
        odyssey.page_count = 541;
        odyssey.reading_status = ReadingStatus::Read;
        odyssey.rating = Some(Rating::new(5).unwrap());
        odyssey.notes = "Fagles translation".to_owned();
        odyssey.favorite = true;
        odyssey.publisher = Some("Penguin Classics".to_owned());
        odyssey.publish_year = Some(2006);
        odyssey.source = Some(RecordSource::Primary);

        let mut mistborn = BookRecord::new(
            "9780765350381".to_owned(),
            "Mistborn: The Final Empire".to_owned(),
            vec!["Brandon Sanderson".to_owned()],
            Utc.with_ymd_and_hms(2024, 7, 2, 20, 0, 0).unwrap(),
        );
        mistborn.genres = vec!["Fantasy".to_owned()];
        mistborn.series = Some("Mistborn".to_owned());
        mistborn.series_order = Some(1.0);
        mistborn.reading_status = ReadingStatus::Wishlist;
        mistborn.source = Some(RecordSource::Llm);

        vec![mistborn, odyssey]
    }

    #[test]
    fn json_round_trip() {
        let books = sample_library();
        let json = to_json(&books).unwrap();
        assert!(json.contains("\n  {"));
        assert_eq!(from_json(&json).unwrap(), books);
    }

    #[test]
    fn csv_has_expected_header_and_quoting() {
        let csv = to_csv(&sample_library()).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "isbn,title,authors,genre,dateAdded,description,pageCount,coverUrl"
        );
        let odyssey = csv.lines().find(|line| line.starts_with("9780140449136")).unwrap();
        assert!(odyssey.contains(r#""Homer, Robert Fagles""#));
        assert!(odyssey.contains(r#""Sing to me of the man, ""Muse"", the man of twists and turns""#));
        assert!(odyssey.contains(r#""2024-06-01T09:15:00.000Z""#));
        assert!(odyssey.contains(",541,"));
    }

    #[test]
    fn csv_import_restores_exported_columns() {
        let books = sample_library();
        let imported = from_csv(&to_csv(&books).unwrap()).unwrap();
        assert_eq!(imported.len(), 2);
        for (original, restored) in books.iter().zip(&imported) {
            assert_eq!(restored.isbn, original.isbn);
            assert_eq!(restored.title, original.title);
            assert_eq!(restored.authors, original.authors);
            assert_eq!(restored.genres, original.genres);
            assert_eq!(restored.date_added, original.date_added);
            assert_eq!(restored.description, original.description);
            assert_eq!(restored.page_count, original.page_count);
            assert_eq!(restored.cover_url, original.cover_url);
            assert_eq!(restored.reading_status, ReadingStatus::Unread);
        }
    }

    #[test]
    fn csv_import_reports_bad_rows() {
        let input = "isbn,title,authors,genre,dateAdded,description,pageCount,coverUrl\n\
                     9780140449136,The Odyssey,Homer,Epic,yesterday,,541,\n";
        let error = from_csv(input).unwrap_err();
        assert!(matches!(error, ExportError::InvalidRow { row: 1, .. }));
    }

    #[test]
    fn format_selection() {
        assert_eq!("JSON".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert_eq!(
            ExportFormat::from_path(Path::new("backup/library.csv")),
            Some(ExportFormat::Csv)
        );
        assert_eq!(ExportFormat::from_path(Path::new("library.txt")), None);
        assert!("xml".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn export_of_empty_library() {
        assert_eq!(export(&[], ExportFormat::Json).unwrap(), "[]");
        assert_eq!(import("[]", ExportFormat::Json).unwrap(), vec![]);
    }
}
