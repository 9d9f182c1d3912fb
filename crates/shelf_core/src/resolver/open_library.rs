//! Primary metadata source: the free Open Library books API.
use crate::library::types::RecordSource;
use crate::resolver::MetadataProvider;
use crate::resolver::errors::ResolverError;
use crate::resolver::metadata::{BookMetadata, extract_year, to_page_count, to_string};
use async_trait::async_trait;
use log::debug;
use serde_json::Value;

pub const DEFAULT_BASE_URL: &str = "https://openlibrary.org";
const COVERS_BASE_URL: &str = "https://covers.openlibrary.org";

/// Large cover image of the book with the given ISBN. Open Library serves a placeholder for
/// unknown ISBNs, so the URL is always usable.
#[must_use]
#[inline]
pub fn cover_url(isbn: &str) -> String {
    format!("{COVERS_BASE_URL}/b/isbn/{isbn}-L.jpg")
}

pub struct OpenLibraryProvider {
    http_client: reqwest::Client,
    base_url: String,
}

impl OpenLibraryProvider {
    #[must_use]
    #[inline]
    pub fn new(http_client: reqwest::Client, base_url: &str) -> Self {
        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    fn books_url(&self, isbn: &str) -> String {
        format!(
            "{}/api/books?bibkeys=ISBN:{isbn}&format=json&jscmd=data",
            self.base_url
        )
    }
}

#[async_trait]
impl MetadataProvider for OpenLibraryProvider {
    #[inline]
    fn name(&self) -> &'static str {
        "open-library"
    }

    #[inline]
    fn source(&self) -> RecordSource {
        RecordSource::Primary
    }

    async fn attempt(&self, isbn: &str) -> Result<Option<BookMetadata>, ResolverError> {
        let url = self.books_url(isbn);
        debug!("Querying {url}");
        let response = self.http_client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ResolverError::Status(response.status().as_u16()));
        }
        let body: Value = response.json().await?;
        Ok(parse_books_response(&body, isbn))
    }
}

/// Extracts the metadata of `isbn` from a `jscmd=data` response. The response is an object keyed
/// by `ISBN:<isbn>`; a missing key means Open Library does not know the book.
#[must_use]
#[allow(clippy::missing_inline_in_public_items, reason = "Called once per lookup")]
pub fn parse_books_response(body: &Value, isbn: &str) -> Option<BookMetadata> {
    let entry = body.get(format!("ISBN:{isbn}"))?;
    if !entry.is_object() {
        return None;
    }

    let title = to_string(&entry["title"]);
    let authors = named_entries(&entry["authors"]);
    let genres = named_entries(&entry["subjects"]);
    let description = to_string(&entry["notes"]).or_else(|| to_string(&entry["notes"]["value"]));
    let page_count = to_page_count(&entry["number_of_pages"]);
    let publisher = named_entries(&entry["publishers"]).into_iter().next();
    let publish_year = entry["publish_date"].as_str().and_then(extract_year);

    Some(BookMetadata {
        title,
        authors,
        genres,
        description,
        cover_url: Some(cover_url(isbn)),
        page_count,
        publisher,
        publish_year,
        language: None,
        series: None,
        series_order: None,
    })
}

/// Reads `[{"name": ...}, ...]` lists, also tolerating plain strings.
fn named_entries(value: &Value) -> Vec<String> {
    let Some(entries) = value.as_array() else {
        return vec![];
    };
    entries
        .iter()
        .filter_map(|entry| to_string(&entry["name"]).or_else(|| to_string(entry)))
        .collect()
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests are predefined and guaranteed to be Some/Ok"
)]
mod tests {
    use super::*;
    use crate::resolver::client::build_http_client;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn odyssey_response() -> Value {
        json!({
            "ISBN:9780140449136": {
                "url": "https://openlibrary.org/books/OL7353617M/The_Odyssey",
                "title": "The  Odyssey",
                "authors": [
                    {"url": "https://openlibrary.org/authors/OL12345A/Homer", "name": "Homer"}
                ],
                "number_of_pages": 541,
                "publishers": [{"name": "Penguin Classics"}],
                "publish_date": "November 30, 2006",
                "subjects": [
                    {"name": "Epic poetry, Greek", "url": "https://openlibrary.org/subjects/epic"},
                    {"name": "Odysseus (Greek mythology)"},
                    {"name": "Translations into English"}
                ]
            }
        })
    }

    #[test]
    fn parses_known_book() {
        let metadata = parse_books_response(&odyssey_response(), "9780140449136").unwrap();
        assert_eq!(metadata.title.as_deref(), Some("The Odyssey"));
        assert_eq!(metadata.authors, vec!["Homer".to_owned()]);
        assert_eq!(metadata.genres.len(), 3);
        assert_eq!(metadata.page_count, Some(541));
        assert_eq!(metadata.publisher.as_deref(), Some("Penguin Classics"));
        assert_eq!(metadata.publish_year, Some(2006));
        assert_eq!(metadata.description, None);
        assert_eq!(
            metadata.cover_url.as_deref(),
            Some("https://covers.openlibrary.org/b/isbn/9780140449136-L.jpg")
        );
    }

    #[test]
    fn missing_key_is_not_found() {
        assert_eq!(parse_books_response(&json!({}), "9780140449136"), None);
        assert_eq!(
            parse_books_response(&odyssey_response(), "9780140275360"),
            None
        );
    }

    #[test]
    fn notes_object_becomes_description() {
        let body = json!({
            "ISBN:9780140449136": {
                "title": "The Odyssey",
                "notes": {"type": "/type/text", "value": "Translated by Robert Fagles."}
            }
        });
        let metadata = parse_books_response(&body, "9780140449136").unwrap();
        assert_eq!(metadata.description.as_deref(), Some("Translated by Robert Fagles."));
        assert!(metadata.authors.is_empty());
    }

    #[test]
    fn books_url_is_keyed_by_isbn() {
        let provider =
            OpenLibraryProvider::new(build_http_client().unwrap(), "https://openlibrary.org/");
        assert_eq!(
            provider.books_url("9780140449136"),
            "https://openlibrary.org/api/books?bibkeys=ISBN:9780140449136&format=json&jscmd=data"
        );
    }

    #[tokio::test]
    #[ignore = "queries the live Open Library API"]
    async fn fetch_live_metadata() {
        let provider = OpenLibraryProvider::new(build_http_client().unwrap(), DEFAULT_BASE_URL);
        let metadata = provider.attempt("9780140449136").await.unwrap().unwrap();
        assert!(metadata.title.is_some());
        assert!(!metadata.authors.is_empty());
    }
}
