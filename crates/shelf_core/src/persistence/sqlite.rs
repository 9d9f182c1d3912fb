use crate::library::types::{BookRecord, Rating, ReadingStatus, RecordSource};
use crate::persistence::{LibraryBackend, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core::str::FromStr as _;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::path::Path;

/// Local backend keeping libraries in a SQLite database.
pub struct SqliteBackend {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct BookRow {
    isbn: String,
    title: String,
    #[sqlx(json)]
    authors: Vec<String>,
    #[sqlx(json)]
    genres: Vec<String>,
    description: String,
    cover_url: String,
    page_count: i64,
    date_added: DateTime<Utc>,
    reading_status: String,
    rating: Option<i64>,
    notes: String,
    favorite: bool,
    publisher: Option<String>,
    publish_year: Option<i64>,
    language: Option<String>,
    series: Option<String>,
    series_order: Option<f64>,
    source: Option<String>,
}

impl TryFrom<BookRow> for BookRecord {
    type Error = StoreError;

    #[allow(
        clippy::as_conversions,
        clippy::cast_possible_truncation,
        reason = "Series positions are small numbers stored from an f32"
    )]
    fn try_from(row: BookRow) -> Result<Self, Self::Error> {
        let corrupt = |reason: String| StoreError::Corrupt {
            isbn: row.isbn.clone(),
            reason,
        };
        let reading_status = ReadingStatus::from_str(&row.reading_status)
            .map_err(|error| corrupt(error.to_string()))?;
        let rating = row
            .rating
            .map(|value| {
                u8::try_from(value)
                    .ok()
                    .and_then(|value| Rating::new(value).ok())
                    .ok_or_else(|| corrupt(format!("rating {value} out of range")))
            })
            .transpose()?;
        let page_count = u32::try_from(row.page_count)
            .map_err(|_error| corrupt(format!("page count {} out of range", row.page_count)))?;
        let publish_year = row
            .publish_year
            .map(|year| {
                i32::try_from(year).map_err(|_error| corrupt(format!("year {year} out of range")))
            })
            .transpose()?;
        let source = row
            .source
            .as_deref()
            .map(RecordSource::from_str)
            .transpose()
            .map_err(corrupt)?;

        let mut record = Self::new(row.isbn, row.title, row.authors, row.date_added);
        record.genres = row.genres;
        record.description = row.description;
        record.cover_url = row.cover_url;
        record.page_count = page_count;
        record.reading_status = reading_status;
        record.rating = rating;
        record.notes = row.notes;
        record.favorite = row.favorite;
        record.publisher = row.publisher;
        record.publish_year = publish_year;
        record.language = row.language;
        record.series = row.series;
        record.series_order = row.series_order.map(|order| order as f32);
        record.source = source;
        Ok(record)
    }
}

impl SqliteBackend {
    /// Opens (and creates if necessary) the database at `path` and brings its schema up to date.
    /// # Errors
    /// Fails if the database cannot be opened or migrated.
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called once at start of program"
    )]
    pub async fn init(path: &Path) -> Result<Self, StoreError> {
        log::info!("Opening SQLite library at {}", path.display());
        let options = SqliteConnectOptions::new()
            .foreign_keys(true)
            .create_if_missing(true)
            .filename(path);
        let pool = SqlitePool::connect_with(options).await?;
        sqlx::migrate!().run(&pool).await?;

        Ok(Self { pool })
    }

    /// A private database that lives as long as the backend. Uses a single connection, since
    /// every connection to `:memory:` would see its own database.
    /// # Errors
    /// Fails if the database cannot be created or migrated.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new().in_memory(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        sqlx::migrate!().run(&pool).await?;

        Ok(Self { pool })
    }

    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called once at end of program"
    )]
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl LibraryBackend for SqliteBackend {
    async fn get(&self, key: &str) -> Result<Vec<BookRecord>, StoreError> {
        let rows: Vec<BookRow> = sqlx::query_as(
            "SELECT
                isbn,
                title,
                authors,
                genres,
                description,
                cover_url,
                page_count,
                date_added,
                reading_status,
                rating,
                notes,
                favorite,
                publisher,
                publish_year,
                language,
                series,
                series_order,
                source
            FROM
                books
            WHERE
                library = ?
            ORDER BY
                position ASC;
        ",
        )
        .bind(key)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(BookRecord::try_from).collect()
    }

    async fn set(&self, key: &str, books: &[BookRecord]) -> Result<(), StoreError> {
        let mut tx: Transaction<'_, Sqlite> = self.pool.begin().await?;

        sqlx::query("DELETE FROM books WHERE library = ?")
            .bind(key)
            .execute(&mut *tx)
            .await?;

        for (position, book) in books.iter().enumerate() {
            let position = i64::try_from(position).unwrap_or(i64::MAX);
            let authors = serde_json::to_string(&book.authors)?;
            let genres = serde_json::to_string(&book.genres)?;
            // A repeated ISBN keeps its first (newest) occurrence
            sqlx::query(
                r#"
                INSERT INTO books (
                    library, position, isbn, title, authors, genres, description, cover_url,
                    page_count, date_added, reading_status, rating, notes, favorite, publisher,
                    publish_year, language, series, series_order, source
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(library, isbn) DO NOTHING;
            "#,
            )
            .bind(key)
            .bind(position)
            .bind(&book.isbn)
            .bind(&book.title)
            .bind(authors)
            .bind(genres)
            .bind(&book.description)
            .bind(&book.cover_url)
            .bind(i64::from(book.page_count))
            .bind(book.date_added)
            .bind(book.reading_status.as_str())
            .bind(book.rating.map(|rating| i64::from(rating.get())))
            .bind(&book.notes)
            .bind(book.favorite)
            .bind(&book.publisher)
            .bind(book.publish_year)
            .bind(&book.language)
            .bind(&book.series)
            .bind(book.series_order.map(f64::from))
            .bind(book.source.map(RecordSource::as_str))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        log::debug!("Stored {} books under {key}", books.len());
        Ok(())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests are predefined and guaranteed to be Some/Ok"
)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;
    use pretty_assertions::assert_eq;

    fn sample() -> Vec<BookRecord> {
        let mut dune = BookRecord::new(
            "9780441172719".to_owned(),
            "Dune".to_owned(),
            vec!["Frank Herbert".to_owned()],
            Utc.with_ymd_and_hms(2024, 2, 1, 8, 0, 0).unwrap(),
        );
        dune.genres = vec!["Science Fiction".to_owned(), "Classics".to_owned()];
        dune.page_count = 617;
        dune.reading_status = ReadingStatus::Reading;
        dune.rating = Some(Rating::new(4).unwrap());
        dune.favorite = true;
        dune.series = Some("Dune".to_owned());
        dune.series_order = Some(1.0);
        dune.publish_year = Some(1965);
        dune.source = Some(RecordSource::Primary);

        let hobbit = BookRecord::new(
            "9780547928227".to_owned(),
            "The Hobbit".to_owned(),
            vec!["J. R. R. Tolkien".to_owned()],
            Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap(),
        );
        vec![dune, hobbit]
    }

    #[tokio::test]
    async fn set_then_get_preserves_records_and_order() {
        let backend = SqliteBackend::in_memory().await.unwrap();
        let books = sample();
        backend.set("books", &books).await.unwrap();
        assert_eq!(backend.get("books").await.unwrap(), books);
    }

    #[tokio::test]
    async fn set_replaces_and_is_idempotent() {
        let backend = SqliteBackend::in_memory().await.unwrap();
        let books = sample();
        backend.set("books", &books).await.unwrap();
        backend.set("books", &books).await.unwrap();
        assert_eq!(backend.get("books").await.unwrap().len(), 2);

        backend.set("books", &books[1..]).await.unwrap();
        assert_eq!(backend.get("books").await.unwrap(), books[1..].to_vec());
    }

    #[tokio::test]
    async fn libraries_are_separated_by_key() {
        let backend = SqliteBackend::in_memory().await.unwrap();
        backend.set("alice", &sample()).await.unwrap();
        assert!(backend.get("bob").await.unwrap().is_empty());
        assert_eq!(backend.get("alice").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn persists_to_file() {
        let dir = std::env::temp_dir().join(format!("shelf-sqlite-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("library.db");
        let backend = SqliteBackend::init(&path).await.unwrap();
        backend.set("books", &sample()).await.unwrap();
        backend.close().await;

        let reopened = SqliteBackend::init(&path).await.unwrap();
        assert_eq!(reopened.get("books").await.unwrap(), sample());
        reopened.close().await;
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
