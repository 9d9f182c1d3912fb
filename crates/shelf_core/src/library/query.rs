//! Browsing: filters, sort orders and summary statistics over a library.
use crate::library::sorting::{get_name_sort, get_title_sort};
use crate::library::types::{BookRecord, Rating, ReadingStatus};
use core::cmp::Ordering;
use core::str::FromStr;
use std::collections::{BTreeMap, BTreeSet};

/// What to order a listing by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    /// Newest first.
    #[default]
    DateAdded,
    /// Alphabetical, ignoring leading articles.
    Title,
    /// Alphabetical by the first author's last name.
    Author,
    /// Highest rating first, unrated last.
    Rating,
    /// Longest first.
    PageCount,
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown sort key `{0}`, expected one of date-added, title, author, rating, pages")]
pub struct UnknownSortKey(pub String);

impl FromStr for SortKey {
    type Err = UnknownSortKey;

    #[inline]
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "date-added" | "date" | "added" => Ok(Self::DateAdded),
            "title" => Ok(Self::Title),
            "author" => Ok(Self::Author),
            "rating" => Ok(Self::Rating),
            "pages" | "page-count" => Ok(Self::PageCount),
            _ => Err(UnknownSortKey(value.to_owned())),
        }
    }
}

/// A filter plus sort order. The default matches every book, newest first.
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryQuery {
    pub status: Option<ReadingStatus>,
    /// Case-insensitive exact genre match.
    pub genre: Option<String>,
    /// Case-insensitive substring of any author.
    pub author: Option<String>,
    pub favorites_only: bool,
    pub min_rating: Option<Rating>,
    /// Case-insensitive substring of title, any author or the ISBN.
    pub text: Option<String>,
    pub sort: SortKey,
    pub reverse: bool,
}

impl LibraryQuery {
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `book` passes every filter of the query.
    #[must_use]
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub fn matches(&self, book: &BookRecord) -> bool {
        if self.status.is_some_and(|status| status != book.reading_status) {
            return false;
        }
        if self.favorites_only && !book.favorite {
            return false;
        }
        if let Some(min) = self.min_rating {
            if book.rating.is_none_or(|rating| rating < min) {
                return false;
            }
        }
        if let Some(genre) = &self.genre {
            if !book.genres.iter().any(|g| g.eq_ignore_ascii_case(genre.trim())) {
                return false;
            }
        }
        if let Some(author) = &self.author {
            let needle = author.to_lowercase();
            if !book.authors.iter().any(|a| a.to_lowercase().contains(&needle)) {
                return false;
            }
        }
        if let Some(text) = &self.text {
            let needle = text.to_lowercase();
            let hit = book.title.to_lowercase().contains(&needle)
                || book.isbn.contains(text.trim())
                || book.authors.iter().any(|a| a.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }
        true
    }

    /// The matching books in the requested order.
    #[must_use]
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub fn apply<'books, I>(&self, books: I) -> Vec<&'books BookRecord>
    where
        I: IntoIterator<Item = &'books BookRecord>,
    {
        let mut selected: Vec<&BookRecord> =
            books.into_iter().filter(|book| self.matches(book)).collect();
        let sort = self.sort;
        selected.sort_by(|left, right| compare(sort, left, right));
        if self.reverse {
            selected.reverse();
        }
        selected
    }
}

fn compare(sort: SortKey, left: &BookRecord, right: &BookRecord) -> Ordering {
    match sort {
        SortKey::DateAdded => right.date_added.cmp(&left.date_added),
        SortKey::Title => title_key(left).cmp(&title_key(right)),
        SortKey::Author => author_key(left)
            .cmp(&author_key(right))
            .then_with(|| title_key(left).cmp(&title_key(right))),
        SortKey::Rating => right
            .rating
            .cmp(&left.rating)
            .then_with(|| title_key(left).cmp(&title_key(right))),
        SortKey::PageCount => right.page_count.cmp(&left.page_count),
    }
}

fn title_key(book: &BookRecord) -> String {
    get_title_sort(&book.title).to_lowercase()
}

fn author_key(book: &BookRecord) -> String {
    book.authors
        .first()
        .map(|author| get_name_sort(author).to_lowercase())
        .unwrap_or_default()
}

/// Summary numbers for a library.
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LibraryStats {
    pub total: usize,
    pub by_status: BTreeMap<ReadingStatus, usize>,
    pub favorites: usize,
    pub rated: usize,
    pub average_rating: Option<f64>,
    /// Pages of all books marked as read.
    pub pages_read: u64,
    pub genres: BTreeSet<String>,
}

impl LibraryStats {
    #[must_use]
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    #[allow(
        clippy::cast_precision_loss,
        clippy::as_conversions,
        clippy::float_arithmetic,
        reason = "Counts of books stay far below 2^52"
    )]
    pub fn collect<'books, I>(books: I) -> Self
    where
        I: IntoIterator<Item = &'books BookRecord>,
    {
        let mut stats = Self::default();
        let mut rating_sum: u64 = 0;
        for book in books {
            stats.total += 1;
            *stats.by_status.entry(book.reading_status).or_insert(0) += 1;
            if book.favorite {
                stats.favorites += 1;
            }
            if let Some(rating) = book.rating {
                stats.rated += 1;
                rating_sum += u64::from(rating.get());
            }
            if book.reading_status == ReadingStatus::Read {
                stats.pages_read += u64::from(book.page_count);
            }
            stats.genres.extend(book.genres.iter().cloned());
        }
        if stats.rated > 0 {
            stats.average_rating = Some(rating_sum as f64 / stats.rated as f64);
        }
        stats
    }

    #[must_use]
    #[inline]
    pub fn count(&self, status: ReadingStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone as _, Utc};
    use pretty_assertions::assert_eq;

    fn library() -> Vec<BookRecord> {
        let mut hobbit = BookRecord::new(
            "9780547928227".to_owned(),
            "The Hobbit".to_owned(),
            vec!["J. R. R. Tolkien".to_owned()],
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        );
        hobbit.genres = vec!["Fantasy".to_owned()];
        hobbit.page_count = 300;
        hobbit.reading_status = ReadingStatus::Read;
        hobbit.rating = Some(Rating::new(5).unwrap());
        hobbit.favorite = true;

        let mut dune = BookRecord::new(
            "9780441172719".to_owned(),
            "Dune".to_owned(),
            vec!["Frank Herbert".to_owned()],
            Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
        );
        dune.genres = vec!["Science Fiction".to_owned()];
        dune.page_count = 600;
        dune.reading_status = ReadingStatus::Reading;
        dune.rating = Some(Rating::new(3).unwrap());

        let mut game = BookRecord::new(
            "9780553593716".to_owned(),
            "A Game of Thrones".to_owned(),
            vec!["George R. R. Martin".to_owned()],
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
        );
        game.genres = vec!["Fantasy".to_owned()];
        game.page_count = 800;
        game.reading_status = ReadingStatus::Read;

        vec![hobbit, dune, game]
    }

    fn titles(books: &[&BookRecord]) -> Vec<String> {
        books.iter().map(|book| book.title.clone()).collect()
    }

    #[test]
    fn default_query_lists_newest_first() {
        let books = library();
        let listed = LibraryQuery::new().apply(&books);
        assert_eq!(titles(&listed), vec!["A Game of Thrones", "Dune", "The Hobbit"]);
    }

    #[test]
    fn title_sort_ignores_articles() {
        let books = library();
        let mut query = LibraryQuery::new();
        query.sort = SortKey::Title;
        assert_eq!(titles(&query.apply(&books)), vec!["Dune", "A Game of Thrones", "The Hobbit"]);
        query.reverse = true;
        assert_eq!(titles(&query.apply(&books)), vec!["The Hobbit", "A Game of Thrones", "Dune"]);
    }

    #[test]
    fn author_sort_uses_last_name() {
        let books = library();
        let mut query = LibraryQuery::new();
        query.sort = SortKey::Author;
        assert_eq!(titles(&query.apply(&books)), vec!["Dune", "A Game of Thrones", "The Hobbit"]);
    }

    #[test]
    fn rating_sort_puts_unrated_last() {
        let books = library();
        let mut query = LibraryQuery::new();
        query.sort = SortKey::Rating;
        assert_eq!(titles(&query.apply(&books)), vec!["The Hobbit", "Dune", "A Game of Thrones"]);
    }

    #[test]
    fn filters_combine() {
        let books = library();
        let mut query = LibraryQuery::new();
        query.genre = Some("fantasy".to_owned());
        query.status = Some(ReadingStatus::Read);
        query.sort = SortKey::PageCount;
        assert_eq!(titles(&query.apply(&books)), vec!["A Game of Thrones", "The Hobbit"]);

        query.favorites_only = true;
        assert_eq!(titles(&query.apply(&books)), vec!["The Hobbit"]);
    }

    #[test]
    fn text_and_author_search() {
        let books = library();
        let mut query = LibraryQuery::new();
        query.text = Some("thrones".to_owned());
        assert_eq!(titles(&query.apply(&books)), vec!["A Game of Thrones"]);

        let mut query = LibraryQuery::new();
        query.text = Some("9780441".to_owned());
        assert_eq!(titles(&query.apply(&books)), vec!["Dune"]);

        let mut query = LibraryQuery::new();
        query.author = Some("tolkien".to_owned());
        assert_eq!(titles(&query.apply(&books)), vec!["The Hobbit"]);
    }

    #[test]
    fn min_rating_excludes_unrated() {
        let books = library();
        let mut query = LibraryQuery::new();
        query.min_rating = Some(Rating::new(3).unwrap());
        assert_eq!(titles(&query.apply(&books)), vec!["Dune", "The Hobbit"]);
    }

    #[test]
    fn sort_key_parsing() {
        assert_eq!("Title".parse::<SortKey>(), Ok(SortKey::Title));
        assert_eq!("pages".parse::<SortKey>(), Ok(SortKey::PageCount));
        assert!("colour".parse::<SortKey>().is_err());
    }

    #[test]
    fn stats_summarize_library() {
        let books = library();
        let stats = LibraryStats::collect(&books);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.count(ReadingStatus::Read), 2);
        assert_eq!(stats.count(ReadingStatus::Wishlist), 0);
        assert_eq!(stats.favorites, 1);
        assert_eq!(stats.rated, 2);
        assert_eq!(stats.average_rating, Some(4.0));
        assert_eq!(stats.pages_read, 1100);
        assert_eq!(stats.genres.len(), 2);
    }

    #[test]
    fn stats_of_empty_library() {
        let stats = LibraryStats::collect(&Vec::<BookRecord>::new());
        assert_eq!(stats.total, 0);
        assert_eq!(stats.average_rating, None);
    }
}
