use crate::library::types::{BookRecord, Rating, ReadingStatus};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A library shared between the scan session and whoever persists it.
pub type SharedLibrary = Arc<RwLock<LibraryStore>>;

/// In-memory collection of book records, newest first. Persistence is left to a
/// [`LibraryBackend`](crate::persistence::LibraryBackend).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LibraryStore {
    books: Vec<BookRecord>,
}

impl LibraryStore {
    #[must_use]
    #[inline]
    pub const fn new() -> Self {
        Self { books: Vec::new() }
    }

    /// Builds a store from records in display order. Later duplicates of an ISBN are dropped.
    #[must_use]
    #[allow(clippy::missing_inline_in_public_items, reason = "Called once per load")]
    pub fn from_records(records: Vec<BookRecord>) -> Self {
        let mut seen = HashSet::new();
        let books = records
            .into_iter()
            .filter(|record| seen.insert(record.isbn.clone()))
            .collect();
        Self { books }
    }

    /// Wraps the store for sharing with a scan session.
    #[must_use]
    #[inline]
    pub fn into_shared(self) -> SharedLibrary {
        Arc::new(RwLock::new(self))
    }

    /// Inserts `record` at the front. Returns `false` and leaves the store untouched if the ISBN
    /// is already present.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub fn add(&mut self, record: BookRecord) -> bool {
        if self.contains(&record.isbn) {
            log::debug!("Book {} already in library, skipping", record.isbn);
            return false;
        }
        self.books.insert(0, record);
        true
    }

    /// Replaces the record with the same ISBN, keeping its original `date_added`. Returns `false`
    /// if there is no such record.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub fn update(&mut self, mut record: BookRecord) -> bool {
        let Some(existing) = self.books.iter_mut().find(|book| book.isbn == record.isbn) else {
            return false;
        };
        record.date_added = existing.date_added;
        *existing = record;
        true
    }

    /// Applies `edit` to the record with the given ISBN. `isbn` and `date_added` are restored
    /// afterwards so an edit cannot break the store's invariants.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub fn modify<F>(&mut self, isbn: &str, edit: F) -> bool
    where
        F: FnOnce(&mut BookRecord),
    {
        let Some(existing) = self.books.iter_mut().find(|book| book.isbn == isbn) else {
            return false;
        };
        let date_added = existing.date_added;
        edit(existing);
        existing.isbn = isbn.to_owned();
        existing.date_added = date_added;
        true
    }

    #[inline]
    pub fn set_status(&mut self, isbn: &str, status: ReadingStatus) -> bool {
        self.modify(isbn, |book| book.reading_status = status)
    }

    #[inline]
    pub fn set_rating(&mut self, isbn: &str, rating: Option<Rating>) -> bool {
        self.modify(isbn, |book| book.rating = rating)
    }

    #[inline]
    pub fn set_notes(&mut self, isbn: &str, notes: &str) -> bool {
        self.modify(isbn, |book| notes.clone_into(&mut book.notes))
    }

    #[inline]
    pub fn set_favorite(&mut self, isbn: &str, favorite: bool) -> bool {
        self.modify(isbn, |book| book.favorite = favorite)
    }

    /// Flips the favorite flag and returns the new value, or `None` if the book is unknown.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub fn toggle_favorite(&mut self, isbn: &str) -> Option<bool> {
        let mut favorite = None;
        self.modify(isbn, |book| {
            book.favorite = !book.favorite;
            favorite = Some(book.favorite);
        });
        favorite
    }

    /// Removes the record with the given ISBN. Returns whether something was removed.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub fn delete(&mut self, isbn: &str) -> bool {
        let before = self.books.len();
        self.books.retain(|book| book.isbn != isbn);
        self.books.len() != before
    }

    #[inline]
    pub fn clear(&mut self) {
        self.books.clear();
    }

    #[must_use]
    #[inline]
    pub fn get(&self, isbn: &str) -> Option<&BookRecord> {
        self.books.iter().find(|book| book.isbn == isbn)
    }

    #[must_use]
    #[inline]
    pub fn contains(&self, isbn: &str) -> bool {
        self.get(isbn).is_some()
    }

    /// The ISBNs currently in the library.
    #[must_use]
    #[inline]
    pub fn isbns(&self) -> HashSet<&str> {
        self.books.iter().map(|book| book.isbn.as_str()).collect()
    }

    #[must_use]
    #[inline]
    pub const fn len(&self) -> usize {
        self.books.len()
    }

    #[must_use]
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> core::slice::Iter<'_, BookRecord> {
        self.books.iter()
    }

    /// All records, newest first.
    #[must_use]
    #[inline]
    pub fn records(&self) -> &[BookRecord] {
        &self.books
    }
}

impl<'store> IntoIterator for &'store LibraryStore {
    type Item = &'store BookRecord;
    type IntoIter = core::slice::Iter<'store, BookRecord>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone as _, Utc};
    use pretty_assertions::assert_eq;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, 12, 0, 0).unwrap()
    }

    fn book(isbn: &str, title: &str, day: u32) -> BookRecord {
        BookRecord::new(isbn.to_owned(), title.to_owned(), vec!["Homer".to_owned()], at(day))
    }

    #[test]
    fn add_twice_keeps_one_record() {
        let mut store = LibraryStore::new();
        let record = book("9780140449136", "The Odyssey", 1);
        assert!(store.add(record.clone()));
        assert!(!store.add(record));
        assert_eq!(store.len(), 1);
        assert_eq!(store.iter().filter(|b| b.isbn == "9780140449136").count(), 1);
    }

    #[test]
    fn add_orders_newest_first() {
        let mut store = LibraryStore::new();
        store.add(book("9780140449136", "The Odyssey", 1));
        store.add(book("9780140275360", "The Iliad", 2));
        let titles: Vec<&str> = store.iter().map(|b| b.title.as_str()).collect();
        assert_eq!(titles, vec!["The Iliad", "The Odyssey"]);
    }

    #[test]
    fn update_replaces_but_keeps_date_added() {
        let mut store = LibraryStore::new();
        store.add(book("9780140449136", "The Odyssey", 1));

        let mut changed = book("9780140449136", "The Odyssey (Fagles)", 20);
        changed.notes = "Great translation".to_owned();
        assert!(store.update(changed));

        let stored = store.get("9780140449136").unwrap();
        assert_eq!(stored.title, "The Odyssey (Fagles)");
        assert_eq!(stored.notes, "Great translation");
        assert_eq!(stored.date_added, at(1));
    }

    #[test]
    fn update_of_missing_record_is_noop() {
        let mut store = LibraryStore::new();
        store.add(book("9780140449136", "The Odyssey", 1));
        let before = store.clone();
        assert!(!store.update(book("9780140275360", "The Iliad", 2)));
        assert_eq!(store, before);
    }

    #[test]
    fn edits_touch_only_their_field() {
        let mut store = LibraryStore::new();
        store.add(book("9780140449136", "The Odyssey", 1));

        assert!(store.set_status("9780140449136", ReadingStatus::Read));
        assert!(store.set_rating("9780140449136", Some(Rating::new(5).unwrap())));
        assert!(store.set_notes("9780140449136", "Reread in winter"));
        assert_eq!(store.toggle_favorite("9780140449136"), Some(true));
        assert_eq!(store.toggle_favorite("missing"), None);
        assert!(!store.set_status("missing", ReadingStatus::Read));

        let stored = store.get("9780140449136").unwrap();
        assert_eq!(stored.reading_status, ReadingStatus::Read);
        assert_eq!(stored.rating.map(Rating::get), Some(5));
        assert_eq!(stored.notes, "Reread in winter");
        assert!(stored.favorite);
        assert_eq!(stored.date_added, at(1));
    }

    #[test]
    fn modify_cannot_change_identity() {
        let mut store = LibraryStore::new();
        store.add(book("9780140449136", "The Odyssey", 1));
        store.modify("9780140449136", |record| {
            record.isbn = "other".to_owned();
            record.date_added = at(9);
        });
        assert!(store.contains("9780140449136"));
        assert_eq!(store.get("9780140449136").unwrap().date_added, at(1));
    }

    #[test]
    fn delete_and_clear() {
        let mut store = LibraryStore::new();
        store.add(book("9780140449136", "The Odyssey", 1));
        store.add(book("9780140275360", "The Iliad", 2));

        assert!(store.delete("9780140449136"));
        assert!(!store.delete("9780140449136"));
        assert_eq!(store.len(), 1);

        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn from_records_drops_duplicates() {
        let store = LibraryStore::from_records(vec![
            book("9780140449136", "The Odyssey", 2),
            book("9780140449136", "Duplicate", 1),
            book("9780140275360", "The Iliad", 1),
        ]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("9780140449136").unwrap().title, "The Odyssey");
        assert!(store.isbns().contains("9780140275360"));
    }
}
