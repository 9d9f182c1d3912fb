//! Batch scanning
//!
//! A barcode reader keeps reporting the same code for as long as the book stays in view. The
//! [`ScanSession`] sits between the reader and the resolver: it drops invalid and owned codes,
//! allows a single lookup at a time and keeps a code quiet for a short cooldown after handling it.
use crate::isbn::is_valid;
use crate::library::store::SharedLibrary;
use crate::library::types::BookRecord;
use crate::resolver::Resolver;
use chrono::Utc;
use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use log::{debug, info};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// How long a handled code stays quiet.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(1500);

/// What happened to one decoded string.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    /// The book was resolved and added to the library.
    Added(Box<BookRecord>),
    /// No source knows the book.
    NotFound { isbn: String },
    /// The book is already in the library. Reported once per cooldown.
    AlreadyInLibrary { isbn: String },
    /// The code was handled a moment ago and is still cooling down.
    Suppressed { isbn: String },
    /// Another lookup is in flight; the code was dropped, not queued.
    Busy,
    /// Not a valid ISBN-13.
    Invalid,
    /// The session was stopped while this lookup was in flight; its result was thrown away.
    Discarded { isbn: String },
    /// The session is no longer accepting codes.
    Stopped,
}

/// Why a code is cooling down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CooldownReason {
    /// A lookup for the code finished, whatever its result.
    Completed,
    /// The code was reported as already owned.
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cooldown {
    until: Instant,
    reason: CooldownReason,
}

#[derive(Debug, Default)]
struct ScanState {
    /// The code whose lookup is running, if any.
    in_flight: Option<String>,
    /// Codes that were handled recently, each with its own deadline.
    cooling: HashMap<String, Cooldown>,
}

impl ScanState {
    fn start_cooldown(&mut self, isbn: &str, until: Instant, reason: CooldownReason) {
        self.cooling.insert(isbn.to_owned(), Cooldown { until, reason });
    }
}

/// One continuous scanning session. Decode events may arrive concurrently; the session lets at
/// most one of them reach the resolver at a time.
pub struct ScanSession {
    resolver: Arc<Resolver>,
    library: SharedLibrary,
    cooldown: Duration,
    state: Mutex<ScanState>,
    active: AtomicBool,
}

impl ScanSession {
    #[must_use]
    #[inline]
    pub fn new(resolver: Arc<Resolver>, library: SharedLibrary) -> Self {
        Self::with_cooldown(resolver, library, DEFAULT_COOLDOWN)
    }

    #[must_use]
    #[inline]
    pub fn with_cooldown(
        resolver: Arc<Resolver>,
        library: SharedLibrary,
        cooldown: Duration,
    ) -> Self {
        Self {
            resolver,
            library,
            cooldown,
            state: Mutex::new(ScanState::default()),
            active: AtomicBool::new(true),
        }
    }

    /// Handles one decoded string from the reader.
    #[allow(clippy::missing_inline_in_public_items, reason = "Large function")]
    pub async fn on_decode(&self, raw: &str) -> ScanOutcome {
        if !self.is_active() {
            return ScanOutcome::Stopped;
        }
        let isbn = raw.trim();
        if !is_valid(isbn) {
            debug!("Ignoring invalid code {isbn:?}");
            return ScanOutcome::Invalid;
        }

        {
            let mut state = self.state.lock().await;
            let now = Instant::now();
            state.cooling.retain(|_, cooldown| cooldown.until > now);
            if state.in_flight.is_some() {
                debug!("Lookup in flight, dropping {isbn}");
                return ScanOutcome::Busy;
            }
            let cooling = state.cooling.get(isbn).map(|cooldown| cooldown.reason);

            if self.library.read().await.contains(isbn) {
                if cooling == Some(CooldownReason::Duplicate) {
                    return ScanOutcome::Suppressed { isbn: isbn.to_owned() };
                }
                info!("{isbn} is already in the library");
                state.start_cooldown(isbn, now + self.cooldown, CooldownReason::Duplicate);
                return ScanOutcome::AlreadyInLibrary { isbn: isbn.to_owned() };
            }
            if cooling.is_some() {
                return ScanOutcome::Suppressed { isbn: isbn.to_owned() };
            }
            state.in_flight = Some(isbn.to_owned());
        }

        let scanned_at = Utc::now();
        info!("Looking up scanned ISBN {isbn}");
        let resolved = self.resolver.resolve(isbn).await;

        let outcome = if !self.is_active() {
            info!("Session stopped during lookup of {isbn}, discarding result");
            ScanOutcome::Discarded { isbn: isbn.to_owned() }
        } else if let Some(mut record) = resolved {
            record.date_added = scanned_at;
            if self.library.write().await.add(record.clone()) {
                ScanOutcome::Added(Box::new(record))
            } else {
                ScanOutcome::AlreadyInLibrary { isbn: isbn.to_owned() }
            }
        } else {
            ScanOutcome::NotFound { isbn: isbn.to_owned() }
        };

        let mut state = self.state.lock().await;
        state.in_flight = None;
        state.start_cooldown(isbn, Instant::now() + self.cooldown, CooldownReason::Completed);
        outcome
    }

    /// Whether a lookup is in flight right now.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn is_processing(&self) -> bool {
        self.state.lock().await.in_flight.is_some()
    }

    #[must_use]
    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Ends the session. A lookup still in flight finishes, but its result is discarded.
    #[inline]
    pub fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    #[must_use]
    #[inline]
    pub const fn cooldown(&self) -> Duration {
        self.cooldown
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests are predefined and guaranteed to be Some/Ok"
)]
mod tests {
    use super::*;
    use crate::library::store::LibraryStore;
    use crate::library::types::RecordSource;
    use crate::resolver::MetadataProvider;
    use crate::resolver::errors::ResolverError;
    use crate::resolver::metadata::BookMetadata;
    use crate::resolver::tests::ScriptedProvider;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    const ODYSSEY: &str = "9780140449136";
    const ILIAD: &str = "9780140275360";

    /// Provider that holds every lookup until the test releases it.
    struct GatedProvider {
        gate: Arc<Notify>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl MetadataProvider for GatedProvider {
        fn name(&self) -> &'static str {
            "gated"
        }

        fn source(&self) -> RecordSource {
            RecordSource::Primary
        }

        async fn attempt(&self, _isbn: &str) -> Result<Option<BookMetadata>, ResolverError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            Ok(Some(BookMetadata {
                title: Some("The Odyssey".to_owned()),
                ..BookMetadata::default()
            }))
        }
    }

    fn session_with(provider: ScriptedProvider) -> (Arc<ScanSession>, Arc<AtomicUsize>, SharedLibrary) {
        let calls = Arc::clone(&provider.calls);
        let library = LibraryStore::new().into_shared();
        let resolver = Arc::new(Resolver::default().with_provider(provider));
        let session = Arc::new(ScanSession::new(resolver, Arc::clone(&library)));
        (session, calls, library)
    }

    fn gated_session() -> (Arc<ScanSession>, Arc<Notify>, Arc<AtomicUsize>, SharedLibrary) {
        let gate = Arc::new(Notify::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = GatedProvider {
            gate: Arc::clone(&gate),
            calls: Arc::clone(&calls),
        };
        let library = LibraryStore::new().into_shared();
        let resolver = Arc::new(Resolver::default().with_provider(provider));
        let session = Arc::new(ScanSession::new(resolver, Arc::clone(&library)));
        (session, gate, calls, library)
    }

    async fn wait_until_processing(session: &ScanSession) {
        while !session.is_processing().await {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn invalid_codes_are_ignored() {
        let (session, calls, library) =
            session_with(ScriptedProvider::knowing("The Odyssey", RecordSource::Primary));
        assert_eq!(session.on_decode("9780140449137").await, ScanOutcome::Invalid);
        assert_eq!(session.on_decode("hello").await, ScanOutcome::Invalid);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(library.read().await.is_empty());
    }

    #[tokio::test]
    async fn scanned_book_is_added_then_reported_as_owned() {
        let (session, calls, library) =
            session_with(ScriptedProvider::knowing("The Odyssey", RecordSource::Primary));

        let before = Utc::now();
        let outcome = session.on_decode(ODYSSEY).await;
        let after = Utc::now();
        let record = match outcome {
            ScanOutcome::Added(record) => record,
            other => panic!("expected the book to be added, got {other:?}"),
        };
        assert_eq!(record.isbn, ODYSSEY);
        assert!(record.date_added >= before && record.date_added <= after);

        {
            let store = library.read().await;
            assert_eq!(store.len(), 1);
            assert_eq!(store.get(ODYSSEY).unwrap().date_added, record.date_added);
        }

        assert_eq!(
            session.on_decode(ODYSSEY).await,
            ScanOutcome::AlreadyInLibrary { isbn: ODYSSEY.to_owned() }
        );
        assert_eq!(
            session.on_decode(ODYSSEY).await,
            ScanOutcome::Suppressed { isbn: ODYSSEY.to_owned() }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(library.read().await.len(), 1);
    }

    #[tokio::test]
    async fn same_code_twice_during_lookup_resolves_once() {
        let (session, gate, calls, library) = gated_session();

        let first = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.on_decode(ODYSSEY).await }
        });
        wait_until_processing(&session).await;

        assert_eq!(session.on_decode(ODYSSEY).await, ScanOutcome::Busy);
        assert_eq!(session.on_decode(ILIAD).await, ScanOutcome::Busy);

        gate.notify_one();
        let outcome = first.await.unwrap();
        assert!(matches!(outcome, ScanOutcome::Added(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(library.read().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_code_cools_down_before_retry() {
        let (session, calls, _library) = session_with(ScriptedProvider::empty(RecordSource::Primary));

        assert_eq!(
            session.on_decode(ODYSSEY).await,
            ScanOutcome::NotFound { isbn: ODYSSEY.to_owned() }
        );
        assert_eq!(
            session.on_decode(ODYSSEY).await,
            ScanOutcome::Suppressed { isbn: ODYSSEY.to_owned() }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(session.cooldown() + Duration::from_millis(1)).await;
        assert_eq!(
            session.on_decode(ODYSSEY).await,
            ScanOutcome::NotFound { isbn: ODYSSEY.to_owned() }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn other_codes_are_accepted_during_cooldown() {
        let (session, calls, _library) = session_with(ScriptedProvider::empty(RecordSource::Primary));
        session.on_decode(ODYSSEY).await;
        assert_eq!(
            session.on_decode(ILIAD).await,
            ScanOutcome::NotFound { isbn: ILIAD.to_owned() }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn alternating_codes_keep_their_own_cooldowns() {
        let (session, calls, _library) = session_with(ScriptedProvider::empty(RecordSource::Primary));
        assert_eq!(
            session.on_decode(ODYSSEY).await,
            ScanOutcome::NotFound { isbn: ODYSSEY.to_owned() }
        );
        assert_eq!(
            session.on_decode(ILIAD).await,
            ScanOutcome::NotFound { isbn: ILIAD.to_owned() }
        );
        assert_eq!(
            session.on_decode(ODYSSEY).await,
            ScanOutcome::Suppressed { isbn: ODYSSEY.to_owned() }
        );
        assert_eq!(
            session.on_decode(ILIAD).await,
            ScanOutcome::Suppressed { isbn: ILIAD.to_owned() }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        tokio::time::advance(session.cooldown()).await;
        assert_eq!(
            session.on_decode(ODYSSEY).await,
            ScanOutcome::NotFound { isbn: ODYSSEY.to_owned() }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(session.state.lock().await.cooling.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn owned_code_is_reported_once_per_cooldown() {
        let (session, calls, library) =
            session_with(ScriptedProvider::knowing("The Odyssey", RecordSource::Primary));
        library.write().await.add(BookRecord::new(
            ODYSSEY.to_owned(),
            "The Odyssey".to_owned(),
            vec!["Homer".to_owned()],
            Utc::now(),
        ));

        let owned = ScanOutcome::AlreadyInLibrary { isbn: ODYSSEY.to_owned() };
        assert_eq!(session.on_decode(ODYSSEY).await, owned);
        assert_eq!(
            session.on_decode(ODYSSEY).await,
            ScanOutcome::Suppressed { isbn: ODYSSEY.to_owned() }
        );
        tokio::time::advance(session.cooldown()).await;
        assert_eq!(session.on_decode(ODYSSEY).await, owned);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stopping_discards_in_flight_result() {
        let (session, gate, calls, library) = gated_session();

        let first = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.on_decode(ODYSSEY).await }
        });
        wait_until_processing(&session).await;
        session.stop();
        gate.notify_one();

        assert_eq!(
            first.await.unwrap(),
            ScanOutcome::Discarded { isbn: ODYSSEY.to_owned() }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(library.read().await.is_empty());
        assert_eq!(session.on_decode(ILIAD).await, ScanOutcome::Stopped);
    }
}
