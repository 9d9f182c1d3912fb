//! Metadata resolver
//!
//! Maps an ISBN to a normalized book record by asking an ordered list of sources: Open Library
//! first, then a generative text model. A source that errors is treated like a source that has no
//! data, so the only outcomes are a record or `None`.
pub mod client;
pub mod errors;
pub mod llm;
pub mod metadata;
pub mod open_library;

use crate::library::types::{BookRecord, RecordSource};
use crate::resolver::client::build_http_client;
use crate::resolver::errors::ResolverError;
use crate::resolver::llm::{LlmConfig, LlmProvider};
use crate::resolver::metadata::BookMetadata;
use crate::resolver::open_library::OpenLibraryProvider;
use async_trait::async_trait;
use chrono::Utc;
use log::{info, warn};
use std::time::Instant;

/// One way of finding metadata for an ISBN.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Tag stored on records this provider produced.
    fn source(&self) -> RecordSource;

    /// Looks up `isbn`. `Ok(None)` means the source does not know the book.
    async fn attempt(&self, isbn: &str) -> Result<Option<BookMetadata>, ResolverError>;
}

/// Which sources to use and where to find them.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    pub open_library_url: String,
    /// The model fallback is skipped entirely without this.
    pub llm: Option<LlmConfig>,
}

impl Default for ResolverConfig {
    #[inline]
    fn default() -> Self {
        Self {
            open_library_url: open_library::DEFAULT_BASE_URL.to_owned(),
            llm: None,
        }
    }
}

/// Tries its providers strictly one after another until one of them knows the book.
#[derive(Default)]
pub struct Resolver {
    providers: Vec<Box<dyn MetadataProvider>>,
}

impl Resolver {
    #[must_use]
    #[inline]
    pub fn new(providers: Vec<Box<dyn MetadataProvider>>) -> Self {
        Self { providers }
    }

    /// Builds the Open Library provider, followed by the model provider if one is configured.
    /// # Errors
    /// Fails if the HTTP client cannot be created.
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called once per program run"
    )]
    pub fn from_config(config: &ResolverConfig) -> Result<Self, ResolverError> {
        let http_client = build_http_client()?;
        let mut resolver = Self::default().with_provider(OpenLibraryProvider::new(
            http_client.clone(),
            &config.open_library_url,
        ));
        if let Some(llm) = &config.llm {
            resolver = resolver.with_provider(LlmProvider::new(http_client, llm.clone()));
        } else {
            info!("No model API key configured, lookups only use Open Library");
        }
        Ok(resolver)
    }

    /// Appends a provider to the end of the list.
    #[must_use]
    #[inline]
    pub fn with_provider<P>(mut self, provider: P) -> Self
    where
        P: MetadataProvider + 'static,
    {
        self.providers.push(Box::new(provider));
        self
    }

    /// Names of the providers in the order they are tried.
    #[must_use]
    #[inline]
    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|provider| provider.name()).collect()
    }

    /// Looks up `isbn`, which must already be a valid ISBN-13. Returns `None` if no source knows
    /// the book. Does not touch any library.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called once per lookup")]
    pub async fn resolve(&self, isbn: &str) -> Option<BookRecord> {
        for provider in &self.providers {
            let t0 = Instant::now();
            match provider.attempt(isbn).await {
                Ok(Some(metadata)) => {
                    info!(
                        "{} resolved {isbn} in {} ms",
                        provider.name(),
                        t0.elapsed().as_millis()
                    );
                    return Some(metadata.into_record(isbn, provider.source(), Utc::now()));
                }
                Ok(None) => info!("{} has no data for {isbn}", provider.name()),
                Err(error) => warn!("{} lookup for {isbn} failed: {error}", provider.name()),
            }
        }
        info!("No source knows {isbn}");
        None
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests are predefined and guaranteed to be Some/Ok"
)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider answering from a fixed script, counting how often it was asked.
    pub(crate) struct ScriptedProvider {
        pub(crate) source: RecordSource,
        pub(crate) answer: Option<BookMetadata>,
        pub(crate) fail: bool,
        pub(crate) calls: Arc<AtomicUsize>,
    }

    impl ScriptedProvider {
        pub(crate) fn knowing(title: &str, source: RecordSource) -> Self {
            Self {
                source,
                answer: Some(BookMetadata {
                    title: Some(title.to_owned()),
                    authors: vec!["Homer".to_owned()],
                    ..BookMetadata::default()
                }),
                fail: false,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub(crate) fn empty(source: RecordSource) -> Self {
            Self {
                source,
                answer: None,
                fail: false,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub(crate) fn failing(source: RecordSource) -> Self {
            Self {
                fail: true,
                ..Self::empty(source)
            }
        }
    }

    #[async_trait]
    impl MetadataProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn source(&self) -> RecordSource {
            self.source
        }

        async fn attempt(&self, _isbn: &str) -> Result<Option<BookMetadata>, ResolverError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ResolverError::Parse("scripted failure".to_owned()));
            }
            Ok(self.answer.clone())
        }
    }

    #[tokio::test]
    async fn primary_answer_wins() {
        let primary = ScriptedProvider::knowing("The Odyssey", RecordSource::Primary);
        let fallback = ScriptedProvider::knowing("Wrong", RecordSource::Llm);
        let fallback_calls = Arc::clone(&fallback.calls);
        let resolver = Resolver::default()
            .with_provider(primary)
            .with_provider(fallback);

        let record = resolver.resolve("9780140449136").await.unwrap();
        assert_eq!(record.title, "The Odyssey");
        assert_eq!(record.isbn, "9780140449136");
        assert_eq!(record.source, Some(RecordSource::Primary));
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn falls_back_when_primary_is_empty_or_fails() {
        for primary in [
            ScriptedProvider::empty(RecordSource::Primary),
            ScriptedProvider::failing(RecordSource::Primary),
        ] {
            let primary_calls = Arc::clone(&primary.calls);
            let resolver = Resolver::default()
                .with_provider(primary)
                .with_provider(ScriptedProvider::knowing("The Odyssey", RecordSource::Llm));

            let record = resolver.resolve("9780140449136").await.unwrap();
            assert_eq!(record.source, Some(RecordSource::Llm));
            assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn not_found_when_every_source_misses() {
        let resolver = Resolver::default()
            .with_provider(ScriptedProvider::failing(RecordSource::Primary))
            .with_provider(ScriptedProvider::empty(RecordSource::Llm));
        assert_eq!(resolver.resolve("9780140449136").await, None);
        assert_eq!(Resolver::default().resolve("9780140449136").await, None);
    }

    #[tokio::test]
    async fn resolving_twice_gives_equal_records() {
        let resolver = Resolver::default()
            .with_provider(ScriptedProvider::knowing("The Odyssey", RecordSource::Primary));
        let mut first = resolver.resolve("9780140449136").await.unwrap();
        let second = resolver.resolve("9780140449136").await.unwrap();
        first.date_added = second.date_added;
        assert_eq!(first, second);
    }

    #[test]
    fn config_without_key_only_uses_open_library() {
        let resolver = Resolver::from_config(&ResolverConfig::default()).unwrap();
        assert_eq!(resolver.provider_names(), vec!["open-library"]);

        let config = ResolverConfig {
            llm: Some(LlmConfig::new("secret")),
            ..ResolverConfig::default()
        };
        let resolver = Resolver::from_config(&config).unwrap();
        assert_eq!(resolver.provider_names(), vec!["open-library", "llm"]);
    }
}
