use crate::auth::Credentials;
use crate::library::types::BookRecord;
use crate::persistence::{LibraryBackend, StoreError};
use async_trait::async_trait;
use reqwest::{Response, StatusCode};

/// Shared backend reached over HTTP. Every request carries the user's bearer token.
pub struct RemoteBackend {
    http_client: reqwest::Client,
    base_url: String,
    credentials: Credentials,
}

impl RemoteBackend {
    #[must_use]
    #[inline]
    pub fn new(http_client: reqwest::Client, base_url: &str, credentials: Credentials) -> Self {
        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            credentials,
        }
    }

    #[must_use]
    #[inline]
    pub fn username(&self) -> &str {
        self.credentials.username()
    }

    fn library_url(&self, key: &str) -> String {
        format!("{}/api/library/{}", self.base_url, urlencoding::encode(key))
    }

    /// Checks that the backend accepts the credential by reading the library under `key`.
    /// # Errors
    /// `StoreError::Unauthorized` if the credential is rejected, any other error if the backend
    /// cannot be reached.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called on login only")]
    pub async fn verify(&self, key: &str) -> Result<usize, StoreError> {
        let books = self.get(key).await?;
        log::info!("Logged in as {}, {} books stored", self.username(), books.len());
        Ok(books.len())
    }
}

fn check_status(response: &Response) -> Result<(), StoreError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        log::warn!("Backend rejected the stored credential");
        return Err(StoreError::Unauthorized);
    }
    if !status.is_success() {
        return Err(StoreError::Status(status.as_u16()));
    }
    Ok(())
}

#[async_trait]
impl LibraryBackend for RemoteBackend {
    async fn get(&self, key: &str) -> Result<Vec<BookRecord>, StoreError> {
        let response = self
            .http_client
            .get(self.library_url(key))
            .bearer_auth(self.credentials.token())
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            log::debug!("Nothing stored under {key} yet");
            return Ok(Vec::new());
        }
        check_status(&response)?;

        Ok(response.json::<Vec<BookRecord>>().await?)
    }

    async fn set(&self, key: &str, books: &[BookRecord]) -> Result<(), StoreError> {
        let response = self
            .http_client
            .put(self.library_url(key))
            .bearer_auth(self.credentials.token())
            .json(books)
            .send()
            .await?;
        check_status(&response)?;

        log::debug!("Uploaded {} books under {key}", books.len());
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
    use pretty_assertions::assert_eq;

    #[test]
    fn library_url_escapes_key() {
        let backend = RemoteBackend::new(
            reqwest::Client::new(),
            "http://localhost:8080/",
            Credentials::new("alice", "secret").unwrap(),
        );
        assert_eq!(
            backend.library_url("books"),
            "http://localhost:8080/api/library/books"
        );
        assert_eq!(
            backend.library_url("my books"),
            "http://localhost:8080/api/library/my%20books"
        );
        assert_eq!(backend.username(), "alice");
    }

    #[tokio::test]
    async fn unreachable_backend_is_an_http_error() {
        let backend = RemoteBackend::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9",
            Credentials::new("alice", "secret").unwrap(),
        );
        let error = backend.get("books").await.unwrap_err();
        assert!(matches!(error, StoreError::Http(_)));
    }
}
