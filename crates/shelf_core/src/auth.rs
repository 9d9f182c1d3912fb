//! Credentials for the shared backend.
//!
//! The `username:password` pair is encoded once at login into a token that is then sent as a
//! bearer credential with every request.
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use core::fmt;

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("credential is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("credential is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("credential is missing the username:password separator")]
    MissingSeparator,
    #[error("username must be non-empty and must not contain ':'")]
    InvalidUsername,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    /// # Errors
    /// Fails if the username is empty or contains a colon.
    #[inline]
    pub fn new(username: &str, password: &str) -> Result<Self, AuthError> {
        let username = username.trim();
        if username.is_empty() || username.contains(':') {
            return Err(AuthError::InvalidUsername);
        }
        Ok(Self {
            username: username.to_owned(),
            password: password.to_owned(),
        })
    }

    /// Decodes a token produced by [`Credentials::token`].
    /// # Errors
    /// Fails if the token is not base64 of `username:password`.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called once per request")]
    pub fn from_token(token: &str) -> Result<Self, AuthError> {
        let decoded = String::from_utf8(STANDARD.decode(token.trim())?)?;
        let (username, password) = decoded
            .split_once(':')
            .ok_or(AuthError::MissingSeparator)?;
        Self::new(username, password)
    }

    /// The bearer token: base64 of `username:password`.
    #[must_use]
    #[inline]
    pub fn token(&self) -> String {
        STANDARD.encode(format!("{}:{}", self.username, self.password))
    }

    #[must_use]
    #[inline]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Whether `password` matches.
    #[must_use]
    #[inline]
    pub fn password_matches(&self, password: &str) -> bool {
        self.password == password
    }
}

impl fmt::Debug for Credentials {
    #[inline]
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
#[must_use]
#[inline]
pub fn bearer_token(header_value: &str) -> Option<&str> {
    header_value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
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
    fn token_round_trip() {
        let credentials = Credentials::new("alice", "open:sesame").unwrap();
        assert_eq!(credentials.token(), "YWxpY2U6b3BlbjpzZXNhbWU=");
        let decoded = Credentials::from_token(&credentials.token()).unwrap();
        assert_eq!(decoded, credentials);
        assert!(decoded.password_matches("open:sesame"));
    }

    #[test]
    fn rejects_malformed_tokens() {
        assert!(matches!(
            Credentials::from_token("not base64!"),
            Err(AuthError::Encoding(_))
        ));
        assert!(matches!(
            Credentials::from_token(&STANDARD.encode("nocolon")),
            Err(AuthError::MissingSeparator)
        ));
        assert!(matches!(
            Credentials::from_token(&STANDARD.encode(":secret")),
            Err(AuthError::InvalidUsername)
        ));
    }

    #[test]
    fn debug_hides_password() {
        let credentials = Credentials::new("alice", "secret").unwrap();
        assert!(!format!("{credentials:?}").contains("secret"));
    }

    #[test]
    fn parses_bearer_header() {
        assert_eq!(bearer_token("Bearer abc="), Some("abc="));
        assert_eq!(bearer_token("Basic abc="), None);
        assert_eq!(bearer_token("Bearer "), None);
    }
}
