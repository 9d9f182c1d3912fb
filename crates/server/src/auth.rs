use crate::ServerState;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use shelf_core::auth::{AuthError, Credentials, bearer_token};
use std::collections::HashMap;

/// The accounts allowed to use the server.
#[derive(Debug, Clone, Default)]
pub struct UserList {
    users: HashMap<String, Credentials>,
}

impl UserList {
    /// Parses a comma-separated list of `username:password` pairs, e.g. `alice:secret,bob:hunter2`.
    /// # Errors
    /// Fails on entries without a colon or with an invalid username.
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called once at start of program"
    )]
    pub fn parse(list: &str) -> Result<Self, AuthError> {
        let mut users = HashMap::new();
        for entry in list.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
            let (username, password) = entry.split_once(':').ok_or(AuthError::MissingSeparator)?;
            let credentials = Credentials::new(username, password)?;
            users.insert(credentials.username().to_owned(), credentials);
        }
        Ok(Self { users })
    }

    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// The user a bearer token belongs to, if it names a known user with the right password.
    #[must_use]
    #[inline]
    pub fn authenticate(&self, token: &str) -> Option<&str> {
        let presented = Credentials::from_token(token).ok()?;
        self.users
            .get(presented.username())
            .filter(|known| **known == presented)
            .map(Credentials::username)
    }
}

/// Name of the user a request was authenticated as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User(pub String);

/// Rejects requests without a valid bearer token with 401, and passes the user on to the handler
/// otherwise.
#[allow(clippy::missing_inline_in_public_items, reason = "Called once per request")]
pub async fn require_bearer(
    State(state): State<ServerState>,
    mut request: Request,
    next: Next,
) -> Response {
    let user = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_token)
        .and_then(|token| state.users.authenticate(token))
        .map(str::to_owned);

    match user {
        Some(user) => {
            request.extensions_mut().insert(User(user));
            next.run(request).await
        }
        None => {
            tracing::warn!(uri = %request.uri(), "Rejected request without valid credentials");
            (StatusCode::UNAUTHORIZED, [(WWW_AUTHENTICATE, "Bearer")]).into_response()
        }
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
    fn parses_user_list() {
        let users = UserList::parse("alice:secret, bob:hunter2,").unwrap();
        assert_eq!(users.len(), 2);
        assert!(UserList::parse("").unwrap().is_empty());
        assert!(matches!(
            UserList::parse("alice"),
            Err(AuthError::MissingSeparator)
        ));
        assert!(matches!(
            UserList::parse(":secret"),
            Err(AuthError::InvalidUsername)
        ));
    }

    #[test]
    fn passwords_may_contain_colons() {
        let users = UserList::parse("carol:open:sesame").unwrap();
        let token = Credentials::new("carol", "open:sesame").unwrap().token();
        assert_eq!(users.authenticate(&token), Some("carol"));
    }

    #[test]
    fn authenticates_only_matching_tokens() {
        let users = UserList::parse("alice:secret,bob:hunter2").unwrap();
        let alice = Credentials::new("alice", "secret").unwrap().token();
        let wrong = Credentials::new("alice", "hunter2").unwrap().token();
        let stranger = Credentials::new("mallory", "secret").unwrap().token();

        assert_eq!(users.authenticate(&alice), Some("alice"));
        assert_eq!(users.authenticate(&wrong), None);
        assert_eq!(users.authenticate(&stranger), None);
        assert_eq!(users.authenticate("not a token"), None);
    }
}
