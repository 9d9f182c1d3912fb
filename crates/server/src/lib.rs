//! `shelf_server`
//!
//! Sync server for Shelf. Keeps one library array per user and key in SQLite and exposes it as
//! `GET|PUT /api/library/:key` behind bearer authentication.
use crate::auth::{UserList, require_bearer};
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::get;
use shelf_core::persistence::LibraryBackend;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Accounts and their bearer tokens
pub mod auth;
/// Error responses
pub mod errors;
/// Request handlers
pub mod handlers;

/// Largest accepted request body. Libraries are uploaded as a whole.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Clone)]
pub struct ServerState {
    pub backend: Arc<dyn LibraryBackend>,
    pub users: Arc<UserList>,
}

impl ServerState {
    #[must_use]
    #[inline]
    pub fn new<B>(backend: B, users: UserList) -> Self
    where
        B: LibraryBackend + 'static,
    {
        Self {
            backend: Arc::new(backend),
            users: Arc::new(users),
        }
    }
}

/// Builds the router with all routes and middleware.
#[allow(
    clippy::missing_inline_in_public_items,
    reason = "Called once at start of program"
)]
pub fn router(state: ServerState) -> Router {
    let protected = Router::new()
        .route(
            "/api/library/:key",
            get(handlers::get_library).put(handlers::put_library),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    Router::new()
        .route("/api/health", get(handlers::health))
        .merge(protected)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves `app` on `listener` until Ctrl-C is pressed.
/// # Errors
/// Fails if the server cannot accept connections.
#[allow(
    clippy::missing_inline_in_public_items,
    reason = "Called once at start of program"
)]
pub async fn serve(listener: tokio::net::TcpListener, app: Router) -> Result<(), std::io::Error> {
    tracing::info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutting down"),
        Err(error) => tracing::error!("Failed to listen for Ctrl-C: {error}"),
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests are predefined and guaranteed to be Some/Ok"
)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::header::AUTHORIZATION;
    use axum::http::{Request, StatusCode};
    use pretty_assertions::assert_eq;
    use shelf_core::auth::Credentials;
    use shelf_core::library::BookRecord;
    use shelf_core::persistence::sqlite::SqliteBackend;
    use tower::ServiceExt as _;

    /// A library in the JSON shape the client uploads.
    const SAMPLE_LIBRARY: &str = r#"[{
        "isbn": "9780140449136",
        "title": "The Odyssey",
        "authors": ["Homer"],
        "genres": ["Epic"],
        "dateAdded": "2024-06-01T09:15:00Z",
        "readingStatus": "read",
        "rating": 5
    }]"#;

    async fn app() -> Router {
        let users = UserList::parse("alice:secret,bob:hunter2").unwrap();
        router(ServerState::new(SqliteBackend::in_memory().await.unwrap(), users))
    }

    fn bearer(username: &str, password: &str) -> String {
        format!(
            "Bearer {}",
            Credentials::new(username, password).unwrap().token()
        )
    }

    async fn body_of(response: axum::response::Response) -> Vec<u8> {
        to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn health_needs_no_credentials() {
        let response = app()
            .await
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn library_rejects_missing_or_wrong_credentials() {
        let app = app().await;
        let response = app
            .clone()
            .oneshot(Request::get("/api/library/books").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(
                Request::get("/api/library/books")
                    .header(AUTHORIZATION, bearer("alice", "wrong"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn put_then_get_returns_the_library() {
        let app = app().await;
        let response = app
            .clone()
            .oneshot(
                Request::get("/api/library/books")
                    .header(AUTHORIZATION, bearer("alice", "secret"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_of(response).await, b"[]");

        let response = app
            .clone()
            .oneshot(
                Request::put("/api/library/books")
                    .header(AUTHORIZATION, bearer("alice", "secret"))
                    .header("content-type", "application/json")
                    .body(Body::from(SAMPLE_LIBRARY))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .clone()
            .oneshot(
                Request::get("/api/library/books")
                    .header(AUTHORIZATION, bearer("alice", "secret"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let books: Vec<BookRecord> = serde_json::from_slice(&body_of(response).await).unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].title, "The Odyssey");

        // Bob has a library of the same name, but not the same books
        let response = app
            .oneshot(
                Request::get("/api/library/books")
                    .header(AUTHORIZATION, bearer("bob", "hunter2"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(body_of(response).await, b"[]");
    }

    #[tokio::test]
    async fn malformed_upload_is_rejected() {
        let response = app()
            .await
            .oneshot(
                Request::put("/api/library/books")
                    .header(AUTHORIZATION, bearer("alice", "secret"))
                    .header("content-type", "application/json")
                    .body(Body::from(r#"[{"title": "no isbn"}]"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn odd_keys_are_rejected() {
        let response = app()
            .await
            .oneshot(
                Request::get("/api/library/..%2Fbob%2Fbooks")
                    .header(AUTHORIZATION, bearer("alice", "secret"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
