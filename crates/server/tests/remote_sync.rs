//! Drives the client-side `RemoteBackend` against a live server on a local port.
#![allow(
    clippy::unwrap_used,
    reason = "Tests are predefined and guaranteed to be Some/Ok"
)]

use pretty_assertions::assert_eq;
use shelf_core::auth::Credentials;
use shelf_core::library::BookRecord;
use shelf_core::persistence::remote::RemoteBackend;
use shelf_core::persistence::sqlite::SqliteBackend;
use shelf_core::persistence::{LibraryBackend as _, StoreError};
use shelf_core::resolver::client::build_http_client;
use shelf_server::auth::UserList;
use shelf_server::{ServerState, router};

async fn spawn_server() -> String {
    let users = UserList::parse("alice:secret").unwrap();
    let state = ServerState::new(SqliteBackend::in_memory().await.unwrap(), users);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router(state)).await });
    format!("http://{address}")
}

fn client(base_url: &str, password: &str) -> RemoteBackend {
    RemoteBackend::new(
        build_http_client().unwrap(),
        base_url,
        Credentials::new("alice", password).unwrap(),
    )
}

fn library() -> Vec<BookRecord> {
    serde_json::from_str(
        r#"[
            {"isbn": "9780547928227", "title": "The Hobbit", "authors": ["J. R. R. Tolkien"],
             "dateAdded": "2024-07-01T09:00:00Z", "favorite": true},
            {"isbn": "9780140449136", "title": "The Odyssey", "authors": ["Homer"],
             "dateAdded": "2024-06-01T09:15:00Z", "readingStatus": "read", "rating": 5}
        ]"#,
    )
    .unwrap()
}

#[tokio::test]
async fn set_all_then_get_all_over_http() {
    let base_url = spawn_server().await;
    let backend = client(&base_url, "secret");

    assert_eq!(backend.verify("books").await.unwrap(), 0);
    backend.set("books", &library()).await.unwrap();
    backend.set("books", &library()).await.unwrap();
    assert_eq!(backend.get("books").await.unwrap(), library());

    backend.set("books", &[]).await.unwrap();
    assert!(backend.get("books").await.unwrap().is_empty());
}

#[tokio::test]
async fn rejected_credential_maps_to_unauthorized() {
    let base_url = spawn_server().await;
    let backend = client(&base_url, "guessed");

    assert!(matches!(
        backend.get("books").await,
        Err(StoreError::Unauthorized)
    ));
    assert!(matches!(
        backend.set("books", &library()).await,
        Err(StoreError::Unauthorized)
    ));
}
