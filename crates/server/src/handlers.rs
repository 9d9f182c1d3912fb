use crate::ServerState;
use crate::auth::User;
use crate::errors::ApiError;
use axum::{Extension, Json};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde_json::{Value, json};
use shelf_core::library::BookRecord;

/// Longest library key accepted.
pub const MAX_KEY_LENGTH: usize = 64;

/// Every user gets their own namespace, so two users can both keep a library called `books`.
fn storage_key(user: &User, key: &str) -> Result<String, ApiError> {
    let valid = !key.is_empty()
        && key.len() <= MAX_KEY_LENGTH
        && key
            .chars()
            .all(|character| character.is_alphanumeric() || "-_. ".contains(character));
    if !valid {
        return Err(ApiError::InvalidKey(key.to_owned()));
    }
    Ok(format!("{}/{key}", user.0))
}

#[inline]
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[allow(clippy::missing_inline_in_public_items, reason = "Called once per request")]
pub async fn get_library(
    State(state): State<ServerState>,
    Extension(user): Extension<User>,
    Path(key): Path<String>,
) -> Result<Json<Vec<BookRecord>>, ApiError> {
    let books = state.backend.get(&storage_key(&user, &key)?).await?;
    tracing::debug!(user = %user.0, %key, count = books.len(), "Served library");
    Ok(Json(books))
}

#[allow(clippy::missing_inline_in_public_items, reason = "Called once per request")]
pub async fn put_library(
    State(state): State<ServerState>,
    Extension(user): Extension<User>,
    Path(key): Path<String>,
    Json(books): Json<Vec<BookRecord>>,
) -> Result<StatusCode, ApiError> {
    state.backend.set(&storage_key(&user, &key)?, &books).await?;
    tracing::info!(user = %user.0, %key, count = books.len(), "Stored library");
    Ok(StatusCode::NO_CONTENT)
}
