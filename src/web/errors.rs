//! Error types returned by the HTTP handlers.

use super::page::escape;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use serde_json::json;

/// Wraps any failure from the search layer. Every failure is a 500; the
/// message is logged and echoed as `{"error": "..."}`.
#[derive(Debug)]
pub struct HttpError(pub anyhow::Error);

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        log::error!("request failed: {:#}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            axum::Json(json!({ "error": format!("{:#}", self.0) })),
        )
            .into_response()
    }
}

// Lets handlers use `?` on anything convertible into `anyhow::Error`,
// including `JoinError` from blocking tasks.
impl<E> From<E> for HttpError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

/// Failure on the HTML page route: a 500 with a plain error page.
#[derive(Debug)]
pub struct PageError(pub anyhow::Error);

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        log::error!("page request failed: {:#}", self.0);
        let body = format!(
            "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Weiss Card Search</title></head>\
             <body><h1>Something went wrong</h1><p>{}</p><p><a href=\"/\">Back to search</a></p></body></html>",
            escape(&format!("{:#}", self.0))
        );
        (StatusCode::INTERNAL_SERVER_ERROR, Html(body)).into_response()
    }
}

impl<E> From<E> for PageError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
