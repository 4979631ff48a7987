use askama::Template;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
};
use std::time::Duration;
use tracing::error;

use crate::templates::ErrorTemplate;

pub const BOOK_NOT_FOUND_FRAGMENT: &str = "<p>Book not found.</p>";
pub const FETCH_FAILED_FRAGMENT: &str = "<p>Book not found or an error occurred.</p>";

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Full-page 404
    #[error("not found: {0}")]
    PageNotFound(String),
    #[error("too many requests, retry in {}s", .0.as_secs())]
    RateLimited(Duration),
    /// The language model provider failed
    #[error("upstream failure: {0:#}")]
    Upstream(anyhow::Error),
    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::PageNotFound(message) => {
                let page = ErrorTemplate {
                    title: "Not found",
                    message: &message,
                }
                .render()
                .unwrap_or(message);
                (StatusCode::NOT_FOUND, Html(page)).into_response()
            }
            AppError::RateLimited(retry_after) => {
                let secs = retry_after.as_secs().max(1);
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Html("<p>Too many requests. Please try again later.</p>"),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(secs));
                response
            }
            AppError::Upstream(e) => {
                error!(error = %format!("{:#}", e), "Language model request failed");
                (
                    StatusCode::BAD_GATEWAY,
                    Html("<p>The analysis service is unavailable. Please try again later.</p>"),
                )
                    .into_response()
            }
            AppError::Internal(e) => {
                error!(error = %format!("{:#}", e), "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Html("<p>An internal error occurred.</p>"),
                )
                    .into_response()
            }
        }
    }
}
