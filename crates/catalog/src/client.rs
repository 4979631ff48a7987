use anyhow::{Context, Result};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::book::{Book, BookId, BookMetadata};
use crate::metadata::parse_metadata;
use crate::text::extract_body;

pub const DEFAULT_BASE_URL: &str = "https://www.gutenberg.org";

/// HTTP client for the Project Gutenberg website.
#[derive(Clone)]
pub struct GutenbergClient {
    base_url: String,
    client: reqwest::Client,
}

impl GutenbergClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(concat!("gutenberg-analyzer/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build catalog HTTP client")?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Download the book and its catalog record concurrently.
    ///
    /// Returns `None` when the catalog has no plain-text edition.
    pub async fn fetch_book(&self, book_id: &BookId) -> Result<Option<Book>> {
        let started = Instant::now();
        let (text, metadata) = tokio::join!(self.fetch_text(book_id), self.fetch_metadata(book_id));

        let Some(raw) = text? else {
            info!(book_id = %book_id, "ebook text not available");
            return Ok(None);
        };
        let metadata = metadata?;

        let body = extract_body(
            metadata.title.as_deref(),
            Some(metadata.authors.as_str()),
            &raw,
        );
        let book = Book::from_parts(book_id.clone(), body.trim().to_string(), metadata);

        info!(
            book_id = %book_id,
            words = book.word_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "fetched ebook from catalog"
        );
        Ok(Some(book))
    }

    /// Fetch the UTF-8 plain-text edition, trying the legacy and cache layouts.
    pub async fn fetch_text(&self, book_id: &BookId) -> Result<Option<String>> {
        let candidates = [
            format!("{}/files/{id}/{id}-0.txt", self.base_url, id = book_id),
            format!("{}/cache/epub/{id}/pg{id}.txt", self.base_url, id = book_id),
        ];

        for url in &candidates {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .context(format!("Failed to request {}", url))?;

            if response.status().is_success() {
                let text = response
                    .text()
                    .await
                    .context(format!("Failed to read body of {}", url))?;
                return Ok(Some(text));
            }
            debug!(url = %url, status = %response.status(), "text edition not found");
        }

        Ok(None)
    }

    /// Fetch and parse the RDF catalog record. A missing record yields empty metadata.
    pub async fn fetch_metadata(&self, book_id: &BookId) -> Result<BookMetadata> {
        let url = format!("{}/ebooks/{}.rdf", self.base_url, book_id);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context(format!("Failed to request {}", url))?;

        if !response.status().is_success() {
            warn!(url = %url, status = %response.status(), "catalog record not available");
            return Ok(BookMetadata::default());
        }

        let rdf = response
            .text()
            .await
            .context("Failed to read catalog record")?;
        parse_metadata(book_id, &rdf)
    }
}
