use analysis::{AnalysisType, Analyzer, LlmType};
use anyhow::{anyhow, Context, Result};
use catalog::{Book, BookId, GutenbergClient};
use dashmap::DashMap;
use std::sync::Arc;
use storage::{BookStore, BookSummary, NewAnalysis, StoredAnalysis};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::metrics::{Metrics, TimedOperation};

/// Where a requested book came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookSource {
    Store,
    Catalog,
}

/// Failure of an analysis request, split by who is at fault.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisFailure {
    #[error("language model request failed: {0:#}")]
    Model(anyhow::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Ties the catalog, the local store and the analyzer together.
pub struct Library {
    store: BookStore,
    catalog: GutenbergClient,
    analyzer: Analyzer,
    metrics: Arc<Metrics>,
    /// One condensing run per book at a time
    summary_locks: DashMap<BookId, Arc<Mutex<()>>>,
}

fn cached_summary(book: &Book) -> Option<String> {
    book.summarized_text
        .as_deref()
        .filter(|summary| !summary.trim().is_empty())
        .map(str::to_string)
}

impl Library {
    pub fn new(
        store: BookStore,
        catalog: GutenbergClient,
        analyzer: Analyzer,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            catalog,
            analyzer,
            metrics,
            summary_locks: DashMap::new(),
        }
    }

    pub fn store(&self) -> &BookStore {
        &self.store
    }

    pub fn llm_type(&self) -> LlmType {
        self.analyzer.llm_type()
    }

    /// Look a book up locally, falling back to the catalog. Catalog hits are saved.
    pub async fn find_book(&self, book_id: &BookId) -> Result<Option<(Book, BookSource)>> {
        if let Some(book) = self.store.get_book(book_id).await? {
            self.metrics.record_store_hit();
            return Ok(Some((book, BookSource::Store)));
        }

        let timer = TimedOperation::start();
        let fetched = self.catalog.fetch_book(book_id).await;
        let found = matches!(fetched, Ok(Some(_)));
        self.metrics.record_catalog_fetch(timer.elapsed(), found);

        let Some(book) = fetched.context(format!("Failed to fetch book {} from catalog", book_id))?
        else {
            return Ok(None);
        };

        self.store.save_book(&book).await?;
        info!(book_id = %book_id, title = %book.display_title(), "stored new book");
        Ok(Some((book, BookSource::Catalog)))
    }

    /// Run an analysis, computing and caching the book's condensed text first if needed.
    ///
    /// Returns `None` when the book exists neither locally nor in the catalog.
    pub async fn analyze(
        &self,
        book_id: &BookId,
        analysis: AnalysisType,
    ) -> Result<Option<String>, AnalysisFailure> {
        let Some((book, _)) = self.find_book(book_id).await? else {
            return Ok(None);
        };

        let timer = TimedOperation::start();
        let summary = match cached_summary(&book) {
            Some(summary) => summary,
            None => self.summarize(&book).await?,
        };

        let result = self
            .analyzer
            .analyze(&summary, analysis)
            .await
            .map_err(AnalysisFailure::Model)?;
        self.metrics.record_analysis(timer.elapsed());

        let record = NewAnalysis {
            book_id: book_id.clone(),
            analysis_type: analysis.as_str().to_string(),
            llm_type: self.llm_type().as_str().to_string(),
            result: result.clone(),
        };
        if let Err(e) = self.store.record_analysis(&record).await {
            warn!(book_id = %book_id, error = %e, "Failed to record analysis");
        }

        Ok(Some(result))
    }

    /// Condense a book and cache the result. Concurrent callers for the same
    /// book wait for the first run and reuse its summary.
    async fn summarize(&self, book: &Book) -> Result<String, AnalysisFailure> {
        if book.text.trim().is_empty() {
            return Err(anyhow!("Book {} has no text to analyze", book.book_id).into());
        }

        let lock = self
            .summary_locks
            .entry(book.book_id.clone())
            .or_default()
            .value()
            .clone();
        let result = {
            let _guard = lock.lock().await;
            self.summarize_locked(book).await
        };
        drop(lock);
        self.summary_locks
            .remove_if(&book.book_id, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    async fn summarize_locked(&self, book: &Book) -> Result<String, AnalysisFailure> {
        // Set by whoever held the lock before us
        let stored = self.store.get_book(&book.book_id).await?;
        if let Some(summary) = stored.as_ref().and_then(cached_summary) {
            return Ok(summary);
        }

        let summary = self
            .analyzer
            .condense(book)
            .await
            .map_err(AnalysisFailure::Model)?;
        self.store.set_summary(&book.book_id, &summary).await?;
        self.metrics.record_summary();
        Ok(summary)
    }

    pub async fn list_books(&self, filter: Option<&str>) -> Result<Vec<BookSummary>> {
        self.store.list_books(filter).await
    }

    /// A stored book with its past analyses, newest first.
    pub async fn stored_book(&self, book_id: &BookId) -> Result<Option<(Book, Vec<StoredAnalysis>)>> {
        let Some(book) = self.store.get_book(book_id).await? else {
            return Ok(None);
        };
        let analyses = self.store.analyses_for(book_id).await?;
        Ok(Some((book, analyses)))
    }
}
