use analysis::AnalysisType;
use askama::Template;
use axum::{
    extract::{ConnectInfo, Path, Query, State},
    response::Html,
    Form, Json,
};
use catalog::BookId;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tracing::{info, warn};

use crate::error::{AppError, BOOK_NOT_FOUND_FRAGMENT, FETCH_FAILED_FRAGMENT};
use crate::metrics::MetricsSnapshot;
use crate::service::{AnalysisFailure, BookSource};
use crate::templates::{
    analysis_options, AnalysisFragmentTemplate, BookFragmentTemplate, BookPageTemplate,
    BookRow, BookView, BooksTemplate, HomeTemplate,
};
use crate::AppState;

#[derive(Deserialize)]
pub struct FetchBookForm {
    pub book_id: String,
}

#[derive(Deserialize)]
pub struct AnalyzeForm {
    pub analysis_type: String,
}

#[derive(Deserialize)]
pub struct BooksQuery {
    #[serde(default)]
    pub q: Option<String>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: String,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub llm_type: String,
    pub books_stored: usize,
    pub rate_limited_clients: usize,
    pub metrics: MetricsSnapshot,
}

fn render<T: Template>(template: T) -> Result<Html<String>, AppError> {
    template
        .render()
        .map(Html)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Template error: {}", e)))
}

pub async fn home(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let book_count = state.library.store().count_books().await?;
    render(HomeTemplate {
        book_count,
        llm_type: state.library.llm_type().to_string(),
    })
}

/// Lookup form target. Always answers 200 with a fragment.
pub async fn fetch_book(
    State(state): State<AppState>,
    Form(form): Form<FetchBookForm>,
) -> Html<String> {
    let Ok(book_id) = form.book_id.parse::<BookId>() else {
        info!(input = %form.book_id, "rejected invalid ebook number");
        state.metrics.record_request(false);
        return Html(FETCH_FAILED_FRAGMENT.to_string());
    };

    match state.library.find_book(&book_id).await {
        Ok(Some((book, source))) => {
            state.metrics.record_request(true);
            let fragment = BookFragmentTemplate {
                book: BookView::from(&book),
                from_store: source == BookSource::Store,
                options: analysis_options(),
            };
            Html(
                fragment
                    .render()
                    .unwrap_or_else(|_| FETCH_FAILED_FRAGMENT.to_string()),
            )
        }
        Ok(None) => {
            state.metrics.record_request(false);
            Html(FETCH_FAILED_FRAGMENT.to_string())
        }
        Err(e) => {
            warn!(book_id = %book_id, error = %format!("{:#}", e), "Book lookup failed");
            state.metrics.record_request(false);
            Html(FETCH_FAILED_FRAGMENT.to_string())
        }
    }
}

pub async fn analyze(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(book_id): Path<String>,
    Form(form): Form<AnalyzeForm>,
) -> Result<Html<String>, AppError> {
    if let Err(retry_after) = state.limiter.check(addr.ip()) {
        warn!(client = %addr.ip(), "rate limit exceeded");
        state.metrics.record_rate_limited();
        return Err(AppError::RateLimited(retry_after));
    }

    let Ok(book_id) = book_id.parse::<BookId>() else {
        state.metrics.record_request(false);
        return Ok(Html(BOOK_NOT_FOUND_FRAGMENT.to_string()));
    };
    let analysis: AnalysisType = form.analysis_type.parse().unwrap_or(AnalysisType::Custom);

    let outcome = state.library.analyze(&book_id, analysis).await;
    state.metrics.record_request(matches!(outcome, Ok(Some(_))));

    match outcome {
        Ok(Some(result)) => render(AnalysisFragmentTemplate { result }),
        Ok(None) => Ok(Html(BOOK_NOT_FOUND_FRAGMENT.to_string())),
        Err(AnalysisFailure::Model(e)) => Err(AppError::Upstream(e)),
        Err(AnalysisFailure::Internal(e)) => Err(AppError::Internal(e)),
    }
}

pub async fn list_books(
    State(state): State<AppState>,
    Query(query): Query<BooksQuery>,
) -> Result<Html<String>, AppError> {
    let query = query.q.unwrap_or_default().trim().to_string();
    let books = state
        .library
        .list_books(Some(query.as_str()))
        .await?
        .into_iter()
        .map(BookRow::from)
        .collect();

    render(BooksTemplate {
        books,
        has_query: !query.is_empty(),
        query,
    })
}

pub async fn book_detail(
    State(state): State<AppState>,
    Path(book_id): Path<String>,
) -> Result<Html<String>, AppError> {
    let not_found = || AppError::PageNotFound(format!("No stored book with ebook number {}.", book_id));

    let Ok(id) = book_id.parse::<BookId>() else {
        return Err(not_found());
    };
    let Some((book, analyses)) = state.library.stored_book(&id).await? else {
        return Err(not_found());
    };

    render(BookPageTemplate {
        book: BookView::from(&book),
        analyses: analyses.into_iter().map(Into::into).collect(),
        options: analysis_options(),
    })
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let (status, database) = match state.library.store().count_books().await {
        Ok(_) => ("ok", "ok".to_string()),
        Err(e) => ("degraded", format!("error: {}", e)),
    };
    Json(HealthResponse { status, database })
}

pub async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, AppError> {
    Ok(Json(StatsResponse {
        llm_type: state.library.llm_type().to_string(),
        books_stored: state.library.store().count_books().await?,
        rate_limited_clients: state.limiter.tracked_clients(),
        metrics: state.metrics.snapshot(),
    }))
}
