pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod rate_limit;
pub mod service;
pub mod templates;

use analysis::{Analyzer, AnalyzerConfig, ChatClient, LanguageModel};
use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use catalog::GutenbergClient;
use std::sync::Arc;
use std::time::Duration;
use storage::BookStore;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::debug;

pub use config::{AppConfig, Args};
pub use metrics::Metrics;
pub use rate_limit::RateLimiter;
pub use service::Library;

const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Clone)]
pub struct AppState {
    pub library: Arc<Library>,
    pub limiter: Arc<RateLimiter>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// Wire up the store, catalog client and LLM client from configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let store = BookStore::open(&config.database_path)?;
        let catalog = GutenbergClient::new(config.gutenberg_url.clone(), config.request_timeout())?;
        let model: Arc<dyn LanguageModel> = Arc::new(
            ChatClient::new(config.llm_config()).context("Failed to create LLM client")?,
        );
        let analyzer = Analyzer::new(
            model,
            AnalyzerConfig {
                analysis_max_tokens: config.llm_max_tokens,
                ..AnalyzerConfig::default()
            },
        );
        Ok(Self::new(store, catalog, analyzer, config.request_per_minute))
    }

    pub fn new(
        store: BookStore,
        catalog: GutenbergClient,
        analyzer: Analyzer,
        requests_per_minute: u32,
    ) -> Self {
        let metrics = Metrics::new();
        Self {
            library: Arc::new(Library::new(store, catalog, analyzer, Arc::clone(&metrics))),
            limiter: Arc::new(RateLimiter::new(requests_per_minute)),
            metrics,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::home))
        .route("/fetch_book", post(handlers::fetch_book))
        .route("/analyze/:book_id", post(handlers::analyze))
        .route("/books", get(handlers::list_books))
        .route("/book/:book_id", get(handlers::book_detail))
        .route("/health", get(handlers::health))
        .route("/stats", get(handlers::stats))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Periodically forget clients that have been idle for a full window.
pub fn spawn_rate_limit_sweeper(limiter: Arc<RateLimiter>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let removed = limiter.sweep();
            if removed > 0 {
                debug!(removed, "swept idle rate-limit entries");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis::{LlmError, LlmType};
    use async_trait::async_trait;
    use axum::{
        body::Body,
        extract::{connect_info::MockConnectInfo, Path},
        http::{header, Request, StatusCode},
    };
    use catalog::{Book, BookId, BookMetadata};
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use storage::NewAnalysis;
    use tower::ServiceExt;

    struct FakeModel {
        calls: Arc<AtomicUsize>,
        summary_calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl LanguageModel for FakeModel {
        fn kind(&self) -> LlmType {
            LlmType::Groq
        }

        async fn complete(&self, _system: &str, user: &str, _max: u32) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(LlmError::Api {
                    status: 401,
                    body: "invalid api key".into(),
                });
            }
            if user.starts_with("Summarize the following passage") {
                self.summary_calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                return Ok("Chunk summary".into());
            }
            if user.starts_with("Analyze the sentiment") {
                Ok("Hopeful <b>and warm".into())
            } else {
                Ok("Test analysis result".into())
            }
        }
    }

    struct Harness {
        app: Router,
        store: BookStore,
        calls: Arc<AtomicUsize>,
        summary_calls: Arc<AtomicUsize>,
    }

    /// Router over an in-memory store. The catalog points at a closed port so
    /// lookups of unknown books fail.
    async fn harness(rpm: u32, fail: bool) -> Harness {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_catalog = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);
        harness_with_catalog(rpm, fail, dead_catalog).await
    }

    async fn harness_with_catalog(rpm: u32, fail: bool, catalog_url: String) -> Harness {
        let store = BookStore::open_in_memory().unwrap();
        let catalog = GutenbergClient::new(catalog_url, Duration::from_secs(2)).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let summary_calls = Arc::new(AtomicUsize::new(0));
        let model = Arc::new(FakeModel {
            calls: Arc::clone(&calls),
            summary_calls: Arc::clone(&summary_calls),
            fail,
        });
        let analyzer = Analyzer::new(model, AnalyzerConfig::default());
        let state = AppState::new(store.clone(), catalog, analyzer, rpm);

        let app = create_router(state)
            .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));
        Harness {
            app,
            store,
            calls,
            summary_calls,
        }
    }

    const RDF: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<rdf:RDF xml:base="http://www.gutenberg.org/"
         xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
         xmlns:dcterms="http://purl.org/dc/terms/"
         xmlns:pgterms="http://www.gutenberg.org/2009/pgterms/">
    <pgterms:ebook rdf:about="ebooks/1234">
        <dcterms:title>Sample Book</dcterms:title>
        <dcterms:creator><pgterms:agent><pgterms:name>John Doe</pgterms:name></pgterms:agent></dcterms:creator>
    </pgterms:ebook>
</rdf:RDF>
"#;

    const TEXT: &str = "Header\n*** START OF THE PROJECT GUTENBERG EBOOK SAMPLE BOOK ***\n\
        Sample Book\nby John Doe\n\nOnce upon a time.\n\
        *** END OF THE PROJECT GUTENBERG EBOOK SAMPLE BOOK ***\nFooter";

    /// Catalog site that only knows ebook 1234.
    async fn spawn_catalog() -> String {
        let router = Router::new()
            .route(
                "/files/:id/:file",
                axum::routing::get(|Path((id, file)): Path<(String, String)>| async move {
                    if id == "1234" && file == "1234-0.txt" {
                        Ok(TEXT)
                    } else {
                        Err(StatusCode::NOT_FOUND)
                    }
                }),
            )
            .route(
                "/ebooks/:file",
                axum::routing::get(|Path(file): Path<String>| async move {
                    if file == "1234.rdf" {
                        Ok(RDF)
                    } else {
                        Err(StatusCode::NOT_FOUND)
                    }
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn seed(store: &BookStore, id: &str, title: &str) -> BookId {
        seed_text(
            store,
            id,
            title,
            "It was the best of times, it was the worst of times.",
        )
        .await
    }

    /// About 7800 estimated tokens, which condenses in two chunks.
    fn long_text() -> String {
        let paragraph = vec!["word"; 100].join(" ");
        vec![paragraph; 60].join("\n\n")
    }

    async fn seed_text(store: &BookStore, id: &str, title: &str, text: &str) -> BookId {
        let book_id: BookId = id.parse().unwrap();
        let book = Book::from_parts(
            book_id.clone(),
            text.into(),
            BookMetadata {
                title: Some(title.into()),
                authors: "Dickens, Charles".into(),
                languages: "en".into(),
                ..Default::default()
            },
        );
        store.save_book(&book).await.unwrap();
        book_id
    }

    fn form_post(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_book_from_store() {
        let h = harness(10, false).await;
        seed(&h.store, "98", "A Tale of Two Cities").await;

        let response = h.app.oneshot(form_post("/fetch_book", "book_id=98")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("A Tale of Two Cities"));
        assert!(html.contains("hx-post=\"/analyze/98\""));
    }

    #[tokio::test]
    async fn test_fetch_book_invalid_or_unreachable() {
        let h = harness(10, false).await;

        let response = h
            .app
            .clone()
            .oneshot(form_post("/fetch_book", "book_id=not-a-number"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "<p>Book not found or an error occurred.</p>");

        let response = h.app.oneshot(form_post("/fetch_book", "book_id=12345")).await.unwrap();
        assert_eq!(body_text(response).await, "<p>Book not found or an error occurred.</p>");
    }

    #[tokio::test]
    async fn test_analyze_caches_summary_and_records_result() {
        let h = harness(10, false).await;
        let id = seed(&h.store, "98", "A Tale of Two Cities").await;

        let response = h
            .app
            .clone()
            .oneshot(form_post("/analyze/98", "analysis_type=sentiment"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_text(response).await.trim_end(),
            "<div class='text-gray-700 text-lg'>Hopeful &lt;b&gt;and warm</div>"
        );

        // Short text needs no condensing, so only the analysis call is made
        assert_eq!(h.calls.load(Ordering::SeqCst), 1);
        let stored = h.store.get_book(&id).await.unwrap().unwrap();
        assert_eq!(
            stored.summarized_text.as_deref(),
            Some("It was the best of times, it was the worst of times.")
        );
        let analyses = h.store.analyses_for(&id).await.unwrap();
        assert_eq!(analyses.len(), 1);
        assert_eq!(analyses[0].analysis_type, "sentiment");
        assert_eq!(analyses[0].llm_type, "groq");
        assert_eq!(analyses[0].result, "Hopeful <b>and warm");
    }

    #[tokio::test]
    async fn test_analyze_missing_book() {
        let h = harness(10, false).await;

        let response = h
            .app
            .clone()
            .oneshot(form_post("/analyze/abc", "analysis_type=summary"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "<p>Book not found.</p>");
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_analyze_model_failure_is_bad_gateway() {
        let h = harness(10, true).await;
        let id = seed(&h.store, "98", "A Tale of Two Cities").await;

        let response = h
            .app
            .oneshot(form_post("/analyze/98", "analysis_type=summary"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(h.store.analyses_for(&id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_analyze_is_rate_limited_per_ip() {
        let h = harness(2, false).await;
        seed(&h.store, "98", "A Tale of Two Cities").await;

        for _ in 0..2 {
            let response = h
                .app
                .clone()
                .oneshot(form_post("/analyze/98", "analysis_type=summary"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = h
            .app
            .clone()
            .oneshot(form_post("/analyze/98", "analysis_type=summary"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key(header::RETRY_AFTER));
        assert_eq!(h.calls.load(Ordering::SeqCst), 2);

        // Other routes are not limited
        let response = h.app.oneshot(get("/books")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_books_page_lists_and_filters() {
        let h = harness(10, false).await;
        seed(&h.store, "98", "A Tale of Two Cities").await;
        seed(&h.store, "1342", "Pride and Prejudice").await;

        let html = body_text(h.app.clone().oneshot(get("/books")).await.unwrap()).await;
        assert!(html.contains("A Tale of Two Cities"));
        assert!(html.contains("Pride and Prejudice"));
        assert!(html.find("A Tale").unwrap() < html.find("Pride").unwrap());

        let html = body_text(h.app.oneshot(get("/books?q=pride")).await.unwrap()).await;
        assert!(html.contains("Pride and Prejudice"));
        assert!(!html.contains("A Tale of Two Cities"));
    }

    #[tokio::test]
    async fn test_book_page_shows_past_analyses() {
        let h = harness(10, false).await;
        let id = seed(&h.store, "98", "A Tale of Two Cities").await;
        h.store
            .record_analysis(&NewAnalysis {
                book_id: id,
                analysis_type: "key_characters".into(),
                llm_type: "openai".into(),
                result: "Sydney Carton".into(),
            })
            .await
            .unwrap();

        let response = h.app.clone().oneshot(get("/book/98")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("Sydney Carton"));
        assert!(html.contains("Key characters"));

        let response = h.app.oneshot(get("/book/777")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_home_health_and_stats() {
        let h = harness(10, false).await;
        seed(&h.store, "98", "A Tale of Two Cities").await;

        let response = h.app.clone().oneshot(get("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("hx-post=\"/fetch_book\""));

        let health: serde_json::Value =
            serde_json::from_str(&body_text(h.app.clone().oneshot(get("/health")).await.unwrap()).await)
                .unwrap();
        assert_eq!(health["status"], "ok");

        h.app
            .clone()
            .oneshot(form_post("/fetch_book", "book_id=98"))
            .await
            .unwrap();
        let stats: serde_json::Value =
            serde_json::from_str(&body_text(h.app.oneshot(get("/stats")).await.unwrap()).await)
                .unwrap();
        assert_eq!(stats["books_stored"], 1);
        assert_eq!(stats["llm_type"], "groq");
        assert_eq!(stats["metrics"]["store_hits"], 1);
    }

    async fn stats(app: &Router) -> serde_json::Value {
        let response = app.clone().oneshot(get("/stats")).await.unwrap();
        serde_json::from_str(&body_text(response).await).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_book_from_catalog_is_stored() {
        let h = harness_with_catalog(10, false, spawn_catalog().await).await;
        let id: BookId = "1234".parse().unwrap();

        let response = h
            .app
            .clone()
            .oneshot(form_post("/fetch_book", "book_id=1234"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("Sample Book"));
        assert!(html.contains("hx-post=\"/analyze/1234\""));

        let stored = h.store.get_book(&id).await.unwrap().expect("stored book");
        assert_eq!(stored.title.as_deref(), Some("Sample Book"));
        assert_eq!(stored.authors, "John Doe");
        assert_eq!(stored.text, "Once upon a time.");

        // The second lookup is answered locally
        h.app
            .clone()
            .oneshot(form_post("/fetch_book", "book_id=1234"))
            .await
            .unwrap();
        let stats = stats(&h.app).await;
        assert_eq!(stats["books_stored"], 1);
        assert_eq!(stats["metrics"]["catalog_fetches"], 1);
        assert_eq!(stats["metrics"]["catalog_misses"], 0);
        assert_eq!(stats["metrics"]["store_hits"], 1);
    }

    #[tokio::test]
    async fn test_long_book_is_condensed_once() {
        let h = harness(10, false).await;
        let id = seed_text(&h.store, "98", "A Long Book", &long_text()).await;

        let response = h
            .app
            .clone()
            .oneshot(form_post("/analyze/98", "analysis_type=summary"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(h.summary_calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.calls.load(Ordering::SeqCst), 3);

        let stored = h.store.get_book(&id).await.unwrap().unwrap();
        assert_eq!(
            stored.summarized_text.as_deref(),
            Some("Chunk summary\n\nChunk summary")
        );

        let response = h
            .app
            .clone()
            .oneshot(form_post("/analyze/98", "analysis_type=key_characters"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(h.summary_calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.calls.load(Ordering::SeqCst), 4);
        assert_eq!(stats(&h.app).await["metrics"]["summaries_computed"], 1);
    }

    #[tokio::test]
    async fn test_concurrent_analyses_share_one_summary() {
        let h = harness(10, false).await;
        seed_text(&h.store, "98", "A Long Book", &long_text()).await;

        let (first, second) = tokio::join!(
            h.app
                .clone()
                .oneshot(form_post("/analyze/98", "analysis_type=summary")),
            h.app
                .clone()
                .oneshot(form_post("/analyze/98", "analysis_type=sentiment")),
        );
        assert_eq!(first.unwrap().status(), StatusCode::OK);
        assert_eq!(second.unwrap().status(), StatusCode::OK);

        assert_eq!(h.summary_calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.calls.load(Ordering::SeqCst), 4);
        assert_eq!(stats(&h.app).await["metrics"]["summaries_computed"], 1);
    }

    #[tokio::test]
    async fn test_book_without_text_is_internal_error() {
        let h = harness(10, false).await;
        let id = seed_text(&h.store, "98", "Empty", "").await;

        let response = h
            .app
            .oneshot(form_post("/analyze/98", "analysis_type=summary"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);
        assert!(h.store.analyses_for(&id).await.unwrap().is_empty());
    }
}
