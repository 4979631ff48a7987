//! Askama template structs for the web interface.
//!
//! Each struct corresponds to an HTML template in the templates/ directory.
//! Values are pre-formatted strings so the templates stay logic-free.

use analysis::AnalysisType;
use askama::Template;
use catalog::Book;
use storage::{BookSummary, StoredAnalysis};

const EXCERPT_CHARS: usize = 1200;

/// Helper struct for the book detail views.
pub struct BookView {
    pub book_id: String,
    pub title: String,
    pub authors: String,
    pub publisher: String,
    pub has_publisher: bool,
    pub issued: String,
    pub has_issued: bool,
    pub languages: String,
    pub subjects: String,
    pub has_subjects: bool,
    pub rights: String,
    pub has_rights: bool,
    pub word_count: usize,
    pub excerpt: String,
    pub has_summary: bool,
}

impl From<&Book> for BookView {
    fn from(book: &Book) -> Self {
        let publisher = book.publisher.clone().unwrap_or_default();
        let issued = book.issued.clone().unwrap_or_default();
        let rights = book.rights.clone().unwrap_or_default();
        Self {
            book_id: book.book_id.to_string(),
            title: book.display_title(),
            authors: or_unknown(&book.authors),
            has_publisher: !publisher.is_empty(),
            publisher,
            has_issued: !issued.is_empty(),
            issued,
            languages: or_unknown(&book.languages),
            has_subjects: !book.subjects.is_empty(),
            subjects: book.subjects.clone(),
            has_rights: !rights.is_empty(),
            rights,
            word_count: book.word_count(),
            excerpt: excerpt(&book.text),
            has_summary: book
                .summarized_text
                .as_deref()
                .is_some_and(|s| !s.trim().is_empty()),
        }
    }
}

/// Helper struct for rows on the library page.
pub struct BookRow {
    pub book_id: String,
    pub title: String,
    pub authors: String,
    pub languages: String,
}

impl From<BookSummary> for BookRow {
    fn from(summary: BookSummary) -> Self {
        let title = match summary.title.as_deref().map(str::trim) {
            Some(title) if !title.is_empty() => title.to_string(),
            _ => format!("Ebook #{}", summary.book_id),
        };
        Self {
            book_id: summary.book_id.to_string(),
            title,
            authors: or_unknown(&summary.authors),
            languages: summary.languages,
        }
    }
}

/// Helper struct for previously stored analyses.
pub struct AnalysisRow {
    pub label: String,
    pub llm_type: String,
    pub result: String,
    pub created_at: String,
}

impl From<StoredAnalysis> for AnalysisRow {
    fn from(analysis: StoredAnalysis) -> Self {
        let kind: AnalysisType = analysis
            .analysis_type
            .parse()
            .unwrap_or(AnalysisType::Custom);
        Self {
            label: kind.label().to_string(),
            llm_type: analysis.llm_type,
            result: analysis.result,
            created_at: analysis.created_at,
        }
    }
}

/// Helper struct for the analysis picker.
pub struct AnalysisOption {
    pub value: &'static str,
    pub label: &'static str,
}

pub fn analysis_options() -> Vec<AnalysisOption> {
    AnalysisType::ALL
        .iter()
        .map(|kind| AnalysisOption {
            value: kind.as_str(),
            label: kind.label(),
        })
        .collect()
}

#[derive(Template)]
#[template(path = "home.html")]
pub struct HomeTemplate {
    pub book_count: usize,
    pub llm_type: String,
}

#[derive(Template)]
#[template(path = "books.html")]
pub struct BooksTemplate {
    pub books: Vec<BookRow>,
    pub query: String,
    pub has_query: bool,
}

#[derive(Template)]
#[template(path = "book_detail.html")]
pub struct BookPageTemplate {
    pub book: BookView,
    pub analyses: Vec<AnalysisRow>,
    pub options: Vec<AnalysisOption>,
}

/// Book card returned to the lookup form.
#[derive(Template)]
#[template(path = "fragments/book_detail.html")]
pub struct BookFragmentTemplate {
    pub book: BookView,
    pub from_store: bool,
    pub options: Vec<AnalysisOption>,
}

#[derive(Template)]
#[template(path = "fragments/analysis.html")]
pub struct AnalysisFragmentTemplate {
    pub result: String,
}

/// Error page template.
#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate<'a> {
    pub title: &'a str,
    pub message: &'a str,
}

fn or_unknown(value: &str) -> String {
    if value.trim().is_empty() {
        "Unknown".to_string()
    } else {
        value.to_string()
    }
}

fn excerpt(text: &str) -> String {
    let mut chars = text.char_indices();
    match chars.nth(EXCERPT_CHARS) {
        Some((idx, _)) => format!("{}…", text[..idx].trim_end()),
        None => text.to_string(),
    }
}
