pub mod chunker;
pub mod client;
pub mod error;
pub mod prompts;
pub mod provider;
pub mod retry;
pub mod summarizer;

pub use chunker::{estimate_tokens, Chunker, ChunkerConfig};
pub use client::{ChatClient, LanguageModel, LlmConfig, DEFAULT_MAX_TOKENS};
pub use error::LlmError;
pub use prompts::AnalysisType;
pub use provider::{LlmType, UnknownLlmType};
pub use retry::RetryPolicy;
pub use summarizer::{RecursiveSummarizer, SummarizerConfig};

use anyhow::{bail, Context, Result};
use catalog::Book;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy)]
pub struct AnalyzerConfig {
    pub summarizer: SummarizerConfig,
    /// Completion budget for the final analysis answer
    pub analysis_max_tokens: u32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            summarizer: SummarizerConfig::default(),
            analysis_max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

/// Condenses books and runs analyses against the condensed text.
pub struct Analyzer {
    model: Arc<dyn LanguageModel>,
    summarizer: RecursiveSummarizer,
    analysis_max_tokens: u32,
}

impl Analyzer {
    pub fn new(model: Arc<dyn LanguageModel>, config: AnalyzerConfig) -> Self {
        Self {
            summarizer: RecursiveSummarizer::new(Arc::clone(&model), config.summarizer),
            model,
            analysis_max_tokens: config.analysis_max_tokens,
        }
    }

    pub fn llm_type(&self) -> LlmType {
        self.model.kind()
    }

    /// Produce the condensed text a book's analyses are run against.
    pub async fn condense(&self, book: &Book) -> Result<String> {
        if book.text.trim().is_empty() {
            bail!("Book {} has no text to summarize", book.book_id);
        }

        info!(
            book_id = %book.book_id,
            words = book.word_count(),
            llm = %self.llm_type(),
            "Condensing book"
        );

        self.summarizer
            .condense(&book.text)
            .await
            .with_context(|| format!("Failed to condense book {}", book.book_id))
    }

    pub async fn analyze(&self, summarized_text: &str, analysis: AnalysisType) -> Result<String> {
        let prompt = analysis.build_prompt(summarized_text);
        let result = self
            .model
            .complete(prompts::ANALYSIS_SYSTEM_PROMPT, &prompt, self.analysis_max_tokens)
            .await
            .with_context(|| format!("{} analysis failed", analysis.label()))?;

        info!(
            analysis = %analysis,
            llm = %self.llm_type(),
            chars = result.len(),
            "Analysis complete"
        );
        Ok(result)
    }
}
