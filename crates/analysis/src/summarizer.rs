use anyhow::{bail, Result};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::chunker::{estimate_tokens, Chunker, ChunkerConfig};
use crate::client::LanguageModel;
use crate::prompts::{build_chunk_prompt, SUMMARY_SYSTEM_PROMPT};

#[derive(Debug, Clone, Copy)]
pub struct SummarizerConfig {
    /// Target size of the condensed text, also the chunk size
    pub max_tokens: usize,
    /// Completion budget for each chunk summary
    pub chunk_summary_tokens: u32,
    pub max_rounds: usize,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            max_tokens: 5000,
            chunk_summary_tokens: 500,
            max_rounds: 8,
        }
    }
}

/// Condenses a long text by summarizing its chunks and repeating on the
/// joined summaries until the result fits.
pub struct RecursiveSummarizer {
    model: Arc<dyn LanguageModel>,
    chunker: Chunker,
    config: SummarizerConfig,
}

impl RecursiveSummarizer {
    pub fn new(model: Arc<dyn LanguageModel>, config: SummarizerConfig) -> Self {
        Self {
            model,
            chunker: Chunker::new(ChunkerConfig {
                max_tokens: config.max_tokens,
            }),
            config,
        }
    }

    pub fn config(&self) -> &SummarizerConfig {
        &self.config
    }

    pub async fn condense(&self, text: &str) -> Result<String> {
        let start = Instant::now();
        let mut current = text.trim().to_string();
        let mut round = 0;

        while estimate_tokens(&current) > self.config.max_tokens {
            if round == self.config.max_rounds {
                warn!(
                    rounds = round,
                    tokens = estimate_tokens(&current),
                    "Stopping summarization at round limit"
                );
                break;
            }
            round += 1;

            let before = estimate_tokens(&current);
            let chunks = self.chunker.pack(self.chunker.chunk_text(&current));
            let chunk_count = chunks.len();
            let summaries = self.summarize_chunks(chunks).await;

            let succeeded = summaries.iter().filter(|s| s.is_some()).count();
            if succeeded == 0 {
                bail!(
                    "Summarization round {} failed for all {} chunks",
                    round,
                    chunk_count
                );
            }

            current = summaries.into_iter().flatten().collect::<Vec<_>>().join("\n\n");
            let after = estimate_tokens(&current);

            info!(
                round,
                chunks = chunk_count,
                failed = chunk_count - succeeded,
                tokens_before = before,
                tokens_after = after,
                "Summarization round complete"
            );

            if after >= before {
                warn!(round, tokens = after, "Summarization made no progress");
                break;
            }
        }

        info!(
            rounds = round,
            tokens = estimate_tokens(&current),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Text condensed"
        );
        Ok(current)
    }

    /// Summaries in chunk order; `None` marks a chunk whose request failed
    /// or came back blank.
    async fn summarize_chunks(&self, chunks: Vec<String>) -> Vec<Option<String>> {
        let mut results = vec![None; chunks.len()];
        let mut tasks = JoinSet::new();

        for (idx, chunk) in chunks.into_iter().enumerate() {
            let model = Arc::clone(&self.model);
            let max_tokens = self.config.chunk_summary_tokens;
            tasks.spawn(async move {
                let prompt = build_chunk_prompt(&chunk);
                let result = model
                    .complete(SUMMARY_SYSTEM_PROMPT, &prompt, max_tokens)
                    .await;
                (idx, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, Ok(summary))) => {
                    let summary = summary.trim();
                    if summary.is_empty() {
                        warn!(chunk = idx, "Chunk summary was empty, skipping");
                    } else {
                        results[idx] = Some(summary.to_string());
                    }
                }
                Ok((idx, Err(e))) => {
                    warn!(chunk = idx, error = %e, "Chunk summary failed, skipping");
                }
                Err(e) => warn!(error = %e, "Chunk summary task panicked"),
            }
        }

        results
    }
}
