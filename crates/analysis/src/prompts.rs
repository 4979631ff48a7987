use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// System prompt for condensing book chunks.
pub const SUMMARY_SYSTEM_PROMPT: &str = "You are a helpful and expert assistant in literary analysis. \
You can summarize texts, determine sentiment, and identify key characters. \
Respond concisely and accurately.";

/// System prompt for the final user-facing analysis.
pub const ANALYSIS_SYSTEM_PROMPT: &str = "You are a helpful and expert assistant in literary analysis. \
You can summarize texts, determine sentiment, and identify key characters. \
Respond concisely and accurately. Make sure not to include any introductory \
phrases such as \"Here is a summary\" or \"The following is a summary.\"";

pub fn build_chunk_prompt(chunk: &str) -> String {
    format!(
        "Summarize the following passage of a book. Keep the key events, \
characters and tone, and leave out commentary.\n\n{}",
        chunk
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    Summary,
    Sentiment,
    KeyCharacters,
    Custom,
}

impl AnalysisType {
    pub const ALL: [AnalysisType; 4] = [
        AnalysisType::Summary,
        AnalysisType::Sentiment,
        AnalysisType::KeyCharacters,
        AnalysisType::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisType::Summary => "summary",
            AnalysisType::Sentiment => "sentiment",
            AnalysisType::KeyCharacters => "key_characters",
            AnalysisType::Custom => "custom",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AnalysisType::Summary => "Summary",
            AnalysisType::Sentiment => "Sentiment",
            AnalysisType::KeyCharacters => "Key characters",
            AnalysisType::Custom => "General analysis",
        }
    }

    pub fn build_prompt(&self, text: &str) -> String {
        let instruction = match self {
            AnalysisType::Summary => "Provide a concise summary of the following text:",
            AnalysisType::Sentiment => "Analyze the sentiment of the following text:",
            AnalysisType::KeyCharacters => "Identify the key characters in the following text:",
            AnalysisType::Custom => "Analyze the following text:",
        };
        format!("{}\n\n{}", instruction, text)
    }
}

/// Unknown analysis names fall back to the general analysis.
impl FromStr for AnalysisType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "summary" => AnalysisType::Summary,
            "sentiment" => AnalysisType::Sentiment,
            "key_characters" | "key-characters" | "characters" => AnalysisType::KeyCharacters,
            _ => AnalysisType::Custom,
        })
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
