use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Hosted chat-completion provider. All of them speak the OpenAI wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmType {
    #[serde(rename = "openai")]
    OpenAi,
    Groq,
    Samba,
}

/// Sampling parameters sent with every request for a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Sampling {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub frequency_penalty: Option<f32>,
    pub presence_penalty: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown LLM type {0:?} (expected one of: openai, groq, samba)")]
pub struct UnknownLlmType(pub String);

impl LlmType {
    pub const ALL: [LlmType; 3] = [LlmType::OpenAi, LlmType::Groq, LlmType::Samba];

    pub fn as_str(&self) -> &'static str {
        match self {
            LlmType::OpenAi => "openai",
            LlmType::Groq => "groq",
            LlmType::Samba => "samba",
        }
    }

    /// Base URL of the provider's OpenAI-compatible API
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            LlmType::OpenAi => "https://api.openai.com/v1",
            LlmType::Groq => "https://api.groq.com/openai/v1",
            LlmType::Samba => "https://api.sambanova.ai/v1",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            LlmType::OpenAi => "gpt-3.5-turbo",
            LlmType::Groq => "llama3-8b-8192",
            LlmType::Samba => "Meta-Llama-3.1-8B-Instruct",
        }
    }

    pub fn sampling(&self) -> Sampling {
        match self {
            LlmType::OpenAi => Sampling {
                temperature: Some(0.7),
                top_p: Some(1.0),
                frequency_penalty: Some(0.0),
                presence_penalty: Some(0.0),
            },
            LlmType::Groq | LlmType::Samba => Sampling::default(),
        }
    }
}

impl FromStr for LlmType {
    type Err = UnknownLlmType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(LlmType::OpenAi),
            "groq" => Ok(LlmType::Groq),
            "samba" | "sambanova" => Ok(LlmType::Samba),
            _ => Err(UnknownLlmType(s.to_string())),
        }
    }
}

impl fmt::Display for LlmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
