use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Project Gutenberg ebook number, e.g. `1342`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BookId(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid ebook number: {0:?}")]
pub struct InvalidBookId(pub String);

impl BookId {
    const MAX_DIGITS: usize = 10;

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for BookId {
    type Err = InvalidBookId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty()
            || trimmed.len() > Self::MAX_DIGITS
            || !trimmed.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(InvalidBookId(s.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl TryFrom<String> for BookId {
    type Error = InvalidBookId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BookId> for String {
    fn from(id: BookId) -> Self {
        id.0
    }
}

impl fmt::Display for BookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bibliographic record for one ebook. Multi-valued fields are pre-joined.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookMetadata {
    pub title: Option<String>,
    /// Author names joined with `" | "`
    pub authors: String,
    pub publisher: Option<String>,
    pub issued: Option<String>,
    /// Language codes joined with `", "`
    pub languages: String,
    /// Subject headings joined with `", "`
    pub subjects: String,
    pub rights: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub book_id: BookId,
    pub title: Option<String>,
    pub authors: String,
    pub publisher: Option<String>,
    pub issued: Option<String>,
    pub languages: String,
    pub subjects: String,
    pub rights: Option<String>,
    /// Main text with the Gutenberg header and licence removed
    pub text: String,
    /// Condensed text used as analysis input, filled in lazily
    pub summarized_text: Option<String>,
}

impl Book {
    pub fn from_parts(book_id: BookId, text: String, metadata: BookMetadata) -> Self {
        Self {
            book_id,
            title: metadata.title,
            authors: metadata.authors,
            publisher: metadata.publisher,
            issued: metadata.issued,
            languages: metadata.languages,
            subjects: metadata.subjects,
            rights: metadata.rights,
            text,
            summarized_text: None,
        }
    }

    pub fn display_title(&self) -> String {
        match self.title.as_deref().map(str::trim) {
            Some(title) if !title.is_empty() => title.to_string(),
            _ => format!("Ebook #{}", self.book_id),
        }
    }

    /// Rough word count of the stored text
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}
