use regex::{Regex, RegexBuilder};
use std::sync::OnceLock;
use tracing::warn;

fn start_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\*\*\*\s?START OF TH(?:IS|E) PROJECT GUTENBERG EBOOK.*?\*\*\*")
            .expect("start marker pattern")
    })
}

fn end_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // The `***` opening the marker line belongs to the marker, not the body
        Regex::new(r"(?i)(?:\*\*\*\s?)?end of th(?:is|e) project gutenberg ebook")
            .expect("end marker pattern")
    })
}

/// Case-insensitive literal search, returning the byte offset just past the match.
fn find_literal_end(haystack: &str, needle: &str) -> Option<usize> {
    let needle = needle.trim();
    if needle.is_empty() {
        return None;
    }
    let re = RegexBuilder::new(&regex::escape(needle))
        .case_insensitive(true)
        .build()
        .ok()?;
    re.find(haystack).map(|m| m.end())
}

/// Strip the Project Gutenberg header and licence from a raw plain-text ebook.
///
/// The body starts after the `*** START OF THE PROJECT GUTENBERG EBOOK ... ***`
/// marker, skipping past the first occurrence of the title and then the author
/// when they appear, and ends before the `END OF THE PROJECT GUTENBERG EBOOK`
/// line. When either marker is missing the raw text is returned unchanged.
pub fn extract_body(title: Option<&str>, author: Option<&str>, raw: &str) -> String {
    let Some(start) = start_marker().find(raw) else {
        warn!("start marker not found in ebook text");
        return raw.to_string();
    };
    let mut start_pos = start.end();

    if let Some(title_end) = title.and_then(|t| find_literal_end(&raw[start_pos..], t)) {
        start_pos += title_end;
        if let Some(author_end) = author.and_then(|a| find_literal_end(&raw[start_pos..], a)) {
            start_pos += author_end;
        }
    }

    let Some(end) = end_marker().find(&raw[start_pos..]) else {
        warn!("end marker not found in ebook text");
        return raw.to_string();
    };

    raw[start_pos..start_pos + end.start()].trim().to_string()
}
