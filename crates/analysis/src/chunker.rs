use unicode_segmentation::UnicodeSegmentation;

/// Estimate token count (rough: 1.3 tokens per word)
pub fn estimate_tokens(text: &str) -> usize {
    tokens_for_words(word_count(text))
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

// Estimates are not additive, so sizes are summed in words and converted once.
fn tokens_for_words(words: usize) -> usize {
    (words as f64 * 1.3) as usize
}

#[derive(Debug, Clone, Copy)]
pub struct ChunkerConfig {
    pub max_tokens: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self { max_tokens: 5000 }
    }
}

/// Splits text into token-bounded chunks, paragraphs first and sentences as
/// a fallback for paragraphs that are too large on their own.
pub struct Chunker {
    config: ChunkerConfig,
}

#[derive(Default)]
struct Buffer {
    text: String,
    words: usize,
}

impl Buffer {
    fn push(&mut self, piece: &str, words: usize, separator: &str) {
        if !self.text.is_empty() {
            self.text.push_str(separator);
        }
        self.text.push_str(piece);
        self.words += words;
    }

    /// Whether `words` more would overflow a non-empty buffer.
    fn overflows(&self, words: usize, max_tokens: usize) -> bool {
        !self.text.is_empty() && tokens_for_words(self.words + words) > max_tokens
    }

    fn take(&mut self) -> String {
        self.words = 0;
        std::mem::take(&mut self.text)
    }
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    pub fn max_tokens(&self) -> usize {
        self.config.max_tokens
    }

    pub fn chunk_text(&self, text: &str) -> Vec<String> {
        let max = self.config.max_tokens;
        let mut chunks = Vec::new();
        let mut buffer = Buffer::default();

        for para in self.split_by_paragraphs(text) {
            let para_words = word_count(para);

            if tokens_for_words(para_words) > max {
                for sentence in para.unicode_sentences().map(str::trim).filter(|s| !s.is_empty()) {
                    let sentence_words = word_count(sentence);
                    if buffer.overflows(sentence_words, max) {
                        chunks.push(buffer.take());
                    }
                    buffer.push(sentence, sentence_words, " ");
                }
                continue;
            }

            // If adding this paragraph exceeds max, flush buffer
            if buffer.overflows(para_words, max) {
                chunks.push(buffer.take());
            }
            buffer.push(para, para_words, "\n\n");
        }

        if !buffer.text.is_empty() {
            chunks.push(buffer.take());
        }

        chunks
    }

    /// Merge adjacent chunks while the combined estimate stays within the limit.
    pub fn pack(&self, chunks: Vec<String>) -> Vec<String> {
        let mut packed = Vec::new();
        let mut current = Buffer::default();

        for chunk in chunks {
            let words = word_count(&chunk);
            if current.overflows(words, self.config.max_tokens) {
                packed.push(current.take());
            }
            current.push(&chunk, words, "\n\n");
        }

        if !current.text.trim().is_empty() {
            packed.push(current.take());
        }
        packed
    }

    fn split_by_paragraphs<'a>(&self, text: &'a str) -> Vec<&'a str> {
        text.split("\n\n")
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize, word: &str) -> String {
        vec![word; n].join(" ")
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("one two three four five six seven eight nine ten"), 13);
    }

    #[test]
    fn test_small_text_is_single_chunk() {
        let chunker = Chunker::new(ChunkerConfig::default());
        let text = "This is a test paragraph.\n\nThis is another paragraph.";
        let chunks = chunker.chunk_text(text);

        assert_eq!(chunks, vec![text.to_string()]);
    }

    #[test]
    fn test_paragraphs_split_at_limit() {
        let chunker = Chunker::new(ChunkerConfig { max_tokens: 30 });
        // 20 words = 26 tokens each, so no two paragraphs fit together
        let text = format!("{}\n\n{}\n\n\n\n{}", words(20, "a"), words(20, "b"), words(20, "c"));
        let chunks = chunker.chunk_text(&text);

        assert_eq!(chunks.len(), 3);
        assert!(chunks[0].starts_with("a a"));
        assert!(chunks[2].starts_with("c c"));
        assert!(chunks.iter().all(|c| estimate_tokens(c) <= 30));
    }

    #[test]
    fn test_oversized_paragraph_falls_back_to_sentences() {
        let chunker = Chunker::new(ChunkerConfig { max_tokens: 20 });
        // 10 words (13 tokens) per sentence; capitals mark the sentence boundaries
        let sentence = format!("Word {}.", words(9, "word"));
        let para = vec![sentence.as_str(); 4].join(" ");
        let chunks = chunker.chunk_text(&para);

        assert_eq!(chunks.len(), 4);
        assert!(chunks.iter().all(|c| c.ends_with('.')));
        assert!(chunks.iter().all(|c| !c.is_empty()));
    }

    #[test]
    fn test_single_oversized_sentence_kept_whole() {
        let chunker = Chunker::new(ChunkerConfig { max_tokens: 5 });
        let chunks = chunker.chunk_text(&words(50, "long"));
        assert_eq!(chunks.len(), 1);
        assert_eq!(estimate_tokens(&chunks[0]), 65);
    }

    #[test]
    fn test_blank_input_yields_nothing() {
        let chunker = Chunker::new(ChunkerConfig::default());
        assert!(chunker.chunk_text("  \n\n \n\n").is_empty());
    }

    #[test]
    fn test_short_paragraphs_stay_within_limit() {
        let chunker = Chunker::new(ChunkerConfig { max_tokens: 30 });
        let text = vec!["one two three"; 10].join("\n\n");
        let chunks = chunker.chunk_text(&text);

        // 23 words estimate to 29 tokens, 24 would be 31
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| estimate_tokens(c) <= 30));

        let verse = ["O", "Captain! my", "Captain! our fearful"].repeat(20).join("\n\n");
        let chunks = chunker.chunk_text(&verse);
        assert!(chunks.iter().all(|c| estimate_tokens(c) <= 30));
        assert_eq!(chunks.join("\n\n"), verse);

        let packed = chunker.pack(chunks);
        assert!(packed.iter().all(|c| estimate_tokens(c) <= 30));
    }

    #[test]
    fn test_pack_merges_small_chunks() {
        let chunker = Chunker::new(ChunkerConfig { max_tokens: 30 });
        let packed = chunker.pack(vec![words(5, "x"), words(5, "y"), words(20, "z")]);

        assert_eq!(packed.len(), 2);
        assert_eq!(packed[0], format!("{}\n\n{}", words(5, "x"), words(5, "y")));
    }
}
