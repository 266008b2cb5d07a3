use tracing::debug;

use crate::text;

/// One sentence-aligned slice of a transcript, sized for a single
/// revision call.
#[derive(Debug, Clone)]
pub struct TextChunk {
    /// Zero-based position within the transcript
    pub index: usize,
    /// The sentence-bounded slice itself
    pub raw_text: String,
    /// `raw_text` plus neighboring context on each side; sent to the
    /// revision provider, never part of the final output
    pub augmented_text: String,
    /// Byte length of the preceding-context prefix in `augmented_text`.
    /// Locates `raw_text` inside it even when a chunk repeats its
    /// neighbor's tail word for word.
    pub context_before_len: usize,
}

/// Splits long text into chunks under a character budget, breaking only
/// at sentence boundaries.
pub struct SentenceChunker {
    max_chunk_chars: usize,
}

impl SentenceChunker {
    pub fn new(max_chunk_chars: usize) -> Self {
        Self {
            max_chunk_chars: max_chunk_chars.max(1),
        }
    }

    /// Greedily pack sentences into chunks of at most `max_chunk_chars`
    /// characters. The budget is soft: a single sentence longer than the
    /// budget becomes its own oversized chunk rather than being cut
    /// mid-sentence. Whitespace between sentences is normalized to one
    /// space.
    pub fn split(&self, transcript: &str) -> Vec<String> {
        let sentences = text::split_sentences(transcript);
        if sentences.is_empty() {
            return Vec::new();
        }

        let mut chunks = Vec::new();
        let mut buffer = String::new();
        let mut buffer_chars = 0usize;

        for sentence in sentences {
            let sentence_chars = sentence.chars().count();

            if !buffer.is_empty() && buffer_chars + 1 + sentence_chars > self.max_chunk_chars {
                chunks.push(std::mem::take(&mut buffer));
                buffer_chars = 0;
            }

            if buffer.is_empty() {
                buffer.push_str(sentence);
                buffer_chars = sentence_chars;
            } else {
                buffer.push(' ');
                buffer.push_str(sentence);
                buffer_chars += 1 + sentence_chars;
            }
        }

        if !buffer.is_empty() {
            chunks.push(buffer);
        }

        debug!(
            "split {} chars into {} chunks (budget {})",
            transcript.chars().count(),
            chunks.len(),
            self.max_chunk_chars
        );

        chunks
    }
}

/// Wraps each chunk with trailing/leading snippets of its neighbors so a
/// revision call sees the surrounding text across the cut.
pub struct ContextOverlapAugmenter {
    overlap_chars: usize,
}

impl ContextOverlapAugmenter {
    pub fn new(overlap_chars: usize) -> Self {
        Self { overlap_chars }
    }

    pub fn augment(&self, raw_chunks: Vec<String>) -> Vec<TextChunk> {
        let total = raw_chunks.len();
        (0..total)
            .map(|index| {
                let mut augmented = String::new();
                if index > 0 {
                    augmented.push_str(text::char_suffix(&raw_chunks[index - 1], self.overlap_chars));
                }
                let context_before_len = augmented.len();
                augmented.push_str(&raw_chunks[index]);
                if index + 1 < total {
                    augmented.push_str(text::char_prefix(&raw_chunks[index + 1], self.overlap_chars));
                }
                TextChunk {
                    index,
                    raw_text: raw_chunks[index].clone(),
                    augmented_text: augmented,
                    context_before_len,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_scenario_from_short_budget() {
        let chunker = SentenceChunker::new(15);
        let chunks = chunker.split("Hello world. This is a test.");
        assert_eq!(chunks, vec!["Hello world.", "This is a test."]);
    }

    #[test]
    fn test_split_round_trip() {
        let original = "One sentence here. Another one follows! A question too? Final words.";
        let chunker = SentenceChunker::new(30);
        let chunks = chunker.split(original);
        assert!(chunks.len() > 1);
        assert_eq!(chunks.join(" "), original);
    }

    #[test]
    fn test_split_never_cuts_inside_sentence() {
        let chunker = SentenceChunker::new(25);
        let chunks = chunker.split("Short. A fairly long sentence lives here. End.");
        for chunk in &chunks {
            assert!(
                chunk.ends_with('.') || chunk.ends_with('!') || chunk.ends_with('?'),
                "chunk {:?} should end on a sentence boundary",
                chunk
            );
        }
    }

    #[test]
    fn test_oversized_sentence_becomes_own_chunk() {
        let long_sentence = "This one sentence is far longer than the configured budget allows.";
        let input = format!("Tiny. {} Tiny again.", long_sentence);
        let chunker = SentenceChunker::new(20);
        let chunks = chunker.split(&input);
        assert!(chunks.contains(&long_sentence.to_string()));
    }

    #[test]
    fn test_split_empty_input() {
        let chunker = SentenceChunker::new(100);
        assert!(chunker.split("").is_empty());
        assert!(chunker.split("  \n ").is_empty());
    }

    #[test]
    fn test_split_single_chunk_when_under_budget() {
        let chunker = SentenceChunker::new(1000);
        let chunks = chunker.split("All of this. Fits in one chunk.");
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_augment_adds_neighbor_context() {
        let augmenter = ContextOverlapAugmenter::new(5);
        let chunks = augmenter.augment(vec![
            "abcdefgh".to_string(),
            "ijklmnop".to_string(),
            "qrstuvwx".to_string(),
        ]);

        assert_eq!(chunks[0].augmented_text, "abcdefghijklm");
        assert_eq!(chunks[1].augmented_text, "defghijklmnopqrstu");
        assert_eq!(chunks[2].augmented_text, "lmnopqrstuvwx");

        // Raw text is untouched by augmentation
        assert_eq!(chunks[1].raw_text, "ijklmnop");
        assert_eq!(chunks[1].index, 1);

        // The recorded prefix length points at the raw text
        assert_eq!(chunks[0].context_before_len, 0);
        assert_eq!(chunks[1].context_before_len, 5);
        assert_eq!(chunks[2].context_before_len, 5);
        let c = &chunks[1];
        assert_eq!(
            &c.augmented_text[c.context_before_len..c.context_before_len + c.raw_text.len()],
            c.raw_text
        );
    }

    #[test]
    fn test_augment_single_chunk_unchanged() {
        let augmenter = ContextOverlapAugmenter::new(100);
        let chunks = augmenter.augment(vec!["only one".to_string()]);
        assert_eq!(chunks[0].augmented_text, "only one");
    }

    #[test]
    fn test_augment_short_neighbors_fully_included() {
        let augmenter = ContextOverlapAugmenter::new(100);
        let chunks = augmenter.augment(vec!["ab".to_string(), "cd".to_string()]);
        assert_eq!(chunks[0].augmented_text, "abcd");
        assert_eq!(chunks[1].augmented_text, "abcd");
    }
}
