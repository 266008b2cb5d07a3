use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::chunking::TextChunk;
use crate::config::RevisionConfig;
use crate::providers::RevisionClient;

/// Result of revising one chunk
#[derive(Debug, Clone)]
pub struct RevisionOutcome {
    pub index: usize,
    pub text: String,
    /// True when the provider call failed or produced implausible output
    /// and the original chunk text was kept instead
    pub used_fallback: bool,
}

/// Runs the revision provider over all augmented chunks in bounded
/// batches, falling back to the original chunk text per unit.
pub struct ChunkEnhancer {
    client: Arc<dyn RevisionClient>,
    batch_size: usize,
    min_plausible_ratio: f64,
    fenced_block: Regex,
    result_tag: Regex,
    result_label: Regex,
}

impl ChunkEnhancer {
    pub fn new(client: Arc<dyn RevisionClient>, config: &RevisionConfig) -> Self {
        Self {
            client,
            batch_size: config.batch_size.max(1),
            min_plausible_ratio: config.min_plausible_ratio,
            fenced_block: Regex::new(r"(?s)```(?:[a-zA-Z]*\n)?(.*?)```").expect("static regex"),
            result_tag: Regex::new(r"(?is)<result>(.*?)</result>").expect("static regex"),
            result_label: Regex::new(r"(?is)^\s*(?:revised\s+text|result|output)\s*:\s*(.*)$")
                .expect("static regex"),
        }
    }

    /// Revise every chunk, `batch_size` calls in flight per batch, each
    /// batch fully awaited before the next starts. Output is one outcome
    /// per chunk in chunk-index order; a failed or implausible revision
    /// resolves to the original `raw_text` with `used_fallback` set.
    pub async fn enhance(&self, chunks: &[TextChunk], language: &str) -> Vec<RevisionOutcome> {
        let total = chunks.len();
        let mut slots: Vec<Option<RevisionOutcome>> = Vec::with_capacity(total);
        slots.resize_with(total, || None);

        for batch in chunks.chunks(self.batch_size) {
            let calls = batch.iter().map(|chunk| {
                let client = Arc::clone(&self.client);
                let prompt = self.build_prompt(chunk, total, language);
                async move {
                    let response = client.revise(&prompt).await;
                    (chunk, response)
                }
            });

            for (chunk, response) in futures::future::join_all(calls).await {
                slots[chunk.index] = Some(self.resolve(chunk, response));
            }
        }

        let outcomes: Vec<RevisionOutcome> = slots.into_iter().flatten().collect();

        let fallbacks = outcomes.iter().filter(|o| o.used_fallback).count();
        if fallbacks > 0 {
            warn!("{}/{} chunks kept their original text", fallbacks, total);
        } else {
            info!("all {} chunks revised", total);
        }

        outcomes
    }

    fn resolve(
        &self,
        chunk: &TextChunk,
        response: Result<String, crate::error::ProviderError>,
    ) -> RevisionOutcome {
        match response {
            Ok(raw) => {
                let extracted = self.extract_revised(&raw);
                if self.is_plausible(&chunk.raw_text, &extracted) {
                    RevisionOutcome {
                        index: chunk.index,
                        text: extracted,
                        used_fallback: false,
                    }
                } else {
                    debug!(
                        "implausible revision for chunk {} ({} -> {} chars), keeping original",
                        chunk.index,
                        chunk.raw_text.chars().count(),
                        extracted.chars().count()
                    );
                    RevisionOutcome {
                        index: chunk.index,
                        text: chunk.raw_text.clone(),
                        used_fallback: true,
                    }
                }
            }
            Err(e) => {
                warn!("revision of chunk {} failed: {}", chunk.index, e);
                RevisionOutcome {
                    index: chunk.index,
                    text: chunk.raw_text.clone(),
                    used_fallback: true,
                }
            }
        }
    }

    /// Build the revision prompt. The neighbor context carried by
    /// `augmented_text` is presented as read-only surroundings so the
    /// provider revises the chunk itself and nothing else; that keeps the
    /// context out of the final output.
    fn build_prompt(&self, chunk: &TextChunk, total: usize, language: &str) -> String {
        let (before, after) = split_context(chunk);

        let mut prompt = format!(
            "You are revising part {} of {} of an automatic speech transcription \
             in {}. Improve fluency, punctuation and obvious recognition errors \
             without changing the meaning or dropping content.\n",
            chunk.index + 1,
            total,
            language,
        );
        if !before.is_empty() {
            prompt.push_str(&format!(
                "\nPreceding context (do not include in your answer):\n{}\n",
                before
            ));
        }
        prompt.push_str(&format!("\nText to revise:\n{}\n", chunk.raw_text));
        if !after.is_empty() {
            prompt.push_str(&format!(
                "\nFollowing context (do not include in your answer):\n{}\n",
                after
            ));
        }
        prompt.push_str("\nReply with ONLY the revised text inside a fenced code block.");
        prompt
    }

    /// Pull the revised text out of a free-form provider response.
    ///
    /// Tried in order: a fenced code block, a `<result>` tag, a
    /// "Result:"-style label, else the whole response minus a leading
    /// instruction-echo line.
    fn extract_revised(&self, response: &str) -> String {
        if let Some(captures) = self.fenced_block.captures(response) {
            return captures[1].trim().to_string();
        }
        if let Some(captures) = self.result_tag.captures(response) {
            return captures[1].trim().to_string();
        }
        if let Some(captures) = self.result_label.captures(response) {
            return captures[1].trim().to_string();
        }

        let trimmed = response.trim();
        if let Some((first_line, rest)) = trimmed.split_once('\n') {
            if first_line.trim_end().ends_with(':') {
                return rest.trim().to_string();
            }
        }
        trimmed.to_string()
    }

    fn is_plausible(&self, original: &str, revised: &str) -> bool {
        if revised.trim().is_empty() {
            return false;
        }
        let original_chars = original.chars().count() as f64;
        let revised_chars = revised.chars().count() as f64;
        revised_chars >= original_chars * self.min_plausible_ratio
    }
}

/// Split an augmented chunk back into its neighbor-context halves using
/// the prefix length recorded by the augmenter. Searching for the raw
/// text would be ambiguous when a chunk repeats its neighbor's tail, so
/// the recorded offset is authoritative; an inconsistent chunk is
/// treated as context-free.
fn split_context(chunk: &TextChunk) -> (&str, &str) {
    let start = chunk.context_before_len;
    let end = start + chunk.raw_text.len();
    match (
        chunk.augmented_text.get(..start),
        chunk.augmented_text.get(end..),
    ) {
        (Some(before), Some(after)) => (before, after),
        _ => ("", ""),
    }
}

/// Ordered concatenation of revision outcomes into the final text
pub fn assemble_upgraded_text(outcomes: &[RevisionOutcome]) -> String {
    outcomes
        .iter()
        .map(|o| o.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn chunk(index: usize, raw: &str) -> TextChunk {
        TextChunk {
            index,
            raw_text: raw.to_string(),
            augmented_text: raw.to_string(),
            context_before_len: 0,
        }
    }

    fn enhancer(client: Arc<dyn RevisionClient>) -> ChunkEnhancer {
        ChunkEnhancer::new(client, &RevisionConfig::default())
    }

    struct CannedClient {
        responses: Vec<Result<String, ProviderError>>,
        cursor: AtomicUsize,
    }

    impl CannedClient {
        fn new(responses: Vec<Result<String, ProviderError>>) -> Arc<Self> {
            Arc::new(Self {
                responses,
                cursor: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl RevisionClient for CannedClient {
        async fn revise(&self, _prompt: &str) -> Result<String, ProviderError> {
            let i = self.cursor.fetch_add(1, Ordering::SeqCst);
            match &self.responses[i % self.responses.len()] {
                Ok(s) => Ok(s.clone()),
                Err(_) => Err(ProviderError::EmptyResponse),
            }
        }
    }

    #[test]
    fn test_extract_fenced_block_first() {
        let e = enhancer(CannedClient::new(vec![]));
        let response = "Here is the revised text:\n```\nThe clean version.\n```\nHope it helps!";
        assert_eq!(e.extract_revised(response), "The clean version.");
    }

    #[test]
    fn test_extract_fenced_block_with_language_tag() {
        let e = enhancer(CannedClient::new(vec![]));
        let response = "```text\nInside the fence.\n```";
        assert_eq!(e.extract_revised(response), "Inside the fence.");
    }

    #[test]
    fn test_extract_result_tag() {
        let e = enhancer(CannedClient::new(vec![]));
        let response = "Sure. <result>Tagged output here.</result>";
        assert_eq!(e.extract_revised(response), "Tagged output here.");
    }

    #[test]
    fn test_extract_result_label() {
        let e = enhancer(CannedClient::new(vec![]));
        let response = "Result: The labelled revision text.";
        assert_eq!(e.extract_revised(response), "The labelled revision text.");
    }

    #[test]
    fn test_extract_strips_instruction_echo_line() {
        let e = enhancer(CannedClient::new(vec![]));
        let response = "Here is the improved transcription:\nJust the actual content.";
        assert_eq!(e.extract_revised(response), "Just the actual content.");
    }

    #[test]
    fn test_extract_plain_response_passes_through() {
        let e = enhancer(CannedClient::new(vec![]));
        assert_eq!(e.extract_revised("  Plain answer.  "), "Plain answer.");
    }

    #[test]
    fn test_prompt_separates_context_from_chunk() {
        let e = enhancer(CannedClient::new(vec![]));
        let chunk = TextChunk {
            index: 1,
            raw_text: "middle part.".to_string(),
            augmented_text: "left tail. middle part. right head".to_string(),
            context_before_len: 11,
        };
        let prompt = e.build_prompt(&chunk, 3, "en");
        assert!(prompt.contains("part 2 of 3"));
        assert!(prompt.contains("Preceding context (do not include in your answer):\nleft tail."));
        assert!(prompt.contains("Text to revise:\nmiddle part."));
        assert!(prompt.contains("Following context (do not include in your answer):\n right head"));
    }

    #[test]
    fn test_split_context_with_repeated_text() {
        // The chunk body repeats the neighbor tail verbatim; only the
        // recorded prefix length can place it correctly.
        let chunk = TextChunk {
            index: 1,
            raw_text: "again.".to_string(),
            augmented_text: "again. again. more".to_string(),
            context_before_len: 7,
        };
        let (before, after) = split_context(&chunk);
        assert_eq!(before, "again. ");
        assert_eq!(after, " more");
    }

    #[test]
    fn test_split_context_inconsistent_offset_drops_context() {
        let chunk = TextChunk {
            index: 0,
            raw_text: "longer than the augmented text".to_string(),
            augmented_text: "short".to_string(),
            context_before_len: 2,
        };
        assert_eq!(split_context(&chunk), ("", ""));
    }

    #[test]
    fn test_prompt_without_neighbors_has_no_context_sections() {
        let e = enhancer(CannedClient::new(vec![]));
        let c = chunk(0, "just the one chunk.");
        let prompt = e.build_prompt(&c, 1, "en");
        assert!(!prompt.contains("Preceding context"));
        assert!(!prompt.contains("Following context"));
        assert!(prompt.contains("Text to revise:\njust the one chunk."));
    }

    #[tokio::test]
    async fn test_enhance_happy_path() {
        let client = CannedClient::new(vec![Ok("```\nRevised sentence one, nicely.\n```".to_string())]);
        let e = enhancer(client);
        let chunks = vec![chunk(0, "revized sentense one nicely")];

        let outcomes = e.enhance(&chunks, "en").await;
        assert_eq!(outcomes.len(), 1);
        assert!(!outcomes[0].used_fallback);
        assert_eq!(outcomes[0].text, "Revised sentence one, nicely.");
    }

    #[tokio::test]
    async fn test_enhance_error_falls_back_to_original() {
        let client = CannedClient::new(vec![Err(ProviderError::EmptyResponse)]);
        let e = enhancer(client);
        let chunks = vec![chunk(0, "the original chunk text survives")];

        let outcomes = e.enhance(&chunks, "en").await;
        assert!(outcomes[0].used_fallback);
        assert_eq!(outcomes[0].text, "the original chunk text survives");
    }

    #[tokio::test]
    async fn test_enhance_short_output_falls_back() {
        // Under 50% of the original length trips the plausibility guard
        let client = CannedClient::new(vec![Ok("```\nok\n```".to_string())]);
        let e = enhancer(client);
        let chunks = vec![chunk(0, "a reasonably long original chunk of transcript text")];

        let outcomes = e.enhance(&chunks, "en").await;
        assert!(outcomes[0].used_fallback);
        assert_eq!(
            outcomes[0].text,
            "a reasonably long original chunk of transcript text"
        );
    }

    #[tokio::test]
    async fn test_enhance_empty_output_falls_back() {
        let client = CannedClient::new(vec![Ok("```\n\n```".to_string())]);
        let e = enhancer(client);
        let chunks = vec![chunk(0, "never vanish")];

        let outcomes = e.enhance(&chunks, "en").await;
        assert!(outcomes[0].used_fallback);
        assert_eq!(outcomes[0].text, "never vanish");
    }

    #[tokio::test]
    async fn test_enhance_failure_does_not_abort_batch() {
        let client = CannedClient::new(vec![
            Ok("```\nFirst chunk came back fine.\n```".to_string()),
            Err(ProviderError::EmptyResponse),
            Ok("```\nThird chunk came back fine.\n```".to_string()),
        ]);
        let e = enhancer(client);
        let chunks = vec![
            chunk(0, "first chunk came back fine"),
            chunk(1, "second chunk kept as is"),
            chunk(2, "third chunk came back fine"),
        ];

        let outcomes = e.enhance(&chunks, "en").await;
        assert_eq!(outcomes.len(), 3);
        assert!(!outcomes[0].used_fallback);
        assert!(outcomes[1].used_fallback);
        assert!(!outcomes[2].used_fallback);
        assert_eq!(outcomes[1].text, "second chunk kept as is");
        // Index order preserved
        assert_eq!(
            outcomes.iter().map(|o| o.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    struct DelayedUppercaseClient;

    #[async_trait]
    impl RevisionClient for DelayedUppercaseClient {
        async fn revise(&self, prompt: &str) -> Result<String, ProviderError> {
            let body = prompt
                .split("Text to revise:\n")
                .nth(1)
                .and_then(|rest| rest.split('\n').next())
                .ok_or(ProviderError::EmptyResponse)?;
            // Later chunks finish first
            let delay = 50u64.saturating_sub(body.len() as u64 * 4);
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            Ok(format!("```\n{}\n```", body.to_uppercase()))
        }
    }

    #[tokio::test]
    async fn test_enhance_outcomes_land_at_their_own_index() {
        let e = enhancer(Arc::new(DelayedUppercaseClient));
        let raws = vec![
            "alpha one.",
            "bravo two two.",
            "charlie three three.",
            "delta four four four.",
            "echo five five five five.",
        ];
        let chunks: Vec<TextChunk> = raws
            .iter()
            .enumerate()
            .map(|(i, raw)| chunk(i, raw))
            .collect();

        let outcomes = e.enhance(&chunks, "en").await;
        assert_eq!(outcomes.len(), raws.len());
        for (i, outcome) in outcomes.iter().enumerate() {
            assert_eq!(outcome.index, i);
            assert_eq!(outcome.text, raws[i].to_uppercase());
        }
    }

    #[test]
    fn test_assemble_upgraded_text() {
        let outcomes = vec![
            RevisionOutcome {
                index: 0,
                text: "Part one.".to_string(),
                used_fallback: false,
            },
            RevisionOutcome {
                index: 1,
                text: "Part two.".to_string(),
                used_fallback: true,
            },
        ];
        assert_eq!(assemble_upgraded_text(&outcomes), "Part one. Part two.");
    }
}
