use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::MergeConfig;
use crate::media::AudioSegment;
use crate::providers::TranscriptionClient;
use crate::text;

/// One timed span of transcribed speech. After merging, timestamps are on
/// the whole-file timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub id: String,
    pub text: String,
    pub start_sec: f64,
    pub end_sec: f64,
    pub confidence: f64,
}

/// Transcription result for one audio segment, before merging
#[derive(Debug, Clone, Default)]
pub struct TranscriptFragment {
    pub text: String,
    pub segments: Vec<TranscriptSegment>,
    pub duration_sec: f64,
}

/// Complete transcript of one audio file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    pub segments: Vec<TranscriptSegment>,
    pub language: String,
    pub duration_sec: f64,
    /// Segments whose transcription call failed and fell back to empty
    pub failed_segments: usize,
}

impl Transcript {
    pub fn empty(language: &str) -> Self {
        Self {
            text: String::new(),
            segments: Vec::new(),
            language: language.to_string(),
            duration_sec: 0.0,
            failed_segments: 0,
        }
    }
}

/// Runs the transcription provider over all audio segments with bounded
/// concurrency, collecting results by segment index.
pub struct ChunkTranscriber {
    client: Arc<dyn TranscriptionClient>,
    concurrency: usize,
}

impl ChunkTranscriber {
    pub fn new(client: Arc<dyn TranscriptionClient>, concurrency: usize) -> Self {
        Self {
            client,
            concurrency: concurrency.max(1),
        }
    }

    /// Transcribe every segment, at most `concurrency` calls in flight.
    ///
    /// The output always has one fragment per input segment, in segment
    /// order. A failed call becomes an empty fragment and is counted; it
    /// never aborts the sibling calls. Each segment file is deleted as
    /// soon as its call resolves, success or not.
    pub async fn transcribe(
        &self,
        segments: Vec<AudioSegment>,
        language: &str,
    ) -> (Vec<TranscriptFragment>, usize) {
        let total = segments.len();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(total);

        for segment in segments {
            let client = Arc::clone(&self.client);
            let semaphore = Arc::clone(&semaphore);
            let language = language.to_string();

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                let index = segment.index;

                debug!(
                    "transcribing segment {} [{:.1}s..{:.1}s]",
                    index, segment.start_sec, segment.end_sec
                );

                let outcome = client.transcribe(&segment.file_path, &language).await;

                // The segment file is ours; drop it as soon as the call
                // resolves so disk usage stays bounded.
                if let Err(e) = tokio::fs::remove_file(&segment.file_path).await {
                    debug!("could not remove {}: {}", segment.file_path.display(), e);
                }

                match outcome {
                    Ok(output) => {
                        let duration = if output.duration_sec > 0.0 {
                            output.duration_sec
                        } else {
                            segment.duration_sec()
                        };
                        (
                            index,
                            TranscriptFragment {
                                text: output.text,
                                segments: output.segments,
                                duration_sec: duration,
                            },
                            false,
                        )
                    }
                    Err(e) => {
                        warn!("transcription of segment {} failed: {}", index, e);
                        (index, TranscriptFragment::default(), true)
                    }
                }
            }));
        }

        // Pre-sized, index-addressed result list: completion order does
        // not matter, each slot is written exactly once.
        let mut fragments: Vec<Option<TranscriptFragment>> = (0..total).map(|_| None).collect();
        let mut failed = 0usize;

        for handle in handles {
            match handle.await {
                Ok((index, fragment, fell_back)) => {
                    if fell_back {
                        failed += 1;
                    }
                    fragments[index] = Some(fragment);
                }
                Err(e) => {
                    warn!("transcription task panicked: {}", e);
                    failed += 1;
                }
            }
        }

        let fragments = fragments
            .into_iter()
            .map(|f| f.unwrap_or_default())
            .collect::<Vec<_>>();

        if failed > 0 {
            warn!("{}/{} segments fell back to empty fragments", failed, total);
        }

        (fragments, failed)
    }
}

/// Stitches per-segment fragments into one transcript, removing duplicated
/// boundary speech and re-basing timestamps onto the whole-file timeline.
pub struct TranscriptMerger {
    config: MergeConfig,
}

impl TranscriptMerger {
    pub fn new(config: MergeConfig) -> Self {
        Self { config }
    }

    pub fn merge(&self, fragments: &[TranscriptFragment], language: &str) -> Transcript {
        if fragments.is_empty() {
            return Transcript::empty(language);
        }

        let mut text = String::new();
        let mut segments = Vec::new();
        let mut offset_sec = 0.0;

        for fragment in fragments {
            let fragment_text = fragment.text.trim();

            if !fragment_text.is_empty() {
                if text.is_empty() {
                    text.push_str(fragment_text);
                } else {
                    let skip = self.find_overlap(&text, fragment_text);
                    let remainder = fragment_text[skip..].trim_start();
                    if !remainder.is_empty() {
                        if skip > 0 {
                            debug!("dropped {} overlapping chars at fragment seam", skip);
                        }
                        if !text.ends_with(char::is_whitespace) {
                            text.push(' ');
                        }
                        text.push_str(remainder);
                    }
                }
            }

            for segment in &fragment.segments {
                segments.push(TranscriptSegment {
                    id: segment.id.clone(),
                    text: segment.text.clone(),
                    start_sec: segment.start_sec + offset_sec,
                    end_sec: segment.end_sec + offset_sec,
                    confidence: segment.confidence,
                });
            }

            offset_sec += fragment.duration_sec;
        }

        info!(
            "merged {} fragments into {} chars / {} segments ({:.1}s)",
            fragments.len(),
            text.len(),
            segments.len(),
            offset_sec
        );

        Transcript {
            text,
            segments,
            language: language.to_string(),
            duration_sec: offset_sec,
            failed_segments: 0,
        }
    }

    /// Length of the prefix of `next` that duplicates the tail of `prev`,
    /// or 0 when no overlap is found.
    ///
    /// Adjacent provider calls re-transcribe a little audio around each
    /// cut point, so seams often repeat a sentence or a short phrase.
    /// This is a best-effort string match with configurable thresholds,
    /// not an exact algorithm.
    fn find_overlap(&self, prev: &str, next: &str) -> usize {
        if let Some(skip) = self.sentence_overlap(prev, next) {
            return skip;
        }
        if let Some(skip) = self.ngram_overlap(prev, next) {
            return skip;
        }
        0
    }

    /// Compare the trailing sentences of `prev` with the leading sentences
    /// of `next`, widest window first.
    fn sentence_overlap(&self, prev: &str, next: &str) -> Option<usize> {
        let prev_spans = text::sentence_spans(prev);
        let next_spans = text::sentence_spans(next);
        if prev_spans.is_empty() || next_spans.is_empty() {
            return None;
        }

        let window = self
            .config
            .max_boundary_sentences
            .min(prev_spans.len())
            .min(next_spans.len());

        for count in (1..=window).rev() {
            let tail = prev_spans[prev_spans.len() - count..]
                .iter()
                .map(|&(s, e)| prev[s..e].trim())
                .collect::<Vec<_>>()
                .join(" ");
            let head = next_spans[..count]
                .iter()
                .map(|&(s, e)| next[s..e].trim())
                .collect::<Vec<_>>()
                .join(" ");

            if tail.len() > self.config.min_sentence_overlap_chars && tail == head {
                // Cut after the matched sentences as they appear in `next`
                return Some(next_spans[count - 1].1);
            }
        }
        None
    }

    /// Compare trailing word n-grams of `prev` with leading n-grams of
    /// `next`, longest n first.
    fn ngram_overlap(&self, prev: &str, next: &str) -> Option<usize> {
        let prev_words = text::word_spans(prev);
        let next_words = text::word_spans(next);

        let max_n = self
            .config
            .max_ngram_words
            .min(prev_words.len())
            .min(next_words.len());

        for n in (self.config.min_ngram_words..=max_n).rev() {
            let tail = prev_words[prev_words.len() - n..]
                .iter()
                .map(|&(s, e)| &prev[s..e])
                .collect::<Vec<_>>()
                .join(" ");
            let head = next_words[..n]
                .iter()
                .map(|&(s, e)| &next[s..e])
                .collect::<Vec<_>>()
                .join(" ");

            if tail.len() > self.config.min_phrase_overlap_chars && tail == head {
                return Some(next_words[n - 1].1);
            }
        }
        None
    }
}
