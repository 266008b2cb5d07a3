use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::chunking::{ContextOverlapAugmenter, SentenceChunker};
use crate::config::Config;
use crate::enhance::{assemble_upgraded_text, ChunkEnhancer};
use crate::media::{AudioSegmenter, SegmentWorkspace};
use crate::providers::{
    create_revision_client, create_transcription_client, RevisionClient, TranscriptionClient,
};
use crate::scoring::ImprovementScorer;
use crate::transcribe::{ChunkTranscriber, Transcript, TranscriptMerger};

/// Result of the transcript upgrade stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpgradeResult {
    /// The revised transcript, chunk order preserved
    pub upgraded_text: String,
    /// Divergence between original and revised text, 0..100
    pub improved_percentage: f64,
    /// Chunks that kept their original text after a failed or
    /// implausible revision
    pub fallback_chunks: usize,
}

/// Composes segmentation, transcription, merging, chunking, revision and
/// scoring into the two-stage flow: audio to transcript, transcript to
/// revised transcript.
pub struct Pipeline {
    config: Config,
    transcription_client: Arc<dyn TranscriptionClient>,
    revision_client: Arc<dyn RevisionClient>,
}

impl Pipeline {
    /// Build a pipeline with the shipped HTTP provider clients
    pub fn new(config: Config) -> Result<Self> {
        let transcription_client = create_transcription_client(&config.transcription)
            .context("failed to build transcription client")?;
        let revision_client =
            create_revision_client(&config.revision).context("failed to build revision client")?;
        Ok(Self {
            config,
            transcription_client,
            revision_client,
        })
    }

    /// Build a pipeline with caller-supplied provider clients
    pub fn with_clients(
        config: Config,
        transcription_client: Arc<dyn TranscriptionClient>,
        revision_client: Arc<dyn RevisionClient>,
    ) -> Self {
        Self {
            config,
            transcription_client,
            revision_client,
        }
    }

    /// Transcribe one audio file into a single continuous transcript.
    ///
    /// Oversized audio is split into provider-sized segments which are
    /// transcribed concurrently and stitched back together. Unreadable
    /// audio is fatal; individual segment failures degrade the result
    /// (counted in `failed_segments`) but never fail the call.
    pub async fn transcribe_audio(&self, audio_path: &Path, language: &str) -> Result<Transcript> {
        let started = Instant::now();
        info!("transcribing {}", audio_path.display());

        // The workspace owns every extracted segment file; it is removed
        // on all exit paths when this scope ends.
        let workspace = SegmentWorkspace::new()?;
        let segmenter = AudioSegmenter::new(self.config.audio.clone());
        let segments = segmenter
            .segment(audio_path, &workspace)
            .await
            .with_context(|| format!("failed to segment {}", audio_path.display()))?;

        let segment_count = segments.len();
        let transcriber = ChunkTranscriber::new(
            Arc::clone(&self.transcription_client),
            self.config.transcription.concurrency,
        );
        let (fragments, failed_segments) = transcriber.transcribe(segments, language).await;

        let merger = TranscriptMerger::new(self.config.merge.clone());
        let mut transcript = merger.merge(&fragments, language);
        transcript.failed_segments = failed_segments;

        info!(
            "transcribed {} segments ({} failed) in {:.1}s: {} chars",
            segment_count,
            failed_segments,
            started.elapsed().as_secs_f64(),
            transcript.text.len()
        );

        Ok(transcript)
    }

    /// Revise a transcript for fluency and correctness, chunk by chunk.
    ///
    /// Every chunk that cannot be revised keeps its original text, so the
    /// output is always a complete transcript; `fallback_chunks` reports
    /// how degraded it is.
    pub async fn upgrade_transcript(&self, transcript: &str, language: &str) -> Result<UpgradeResult> {
        let started = Instant::now();

        let chunker = SentenceChunker::new(self.config.revision.max_chunk_chars);
        let raw_chunks = chunker.split(transcript);

        if raw_chunks.is_empty() {
            return Ok(UpgradeResult {
                upgraded_text: String::new(),
                improved_percentage: 0.0,
                fallback_chunks: 0,
            });
        }

        let augmenter = ContextOverlapAugmenter::new(self.config.revision.overlap_chars);
        let chunks = augmenter.augment(raw_chunks);

        let enhancer = ChunkEnhancer::new(Arc::clone(&self.revision_client), &self.config.revision);
        let outcomes = enhancer.enhance(&chunks, language).await;

        let upgraded_text = assemble_upgraded_text(&outcomes);
        let fallback_chunks = outcomes.iter().filter(|o| o.used_fallback).count();
        let improved_percentage = ImprovementScorer::new().score(transcript, &upgraded_text);

        if fallback_chunks > 0 {
            warn!(
                "upgrade degraded: {}/{} chunks kept original text",
                fallback_chunks,
                outcomes.len()
            );
        }
        info!(
            "upgraded {} chunks in {:.1}s, {:.1}% changed",
            outcomes.len(),
            started.elapsed().as_secs_f64(),
            improved_percentage
        );

        Ok(UpgradeResult {
            upgraded_text,
            improved_percentage,
            fallback_chunks,
        })
    }
}
