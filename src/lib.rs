/// Chunked transcription and transcript-upgrade pipeline.
///
/// Splits oversized audio into provider-sized segments, transcribes them
/// with bounded concurrency, stitches the fragments back into one
/// transcript, then revises the transcript chunk by chunk through an
/// external language model with per-unit fallback.

pub mod chunking;
pub mod config;
pub mod enhance;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod providers;
pub mod scoring;
pub mod text;
pub mod transcribe;

// Re-export main types for easy access
pub use crate::chunking::{ContextOverlapAugmenter, SentenceChunker, TextChunk};
pub use crate::config::Config;
pub use crate::enhance::{ChunkEnhancer, RevisionOutcome};
pub use crate::error::{AudioError, ProviderError};
pub use crate::media::{AudioSegment, AudioSegmenter, MediaProbe, SegmentWorkspace};
pub use crate::pipeline::{Pipeline, UpgradeResult};
pub use crate::providers::{
    HttpRevisionClient, HttpTranscriptionClient, RevisionClient, TranscriptionClient,
    TranscriptionOutput,
};
pub use crate::scoring::ImprovementScorer;
pub use crate::transcribe::{
    ChunkTranscriber, Transcript, TranscriptFragment, TranscriptMerger, TranscriptSegment,
};
