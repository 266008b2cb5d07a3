use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for the transcription pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Audio probing and segmentation settings
    pub audio: AudioConfig,

    /// Transcription provider settings
    pub transcription: TranscriptionConfig,

    /// Revision provider and text chunking settings
    pub revision: RevisionConfig,

    /// Fragment merge heuristic tuning
    pub merge: MergeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Maximum size of one audio segment in bytes. Anything at or below
    /// this goes to the provider as-is; larger files are split.
    pub max_segment_bytes: u64,

    /// Constant bitrate for segment re-encoding (kbit/s)
    pub segment_bitrate_kbps: u32,

    /// Codec used when re-encoding segments
    pub segment_codec: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    /// Transcription API endpoint (OpenAI-compatible audio transcription)
    pub endpoint: String,

    /// API key, if the endpoint requires one
    pub api_key: Option<String>,

    /// Model name sent with each request
    pub model: String,

    /// Per-request timeout (seconds)
    pub timeout_seconds: u64,

    /// Maximum simultaneously in-flight transcription calls
    pub concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionConfig {
    /// Chat-completions endpoint used for text revision
    pub endpoint: String,

    /// API key, if the endpoint requires one
    pub api_key: Option<String>,

    /// Model name sent with each request
    pub model: String,

    /// Maximum tokens per revision response
    pub max_tokens: u32,

    /// Sampling temperature
    pub temperature: f32,

    /// Per-request timeout (seconds)
    pub timeout_seconds: u64,

    /// Chunks revised concurrently within one batch
    pub batch_size: usize,

    /// Character budget per text chunk (soft limit, sentence-aligned)
    pub max_chunk_chars: usize,

    /// Characters of neighboring context added to each side of a chunk
    pub overlap_chars: usize,

    /// Minimum ratio of revised length to original length before the
    /// revision is discarded as implausible
    pub min_plausible_ratio: f64,
}

/// Thresholds for the boundary overlap detection heuristic. These are
/// tunable approximations, not exact-match guarantees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Minimum length of a sentence-level overlap match (chars)
    pub min_sentence_overlap_chars: usize,

    /// Minimum length of a word n-gram overlap match (chars)
    pub min_phrase_overlap_chars: usize,

    /// How many trailing/leading sentences to compare at a seam
    pub max_boundary_sentences: usize,

    /// Largest word n-gram tried for phrase-level overlap
    pub max_ngram_words: usize,

    /// Smallest word n-gram tried for phrase-level overlap
    pub min_ngram_words: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            transcription: TranscriptionConfig::default(),
            revision: RevisionConfig::default(),
            merge: MergeConfig::default(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            // Stay under the common 25 MB per-request provider cap
            max_segment_bytes: 24 * 1024 * 1024,
            segment_bitrate_kbps: 128,
            segment_codec: "libmp3lame".to_string(),
        }
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/audio/transcriptions".to_string(),
            api_key: None,
            model: "whisper-1".to_string(),
            timeout_seconds: 300,
            concurrency: num_cpus::get().min(4),
        }
    }
}

impl Default for RevisionConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            max_tokens: 4096,
            temperature: 0.2,
            timeout_seconds: 120,
            batch_size: 3,
            max_chunk_chars: 4000,
            overlap_chars: 100,
            min_plausible_ratio: 0.5,
        }
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            min_sentence_overlap_chars: 10,
            min_phrase_overlap_chars: 5,
            max_boundary_sentences: 3,
            max_ngram_words: 5,
            min_ngram_words: 2,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Load from a file if one is given, otherwise fall back to defaults
    pub async fn from_file_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p).await,
            None => Ok(Self::default()),
        }
    }

    /// Save configuration to a TOML file
    pub async fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        tokio::fs::write(path, contents)
            .await
            .with_context(|| format!("failed to write config file {}", path.display()))?;
        Ok(())
    }
}
