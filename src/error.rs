use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors while reading or segmenting source audio.
///
/// Any of these aborts the whole request for that file; there is no
/// partial-segmentation fallback.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("could not determine duration of {0}")]
    DurationUnavailable(PathBuf),

    #[error("ffprobe failed for {path}: {detail}")]
    FfprobeFailed { path: PathBuf, detail: String },

    #[error("ffmpeg failed while extracting segment {index} of {path}")]
    FfmpegFailed { path: PathBuf, index: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of a single external provider call.
///
/// These are never propagated out of the pipeline: the transcriber maps
/// them to an empty fragment, the enhancer to the original chunk text.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("provider credentials not configured")]
    MissingCredentials,

    #[error("provider returned an empty response")]
    EmptyResponse,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
