use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

use crate::config::AudioConfig;
use crate::error::AudioError;

/// One time-bounded slice of the source audio, sized to fit a single
/// transcription request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioSegment {
    /// Zero-based position within the source file
    pub index: usize,
    /// Start of the slice on the source timeline (seconds)
    pub start_sec: f64,
    /// End of the slice on the source timeline (seconds)
    pub end_sec: f64,
    /// Extracted segment file, private to one pipeline run
    pub file_path: PathBuf,
}

impl AudioSegment {
    pub fn duration_sec(&self) -> f64 {
        self.end_sec - self.start_sec
    }
}

/// Private working directory holding extracted segment files.
///
/// Dropping the workspace removes the directory and everything in it, so
/// segment files cannot leak across runs regardless of how the run ends.
pub struct SegmentWorkspace {
    dir: TempDir,
}

impl SegmentWorkspace {
    pub fn new() -> Result<Self, AudioError> {
        let dir = TempDir::new()?;
        debug!("segment workspace: {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Probes media files via ffprobe
#[derive(Debug, Clone, Default)]
pub struct MediaProbe;

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

impl MediaProbe {
    pub fn new() -> Self {
        Self
    }

    /// Total duration of an audio file in seconds.
    ///
    /// An unreadable file or a missing/zero duration is fatal for the
    /// whole request; there is nothing useful to transcribe.
    pub async fn probe_duration(&self, path: &Path) -> Result<f64, AudioError> {
        let output = tokio::process::Command::new("ffprobe")
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
            ])
            .arg(path)
            .output()
            .await?;

        if !output.status.success() {
            return Err(AudioError::FfprobeFailed {
                path: path.to_path_buf(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let parsed: FfprobeOutput = serde_json::from_slice(&output.stdout).map_err(|e| {
            AudioError::FfprobeFailed {
                path: path.to_path_buf(),
                detail: format!("unparseable ffprobe output: {}", e),
            }
        })?;

        let duration = parsed
            .format
            .and_then(|f| f.duration)
            .and_then(|d| d.parse::<f64>().ok())
            .unwrap_or(0.0);

        if duration <= 0.0 {
            return Err(AudioError::DurationUnavailable(path.to_path_buf()));
        }

        Ok(duration)
    }
}

/// Splits oversized audio into provider-sized segment files
#[derive(Debug, Clone)]
pub struct AudioSegmenter {
    probe: MediaProbe,
    config: AudioConfig,
}

impl AudioSegmenter {
    pub fn new(config: AudioConfig) -> Self {
        Self {
            probe: MediaProbe::new(),
            config,
        }
    }

    /// Split `path` into segments no larger than `max_segment_bytes`,
    /// writing the extracted files into `workspace`.
    ///
    /// Small files take a fast path: a single segment spanning the whole
    /// duration, copied into the workspace without re-encoding. Larger
    /// files are cut on estimated byte-rate boundaries and re-encoded at
    /// a constant bitrate so each segment decodes on its own.
    pub async fn segment(
        &self,
        path: &Path,
        workspace: &SegmentWorkspace,
    ) -> Result<Vec<AudioSegment>, AudioError> {
        let duration = self.probe.probe_duration(path).await?;
        let file_size = tokio::fs::metadata(path).await?.len();

        if file_size <= self.config.max_segment_bytes {
            debug!(
                "audio fits in one request ({} bytes), skipping re-encode",
                file_size
            );
            let segment_path = workspace.path().join(segment_file_name(path, 0));
            tokio::fs::copy(path, &segment_path).await?;
            return Ok(vec![AudioSegment {
                index: 0,
                start_sec: 0.0,
                end_sec: duration,
                file_path: segment_path,
            }]);
        }

        let boundaries = segment_boundaries(duration, file_size, self.config.max_segment_bytes);

        info!(
            "splitting {} ({:.1}s, {} bytes) into {} segments",
            path.display(),
            duration,
            file_size,
            boundaries.len()
        );

        let mut segments = Vec::with_capacity(boundaries.len());
        for (index, (start_sec, end_sec)) in boundaries.into_iter().enumerate() {
            let segment_path = workspace.path().join(segment_file_name(path, index));

            self.extract_segment(path, start_sec, end_sec - start_sec, &segment_path, index)
                .await?;

            segments.push(AudioSegment {
                index,
                start_sec,
                end_sec,
                file_path: segment_path,
            });
        }

        Ok(segments)
    }

    /// Extract one boundary to an independent file with a constant-bitrate
    /// re-encode, so cut points do not land mid-frame of the source codec.
    async fn extract_segment(
        &self,
        source: &Path,
        start_sec: f64,
        duration_sec: f64,
        output: &Path,
        index: usize,
    ) -> Result<(), AudioError> {
        let status = tokio::process::Command::new("ffmpeg")
            .arg("-i")
            .arg(source)
            .args([
                "-ss",
                &format!("{:.3}", start_sec),
                "-t",
                &format!("{:.3}", duration_sec),
                "-vn",
                "-acodec",
                &self.config.segment_codec,
                "-b:a",
                &format!("{}k", self.config.segment_bitrate_kbps),
                "-y",
            ])
            .arg(output)
            .status()
            .await?;

        if !status.success() {
            return Err(AudioError::FfmpegFailed {
                path: source.to_path_buf(),
                index,
            });
        }

        debug!(
            "extracted segment {} [{:.1}s..{:.1}s] -> {}",
            index,
            start_sec,
            start_sec + duration_sec,
            output.display()
        );
        Ok(())
    }
}

/// Time boundaries for cutting a file of `file_size` bytes and `duration`
/// seconds into pieces of at most `max_bytes` each, assuming a roughly
/// constant byte rate. Boundaries are contiguous and cover [0, duration].
fn segment_boundaries(duration: f64, file_size: u64, max_bytes: u64) -> Vec<(f64, f64)> {
    let bytes_per_second = file_size as f64 / duration;
    let segment_duration = max_bytes as f64 / bytes_per_second;
    let segment_count = (duration / segment_duration).ceil() as usize;

    (0..segment_count)
        .map(|i| {
            let start = i as f64 * segment_duration;
            let end = ((i + 1) as f64 * segment_duration).min(duration);
            (start, end)
        })
        .collect()
}

fn segment_file_name(source: &Path, index: usize) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "audio".to_string());
    let ext = source
        .extension()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "mp3".to_string());
    format!("{}_seg_{:03}.{}", stem, index, ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundaries_cover_duration_contiguously() {
        // 100 MB over 1000s against a 24 MB cap
        let boundaries = segment_boundaries(1000.0, 100 * 1024 * 1024, 24 * 1024 * 1024);
        assert_eq!(boundaries.len(), 5);

        assert_eq!(boundaries[0].0, 0.0);
        assert!((boundaries.last().unwrap().1 - 1000.0).abs() < 1e-9);
        for pair in boundaries.windows(2) {
            assert!((pair[0].1 - pair[1].0).abs() < 1e-9, "boundaries must be contiguous");
        }

        let total: f64 = boundaries.iter().map(|(s, e)| e - s).sum();
        assert!((total - 1000.0).abs() < 1e-6);
    }

    #[test]
    fn test_boundaries_respect_byte_budget() {
        let duration = 600.0;
        let file_size = 50 * 1024 * 1024u64;
        let max_bytes = 24 * 1024 * 1024u64;
        let bytes_per_second = file_size as f64 / duration;

        for (start, end) in segment_boundaries(duration, file_size, max_bytes) {
            let estimated_bytes = (end - start) * bytes_per_second;
            assert!(estimated_bytes <= max_bytes as f64 + 1.0);
        }
    }

    #[test]
    fn test_segment_file_name() {
        let name = segment_file_name(Path::new("/tmp/recording.mp3"), 4);
        assert_eq!(name, "recording_seg_004.mp3");
    }

    #[test]
    fn test_segment_duration() {
        let segment = AudioSegment {
            index: 0,
            start_sec: 10.0,
            end_sec: 35.5,
            file_path: PathBuf::from("/tmp/x.mp3"),
        };
        assert!((segment.duration_sec() - 25.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_workspace_cleanup_on_drop() {
        let workspace = SegmentWorkspace::new().unwrap();
        let dir = workspace.path().to_path_buf();
        tokio::fs::write(dir.join("seg_000.mp3"), b"fake audio")
            .await
            .unwrap();
        assert!(dir.exists());

        drop(workspace);
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_probe_missing_file_is_fatal() {
        let probe = MediaProbe::new();
        let result = probe
            .probe_duration(Path::new("/nonexistent/audio.mp3"))
            .await;
        assert!(result.is_err());
    }
}
