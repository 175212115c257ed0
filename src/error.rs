use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures raised at the collaborator boundary. None of them are fatal; the
/// player turns each one into a status line via [`PlayerError::status_message`].
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("failed to read folder {}: {source}", folder.display())]
    Scan {
        folder: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("couldn't play {}: {reason}", path.display())]
    Playback { path: PathBuf, reason: String },

    #[error(transparent)]
    Download(#[from] DownloadFailure),

    #[error("no album art in {}: {reason}", path.display())]
    ArtRead { path: PathBuf, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownloadFailure {
    #[error("video is unavailable or private")]
    Unavailable,
    #[error("network error")]
    Network,
    #[error("ffmpeg not found")]
    FfmpegMissing,
    #[error("downloader `{0}` not found")]
    ToolMissing(String),
    #[error("download failed: {0}")]
    Failed(String),
}

impl DownloadFailure {
    /// Maps downloader output onto a failure kind.
    pub fn classify(detail: &str) -> Self {
        let lower = detail.to_lowercase();
        if lower.contains("video unavailable") || lower.contains("private video") {
            Self::Unavailable
        } else if lower.contains("network")
            || lower.contains("timed out")
            || lower.contains("connection")
        {
            Self::Network
        } else if lower.contains("ffmpeg") || lower.contains("ffprobe") {
            Self::FfmpegMissing
        } else {
            Self::Failed(truncate_chars(detail.trim(), 50))
        }
    }

    fn status_message(&self) -> String {
        match self {
            Self::Unavailable => String::from("Video is unavailable or private"),
            Self::Network => String::from("Network error"),
            Self::FfmpegMissing => String::from("FFmpeg not found"),
            Self::ToolMissing(program) => format!("Downloader not found: {program}"),
            Self::Failed(detail) => format!("Download failed: {detail}..."),
        }
    }
}

impl PlayerError {
    pub fn status_message(&self) -> String {
        match self {
            Self::Scan { .. } => String::from("No MP3 files found in selected folder"),
            Self::Playback { path, reason } => {
                let name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().to_string())
                    .unwrap_or_else(|| path.display().to_string());
                format!("Couldn't play {name}: {reason}")
            }
            Self::Download(failure) => failure.status_message(),
            Self::ArtRead { .. } => String::from("No Art"),
        }
    }
}

pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
