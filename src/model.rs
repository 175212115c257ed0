use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

/// One audio file found in the selected folder. `file_name` is the identity key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub file_name: String,
    pub display_name: String,
    pub path: PathBuf,
}

impl Track {
    pub fn from_path(path: PathBuf) -> Option<Self> {
        let file_name = path.file_name()?.to_string_lossy().to_string();
        Some(Self {
            display_name: file_name.clone(),
            file_name,
            path,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

impl PlaybackState {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Playing | Self::Paused)
    }

    fn to_raw(self) -> u8 {
        match self {
            Self::Stopped => 0,
            Self::Playing => 1,
            Self::Paused => 2,
        }
    }

    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Playing,
            2 => Self::Paused,
            _ => Self::Stopped,
        }
    }
}

/// Playback state shared with the monitor thread. Only the owning thread
/// stores; the monitor only loads.
#[derive(Debug, Clone, Default)]
pub struct PlaybackCell {
    state: Arc<AtomicU8>,
    generation: Arc<AtomicU64>,
}

impl PlaybackCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self) -> PlaybackState {
        PlaybackState::from_raw(self.state.load(Ordering::Acquire))
    }

    pub fn store(&self, state: PlaybackState) {
        self.state.store(state.to_raw(), Ordering::Release);
    }

    /// Number of tracks started so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub(crate) fn start_track(&self) -> u64 {
        let next = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.store(PlaybackState::Playing);
        next
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Success,
    Warning,
    Error,
    Progress,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedState {
    #[serde(default)]
    pub last_folder: Option<PathBuf>,
    #[serde(default = "default_volume_percent")]
    pub volume_percent: u8,
    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,
    #[serde(default = "default_downloader_program")]
    pub downloader_program: String,
    #[serde(default)]
    pub ffmpeg_location: Option<PathBuf>,
    #[serde(default = "default_art_size")]
    pub art_size: u32,
}

fn default_volume_percent() -> u8 {
    70
}

fn default_monitor_interval_ms() -> u64 {
    500
}

fn default_downloader_program() -> String {
    String::from("yt-dlp")
}

fn default_art_size() -> u32 {
    250
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            last_folder: None,
            volume_percent: default_volume_percent(),
            monitor_interval_ms: default_monitor_interval_ms(),
            downloader_program: default_downloader_program(),
            ffmpeg_location: None,
            art_size: default_art_size(),
        }
    }
}
