use crate::art::{self, AlbumArt, ArtReader};
use crate::audio::AudioEngine;
use crate::config;
use crate::download::{self, DownloadReport, Downloader};
use crate::error::{PlayerError, truncate_chars};
use crate::event::AppEvent;
use crate::library;
use crate::model::{PersistedState, PlaybackCell, PlaybackState, StatusLevel, Track};
use crate::playlist::{self, Direction, PlaylistView};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};

const STATUS_TIMEOUT: Duration = Duration::from_secs(5);
const READY: &str = "Ready";
const MAX_ART_SIZE: u32 = 1024;

/// The player state owned by the UI thread. Every mutation goes through one of
/// the command methods below.
pub struct PlayerCore {
    pub folder: Option<PathBuf>,
    pub canonical: Vec<Track>,
    pub view: PlaylistView,
    pub query: String,
    pub now_playing: Option<Track>,
    pub album_art: AlbumArt,
    pub status: String,
    pub status_level: StatusLevel,
    pub volume_percent: u8,
    pub downloading: bool,
    pub dirty: bool,
    playback: PlaybackCell,
    status_set_at: Instant,
    art_reader: Option<Box<dyn ArtReader>>,
    art_size: u32,
    shuffle_rng: SmallRng,
}

impl PlayerCore {
    pub fn new(settings: &PersistedState, art_reader: Option<Box<dyn ArtReader>>) -> Self {
        let album_art = if art_reader.is_some() {
            AlbumArt::Missing
        } else {
            AlbumArt::Unavailable
        };
        Self {
            folder: None,
            canonical: Vec::new(),
            view: PlaylistView::default(),
            query: String::new(),
            now_playing: None,
            album_art,
            status: String::from(READY),
            status_level: StatusLevel::Info,
            volume_percent: settings.volume_percent.min(100),
            downloading: false,
            dirty: true,
            playback: PlaybackCell::new(),
            status_set_at: Instant::now(),
            art_reader,
            art_size: settings.art_size.clamp(1, MAX_ART_SIZE),
            shuffle_rng: SmallRng::from_os_rng(),
        }
    }

    pub fn with_shuffle_seed(mut self, seed: u64) -> Self {
        self.shuffle_rng = SmallRng::seed_from_u64(seed);
        self
    }

    /// Shared handle for the monitor thread.
    pub fn playback_cell(&self) -> PlaybackCell {
        self.playback.clone()
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.playback.load()
    }

    pub fn generation(&self) -> u64 {
        self.playback.generation()
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.view.current()
    }

    pub fn persisted_state(&self, base: &PersistedState) -> PersistedState {
        PersistedState {
            last_folder: self.folder.clone(),
            volume_percent: self.volume_percent,
            ..base.clone()
        }
    }

    pub fn open_folder(&mut self, input: &Path) {
        let folder = config::normalize_path(input);
        tracing::info!(folder = %folder.display(), "opening folder");
        self.folder = Some(folder);
        self.rescan();
        if !self.canonical.is_empty() {
            self.set_status(StatusLevel::Success, "Folder loaded successfully");
        }
    }

    /// Rebuilds the canonical playlist from the folder. Clears the query and
    /// resets the cursor; whatever the engine is playing keeps playing.
    pub fn rescan(&mut self) {
        let Some(folder) = self.folder.clone() else {
            return;
        };

        self.canonical = library::scan_folder(&folder);
        self.query.clear();
        self.view.reset(self.canonical.clone());
        self.clear_album_art();

        match self.view.current() {
            Some(track) => {
                let message = format!("Ready to play: {}", track.display_name);
                self.set_status(StatusLevel::Info, &message);
            }
            None => self.set_status(StatusLevel::Warning, "No MP3 files found in selected folder"),
        }
    }

    pub fn set_query(&mut self, query: &str) {
        self.query = query.to_string();
        self.view
            .rebuild(playlist::filter_tracks(&self.canonical, &self.query));
        self.dirty = true;
    }

    pub fn shuffle(&mut self) {
        if self.canonical.is_empty() {
            self.set_status(StatusLevel::Warning, "Load songs first");
            return;
        }

        self.query.clear();
        let mut shuffled = self.canonical.clone();
        shuffled.shuffle(&mut self.shuffle_rng);
        self.view.rebuild(shuffled);
        self.set_status(StatusLevel::Success, "Playlist shuffled");
    }

    pub fn toggle_play(&mut self, audio: &mut dyn AudioEngine) {
        if self.view.is_empty() {
            self.set_status(StatusLevel::Warning, "No songs in queue");
            return;
        }

        match self.playback.load() {
            PlaybackState::Playing => {
                audio.pause();
                self.playback.store(PlaybackState::Paused);
                self.set_status(StatusLevel::Info, "Paused");
            }
            PlaybackState::Paused => {
                audio.unpause();
                self.playback.store(PlaybackState::Playing);
                self.set_status(StatusLevel::Info, "Resumed");
            }
            PlaybackState::Stopped => self.play_current(audio),
        }
    }

    /// Loads and plays the track at the cursor.
    pub fn play_current(&mut self, audio: &mut dyn AudioEngine) {
        let Some(track) = self.view.current().cloned() else {
            audio.stop();
            self.playback.store(PlaybackState::Stopped);
            self.now_playing = None;
            self.clear_album_art();
            return;
        };

        if let Err(err) = audio.load(&track.path) {
            let err = PlayerError::Playback {
                path: track.path.clone(),
                reason: format!("{err:#}"),
            };
            tracing::warn!(error = %err, "playback failed");
            audio.stop();
            self.playback.store(PlaybackState::Stopped);
            self.now_playing = None;
            self.clear_album_art();
            self.set_status(StatusLevel::Error, &err.status_message());
            return;
        }

        audio.set_volume(self.volume_fraction());
        audio.play();
        let generation = self.playback.start_track();
        tracing::info!(track = %track.display_name, generation, "playing");
        self.refresh_album_art(&track.path);
        self.set_status(StatusLevel::Info, &format!("Playing: {}", track.display_name));
        self.now_playing = Some(track);
    }

    pub fn next(&mut self, audio: &mut dyn AudioEngine) {
        self.step(Direction::Forward, audio);
    }

    pub fn previous(&mut self, audio: &mut dyn AudioEngine) {
        self.step(Direction::Backward, audio);
    }

    fn step(&mut self, direction: Direction, audio: &mut dyn AudioEngine) {
        if self.view.is_empty() {
            return;
        }
        self.view.advance(direction);
        self.follow_cursor(audio);
    }

    /// Jumps to `index` in the view. Restarts playback only when a different
    /// track than the one playing was picked while playback is active.
    pub fn select(&mut self, index: usize, audio: &mut dyn AudioEngine) {
        let already_playing = self
            .view
            .entries()
            .get(index)
            .zip(self.now_playing.as_ref())
            .is_some_and(|(picked, playing)| picked.file_name == playing.file_name);
        if !self.view.select(index) || already_playing {
            return;
        }
        self.follow_cursor(audio);
    }

    fn follow_cursor(&mut self, audio: &mut dyn AudioEngine) {
        if self.playback.load().is_active() {
            self.play_current(audio);
        } else if let Some(track) = self.view.current() {
            let message = format!("Ready: {}", track.display_name);
            self.set_status(StatusLevel::Info, &message);
        }
    }

    pub fn stop(&mut self, audio: &mut dyn AudioEngine) {
        audio.stop();
        self.playback.store(PlaybackState::Stopped);
        self.now_playing = None;
        self.clear_album_art();
        self.set_status(StatusLevel::Info, "Stopped");
    }

    pub fn seek_relative(&mut self, audio: &mut dyn AudioEngine, seconds: i64) {
        if !self.playback.load().is_active() {
            return;
        }
        let current = audio.position().unwrap_or_default();
        let offset = Duration::from_secs(seconds.unsigned_abs());
        let mut target = if seconds >= 0 {
            current.saturating_add(offset)
        } else {
            current.saturating_sub(offset)
        };
        if let Some(duration) = audio.duration() {
            target = target.min(duration);
        }

        match audio.seek_to(target) {
            Ok(()) => self.dirty = true,
            Err(err) => {
                tracing::debug!(error = %format!("{err:#}"), "seek failed");
                self.set_status(StatusLevel::Warning, "Seeking is not supported for this track");
            }
        }
    }

    pub fn set_volume(&mut self, audio: &mut dyn AudioEngine, percent: u8) {
        self.volume_percent = percent.min(100);
        audio.set_volume(self.volume_fraction());
        let message = format!("Volume: {}%", self.volume_percent);
        self.set_status(StatusLevel::Info, &message);
    }

    pub fn volume_fraction(&self) -> f32 {
        f32::from(self.volume_percent) / 100.0
    }

    /// Starts a background download into the current folder.
    pub fn start_download(
        &mut self,
        url: &str,
        downloader: Arc<dyn Downloader>,
        events: Sender<AppEvent>,
    ) {
        let url = url.trim();
        if url.is_empty() {
            self.set_status(StatusLevel::Warning, "Enter a valid URL");
            return;
        }
        let Some(folder) = self.folder.clone() else {
            self.set_status(StatusLevel::Warning, "Select a folder first");
            return;
        };
        if self.downloading {
            self.set_status(StatusLevel::Warning, "A download is already in progress");
            return;
        }

        match download::spawn_download(downloader, url.to_string(), folder, events) {
            Ok(_) => {
                self.downloading = true;
                self.set_status(StatusLevel::Progress, "Starting download...");
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to spawn download worker");
                self.set_status(StatusLevel::Error, "Download failed: could not start worker...");
            }
        }
    }

    pub fn handle_event(&mut self, event: AppEvent, audio: &mut dyn AudioEngine) {
        match event {
            AppEvent::AutoAdvance { generation } => {
                if generation != self.playback.generation()
                    || self.playback.load() != PlaybackState::Playing
                {
                    tracing::debug!(generation, "ignoring stale auto-advance");
                    return;
                }
                self.next(audio);
            }
            AppEvent::DownloadProgress(title) => {
                let message = format!("Downloading: {}...", truncate_chars(&title, 50));
                self.set_status(StatusLevel::Progress, &message);
            }
            AppEvent::DownloadFinished(report) => self.finish_download(report),
        }
    }

    fn finish_download(&mut self, report: DownloadReport) {
        self.downloading = false;
        match report.result {
            Ok(()) => {
                let title = report.title.unwrap_or_else(|| report.url.clone());
                self.rescan();
                let message = format!("Downloaded: {}...", truncate_chars(&title, 40));
                self.set_status(StatusLevel::Success, &message);
            }
            Err(err) => self.set_status(StatusLevel::Error, &err.status_message()),
        }
    }

    /// Reverts a non-error status to "Ready" once it has been shown long enough.
    pub fn tick_status(&mut self, now: Instant) {
        if matches!(self.status_level, StatusLevel::Error | StatusLevel::Progress)
            || self.status == READY
        {
            return;
        }
        if now.saturating_duration_since(self.status_set_at) >= STATUS_TIMEOUT {
            self.status = String::from(READY);
            self.status_level = StatusLevel::Info;
            self.dirty = true;
        }
    }

    pub fn set_status(&mut self, level: StatusLevel, message: &str) {
        self.status = message.to_string();
        self.status_level = level;
        self.status_set_at = Instant::now();
        self.dirty = true;
    }

    fn refresh_album_art(&mut self, path: &Path) {
        self.album_art = match &self.art_reader {
            Some(reader) => art::load_album_art(reader.as_ref(), path, self.art_size),
            None => AlbumArt::Unavailable,
        };
    }

    fn clear_album_art(&mut self) {
        self.album_art = if self.art_reader.is_some() {
            AlbumArt::Missing
        } else {
            AlbumArt::Unavailable
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{BusyProbe, NullAudioEngine, write_test_wav};
    use crate::error::DownloadFailure;
    use proptest::prop_assert;
    use std::collections::HashSet;
    use std::fs;
    use std::sync::mpsc;
    use tempfile::{TempDir, tempdir};

    #[derive(Default)]
    struct TestAudioEngine {
        loaded: Vec<PathBuf>,
        fail_on: Option<String>,
        paused: bool,
        stopped: usize,
        volume: f32,
    }

    struct NeverBusy;

    impl BusyProbe for NeverBusy {
        fn is_busy(&self) -> bool {
            false
        }
    }

    impl AudioEngine for TestAudioEngine {
        fn load(&mut self, path: &Path) -> anyhow::Result<()> {
            if let Some(bad) = &self.fail_on
                && path.ends_with(bad)
            {
                anyhow::bail!("unsupported file");
            }
            self.loaded.push(path.to_path_buf());
            Ok(())
        }

        fn play(&mut self) {
            self.paused = false;
        }

        fn pause(&mut self) {
            self.paused = true;
        }

        fn unpause(&mut self) {
            self.paused = false;
        }

        fn stop(&mut self) {
            self.stopped += 1;
        }

        fn set_volume(&mut self, volume: f32) {
            self.volume = volume;
        }

        fn volume(&self) -> f32 {
            self.volume
        }

        fn is_busy(&self) -> bool {
            false
        }

        fn position(&self) -> Option<Duration> {
            None
        }

        fn duration(&self) -> Option<Duration> {
            None
        }

        fn seek_to(&mut self, _position: Duration) -> anyhow::Result<()> {
            anyhow::bail!("not seekable")
        }

        fn busy_probe(&self) -> Arc<dyn BusyProbe> {
            Arc::new(NeverBusy)
        }

        fn output_name(&self) -> String {
            String::from("test")
        }
    }

    struct ScriptedDownloader;

    impl Downloader for ScriptedDownloader {
        fn probe_title(&self, url: &str) -> Result<String, PlayerError> {
            if url.contains("gone") {
                return Err(DownloadFailure::Unavailable.into());
            }
            Ok(String::from("New Song"))
        }

        fn fetch(&self, _url: &str, dest_folder: &Path) -> Result<(), PlayerError> {
            fs::write(dest_folder.join("New Song.mp3"), b"x")
                .map_err(|err| DownloadFailure::Failed(err.to_string()).into())
        }
    }

    fn folder_with(names: &[&str]) -> TempDir {
        let dir = tempdir().expect("tempdir");
        for name in names {
            fs::write(dir.path().join(name), b"x").expect("write track");
        }
        dir
    }

    fn loaded_core(names: &[&str]) -> (PlayerCore, TempDir) {
        let dir = folder_with(names);
        let mut core = PlayerCore::new(&PersistedState::default(), None).with_shuffle_seed(7);
        core.open_folder(dir.path());
        (core, dir)
    }

    fn select_by_name(core: &mut PlayerCore, name: &str, audio: &mut dyn AudioEngine) {
        let index = core.view.position_of(name).expect("track in view");
        core.select(index, audio);
    }

    fn current_name(core: &PlayerCore) -> Option<&str> {
        core.current_track().map(|track| track.file_name.as_str())
    }

    #[test]
    fn opening_folder_loads_tracks() {
        let (core, _dir) = loaded_core(&["A.mp3", "B.mp3", "notes.txt"]);
        assert_eq!(core.canonical.len(), 2);
        assert_eq!(core.view.cursor(), 0);
        assert_eq!(core.status, "Folder loaded successfully");
        assert_eq!(core.playback_state(), PlaybackState::Stopped);
    }

    #[test]
    fn empty_folder_reports_no_files_and_play_warns() {
        let (mut core, _dir) = loaded_core(&[]);
        assert!(core.canonical.is_empty());
        assert_eq!(core.status, "No MP3 files found in selected folder");

        let mut audio = TestAudioEngine::default();
        core.toggle_play(&mut audio);
        assert_eq!(core.status, "No songs in queue");
        assert_eq!(core.status_level, StatusLevel::Warning);
        assert!(audio.loaded.is_empty());

        core.next(&mut audio);
        core.previous(&mut audio);
        core.shuffle();
        assert_eq!(core.status, "Load songs first");
    }

    #[test]
    fn toggle_cycles_play_pause_resume() {
        let (mut core, _dir) = loaded_core(&["A.mp3"]);
        let mut audio = TestAudioEngine::default();

        core.toggle_play(&mut audio);
        assert_eq!(core.playback_state(), PlaybackState::Playing);
        assert_eq!(audio.loaded.len(), 1);
        assert_eq!(core.now_playing.as_ref().map(|t| t.file_name.as_str()), Some("A.mp3"));

        core.toggle_play(&mut audio);
        assert_eq!(core.playback_state(), PlaybackState::Paused);
        assert!(audio.paused);

        core.toggle_play(&mut audio);
        assert_eq!(core.playback_state(), PlaybackState::Playing);
        assert!(!audio.paused);
        assert_eq!(audio.loaded.len(), 1, "resume must not reload");
    }

    #[test]
    fn playback_error_stops_and_keeps_position() {
        let (mut core, _dir) = loaded_core(&["bad.mp3"]);
        let mut audio = TestAudioEngine {
            fail_on: Some(String::from("bad.mp3")),
            ..TestAudioEngine::default()
        };

        core.toggle_play(&mut audio);
        assert_eq!(core.playback_state(), PlaybackState::Stopped);
        assert_eq!(core.status_level, StatusLevel::Error);
        assert!(core.status.starts_with("Couldn't play bad.mp3"));
        assert_eq!(core.view.cursor(), 0);
        assert_eq!(core.generation(), 0);
    }

    #[test]
    fn next_while_stopped_only_moves_cursor() {
        let (mut core, _dir) = loaded_core(&["A.mp3", "B.mp3"]);
        let mut audio = TestAudioEngine::default();
        let first = current_name(&core).map(str::to_string);

        core.next(&mut audio);
        assert!(audio.loaded.is_empty());
        assert_ne!(current_name(&core).map(str::to_string), first);
        assert!(core.status.starts_with("Ready: "));
    }

    #[test]
    fn next_while_paused_plays_new_track() {
        let (mut core, _dir) = loaded_core(&["A.mp3", "B.mp3"]);
        let mut audio = TestAudioEngine::default();
        core.toggle_play(&mut audio);
        core.toggle_play(&mut audio);
        assert_eq!(core.playback_state(), PlaybackState::Paused);

        core.next(&mut audio);
        assert_eq!(core.playback_state(), PlaybackState::Playing);
        assert_eq!(audio.loaded.len(), 2);
        assert!(audio.loaded[1].ends_with(current_name(&core).expect("current")));
    }

    #[test]
    fn search_keeps_cursor_on_current_track() {
        let (mut core, _dir) = loaded_core(&["A.mp3", "B.mp3", "C.mp3"]);
        let mut audio = TestAudioEngine::default();
        select_by_name(&mut core, "B.mp3", &mut audio);

        core.set_query("b");
        assert_eq!(core.view.len(), 1);
        assert_eq!(current_name(&core), Some("B.mp3"));

        core.set_query("c");
        assert_eq!(core.view.cursor(), 0);
        assert_eq!(current_name(&core), Some("C.mp3"));

        core.set_query("");
        assert_eq!(core.view.len(), 3);
        assert_eq!(current_name(&core), Some("C.mp3"));
    }

    #[test]
    fn shuffle_keeps_current_track_and_clears_query() {
        let (mut core, _dir) = loaded_core(&["A.mp3", "B.mp3", "C.mp3", "D.mp3", "E.mp3"]);
        let mut audio = TestAudioEngine::default();
        select_by_name(&mut core, "B.mp3", &mut audio);
        core.set_query("b");

        for _ in 0..10 {
            core.shuffle();
            assert!(core.query.is_empty());
            assert_eq!(core.view.len(), 5);
            assert_eq!(current_name(&core), Some("B.mp3"));
        }
        assert_eq!(core.status, "Playlist shuffled");
    }

    #[test]
    fn selecting_the_playing_track_does_not_restart_it() {
        let (mut core, _dir) = loaded_core(&["A.mp3", "B.mp3"]);
        let mut audio = TestAudioEngine::default();
        core.toggle_play(&mut audio);
        let cursor = core.view.cursor();

        core.select(cursor, &mut audio);
        assert_eq!(audio.loaded.len(), 1);

        core.select((cursor + 1) % 2, &mut audio);
        assert_eq!(audio.loaded.len(), 2);

        core.select(99, &mut audio);
        assert_eq!(audio.loaded.len(), 2);
    }

    #[test]
    fn auto_advance_plays_next_track() {
        let (mut core, _dir) = loaded_core(&["A.mp3", "B.mp3"]);
        let mut audio = TestAudioEngine::default();
        core.toggle_play(&mut audio);
        let generation = core.generation();

        core.handle_event(AppEvent::AutoAdvance { generation }, &mut audio);
        assert_eq!(core.view.cursor(), 1);
        assert_eq!(audio.loaded.len(), 2);
        assert_eq!(core.generation(), generation + 1);
    }

    #[test]
    fn stale_or_paused_auto_advance_is_ignored() {
        let (mut core, _dir) = loaded_core(&["A.mp3", "B.mp3", "C.mp3"]);
        let mut audio = TestAudioEngine::default();
        core.toggle_play(&mut audio);
        let stale = core.generation();
        core.next(&mut audio);

        core.handle_event(AppEvent::AutoAdvance { generation: stale }, &mut audio);
        assert_eq!(core.view.cursor(), 1);

        core.toggle_play(&mut audio);
        let generation = core.generation();
        core.handle_event(AppEvent::AutoAdvance { generation }, &mut audio);
        assert_eq!(core.view.cursor(), 1);
        assert_eq!(core.playback_state(), PlaybackState::Paused);
    }

    #[test]
    fn rescan_resets_cursor_and_query() {
        let (mut core, dir) = loaded_core(&["A.mp3", "B.mp3"]);
        let mut audio = TestAudioEngine::default();
        core.next(&mut audio);
        core.set_query("a");

        fs::write(dir.path().join("C.mp3"), b"x").expect("write");
        core.rescan();
        assert_eq!(core.canonical.len(), 3);
        assert!(core.query.is_empty());
        assert_eq!(core.view.cursor(), 0);
    }

    #[test]
    fn volume_is_clamped_and_forwarded() {
        let (mut core, _dir) = loaded_core(&["A.mp3"]);
        let mut audio = TestAudioEngine::default();
        core.set_volume(&mut audio, 150);
        assert_eq!(core.volume_percent, 100);
        assert!((audio.volume - 1.0).abs() < f32::EPSILON);

        core.set_volume(&mut audio, 35);
        core.toggle_play(&mut audio);
        assert!((audio.volume - 0.35).abs() < 1e-6);
    }

    #[test]
    fn seek_failure_is_reported_softly() {
        let (mut core, _dir) = loaded_core(&["A.mp3"]);
        let mut audio = TestAudioEngine::default();
        core.seek_relative(&mut audio, 5);
        assert_eq!(core.status, "Folder loaded successfully");

        core.toggle_play(&mut audio);
        core.seek_relative(&mut audio, 5);
        assert_eq!(core.status_level, StatusLevel::Warning);
        assert_eq!(core.playback_state(), PlaybackState::Playing);
    }

    #[test]
    fn null_engine_seek_is_clamped_to_track_length() {
        let dir = tempdir().expect("tempdir");
        write_test_wav(&dir.path().join("A.mp3"), 2_000);
        let mut core = PlayerCore::new(&PersistedState::default(), None);
        core.open_folder(dir.path());
        let mut audio = NullAudioEngine::new();

        core.toggle_play(&mut audio);
        assert_eq!(core.playback_state(), PlaybackState::Playing);
        core.seek_relative(&mut audio, 30);
        assert_eq!(audio.position(), audio.duration());
        assert!(audio.duration().is_some());
    }

    #[test]
    fn null_engine_rejects_corrupt_file() {
        let (mut core, _dir) = loaded_core(&["broken.mp3"]);
        let mut audio = NullAudioEngine::new();

        core.toggle_play(&mut audio);
        assert_eq!(core.playback_state(), PlaybackState::Stopped);
        assert_eq!(core.status_level, StatusLevel::Error);
        assert!(core.status.starts_with("Couldn't play broken.mp3"));
        assert!(core.now_playing.is_none());
        assert!(!audio.is_busy());
    }

    #[test]
    fn oversized_art_setting_is_clamped() {
        let settings = PersistedState {
            art_size: u32::MAX,
            ..PersistedState::default()
        };
        let core = PlayerCore::new(&settings, None);
        assert_eq!(core.art_size, MAX_ART_SIZE);

        let settings = PersistedState {
            art_size: 0,
            ..PersistedState::default()
        };
        assert_eq!(PlayerCore::new(&settings, None).art_size, 1);
    }

    #[test]
    fn download_guards_run_in_order() {
        let mut core = PlayerCore::new(&PersistedState::default(), None);
        let downloader: Arc<dyn Downloader> = Arc::new(ScriptedDownloader);
        let (tx, _rx) = mpsc::channel();

        core.start_download("   ", downloader.clone(), tx.clone());
        assert_eq!(core.status, "Enter a valid URL");

        core.start_download("https://example.invalid/a", downloader.clone(), tx.clone());
        assert_eq!(core.status, "Select a folder first");

        let dir = folder_with(&[]);
        core.open_folder(dir.path());
        core.downloading = true;
        core.start_download("https://example.invalid/a", downloader, tx);
        assert_eq!(core.status, "A download is already in progress");
    }

    #[test]
    fn finished_download_rescans_folder() {
        let (mut core, _dir) = loaded_core(&["A.mp3"]);
        let mut audio = TestAudioEngine::default();
        let (tx, rx) = mpsc::channel();

        core.start_download("https://example.invalid/new", Arc::new(ScriptedDownloader), tx);
        assert!(core.downloading);
        assert_eq!(core.status, "Starting download...");

        let mut finished = false;
        while !finished {
            let event = rx
                .recv_timeout(Duration::from_secs(5))
                .expect("download event");
            finished = matches!(event, AppEvent::DownloadFinished(_));
            core.handle_event(event, &mut audio);
        }

        assert!(!core.downloading);
        assert_eq!(core.canonical.len(), 2);
        assert_eq!(core.status, "Downloaded: New Song...");
        assert_eq!(core.status_level, StatusLevel::Success);
    }

    #[test]
    fn failed_download_leaves_playlist_alone() {
        let (mut core, _dir) = loaded_core(&["A.mp3"]);
        let mut audio = TestAudioEngine::default();
        let (tx, rx) = mpsc::channel();

        core.start_download("https://example.invalid/gone", Arc::new(ScriptedDownloader), tx);
        let event = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("download event");
        core.handle_event(event, &mut audio);

        assert!(!core.downloading);
        assert_eq!(core.canonical.len(), 1);
        assert_eq!(core.status, "Video is unavailable or private");
        assert_eq!(core.status_level, StatusLevel::Error);
    }

    #[test]
    fn status_reverts_to_ready_except_errors() {
        let mut core = PlayerCore::new(&PersistedState::default(), None);
        core.set_status(StatusLevel::Success, "Playlist shuffled");
        core.tick_status(Instant::now());
        assert_eq!(core.status, "Playlist shuffled");
        core.tick_status(Instant::now() + STATUS_TIMEOUT);
        assert_eq!(core.status, READY);

        core.set_status(StatusLevel::Error, "Network error");
        core.tick_status(Instant::now() + STATUS_TIMEOUT * 2);
        assert_eq!(core.status, "Network error");
    }

    #[test]
    fn missing_art_reader_disables_art() {
        let (mut core, _dir) = loaded_core(&["A.mp3"]);
        let mut audio = TestAudioEngine::default();
        core.toggle_play(&mut audio);
        assert_eq!(core.album_art, AlbumArt::Unavailable);
        assert_eq!(core.playback_state(), PlaybackState::Playing);
    }

    proptest::proptest! {
        #[test]
        fn cursor_stays_in_bounds_after_random_commands(ops in proptest::collection::vec(0u8..9, 1..150)) {
            let (mut core, _dir) = loaded_core(&["alpha.mp3", "beta.mp3", "gamma.mp3", "delta.mp3"]);
            let mut audio = TestAudioEngine::default();
            let names: HashSet<String> =
                core.canonical.iter().map(|track| track.file_name.clone()).collect();

            for op in ops {
                match op {
                    0 => core.toggle_play(&mut audio),
                    1 => core.next(&mut audio),
                    2 => core.previous(&mut audio),
                    3 => core.shuffle(),
                    4 => core.set_query("a"),
                    5 => core.set_query("zzz"),
                    6 => core.set_query(""),
                    7 => core.select(usize::from(op) % 5, &mut audio),
                    _ => {
                        let generation = core.generation();
                        core.handle_event(AppEvent::AutoAdvance { generation }, &mut audio);
                    }
                }

                if core.view.is_empty() {
                    prop_assert!(core.view.cursor() == 0);
                } else {
                    prop_assert!(core.view.cursor() < core.view.len());
                }
                prop_assert!(core.view.entries().iter().all(|track| names.contains(&track.file_name)));
            }
        }
    }
}
