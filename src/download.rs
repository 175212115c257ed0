use crate::error::{DownloadFailure, PlayerError};
use crate::event::AppEvent;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::thread;

/// Fetches remote media into a local folder.
pub trait Downloader: Send + Sync {
    fn probe_title(&self, url: &str) -> Result<String, PlayerError>;
    fn fetch(&self, url: &str, dest_folder: &Path) -> Result<(), PlayerError>;
}

/// Shells out to a `yt-dlp` executable, extracting best-quality mp3 audio
/// with the thumbnail and metadata embedded.
#[derive(Debug, Clone)]
pub struct YtDlpDownloader {
    program: String,
    ffmpeg_location: Option<PathBuf>,
}

impl YtDlpDownloader {
    pub fn new(program: impl Into<String>, ffmpeg_location: Option<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ffmpeg_location,
        }
    }

    fn fetch_args(&self, url: &str, dest_folder: &Path) -> Vec<String> {
        let mut args = vec![
            String::from("--quiet"),
            String::from("--no-warnings"),
            String::from("--format"),
            String::from("bestaudio/best"),
            String::from("--extract-audio"),
            String::from("--audio-format"),
            String::from("mp3"),
            String::from("--audio-quality"),
            String::from("0"),
            String::from("--embed-thumbnail"),
            String::from("--add-metadata"),
            String::from("--output"),
            dest_folder
                .join("%(title)s.%(ext)s")
                .to_string_lossy()
                .to_string(),
        ];
        if let Some(ffmpeg) = &self.ffmpeg_location {
            args.push(String::from("--ffmpeg-location"));
            args.push(ffmpeg.to_string_lossy().to_string());
        }
        args.push(String::from("--"));
        args.push(url.to_string());
        args
    }

    fn run(&self, args: &[String]) -> Result<Output, PlayerError> {
        tracing::debug!(program = %self.program, ?args, "running downloader");
        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|err| match err.kind() {
                io::ErrorKind::NotFound => DownloadFailure::ToolMissing(self.program.clone()),
                _ => DownloadFailure::Failed(err.to_string()),
            })?;

        if output.status.success() {
            return Ok(output);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = stderr
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or("downloader exited with an error");
        tracing::warn!(status = ?output.status.code(), detail, "downloader failed");
        Err(DownloadFailure::classify(detail).into())
    }
}

impl Downloader for YtDlpDownloader {
    fn probe_title(&self, url: &str) -> Result<String, PlayerError> {
        let args = [
            String::from("--no-warnings"),
            String::from("--skip-download"),
            String::from("--print"),
            String::from("title"),
            String::from("--"),
            url.to_string(),
        ];
        let output = self.run(&args)?;
        let title = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(if title.is_empty() {
            String::from("Unknown")
        } else {
            title
        })
    }

    fn fetch(&self, url: &str, dest_folder: &Path) -> Result<(), PlayerError> {
        self.run(&self.fetch_args(url, dest_folder)).map(|_| ())
    }
}

/// Result of one finished download, posted back to the owning thread.
#[derive(Debug)]
pub struct DownloadReport {
    pub url: String,
    pub title: Option<String>,
    pub result: Result<(), PlayerError>,
}

/// Runs one download on a worker thread. Posts at most one
/// [`AppEvent::DownloadProgress`] and exactly one [`AppEvent::DownloadFinished`].
pub fn spawn_download(
    downloader: Arc<dyn Downloader>,
    url: String,
    dest_folder: PathBuf,
    events: Sender<AppEvent>,
) -> io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name(String::from("download"))
        .spawn(move || {
            let report = run_download(downloader.as_ref(), url, &dest_folder, &events);
            if events.send(AppEvent::DownloadFinished(report)).is_err() {
                tracing::debug!("download finished after the player shut down");
            }
        })
}

fn run_download(
    downloader: &dyn Downloader,
    url: String,
    dest_folder: &Path,
    events: &Sender<AppEvent>,
) -> DownloadReport {
    tracing::info!(%url, dest = %dest_folder.display(), "download started");
    let title = match downloader.probe_title(&url) {
        Ok(title) => title,
        Err(err) => {
            return DownloadReport {
                url,
                title: None,
                result: Err(err),
            };
        }
    };
    if events.send(AppEvent::DownloadProgress(title.clone())).is_err() {
        tracing::debug!(%title, "download progress dropped, player shut down");
    }

    let result = downloader.fetch(&url, dest_folder);
    match &result {
        Ok(()) => tracing::info!(%url, %title, "download finished"),
        Err(err) => tracing::warn!(%url, error = %err, "download failed"),
    }
    DownloadReport {
        url,
        title: Some(title),
        result,
    }
}
