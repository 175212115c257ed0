use crate::error::PlayerError;
use crate::model::Track;
use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const AUDIO_EXTENSIONS: &[&str] = &["mp3"];

/// Lists the audio files directly inside `folder`, in directory-listing order.
///
/// An unreadable folder yields an empty list; the failure is logged.
pub fn scan_folder(folder: &Path) -> Vec<Track> {
    match try_scan_folder(folder) {
        Ok(tracks) => tracks,
        Err(err) => {
            tracing::warn!(error = %err, "library scan failed");
            Vec::new()
        }
    }
}

pub fn try_scan_folder(folder: &Path) -> Result<Vec<Track>, PlayerError> {
    let mut tracks = Vec::new();

    for entry in WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => {
                let source = err
                    .into_io_error()
                    .unwrap_or_else(|| io::Error::other("folder could not be listed"));
                return Err(PlayerError::Scan {
                    folder: folder.to_path_buf(),
                    source,
                });
            }
            Err(err) => {
                tracing::debug!(error = %err, "skipping unreadable entry");
                continue;
            }
        };

        let path = entry.path();
        if !entry.file_type().is_file() || is_hidden(entry.file_name()) || !is_audio(path) {
            continue;
        }

        if let Some(track) = Track::from_path(PathBuf::from(path)) {
            tracks.push(track);
        }
    }

    tracing::info!(folder = %folder.display(), count = tracks.len(), "scanned folder");
    Ok(tracks)
}

/// Dotfiles, including the `._name.mp3` sidecars macOS leaves on shared drives.
fn is_hidden(file_name: &OsStr) -> bool {
    file_name.to_string_lossy().starts_with('.')
}

pub fn is_audio(path: &Path) -> bool {
    let ext = path.extension().and_then(OsStr::to_str).unwrap_or_default();
    AUDIO_EXTENSIONS
        .iter()
        .any(|supported| ext.eq_ignore_ascii_case(supported))
}
