use crate::model::Track;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Tracks of `canonical` whose lower-cased display name contains the trimmed,
/// lower-cased `query`, in canonical order.
pub fn filter_tracks(canonical: &[Track], query: &str) -> Vec<Track> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return canonical.to_vec();
    }

    canonical
        .iter()
        .filter(|track| track.display_name.to_lowercase().contains(&needle))
        .cloned()
        .collect()
}

/// The navigable view and the cursor into it.
///
/// The cursor is always in bounds for a non-empty view and sits at 0 when the
/// view is empty.
#[derive(Debug, Clone, Default)]
pub struct PlaylistView {
    entries: Vec<Track>,
    cursor: usize,
}

impl PlaylistView {
    pub fn new(entries: Vec<Track>) -> Self {
        Self { entries, cursor: 0 }
    }

    pub fn entries(&self) -> &[Track] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn current(&self) -> Option<&Track> {
        self.entries.get(self.cursor)
    }

    pub fn position_of(&self, file_name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|track| track.file_name == file_name)
    }

    /// Moves one step with wraparound. Does nothing on an empty view.
    pub fn advance(&mut self, direction: Direction) {
        let len = self.entries.len();
        if len == 0 {
            return;
        }
        self.cursor = match direction {
            Direction::Forward => (self.cursor + 1) % len,
            Direction::Backward => (self.cursor + len - 1) % len,
        };
    }

    /// Swaps in `entries` and points the cursor at the track it pointed at
    /// before, falling back to 0 when that track is gone.
    pub fn rebuild(&mut self, entries: Vec<Track>) {
        let previous = self.current().map(|track| track.file_name.clone());
        self.entries = entries;
        self.cursor = previous
            .and_then(|file_name| self.position_of(&file_name))
            .unwrap_or(0);
    }

    /// Replaces the view and resets the cursor to 0.
    pub fn reset(&mut self, entries: Vec<Track>) {
        self.entries = entries;
        self.cursor = 0;
    }

    /// Jumps to `index`. Out-of-range indices leave the cursor alone.
    pub fn select(&mut self, index: usize) -> bool {
        if index >= self.entries.len() {
            return false;
        }
        self.cursor = index;
        true
    }
}
