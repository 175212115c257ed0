use crate::audio::BusyProbe;
use crate::event::AppEvent;
use crate::model::{PlaybackCell, PlaybackState};
use std::io;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Watching,
}

/// Edge detector for natural end-of-track.
///
/// Emits one advance request per busy-to-idle transition observed while
/// playing. After emitting it stays quiet until the engine reports busy again
/// or a new track has been started.
#[derive(Debug)]
pub struct PlaybackMonitor {
    state: MonitorState,
    advanced_generation: Option<u64>,
}

impl Default for PlaybackMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackMonitor {
    pub fn new() -> Self {
        Self {
            state: MonitorState::Idle,
            advanced_generation: None,
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn tick(&mut self, playback: PlaybackState, generation: u64, busy: bool) -> Option<AppEvent> {
        self.state = if playback.is_active() {
            MonitorState::Watching
        } else {
            MonitorState::Idle
        };

        if busy {
            self.advanced_generation = None;
            return None;
        }

        if playback != PlaybackState::Playing || self.advanced_generation == Some(generation) {
            return None;
        }

        self.advanced_generation = Some(generation);
        Some(AppEvent::AutoAdvance { generation })
    }
}

/// Owns the monitor thread. Dropping or calling [`MonitorHandle::stop`]
/// cancels the loop and joins it.
pub struct MonitorHandle {
    cancel: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Dropping the sender wakes the loop with a disconnect.
        self.cancel.take();
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            tracing::warn!("playback monitor thread panicked");
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub fn spawn_monitor(
    playback: PlaybackCell,
    probe: Arc<dyn BusyProbe>,
    events: Sender<AppEvent>,
    interval: Duration,
) -> io::Result<MonitorHandle> {
    let (cancel_tx, cancel_rx) = mpsc::channel::<()>();
    let thread = thread::Builder::new()
        .name(String::from("playback-monitor"))
        .spawn(move || {
            let mut monitor = PlaybackMonitor::new();
            tracing::debug!(interval_ms = interval.as_millis() as u64, "playback monitor started");
            loop {
                match cancel_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }

                let state = playback.load();
                let generation = playback.generation();
                let Some(event) = monitor.tick(state, generation, probe.is_busy()) else {
                    continue;
                };
                tracing::debug!(generation, "track ended, requesting auto-advance");
                if events.send(event).is_err() {
                    break;
                }
            }
            tracing::debug!("playback monitor stopped");
        })?;

    Ok(MonitorHandle {
        cancel: Some(cancel_tx),
        thread: Some(thread),
    })
}
