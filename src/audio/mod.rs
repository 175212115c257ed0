use anyhow::{Context, Result};
use lofty::file::AudioFile;
use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink, Source};
#[cfg(unix)]
use std::ffi::CString;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Read-only view of the engine's "still producing sound" flag, safe to poll
/// from the monitor thread.
pub trait BusyProbe: Send + Sync {
    fn is_busy(&self) -> bool;
}

pub trait AudioEngine {
    fn load(&mut self, path: &Path) -> Result<()>;
    fn play(&mut self);
    fn pause(&mut self);
    fn unpause(&mut self);
    fn stop(&mut self);
    fn set_volume(&mut self, volume: f32);
    fn volume(&self) -> f32;
    fn is_busy(&self) -> bool;
    fn position(&self) -> Option<Duration>;
    fn duration(&self) -> Option<Duration>;
    fn seek_to(&mut self, position: Duration) -> Result<()>;
    fn busy_probe(&self) -> Arc<dyn BusyProbe>;
    fn output_name(&self) -> String;
}

struct SinkProbe(Arc<Sink>);

impl BusyProbe for SinkProbe {
    fn is_busy(&self) -> bool {
        !self.0.empty()
    }
}

pub struct RodioAudioEngine {
    // Dropping the stream silences the sink.
    _stream: OutputStream,
    sink: Arc<Sink>,
    current: Option<PathBuf>,
    track_duration: Option<Duration>,
    volume: f32,
}

impl RodioAudioEngine {
    pub fn new() -> Result<Self> {
        let mut stream = with_silenced_stderr(|| {
            OutputStreamBuilder::from_default_device()
                .context("failed to open default system output stream")?
                .with_error_callback(|err| tracing::warn!(error = %err, "audio stream error"))
                .open_stream_or_fallback()
                .context("failed to start default output stream")
        })?;
        stream.log_on_drop(false);
        let sink = Arc::new(Sink::connect_new(stream.mixer()));
        sink.pause();

        Ok(Self {
            _stream: stream,
            sink,
            current: None,
            track_duration: None,
            volume: 1.0,
        })
    }
}

impl AudioEngine for RodioAudioEngine {
    fn load(&mut self, path: &Path) -> Result<()> {
        let file =
            File::open(path).with_context(|| format!("failed to open track {}", path.display()))?;
        let source = Decoder::try_from(file)
            .with_context(|| format!("failed to decode {}", path.display()))?;

        // clear() also pauses; play() resumes.
        self.sink.clear();
        self.track_duration = source.total_duration();
        self.sink.append(source);
        self.sink.set_volume(self.volume);
        self.current = Some(path.to_path_buf());
        tracing::debug!(path = %path.display(), "track loaded");
        Ok(())
    }

    fn play(&mut self) {
        self.sink.play();
    }

    fn pause(&mut self) {
        self.sink.pause();
    }

    fn unpause(&mut self) {
        self.sink.play();
    }

    fn stop(&mut self) {
        self.sink.clear();
        self.current = None;
        self.track_duration = None;
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        self.sink.set_volume(self.volume);
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn is_busy(&self) -> bool {
        !self.sink.empty()
    }

    fn position(&self) -> Option<Duration> {
        self.current.as_ref()?;
        Some(self.sink.get_pos())
    }

    fn duration(&self) -> Option<Duration> {
        self.track_duration
    }

    fn seek_to(&mut self, position: Duration) -> Result<()> {
        if self.current.is_none() {
            return Err(anyhow::anyhow!("no active track"));
        }

        self.sink
            .try_seek(position)
            .map_err(|err| anyhow::anyhow!("failed to seek current track: {err:?}"))
    }

    fn busy_probe(&self) -> Arc<dyn BusyProbe> {
        Arc::new(SinkProbe(Arc::clone(&self.sink)))
    }

    fn output_name(&self) -> String {
        String::from("System default output")
    }
}

#[cfg(unix)]
fn with_silenced_stderr<T>(operation: impl FnOnce() -> T) -> T {
    let saved = unsafe { libc::dup(libc::STDERR_FILENO) };
    if saved < 0 {
        return operation();
    }

    let devnull = CString::new("/dev/null")
        .ok()
        .map(|path| unsafe { libc::open(path.as_ptr(), libc::O_WRONLY) })
        .unwrap_or(-1);

    if devnull >= 0 {
        unsafe {
            libc::dup2(devnull, libc::STDERR_FILENO);
            libc::close(devnull);
        }
    }

    let result = operation();

    unsafe {
        libc::dup2(saved, libc::STDERR_FILENO);
        libc::close(saved);
    }

    result
}

#[cfg(not(unix))]
fn with_silenced_stderr<T>(operation: impl FnOnce() -> T) -> T {
    operation()
}

#[derive(Debug, Default)]
struct NullClock {
    loaded: bool,
    paused: bool,
    started_at: Option<Instant>,
    position_offset: Duration,
    track_duration: Option<Duration>,
}

impl NullClock {
    fn position(&self) -> Duration {
        let mut position = self.position_offset;
        if !self.paused
            && let Some(started_at) = self.started_at
        {
            position = position.saturating_add(started_at.elapsed());
        }
        match self.track_duration {
            Some(duration) => position.min(duration),
            None => position,
        }
    }

    fn is_busy(&self) -> bool {
        if !self.loaded {
            return false;
        }
        match self.track_duration {
            Some(duration) => self.position() < duration,
            None => true,
        }
    }
}

struct NullProbe(Arc<Mutex<NullClock>>);

impl BusyProbe for NullProbe {
    fn is_busy(&self) -> bool {
        self.0.lock().map(|clock| clock.is_busy()).unwrap_or(false)
    }
}

/// Silent engine used when no output device can be opened. Keeps a logical
/// clock so position, pause and end-of-track still behave.
pub struct NullAudioEngine {
    clock: Arc<Mutex<NullClock>>,
    current: Option<PathBuf>,
    volume: f32,
}

impl NullAudioEngine {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(Mutex::new(NullClock::default())),
            current: None,
            volume: 1.0,
        }
    }

    /// Decodes enough of `path` to learn its length. Fails like the real engine
    /// would on a missing or undecodable file.
    fn probe_duration(path: &Path) -> Result<Option<Duration>> {
        let file =
            File::open(path).with_context(|| format!("failed to open track {}", path.display()))?;
        let source = Decoder::try_from(file)
            .with_context(|| format!("failed to decode {}", path.display()))?;
        let duration = source
            .total_duration()
            .or_else(|| tagged_duration(path))
            .filter(|duration| !duration.is_zero());
        Ok(duration)
    }

    fn with_clock<T>(&self, operation: impl FnOnce(&mut NullClock) -> T) -> Option<T> {
        self.clock.lock().ok().map(|mut clock| operation(&mut clock))
    }
}

fn tagged_duration(path: &Path) -> Option<Duration> {
    let tagged = lofty::read_from_path(path).ok()?;
    Some(tagged.properties().duration())
}

impl Default for NullAudioEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioEngine for NullAudioEngine {
    fn load(&mut self, path: &Path) -> Result<()> {
        let track_duration = Self::probe_duration(path)?;
        self.with_clock(|clock| {
            *clock = NullClock {
                loaded: true,
                paused: true,
                started_at: None,
                position_offset: Duration::ZERO,
                track_duration,
            };
        });
        self.current = Some(path.to_path_buf());
        Ok(())
    }

    fn play(&mut self) {
        self.unpause();
    }

    fn pause(&mut self) {
        self.with_clock(|clock| {
            clock.position_offset = clock.position();
            clock.started_at = None;
            clock.paused = true;
        });
    }

    fn unpause(&mut self) {
        self.with_clock(|clock| {
            if clock.loaded && clock.paused {
                clock.started_at = Some(Instant::now());
            }
            clock.paused = false;
        });
    }

    fn stop(&mut self) {
        self.with_clock(|clock| *clock = NullClock::default());
        self.current = None;
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn is_busy(&self) -> bool {
        self.with_clock(|clock| clock.is_busy()).unwrap_or(false)
    }

    fn position(&self) -> Option<Duration> {
        self.current.as_ref()?;
        self.with_clock(|clock| clock.position())
    }

    fn duration(&self) -> Option<Duration> {
        self.with_clock(|clock| clock.track_duration).flatten()
    }

    fn seek_to(&mut self, position: Duration) -> Result<()> {
        if self.current.is_none() {
            return Err(anyhow::anyhow!("no active track"));
        }

        self.with_clock(|clock| {
            clock.position_offset = clock
                .track_duration
                .map_or(position, |duration| position.min(duration));
            clock.started_at = (!clock.paused).then(Instant::now);
        });
        Ok(())
    }

    fn busy_probe(&self) -> Arc<dyn BusyProbe> {
        Arc::new(NullProbe(Arc::clone(&self.clock)))
    }

    fn output_name(&self) -> String {
        String::from("Null audio engine")
    }
}

/// Writes a silent mono 16-bit WAV of `duration_ms` for engine tests.
#[cfg(test)]
pub(crate) fn write_test_wav(path: &Path, duration_ms: u32) {
    let sample_rate: u32 = 44_100;
    let channels: u16 = 1;
    let bits_per_sample: u16 = 16;
    let bytes_per_sample = u32::from(bits_per_sample / 8);
    let total_samples = (u64::from(sample_rate) * u64::from(duration_ms) / 1_000) as u32;
    let data_size = total_samples * u32::from(channels) * bytes_per_sample;
    let byte_rate = sample_rate * u32::from(channels) * bytes_per_sample;
    let block_align = channels * (bits_per_sample / 8);
    let riff_chunk_size = 36_u32.saturating_add(data_size);

    let mut bytes = Vec::with_capacity((44_u32 + data_size) as usize);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&riff_chunk_size.to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16_u32.to_le_bytes());
    bytes.extend_from_slice(&1_u16.to_le_bytes());
    bytes.extend_from_slice(&channels.to_le_bytes());
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&byte_rate.to_le_bytes());
    bytes.extend_from_slice(&block_align.to_le_bytes());
    bytes.extend_from_slice(&bits_per_sample.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_size.to_le_bytes());
    bytes.resize((44_u32 + data_size) as usize, 0_u8);

    std::fs::write(path, bytes).expect("wav fixture should be written");
}
