use crate::art::{ArtReader, LoftyArtReader};
use crate::audio::{AudioEngine, NullAudioEngine, RodioAudioEngine};
use crate::config;
use crate::core::PlayerCore;
use crate::download::{Downloader, YtDlpDownloader};
use crate::event::AppEvent;
use crate::logging;
use crate::model::{PersistedState, StatusLevel};
use crate::monitor;
use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use std::io::stdout;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{self, Sender};
use std::time::{Duration, Instant};

const VOLUME_STEP: u8 = 5;
const SEEK_STEP_SECONDS: i64 = 5;
const HELP_TEXT: &str = "Commands: open <folder> | download <url> | rescan | volume <0-100> | stop | quit";

#[derive(Debug, Default, Clone)]
pub struct AppStartupOptions {
    pub folder: Option<PathBuf>,
    pub volume_percent: Option<u8>,
    pub disable_art: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    Search,
    Command,
}

/// Keyboard-side state that is not part of the player itself.
#[derive(Debug, Default)]
pub struct InputState {
    pub mode: InputMode,
    pub buffer: String,
    pub highlight: usize,
}

/// Collaborators handed to commands that start background work.
pub struct Services {
    pub downloader: Arc<dyn Downloader>,
    pub events: Sender<AppEvent>,
}

pub fn run_with_startup(options: AppStartupOptions) -> Result<()> {
    let _log_guard = match config::log_dir().and_then(|dir| logging::init_logging(&dir)) {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("warning: logging disabled: {err:#}");
            None
        }
    };

    let settings = match config::load_state() {
        Ok(settings) => settings,
        Err(err) => {
            tracing::warn!(error = %format!("{err:#}"), "settings unreadable, using defaults");
            PersistedState::default()
        }
    };

    let art_reader: Option<Box<dyn ArtReader>> =
        (!options.disable_art).then(|| Box::new(LoftyArtReader) as Box<dyn ArtReader>);
    let mut core = PlayerCore::new(&settings, art_reader);

    let mut audio: Box<dyn AudioEngine> = match RodioAudioEngine::new() {
        Ok(engine) => Box::new(engine),
        Err(err) => {
            tracing::warn!(error = %format!("{err:#}"), "no audio output, using null engine");
            Box::new(NullAudioEngine::new())
        }
    };
    tracing::info!(output = %audio.output_name(), "audio engine ready");

    if let Some(percent) = options.volume_percent {
        core.volume_percent = percent.min(100);
    }
    audio.set_volume(core.volume_fraction());

    if let Some(folder) = options.folder.as_ref().or(settings.last_folder.as_ref()) {
        core.open_folder(folder);
    }

    let (events_tx, events_rx) = mpsc::channel();
    let services = Services {
        downloader: Arc::new(YtDlpDownloader::new(
            settings.downloader_program.clone(),
            settings.ffmpeg_location.clone(),
        )),
        events: events_tx.clone(),
    };
    let monitor = monitor::spawn_monitor(
        core.playback_cell(),
        audio.busy_probe(),
        events_tx,
        Duration::from_millis(settings.monitor_interval_ms.max(1)),
    )?;

    enable_raw_mode()?;
    let mut out = stdout();
    execute!(out, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(out);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let mut input = InputState::default();
    let mut last_tick = Instant::now();

    let result: Result<()> = loop {
        for event in events_rx.try_iter() {
            core.handle_event(event, &mut *audio);
            input.highlight = core.view.cursor();
        }
        core.tick_status(Instant::now());

        if core.dirty || last_tick.elapsed() > Duration::from_millis(250) {
            terminal.draw(|frame| crate::ui::draw(frame, &core, &*audio, &input))?;
            core.dirty = false;
            last_tick = Instant::now();
        }

        if !event::poll(Duration::from_millis(33))? {
            continue;
        }

        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        if handle_key(&mut core, &mut *audio, &mut input, &services, key) {
            break Ok(());
        }
    };

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    monitor.stop();
    audio.stop();
    let save_result = config::save_state(&core.persisted_state(&settings));
    if let Err(err) = &save_result {
        tracing::error!(error = %format!("{err:#}"), "failed to save settings");
    }
    tracing::info!("shutting down");
    result?;
    save_result?;
    Ok(())
}

/// Applies one key press. Returns `true` when the app should quit.
pub fn handle_key(
    core: &mut PlayerCore,
    audio: &mut dyn AudioEngine,
    input: &mut InputState,
    services: &Services,
    key: KeyEvent,
) -> bool {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return true;
    }

    match input.mode {
        InputMode::Search => {
            handle_search_key(core, input, key);
            return false;
        }
        InputMode::Command => return handle_command_key(core, audio, input, services, key),
        InputMode::Normal => {}
    }

    match key.code {
        KeyCode::Char('q') => return true,
        KeyCode::Down => {
            if !core.view.is_empty() {
                input.highlight = (input.highlight + 1).min(core.view.len() - 1);
                core.dirty = true;
            }
            return false;
        }
        KeyCode::Up => {
            input.highlight = input.highlight.saturating_sub(1);
            core.dirty = true;
            return false;
        }
        KeyCode::Enter => core.select(input.highlight, audio),
        KeyCode::Char(' ') => core.toggle_play(audio),
        KeyCode::Char('n') => core.next(audio),
        KeyCode::Char('p') => core.previous(audio),
        KeyCode::Char('s') => core.shuffle(),
        KeyCode::Char('x') => core.stop(audio),
        KeyCode::Char('r') => core.rescan(),
        KeyCode::Left => core.seek_relative(audio, -SEEK_STEP_SECONDS),
        KeyCode::Right => core.seek_relative(audio, SEEK_STEP_SECONDS),
        KeyCode::Char('+') | KeyCode::Char('=') => {
            let next = core.volume_percent.saturating_add(VOLUME_STEP);
            core.set_volume(audio, next);
        }
        KeyCode::Char('-') => {
            let next = core.volume_percent.saturating_sub(VOLUME_STEP);
            core.set_volume(audio, next);
        }
        KeyCode::Char('/') => {
            input.mode = InputMode::Search;
            input.buffer = core.query.clone();
            core.dirty = true;
        }
        KeyCode::Char(':') => {
            input.mode = InputMode::Command;
            input.buffer.clear();
            core.dirty = true;
        }
        _ => return false,
    }

    input.highlight = core.view.cursor();
    false
}

fn handle_search_key(core: &mut PlayerCore, input: &mut InputState, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            input.mode = InputMode::Normal;
            input.buffer.clear();
            core.set_query("");
        }
        KeyCode::Enter => {
            input.mode = InputMode::Normal;
            input.buffer.clear();
            core.dirty = true;
        }
        KeyCode::Backspace => {
            input.buffer.pop();
            core.set_query(&input.buffer);
        }
        KeyCode::Char(ch) => {
            input.buffer.push(ch);
            core.set_query(&input.buffer);
        }
        _ => return,
    }
    input.highlight = core.view.cursor();
}

fn handle_command_key(
    core: &mut PlayerCore,
    audio: &mut dyn AudioEngine,
    input: &mut InputState,
    services: &Services,
    key: KeyEvent,
) -> bool {
    match key.code {
        KeyCode::Esc => {
            input.mode = InputMode::Normal;
            input.buffer.clear();
            core.dirty = true;
        }
        KeyCode::Enter => {
            let raw = std::mem::take(&mut input.buffer);
            input.mode = InputMode::Normal;
            let quit = run_command(core, audio, services, &raw);
            input.highlight = core.view.cursor();
            return quit;
        }
        KeyCode::Backspace => {
            input.buffer.pop();
            core.dirty = true;
        }
        KeyCode::Char(ch) => {
            input.buffer.push(ch);
            core.dirty = true;
        }
        _ => {}
    }
    false
}

/// Runs a `:` command line. Returns `true` for `quit`.
pub fn run_command(
    core: &mut PlayerCore,
    audio: &mut dyn AudioEngine,
    services: &Services,
    raw: &str,
) -> bool {
    let input = raw.trim();
    if input.is_empty() {
        core.set_status(StatusLevel::Info, "No command");
        return false;
    }

    let mut command_split = input.splitn(2, char::is_whitespace);
    let command = command_split.next().unwrap_or_default();
    let rest = command_split.next().unwrap_or("").trim();

    match command {
        "help" => core.set_status(StatusLevel::Info, HELP_TEXT),
        "open" => {
            if rest.is_empty() {
                core.set_status(StatusLevel::Warning, "Usage: open <folder>");
            } else {
                core.open_folder(&PathBuf::from(rest));
            }
        }
        "download" => {
            core.start_download(rest, Arc::clone(&services.downloader), services.events.clone())
        }
        "rescan" => core.rescan(),
        "stop" => core.stop(audio),
        "volume" => match rest.parse::<u8>() {
            Ok(percent) if percent <= 100 => core.set_volume(audio, percent),
            _ => core.set_status(StatusLevel::Warning, "Usage: volume <0-100>"),
        },
        "quit" | "q" => return true,
        _ => core.set_status(StatusLevel::Warning, "Unknown command. Use :help"),
    }
    false
}
