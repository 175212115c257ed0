use crate::app::{InputMode, InputState};
use crate::art::{AlbumArt, ArtImage};
use crate::audio::AudioEngine;
use crate::core::PlayerCore;
use crate::model::{PlaybackState, StatusLevel};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap};
use std::time::Duration;

const APP_TITLE: &str = "mp3deck  ";
const KEY_HINTS: &str =
    "space play/pause  n/p next/prev  s shuffle  / search  : command  +/- volume  q quit";

struct Palette {
    bg: Color,
    panel_bg: Color,
    panel_alt_bg: Color,
    border: Color,
    text: Color,
    muted: Color,
    accent: Color,
    alert: Color,
    error: Color,
    success: Color,
    selected_bg: Color,
}

const PALETTE: Palette = Palette {
    bg: Color::Rgb(10, 15, 24),
    panel_bg: Color::Rgb(19, 29, 43),
    panel_alt_bg: Color::Rgb(24, 38, 58),
    border: Color::Rgb(69, 121, 176),
    text: Color::Rgb(214, 228, 248),
    muted: Color::Rgb(149, 173, 204),
    accent: Color::Rgb(100, 203, 184),
    alert: Color::Rgb(249, 174, 88),
    error: Color::Rgb(240, 98, 98),
    success: Color::Rgb(130, 214, 120),
    selected_bg: Color::Rgb(34, 55, 82),
};

pub fn draw(frame: &mut Frame, core: &PlayerCore, audio: &dyn AudioEngine, input: &InputState) {
    let colors = &PALETTE;
    frame.render_widget(
        Block::default().style(Style::default().bg(colors.bg)),
        frame.area(),
    );

    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(3),
            Constraint::Length(3),
        ])
        .split(frame.area());

    frame.render_widget(
        Paragraph::new(header_line(core, input)).block(panel_block(
            "Search",
            colors.panel_bg,
            colors.text,
            colors.border,
        )),
        vertical[0],
    );

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(vertical[1]);

    draw_playlist(frame, core, input, body[0]);

    let side = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(6), Constraint::Length(5)])
        .split(body[1]);

    draw_album_art(frame, &core.album_art, side[0]);
    draw_now_playing(frame, core, side[1]);

    frame.render_widget(
        Paragraph::new(Span::styled(
            timeline_line(audio, core.volume_percent, 26, 12),
            Style::default().fg(colors.text),
        ))
        .block(panel_block(
            "Timeline",
            colors.panel_bg,
            colors.text,
            colors.border,
        )),
        vertical[2],
    );

    let footer = Paragraph::new(Line::from(vec![
        Span::styled(
            core.status.as_str(),
            Style::default().fg(status_color(core.status_level)),
        ),
        Span::styled("  |  ", Style::default().fg(colors.muted)),
        Span::styled(KEY_HINTS, Style::default().fg(colors.muted)),
    ]))
    .block(panel_block(
        "Message",
        colors.panel_bg,
        colors.text,
        colors.border,
    ));
    frame.render_widget(footer, vertical[3]);
}

fn header_line<'a>(core: &'a PlayerCore, input: &'a InputState) -> Line<'a> {
    let colors = &PALETTE;
    let prompt = match input.mode {
        InputMode::Search => Span::styled(
            format!("/{}_", input.buffer),
            Style::default().fg(colors.accent),
        ),
        InputMode::Command => Span::styled(
            format!(":{}_", input.buffer),
            Style::default().fg(colors.alert),
        ),
        InputMode::Normal if core.query.is_empty() => {
            Span::styled("press / to search", Style::default().fg(colors.muted))
        }
        InputMode::Normal => Span::styled(
            format!("filter: {}", core.query),
            Style::default().fg(colors.text),
        ),
    };

    Line::from(vec![
        Span::styled(
            APP_TITLE,
            Style::default()
                .fg(colors.accent)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!("Tracks {}/{}", core.view.len(), core.canonical.len()),
            Style::default().fg(colors.text),
        ),
        Span::styled("  |  ", Style::default().fg(colors.muted)),
        prompt,
    ])
}

fn draw_playlist(frame: &mut Frame, core: &PlayerCore, input: &InputState, area: Rect) {
    let colors = &PALETTE;
    let playing = core.now_playing.as_ref().map(|track| track.file_name.as_str());
    let items: Vec<ListItem> = core
        .view
        .entries()
        .iter()
        .enumerate()
        .map(|(index, track)| {
            let marker = if Some(track.file_name.as_str()) == playing {
                "  > "
            } else if index == core.view.cursor() {
                "  * "
            } else {
                "    "
            };
            ListItem::new(Line::from(vec![
                Span::styled(marker, Style::default().fg(colors.accent)),
                Span::styled(track.display_name.as_str(), Style::default().fg(colors.text)),
            ]))
        })
        .collect();

    let mut state = ListState::default();
    if !core.view.is_empty() {
        state.select(Some(input.highlight.min(core.view.len() - 1)));
    }

    let title = match &core.folder {
        Some(folder) => format!("Playlist / {}", folder.display()),
        None => String::from("Playlist (:open <folder>)"),
    };
    let list = List::new(items)
        .block(panel_block(&title, colors.panel_bg, colors.text, colors.border))
        .highlight_style(
            Style::default()
                .bg(colors.selected_bg)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("-> ");
    frame.render_stateful_widget(list, area, &mut state);
}

fn draw_album_art(frame: &mut Frame, art: &AlbumArt, area: Rect) {
    let colors = &PALETTE;
    let block = panel_block("Album Art", colors.panel_alt_bg, colors.text, colors.border);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let paragraph = match art {
        AlbumArt::Image(image) => Paragraph::new(art_lines(image, inner.width, inner.height)),
        other => Paragraph::new(Span::styled(
            other.placeholder().unwrap_or_default(),
            Style::default().fg(colors.muted),
        ))
        .alignment(Alignment::Center),
    };
    frame.render_widget(paragraph, inner);
}

/// Renders `image` with upper half blocks, two pixel rows per terminal row.
fn art_lines(image: &ArtImage, columns: u16, rows: u16) -> Vec<Line<'static>> {
    // Terminal cells are roughly twice as tall as wide.
    let side = columns.min(rows.saturating_mul(2));
    let (columns, rows) = (u32::from(side), u32::from(side / 2));
    let pixel_rows = rows * 2;

    (0..rows)
        .map(|row| {
            let spans: Vec<Span<'static>> = (0..columns)
                .map(|column| {
                    let [tr, tg, tb] = image.sample(columns, pixel_rows, column, row * 2);
                    let [br, bg, bb] = image.sample(columns, pixel_rows, column, row * 2 + 1);
                    Span::styled(
                        "\u{2580}",
                        Style::default()
                            .fg(Color::Rgb(tr, tg, tb))
                            .bg(Color::Rgb(br, bg, bb)),
                    )
                })
                .collect();
            Line::from(spans)
        })
        .collect()
}

fn draw_now_playing(frame: &mut Frame, core: &PlayerCore, area: Rect) {
    let colors = &PALETTE;
    let title = core
        .now_playing
        .as_ref()
        .map_or("-", |track| track.display_name.as_str());
    let state = match core.playback_state() {
        PlaybackState::Playing => "Playing",
        PlaybackState::Paused => "Paused",
        PlaybackState::Stopped => "Stopped",
    };
    let download = if core.downloading { "  (downloading)" } else { "" };

    let text = vec![
        Line::from(vec![
            Span::styled(
                "Now",
                Style::default()
                    .fg(colors.accent)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(format!("  {title}"), Style::default().fg(colors.text)),
        ]),
        Line::from(Span::styled(
            format!("{state}{download}"),
            Style::default().fg(colors.muted),
        )),
    ];
    frame.render_widget(
        Paragraph::new(text)
            .block(panel_block(
                "Now Playing",
                colors.panel_alt_bg,
                colors.text,
                colors.border,
            ))
            .wrap(Wrap { trim: true }),
        area,
    );
}

fn status_color(level: StatusLevel) -> Color {
    match level {
        StatusLevel::Info => PALETTE.text,
        StatusLevel::Success => PALETTE.success,
        StatusLevel::Warning | StatusLevel::Progress => PALETTE.alert,
        StatusLevel::Error => PALETTE.error,
    }
}

fn panel_block(title: &str, bg: Color, text: Color, border: Color) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .title(Span::styled(
            format!(" {title} "),
            Style::default().fg(text).add_modifier(Modifier::BOLD),
        ))
        .border_style(Style::default().fg(border))
        .style(Style::default().bg(bg))
}

fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;
    format!("{minutes:02}:{seconds:02}")
}

fn progress_bar(ratio: Option<f64>, width: usize) -> String {
    let clamped = ratio.unwrap_or(0.0).clamp(0.0, 1.0);
    let filled = (clamped * width as f64).round() as usize;
    let mut bar = String::with_capacity(width + 2);
    bar.push('[');
    bar.push_str(&"#".repeat(filled));
    bar.push_str(&"-".repeat(width.saturating_sub(filled)));
    bar.push(']');
    bar
}

fn timeline_line(
    audio: &dyn AudioEngine,
    volume_percent: u8,
    timeline_bar_width: usize,
    volume_bar_width: usize,
) -> String {
    let elapsed = audio.position().unwrap_or(Duration::from_secs(0));
    let total = audio.duration();
    let ratio = total.and_then(|duration| {
        let total_secs = duration.as_secs_f64();
        (total_secs > 0.0).then_some((elapsed.as_secs_f64() / total_secs).clamp(0.0, 1.0))
    });

    format!(
        "{} / {} {}  |  Vol {} {:>3}%",
        format_duration(elapsed),
        total
            .map(format_duration)
            .unwrap_or_else(|| String::from("--:--")),
        progress_bar(ratio, timeline_bar_width),
        progress_bar(Some(f64::from(volume_percent) / 100.0), volume_bar_width),
        volume_percent
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::NullAudioEngine;
    use crate::model::PersistedState;
    use image::{ImageFormat, Rgb, RgbImage};
    use ratatui::backend::TestBackend;
    use std::io::Cursor;

    fn solid_art(color: [u8; 3]) -> ArtImage {
        let image = RgbImage::from_pixel(8, 8, Rgb(color));
        let mut out = Cursor::new(Vec::new());
        image
            .write_to(&mut out, ImageFormat::Png)
            .expect("encode png");
        let AlbumArt::Image(art) = AlbumArt::from_bytes(&out.into_inner(), 8).expect("decode")
        else {
            panic!("expected image");
        };
        art
    }

    #[test]
    fn progress_bar_fills_proportionally() {
        assert_eq!(progress_bar(Some(0.5), 4), "[##--]");
        assert_eq!(progress_bar(None, 3), "[---]");
        assert_eq!(progress_bar(Some(7.0), 2), "[##]");
    }

    #[test]
    fn durations_render_as_minutes_and_seconds() {
        assert_eq!(format_duration(Duration::from_secs(75)), "01:15");
    }

    #[test]
    fn art_uses_half_blocks_in_a_square() {
        let art = solid_art([10, 20, 30]);
        let lines = art_lines(&art, 20, 4);
        assert_eq!(lines.len(), 4);
        assert!(lines.iter().all(|line| line.spans.len() == 8));
        let style = lines[0].spans[0].style;
        assert_eq!(style.fg, Some(Color::Rgb(10, 20, 30)));
        assert_eq!(style.bg, Some(Color::Rgb(10, 20, 30)));
    }

    #[test]
    fn draws_empty_player_without_panicking() {
        let core = PlayerCore::new(&PersistedState::default(), None);
        let audio = NullAudioEngine::new();
        let input = InputState::default();
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).expect("terminal");
        terminal
            .draw(|frame| draw(frame, &core, &audio, &input))
            .expect("draw");

        let rendered: String = terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect();
        assert!(rendered.contains("Ready"));
        assert!(rendered.contains("Art disabled"));
    }
}
