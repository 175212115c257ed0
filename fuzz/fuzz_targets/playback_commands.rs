#![no_main]

use libfuzzer_sys::fuzz_target;
use mp3deck::audio::NullAudioEngine;
use mp3deck::core::PlayerCore;
use mp3deck::event::AppEvent;
use mp3deck::model::{PersistedState, Track};
use mp3deck::playlist::PlaylistView;
use std::path::PathBuf;

const QUERIES: [&str; 4] = ["", "track_1", "  TRACK ", "zzz"];

fuzz_target!(|data: &[u8]| {
    let mut core = PlayerCore::new(&PersistedState::default(), None).with_shuffle_seed(0);
    let mut audio = NullAudioEngine::new();
    let len = data.first().map_or(1, |byte| usize::from(*byte) % 24);
    core.canonical = (0..len)
        .filter_map(|idx| Track::from_path(PathBuf::from(format!("track_{idx}.mp3"))))
        .collect();
    core.view = PlaylistView::new(core.canonical.clone());

    for byte in data {
        match byte % 9 {
            0 => core.toggle_play(&mut audio),
            1 => core.next(&mut audio),
            2 => core.previous(&mut audio),
            3 => core.shuffle(),
            4 => core.set_query(QUERIES[usize::from(byte / 9) % QUERIES.len()]),
            5 => core.select(usize::from(byte / 9), &mut audio),
            6 => core.stop(&mut audio),
            7 => core.seek_relative(&mut audio, i64::from(*byte) - 128),
            _ => {
                let generation = core.generation();
                core.handle_event(AppEvent::AutoAdvance { generation }, &mut audio);
            }
        }

        if core.view.is_empty() {
            assert_eq!(core.view.cursor(), 0);
        } else {
            assert!(core.view.cursor() < core.view.len());
        }
    }
});
