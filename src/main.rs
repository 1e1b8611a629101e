use std::path::PathBuf;

use hypehero::app::{App, AppEvent};
use hypehero::config;
use hypehero::core::input::{InputSource, Lane, LaneInput};
use hypehero::core::transport::SimulatedTransport;
use hypehero::game::chart::load_chart_file;
use hypehero::game::scores::{ScoreStore, SongKey};
use hypehero::game::session::{Phase, SessionSummary};

const FRAME_SECONDS: f32 = 1.0 / 60.0;
/// Seconds of audio after the last note.
const TRACK_TAIL_SECONDS: f64 = 2.0;
/// Press offsets cycled over notes so the autoplay is not frame-perfect.
const HUMANISED_OFFSETS_MS: [f64; 6] = [-12.0, 4.0, 9.0, -3.0, 15.0, -7.0];

fn usage() -> String {
    "usage: hypehero <chart.json> [song] [difficulty]".to_string()
}

fn print_summary(summary: &SessionSummary, new_best: bool) {
    let stats = &summary.stats;
    let counts = stats.counts();
    println!("{} [{}]", summary.song.song, summary.song.difficulty);
    println!("  score     {}{}", stats.score(), if new_best { "  (new best)" } else { "" });
    println!("  max combo {}", stats.max_combo());
    println!("  accuracy  {}% ({:.2}%)", stats.accuracy_display(), stats.accuracy_percent());
    println!(
        "  perfect {}  good {}  fair {}  miss {}",
        counts.perfect, counts.good, counts.fair, counts.miss
    );
    if let Some(hint) = summary.timing.suggested_offset_ms() {
        println!(
            "  timing    mean {:+.1} ms, stddev {:.1} ms (offset hint {hint} ms)",
            summary.timing.mean_ms, summary.timing.stddev_ms
        );
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install logger immediately, then set runtime max level from config after loading it.
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Trace)
        .try_init();
    // Startup default when config is missing or malformed.
    log::set_max_level(log::LevelFilter::Warn);

    config::load();
    let cfg = config::get();
    log::set_max_level(cfg.log_level.as_level_filter());

    let mut args = std::env::args().skip(1);
    let chart_path = PathBuf::from(args.next().ok_or_else(usage)?);
    let song = args.next().unwrap_or_else(|| {
        chart_path
            .file_stem()
            .map_or_else(|| "unknown".to_string(), |s| s.to_string_lossy().into_owned())
    });
    let difficulty = args.next().unwrap_or_else(|| "normal".to_string());

    let chart = load_chart_file(&chart_path)?;
    let track_seconds = chart.last_note_time_ms() / 1000.0 + TRACK_TAIL_SECONDS;
    let max_frames = ((track_seconds + f64::from(cfg.countdown_seconds) + 10.0) / f64::from(FRAME_SECONDS)) as usize;

    let mut app = App::new(cfg, ScoreStore::open_default()).with_persisted_settings();
    app.start_session(SongKey::new(song, difficulty), chart, SimulatedTransport::new(track_seconds));

    for _ in 0..max_frames {
        let Some(session) = app.session_mut() else {
            break;
        };
        session.transport_mut().advance(f64::from(FRAME_SECONDS));

        for event in app.tick(FRAME_SECONDS, 0.0) {
            match event {
                AppEvent::SessionFinished { summary, new_best } => {
                    print_summary(&summary, new_best);
                    app.exit_to_menu();
                    return Ok(());
                }
                AppEvent::AudioBlocked(e) => return Err(e.into()),
                _ => {}
            }
        }

        let Some(session) = app.session_mut() else {
            break;
        };
        if session.phase() != Phase::Playing {
            continue;
        }
        let now = session.frame_time_ms();
        let due: Vec<Lane> = Lane::all()
            .filter(|&lane| {
                session.field().next_pending(lane).is_some_and(|n| {
                    now >= n.target_time_ms + HUMANISED_OFFSETS_MS[n.id.index() % HUMANISED_OFFSETS_MS.len()]
                })
            })
            .collect();
        for lane in due {
            session.handle_lane_input(LaneInput { lane, pressed: true, source: InputSource::Keyboard });
            session.handle_lane_input(LaneInput { lane, pressed: false, source: InputSource::Keyboard });
        }
    }

    app.exit_to_menu();
    Err("playback did not finish".into())
}
