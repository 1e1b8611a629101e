use crate::config::{self, Config};
use crate::core::input::{InputSource, Key, Keymap, LaneInput, VirtualAction};
use crate::core::transport::Transport;
use crate::error::{AudioStartError, CalibrationError, ConfigError};
use crate::game::calibration::{CalibrationResult, DelayDetector, DetectorPhase, TapOutcome};
use crate::game::chart::Chart;
use crate::game::gameplay::JudgmentEvent;
use crate::game::scores::{ScoreStore, SongKey};
use crate::game::scroll::ScrollSpeed;
use crate::game::session::{Phase, Session, SessionSettings, SessionSummary};

use log::{info, warn};

/* -------------------- modes -------------------- */

/// What owns the frame loop right now. Calibration and gameplay never run
/// at the same time: each lives in its own variant.
pub enum Mode<T: Transport> {
    Menu,
    Calibrating(DelayDetector),
    Playing(Box<Session<T>>),
}

/* -------------------- events -------------------- */

#[derive(Debug, Clone)]
pub enum AppEvent {
    /// Calibration cues due this tick; the host plays one beep each.
    CueFired { count: usize },
    Judged(JudgmentEvent),
    CalibrationFinished(Result<CalibrationResult, CalibrationError>),
    /// The audio engine refused to start or resume. Retry on a user gesture.
    AudioBlocked(AudioStartError),
    SessionFinished { summary: SessionSummary, new_best: bool },
}

/* -------------------- app -------------------- */

/// Top-level state: the active mode plus the settings and score store that
/// outlive any one session.
pub struct App<T: Transport> {
    config: Config,
    keymap: Keymap,
    mode: Mode<T>,
    scores: ScoreStore,
    persist_settings: bool,
}

impl<T: Transport> App<T> {
    pub fn new(config: Config, scores: ScoreStore) -> Self {
        Self {
            keymap: config.keymap,
            config,
            mode: Mode::Menu,
            scores,
            persist_settings: false,
        }
    }

    /// Write settings changes through to the global config file.
    pub fn with_persisted_settings(mut self) -> Self {
        self.persist_settings = true;
        self
    }

    pub const fn config(&self) -> &Config {
        &self.config
    }

    pub const fn mode(&self) -> &Mode<T> {
        &self.mode
    }

    pub fn session(&self) -> Option<&Session<T>> {
        match &self.mode {
            Mode::Playing(s) => Some(s.as_ref()),
            _ => None,
        }
    }

    pub fn session_mut(&mut self) -> Option<&mut Session<T>> {
        match &mut self.mode {
            Mode::Playing(s) => Some(s.as_mut()),
            _ => None,
        }
    }

    pub fn detector(&self) -> Option<&DelayDetector> {
        match &self.mode {
            Mode::Calibrating(d) => Some(d),
            _ => None,
        }
    }

    pub fn scores_mut(&mut self) -> &mut ScoreStore {
        &mut self.scores
    }

    /* ---------- calibration offset ---------- */

    /// Stores a new offset; out-of-range values leave the current one alone.
    pub fn apply_calibration_offset(&mut self, offset_ms: i32) -> Result<(), ConfigError> {
        self.config.set_calibration_offset_ms(offset_ms)?;
        if self.persist_settings {
            config::update_calibration_offset_ms(offset_ms)?;
        }
        info!("Calibration offset set to {offset_ms} ms.");
        Ok(())
    }

    /// Manual entry from the settings screen. The error's text is the
    /// validation message to show.
    pub fn enter_manual_offset(&mut self, input: &str) -> Result<i32, ConfigError> {
        let value = config::parse_calibration_offset(input)?;
        self.apply_calibration_offset(value)?;
        Ok(value)
    }

    /// Takes effect from the next session; a running one keeps its speed.
    pub fn set_scroll_speed(&mut self, speed: ScrollSpeed) {
        self.config.scroll_speed = speed;
        if self.persist_settings {
            config::update_scroll_speed(speed);
        }
        info!("Scroll speed set to {speed}.");
    }

    /* ---------- calibration ---------- */

    pub fn open_calibration(&mut self, now_ms: f64) -> bool {
        if !matches!(self.mode, Mode::Menu) {
            return false;
        }
        let mut detector = DelayDetector::new(self.config.calibration);
        detector.start(now_ms);
        self.mode = Mode::Calibrating(detector);
        true
    }

    /// Restarts a finished or cancelled detection without leaving the modal.
    pub fn retry_calibration(&mut self, now_ms: f64) -> bool {
        match &mut self.mode {
            Mode::Calibrating(d) if d.phase() != DetectorPhase::Running => {
                d.start(now_ms);
                true
            }
            _ => false,
        }
    }

    /// Applies the offset the last detection run produced.
    pub fn apply_detected_offset(&mut self) -> Result<i32, CalibrationError> {
        let offset = match &self.mode {
            Mode::Calibrating(d) => d.recommended_offset_ms()?,
            _ => return Err(CalibrationError::NotRunning),
        };
        self.apply_calibration_offset(offset)?;
        Ok(offset)
    }

    /// Closes the modal, discarding the detection session.
    pub fn close_calibration(&mut self) {
        if let Mode::Calibrating(d) = &mut self.mode {
            d.cancel();
            self.mode = Mode::Menu;
        }
    }

    /* ---------- gameplay ---------- */

    /// Builds a session from the current settings and begins its countdown.
    pub fn start_session(&mut self, song: SongKey, chart: Chart, transport: T) -> bool {
        if !matches!(self.mode, Mode::Menu) {
            return false;
        }
        let mut session = Session::new(song, chart, transport, SessionSettings::from_config(&self.config));
        session.prepare();
        session.begin();
        self.mode = Mode::Playing(Box::new(session));
        true
    }

    /// Stops any running session or detection and discards it.
    pub fn exit_to_menu(&mut self) {
        match &mut self.mode {
            Mode::Playing(s) => s.stop(),
            Mode::Calibrating(d) => d.cancel(),
            Mode::Menu => return,
        }
        self.mode = Mode::Menu;
    }

    /* ---------- input ---------- */

    pub fn handle_key(&mut self, key: Key, now_ms: f64) -> Option<AppEvent> {
        let action = self.keymap.action_for(key)?;
        if let Mode::Calibrating(_) = self.mode {
            return match action {
                VirtualAction::Lane(_) | VirtualAction::Tap => self.calibration_tap(now_ms),
                VirtualAction::Back => {
                    self.close_calibration();
                    None
                }
                VirtualAction::Start => {
                    self.retry_calibration(now_ms);
                    None
                }
            };
        }
        let Mode::Playing(session) = &mut self.mode else {
            return None;
        };
        match action {
            VirtualAction::Lane(lane) => session
                .handle_lane_input(LaneInput { lane, pressed: true, source: InputSource::Keyboard })
                .map(AppEvent::Judged),
            VirtualAction::Back => {
                session.toggle_pause();
                None
            }
            VirtualAction::Start => {
                // retry after a refused audio start, or leave the pause
                match session.phase() {
                    Phase::Preparing => {
                        session.begin();
                    }
                    Phase::Paused => {
                        session.resume();
                    }
                    _ => {}
                }
                None
            }
            VirtualAction::Tap => None,
        }
    }

    pub fn handle_key_release(&mut self, key: Key) {
        if let (Mode::Playing(session), Some(VirtualAction::Lane(lane))) =
            (&mut self.mode, self.keymap.action_for(key))
        {
            session.handle_lane_input(LaneInput { lane, pressed: false, source: InputSource::Keyboard });
        }
    }

    /// Touch and pointer edges arrive already mapped to a lane.
    pub fn handle_lane_input(&mut self, input: LaneInput, now_ms: f64) -> Option<AppEvent> {
        if let Mode::Calibrating(_) = self.mode {
            return if input.pressed { self.calibration_tap(now_ms) } else { None };
        }
        match &mut self.mode {
            Mode::Playing(session) => session.handle_lane_input(input).map(AppEvent::Judged),
            _ => None,
        }
    }

    fn calibration_tap(&mut self, now_ms: f64) -> Option<AppEvent> {
        let Mode::Calibrating(detector) = &mut self.mode else {
            return None;
        };
        match detector.tap(now_ms) {
            TapOutcome::Finished => detector.result().cloned().map(AppEvent::CalibrationFinished),
            TapOutcome::Recorded { .. } | TapOutcome::Ignored => None,
        }
    }

    /* ---------- frame ---------- */

    /// One display frame. `now_ms` is the monotonic clock calibration cues
    /// and taps are measured on; gameplay reads its own transport clock.
    pub fn tick(&mut self, delta_seconds: f32, now_ms: f64) -> Vec<AppEvent> {
        let mut events = Vec::new();
        match &mut self.mode {
            Mode::Menu => {}
            Mode::Calibrating(detector) => {
                let count = detector.tick(now_ms);
                if count > 0 {
                    events.push(AppEvent::CueFired { count });
                }
            }
            Mode::Playing(session) => match session.update(delta_seconds) {
                Err(e) => {
                    warn!("{e}");
                    events.push(AppEvent::AudioBlocked(e));
                }
                Ok(out) => {
                    events.extend(out.judgments.into_iter().map(AppEvent::Judged));
                    if out.finished {
                        let summary = session.summary();
                        let new_best = match self.scores.submit(&summary.song, &summary.stats) {
                            Ok(b) => b,
                            Err(e) => {
                                warn!("Failed to store high score: {e}");
                                false
                            }
                        };
                        events.push(AppEvent::SessionFinished { summary, new_best });
                    }
                }
            },
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::input::Lane;
    use crate::core::transport::SimulatedTransport;
    use crate::game::chart::NoteSpec;
    use crate::game::judgment::JudgeGrade;

    const DT: f32 = 1.0 / 60.0;

    fn app(dir: &std::path::Path) -> App<SimulatedTransport> {
        let mut cfg = Config::default();
        cfg.countdown_seconds = 0.25;
        App::new(cfg, ScoreStore::new(dir))
    }

    fn chart(notes: &[(usize, f64)]) -> Chart {
        let specs = notes
            .iter()
            .map(|&(l, t)| NoteSpec { lane: Lane::new(l).unwrap(), time_ms: t })
            .collect();
        Chart::new(128.0, None, specs).unwrap()
    }

    fn frame(app: &mut App<SimulatedTransport>) -> Vec<AppEvent> {
        if let Some(s) = app.session_mut() {
            s.transport_mut().advance(f64::from(DT));
        }
        app.tick(DT, 0.0)
    }

    #[test]
    fn calibration_and_gameplay_are_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        assert!(app.open_calibration(0.0));
        assert!(!app.start_session(SongKey::new("a", "b"), chart(&[]), SimulatedTransport::new(1.0)));
        app.close_calibration();
        assert!(app.start_session(SongKey::new("a", "b"), chart(&[]), SimulatedTransport::new(1.0)));
        assert!(!app.open_calibration(0.0));
        app.exit_to_menu();
        assert!(matches!(app.mode(), Mode::Menu));
    }

    #[test]
    fn detected_offset_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        app.open_calibration(0.0);
        let mut finished = None;
        let mut cues = 0;
        let mut t = 0.0;
        while finished.is_none() && t < 10_000.0 {
            t += 10.0;
            for ev in app.tick(0.01, t) {
                if let AppEvent::CueFired { count } = ev {
                    cues += count;
                }
            }
            // react 40 ms after every cue
            let due = app.detector().unwrap().cues().last().copied();
            if let Some(cue) = due
                && (t - (cue + 40.0)).abs() < 1e-9
            {
                finished = app.handle_key(Key::Space, t);
            }
        }
        assert!(cues >= 10);
        let Some(AppEvent::CalibrationFinished(Ok(result))) = finished else {
            panic!("calibration did not finish");
        };
        assert_eq!(result.offset_ms, 40);
        assert_eq!(result.valid_count, 10);
        assert_eq!(app.apply_detected_offset(), Ok(40));
        assert_eq!(app.config().calibration_offset_ms, 40);
        app.close_calibration();
        assert!(matches!(app.mode(), Mode::Menu));
    }

    #[test]
    fn failed_detection_leaves_offset_alone() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        app.apply_calibration_offset(-20).unwrap();
        app.open_calibration(0.0);
        let mut last = None;
        // every tap lands before the first cue
        for i in 0..10 {
            last = app.handle_key(Key::Char('d'), f64::from(i) * 10.0);
        }
        assert!(matches!(
            last,
            Some(AppEvent::CalibrationFinished(Err(CalibrationError::Incomplete { taps: 10 })))
        ));
        assert!(app.apply_detected_offset().is_err());
        assert_eq!(app.config().calibration_offset_ms, -20);
        assert!(app.retry_calibration(200.0));
        assert_eq!(app.detector().unwrap().phase(), DetectorPhase::Running);
    }

    #[test]
    fn manual_entry_out_of_range_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        app.enter_manual_offset("35").unwrap();
        let err = app.enter_manual_offset("1000").unwrap_err();
        assert!(err.to_string().contains("between -500 ms and 500 ms"));
        assert_eq!(app.config().calibration_offset_ms, 35);
    }

    #[test]
    fn scroll_speed_applies_to_the_next_session() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        app.set_scroll_speed(ScrollSpeed::Fast);
        assert_eq!(app.config().scroll_speed, ScrollSpeed::Fast);
        app.start_session(SongKey::new("a", "b"), chart(&[(0, 3000.0)]), SimulatedTransport::new(5.0));
        let session = app.session().unwrap();
        assert_eq!(session.field().geometry().pixels_per_ms, ScrollSpeed::Fast.pixels_per_ms());
    }

    #[test]
    fn escape_toggles_pause() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        app.start_session(SongKey::new("a", "b"), chart(&[(0, 3000.0)]), SimulatedTransport::new(5.0));
        while app.session().unwrap().phase() != Phase::Playing {
            frame(&mut app);
        }
        app.handle_key(Key::Escape, 0.0);
        assert_eq!(app.session().unwrap().phase(), Phase::Paused);
        app.handle_key(Key::Escape, 0.0);
        assert!(matches!(app.session().unwrap().phase(), Phase::Countdown { resuming: true, .. }));
    }

    #[test]
    fn finished_session_stores_a_new_best() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        let song = SongKey::new("Skyline", "normal");
        app.start_session(song.clone(), chart(&[(1, 400.0)]), SimulatedTransport::new(1.0));

        let mut judged = None;
        let mut done = None;
        for _ in 0..200 {
            for ev in frame(&mut app) {
                if let AppEvent::SessionFinished { summary, new_best } = ev {
                    done = Some((summary, new_best));
                }
            }
            if done.is_some() {
                break;
            }
            let now = app.session().unwrap().frame_time_ms();
            if judged.is_none() && now >= 400.0 {
                judged = app.handle_key(Key::Char('f'), 0.0);
                app.handle_key_release(Key::Char('f'));
            }
        }
        assert!(matches!(judged, Some(AppEvent::Judged(ev)) if ev.judgment.grade == JudgeGrade::Perfect));
        let (summary, new_best) = done.expect("session finished");
        assert!(new_best);
        assert_eq!(summary.stats.score(), 300);
        assert_eq!(app.scores_mut().best(&song).map(|h| h.score), Some(300));
        assert_eq!(app.session().unwrap().phase(), Phase::Finished);
    }

    #[test]
    fn blocked_audio_is_reported_and_retried_with_start() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        let mut transport = SimulatedTransport::new(2.0);
        transport.set_blocked(true);
        app.start_session(SongKey::new("a", "b"), chart(&[(0, 1000.0)]), transport);
        let mut blocked = false;
        for _ in 0..60 {
            if frame(&mut app).iter().any(|e| matches!(e, AppEvent::AudioBlocked(_))) {
                blocked = true;
                break;
            }
        }
        assert!(blocked);
        assert_eq!(app.session().unwrap().phase(), Phase::Preparing);
        app.session_mut().unwrap().transport_mut().set_blocked(false);
        app.handle_key(Key::Enter, 0.0);
        assert!(matches!(app.session().unwrap().phase(), Phase::Countdown { resuming: false, .. }));
    }
}
