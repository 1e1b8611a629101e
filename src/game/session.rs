//! One play-through of one chart: the lifecycle state machine plus the
//! per-frame work that ties the clock, the note field and the judgment
//! engine together.
//!
//! ```text
//! Idle -> Preparing -> Countdown -> Playing <-> Paused -> Countdown(resume)
//!                          |           |
//!                          +- audio ---+-> Finished
//!                             refused
//!                          -> Preparing
//! ```
//!
//! The host drives everything through [`Session::update`] once per display
//! frame and forwards lane edges to [`Session::handle_lane_input`] as they
//! arrive. The clock is read once per frame; presses in that frame are
//! judged against the same reading.

use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, info};
use smallvec::SmallVec;

use crate::config::Config;
use crate::core::input::{LANE_COUNT, LaneInput, LaneState};
use crate::core::transport::{Transport, TransportClock};
use crate::error::AudioStartError;
use crate::game::chart::Chart;
use crate::game::gameplay::{JudgmentEvent, apply_expiry_misses, judge_a_tap};
use crate::game::notefield::{FieldGeometry, NoteField, NoteView};
use crate::game::scores::SongKey;
use crate::game::stats::SessionStats;
use crate::game::timing_stats::{TimingStats, compute_note_timing_stats};
use crate::game::timing_windows::TimingWindows;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one run. Restarting issues a new id, so anything keyed to the
/// old run can tell it is stale.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Phase {
    Idle,
    Preparing,
    Countdown { remaining_s: f32, resuming: bool },
    Playing,
    Paused,
    Finished,
}

impl Phase {
    const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Preparing => "preparing",
            Self::Countdown { resuming: false, .. } => "countdown",
            Self::Countdown { resuming: true, .. } => "resume countdown",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Finished => "finished",
        }
    }
}

/// Everything a session takes from the configuration, read once at
/// construction.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SessionSettings {
    pub windows: TimingWindows,
    pub geometry: FieldGeometry,
    pub countdown_seconds: f32,
    pub calibration_offset_ms: i32,
}

impl SessionSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            windows: cfg.timing_windows,
            geometry: FieldGeometry::from_config(cfg),
            countdown_seconds: cfg.countdown_seconds.max(0.0),
            calibration_offset_ms: cfg.calibration_offset_ms,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct HudState {
    pub score: u64,
    pub combo: u32,
    /// Whole percent, as displayed.
    pub accuracy: u32,
}

/// Read-only view for the renderer, rebuilt on demand.
#[derive(Clone, Debug)]
pub struct FrameSnapshot {
    pub session: SessionId,
    pub phase: Phase,
    pub effective_time_ms: f64,
    pub notes: Vec<NoteView>,
    pub hud: HudState,
    /// Whole seconds left on the countdown.
    pub countdown: Option<u32>,
    pub lanes_pressed: [bool; LANE_COUNT],
}

#[derive(Clone, Debug, Default)]
pub struct FrameOutcome {
    /// Misses generated this frame.
    pub judgments: SmallVec<[JudgmentEvent; 4]>,
    /// The session reached `Finished` this frame.
    pub finished: bool,
}

#[derive(Clone, Debug)]
pub struct SessionSummary {
    pub song: SongKey,
    pub stats: SessionStats,
    pub timing: TimingStats,
}

pub struct Session<T: Transport> {
    id: SessionId,
    song: SongKey,
    chart: Chart,
    clock: TransportClock<T>,
    field: NoteField,
    stats: SessionStats,
    lanes: LaneState,
    settings: SessionSettings,
    phase: Phase,
    frame_time_ms: f64,
    log_timer: f32,
}

impl<T: Transport> Session<T> {
    pub fn new(song: SongKey, chart: Chart, transport: T, settings: SessionSettings) -> Self {
        let field = NoteField::new(&chart, settings.geometry, &settings.windows);
        Self {
            id: SessionId::next(),
            song,
            clock: TransportClock::new(transport, settings.calibration_offset_ms),
            chart,
            field,
            stats: SessionStats::default(),
            lanes: LaneState::default(),
            settings,
            phase: Phase::Idle,
            frame_time_ms: 0.0,
            log_timer: 0.0,
        }
    }

    fn set_phase(&mut self, next: Phase) {
        if self.phase.name() != next.name() {
            info!("Session {}: {} -> {}", self.id.0, self.phase.name(), next.name());
        }
        self.phase = next;
    }

    fn reset_play_state(&mut self) {
        self.field = NoteField::new(&self.chart, self.settings.geometry, &self.settings.windows);
        self.stats = SessionStats::default();
        self.lanes.release_all();
        self.frame_time_ms = 0.0;
        self.log_timer = 0.0;
    }

    /// `Idle → Preparing`. The chart is already validated at this point.
    pub fn prepare(&mut self) -> bool {
        if self.phase != Phase::Idle {
            return false;
        }
        self.set_phase(Phase::Preparing);
        true
    }

    /// `Preparing → Countdown`. Also the retry path after the audio engine
    /// refused to start.
    pub fn begin(&mut self) -> bool {
        if self.phase != Phase::Preparing {
            return false;
        }
        self.set_phase(Phase::Countdown { remaining_s: self.settings.countdown_seconds, resuming: false });
        true
    }

    /// `Playing → Paused`, freezing the transport and all judgment. Pausing
    /// during a resume countdown goes straight back to `Paused`.
    pub fn pause(&mut self) -> bool {
        match self.phase {
            Phase::Playing => {
                self.clock.pause();
                self.lanes.release_all();
                self.set_phase(Phase::Paused);
                true
            }
            Phase::Countdown { resuming: true, .. } => {
                self.set_phase(Phase::Paused);
                true
            }
            _ => false,
        }
    }

    /// `Paused → Countdown`; the transport resumes when it runs out.
    pub fn resume(&mut self) -> bool {
        if self.phase != Phase::Paused {
            return false;
        }
        self.set_phase(Phase::Countdown { remaining_s: self.settings.countdown_seconds, resuming: true });
        true
    }

    pub fn toggle_pause(&mut self) -> bool {
        match self.phase {
            Phase::Paused => self.resume(),
            _ => self.pause(),
        }
    }

    /// Stops playback and returns to `Preparing` with the same chart and
    /// fresh stats, under a new session id.
    pub fn restart(&mut self) {
        self.clock.stop();
        self.reset_play_state();
        self.id = SessionId::next();
        self.set_phase(Phase::Preparing);
    }

    /// Stops playback for good. Nothing is judged after this.
    pub fn stop(&mut self) {
        self.clock.stop();
        self.lanes.release_all();
        self.set_phase(Phase::Idle);
    }

    fn finish(&mut self) {
        self.clock.stop();
        self.lanes.release_all();
        self.set_phase(Phase::Finished);
        info!(
            "Session {} finished: score {}, max combo {}, accuracy {:.2}%",
            self.id.0,
            self.stats.score(),
            self.stats.max_combo(),
            self.stats.accuracy_percent()
        );
    }

    /// Advances the session by one display frame of `delta_seconds`.
    ///
    /// An audio start failure is returned and leaves the session in
    /// `Preparing` (or `Paused` when resuming); the frame loop keeps running.
    pub fn update(&mut self, delta_seconds: f32) -> Result<FrameOutcome, AudioStartError> {
        let dt = if delta_seconds.is_finite() { delta_seconds.max(0.0) } else { 0.0 };
        let mut out = FrameOutcome::default();

        if let Phase::Countdown { remaining_s, resuming } = self.phase {
            let remaining_s = remaining_s - dt;
            if remaining_s > 0.0 {
                self.phase = Phase::Countdown { remaining_s, resuming };
                return Ok(out);
            }
            if resuming {
                if let Err(e) = self.clock.resume() {
                    self.set_phase(Phase::Paused);
                    return Err(e);
                }
            } else {
                let at = TransportClock::<T>::start_offset_seconds_for(self.clock.calibration_offset_ms());
                if let Err(e) = self.clock.start(at) {
                    self.set_phase(Phase::Preparing);
                    return Err(e);
                }
            }
            self.set_phase(Phase::Playing);
            // the countdown frame itself plays no time
            self.frame_time_ms = self.clock.current_effective_time_ms();
            self.field.spawn_lookahead(self.frame_time_ms);
            return Ok(out);
        }

        if self.phase != Phase::Playing {
            return Ok(out);
        }

        self.frame_time_ms = self.clock.current_effective_time_ms();
        let now = self.frame_time_ms;
        self.field.spawn_lookahead(now);
        self.field.update_positions(now, dt);
        out.judgments = apply_expiry_misses(&mut self.field, &mut self.stats, now);

        self.log_timer += dt;
        if self.log_timer >= 1.0 {
            self.log_timer -= 1.0;
            debug!(
                "t={:.0} ms active={} score={} combo={} acc={}%",
                now,
                self.field.active_len(),
                self.stats.score(),
                self.stats.combo(),
                self.stats.accuracy_display()
            );
        }

        if self.field.is_drained() && self.clock.is_finished() {
            self.finish();
            out.finished = true;
        }
        Ok(out)
    }

    /// Records a lane edge and, for a fresh press while playing, judges it
    /// against this frame's clock reading.
    pub fn handle_lane_input(&mut self, input: LaneInput) -> Option<JudgmentEvent> {
        let fresh = self.lanes.apply(input);
        if !fresh || self.phase != Phase::Playing {
            return None;
        }
        judge_a_tap(
            &mut self.field,
            &mut self.stats,
            input.lane,
            self.frame_time_ms,
            &self.settings.windows,
        )
    }

    pub fn snapshot(&self) -> FrameSnapshot {
        FrameSnapshot {
            session: self.id,
            phase: self.phase,
            effective_time_ms: self.frame_time_ms,
            notes: self.field.views(),
            hud: HudState {
                score: self.stats.score(),
                combo: self.stats.combo(),
                accuracy: self.stats.accuracy_display(),
            },
            countdown: match self.phase {
                Phase::Countdown { remaining_s, .. } => Some(remaining_s.max(0.0).ceil() as u32),
                _ => None,
            },
            lanes_pressed: self.lanes.pressed(),
        }
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            song: self.song.clone(),
            stats: self.stats,
            timing: compute_note_timing_stats(self.field.notes()),
        }
    }

    #[inline(always)]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    #[inline(always)]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    pub const fn song(&self) -> &SongKey {
        &self.song
    }

    pub const fn chart(&self) -> &Chart {
        &self.chart
    }

    pub const fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub const fn field(&self) -> &NoteField {
        &self.field
    }

    pub const fn clock(&self) -> &TransportClock<T> {
        &self.clock
    }

    /// Clock reading the current frame's judgments use.
    pub const fn frame_time_ms(&self) -> f64 {
        self.frame_time_ms
    }

    pub fn transport_mut(&mut self) -> &mut T {
        self.clock.transport_mut()
    }
}
