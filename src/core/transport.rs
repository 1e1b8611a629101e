use log::{debug, info};

use crate::config::{MAX_CALIBRATION_OFFSET_MS, MIN_CALIBRATION_OFFSET_MS, validate_calibration_offset};
use crate::error::{AudioStartError, ConfigError};

/* ============================== Transport ============================== */

/// The audio engine's own playback clock. Elapsed time is the ground truth
/// for note placement; wall-clock time is never consulted.
pub trait Transport {
    /// Starts playback `offset_seconds` into the track. Elapsed time restarts
    /// at zero and counts transport time, not track position.
    fn play(&mut self, offset_seconds: f64) -> Result<(), AudioStartError>;

    /// Suspends playback keeping elapsed time.
    fn pause(&mut self);

    fn resume(&mut self) -> Result<(), AudioStartError>;

    /// Halts playback and cancels anything the engine had scheduled.
    fn stop(&mut self);

    /// Moves the elapsed-time counter (and the audio with it).
    fn seek(&mut self, elapsed_seconds: f64);

    fn elapsed_seconds(&self) -> f64;

    /// True once the track has played to its end.
    fn is_finished(&self) -> bool;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

/// A transport driven by explicit `advance` calls instead of an audio device.
/// Used for headless playback and tests; it can also refuse to start to
/// reproduce a blocked audio context.
#[derive(Clone, Debug)]
pub struct SimulatedTransport {
    track_length_seconds: f64,
    start_offset_seconds: f64,
    elapsed_seconds: f64,
    state: PlaybackState,
    blocked: bool,
}

impl SimulatedTransport {
    pub fn new(track_length_seconds: f64) -> Self {
        Self {
            track_length_seconds: track_length_seconds.max(0.0),
            start_offset_seconds: 0.0,
            elapsed_seconds: 0.0,
            state: PlaybackState::Stopped,
            blocked: false,
        }
    }

    pub fn set_blocked(&mut self, blocked: bool) {
        self.blocked = blocked;
    }

    pub const fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn advance(&mut self, delta_seconds: f64) {
        if self.state != PlaybackState::Playing || !delta_seconds.is_finite() || delta_seconds <= 0.0 {
            return;
        }
        let remaining = (self.track_length_seconds - self.start_offset_seconds - self.elapsed_seconds).max(0.0);
        self.elapsed_seconds += delta_seconds.min(remaining);
    }
}

impl Transport for SimulatedTransport {
    fn play(&mut self, offset_seconds: f64) -> Result<(), AudioStartError> {
        if self.blocked {
            return Err(AudioStartError::new("audio context is suspended until a user gesture"));
        }
        self.start_offset_seconds = offset_seconds.max(0.0);
        self.elapsed_seconds = 0.0;
        self.state = PlaybackState::Playing;
        Ok(())
    }

    fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Paused;
        }
    }

    fn resume(&mut self) -> Result<(), AudioStartError> {
        if self.blocked {
            return Err(AudioStartError::new("audio context is suspended until a user gesture"));
        }
        if self.state == PlaybackState::Paused {
            self.state = PlaybackState::Playing;
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.state = PlaybackState::Stopped;
        self.elapsed_seconds = 0.0;
        self.start_offset_seconds = 0.0;
    }

    fn seek(&mut self, elapsed_seconds: f64) {
        if elapsed_seconds.is_finite() {
            self.elapsed_seconds = elapsed_seconds.max(0.0);
        }
    }

    fn elapsed_seconds(&self) -> f64 {
        self.elapsed_seconds
    }

    fn is_finished(&self) -> bool {
        self.state != PlaybackState::Stopped
            && self.start_offset_seconds + self.elapsed_seconds >= self.track_length_seconds
    }
}

/* ============================ Clock adapter ============================ */

/// Snapshot of the adapter's state, for diagnostics and the renderer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClockState {
    pub transport_seconds: f64,
    pub calibration_offset_ms: i32,
    pub running: bool,
}

/// Wraps a [`Transport`] with the calibration offset and start-offset
/// bookkeeping.
///
/// Effective time is transport time corrected by the calibration offset:
///
/// ```text
/// effective_ms = transport_seconds * 1000 + schedule_compensation_ms - calibration_offset_ms
/// ```
///
/// A positive offset means input is perceived early, so it is subtracted. A
/// negative offset is realised by starting the track `|offset|` ms in (see
/// [`TransportClock::start_offset_seconds_for`]). The skip already carries
/// the offset, so `schedule_compensation_ms` is minus the skip and cancels
/// the subtracted offset: effective time starts at zero and the offset is
/// counted once.
#[derive(Debug)]
pub struct TransportClock<T: Transport> {
    transport: T,
    calibration_offset_ms: i32,
    schedule_compensation_ms: f64,
    running: bool,
}

impl<T: Transport> TransportClock<T> {
    /// Out-of-range offsets are clamped; stored settings are validated on
    /// write, so this only matters for hand-built configs.
    pub fn new(transport: T, calibration_offset_ms: i32) -> Self {
        Self {
            transport,
            calibration_offset_ms: calibration_offset_ms
                .clamp(MIN_CALIBRATION_OFFSET_MS, MAX_CALIBRATION_OFFSET_MS),
            schedule_compensation_ms: 0.0,
            running: false,
        }
    }

    /// Where playback must begin to realise `calibration_offset_ms`.
    #[inline(always)]
    pub fn start_offset_seconds_for(calibration_offset_ms: i32) -> f64 {
        f64::from((-calibration_offset_ms).max(0)) / 1000.0
    }

    pub const fn calibration_offset_ms(&self) -> i32 {
        self.calibration_offset_ms
    }

    /// Rejects values outside [-500, 500] and keeps the previous one.
    pub fn set_calibration_offset_ms(&mut self, offset_ms: i32) -> Result<(), ConfigError> {
        self.calibration_offset_ms = validate_calibration_offset(i64::from(offset_ms))?;
        Ok(())
    }

    pub fn start(&mut self, at_offset_seconds: f64) -> Result<(), AudioStartError> {
        let at = if at_offset_seconds.is_finite() { at_offset_seconds.max(0.0) } else { 0.0 };
        self.transport.play(at)?;
        self.schedule_compensation_ms = -at * 1000.0;
        self.running = true;
        info!(
            "Transport started at {:.3}s (calibration offset {} ms).",
            at, self.calibration_offset_ms
        );
        Ok(())
    }

    pub fn pause(&mut self) {
        if !self.running {
            return;
        }
        self.transport.pause();
        self.running = false;
        debug!("Transport paused at {:.3}s.", self.transport.elapsed_seconds());
    }

    /// Elapsed time keeps coming from the transport itself after resuming,
    /// so no wall-clock gap is ever added in.
    pub fn resume(&mut self) -> Result<(), AudioStartError> {
        if self.running {
            return Ok(());
        }
        self.transport.resume()?;
        self.running = true;
        debug!("Transport resumed at {:.3}s.", self.transport.elapsed_seconds());
        Ok(())
    }

    pub fn stop(&mut self) {
        self.transport.stop();
        self.running = false;
        self.schedule_compensation_ms = 0.0;
    }

    pub fn seek(&mut self, elapsed_seconds: f64) {
        self.transport.seek(elapsed_seconds);
    }

    #[inline(always)]
    pub const fn schedule_compensation_ms(&self) -> f64 {
        self.schedule_compensation_ms
    }

    /// Read once per frame; every decision in that frame reuses the value.
    #[inline(always)]
    pub fn current_effective_time_ms(&self) -> f64 {
        self.transport.elapsed_seconds() * 1000.0 + self.schedule_compensation_ms
            - f64::from(self.calibration_offset_ms)
    }

    pub const fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_finished(&self) -> bool {
        self.transport.is_finished()
    }

    pub fn state(&self) -> ClockState {
        ClockState {
            transport_seconds: self.transport.elapsed_seconds(),
            calibration_offset_ms: self.calibration_offset_ms,
            running: self.running,
        }
    }

    pub const fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}
