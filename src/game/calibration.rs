//! Auto-calibration: a periodic cue, the player's reaction taps, and the
//! offset that best lines the two up.
//!
//! The detector is driven by the same monotonic millisecond clock for cues
//! and taps. It never touches the stored calibration offset itself; callers
//! apply [`CalibrationResult::offset_ms`] when they choose to.

use std::fmt;

use log::{debug, info, warn};

use crate::error::CalibrationError;

pub const TOTAL_TAPS: usize = 10;
pub const DEFAULT_CUE_INTERVAL_MS: f64 = 500.0;
pub const DEFAULT_LEAD_IN_MS: f64 = 1000.0;
pub const DEFAULT_ASSOCIATION_WINDOW_MS: f64 = 400.0;
pub const DEFAULT_MIN_DELAY_MS: f64 = -300.0;
pub const DEFAULT_MAX_DELAY_MS: f64 = 500.0;
/// Most overdue cues a single tick fires; older ones are dropped.
pub const MAX_CUE_CATCH_UP: usize = 4;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DetectorSettings {
    pub total_taps: usize,
    pub cue_interval_ms: f64,
    /// Delay between `start` and the first cue.
    pub lead_in_ms: f64,
    /// A tap further than this from every unclaimed cue is not associated.
    pub association_window_ms: f64,
    /// Sanity bound on `tap - cue`; delays outside it are discarded.
    pub min_delay_ms: f64,
    pub max_delay_ms: f64,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            total_taps: TOTAL_TAPS,
            cue_interval_ms: DEFAULT_CUE_INTERVAL_MS,
            lead_in_ms: DEFAULT_LEAD_IN_MS,
            association_window_ms: DEFAULT_ASSOCIATION_WINDOW_MS,
            min_delay_ms: DEFAULT_MIN_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

impl DetectorSettings {
    /// Replaces unusable values with defaults so the detector cannot stall.
    pub fn sanitized(self) -> Self {
        let d = Self::default();
        let positive = |v: f64, fallback: f64| if v.is_finite() && v > 0.0 { v } else { fallback };
        let (min_delay_ms, max_delay_ms) = if self.min_delay_ms.is_finite()
            && self.max_delay_ms.is_finite()
            && self.min_delay_ms <= self.max_delay_ms
        {
            (self.min_delay_ms, self.max_delay_ms)
        } else {
            (d.min_delay_ms, d.max_delay_ms)
        };
        Self {
            total_taps: if self.total_taps == 0 { d.total_taps } else { self.total_taps },
            cue_interval_ms: positive(self.cue_interval_ms, d.cue_interval_ms),
            lead_in_ms: if self.lead_in_ms.is_finite() { self.lead_in_ms.max(0.0) } else { d.lead_in_ms },
            association_window_ms: positive(self.association_window_ms, d.association_window_ms),
            min_delay_ms,
            max_delay_ms,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DetectorPhase {
    Idle,
    Running,
    Completed,
    Cancelled,
}

/// Informational only; a fair result can still be applied.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum CalibrationQuality {
    Excellent,
    Good,
    Fair,
}

impl CalibrationQuality {
    /// From the share of `total_taps` that produced a usable delay.
    pub const fn from_valid_ratio(valid: usize, total_taps: usize) -> Self {
        if total_taps == 0 {
            return Self::Fair;
        }
        if valid * 10 >= total_taps * 8 {
            Self::Excellent
        } else if valid * 10 >= total_taps * 6 {
            Self::Good
        } else {
            Self::Fair
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Fair => "fair",
        }
    }
}

impl fmt::Display for CalibrationQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What happened to one tap during association.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TapAssociation {
    pub tap_ms: f64,
    /// Index into the cue list of the nearest unclaimed cue in the window.
    pub cue_index: Option<usize>,
    /// `tap - cue`, positive when the tap came after the cue.
    pub delay_ms: Option<f64>,
    /// Within the sanity bound and counted in the average.
    pub accepted: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CalibrationResult {
    /// Mean accepted delay, rounded half up to whole ms.
    pub offset_ms: i32,
    pub valid_count: usize,
    pub tap_count: usize,
    pub quality: CalibrationQuality,
    pub associations: Vec<TapAssociation>,
}

/// Associates every tap with the nearest unclaimed cue and averages the
/// accepted delays.
///
/// Greedy in tap order: a cue is claimed only by a tap whose delay passes the
/// sanity bound, so a stray early tap cannot steal the cue a later tap needs.
/// Deterministic for identical inputs.
pub fn estimate_offset(
    cues: &[f64],
    taps: &[f64],
    settings: &DetectorSettings,
) -> Result<CalibrationResult, CalibrationError> {
    let mut claimed = vec![false; cues.len()];
    let mut associations = Vec::with_capacity(taps.len());
    let mut sum = 0.0_f64;
    let mut valid_count = 0usize;

    for &tap in taps {
        let mut best: Option<(usize, f64)> = None;
        for (i, &cue) in cues.iter().enumerate() {
            if claimed[i] {
                continue;
            }
            let dist = (tap - cue).abs();
            if dist > settings.association_window_ms {
                continue;
            }
            // strict < keeps the earlier cue on ties
            if best.is_none_or(|(_, d)| dist < d) {
                best = Some((i, dist));
            }
        }

        let assoc = match best {
            Some((i, _)) => {
                let delay = tap - cues[i];
                let accepted = (settings.min_delay_ms..=settings.max_delay_ms).contains(&delay);
                if accepted {
                    claimed[i] = true;
                    sum += delay;
                    valid_count += 1;
                }
                TapAssociation { tap_ms: tap, cue_index: Some(i), delay_ms: Some(delay), accepted }
            }
            None => TapAssociation { tap_ms: tap, cue_index: None, delay_ms: None, accepted: false },
        };
        debug!(
            "Calibration tap at {:.1} ms: cue {:?}, delay {:?}, accepted {}",
            assoc.tap_ms, assoc.cue_index, assoc.delay_ms, assoc.accepted
        );
        associations.push(assoc);
    }

    if valid_count == 0 {
        return Err(CalibrationError::Incomplete { taps: taps.len() });
    }

    let mean = sum / valid_count as f64;
    Ok(CalibrationResult {
        offset_ms: (mean + 0.5).floor() as i32,
        valid_count,
        tap_count: taps.len(),
        quality: CalibrationQuality::from_valid_ratio(valid_count, settings.total_taps),
        associations,
    })
}

/// What a tap did to the detector.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TapOutcome {
    /// Not running; nothing recorded.
    Ignored,
    Recorded { taps: usize },
    /// The last tap was recorded and the run has been scored.
    Finished,
}

/// Runs one detection session: `Idle → Running → {Completed, Cancelled}`.
///
/// Cues are generated by [`DelayDetector::tick`] at fixed intervals from the
/// cue schedule, not from when `tick` happened to run, so a late frame never
/// shifts the cue times the taps are compared against.
#[derive(Clone, Debug)]
pub struct DelayDetector {
    settings: DetectorSettings,
    phase: DetectorPhase,
    next_cue_ms: f64,
    cues: Vec<f64>,
    taps: Vec<f64>,
    result: Option<Result<CalibrationResult, CalibrationError>>,
}

impl DelayDetector {
    pub fn new(settings: DetectorSettings) -> Self {
        let settings = settings.sanitized();
        Self {
            settings,
            phase: DetectorPhase::Idle,
            next_cue_ms: 0.0,
            cues: Vec::new(),
            taps: Vec::with_capacity(settings.total_taps),
            result: None,
        }
    }

    pub const fn settings(&self) -> &DetectorSettings {
        &self.settings
    }

    pub const fn phase(&self) -> DetectorPhase {
        self.phase
    }

    /// Starts (or restarts) a run. The first cue fires after the lead-in.
    pub fn start(&mut self, now_ms: f64) {
        self.cues.clear();
        self.taps.clear();
        self.result = None;
        self.next_cue_ms = now_ms + self.settings.lead_in_ms;
        self.phase = DetectorPhase::Running;
        info!(
            "Calibration started: {} taps, cue every {} ms.",
            self.settings.total_taps, self.settings.cue_interval_ms
        );
    }

    /// Fires the cues due at `now_ms`, at most [`MAX_CUE_CATCH_UP`] of them.
    /// Returns how many fired so the host can play that many beeps.
    pub fn tick(&mut self, now_ms: f64) -> usize {
        if self.phase != DetectorPhase::Running {
            return 0;
        }
        if self.next_cue_ms <= now_ms {
            let interval = self.settings.cue_interval_ms;
            let due = ((now_ms - self.next_cue_ms) / interval).floor() + 1.0;
            if due > MAX_CUE_CATCH_UP as f64 {
                let skipped = due - MAX_CUE_CATCH_UP as f64;
                self.next_cue_ms += skipped * interval;
                warn!("Calibration clock jumped to {now_ms:.0} ms; dropped {skipped} overdue cues.");
            }
        }
        let mut fired = 0;
        while self.next_cue_ms <= now_ms {
            self.cues.push(self.next_cue_ms);
            self.next_cue_ms += self.settings.cue_interval_ms;
            fired += 1;
        }
        fired
    }

    pub fn tap(&mut self, now_ms: f64) -> TapOutcome {
        if self.phase != DetectorPhase::Running {
            return TapOutcome::Ignored;
        }
        self.tick(now_ms);
        self.taps.push(now_ms);
        if self.taps.len() < self.settings.total_taps {
            return TapOutcome::Recorded { taps: self.taps.len() };
        }

        let result = estimate_offset(&self.cues, &self.taps, &self.settings);
        match &result {
            Ok(r) => info!(
                "Calibration finished: {} ms ({} of {} taps valid, {}).",
                r.offset_ms, r.valid_count, r.tap_count, r.quality
            ),
            Err(e) => info!("Calibration finished without a result: {e}"),
        }
        self.result = Some(result);
        self.phase = DetectorPhase::Completed;
        TapOutcome::Finished
    }

    pub fn cancel(&mut self) {
        if self.phase == DetectorPhase::Running {
            self.phase = DetectorPhase::Cancelled;
            self.cues.clear();
            self.taps.clear();
            info!("Calibration cancelled.");
        }
    }

    /// `(taps recorded, taps required)`.
    pub fn progress(&self) -> (usize, usize) {
        (self.taps.len(), self.settings.total_taps)
    }

    /// Time of the next cue, for drawing a sweep that lands on it.
    pub fn next_cue_ms(&self) -> Option<f64> {
        (self.phase == DetectorPhase::Running).then_some(self.next_cue_ms)
    }

    pub fn cues(&self) -> &[f64] {
        &self.cues
    }

    pub fn taps(&self) -> &[f64] {
        &self.taps
    }

    /// Set once the run completes; `Err(Incomplete)` when no tap was usable.
    pub fn result(&self) -> Option<&Result<CalibrationResult, CalibrationError>> {
        self.result.as_ref()
    }

    /// The recommended offset, or why there is none.
    pub fn recommended_offset_ms(&self) -> Result<i32, CalibrationError> {
        match &self.result {
            Some(Ok(r)) => Ok(r.offset_ms),
            Some(Err(e)) => Err(e.clone()),
            None => Err(CalibrationError::NotRunning),
        }
    }
}
