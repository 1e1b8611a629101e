//! Note scheduler and position model.
//!
//! Notes enter the active set a lead time before they reach the hit line and
//! leave it the frame they are judged. Each frame the clock-derived
//! `raw_target_y` is recomputed and `visual_y` eases toward it:
//!
//! ```text
//! raw_target_y = hit_line_y - (target_ms - now_ms) * pixels_per_ms
//! visual_y    += (raw_target_y - visual_y) * min(1, interpolation_rate * dt)
//! ```
//!
//! Judgment reads the clock directly; `visual_y` only decides when an
//! unplayed note has left the screen and is therefore missed.

use std::collections::VecDeque;

use smallvec::SmallVec;

use crate::config::Config;
use crate::core::input::{LANE_COUNT, Lane};
use crate::game::chart::Chart;
use crate::game::note::{HitState, Note, NoteId};
use crate::game::timing_windows::TimingWindows;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FieldGeometry {
    /// Y of the hit line, measured down from the spawn edge at 0.
    pub hit_line_y: f32,
    /// A note whose smoothed position passes this is missed.
    pub bottom_y: f32,
    pub pixels_per_ms: f32,
    /// Per-second easing rate for `visual_y`.
    pub interpolation_rate: f32,
}

impl FieldGeometry {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            hit_line_y: (cfg.playfield_height - cfg.hit_line_offset).max(0.0),
            bottom_y: cfg.playfield_height,
            pixels_per_ms: cfg.scroll_speed.pixels_per_ms(),
            interpolation_rate: cfg.interpolation_rate,
        }
    }

    #[inline(always)]
    pub fn raw_target_y(&self, target_time_ms: f64, now_ms: f64) -> f32 {
        let dy = (target_time_ms - now_ms) * f64::from(self.pixels_per_ms);
        (f64::from(self.hit_line_y) - dy) as f32
    }

    /// Time a note spends between the spawn edge and the hit line.
    #[inline(always)]
    pub fn lead_time_ms(&self) -> f64 {
        f64::from(self.hit_line_y / self.pixels_per_ms.max(f32::EPSILON))
    }
}

/// Render-side view of one active note.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct NoteView {
    pub id: NoteId,
    pub lane: Lane,
    pub visual_y: f32,
    pub hit_state: HitState,
}

#[derive(Debug)]
pub struct NoteField {
    /// Every note of the chart, indexed by `NoteId`.
    notes: Vec<Note>,
    /// Active ids, ascending.
    active: Vec<NoteId>,
    /// Per-lane index over `active`, ascending target time.
    lanes: [VecDeque<NoteId>; LANE_COUNT],
    /// Lanes where no two notes can both sit inside the FAIR window.
    lane_early_exit: [bool; LANE_COUNT],
    spawn_cursor: usize,
    spawn_horizon_ms: f64,
    geometry: FieldGeometry,
}

impl NoteField {
    pub fn new(chart: &Chart, geometry: FieldGeometry, windows: &TimingWindows) -> Self {
        let notes: Vec<Note> = chart
            .notes()
            .iter()
            .enumerate()
            .map(|(i, spec)| Note::new(NoteId(i as u32), spec))
            .collect();
        // First match is the closest match only when the same-lane spacing is
        // at least twice the FAIR window: then at most one note of the lane is
        // ever within FAIR of "now".
        let lane_early_exit = std::array::from_fn(|i| {
            Lane::new(i)
                .and_then(|lane| chart.min_lane_spacing_ms(lane))
                .is_none_or(|gap| gap >= 2.0 * windows.fair_ms())
        });
        Self {
            notes,
            active: Vec::new(),
            lanes: std::array::from_fn(|_| VecDeque::new()),
            lane_early_exit,
            spawn_cursor: 0,
            spawn_horizon_ms: geometry.lead_time_ms().max(windows.fair_ms()),
            geometry,
        }
    }

    #[inline(always)]
    pub const fn geometry(&self) -> &FieldGeometry {
        &self.geometry
    }

    #[inline(always)]
    pub fn early_exit_safe(&self, lane: Lane) -> bool {
        self.lane_early_exit[lane.index()]
    }

    /// Moves every note whose target is within the lead time into the active
    /// set, snapping it straight to its clock position. Returns how many
    /// spawned.
    pub fn spawn_lookahead(&mut self, now_ms: f64) -> usize {
        let start = self.spawn_cursor;
        while let Some(note) = self.notes.get_mut(self.spawn_cursor) {
            if note.target_time_ms - now_ms > self.spawn_horizon_ms {
                break;
            }
            let y = self.geometry.raw_target_y(note.target_time_ms, now_ms);
            note.raw_target_y = y;
            note.visual_y = y;
            self.active.push(note.id);
            self.lanes[note.lane.index()].push_back(note.id);
            self.spawn_cursor += 1;
        }
        self.spawn_cursor - start
    }

    /// Recomputes raw positions and eases the visual ones toward them.
    pub fn update_positions(&mut self, now_ms: f64, delta_seconds: f32) {
        let dt = if delta_seconds.is_finite() { delta_seconds.max(0.0) } else { 0.0 };
        let blend = (self.geometry.interpolation_rate * dt).min(1.0);
        for id in &self.active {
            let note = &mut self.notes[id.index()];
            if !note.is_pending() {
                continue;
            }
            note.raw_target_y = self.geometry.raw_target_y(note.target_time_ms, now_ms);
            note.visual_y += (note.raw_target_y - note.visual_y) * blend;
        }
    }

    /// Pending active notes whose smoothed position is past the bottom edge.
    pub fn expired(&self) -> SmallVec<[NoteId; 4]> {
        self.active
            .iter()
            .copied()
            .filter(|id| {
                let n = &self.notes[id.index()];
                n.is_pending() && n.visual_y > self.geometry.bottom_y
            })
            .collect()
    }

    /// Active notes of `lane`, ascending target time.
    pub fn lane_notes(&self, lane: Lane) -> impl Iterator<Item = &Note> + '_ {
        self.lanes[lane.index()].iter().map(|id| &self.notes[id.index()])
    }

    /// Earliest pending active note of `lane`.
    pub fn next_pending(&self, lane: Lane) -> Option<&Note> {
        self.lane_notes(lane).find(|n| n.is_pending())
    }

    pub fn note(&self, id: NoteId) -> Option<&Note> {
        self.notes.get(id.index())
    }

    pub(crate) fn note_mut(&mut self, id: NoteId) -> Option<&mut Note> {
        self.notes.get_mut(id.index())
    }

    /// All notes of the chart, judged or not.
    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn active_notes(&self) -> impl Iterator<Item = &Note> + '_ {
        self.active.iter().map(|id| &self.notes[id.index()])
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Drops a note from the active set and its lane index.
    pub(crate) fn remove(&mut self, id: NoteId) {
        if let Ok(pos) = self.active.binary_search(&id) {
            self.active.remove(pos);
        }
        if let Some(note) = self.notes.get(id.index()) {
            let lane = &mut self.lanes[note.lane.index()];
            if let Some(pos) = lane.iter().position(|&x| x == id) {
                lane.remove(pos);
            }
        }
    }

    pub fn all_spawned(&self) -> bool {
        self.spawn_cursor >= self.notes.len()
    }

    /// Every note spawned and judged.
    pub fn is_drained(&self) -> bool {
        self.all_spawned() && self.active.is_empty()
    }

    pub fn views(&self) -> Vec<NoteView> {
        self.active_notes()
            .map(|n| NoteView { id: n.id, lane: n.lane, visual_y: n.visual_y, hit_state: n.hit_state() })
            .collect()
    }
}
