use crate::core::input::Lane;
use crate::game::chart::NoteSpec;
use crate::game::judgment::{JudgeGrade, Judgment};

/// Index of a note in chart order. Chart order is ascending target time, so
/// ids compare the same way target times do.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NoteId(pub u32);

impl NoteId {
    #[inline(always)]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HitState {
    Pending,
    Hit,
    Missed,
}

/// Logical note. The renderer keeps its own handle keyed by `id` and only
/// reads `visual_y` and `hit_state`.
#[derive(Clone, Debug)]
pub struct Note {
    pub id: NoteId,
    pub lane: Lane,
    pub target_time_ms: f64,
    /// Smoothed position the renderer draws.
    pub visual_y: f32,
    /// Clock-derived position recomputed every frame.
    pub raw_target_y: f32,
    hit_state: HitState,
    result: Option<Judgment>,
}

impl Note {
    pub fn new(id: NoteId, spec: &NoteSpec) -> Self {
        Self {
            id,
            lane: spec.lane,
            target_time_ms: spec.time_ms,
            visual_y: 0.0,
            raw_target_y: 0.0,
            hit_state: HitState::Pending,
            result: None,
        }
    }

    #[inline(always)]
    pub const fn hit_state(&self) -> HitState {
        self.hit_state
    }

    #[inline(always)]
    pub fn is_pending(&self) -> bool {
        self.hit_state == HitState::Pending
    }

    pub const fn result(&self) -> Option<&Judgment> {
        self.result.as_ref()
    }

    /// The single pending → hit/missed transition. Returns false and changes
    /// nothing when the note was already judged.
    pub(crate) fn judge(&mut self, judgment: Judgment) -> bool {
        if self.hit_state != HitState::Pending {
            return false;
        }
        self.hit_state = if judgment.grade == JudgeGrade::Miss {
            HitState::Missed
        } else {
            HitState::Hit
        };
        self.result = Some(judgment);
        true
    }
}
