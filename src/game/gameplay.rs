//! Judgment engine: lane presses become hits, notes that scroll off the
//! bottom become misses. Both paths go through [`Note::judge`], so a note
//! reached by a press and by expiry in the same frame is judged once.

use log::debug;
use smallvec::SmallVec;

use crate::core::input::Lane;
use crate::game::judgment::{JudgeGrade, Judgment};
use crate::game::note::NoteId;
use crate::game::notefield::NoteField;
use crate::game::stats::SessionStats;
use crate::game::timing_windows::TimingWindows;

/// One judged note, for the renderer's feedback text and effects.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct JudgmentEvent {
    pub note: NoteId,
    pub lane: Lane,
    pub judgment: Judgment,
}

/// Picks the pending note of `lane` a press at `now_ms` should judge, with
/// its signed error (positive = late).
///
/// The lane's notes are time-ordered, so the scan stops at the first note
/// still a full FAIR window ahead. On lanes where same-lane spacing is at
/// least twice the FAIR window only one note can be inside the window, and
/// the first match is returned directly. Denser lanes scan the whole window
/// for the smallest error.
pub fn find_tap_target(
    field: &NoteField,
    lane: Lane,
    now_ms: f64,
    windows: &TimingWindows,
) -> Option<(NoteId, f64)> {
    let fair = windows.fair_ms();
    let early_exit = field.early_exit_safe(lane);
    let mut best: Option<(NoteId, f64)> = None;

    for note in field.lane_notes(lane) {
        if !note.is_pending() {
            continue;
        }
        let error = now_ms - note.target_time_ms;
        if -error >= fair {
            break;
        }
        if !windows.contains(error) {
            continue;
        }
        match best {
            Some((_, best_err)) if error.abs() >= best_err.abs() => {}
            _ => best = Some((note.id, error)),
        }
        if early_exit {
            break;
        }
    }
    best
}

/// Judges a press on `lane`. A press with nothing inside the FAIR window is a
/// no-op, never a miss.
pub fn judge_a_tap(
    field: &mut NoteField,
    stats: &mut SessionStats,
    lane: Lane,
    now_ms: f64,
    windows: &TimingWindows,
) -> Option<JudgmentEvent> {
    let (id, time_error_ms) = find_tap_target(field, lane, now_ms, windows)?;
    let grade = windows.classify_offset_ms(time_error_ms)?;
    let judgment = Judgment { time_error_ms, grade };
    if !field.note_mut(id)?.judge(judgment) {
        return None;
    }
    stats.record(grade);
    field.remove(id);
    debug!(
        "HIT: lane {lane} note {} {} ({:+.1} ms), combo {}",
        id.0,
        grade,
        time_error_ms,
        stats.combo()
    );
    Some(JudgmentEvent { note: id, lane, judgment })
}

/// Misses every pending note whose smoothed position has left the field.
pub fn apply_expiry_misses(
    field: &mut NoteField,
    stats: &mut SessionStats,
    now_ms: f64,
) -> SmallVec<[JudgmentEvent; 4]> {
    let mut events = SmallVec::new();
    for id in field.expired() {
        let Some(note) = field.note_mut(id) else {
            continue;
        };
        let lane = note.lane;
        let judgment = Judgment { time_error_ms: now_ms - note.target_time_ms, grade: JudgeGrade::Miss };
        if !note.judge(judgment) {
            continue;
        }
        stats.record(JudgeGrade::Miss);
        field.remove(id);
        debug!("MISS: lane {lane} note {} ({:+.1} ms past target)", id.0, judgment.time_error_ms);
        events.push(JudgmentEvent { note: id, lane, judgment });
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::chart::{Chart, NoteSpec};
    use crate::game::note::HitState;
    use crate::game::notefield::FieldGeometry;

    fn lane(i: usize) -> Lane {
        Lane::new(i).unwrap()
    }

    fn geometry() -> FieldGeometry {
        FieldGeometry { hit_line_y: 620.0, bottom_y: 720.0, pixels_per_ms: 0.6, interpolation_rate: 30.0 }
    }

    fn field(notes: &[(usize, f64)], windows: &TimingWindows) -> NoteField {
        let specs = notes.iter().map(|&(l, t)| NoteSpec { lane: lane(l), time_ms: t }).collect();
        let chart = Chart::new(120.0, None, specs).unwrap();
        let mut f = NoteField::new(&chart, geometry(), windows);
        f.spawn_lookahead(500.0);
        f
    }

    #[test]
    fn close_press_is_perfect() {
        let w = TimingWindows::new(35.0, 70.0, 140.0).unwrap();
        let mut f = field(&[(0, 1000.0)], &w);
        let mut stats = SessionStats::default();
        let ev = judge_a_tap(&mut f, &mut stats, lane(0), 1010.0, &w).expect("inside the window");
        assert_eq!(ev.judgment.grade, JudgeGrade::Perfect);
        assert!((ev.judgment.time_error_ms - 10.0).abs() < 1e-9);
        assert_eq!(stats.score(), 300);
        assert_eq!(stats.combo(), 1);
        assert_eq!(f.note(ev.note).unwrap().hit_state(), HitState::Hit);
        assert_eq!(f.active_len(), 0, "hit notes leave the active set at once");
    }

    #[test]
    fn late_press_follows_configured_windows() {
        let w = TimingWindows::new(35.0, 70.0, 140.0).unwrap();
        let mut f = field(&[(0, 1000.0)], &w);
        let mut stats = SessionStats::default();
        let ev = judge_a_tap(&mut f, &mut stats, lane(0), 1090.0, &w).unwrap();
        assert_eq!(ev.judgment.grade, JudgeGrade::Fair);
        assert_eq!(stats.score(), 100);

        let w = TimingWindows::new(35.0, 100.0, 140.0).unwrap();
        let mut f = field(&[(0, 1000.0)], &w);
        let mut stats = SessionStats::default();
        let ev = judge_a_tap(&mut f, &mut stats, lane(0), 1090.0, &w).unwrap();
        assert_eq!(ev.judgment.grade, JudgeGrade::Good);
        assert_eq!(stats.score(), 200);
    }

    #[test]
    fn press_outside_every_window_is_a_no_op() {
        let w = TimingWindows::default();
        let mut f = field(&[(2, 1000.0)], &w);
        let mut stats = SessionStats::default();
        assert!(judge_a_tap(&mut f, &mut stats, lane(2), 1100.0, &w).is_none(), "boundary is exclusive");
        assert!(judge_a_tap(&mut f, &mut stats, lane(2), 700.0, &w).is_none());
        assert!(judge_a_tap(&mut f, &mut stats, lane(1), 1000.0, &w).is_none(), "wrong lane");
        assert_eq!(stats.total_judged(), 0);
        assert_eq!(f.active_len(), 1);
    }

    #[test]
    fn unplayed_note_is_missed_once_it_leaves_the_field() {
        let w = TimingWindows::default();
        let mut f = field(&[(0, 500.0), (1, 1000.0)], &w);
        let mut stats = SessionStats::default();
        judge_a_tap(&mut f, &mut stats, lane(0), 505.0, &w).unwrap();
        assert_eq!(stats.combo(), 1);

        let mut now = 500.0;
        let mut missed = SmallVec::<[JudgmentEvent; 4]>::new();
        while missed.is_empty() && now < 3000.0 {
            now += 1000.0 / 60.0;
            f.update_positions(now, 1.0 / 60.0);
            missed = apply_expiry_misses(&mut f, &mut stats, now);
        }
        assert_eq!(missed.len(), 1);
        // raw position passes the bottom at ~1166.7 ms; smoothing lags a little
        assert!(now > 1166.0 && now < 1300.0, "missed at {now}");
        assert_eq!(missed[0].judgment.grade, JudgeGrade::Miss);
        assert_eq!(stats.combo(), 0);
        assert_eq!(stats.total_judged(), 2);
        assert_eq!(stats.hit_count(), 1);
        assert_eq!(stats.score(), 300);
        assert!(f.is_drained());
    }

    #[test]
    fn note_is_never_judged_twice_in_one_frame() {
        let w = TimingWindows::default();
        let mut f = field(&[(0, 1000.0)], &w);
        let mut stats = SessionStats::default();
        // push the note past the bottom, then press and expire at the same instant
        f.update_positions(1180.0, 1.0);
        let now = 1060.0;
        let hit = judge_a_tap(&mut f, &mut stats, lane(0), now, &w);
        let misses = apply_expiry_misses(&mut f, &mut stats, now);
        assert!(hit.is_some());
        assert!(misses.is_empty());
        assert_eq!(stats.total_judged(), 1);
        assert_eq!(f.note(NoteId(0)).unwrap().hit_state(), HitState::Hit);
    }

    #[test]
    fn dense_lane_scans_for_the_closest_note() {
        let w = TimingWindows::new(35.0, 70.0, 100.0).unwrap();
        // 150 ms apart: both notes can sit inside the FAIR window at once
        let f = field(&[(0, 1000.0), (0, 1150.0)], &w);
        assert!(!f.early_exit_safe(lane(0)));
        let (id, err) = find_tap_target(&f, lane(0), 1090.0, &w).unwrap();
        assert_eq!(id, NoteId(1));
        assert!((err - -60.0).abs() < 1e-9);
    }

    #[test]
    fn sparse_lane_takes_the_first_match() {
        let w = TimingWindows::new(35.0, 70.0, 100.0).unwrap();
        let f = field(&[(0, 1000.0), (0, 1200.0)], &w);
        assert!(f.early_exit_safe(lane(0)));
        assert_eq!(find_tap_target(&f, lane(0), 1090.0, &w).map(|t| t.0), Some(NoteId(0)));
        assert_eq!(find_tap_target(&f, lane(0), 1110.0, &w).map(|t| t.0), Some(NoteId(1)));
    }

    #[test]
    fn stale_pending_note_does_not_block_the_next_one() {
        let w = TimingWindows::new(35.0, 70.0, 100.0).unwrap();
        let mut f = field(&[(0, 1000.0), (0, 1300.0)], &w);
        let mut stats = SessionStats::default();
        // the first note is late but still on screen
        let ev = judge_a_tap(&mut f, &mut stats, lane(0), 1290.0, &w).unwrap();
        assert_eq!(ev.note, NoteId(1));
        assert_eq!(ev.judgment.grade, JudgeGrade::Perfect);
    }
}
