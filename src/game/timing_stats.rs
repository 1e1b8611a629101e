use crate::game::judgment::JudgeGrade;
use crate::game::note::Note;

/// Offset summary over every hit (misses carry no meaningful offset).
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct TimingStats {
    pub mean_abs_ms: f64,
    /// Signed mean: positive means the player tends to hit late.
    pub mean_ms: f64,
    pub stddev_ms: f64,
    pub max_abs_ms: f64,
    pub count: usize,
}

impl TimingStats {
    /// Offset that would centre the player's hits, rounded to whole ms.
    /// Only a hint: the detector is the authoritative source.
    pub fn suggested_offset_ms(&self) -> Option<i32> {
        (self.count > 0).then(|| self.mean_ms.round() as i32)
    }
}

#[inline(always)]
fn hit_offsets(notes: &[Note]) -> impl Iterator<Item = f64> + '_ {
    notes
        .iter()
        .filter_map(Note::result)
        .filter(|j| j.grade != JudgeGrade::Miss)
        .map(|j| j.time_error_ms)
}

pub fn compute_note_timing_stats(notes: &[Note]) -> TimingStats {
    // First pass: sums and maxima
    let mut sum_abs = 0.0_f64;
    let mut sum_signed = 0.0_f64;
    let mut max_abs = 0.0_f64;
    let mut count: usize = 0;

    for e in hit_offsets(notes) {
        let a = e.abs();
        sum_abs += a;
        sum_signed += e;
        if a > max_abs { max_abs = a; }
        count += 1;
    }

    if count == 0 {
        return TimingStats::default();
    }

    let n = count as f64;
    let mean_ms = sum_signed / n;

    // Second pass: sample standard deviation of signed offsets
    let stddev_ms = if count > 1 {
        let sum_diff_sq: f64 = hit_offsets(notes).map(|e| (e - mean_ms) * (e - mean_ms)).sum();
        (sum_diff_sq / (n - 1.0)).sqrt()
    } else { 0.0 };

    TimingStats { mean_abs_ms: sum_abs / n, mean_ms, stddev_ms, max_abs_ms: max_abs, count }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::input::Lane;
    use crate::game::chart::NoteSpec;
    use crate::game::judgment::Judgment;
    use crate::game::note::NoteId;

    fn judged(id: u32, error: f64, grade: JudgeGrade) -> Note {
        let spec = NoteSpec { lane: Lane::new(0).unwrap(), time_ms: f64::from(id) * 500.0 };
        let mut n = Note::new(NoteId(id), &spec);
        n.judge(Judgment { time_error_ms: error, grade });
        n
    }

    #[test]
    fn ignores_misses_and_pending_notes() {
        let spec = NoteSpec { lane: Lane::new(0).unwrap(), time_ms: 0.0 };
        let notes = vec![
            judged(0, 10.0, JudgeGrade::Perfect),
            judged(1, -30.0, JudgeGrade::Good),
            judged(2, 170.0, JudgeGrade::Miss),
            Note::new(NoteId(3), &spec),
        ];
        let st = compute_note_timing_stats(&notes);
        assert_eq!(st.count, 2);
        assert!((st.mean_ms - -10.0).abs() < 1e-9);
        assert!((st.mean_abs_ms - 20.0).abs() < 1e-9);
        assert!((st.max_abs_ms - 30.0).abs() < 1e-9);
        // sample stddev of {10, -30}
        assert!((st.stddev_ms - 800.0_f64.sqrt()).abs() < 1e-9);
        assert_eq!(st.suggested_offset_ms(), Some(-10));
    }

    #[test]
    fn empty_input_gives_defaults() {
        let st = compute_note_timing_stats(&[]);
        assert_eq!(st, TimingStats::default());
        assert_eq!(st.suggested_offset_ms(), None);
    }
}
