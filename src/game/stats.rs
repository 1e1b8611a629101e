use crate::game::judgment::{JudgeGrade, points_for};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct GradeCounts {
    pub perfect: u32,
    pub good: u32,
    pub fair: u32,
    pub miss: u32,
}

impl GradeCounts {
    fn bump(&mut self, grade: JudgeGrade) {
        let slot = match grade {
            JudgeGrade::Perfect => &mut self.perfect,
            JudgeGrade::Good => &mut self.good,
            JudgeGrade::Fair => &mut self.fair,
            JudgeGrade::Miss => &mut self.miss,
        };
        *slot = slot.saturating_add(1);
    }

    pub const fn get(&self, grade: JudgeGrade) -> u32 {
        match grade {
            JudgeGrade::Perfect => self.perfect,
            JudgeGrade::Good => self.good,
            JudgeGrade::Fair => self.fair,
            JudgeGrade::Miss => self.miss,
        }
    }
}

/// Score, combo and accuracy for one play-through. Only the judgment engine
/// writes here; everything else reads.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    score: u64,
    combo: u32,
    max_combo: u32,
    total_judged: u32,
    hit_count: u32,
    counts: GradeCounts,
}

impl SessionStats {
    pub(crate) fn record(&mut self, grade: JudgeGrade) {
        self.total_judged = self.total_judged.saturating_add(1);
        self.counts.bump(grade);
        if grade.is_hit() {
            self.combo = self.combo.saturating_add(1);
            self.max_combo = self.max_combo.max(self.combo);
            self.hit_count = self.hit_count.saturating_add(1);
            self.score = self.score.saturating_add(u64::from(points_for(grade)));
        } else {
            self.combo = 0;
        }
    }

    #[inline(always)]
    pub const fn score(&self) -> u64 {
        self.score
    }

    #[inline(always)]
    pub const fn combo(&self) -> u32 {
        self.combo
    }

    pub const fn max_combo(&self) -> u32 {
        self.max_combo
    }

    pub const fn total_judged(&self) -> u32 {
        self.total_judged
    }

    pub const fn hit_count(&self) -> u32 {
        self.hit_count
    }

    pub const fn counts(&self) -> GradeCounts {
        self.counts
    }

    /// Hits over judged notes in 0.0..=100.0; 100 before anything is judged.
    pub fn accuracy_percent(&self) -> f64 {
        if self.total_judged == 0 {
            return 100.0;
        }
        f64::from(self.hit_count) / f64::from(self.total_judged) * 100.0
    }

    /// Whole-percent figure for the HUD.
    pub fn accuracy_display(&self) -> u32 {
        self.accuracy_percent().round() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accuracy_is_full_before_any_judgment() {
        let stats = SessionStats::default();
        assert_eq!(stats.accuracy_percent(), 100.0);
        assert_eq!(stats.accuracy_display(), 100);
    }

    #[test]
    fn miss_resets_combo_and_hits_count_up_by_one() {
        let mut s = SessionStats::default();
        s.record(JudgeGrade::Perfect);
        s.record(JudgeGrade::Good);
        s.record(JudgeGrade::Fair);
        assert_eq!((s.combo(), s.max_combo()), (3, 3));
        assert_eq!(s.score(), 600);

        s.record(JudgeGrade::Miss);
        assert_eq!(s.combo(), 0);
        assert_eq!(s.max_combo(), 3);
        assert_eq!(s.score(), 600, "a miss is worth nothing");
        assert_eq!((s.hit_count(), s.total_judged()), (3, 4));

        s.record(JudgeGrade::Perfect);
        assert_eq!((s.combo(), s.max_combo()), (1, 3));
        assert_eq!(s.counts().get(JudgeGrade::Miss), 1);
        assert_eq!(s.counts().get(JudgeGrade::Perfect), 2);
    }

    #[test]
    fn accuracy_stays_within_bounds() {
        let mut s = SessionStats::default();
        let pattern = [JudgeGrade::Miss, JudgeGrade::Fair, JudgeGrade::Miss, JudgeGrade::Perfect];
        for g in pattern.iter().cycle().take(41) {
            s.record(*g);
            let acc = s.accuracy_percent();
            assert!((0.0..=100.0).contains(&acc), "accuracy {acc} out of range");
        }
        let mut all_missed = SessionStats::default();
        all_missed.record(JudgeGrade::Miss);
        assert_eq!(all_missed.accuracy_percent(), 0.0);
        assert_eq!(all_missed.accuracy_display(), 0);
    }
}
