// Timing windows shared by judgment and anything that draws them.
//
// All windows are in milliseconds and exclusive: an offset of exactly
// PERFECT ms is already GOOD.

use crate::game::judgment::JudgeGrade;

pub const DEFAULT_PERFECT_MS: f64 = 35.0;
pub const DEFAULT_GOOD_MS: f64 = 70.0;
pub const DEFAULT_FAIR_MS: f64 = 100.0;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TimingWindows {
    perfect_ms: f64,
    good_ms: f64,
    fair_ms: f64,
}

impl Default for TimingWindows {
    fn default() -> Self {
        Self {
            perfect_ms: DEFAULT_PERFECT_MS,
            good_ms: DEFAULT_GOOD_MS,
            fair_ms: DEFAULT_FAIR_MS,
        }
    }
}

impl TimingWindows {
    /// Requires `0 < perfect <= good <= fair`, all finite.
    pub fn new(perfect_ms: f64, good_ms: f64, fair_ms: f64) -> Option<Self> {
        let ok = [perfect_ms, good_ms, fair_ms].iter().all(|w| w.is_finite())
            && perfect_ms > 0.0
            && perfect_ms <= good_ms
            && good_ms <= fair_ms;
        ok.then_some(Self { perfect_ms, good_ms, fair_ms })
    }

    #[inline(always)]
    pub const fn perfect_ms(&self) -> f64 {
        self.perfect_ms
    }

    #[inline(always)]
    pub const fn good_ms(&self) -> f64 {
        self.good_ms
    }

    /// Outer edge of the hit window.
    #[inline(always)]
    pub const fn fair_ms(&self) -> f64 {
        self.fair_ms
    }

    #[inline(always)]
    pub fn contains(&self, offset_ms: f64) -> bool {
        offset_ms.abs() < self.fair_ms
    }

    /// Classify a signed offset. `None` outside the FAIR window, which callers
    /// treat as "no note here", never as a miss.
    #[inline(always)]
    pub fn classify_offset_ms(&self, offset_ms: f64) -> Option<JudgeGrade> {
        let d = offset_ms.abs();
        if d < self.perfect_ms {
            Some(JudgeGrade::Perfect)
        } else if d < self.good_ms {
            Some(JudgeGrade::Good)
        } else if d < self.fair_ms {
            Some(JudgeGrade::Fair)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn windows() -> TimingWindows {
        TimingWindows::new(35.0, 70.0, 140.0).unwrap()
    }

    #[test]
    fn boundaries_are_exclusive() {
        let w = windows();
        assert_eq!(w.classify_offset_ms(34.999), Some(JudgeGrade::Perfect));
        assert_eq!(w.classify_offset_ms(35.0), Some(JudgeGrade::Good));
        assert_eq!(w.classify_offset_ms(-70.0), Some(JudgeGrade::Fair));
        assert_eq!(w.classify_offset_ms(140.0), None);
        assert_eq!(w.classify_offset_ms(f64::NAN), None);
        assert!(w.contains(-139.9));
        assert!(!w.contains(140.0));
        assert!(!w.contains(-140.0));
    }

    #[test]
    fn quality_never_improves_as_offset_grows() {
        let w = windows();
        let mut prev = JudgeGrade::Perfect;
        let mut d = 0.0;
        while d < w.fair_ms() {
            let g = w.classify_offset_ms(d).expect("inside the fair window");
            assert!(g >= prev, "{d} ms graded {g:?} after {prev:?}");
            assert_eq!(w.classify_offset_ms(-d), Some(g), "early and late grade alike");
            prev = g;
            d += 0.25;
        }
    }

    #[test]
    fn rejects_unordered_windows() {
        assert!(TimingWindows::new(50.0, 40.0, 100.0).is_none());
        assert!(TimingWindows::new(0.0, 40.0, 100.0).is_none());
        assert!(TimingWindows::new(30.0, 40.0, f64::INFINITY).is_none());
        assert!(TimingWindows::new(50.0, 100.0, 140.0).is_some());
    }
}
