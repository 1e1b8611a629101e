use std::fmt;

/// Hit quality, ordered best first so `a < b` means `a` is the better grade.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JudgeGrade {
    Perfect,
    Good,
    Fair,
    Miss,
}

pub const SCORE_PERFECT: u32 = 300;
pub const SCORE_GOOD: u32 = 200;
pub const SCORE_FAIR: u32 = 100;
pub const SCORE_MISS: u32 = 0;

impl JudgeGrade {
    #[inline(always)]
    pub const fn is_hit(self) -> bool {
        !matches!(self, Self::Miss)
    }

    /// Feedback text shown over the lane.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Perfect => "PERFECT",
            Self::Good => "GOOD",
            Self::Fair => "FAIR",
            Self::Miss => "MISS",
        }
    }
}

impl fmt::Display for JudgeGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[inline(always)]
pub const fn points_for(grade: JudgeGrade) -> u32 {
    match grade {
        JudgeGrade::Perfect => SCORE_PERFECT,
        JudgeGrade::Good => SCORE_GOOD,
        JudgeGrade::Fair => SCORE_FAIR,
        JudgeGrade::Miss => SCORE_MISS,
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Judgment {
    /// Effective time minus note time: positive is late, negative is early.
    pub time_error_ms: f64,
    pub grade: JudgeGrade,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn points_follow_grade_order() {
        let grades = [JudgeGrade::Perfect, JudgeGrade::Good, JudgeGrade::Fair, JudgeGrade::Miss];
        for pair in grades.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(points_for(pair[0]) > points_for(pair[1]));
        }
        assert!(!JudgeGrade::Miss.is_hit());
        assert_eq!(JudgeGrade::Good.to_string(), "GOOD");
    }
}
