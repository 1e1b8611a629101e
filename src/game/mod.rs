pub mod calibration;
pub mod chart;
pub mod gameplay;
pub mod judgment;
pub mod note;
pub mod notefield;
pub mod scores;
pub mod scroll;
pub mod session;
pub mod stats;
pub mod timing_stats;
pub mod timing_windows;
