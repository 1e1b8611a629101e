use crate::core::input::Keymap;
use crate::error::ConfigError;
use crate::game::calibration::DetectorSettings;
use crate::game::scroll::ScrollSpeed;
use crate::game::timing_windows::TimingWindows;
use ini::Ini;
use log::{LevelFilter, info, warn};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};

const CONFIG_PATH: &str = "hypehero.ini";

pub const MIN_CALIBRATION_OFFSET_MS: i32 = -500;
pub const MAX_CALIBRATION_OFFSET_MS: i32 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Off,
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    const fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "Off",
            Self::Error => "Error",
            Self::Warn => "Warn",
            Self::Info => "Info",
            Self::Debug => "Debug",
            Self::Trace => "Trace",
        }
    }

    pub const fn as_level_filter(self) -> LevelFilter {
        match self {
            Self::Off => LevelFilter::Off,
            Self::Error => LevelFilter::Error,
            Self::Warn => LevelFilter::Warn,
            Self::Info => LevelFilter::Info,
            Self::Debug => LevelFilter::Debug,
            Self::Trace => LevelFilter::Trace,
        }
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    pub log_level: LogLevel,
    /// Signed input/audio correction, always within the calibration range.
    pub calibration_offset_ms: i32,
    pub scroll_speed: ScrollSpeed,
    pub timing_windows: TimingWindows,
    /// Per-second easing rate of note positions toward their clock position.
    pub interpolation_rate: f32,
    pub playfield_height: f32,
    /// Distance of the hit line above the bottom edge.
    pub hit_line_offset: f32,
    pub countdown_seconds: f32,
    pub keymap: Keymap,
    pub calibration: DetectorSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            calibration_offset_ms: 0,
            scroll_speed: ScrollSpeed::default(),
            timing_windows: TimingWindows::default(),
            interpolation_rate: 30.0,
            playfield_height: 720.0,
            hit_line_offset: 100.0,
            countdown_seconds: 3.0,
            keymap: Keymap::default(),
            calibration: DetectorSettings::default(),
        }
    }
}

impl Config {
    /// Rejects out-of-range values and keeps the previous one.
    pub fn set_calibration_offset_ms(&mut self, offset_ms: i32) -> Result<(), ConfigError> {
        self.calibration_offset_ms = validate_calibration_offset(i64::from(offset_ms))?;
        Ok(())
    }
}

#[inline(always)]
pub fn validate_calibration_offset(value: i64) -> Result<i32, ConfigError> {
    if value < i64::from(MIN_CALIBRATION_OFFSET_MS) || value > i64::from(MAX_CALIBRATION_OFFSET_MS) {
        return Err(ConfigError::OffsetOutOfRange {
            value,
            min: MIN_CALIBRATION_OFFSET_MS,
            max: MAX_CALIBRATION_OFFSET_MS,
        });
    }
    Ok(value as i32)
}

/// Parses manual calibration entry such as `"-40"` or `" 25 "`.
pub fn parse_calibration_offset(input: &str) -> Result<i32, ConfigError> {
    let trimmed = input.trim();
    let value = trimmed
        .parse::<i64>()
        .map_err(|_| ConfigError::InvalidNumber(trimmed.to_string()))?;
    validate_calibration_offset(value)
}

static CONFIG: std::sync::LazyLock<Mutex<Config>> =
    std::sync::LazyLock::new(|| Mutex::new(Config::default()));

#[inline(always)]
fn lock() -> MutexGuard<'static, Config> {
    CONFIG.lock().unwrap_or_else(PoisonError::into_inner)
}

// --- File I/O ---

fn parse_or<T: FromStr>(conf: &Ini, section: &str, key: &str, default: T) -> T {
    conf.get_from(Some(section), key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn config_from_ini(conf: &Ini) -> Config {
    let default = Config::default();
    let mut cfg = default;

    cfg.log_level = conf
        .get_from(Some("Options"), "LogLevel")
        .and_then(|v| LogLevel::from_str(v).ok())
        .unwrap_or(default.log_level);
    cfg.scroll_speed = conf
        .get_from(Some("Options"), "ScrollSpeed")
        .and_then(|v| ScrollSpeed::from_str(v).ok())
        .unwrap_or(default.scroll_speed);
    cfg.interpolation_rate = parse_or(conf, "Options", "InterpolationRate", default.interpolation_rate);
    if !cfg.interpolation_rate.is_finite() || cfg.interpolation_rate <= 0.0 {
        cfg.interpolation_rate = default.interpolation_rate;
    }
    cfg.playfield_height = parse_or(conf, "Options", "PlayfieldHeight", default.playfield_height);
    cfg.hit_line_offset = parse_or(conf, "Options", "HitLineOffset", default.hit_line_offset);
    if !(cfg.playfield_height > 0.0 && (0.0..cfg.playfield_height).contains(&cfg.hit_line_offset)) {
        cfg.playfield_height = default.playfield_height;
        cfg.hit_line_offset = default.hit_line_offset;
    }
    cfg.countdown_seconds = parse_or(conf, "Options", "CountdownSeconds", default.countdown_seconds);
    if !cfg.countdown_seconds.is_finite() || cfg.countdown_seconds < 0.0 {
        cfg.countdown_seconds = default.countdown_seconds;
    }

    cfg.calibration_offset_ms = conf
        .get_from(Some("Timing"), "CalibrationOffsetMs")
        .and_then(|v| parse_calibration_offset(v).ok())
        .unwrap_or(default.calibration_offset_ms);
    let windows = &default.timing_windows;
    cfg.timing_windows = TimingWindows::new(
        parse_or(conf, "Timing", "PerfectWindowMs", windows.perfect_ms()),
        parse_or(conf, "Timing", "GoodWindowMs", windows.good_ms()),
        parse_or(conf, "Timing", "FairWindowMs", windows.fair_ms()),
    )
    .unwrap_or_else(|| {
        warn!("Timing windows are not ordered perfect <= good <= fair; using defaults.");
        *windows
    });

    let cal = &default.calibration;
    cfg.calibration = DetectorSettings {
        total_taps: parse_or(conf, "Calibration", "TotalTaps", cal.total_taps),
        cue_interval_ms: parse_or(conf, "Calibration", "CueIntervalMs", cal.cue_interval_ms),
        lead_in_ms: parse_or(conf, "Calibration", "LeadInMs", cal.lead_in_ms),
        association_window_ms: parse_or(conf, "Calibration", "AssociationWindowMs", cal.association_window_ms),
        min_delay_ms: parse_or(conf, "Calibration", "MinDelayMs", cal.min_delay_ms),
        max_delay_ms: parse_or(conf, "Calibration", "MaxDelayMs", cal.max_delay_ms),
    }
    .sanitized();

    cfg.keymap = conf
        .get_from(Some("Keymap"), "Lanes")
        .and_then(Keymap::parse)
        .unwrap_or(default.keymap);

    cfg
}

fn config_to_ini(cfg: &Config) -> Ini {
    let mut conf = Ini::new();
    // keys in alphabetical order within each section
    conf.with_section(Some("Options"))
        .set("CountdownSeconds", cfg.countdown_seconds.to_string())
        .set("HitLineOffset", cfg.hit_line_offset.to_string())
        .set("InterpolationRate", cfg.interpolation_rate.to_string())
        .set("LogLevel", cfg.log_level.as_str())
        .set("PlayfieldHeight", cfg.playfield_height.to_string())
        .set("ScrollSpeed", cfg.scroll_speed.as_str());
    conf.with_section(Some("Timing"))
        .set("CalibrationOffsetMs", cfg.calibration_offset_ms.to_string())
        .set("FairWindowMs", cfg.timing_windows.fair_ms().to_string())
        .set("GoodWindowMs", cfg.timing_windows.good_ms().to_string())
        .set("PerfectWindowMs", cfg.timing_windows.perfect_ms().to_string());
    conf.with_section(Some("Calibration"))
        .set("AssociationWindowMs", cfg.calibration.association_window_ms.to_string())
        .set("CueIntervalMs", cfg.calibration.cue_interval_ms.to_string())
        .set("LeadInMs", cfg.calibration.lead_in_ms.to_string())
        .set("MaxDelayMs", cfg.calibration.max_delay_ms.to_string())
        .set("MinDelayMs", cfg.calibration.min_delay_ms.to_string())
        .set("TotalTaps", cfg.calibration.total_taps.to_string());
    conf.with_section(Some("Keymap")).set("Lanes", cfg.keymap.to_token());
    conf
}

/// Reads `path`, writing a default file first when it does not exist. Keys
/// that are missing or malformed fall back to their defaults one by one.
pub fn load_from(path: &Path) -> Config {
    if !path.exists() {
        info!("'{}' not found, creating with default values.", path.display());
        if let Err(e) = save_to(path, &Config::default()) {
            warn!("Failed to create default config file: {e}");
        }
        return Config::default();
    }
    match Ini::load_from_file(path) {
        Ok(conf) => config_from_ini(&conf),
        Err(e) => {
            warn!("Failed to load '{}': {e}. Using default values.", path.display());
            Config::default()
        }
    }
}

pub fn save_to(path: &Path, cfg: &Config) -> std::io::Result<()> {
    config_to_ini(cfg).write_to_file(path)
}

pub fn load() {
    let loaded = load_from(Path::new(CONFIG_PATH));
    *lock() = loaded;
    info!("Configuration loaded from '{CONFIG_PATH}'.");
}

fn save() {
    let cfg = *lock();
    if let Err(e) = save_to(Path::new(CONFIG_PATH), &cfg) {
        warn!("Failed to save config file: {e}");
    }
}

pub fn get() -> Config {
    *lock()
}

/// Stores a new calibration offset. Out-of-range values are rejected and the
/// stored value is left as it was.
pub fn update_calibration_offset_ms(offset_ms: i32) -> Result<(), ConfigError> {
    {
        let mut cfg = lock();
        if cfg.calibration_offset_ms == offset_ms {
            return Ok(());
        }
        cfg.set_calibration_offset_ms(offset_ms)?;
    }
    save();
    Ok(())
}

/// Manual entry path: parse, validate, store. The error text is the
/// validation message shown to the player.
pub fn update_calibration_offset_from_input(input: &str) -> Result<i32, ConfigError> {
    let value = parse_calibration_offset(input)?;
    update_calibration_offset_ms(value)?;
    Ok(value)
}

pub fn update_scroll_speed(speed: ScrollSpeed) {
    {
        let mut cfg = lock();
        if cfg.scroll_speed == speed {
            return;
        }
        cfg.scroll_speed = speed;
    }
    save();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_entry_outside_range_is_rejected() {
        let mut cfg = Config::default();
        cfg.set_calibration_offset_ms(120).unwrap();

        let err = parse_calibration_offset("1000").unwrap_err();
        assert_eq!(err, ConfigError::OffsetOutOfRange { value: 1000, min: -500, max: 500 });
        assert_eq!(err.to_string(), "delay must be between -500 ms and 500 ms (got 1000 ms)");
        assert!(cfg.set_calibration_offset_ms(-501).is_err());
        assert_eq!(cfg.calibration_offset_ms, 120);
    }

    #[test]
    fn offset_entry_parses_signed_whole_numbers() {
        assert_eq!(parse_calibration_offset(" -40 "), Ok(-40));
        assert_eq!(parse_calibration_offset("500"), Ok(500));
        assert!(matches!(parse_calibration_offset("12.5"), Err(ConfigError::InvalidNumber(_))));
        assert!(matches!(parse_calibration_offset(""), Err(ConfigError::InvalidNumber(_))));
        assert!(matches!(
            parse_calibration_offset("99999999999999999999"),
            Err(ConfigError::InvalidNumber(_))
        ));
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hypehero.ini");
        assert_eq!(load_from(&path), Config::default());
        assert!(path.exists());
        assert_eq!(load_from(&path), Config::default());
    }

    #[test]
    fn save_then_load_keeps_every_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hypehero.ini");
        let mut cfg = Config::default();
        cfg.log_level = LogLevel::Debug;
        cfg.calibration_offset_ms = -85;
        cfg.scroll_speed = ScrollSpeed::Fast;
        cfg.timing_windows = TimingWindows::new(40.0, 90.0, 140.0).unwrap();
        cfg.countdown_seconds = 2.0;
        cfg.keymap = Keymap::parse("asdfg").unwrap();
        cfg.calibration.total_taps = 8;
        save_to(&path, &cfg).unwrap();
        assert_eq!(load_from(&path), cfg);
    }

    #[test]
    fn malformed_keys_fall_back_individually() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hypehero.ini");
        std::fs::write(
            &path,
            "[Options]\nScrollSpeed=Warp\nCountdownSeconds=1.5\n\
             [Timing]\nCalibrationOffsetMs=900\nPerfectWindowMs=80\nGoodWindowMs=70\n\
             [Keymap]\nLanes=aab\n",
        )
        .unwrap();
        let cfg = load_from(&path);
        let default = Config::default();
        assert_eq!(cfg.scroll_speed, default.scroll_speed);
        assert_eq!(cfg.countdown_seconds, 1.5);
        assert_eq!(cfg.calibration_offset_ms, 0, "out-of-range offsets are not loaded");
        assert_eq!(cfg.timing_windows, default.timing_windows);
        assert_eq!(cfg.keymap, default.keymap);
    }

    #[test]
    fn log_level_names() {
        assert_eq!(LogLevel::from_str("warning"), Ok(LogLevel::Warn));
        assert_eq!(LogLevel::from_str("TRACE"), Ok(LogLevel::Trace));
        assert!(LogLevel::from_str("loud").is_err());
        assert_eq!(LogLevel::Info.as_level_filter(), LevelFilter::Info);
    }
}
