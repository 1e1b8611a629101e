use std::fmt;
use std::str::FromStr;

/// Scroll-speed presets. Purely visual: they set how long a note is on screen
/// before the hit line and never touch the hit windows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScrollSpeed {
    Slow,
    #[default]
    Normal,
    Fast,
}

impl ScrollSpeed {
    #[inline(always)]
    pub const fn pixels_per_ms(self) -> f32 {
        match self {
            Self::Slow => 0.4,
            Self::Normal => 0.6,
            Self::Fast => 0.9,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Slow => "Slow",
            Self::Normal => "Normal",
            Self::Fast => "Fast",
        }
    }
}

impl fmt::Display for ScrollSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScrollSpeed {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "slow" => Ok(Self::Slow),
            "normal" => Ok(Self::Normal),
            "fast" => Ok(Self::Fast),
            _ => Err(()),
        }
    }
}
