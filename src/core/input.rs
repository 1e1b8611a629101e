use std::fmt;

pub const LANE_COUNT: usize = 5;
pub const DEFAULT_LANE_KEYS: [char; LANE_COUNT] = ['d', 'f', 'j', 'k', 'l'];

/// One of the parallel tracks notes fall through. Always `< LANE_COUNT`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Lane(u8);

impl Lane {
    #[inline(always)]
    pub const fn new(index: usize) -> Option<Self> {
        if index < LANE_COUNT {
            Some(Self(index as u8))
        } else {
            None
        }
    }

    #[inline(always)]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub fn all() -> impl Iterator<Item = Lane> {
        (0..LANE_COUNT as u8).map(Lane)
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputSource {
    Keyboard,
    Touch,
    Pointer,
}

impl InputSource {
    #[inline(always)]
    const fn slot(self) -> usize {
        match self {
            Self::Keyboard => 0,
            Self::Touch => 1,
            Self::Pointer => 2,
        }
    }
}

/// A press or release on one lane, already stripped of its device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LaneInput {
    pub lane: Lane,
    pub pressed: bool,
    pub source: InputSource,
}

/// Raw key identifiers the host forwards. Only the ones the game binds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    Char(char),
    Space,
    Enter,
    Escape,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VirtualAction {
    Lane(Lane),
    /// Pause during play, cancel elsewhere.
    Back,
    Start,
    /// The dedicated calibration tap key. Lane keys also count as taps there.
    Tap,
}

/// Static table from raw keys to actions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Keymap {
    lane_keys: [char; LANE_COUNT],
}

impl Default for Keymap {
    fn default() -> Self {
        Self { lane_keys: DEFAULT_LANE_KEYS }
    }
}

impl Keymap {
    /// Builds a keymap from one key per lane. Keys must be distinct and not
    /// whitespace; matching is case-insensitive.
    pub fn from_lane_keys(keys: [char; LANE_COUNT]) -> Option<Self> {
        let mut lowered = [' '; LANE_COUNT];
        for (i, k) in keys.iter().enumerate() {
            if k.is_whitespace() {
                return None;
            }
            let k = k.to_ascii_lowercase();
            if lowered[..i].contains(&k) {
                return None;
            }
            lowered[i] = k;
        }
        Some(Self { lane_keys: lowered })
    }

    /// Parses a config token such as `dfjkl` or `d,f,j,k,l`.
    pub fn parse(spec: &str) -> Option<Self> {
        let chars: Vec<char> = spec
            .chars()
            .filter(|c| !c.is_whitespace() && *c != ',')
            .collect();
        let keys: [char; LANE_COUNT] = chars.try_into().ok()?;
        Self::from_lane_keys(keys)
    }

    pub const fn lane_keys(&self) -> [char; LANE_COUNT] {
        self.lane_keys
    }

    pub fn to_token(&self) -> String {
        self.lane_keys.iter().collect()
    }

    #[inline(always)]
    pub fn lane_for_char(&self, c: char) -> Option<Lane> {
        let c = c.to_ascii_lowercase();
        self.lane_keys
            .iter()
            .position(|&k| k == c)
            .and_then(Lane::new)
    }

    pub fn action_for(&self, key: Key) -> Option<VirtualAction> {
        match key {
            Key::Char(c) => self.lane_for_char(c).map(VirtualAction::Lane),
            Key::Space => Some(VirtualAction::Tap),
            Key::Enter => Some(VirtualAction::Start),
            Key::Escape => Some(VirtualAction::Back),
        }
    }
}

/// Per-lane pressed state, derived from edges of every source. A lane counts
/// as pressed while any source holds it.
#[derive(Clone, Copy, Debug, Default)]
pub struct LaneState {
    held: [[bool; 3]; LANE_COUNT],
}

impl LaneState {
    /// Records an edge. Returns true on a fresh press, i.e. the lane was not
    /// held by this source before.
    pub fn apply(&mut self, input: LaneInput) -> bool {
        let slot = &mut self.held[input.lane.index()][input.source.slot()];
        let fresh = input.pressed && !*slot;
        *slot = input.pressed;
        fresh
    }

    #[inline(always)]
    pub fn is_pressed(&self, lane: Lane) -> bool {
        self.held[lane.index()].iter().any(|&h| h)
    }

    pub fn any_pressed(&self) -> bool {
        Lane::all().any(|lane| self.is_pressed(lane))
    }

    pub fn pressed(&self) -> [bool; LANE_COUNT] {
        std::array::from_fn(|i| self.held[i].iter().any(|&h| h))
    }

    pub fn release_all(&mut self) {
        self.held = [[false; 3]; LANE_COUNT];
    }
}
