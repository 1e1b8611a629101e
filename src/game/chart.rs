use std::path::Path;

use log::info;
use serde::Deserialize;

use crate::core::input::{LANE_COUNT, Lane};
use crate::error::ChartError;

/* ---------------------------- on-disk schema ---------------------------- */

#[derive(Deserialize)]
struct RawChart {
    metadata: Option<RawMetadata>,
    #[serde(default)]
    song: Option<RawSong>,
    notes: Option<Vec<RawNote>>,
}

#[derive(Deserialize)]
struct RawMetadata {
    bpm: Option<f64>,
}

#[derive(Deserialize)]
struct RawSong {
    #[serde(alias = "audioRef")]
    url: Option<String>,
}

#[derive(Deserialize)]
struct RawNote {
    lane: i64,
    time: f64,
}

/* ------------------------------ validated ------------------------------- */

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct NoteSpec {
    pub lane: Lane,
    /// Milliseconds from track start, never negative.
    pub time_ms: f64,
}

/// Immutable note schedule plus the metadata judgment needs.
#[derive(Clone, Debug, PartialEq)]
pub struct Chart {
    bpm: f64,
    audio_ref: Option<String>,
    notes: Vec<NoteSpec>,
}

impl Chart {
    /// Validates and sorts the notes by time. Sorting is stable so notes on
    /// the same instant keep their file order.
    pub fn new(bpm: f64, audio_ref: Option<String>, mut notes: Vec<NoteSpec>) -> Result<Self, ChartError> {
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(ChartError::Format(format!("metadata.bpm must be positive, got {bpm}")));
        }
        if let Some((i, n)) = notes
            .iter()
            .enumerate()
            .find(|(_, n)| !n.time_ms.is_finite() || n.time_ms < 0.0)
        {
            return Err(ChartError::Format(format!(
                "note {i} has invalid time {} (must be a non-negative number of ms)",
                n.time_ms
            )));
        }
        notes.sort_by(|a, b| a.time_ms.total_cmp(&b.time_ms));
        Ok(Self { bpm, audio_ref, notes })
    }

    #[inline(always)]
    pub const fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn audio_ref(&self) -> Option<&str> {
        self.audio_ref.as_deref()
    }

    /// Notes in ascending time order.
    #[inline(always)]
    pub fn notes(&self) -> &[NoteSpec] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Time of the last note, 0 for an empty chart.
    pub fn last_note_time_ms(&self) -> f64 {
        self.notes.last().map_or(0.0, |n| n.time_ms)
    }

    /// Smallest gap between consecutive notes of one lane, `None` when the
    /// lane has fewer than two notes.
    pub fn min_lane_spacing_ms(&self, lane: Lane) -> Option<f64> {
        let mut prev: Option<f64> = None;
        let mut min: Option<f64> = None;
        for n in self.notes.iter().filter(|n| n.lane == lane) {
            if let Some(p) = prev {
                let gap = n.time_ms - p;
                min = Some(min.map_or(gap, |m: f64| m.min(gap)));
            }
            prev = Some(n.time_ms);
        }
        min
    }
}

/// Parses chart JSON: `{ metadata: { bpm }, song: { url }, notes: [{ lane, time }] }`.
pub fn load_chart(raw: &str) -> Result<Chart, ChartError> {
    let parsed: RawChart =
        serde_json::from_str(raw).map_err(|e| ChartError::Format(e.to_string()))?;

    let bpm = parsed
        .metadata
        .ok_or_else(|| ChartError::Format("missing metadata".to_string()))?
        .bpm
        .ok_or_else(|| ChartError::Format("missing metadata.bpm".to_string()))?;
    let raw_notes = parsed
        .notes
        .ok_or_else(|| ChartError::Format("missing notes".to_string()))?;

    let mut notes = Vec::with_capacity(raw_notes.len());
    for (i, n) in raw_notes.into_iter().enumerate() {
        let lane = usize::try_from(n.lane)
            .ok()
            .and_then(Lane::new)
            .ok_or_else(|| {
                ChartError::Format(format!(
                    "note {i} has lane {} outside 0..{LANE_COUNT}",
                    n.lane
                ))
            })?;
        notes.push(NoteSpec { lane, time_ms: n.time });
    }

    let chart = Chart::new(bpm, parsed.song.and_then(|s| s.url), notes)?;
    info!("Loaded chart: {} notes at {} BPM.", chart.len(), chart.bpm());
    Ok(chart)
}

pub fn load_chart_file(path: &Path) -> Result<Chart, ChartError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ChartError::Fetch {
        path: path.to_path_buf(),
        source,
    })?;
    load_chart(&raw)
}
