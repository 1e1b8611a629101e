use std::fs;
use std::hash::Hasher;
use std::io;
use std::path::PathBuf;

use bincode::{Decode, Encode};
use chrono::Local;
use log::{debug, info, warn};
use rustc_hash::FxHashMap;
use twox_hash::XxHash64;

use crate::error::ScoreStoreError;
use crate::game::stats::SessionStats;

const SCORES_DIR: &str = "save/scores";

/// Identifies one chart: high scores are kept per song and difficulty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SongKey {
    pub song: String,
    pub difficulty: String,
}

impl SongKey {
    pub fn new(song: impl Into<String>, difficulty: impl Into<String>) -> Self {
        Self { song: song.into(), difficulty: difficulty.into() }
    }

    fn file_stem(&self) -> String {
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(self.song.as_bytes());
        hasher.write_u8(0x1f);
        hasher.write(self.difficulty.as_bytes());
        format!("{:016x}", hasher.finish())
    }
}

/// Best result for one chart as stored on disk.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct HighScore {
    pub song: String,
    pub difficulty: String,
    pub score: u64,
    pub max_combo: u32,
    pub accuracy_percent: f64,
    /// RFC 3339 local time.
    pub achieved_at: String,
}

/// Disk-backed high scores with an in-memory cache of what has been read.
#[derive(Debug)]
pub struct ScoreStore {
    root: PathBuf,
    cache: FxHashMap<SongKey, Option<HighScore>>,
}

impl ScoreStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), cache: FxHashMap::default() }
    }

    pub fn open_default() -> Self {
        Self::new(SCORES_DIR)
    }

    fn path_for(&self, key: &SongKey) -> PathBuf {
        self.root.join(format!("{}.bin", key.file_stem()))
    }

    fn read_from_disk(&self, key: &SongKey) -> Result<Option<HighScore>, ScoreStoreError> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let (entry, _) = bincode::decode_from_slice::<HighScore, _>(&bytes, bincode::config::standard())?;
        // a hash collision would hand back another chart's record
        if entry.song != key.song || entry.difficulty != key.difficulty {
            return Ok(None);
        }
        Ok(Some(entry))
    }

    /// Previous best, `None` when the chart was never cleared. Unreadable
    /// records are logged and treated as missing.
    pub fn best(&mut self, key: &SongKey) -> Option<&HighScore> {
        if !self.cache.contains_key(key) {
            let loaded = self.read_from_disk(key).unwrap_or_else(|e| {
                warn!("Failed to read high score for {}/{}: {e}", key.song, key.difficulty);
                None
            });
            self.cache.insert(key.clone(), loaded);
        }
        self.cache.get(key).and_then(Option::as_ref)
    }

    /// Stores `stats` if its score beats the previous best (a missing record
    /// counts as 0). Returns whether a new record was written.
    pub fn submit(&mut self, key: &SongKey, stats: &SessionStats) -> Result<bool, ScoreStoreError> {
        let previous = self.best(key).map_or(0, |h| h.score);
        if stats.score() <= previous {
            debug!(
                "Score {} for {}/{} does not beat best {previous}.",
                stats.score(),
                key.song,
                key.difficulty
            );
            return Ok(false);
        }

        let entry = HighScore {
            song: key.song.clone(),
            difficulty: key.difficulty.clone(),
            score: stats.score(),
            max_combo: stats.max_combo(),
            accuracy_percent: stats.accuracy_percent(),
            achieved_at: Local::now().to_rfc3339(),
        };
        let buf = bincode::encode_to_vec(&entry, bincode::config::standard())?;
        fs::create_dir_all(&self.root)?;
        let path = self.path_for(key);
        fs::write(&path, buf)?;
        info!(
            "New high score {} for {}/{} (previous {previous}), stored at {:?}",
            entry.score, key.song, key.difficulty, path
        );
        self.cache.insert(key.clone(), Some(entry));
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::judgment::JudgeGrade;

    fn stats(grades: &[JudgeGrade]) -> SessionStats {
        let mut s = SessionStats::default();
        for g in grades {
            s.record(*g);
        }
        s
    }

    #[test]
    fn first_clear_is_always_a_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ScoreStore::new(dir.path().join("scores"));
        let key = SongKey::new("Neon Rush", "hard");
        assert!(store.best(&key).is_none());
        assert!(store.submit(&key, &stats(&[JudgeGrade::Fair])).unwrap());
        let best = store.best(&key).unwrap();
        assert_eq!(best.score, 100);
        assert_eq!(best.max_combo, 1);
        assert!(chrono::DateTime::parse_from_rfc3339(&best.achieved_at).is_ok());
    }

    #[test]
    fn zero_score_never_replaces_missing_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ScoreStore::new(dir.path());
        let key = SongKey::new("Neon Rush", "easy");
        assert!(!store.submit(&key, &stats(&[JudgeGrade::Miss])).unwrap());
        assert!(store.best(&key).is_none());
    }

    #[test]
    fn only_a_higher_score_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let key = SongKey::new("Skyline", "normal");
        {
            let mut store = ScoreStore::new(dir.path());
            assert!(store.submit(&key, &stats(&[JudgeGrade::Perfect, JudgeGrade::Good])).unwrap());
            assert!(!store.submit(&key, &stats(&[JudgeGrade::Perfect, JudgeGrade::Good])).unwrap());
            assert!(!store.submit(&key, &stats(&[JudgeGrade::Perfect])).unwrap());
        }
        // a fresh store reads the record back from disk
        let mut store = ScoreStore::new(dir.path());
        assert_eq!(store.best(&key).map(|h| h.score), Some(500));
        assert!(store.submit(&key, &stats(&[JudgeGrade::Perfect, JudgeGrade::Perfect])).unwrap());
        assert_eq!(store.best(&key).map(|h| h.score), Some(600));
    }

    #[test]
    fn difficulties_are_kept_apart() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ScoreStore::new(dir.path());
        let easy = SongKey::new("Skyline", "easy");
        let hard = SongKey::new("Skyline", "hard");
        store.submit(&easy, &stats(&[JudgeGrade::Perfect])).unwrap();
        assert!(store.best(&hard).is_none());
        assert_ne!(easy.file_stem(), hard.file_stem());
    }

    #[test]
    fn corrupt_record_reads_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let key = SongKey::new("Glitch", "hard");
        let mut store = ScoreStore::new(dir.path());
        std::fs::write(store.path_for(&key), b"\xff\xff").unwrap();
        assert!(store.best(&key).is_none());
    }
}
