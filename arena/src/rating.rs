//! Rating Store: persistent Elo ratings per agent.
//!
//! Ratings live in a single JSON object (`{"agent": rating, ...}`), loaded at
//! open and rewritten in full after every update. Updates are pairwise: the
//! winner plays each other listed agent in turn, so later pairs see the ratings
//! already moved by earlier ones.
//!
//! Each update reloads the file and rewrites it through a temp-file rename while
//! holding the store's mutex and, on Unix, an advisory `flock` on a sidecar
//! `<file>.lock`. Tournaments sharing one store, or separate processes sharing
//! one file, never lose updates.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use tracing::{debug, info};

/// Rating of an agent that has never been rated.
pub const BASELINE_RATING: i64 = 1200;
/// Volatility constant.
pub const K_FACTOR: f64 = 32.0;
/// Logistic divisor.
pub const RATING_SCALE: f64 = 400.0;

#[derive(Error, Debug)]
pub enum RatingError {
    #[error("failed to read ratings from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ratings file {path} is not a JSON object of numbers: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write ratings to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to lock ratings file {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize ratings: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Expected score of a player rated `rating` against one rated `opponent`.
pub fn expected_score(rating: i64, opponent: i64) -> f64 {
    1.0 / (1.0 + 10f64.powf((opponent - rating) as f64 / RATING_SCALE))
}

/// Points that move from loser to winner for one pairing.
pub fn pair_delta(winner: i64, loser: i64) -> i64 {
    (K_FACTOR * (1.0 - expected_score(winner, loser))).round() as i64
}

/// Ratings in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RatingTable {
    entries: Vec<(String, i64)>,
}

impl RatingTable {
    pub fn get(&self, agent: &str) -> i64 {
        self.entries
            .iter()
            .find(|(name, _)| name == agent)
            .map(|(_, r)| *r)
            .unwrap_or(BASELINE_RATING)
    }

    fn set(&mut self, agent: &str, rating: i64) {
        match self.entries.iter_mut().find(|(name, _)| name == agent) {
            Some(entry) => entry.1 = rating,
            None => self.entries.push((agent.to_string(), rating)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All ratings, highest first; ties keep first-seen order.
    pub fn leaderboard(&self) -> Vec<(String, i64)> {
        let mut board = self.entries.clone();
        board.sort_by(|a, b| b.1.cmp(&a.1));
        board
    }

    /// Apply one tournament result. Returns `false` (and changes nothing) when the
    /// winner is not among `agents` or there is nobody to beat.
    pub fn apply_result(&mut self, agents: &[String], winner: &str) -> bool {
        if !agents.iter().any(|a| a == winner) {
            return false;
        }
        let mut changed = false;
        for loser in agents.iter().filter(|a| a.as_str() != winner) {
            let r_win = self.get(winner);
            let r_lose = self.get(loser);
            let delta = pair_delta(r_win, r_lose);
            self.set(winner, r_win + delta);
            self.set(loser, r_lose - delta);
            changed = true;
        }
        changed
    }
}

impl Serialize for RatingTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.entries.iter().map(|(k, v)| (k, v)))
    }
}

impl<'de> Deserialize<'de> for RatingTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TableVisitor;

        impl<'de> Visitor<'de> for TableVisitor {
            type Value = RatingTable;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of agent names to ratings")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<RatingTable, A::Error> {
                let mut table = RatingTable::default();
                // Older files may hold floats; ratings are whole points.
                while let Some((name, rating)) = map.next_entry::<String, f64>()? {
                    table.set(&name, rating.round() as i64);
                }
                Ok(table)
            }
        }

        deserializer.deserialize_map(TableVisitor)
    }
}

/// Where tournament results are recorded.
pub trait RatingLedger: Send + Sync {
    /// Current rating of `agent`.
    fn rating(&self, agent: &str) -> i64;

    /// Record that `winner` beat every other agent in `agents`.
    fn update_ratings(&self, agents: &[String], winner: &str) -> Result<(), RatingError>;
}

/// JSON-file backed ratings (or purely in memory).
#[derive(Debug)]
pub struct RatingStore {
    path: Option<PathBuf>,
    table: Mutex<RatingTable>,
}

impl RatingStore {
    /// Open the store at `path`. A missing or empty file is an empty table.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RatingError> {
        let path = path.into();
        let table = load(&path)?;
        debug!(path = %path.display(), agents = table.len(), "loaded ratings");
        Ok(Self {
            path: Some(path),
            table: Mutex::new(table),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            table: Mutex::new(RatingTable::default()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get_leaderboard(&self) -> Vec<(String, i64)> {
        self.lock().leaderboard()
    }

    pub fn snapshot(&self) -> RatingTable {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, RatingTable> {
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RatingLedger for RatingStore {
    fn rating(&self, agent: &str) -> i64 {
        self.lock().get(agent)
    }

    fn update_ratings(&self, agents: &[String], winner: &str) -> Result<(), RatingError> {
        let mut table = self.lock();
        let _file_lock = match &self.path {
            Some(path) => Some(FileLock::acquire(path)?),
            None => None,
        };
        let mut working = match &self.path {
            Some(path) => load(path)?,
            None => table.clone(),
        };
        if !working.apply_result(agents, winner) {
            debug!(winner, "rating update skipped: winner not listed or no opponents");
            *table = working;
            return Ok(());
        }
        if let Some(path) = &self.path {
            save(path, &working)?;
        }
        info!(winner, rating = working.get(winner), "ratings updated");
        *table = working;
        Ok(())
    }
}

/// Exclusive advisory lock on `<ratings file>.lock`, released on drop.
struct FileLock {
    _file: std::fs::File,
}

impl FileLock {
    fn acquire(path: &Path) -> Result<Self, RatingError> {
        let mut name = path.as_os_str().to_owned();
        name.push(".lock");
        let lock_path = PathBuf::from(name);
        let lock_err = |source| RatingError::Lock {
            path: lock_path.clone(),
            source,
        };
        if let Some(parent) = lock_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(lock_err)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(lock_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            // SAFETY: the descriptor belongs to `file`, which outlives the lock.
            if unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) } != 0 {
                return Err(lock_err(std::io::Error::last_os_error()));
            }
        }
        Ok(Self { _file: file })
    }
}

fn load(path: &Path) -> Result<RatingTable, RatingError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(RatingTable::default()),
        Err(source) => {
            return Err(RatingError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    if text.trim().is_empty() {
        return Ok(RatingTable::default());
    }
    serde_json::from_str(&text).map_err(|source| RatingError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn save(path: &Path, table: &RatingTable) -> Result<(), RatingError> {
    let write_err = |source| RatingError::Write {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(write_err)?;

    let json = serde_json::to_vec_pretty(table)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(write_err)?;
    tmp.write_all(&json).map_err(write_err)?;
    tmp.flush().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}
