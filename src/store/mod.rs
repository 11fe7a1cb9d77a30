// State store: durable timers + allowed-operator set
//
// One in-memory authoritative copy behind a single RwLock. Every mutation
// is write-through: the change is applied to a scratch copy, persisted with
// a temp-file + atomic rename, and only then committed to memory. A failed
// durable write therefore leaves memory (and the live file) untouched, so
// an acknowledged mutation is always durable.

pub mod model;

use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::FeederError;
pub use model::{parse_timer_key, timer_key, StateFile, Timer, TimerEntry};

#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    state: RwLock<StateFile>,
}

impl StateStore {
    /// Load durable state from `path`.
    ///
    /// A missing file is an empty store, not an error. A file that exists
    /// but cannot be parsed is `StoreCorrupt`; the caller decides whether
    /// to abort or continue with `open_empty` — partial data is never
    /// silently discarded here.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, FeederError> {
        let path = path.into();

        if !path.exists() {
            debug!(path = %path.display(), "No state file, starting empty");
            return Ok(Self {
                path,
                state: RwLock::new(StateFile::default()),
            });
        }

        let contents = fs::read_to_string(&path)?;
        let state: StateFile = serde_json::from_str(&contents)
            .map_err(|e| FeederError::StoreCorrupt(format!("{}: {e}", path.display())))?;

        info!(
            path = %path.display(),
            timers = state.timers.len(),
            operators = state.operators.len(),
            "Loaded state"
        );

        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    /// Empty-but-valid store at `path`; the fallback after `StoreCorrupt`.
    pub fn open_empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: RwLock::new(StateFile::default()),
        }
    }

    /// Add or replace the timer at `hour:minute`. Returns true when an
    /// existing timer at the same time-of-day was replaced.
    pub async fn upsert_timer(
        &self,
        hour: u8,
        minute: u8,
        portions: u32,
    ) -> Result<bool, FeederError> {
        if portions == 0 {
            return Err(FeederError::InvalidTimer(
                "portions must be at least 1".to_string(),
            ));
        }
        let key = timer_key(hour, minute)?;

        let mut guard = self.state.write().await;
        let mut next = guard.clone();
        let replaced = next
            .timers
            .insert(
                key.clone(),
                TimerEntry {
                    portions,
                    last_fired: None,
                },
            )
            .is_some();
        persist(&self.path, &next)?;
        *guard = next;

        info!(timer = %key, portions, replaced, "Timer stored");
        Ok(replaced)
    }

    /// Remove the timer at `hour:minute`, or `TimerNotFound`.
    pub async fn remove_timer(&self, hour: u8, minute: u8) -> Result<(), FeederError> {
        let key = timer_key(hour, minute)?;

        let mut guard = self.state.write().await;
        let mut next = guard.clone();
        if next.timers.remove(&key).is_none() {
            return Err(FeederError::TimerNotFound(key));
        }
        persist(&self.path, &next)?;
        *guard = next;

        info!(timer = %key, "Timer removed");
        Ok(())
    }

    /// All timers, sorted by time-of-day. Entries whose stored key no
    /// longer parses are skipped.
    pub async fn timers(&self) -> Vec<Timer> {
        let guard = self.state.read().await;
        guard
            .timers
            .iter()
            .filter_map(|(key, entry)| {
                let (hour, minute) = parse_timer_key(key)?;
                Some(Timer {
                    hour,
                    minute,
                    portions: entry.portions,
                    last_fired: entry.last_fired,
                })
            })
            .collect()
    }

    /// Record a successful fire of `key` on `date`.
    ///
    /// A timer deleted between being read as due and the fire completing
    /// is a benign race; marking it is then a no-op.
    pub async fn mark_fired(&self, key: &str, date: NaiveDate) -> Result<(), FeederError> {
        let mut guard = self.state.write().await;
        let mut next = guard.clone();
        match next.timers.get_mut(key) {
            Some(entry) => entry.last_fired = Some(date),
            None => return Ok(()),
        }
        persist(&self.path, &next)?;
        *guard = next;

        debug!(timer = %key, %date, "last_fired updated");
        Ok(())
    }

    pub async fn is_operator(&self, id: i64) -> bool {
        self.state.read().await.operators.contains(&id)
    }

    pub async fn operators(&self) -> BTreeSet<i64> {
        self.state.read().await.operators.clone()
    }

    /// Insert an operator id. Returns true if it was newly added.
    pub async fn add_operator(&self, id: i64) -> Result<bool, FeederError> {
        let mut guard = self.state.write().await;
        if guard.operators.contains(&id) {
            return Ok(false);
        }
        let mut next = guard.clone();
        next.operators.insert(id);
        persist(&self.path, &next)?;
        *guard = next;

        info!(operator = id, "Operator added");
        Ok(true)
    }

    /// Merge the configured seed operators into the stored set at startup.
    /// Persists only when something actually changed.
    pub async fn seed_operators(&self, ids: &[i64]) -> Result<(), FeederError> {
        let mut guard = self.state.write().await;
        let mut next = guard.clone();
        let mut changed = false;
        for id in ids {
            changed |= next.operators.insert(*id);
        }
        if changed {
            persist(&self.path, &next)?;
            *guard = next;
        }
        Ok(())
    }
}

/// Write the full document atomically: serialize, write to a temp file
/// next to the target, rename over the live file. A concurrent reader
/// never observes a partial write.
fn persist(path: &Path, state: &StateFile) -> Result<(), FeederError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let json = serde_json::to_string_pretty(state)
        .map_err(|e| FeederError::Io(std::io::Error::other(e)))?;

    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, json)?;
    fs::rename(&temp_path, path)?;
    Ok(())
}
