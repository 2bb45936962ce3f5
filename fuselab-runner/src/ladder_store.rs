//! Keyed ladder-state store.
//!
//! One `Mutex` per `SeriesKey` gives single-writer-per-key: `update` holds
//! the key's lock across read, evaluation and commit, while different keys
//! proceed in parallel. The outer `RwLock` is only taken for writing when a
//! key is seen for the first time.
//!
//! Persistence is one JSON object mapping `SYMBOL@tf` to its state. Writes
//! are atomic (.tmp + rename). On load, an entry that does not parse or
//! violates the ladder invariants is reset to stage 0 and logged; other keys
//! are unaffected. A file that is not a JSON object at all is quarantined.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use thiserror::Error;
use tracing::{info, warn};

use fuselab_core::domain::SeriesKey;
use fuselab_core::engines::LadderState;
use fuselab_core::EvaluationError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("ladder store {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("ladder store serialization: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("ladder store has no backing file")]
    NoPath,
}

type Slot = Arc<Mutex<LadderState>>;

#[derive(Debug, Default)]
pub struct LadderStore {
    slots: RwLock<HashMap<SeriesKey, Slot>>,
    path: Option<PathBuf>,
    recovered: Vec<EvaluationError>,
}

fn lock(slot: &Mutex<LadderState>) -> MutexGuard<'_, LadderState> {
    // A panic inside `update` never leaves a half-written state: the new
    // state is only assigned after the closure returns.
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

impl LadderStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open the store backed by `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let mut store = Self {
            path: Some(path.clone()),
            ..Self::default()
        };
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(store),
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        let entries: BTreeMap<String, serde_json::Value> = match serde_json::from_str(&text) {
            Ok(entries) => entries,
            Err(e) => {
                let quarantine = path.with_extension("json.corrupt");
                warn!(path = %path.display(), error = %e, "ladder store unreadable, quarantining");
                fs::rename(&path, &quarantine).map_err(|source| StoreError::Io {
                    path: quarantine.clone(),
                    source,
                })?;
                store.recovered.push(EvaluationError::StateCorruption {
                    key: "*".to_string(),
                    detail: e.to_string(),
                });
                return Ok(store);
            }
        };

        let mut slots = HashMap::new();
        for (raw_key, value) in entries {
            let key: SeriesKey = match raw_key.parse() {
                Ok(key) => key,
                Err(e) => {
                    warn!(key = %raw_key, error = %e, "dropping ladder entry with malformed key");
                    continue;
                }
            };
            let state = serde_json::from_value::<LadderState>(value)
                .map_err(|e| e.to_string())
                .and_then(|state| state.validate().map(|()| state));
            let state = match state {
                Ok(state) => state,
                Err(detail) => {
                    let err = EvaluationError::StateCorruption {
                        key: key.to_string(),
                        detail,
                    };
                    warn!(%key, error = %err, "resetting corrupted ladder state");
                    store.recovered.push(err);
                    LadderState::default()
                }
            };
            slots.insert(key, Arc::new(Mutex::new(state)));
        }
        info!(path = %path.display(), keys = slots.len(), "ladder store loaded");
        store.slots = RwLock::new(slots);
        Ok(store)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Corruptions found and reset while opening.
    pub fn recovered(&self) -> &[EvaluationError] {
        &self.recovered
    }

    fn slot(&self, key: &SeriesKey) -> Slot {
        if let Some(slot) = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
        {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(key.clone()).or_default())
    }

    pub fn get(&self, key: &SeriesKey) -> LadderState {
        lock(&self.slot(key)).clone()
    }

    /// Read-modify-commit under the key's lock. `f` returns the state to
    /// commit and a value passed back to the caller.
    pub fn update<T>(&self, key: &SeriesKey, f: impl FnOnce(&LadderState) -> (LadderState, T)) -> T {
        let slot = self.slot(key);
        let mut state = lock(&slot);
        let (next, out) = f(&state);
        *state = next;
        out
    }

    pub fn reset(&self, key: &SeriesKey) {
        *lock(&self.slot(key)) = LadderState::default();
    }

    pub fn reset_all(&self) {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        for slot in slots.values() {
            *lock(slot) = LadderState::default();
        }
    }

    /// Point-in-time copy of every key's state, in key order.
    pub fn entries(&self) -> BTreeMap<SeriesKey, LadderState> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots
            .iter()
            .map(|(key, slot)| (key.clone(), lock(slot).clone()))
            .collect()
    }

    pub fn save(&self) -> Result<(), StoreError> {
        let path = self.path.as_deref().ok_or(StoreError::NoPath)?;
        self.save_to(path)
    }

    /// Write every key atomically: write `{path}.tmp`, then rename.
    pub fn save_to(&self, path: &Path) -> Result<(), StoreError> {
        let entries: BTreeMap<String, LadderState> = self
            .entries()
            .into_iter()
            .map(|(key, state)| (key.to_string(), state))
            .collect();
        let json = serde_json::to_string_pretty(&entries)?;

        let io_err = |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, json).map_err(io_err)?;
        fs::rename(&tmp_path, path).map_err(|source| {
            let _ = fs::remove_file(&tmp_path);
            io_err(source)
        })
    }
}
