//! services/registry.rs
//!
//! In-memory holder of the best record per model name.
//!
//! - Seeded once from storage; storage stays the source of truth and memory is
//!   a cache of it that is rebuilt on every start.
//! - `submit` is the only mutation. Per name it runs compare → durable write →
//!   memory swap under one commit lock, so two racing submissions can never
//!   both win against the same stale value.
//! - Memory is swapped only after the write returned Ok. A failed write leaves
//!   the held record exactly as it was.
//! - Readers take a short read lock on the held record and never wait for an
//!   in-flight write.

use serde_json::Value;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::services::record::{Record, Submission};
use crate::services::store::{RecordStore, StoreError};
use crate::utils::path::check_name;

/// Per-name state. `commit` serializes submitters, `held` serves readers.
struct Slot {
    commit: Mutex<()>,
    held: RwLock<Record>,
}

impl Slot {
    fn new(record: Record) -> Arc<Self> {
        Arc::new(Self {
            commit: Mutex::new(()),
            held: RwLock::new(record),
        })
    }
}

pub struct Registry<S: RecordStore> {
    store: S,
    active: String,
    slots: RwLock<HashMap<String, Arc<Slot>>>,
}

impl<S: RecordStore> Registry<S> {
    /// Load every record from `store` and seed from them.
    pub fn seeded(store: S, default_name: &str) -> Result<Self, StoreError> {
        let candidates = store.list_all()?;
        Ok(Self::seed(store, candidates, default_name))
    }

    /// Seed from an explicit candidate sequence.
    ///
    /// The highest score becomes the active record; on ties the first one in
    /// enumeration order wins. With no candidates the active record is
    /// `default_name` at score 0 with a null payload. Every other name keeps
    /// its own first maximum.
    pub fn seed(store: S, candidates: impl IntoIterator<Item = Record>, default_name: &str) -> Self {
        let mut best: HashMap<String, Record> = HashMap::new();
        let mut active: Option<Record> = None;

        for candidate in candidates {
            if active.as_ref().map_or(true, |a| candidate.score > a.score) {
                active = Some(candidate.clone());
            }
            match best.entry(candidate.name.clone()) {
                Entry::Occupied(mut held) => {
                    if candidate.score > held.get().score {
                        held.insert(candidate);
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(candidate);
                }
            }
        }

        let active = active.unwrap_or_else(|| Record::unset(default_name));
        let active_name = active.name.clone();
        let active_score = active.score;
        best.entry(active_name.clone()).or_insert(active);
        tracing::info!(
            "seeded registry: active model {active_name:?} with score {active_score} ({} names)",
            best.len()
        );

        let slots = best
            .into_iter()
            .map(|(name, record)| (name, Slot::new(record)))
            .collect();

        Self {
            store,
            active: active_name,
            slots: RwLock::new(slots),
        }
    }

    /// Name addressed by requests that do not name a model.
    pub fn active_name(&self) -> &str {
        &self.active
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Held record for `name`; an unseen name reads as score 0.
    pub fn current(&self, name: &str) -> Record {
        match read(&self.slots).get(name) {
            Some(slot) => read(&slot.held).clone(),
            None => Record::unset(name),
        }
    }

    pub fn current_active(&self) -> Record {
        self.current(&self.active)
    }

    /// Names with a held record, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = read(&self.slots).keys().cloned().collect();
        names.sort();
        names
    }

    /// Offer a candidate for `name`.
    ///
    /// Accepted only if `score` is strictly greater than the held score. On
    /// acceptance the record is written through the store first and becomes
    /// visible in memory after the write succeeded. A write error is returned
    /// as-is and nothing changes.
    pub fn submit(&self, name: &str, score: f64, payload: Value) -> Result<Submission, StoreError> {
        check_name(name).map_err(|reason| StoreError::InvalidName {
            name: name.to_string(),
            reason,
        })?;

        // An unseen name that cannot win is rejected without allocating state.
        let existing = read(&self.slots).get(name).cloned();
        let (slot, created) = match existing {
            Some(slot) => (slot, false),
            None => {
                let unset = Record::unset(name);
                if !unset.is_beaten_by(score) {
                    tracing::debug!("rejected {name:?}: score {score} does not beat 0");
                    return Ok(Submission::Rejected(unset));
                }
                self.slot(name)
            }
        };
        let _commit = lock(&slot.commit);

        let held = read(&slot.held).clone();
        if !held.is_beaten_by(score) {
            tracing::debug!(
                "rejected {name:?}: score {score} does not beat {}",
                held.score
            );
            if created {
                self.forget_unused(name, &slot);
            }
            return Ok(Submission::Rejected(held));
        }

        let next = Record::new(name, score, payload);
        if let Err(e) = self.store.write(&next) {
            tracing::error!("write failed for {name:?}, keeping score {}: {e}", held.score);
            if created {
                self.forget_unused(name, &slot);
            }
            return Err(e);
        }
        *write(&slot.held) = next.clone();
        tracing::info!("committed {name:?}: {} -> {score}", held.score);
        Ok(Submission::Accepted(next))
    }

    /// Slot for `name`, created at score 0 if still missing; the flag tells
    /// whether this call inserted it. The map lock is released before the
    /// caller takes the slot's commit lock.
    fn slot(&self, name: &str) -> (Arc<Slot>, bool) {
        let mut slots = write(&self.slots);
        match slots.entry(name.to_string()) {
            Entry::Occupied(held) => (Arc::clone(held.get()), false),
            Entry::Vacant(empty) => {
                let slot = empty.insert(Slot::new(Record::unset(name)));
                (Arc::clone(slot), true)
            }
        }
    }

    /// Drop a slot that never held a commit and that no other submitter has
    /// picked up. Called with the slot's commit lock held; new clones of the
    /// slot only come out of the map, which is write-locked here.
    fn forget_unused(&self, name: &str, slot: &Arc<Slot>) {
        let mut slots = write(&self.slots);
        let ours = slots.get(name).is_some_and(|s| Arc::ptr_eq(s, slot));
        if ours && Arc::strong_count(slot) == 2 && *read(&slot.held) == Record::unset(name) {
            slots.remove(name);
        }
    }
}

// Held values are only ever replaced whole, so a poisoned lock still guards a
// consistent record.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(l: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    l.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(l: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    l.write().unwrap_or_else(PoisonError::into_inner)
}
