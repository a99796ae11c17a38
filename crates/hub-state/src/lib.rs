//! Event-ordered shared state.
//!
//! # Overview
//!
//! Extensions publish a data tree as their "shared state" and tag each
//! publish with the `seq` of the event that produced it. Other extensions
//! read that state back through the lens of a *different* event's `seq`,
//! asking: "what was owner X's state as of this point in the event order?"
//!
//! This is not a key-value store. It is ordered: reads are always relative
//! to a sequence number, never just "the latest value."
//!
//! # Pending vs. Set
//!
//! An owner may reserve a sequence number before it has a value ready
//! ([`SharedStateStore::create_pending`]), then resolve it later
//! ([`SharedStateStore::set`]). A reader using [`StateResolution::Barrier`]
//! blocks on any pending snapshot at or before its requested `seq` -- it
//! needs to see a *settled* answer, not a provisional one. A reader using
//! [`StateResolution::Any`] skips pending snapshots and returns the most
//! recent one that has actually been set, even if something newer is still
//! pending.
//!
//! "Blocks" here means the store reports no answer yet; it is the caller's
//! job (typically an extension's `ready_for_event` gate) to retry once
//! something changes.
//!
//! This crate knows nothing about events, extensions, or the hub -- it is
//! generic over the value type `V` so it can be reused without creating a
//! dependency back onto the crate that defines events.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

/// Errors raised by [`SharedStateStore`] operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("shared state already exists for '{owner}' at seq {seq}")]
    AlreadyExists { owner: String, seq: u64 },

    #[error("no shared-state registry for owner '{owner}'")]
    NoSuchOwner { owner: String },
}

pub type StateResult<T> = Result<T, StateError>;

#[derive(Debug, Clone)]
enum Snapshot<V> {
    Pending,
    Set(V),
}

/// How a read should treat an unresolved snapshot between the last settled
/// value and the requested `seq`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateResolution {
    /// Block (report no answer) if anything at or before the requested `seq`
    /// is still pending.
    Barrier,
    /// Ignore pending snapshots; return the most recent settled value.
    Any,
}

/// A read request: "owner's state as of this point in the event order."
#[derive(Debug, Clone, Copy)]
pub struct StateRequest {
    pub seq: u64,
    pub resolution: StateResolution,
}

impl StateRequest {
    #[must_use]
    pub fn barrier(seq: u64) -> Self {
        Self { seq, resolution: StateResolution::Barrier }
    }

    #[must_use]
    pub fn any(seq: u64) -> Self {
        Self { seq, resolution: StateResolution::Any }
    }
}

struct OwnerLog<V> {
    /// Ascending by seq; owners only ever append, since a hub `seq` is
    /// monotonic and each owner publishes at most once per seq.
    entries: Vec<(u64, Snapshot<V>)>,
}

impl<V> OwnerLog<V> {
    fn new() -> Self {
        Self { entries: Vec::new() }
    }

    fn latest_at_or_before(&self, seq: u64) -> Option<&(u64, Snapshot<V>)> {
        self.entries.iter().rev().find(|(s, _)| *s <= seq)
    }
}

/// Registry of per-owner, seq-ordered state snapshots.
///
/// Cheap to clone behind an `Arc`; internally it is one `RwLock` per owner
/// plus an outer lock guarding the owner map itself, so concurrent readers
/// of *different* owners never contend.
pub struct SharedStateStore<V> {
    owners: RwLock<BTreeMap<String, Arc<RwLock<OwnerLog<V>>>>>,
}

impl<V: Clone> Default for SharedStateStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> SharedStateStore<V> {
    #[must_use]
    pub fn new() -> Self {
        Self { owners: RwLock::new(BTreeMap::new()) }
    }

    fn owner_log(&self, owner: &str) -> Arc<RwLock<OwnerLog<V>>> {
        if let Some(log) = self.owners.read().get(owner) {
            return log.clone();
        }
        self.owners
            .write()
            .entry(owner.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(OwnerLog::new())))
            .clone()
    }

    /// Reserves `seq` as pending for `owner`. Fails if `owner` already has an
    /// entry at `seq` (set or pending) -- a duplicate publish at the same
    /// seq is a caller bug, not a race to arbitrate.
    pub fn create_pending(&self, owner: &str, seq: u64) -> StateResult<()> {
        let log = self.owner_log(owner);
        let mut log = log.write();
        if log.entries.iter().any(|(s, _)| *s == seq) {
            return Err(StateError::AlreadyExists { owner: owner.to_string(), seq });
        }
        log.entries.push((seq, Snapshot::Pending));
        Ok(())
    }

    /// Publishes `value` for `owner` at `seq`. If a pending entry exists at
    /// exactly `seq` it is resolved in place; otherwise a new settled entry
    /// is appended. Fails with `AlreadyExists` if `seq` is already settled --
    /// `pending -> set` is the only allowed in-place mutation, a second
    /// `set` at an already-`Set` seq is not one.
    pub fn set(&self, owner: &str, seq: u64, value: V) -> StateResult<()> {
        let log = self.owner_log(owner);
        let mut log = log.write();
        if let Some(slot) = log.entries.iter_mut().find(|(s, _)| *s == seq) {
            if matches!(slot.1, Snapshot::Set(_)) {
                return Err(StateError::AlreadyExists { owner: owner.to_string(), seq });
            }
            slot.1 = Snapshot::Set(value);
        } else {
            log.entries.push((seq, Snapshot::Set(value)));
        }
        Ok(())
    }

    /// Reads `owner`'s state as of `request.seq`, per `request.resolution`.
    /// Returns `None` if there is nothing published yet, or (under
    /// [`StateResolution::Barrier`]) if the answer is still pending.
    #[must_use]
    pub fn get(&self, owner: &str, request: StateRequest) -> Option<V> {
        let exists = self.owners.read().contains_key(owner);
        if !exists {
            return None;
        }
        let log = self.owner_log(owner);
        let log = log.read();
        match request.resolution {
            StateResolution::Barrier => match log.latest_at_or_before(request.seq) {
                Some((_, Snapshot::Set(v))) => Some(v.clone()),
                Some((_, Snapshot::Pending)) | None => None,
            },
            StateResolution::Any => log
                .entries
                .iter()
                .rev()
                .find(|(s, snap)| *s <= request.seq && matches!(snap, Snapshot::Set(_)))
                .and_then(|(_, snap)| match snap {
                    Snapshot::Set(v) => Some(v.clone()),
                    Snapshot::Pending => None,
                }),
        }
    }

    /// True if `owner` has published anything at all.
    #[must_use]
    pub fn has_owner(&self, owner: &str) -> bool {
        self.owners.read().contains_key(owner)
    }
}
