//! `Event`: immutable identity, mutable data bag, per §3.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};

use crate::ids::{EventId, EventSeq};
use crate::value::Value;

/// Sentinel that matches any `EventType`/`EventSource` on either axis of a
/// listener selector.
pub const WILDCARD: &str = "*";

/// A closed-but-extensible discriminator string (`type` or `source`).
///
/// Newtype rather than a bare `String` so listener matching reads as a type,
/// not a string comparison sprinkled through the hub.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Discriminator(String);

impl Discriminator {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn wildcard() -> Self {
        Self(WILDCARD.to_string())
    }

    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.0 == WILDCARD
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if `self` (a listener selector) matches `other` (an event's
    /// discriminator). Wildcards on the selector side match anything.
    #[must_use]
    pub fn matches(&self, other: &Discriminator) -> bool {
        self.is_wildcard() || self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl From<&str> for Discriminator {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Discriminator {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl std::fmt::Display for Discriminator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A typed, data-bearing message dispatched through the hub.
///
/// `id` is assigned once at construction. `seq` starts unassigned and is set
/// exactly once by the hub at `dispatch` time (see [`Event::assign_seq`]);
/// attempting to assign it twice is an invariant breakage, not a recoverable
/// error, because it can only happen if the hub's dispatcher has a bug.
#[derive(Debug)]
pub struct Event {
    id: EventId,
    name: String,
    event_type: Discriminator,
    source: Discriminator,
    timestamp: DateTime<Utc>,
    data: Value,
    response_id: Option<EventId>,
    parent_id: Option<EventId>,
    seq: AtomicU64,
}

impl Event {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        event_type: impl Into<Discriminator>,
        source: impl Into<Discriminator>,
        data: Value,
    ) -> Self {
        Self {
            id: EventId::new(),
            name: name.into(),
            event_type: event_type.into(),
            source: source.into(),
            timestamp: Utc::now(),
            data,
            response_id: None,
            parent_id: None,
            seq: AtomicU64::new(EventSeq::UNASSIGNED.value()),
        }
    }

    #[must_use]
    pub fn with_response_id(mut self, response_id: EventId) -> Self {
        self.response_id = Some(response_id);
        self
    }

    #[must_use]
    pub fn with_parent_id(mut self, parent_id: EventId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    #[must_use]
    pub fn id(&self) -> EventId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn event_type(&self) -> &Discriminator {
        &self.event_type
    }

    #[must_use]
    pub fn source(&self) -> &Discriminator {
        &self.source
    }

    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    #[must_use]
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Replaces the data tree. Only the rules engine's pre-processor stage
    /// should call this, and only before listener delivery begins; the hub
    /// never calls this after computing the matching listener set.
    pub fn set_data(&mut self, data: Value) {
        self.data = data;
    }

    #[must_use]
    pub fn response_id(&self) -> Option<EventId> {
        self.response_id
    }

    #[must_use]
    pub fn parent_id(&self) -> Option<EventId> {
        self.parent_id
    }

    #[must_use]
    pub fn seq(&self) -> EventSeq {
        EventSeq::new(self.seq.load(Ordering::Acquire))
    }

    /// Assigns the hub sequence number exactly once.
    ///
    /// # Panics
    /// Panics if the sequence number has already been assigned, since two
    /// assignment attempts for one event indicates a dispatcher bug (duplicate
    /// `seq` is a hub-fatal invariant breakage per §4.1).
    pub fn assign_seq(&self, seq: EventSeq) {
        let prev = self.seq.swap(seq.value(), Ordering::AcqRel);
        assert_eq!(
            prev,
            EventSeq::UNASSIGNED.value(),
            "event {} already had seq {prev} assigned; duplicate assignment is a hub invariant breakage",
            self.id
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_selector_matches_anything() {
        let wildcard = Discriminator::wildcard();
        let concrete = Discriminator::new("configuration");
        assert!(wildcard.matches(&concrete));
    }

    #[test]
    fn concrete_selector_is_case_insensitive() {
        let selector = Discriminator::new("Configuration");
        let concrete = Discriminator::new("configuration");
        assert!(selector.matches(&concrete));
    }

    #[test]
    fn seq_starts_unassigned() {
        let e = Event::new("test", "type", "source", Value::map());
        assert!(!e.seq().is_assigned());
    }

    #[test]
    #[should_panic(expected = "invariant breakage")]
    fn double_seq_assignment_panics() {
        let e = Event::new("test", "type", "source", Value::map());
        e.assign_seq(EventSeq::new(1));
        e.assign_seq(EventSeq::new(2));
    }

    #[test]
    fn each_event_gets_a_unique_id() {
        let a = Event::new("a", "t", "s", Value::map());
        let b = Event::new("b", "t", "s", Value::map());
        assert_ne!(a.id(), b.id());
    }
}
