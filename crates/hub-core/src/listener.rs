//! Listener selectors: `(type, source)` with optional wildcards. One-shot
//! response listeners are matched separately, by `facade`'s
//! `response_waiters` map keyed on `EventId` -- they never go through a
//! selector.

use crate::event::{Discriminator, Event};

/// A unique handle for a registered listener, used to remove it when its
/// owning extension unregisters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    #[must_use]
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// What a registered listener subscribes to.
#[derive(Debug, Clone)]
pub enum ListenerSelector {
    /// Matches on `(type, source)`, each possibly wildcarded.
    TypeSource {
        event_type: Discriminator,
        source: Discriminator,
    },
}

impl ListenerSelector {
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        match self {
            ListenerSelector::TypeSource { event_type, source } => {
                event_type.matches(event.event_type()) && source.matches(event.source())
            }
        }
    }
}
