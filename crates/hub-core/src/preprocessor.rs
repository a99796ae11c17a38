//! The pre-dispatch interception seam the rules engine registers into.
//!
//! The hub knows nothing about rules; it only knows it must run every
//! registered [`PreProcessor`] over an event before computing the matching
//! listener set, and that a pre-processor may hand back extra events to
//! dispatch (which receive later `seq` values than the event that produced
//! them).

use std::sync::Arc;

use async_trait::async_trait;

use crate::event::Event;

#[async_trait]
pub trait PreProcessor: Send + Sync + 'static {
    /// Inspects (and may mutate) `event.data` in place, returning any
    /// additional events that should be dispatched as a consequence.
    async fn process(&self, event: &mut Event) -> Vec<Event>;
}

/// Type-erased handle used internally by the hub to hold a heterogeneous set
/// of pre-processors.
pub type SharedPreProcessor = Arc<dyn PreProcessor>;
