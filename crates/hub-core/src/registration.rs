//! Extension lifecycle bookkeeping: phases and the hub-side record of a
//! registered extension, per §3 and §5.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::event::Event;
use crate::extension::{Extension, Handler};
use crate::hub::ExtJob;

/// Where an extension sits in its own lifecycle. The hub only ever delivers
/// events once an extension reaches `Ready`; `Stopped` and `Unregistered`
/// both stop delivery, the difference being whether re-registration under
/// the same name is allowed (`Unregistered` frees the name, `Stopped` does
/// not -- see §5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExtensionPhase {
    Registered = 0,
    Ready = 1,
    Stopped = 2,
    Unregistered = 3,
}

impl ExtensionPhase {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Registered,
            1 => Self::Ready,
            2 => Self::Stopped,
            _ => Self::Unregistered,
        }
    }
}

/// Atomically-readable phase cell shared between the dispatcher and anything
/// that needs to ask "is this extension still live" without taking a lock.
#[derive(Debug)]
pub struct PhaseCell(AtomicU8);

impl PhaseCell {
    #[must_use]
    pub fn new(initial: ExtensionPhase) -> Self {
        Self(AtomicU8::new(initial as u8))
    }

    #[must_use]
    pub fn get(&self) -> ExtensionPhase {
        ExtensionPhase::from_raw(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, phase: ExtensionPhase) {
        self.0.store(phase as u8, Ordering::Release);
    }
}

/// One event this extension's matching listeners haven't yet been handed,
/// because `ready_for_event` was still false the last time it was checked.
pub(crate) type BacklogItem = (Arc<Event>, Vec<Handler>);

/// The hub's bookkeeping record for one registered extension: its identity,
/// its lifecycle phase, the serial queue that guarantees in-order delivery,
/// and the backlog of events held back by `ready_for_event`.
pub struct ExtensionRecord {
    pub name: String,
    pub version: String,
    pub metadata: BTreeMap<String, String>,
    pub phase: Arc<PhaseCell>,
    pub extension: Arc<dyn Extension>,
    pub queue_tx: tokio::sync::mpsc::UnboundedSender<ExtJob>,
    pub(crate) backlog: tokio::sync::Mutex<VecDeque<BacklogItem>>,
}

impl ExtensionRecord {
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.phase.get() == ExtensionPhase::Ready
    }

    /// Appends `event` (with the handlers that matched it) to this
    /// extension's backlog, then drains everything at the front that
    /// `ready_for_event` now accepts, handing each to the serial queue.
    pub(crate) async fn push_and_flush(&self, event: Arc<Event>, handlers: Vec<Handler>) {
        let mut backlog = self.backlog.lock().await;
        backlog.push_back((event, handlers));
        self.flush_locked(&mut backlog);
    }

    /// Re-checks the front of the backlog without adding anything; used when
    /// shared state changes somewhere and a previously-held-back event might
    /// now be ready.
    pub(crate) async fn flush(&self) {
        let mut backlog = self.backlog.lock().await;
        self.flush_locked(&mut backlog);
    }

    fn flush_locked(&self, backlog: &mut VecDeque<BacklogItem>) {
        while let Some((event, _)) = backlog.front() {
            if !self.extension.ready_for_event(event) {
                break;
            }
            let (event, handlers) = backlog.pop_front().expect("front just matched Some");
            for handler in handlers {
                let _ = self.queue_tx.send(ExtJob::Deliver(event.clone(), handler));
            }
        }
    }
}
