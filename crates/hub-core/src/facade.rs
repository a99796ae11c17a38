//! `ExtensionApi`: the capability handle an extension is given at
//! registration time. It is the *only* thing an extension holds that lets it
//! talk back to the hub -- never the hub itself, never an `Arc`/`Weak` to the
//! dispatcher's internals. See the module doc on [`crate::extension`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot, Notify};

use hub_state::{SharedStateStore, StateRequest, StateResolution};

use crate::event::Event;
use crate::extension::Handler;
use crate::ids::EventId;
use crate::listener::{ListenerId, ListenerSelector};
use crate::value::Value;

/// The concrete shared-state registry type used everywhere in this crate:
/// `hub-state` is value-type-agnostic (generic over `V`), so this is the one
/// place that binds it to this workspace's `Value`.
pub type StateStore = SharedStateStore<Value>;

/// One registered `(selector, handler)` pair, keyed for removal.
pub(crate) struct ListenerEntry {
    pub id: ListenerId,
    pub owner: String,
    pub selector: ListenerSelector,
    pub handler: Handler,
}

/// Shared table of every listener registered across every extension. Reads
/// happen once per dispatched event; writes happen only at registration or
/// unregistration, so a plain `RwLock` (not a channel) is the right tool.
pub(crate) type ListenerTable = RwLock<Vec<ListenerEntry>>;

/// One waiting `register_response_listener` call: fulfilled either by a
/// matching response event or by its own timeout racing it.
pub(crate) struct ResponseWaiter {
    pub owner: String,
    pub sender: oneshot::Sender<Option<Arc<Event>>>,
}

pub(crate) type ResponseTable = parking_lot::Mutex<std::collections::HashMap<EventId, ResponseWaiter>>;

/// The capability surface handed to an extension's `on_registered`.
///
/// Cloning is cheap: every field is a clone of a shared handle, never of the
/// hub's actual state.
#[derive(Clone)]
pub struct ExtensionApi {
    pub(crate) name: String,
    pub(crate) ingress_tx: mpsc::UnboundedSender<Event>,
    pub(crate) listeners: Arc<ListenerTable>,
    pub(crate) response_waiters: Arc<ResponseTable>,
    pub(crate) next_listener_id: Arc<AtomicU64>,
    pub(crate) state_changed: Arc<Notify>,
    pub(crate) standard_state: Arc<StateStore>,
    pub(crate) xdm_state: Arc<StateStore>,
}

impl ExtensionApi {
    #[must_use]
    pub fn extension_name(&self) -> &str {
        &self.name
    }

    /// Registers a handler for every event matching `(event_type, source)`.
    /// Either axis may be [`crate::event::WILDCARD`].
    pub fn register_listener(
        &self,
        event_type: impl Into<String>,
        source: impl Into<String>,
        handler: Handler,
    ) -> ListenerId {
        let id = ListenerId::new(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push(ListenerEntry {
            id,
            owner: self.name.clone(),
            selector: ListenerSelector::TypeSource {
                event_type: event_type.into().into(),
                source: source.into().into(),
            },
            handler,
        });
        id
    }

    /// Registers a one-shot listener for the response to `trigger_id`.
    /// `handler` runs exactly once, with `Some(event)` if a matching response
    /// arrives within `timeout`, or `None` if it doesn't (or this extension
    /// is unregistered first).
    pub fn register_response_listener<H>(&self, trigger_id: EventId, timeout: Duration, handler: H)
    where
        H: FnOnce(Option<Arc<Event>>) + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.response_waiters.lock().insert(
            trigger_id,
            ResponseWaiter {
                owner: self.name.clone(),
                sender: tx,
            },
        );
        let waiters = self.response_waiters.clone();
        tokio::spawn(async move {
            let outcome = tokio::time::timeout(timeout, rx).await;
            waiters.lock().remove(&trigger_id);
            let event = match outcome {
                Ok(Ok(event)) => Some(event),
                Ok(Err(_)) | Err(_) => None,
            };
            handler(event);
        });
    }

    /// Hands `event` to the hub's ingress queue for sequencing and delivery.
    pub fn dispatch(&self, event: Event) {
        // A send error only happens once the dispatcher task has shut down,
        // which only happens after `EventHub::stop`; there is nothing a
        // caller could usefully do with that error, so it is dropped same as
        // the teacher's own fire-and-forget bus send.
        let _ = self.ingress_tx.send(event);
    }

    #[must_use]
    pub fn standard_state(&self) -> &Arc<StateStore> {
        &self.standard_state
    }

    #[must_use]
    pub fn xdm_state(&self) -> &Arc<StateStore> {
        &self.xdm_state
    }

    /// Publishes `value` as this extension's shared state as of `seq`,
    /// resolving any pending snapshot created for that sequence number and
    /// waking every extension whose backlog is waiting on a state change.
    pub fn set_standard_state(&self, seq: u64, value: Value) -> crate::error::HubResult<()> {
        let result = self.standard_state.set(&self.name, seq, value).map_err(state_error_to_hub_error);
        self.state_changed.notify_waiters();
        result
    }

    /// Reserves a pending snapshot at `seq`; readers asking for this `seq`
    /// under barrier semantics will block (via backlog retry) until it is
    /// set or the owner unregisters.
    pub fn create_pending_standard_state(&self, seq: u64) -> crate::error::HubResult<()> {
        self.standard_state
            .create_pending(&self.name, seq)
            .map_err(state_error_to_hub_error)
    }

    #[must_use]
    pub fn get_standard_state(&self, owner: &str, request: StateRequest) -> Option<Value> {
        self.standard_state.get(owner, request)
    }

    /// Same as the `standard_*` family, scoped to the `xdm` namespace (§4.4).
    pub fn set_xdm_state(&self, seq: u64, value: Value) -> crate::error::HubResult<()> {
        let result = self.xdm_state.set(&self.name, seq, value).map_err(state_error_to_hub_error);
        self.state_changed.notify_waiters();
        result
    }

    pub fn create_pending_xdm_state(&self, seq: u64) -> crate::error::HubResult<()> {
        self.xdm_state
            .create_pending(&self.name, seq)
            .map_err(state_error_to_hub_error)
    }

    #[must_use]
    pub fn get_xdm_state(&self, owner: &str, request: StateRequest) -> Option<Value> {
        self.xdm_state.get(owner, request)
    }

    #[must_use]
    pub fn resolution_barrier() -> StateResolution {
        StateResolution::Barrier
    }

    #[must_use]
    pub fn resolution_any() -> StateResolution {
        StateResolution::Any
    }
}

fn state_error_to_hub_error(err: hub_state::StateError) -> crate::error::HubError {
    match err {
        hub_state::StateError::AlreadyExists { owner, seq } => crate::error::HubError::DuplicateSeq {
            owner,
            seq: crate::ids::EventSeq::new(seq),
        },
        hub_state::StateError::NoSuchOwner { owner } => crate::error::HubError::NoSuchOwner { owner },
    }
}
