//! The event hub: ingress sequencing, pre-processing, and per-extension
//! serial delivery.
//!
//! # Overview
//!
//! One ingress channel feeds a single dispatcher task, which is the only
//! place a `seq` is ever assigned -- this is what makes "strictly ascending,
//! hub-assigned sequence numbers" true by construction rather than by
//! convention (§4.1). From there, delivery fans out: each extension has its
//! own serial queue and backlog, so extensions never block each other, but
//! one extension's handlers always see events in `seq` order.
//!
//! Handler panics are caught at the call site and logged; they never take
//! down the dispatcher, mirroring how a single machine's `decide` panic
//! should never take down the rest of the fleet.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{mpsc, Notify, RwLock};
use tokio::task::JoinHandle;

use hub_state::SharedStateStore;

use crate::config::HubConfig;
use crate::error::{HubError, HubResult};
use crate::event::Event;
use crate::extension::{Extension, Handler};
use crate::facade::{ExtensionApi, ListenerTable, ResponseTable};
use crate::ids::EventSeq;
use crate::preprocessor::SharedPreProcessor;
use crate::registration::{ExtensionPhase, ExtensionRecord, PhaseCell};

/// A unit of work handed to one extension's serial worker task.
pub(crate) enum ExtJob {
    Deliver(Arc<Event>, Handler),
}

struct HubInner {
    ingress_tx: mpsc::UnboundedSender<Event>,
    next_seq: AtomicU64,
    extensions: RwLock<HashMap<String, Arc<ExtensionRecord>>>,
    listeners: Arc<ListenerTable>,
    response_waiters: Arc<ResponseTable>,
    next_listener_id: Arc<AtomicU64>,
    state_changed: Arc<Notify>,
    standard_state: Arc<SharedStateStore<crate::value::Value>>,
    xdm_state: Arc<SharedStateStore<crate::value::Value>>,
    preprocessors: parking_lot::RwLock<Vec<SharedPreProcessor>>,
    dispatcher: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    retry_pump: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    config: HubConfig,
}

/// The telemetry hub. Cheap to clone -- every clone shares the same
/// dispatcher and state.
#[derive(Clone)]
pub struct EventHub {
    inner: Arc<HubInner>,
}

impl EventHub {
    #[must_use]
    pub fn new(config: HubConfig) -> Self {
        let (ingress_tx, ingress_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(HubInner {
            ingress_tx,
            next_seq: AtomicU64::new(0),
            extensions: RwLock::new(HashMap::new()),
            listeners: Arc::new(parking_lot::RwLock::new(Vec::new())),
            response_waiters: Arc::new(parking_lot::Mutex::new(HashMap::new())),
            next_listener_id: Arc::new(AtomicU64::new(0)),
            state_changed: Arc::new(Notify::new()),
            standard_state: Arc::new(SharedStateStore::new()),
            xdm_state: Arc::new(SharedStateStore::new()),
            preprocessors: parking_lot::RwLock::new(Vec::new()),
            dispatcher: tokio::sync::Mutex::new(None),
            retry_pump: tokio::sync::Mutex::new(None),
            config,
        });
        let hub = Self { inner };
        hub.spawn_dispatcher(ingress_rx);
        hub.spawn_retry_pump();
        hub
    }

    fn spawn_dispatcher(&self, mut ingress_rx: mpsc::UnboundedReceiver<Event>) {
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            while let Some(mut event) = ingress_rx.recv().await {
                let seq = inner.next_seq.fetch_add(1, Ordering::AcqRel);
                event.assign_seq(EventSeq::new(seq));

                let procs: Vec<SharedPreProcessor> = inner.preprocessors.read().clone();
                let mut spawned = Vec::new();
                for p in &procs {
                    spawned.extend(p.process(&mut event).await);
                }

                let event = Arc::new(event);

                if let Some(trigger_id) = event.response_id() {
                    if let Some(waiter) = inner.response_waiters.lock().remove(&trigger_id) {
                        let _ = waiter.sender.send(Some(event.clone()));
                    }
                }

                let matches: Vec<(String, Handler)> = {
                    let listeners = inner.listeners.read();
                    listeners
                        .iter()
                        .filter(|l| l.selector.matches(&event))
                        .map(|l| (l.owner.clone(), l.handler.clone()))
                        .collect()
                };

                if !matches.is_empty() {
                    let mut by_owner: HashMap<String, Vec<Handler>> = HashMap::new();
                    for (owner, handler) in matches {
                        by_owner.entry(owner).or_default().push(handler);
                    }
                    let extensions = inner.extensions.read().await;
                    for (owner, handlers) in by_owner {
                        if let Some(record) = extensions.get(&owner) {
                            if record.is_ready() {
                                record.push_and_flush(event.clone(), handlers).await;
                            }
                        }
                    }
                }

                for extra in spawned {
                    // Re-enters the ingress queue so it gets its own seq,
                    // strictly after the event that produced it.
                    let _ = inner.ingress_tx.send(extra);
                }
            }
        });
        // Only `new` calls this, so the lock is uncontended; `try_lock`
        // keeps `spawn_dispatcher` synchronous.
        if let Ok(mut guard) = self.inner.dispatcher.try_lock() {
            *guard = Some(handle);
        }
    }

    fn spawn_retry_pump(&self) {
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            loop {
                inner.state_changed.notified().await;
                let records: Vec<Arc<ExtensionRecord>> =
                    inner.extensions.read().await.values().cloned().collect();
                for record in records {
                    if record.is_ready() {
                        record.flush().await;
                    }
                }
            }
        });
        if let Ok(mut guard) = self.inner.retry_pump.try_lock() {
            *guard = Some(handle);
        }
    }

    /// Registers `extension`. Runs its `on_registered` synchronously, then
    /// wires it into the dispatch tables and marks it ready -- no event can
    /// reach it before this returns.
    pub async fn register_extension<E: Extension>(&self, extension: Arc<E>) -> HubResult<()> {
        let name = extension.name().to_string();
        {
            let extensions = self.inner.extensions.read().await;
            if extensions.contains_key(&name) {
                return Err(HubError::AlreadyRegistered { name });
            }
        }

        let (queue_tx, mut queue_rx) = mpsc::unbounded_channel::<ExtJob>();
        let api = ExtensionApi {
            name: name.clone(),
            ingress_tx: self.inner.ingress_tx.clone(),
            listeners: self.inner.listeners.clone(),
            response_waiters: self.inner.response_waiters.clone(),
            next_listener_id: self.inner.next_listener_id.clone(),
            state_changed: self.inner.state_changed.clone(),
            standard_state: self.inner.standard_state.clone(),
            xdm_state: self.inner.xdm_state.clone(),
        };

        extension.on_registered(&api);

        tokio::spawn(async move {
            while let Some(ExtJob::Deliver(event, handler)) = queue_rx.recv().await {
                let outcome = AssertUnwindSafe(handler(event)).catch_unwind().await;
                if let Err(panic) = outcome {
                    let message = panic_message(&panic);
                    tracing::error!(extension = %name, %message, "extension handler panicked; isolating and continuing");
                }
            }
        });

        let record = Arc::new(ExtensionRecord {
            name: extension.name().to_string(),
            version: extension.version().to_string(),
            metadata: extension.metadata(),
            phase: Arc::new(PhaseCell::new(ExtensionPhase::Ready)),
            extension: extension as Arc<dyn Extension>,
            queue_tx,
            backlog: tokio::sync::Mutex::new(std::collections::VecDeque::new()),
        });

        let mut extensions = self.inner.extensions.write().await;
        if extensions.contains_key(&record.name) {
            return Err(HubError::AlreadyRegistered { name: record.name.clone() });
        }
        extensions.insert(record.name.clone(), record);
        Ok(())
    }

    /// Removes `name` from the dispatch tables: its listeners stop matching,
    /// its pending response listeners resolve to `None`, and it may be
    /// re-registered afterward (its name is freed, unlike `stop`).
    pub async fn unregister_extension(&self, name: &str) -> HubResult<()> {
        let record = {
            let mut extensions = self.inner.extensions.write().await;
            extensions.remove(name).ok_or_else(|| HubError::NotRegistered { name: name.to_string() })?
        };
        record.phase.set(ExtensionPhase::Unregistered);
        self.inner.listeners.write().retain(|l| l.owner != name);
        self.inner.response_waiters.lock().retain(|_, waiter| waiter.owner != name);
        record.extension.on_unregistered();
        Ok(())
    }

    /// Registers a pre-processor that runs over every event before listener
    /// matching. Order matters only relative to other pre-processors; the
    /// hub does not reorder them.
    pub fn register_preprocessor(&self, preprocessor: SharedPreProcessor) {
        self.inner.preprocessors.write().push(preprocessor);
    }

    /// Dispatches `event` onto the ingress queue. Returns before the event
    /// has actually been sequenced or delivered -- use
    /// `ExtensionApi::register_response_listener` to observe a reply.
    pub fn dispatch(&self, event: Event) {
        let _ = self.inner.ingress_tx.send(event);
    }

    #[must_use]
    pub fn standard_state(&self) -> &Arc<SharedStateStore<crate::value::Value>> {
        &self.inner.standard_state
    }

    #[must_use]
    pub fn xdm_state(&self) -> &Arc<SharedStateStore<crate::value::Value>> {
        &self.inner.xdm_state
    }

    #[must_use]
    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    /// Stops accepting new extensions and event dispatch is left running;
    /// in-flight per-extension delivery drains naturally once the ingress
    /// channel and every extension queue are dropped along with the hub.
    pub async fn stop(&self) {
        let extensions = self.inner.extensions.read().await;
        for record in extensions.values() {
            record.phase.set(ExtensionPhase::Stopped);
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
