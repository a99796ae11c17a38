//! A canned extension that records every event it's handed, for assertions
//! in hub-core and integration tests without hand-writing a listener closure
//! each time.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use hub_core::{Event, Extension, ExtensionApi, WILDCARD};

/// Registers a wildcard listener and appends every event it sees to an
/// in-memory log. `ready_for_event` is toggled externally so tests can
/// exercise the backlog/retry path deliberately.
pub struct RecordingExtension {
    name: String,
    version: String,
    received: Arc<Mutex<Vec<Arc<Event>>>>,
    ready: AtomicBool,
}

impl RecordingExtension {
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            version: version.into(),
            received: Arc::new(Mutex::new(Vec::new())),
            ready: AtomicBool::new(true),
        })
    }

    #[must_use]
    pub fn received(&self) -> Vec<Arc<Event>> {
        self.received.lock().clone()
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Release);
    }
}

impl Extension for RecordingExtension {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn metadata(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    fn on_registered(&self, api: &ExtensionApi) {
        let received = self.received.clone();
        api.register_listener(
            WILDCARD,
            WILDCARD,
            Arc::new(move |event| {
                let received = received.clone();
                Box::pin(async move {
                    received.lock().push(event);
                })
            }),
        );
    }

    fn ready_for_event(&self, _event: &Event) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}
