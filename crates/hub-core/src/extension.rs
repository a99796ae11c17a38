//! The extension trait itself, and the handler type extensions register
//! listeners with.
//!
//! Extensions never hold a reference back to the hub (see §9's note on
//! avoiding an owning reference cycle): `on_registered` is handed an
//! [`ExtensionApi`](crate::facade::ExtensionApi), a thin capability handle
//! built from channels and the shared-state registries, and that's the only
//! thing an extension keeps around.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::event::Event;
use crate::facade::ExtensionApi;

/// An async callback invoked once per matching event, serially with every
/// other handler call belonging to the same extension.
pub type Handler = Arc<dyn Fn(Arc<Event>) -> BoxFuture<'static, ()> + Send + Sync>;

/// A unit of telemetry/experience behavior plugged into the hub.
///
/// Construct the concrete type, wrap it in `Arc`, and hand it to
/// [`crate::hub::EventHub::register_extension`]. `on_registered` runs on the
/// extension's own serial queue, ahead of any event delivery, so listener
/// registration inside it is guaranteed to be in place before the extension
/// can be handed its first event.
pub trait Extension: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    fn metadata(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    /// Runs once, synchronously, before this extension is wired into the
    /// hub's dispatch tables and marked ready. Use `api` to register
    /// listeners and create shared state; no event can reach this extension
    /// until this call returns.
    fn on_registered(&self, api: &ExtensionApi);

    /// Runs once the extension has been removed from the registry; no more
    /// events will be delivered to it afterward.
    fn on_unregistered(&self) {}

    /// Gates delivery of `event`. While this returns `false` the event is
    /// held in this extension's backlog (in order) and retried whenever
    /// shared state changes anywhere, per §4.3.
    fn ready_for_event(&self, _event: &Event) -> bool {
        true
    }
}
