//! # hub-core
//!
//! The event hub: an in-process pub/sub bus that multiplexes typed events to
//! registered extensions in strict, hub-assigned sequence order.
//!
//! ## Core Concepts
//!
//! - [`Event`] -- a typed, data-bearing message with an identity ([`EventId`])
//!   assigned at construction and a sequence number ([`EventSeq`]) assigned
//!   once, by the hub, at dispatch time.
//! - [`Extension`] -- a unit of behavior that registers listeners and reacts
//!   to events on its own serial queue.
//! - [`EventHub`] -- the dispatcher: one ingress queue feeding per-extension
//!   serial delivery, with shared state and pre-processing as the two seams
//!   other crates in this workspace hook into.
//!
//! ## Key Invariants
//!
//! 1. Sequence numbers are hub-assigned and strictly ascending; assigning one
//!    twice is a dispatcher bug, not a recoverable error (see
//!    [`Event::assign_seq`]).
//! 2. Delivery to any one extension is serial and in `seq` order; delivery
//!    across extensions is independent and unordered relative to each other.
//! 3. A handler panic is caught and logged; it never stops the dispatcher or
//!    any other extension's queue.
//! 4. Extensions never hold a reference back to the hub -- only to an
//!    [`ExtensionApi`], built from channels and shared-state handles.
//!
//! ## What This Is Not
//!
//! `hub-core` is **not**:
//! - A rules engine (see `hub-rules`)
//! - A durable queue (see `hub-queue`, `hub-store`)
//! - A network client

mod config;
mod error;
mod event;
mod extension;
mod facade;
mod hub;
mod ids;
mod listener;
mod preprocessor;
mod privacy;
mod registration;
mod value;

pub use config::HubConfig;
pub use error::{classify_http_status, HitStatusClass, HubError, HubResult};
pub use event::{Discriminator, Event, WILDCARD};
pub use extension::{Extension, Handler};
pub use facade::{ExtensionApi, StateStore};
pub use hub::EventHub;
pub use ids::{EventId, EventSeq};
pub use listener::{ListenerId, ListenerSelector};
pub use preprocessor::{PreProcessor, SharedPreProcessor};
pub use privacy::PrivacyStatus;
pub use registration::ExtensionPhase;
pub use value::Value;

pub use hub_state::{StateRequest, StateResolution};

/// Installs a `tracing-subscriber` `fmt` layer filtered by
/// `config.log_filter`. Optional: most embedding applications install their
/// own subscriber and should not call this.
pub fn init_tracing(config: &HubConfig) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
