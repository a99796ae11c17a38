//! # hub-store
//!
//! `SQLite`-backed durable storage used by the rest of the workspace: a named
//! collection store for small per-extension records, and an ordered data
//! queue that `hub-queue` wraps with retry and batching semantics.
//!
//! Nothing in this crate knows about events, extensions, or hits -- it is
//! pure storage plumbing, reused the same way across both call sites.

mod collections;
mod connection;
mod error;
mod queue;

pub use collections::NamedCollectionStore;
pub use connection::SqliteConfig;
pub use error::{StoreError, StoreResult};
pub use queue::{QueuedItem, SqliteDataQueue};
