//! Structured, pattern-matchable error vocabulary shared by every subsystem.
//!
//! Mirrors the error boundary rule the rest of this workspace follows: each
//! crate's internal plumbing (SQL, HTTP, zip) is free to use `anyhow` as an
//! ergonomic transport, but a `HubError` variant is what actually crosses a
//! public API back to an extension or the façade. Nothing downstream ever has
//! to match on a string.

use thiserror::Error;

use crate::ids::EventSeq;

/// The full error vocabulary from the hub's error handling design.
///
/// Variants are grouped by the subsystem that raises them; grouping is
/// informational only; callers match on the variant, not the comment.
#[derive(Debug, Error)]
pub enum HubError {
    // -- Extension lifecycle --
    #[error("extension '{name}' is already registered")]
    AlreadyRegistered { name: String },

    #[error("extension '{name}' is not registered")]
    NotRegistered { name: String },

    // -- Shared state --
    #[error("shared state already exists for '{owner}' at seq {seq}")]
    DuplicateSeq { owner: String, seq: EventSeq },

    #[error("no shared-state registry for owner '{owner}'")]
    NoSuchOwner { owner: String },

    // -- Hit queue --
    #[error("hit queue is full")]
    QueueFull,

    #[error("hit queue is closed")]
    QueueClosed,

    #[error("durable storage unavailable: {reason}")]
    StorageUnavailable { reason: String },

    // -- Rules pipeline --
    #[error("failed to parse rules document: {reason}")]
    ParseError { reason: String },

    #[error("failed to unpack rules archive: {reason}")]
    UnzipError { reason: String },

    #[error("network error fetching rules: {reason}")]
    NetworkError { reason: String },

    // -- Hit processing outcomes --
    #[error("hit processing failed but may be retried: {reason}")]
    RecoverableHitError { reason: String },

    #[error("hit processing failed permanently and was dropped: {reason}")]
    FatalHitError { reason: String },
}

/// Convenience alias used throughout the workspace's public APIs.
pub type HubResult<T> = Result<T, HubError>;

/// Classification of an HTTP-style status code into the trichotomy §7
/// defines for hit processing outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitStatusClass {
    Success,
    Recoverable,
    Fatal,
}

/// Classify an HTTP status code per §7: 2xx succeeds, {408, 429, 5xx} are
/// recoverable, everything else is fatal-and-drop.
#[must_use]
pub fn classify_http_status(status: u16) -> HitStatusClass {
    match status {
        200..=299 => HitStatusClass::Success,
        408 | 429 => HitStatusClass::Recoverable,
        500..=599 => HitStatusClass::Recoverable,
        _ => HitStatusClass::Fatal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_success() {
        assert_eq!(classify_http_status(200), HitStatusClass::Success);
        assert_eq!(classify_http_status(204), HitStatusClass::Success);
    }

    #[test]
    fn classifies_recoverable() {
        assert_eq!(classify_http_status(408), HitStatusClass::Recoverable);
        assert_eq!(classify_http_status(429), HitStatusClass::Recoverable);
        assert_eq!(classify_http_status(503), HitStatusClass::Recoverable);
    }

    #[test]
    fn classifies_fatal() {
        assert_eq!(classify_http_status(400), HitStatusClass::Fatal);
        assert_eq!(classify_http_status(404), HitStatusClass::Fatal);
    }
}
