//! Privacy status vocabulary, shared by the hub (which routes
//! `configuration/requestContent` events into a status change) and the hit
//! queue (which gates network-bound work on it).

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// One of `{opt_in, opt_out, opt_unknown}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PrivacyStatus {
    #[serde(rename = "optedIn")]
    OptedIn,
    #[serde(rename = "optedOut")]
    OptedOut,
    #[serde(rename = "optUnknown")]
    Unknown,
}

impl PrivacyStatus {
    /// Parses the `global.privacy` field out of a `configuration` event's
    /// data tree, per §6's privacy vocabulary.
    #[must_use]
    pub fn from_event_data(data: &Value) -> Option<Self> {
        let raw = data.get_path("global.privacy")?.as_str()?;
        match raw {
            "optedIn" => Some(Self::OptedIn),
            "optedOut" => Some(Self::OptedOut),
            "optUnknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}
