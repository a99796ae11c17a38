//! Hub-wide configuration.

/// Tuning knobs for one [`crate::hub::EventHub`] instance.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// `tracing-subscriber` `EnvFilter` directive used by
    /// [`crate::init_tracing`]. Only meaningful if the embedding application
    /// delegates log setup to this crate; most production hosts install
    /// their own subscriber and never call `init_tracing`.
    pub log_filter: String,
    /// Default timeout for `register_response_listener` calls that don't
    /// specify their own.
    pub default_response_timeout: std::time::Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            default_response_timeout: std::time::Duration::from_secs(5),
        }
    }
}
