//! Wires the event hub, shared state, the rules engine, and the persistent
//! hit queue together end to end, mirroring §8's S1 attach-data scenario:
//! a "lifecycle" extension publishes shared state, a loaded rule attaches
//! data to a matching event, and an "analytics" extension turns every event
//! it sees into a durably-queued hit.

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use hub_core::{init_tracing, Event, Extension, ExtensionApi, EventHub, HubConfig, PrivacyStatus, Value, WILDCARD};
use hub_queue::{Hit, HitOutcome, HitProcessor, PersistentHitQueue};
use hub_rules::{Condition, Consequence, MatchOp, Matcher, Rule, RulesEngine};
use hub_store::SqliteDataQueue;

struct LifecycleExtension;

impl Extension for LifecycleExtension {
    fn name(&self) -> &str {
        "com.adobe.module.lifecycle"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn on_registered(&self, api: &ExtensionApi) {
        let mut data = Value::map();
        data.set_path("lifecyclecontextdata.carriername", Value::from("AT&T"));
        if let Err(err) = api.set_standard_state(0, data) {
            tracing::error!(%err, "lifecycle extension failed to publish initial shared state");
        }
    }
}

struct AnalyticsExtension {
    hits: Arc<PersistentHitQueue>,
}

impl Extension for AnalyticsExtension {
    fn name(&self) -> &str {
        "com.adobe.module.analytics"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn on_registered(&self, api: &ExtensionApi) {
        let hits = self.hits.clone();
        api.register_listener(
            WILDCARD,
            WILDCARD,
            Arc::new(move |event| {
                let hits = hits.clone();
                Box::pin(async move {
                    let payload = event.data().to_string();
                    if let Err(err) = hits.enqueue(&event.id().to_string(), event.timestamp(), payload.as_bytes()) {
                        tracing::error!(%err, "failed to enqueue hit");
                    }
                })
            }),
        );
    }
}

/// Stands in for a real network transport; logs what it would have sent.
struct LoggingHitProcessor;

#[async_trait]
impl HitProcessor for LoggingHitProcessor {
    async fn process_batch(&self, hits: &[Hit]) -> HitOutcome {
        for hit in hits {
            tracing::info!(id = %hit.id, bytes = hit.data.len(), "would send hit");
        }
        HitOutcome::Success
    }
}

fn attach_carrier_rule() -> Rule {
    let mut event_data = Value::map();
    event_data.set_path("attached", Value::from("yes"));
    let mut detail = Value::map();
    detail.set_path("eventdata", event_data);

    Rule {
        condition: Condition::matcher(Matcher::new(
            "~state.com.adobe.module.lifecycle/lifecyclecontextdata.carriername",
            MatchOp::Eq,
            vec![Value::from("AT&T")],
        )),
        consequences: vec![Consequence { id: "attach-carrier".to_string(), kind: "add".to_string(), detail }],
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = HubConfig::default();
    init_tracing(&config);

    let hub = EventHub::new(config);

    let rules_engine = Arc::new(RulesEngine::new(hub.clone(), "rulesEngine", "1.0.0"));
    hub.register_preprocessor(rules_engine.clone());

    hub.register_extension(Arc::new(LifecycleExtension)).await?;

    let queue = Arc::new(SqliteDataQueue::open_in_memory()?);
    let hits = Arc::new(PersistentHitQueue::new(queue, Arc::new(LoggingHitProcessor)));
    hits.handle_privacy_change(PrivacyStatus::OptedIn);
    hub.register_extension(Arc::new(AnalyticsExtension { hits: hits.clone() })).await?;

    rules_engine.replace_rules(vec![attach_carrier_rule()]);
    tokio::time::sleep(Duration::from_millis(20)).await;

    let mut data = Value::map();
    data.set_path("lifecyclecontextdata.launchevent", Value::from("LaunchEvent"));
    hub.dispatch(Event::new("launch", "lifecycle", "responseContent", data));

    tokio::time::sleep(Duration::from_millis(50)).await;
    tracing::info!(pending_hits = hits.count()?, "demo run complete");

    hub.stop().await;
    Ok(())
}
