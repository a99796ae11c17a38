//! The rules engine itself (§4.4): a [`hub_core::PreProcessor`] that
//! evaluates every event against the active rule set and applies matching
//! consequences before any listener sees the event.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use hub_core::{Event, EventHub, EventSeq, PreProcessor, StateRequest, StateStore, Value};

use crate::rule::Rule;
use crate::token::{StateLookup, TokenContext};

const REQUEST_RESET_TYPE: &str = "rulesEngine";
const REQUEST_RESET_SOURCE: &str = "requestReset";

/// A snapshot of the fields a rule evaluation needs, kept around while the
/// waiting buffer holds an event for later replay. `Event` itself isn't
/// cloned -- only what evaluation actually reads.
#[derive(Clone)]
struct BufferedEvent {
    event_type: String,
    source: String,
    seq: u64,
    data: Value,
}

impl BufferedEvent {
    fn snapshot(event: &Event) -> Self {
        Self {
            event_type: event.event_type().as_str().to_string(),
            source: event.source().as_str().to_string(),
            seq: event.seq().value(),
            data: event.data().clone(),
        }
    }

    fn to_probe_event(&self) -> Event {
        let event = Event::new("", self.event_type.as_str(), self.source.as_str(), self.data.clone());
        event.assign_seq(EventSeq::new(self.seq));
        event
    }
}

struct HubStateLookup {
    standard: Arc<StateStore>,
    seq: u64,
}

impl StateLookup for HubStateLookup {
    fn lookup(&self, owner: &str, path: &str) -> Option<Value> {
        self.standard.get(owner, StateRequest::any(self.seq))?.get_path(path).cloned()
    }
}

struct EngineState {
    rules: Vec<Rule>,
    /// `Some` while no rule set has loaded yet; every event seen in this
    /// window is appended here so `replace_rules` can replay it once rules
    /// actually arrive (§4.4's waiting-events buffer).
    waiting: Option<VecDeque<BufferedEvent>>,
}

/// Evaluates rule documents against every event that passes through the hub.
pub struct RulesEngine {
    name: String,
    sdk_version: String,
    hub: EventHub,
    standard_state: Arc<StateStore>,
    state: RwLock<EngineState>,
    /// Rule sets queued by `replace_rules` but not yet installed. The swap
    /// itself happens inside `process()` when the matching `requestReset`
    /// event reaches the front of the hub's single ingress queue, not when
    /// `replace_rules` is called -- otherwise an event already in flight
    /// could be evaluated against the new rules before its own `seq` passes
    /// the reset, and then get replayed a second time out of the waiting
    /// buffer.
    pending_rules: Mutex<VecDeque<Vec<Rule>>>,
}

impl RulesEngine {
    /// `name` identifies this engine instance in its self-addressed
    /// `requestReset` event; `sdk_version` feeds the `~sdkver` token.
    #[must_use]
    pub fn new(hub: EventHub, name: impl Into<String>, sdk_version: impl Into<String>) -> Self {
        let standard_state = hub.standard_state().clone();
        Self {
            name: name.into(),
            sdk_version: sdk_version.into(),
            hub,
            standard_state,
            state: RwLock::new(EngineState { rules: Vec::new(), waiting: Some(VecDeque::new()) }),
            pending_rules: Mutex::new(VecDeque::new()),
        }
    }

    fn is_request_reset(event: &Event, engine_name: &str) -> bool {
        event.event_type().as_str() == REQUEST_RESET_TYPE
            && event.source().as_str() == REQUEST_RESET_SOURCE
            && event.name() == engine_name
    }

    /// Queues `rules` and dispatches a self-addressed `rulesEngine /
    /// requestReset` event. The rule set is not installed yet -- it is
    /// installed by `process()` when that reset event is actually reached in
    /// ingress order, so every event already ahead of it in the queue still
    /// evaluates against the old rules, and the waiting buffer (if any) is
    /// replayed through the new rules exactly once.
    pub fn replace_rules(&self, rules: Vec<Rule>) {
        self.pending_rules.lock().push_back(rules);
        let reset = Event::new(self.name.clone(), REQUEST_RESET_TYPE, REQUEST_RESET_SOURCE, Value::map());
        self.hub.dispatch(reset);
    }

    fn evaluate(&self, event: &mut Event) -> Vec<Event> {
        let seq = event.seq().value();
        let rules = self.state.read().rules.clone();
        let mut dispatched = Vec::new();

        for rule in &rules {
            let ctx = self.context_for(event, seq);
            if !rule.condition.eval(&ctx) {
                continue;
            }
            for consequence in &rule.consequences {
                let ctx = self.context_for(event, seq);
                if let Some(new_event) = consequence.apply(event, &ctx) {
                    dispatched.push(new_event);
                }
            }
        }
        dispatched
    }

    fn context_for(&self, event: &Event, seq: u64) -> TokenContext {
        let lookup: Box<dyn StateLookup> =
            Box::new(HubStateLookup { standard: self.standard_state.clone(), seq });
        TokenContext::from_event(event, &self.sdk_version, Some(lookup))
    }

    /// Installs the next pending rule set (if any), then drains the waiting
    /// buffer (if still open) through it, closes the buffer, and returns
    /// every dispatch-type consequence event produced along the way (§4.4's
    /// reprocess flow). Runs only from `process()`, i.e. only when the
    /// corresponding `requestReset` event reaches the front of the ingress
    /// queue -- this is what keeps the swap and the drain atomic relative to
    /// every other event passing through the hub.
    fn apply_pending_rules_and_drain(&self) -> Vec<Event> {
        let next_rules = self.pending_rules.lock().pop_front();
        let buffered = {
            let mut state = self.state.write();
            if let Some(rules) = next_rules {
                state.rules = rules;
            }
            state.waiting.take().unwrap_or_default()
        };

        let mut dispatched = Vec::new();
        for item in buffered {
            let mut probe = item.to_probe_event();
            dispatched.extend(self.evaluate(&mut probe));
        }
        dispatched
    }
}

#[async_trait]
impl PreProcessor for RulesEngine {
    async fn process(&self, event: &mut Event) -> Vec<Event> {
        if Self::is_request_reset(event, &self.name) {
            return self.apply_pending_rules_and_drain();
        }

        let dispatched = self.evaluate(event);

        let mut state = self.state.write();
        if let Some(buffer) = state.waiting.as_mut() {
            buffer.push_back(BufferedEvent::snapshot(event));
        }
        dispatched
    }
}
