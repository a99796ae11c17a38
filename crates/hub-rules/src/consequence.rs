//! Consequence application (§4.4 step 3): token substitution followed by
//! `add`/`mod`/dispatch.

use hub_core::{Event, Value};

use crate::token::TokenContext;

/// `(id, type, detail)` from a matched rule. `detail` commonly carries an
/// `eventdata` key for `add`/`mod`; any other shape is passed through
/// verbatim to a dispatch-type consequence's payload.
#[derive(Debug, Clone)]
pub struct Consequence {
    pub id: String,
    pub kind: String,
    pub detail: Value,
}

const RULES_CONSEQUENCE_EVENT: &str = "Rules Consequence Event";
const RULES_ENGINE_TYPE: &str = "rulesEngine";
const RESPONSE_CONTENT_SOURCE: &str = "responseContent";

impl Consequence {
    /// Renders every string field in `detail` against `ctx`, then applies the
    /// consequence: `add` merges `detail.eventdata` into `event.data` without
    /// overwriting; `mod` merges with overwrite; anything else synthesizes a
    /// "Rules Consequence Event" instead of touching `event` at all.
    #[must_use]
    pub fn apply(&self, event: &mut Event, ctx: &TokenContext) -> Option<Event> {
        let rendered = render_strings(&self.detail, ctx);

        match self.kind.as_str() {
            "add" => {
                if let Some(event_data) = rendered.get_path("eventdata") {
                    let merged = event.data().merge(event_data, false);
                    event.set_data(merged);
                }
                None
            }
            "mod" => {
                if let Some(event_data) = rendered.get_path("eventdata") {
                    let merged = event.data().merge(event_data, true);
                    event.set_data(merged);
                }
                None
            }
            other => {
                let mut payload = Value::map();
                payload.set_path("triggeredconsequence.id", Value::from(self.id.as_str()));
                payload.set_path("triggeredconsequence.type", Value::from(other));
                payload.set_path("triggeredconsequence.detail", rendered);
                Some(Event::new(
                    RULES_CONSEQUENCE_EVENT,
                    RULES_ENGINE_TYPE,
                    RESPONSE_CONTENT_SOURCE,
                    payload,
                ))
            }
        }
    }
}

/// Recursively renders every string leaf of `value` through `ctx`, leaving
/// non-string scalars untouched.
fn render_strings(value: &Value, ctx: &TokenContext) -> Value {
    match value {
        Value::Str(s) => Value::from(ctx.render(s)),
        Value::List(items) => Value::List(items.iter().map(|v| render_strings(v, ctx)).collect()),
        Value::Map(map) => {
            Value::Map(map.iter().map(|(k, v)| (k.clone(), render_strings(v, ctx))).collect())
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail_with_eventdata(value: Value) -> Value {
        let mut detail = Value::map();
        detail.set_path("eventdata", value);
        detail
    }

    #[test]
    fn add_merges_without_overwriting_existing_keys() {
        let mut data = Value::map();
        data.set_path("lifecyclecontextdata.launchevent", Value::from("LaunchEvent"));
        let mut event = Event::new("test", "lifecycle", "responseContent", data);

        let mut new_data = Value::map();
        new_data.set_path("attached", Value::from("yes"));
        let consequence = Consequence {
            id: "c1".to_string(),
            kind: "add".to_string(),
            detail: detail_with_eventdata(new_data),
        };
        let ctx = TokenContext::from_event_data(event.data().clone());
        assert!(consequence.apply(&mut event, &ctx).is_none());

        assert_eq!(event.data().get_path("attached"), Some(&Value::from("yes")));
        assert_eq!(
            event.data().get_path("lifecyclecontextdata.launchevent"),
            Some(&Value::from("LaunchEvent"))
        );
    }

    #[test]
    fn mod_overwrites_existing_keys() {
        let mut data = Value::map();
        data.set_path("lifecyclecontextdata.launchevent", Value::from("LaunchEvent"));
        let mut event = Event::new("test", "lifecycle", "responseContent", data);

        let mut new_data = Value::map();
        new_data.set_path("lifecyclecontextdata.launchevent", Value::from("Modified"));
        let consequence = Consequence {
            id: "c2".to_string(),
            kind: "mod".to_string(),
            detail: detail_with_eventdata(new_data),
        };
        let ctx = TokenContext::from_event_data(event.data().clone());
        consequence.apply(&mut event, &ctx);

        assert_eq!(
            event.data().get_path("lifecyclecontextdata.launchevent"),
            Some(&Value::from("Modified"))
        );
    }

    #[test]
    fn unknown_type_dispatches_a_consequence_event() {
        let mut event = Event::new("test", "lifecycle", "responseContent", Value::map());
        let consequence = Consequence { id: "c3".to_string(), kind: "pb".to_string(), detail: Value::map() };
        let ctx = TokenContext::from_event_data(Value::map());
        let dispatched = consequence.apply(&mut event, &ctx).expect("dispatch consequence");

        assert_eq!(dispatched.name(), RULES_CONSEQUENCE_EVENT);
        assert_eq!(dispatched.event_type().as_str(), RULES_ENGINE_TYPE);
        assert_eq!(dispatched.source().as_str(), RESPONSE_CONTENT_SOURCE);
        assert_eq!(dispatched.data().get_path("triggeredconsequence.type"), Some(&Value::from("pb")));
        assert_eq!(dispatched.data().get_path("triggeredconsequence.id"), Some(&Value::from("c3")));
    }

    #[test]
    fn string_fields_are_token_substituted_before_applying() {
        let mut data = Value::map();
        data.set_path("carrier", Value::from("AT&T"));
        let mut event = Event::new("test", "lifecycle", "responseContent", data.clone());

        let mut new_data = Value::map();
        new_data.set_path("label", Value::from("carrier={% carrier %}"));
        let consequence = Consequence {
            id: "c4".to_string(),
            kind: "add".to_string(),
            detail: detail_with_eventdata(new_data),
        };
        let ctx = TokenContext::from_event_data(data);
        consequence.apply(&mut event, &ctx);

        assert_eq!(event.data().get_path("label"), Some(&Value::from("carrier=AT&T")));
    }
}
