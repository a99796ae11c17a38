//! Token resolution and template rendering (§4.5).
//!
//! A token path resolves against a union namespace: `~type`/`~source`/
//! `~timestamp`/`~id`/`~sdkver` read event metadata, `~state.<ext>/<path>`
//! reads a shared-state snapshot at the event's seq, and anything else is a
//! dotted lookup into `event.data`. The renderer is pure: given the same
//! context, the same template always produces the same string.

use chrono::{DateTime, Utc};
use hub_core::{Event, Value};

const STATE_PREFIX: &str = "~state.";

/// Resolves a shared-state path for one extension at a fixed event seq.
/// Implemented by the rules engine over `hub_core::ExtensionApi`'s state
/// accessors; kept as a trait here so this module never depends on the hub.
pub trait StateLookup: Send + Sync {
    fn lookup(&self, owner: &str, path: &str) -> Option<Value>;
}

/// Everything a condition or template needs to resolve a token, bound once
/// per rule evaluation.
pub struct TokenContext {
    event_type: String,
    source: String,
    timestamp: DateTime<Utc>,
    id: String,
    sdk_version: String,
    data: Value,
    state: Option<Box<dyn StateLookup>>,
}

impl TokenContext {
    /// Builds a context with only `event.data` populated; metadata tokens
    /// resolve to empty strings and `~state` tokens miss. Used by tests and
    /// by callers that only care about the data-path half of the grammar.
    #[must_use]
    pub fn from_event_data(data: Value) -> Self {
        Self {
            event_type: String::new(),
            source: String::new(),
            timestamp: Utc::now(),
            id: String::new(),
            sdk_version: String::new(),
            data,
            state: None,
        }
    }

    #[must_use]
    pub fn from_event(event: &Event, sdk_version: &str, state: Option<Box<dyn StateLookup>>) -> Self {
        Self {
            event_type: event.event_type().as_str().to_string(),
            source: event.source().as_str().to_string(),
            timestamp: event.timestamp(),
            id: event.id().to_string(),
            sdk_version: sdk_version.to_string(),
            data: event.data().clone(),
            state,
        }
    }

    #[must_use]
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Resolves a single token path to a value, or `None` on a miss.
    #[must_use]
    pub fn resolve_path(&self, path: &str) -> Option<Value> {
        match path {
            "~type" => Some(Value::from(self.event_type.as_str())),
            "~source" => Some(Value::from(self.source.as_str())),
            "~timestamp" => Some(Value::from(self.timestamp.to_rfc3339())),
            "~id" => Some(Value::from(self.id.as_str())),
            "~sdkver" => Some(Value::from(self.sdk_version.as_str())),
            p if p.starts_with(STATE_PREFIX) => self.resolve_state(&p[STATE_PREFIX.len()..]),
            p => self.data.get_path(p).cloned(),
        }
    }

    fn resolve_state(&self, rest: &str) -> Option<Value> {
        let (owner, path) = rest.split_once('/')?;
        self.state.as_ref()?.lookup(owner, path)
    }

    /// Renders `{% path %}` / `{% path|transformer %}` tokens embedded in
    /// `template`, substituting the empty string on any miss. Pure: no
    /// lookup result is cached and no state is mutated.
    #[must_use]
    pub fn render(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find("{%") {
            out.push_str(&rest[..start]);
            let after_open = &rest[start + 2..];
            let Some(end) = after_open.find("%}") else {
                out.push_str(&rest[start..]);
                return out;
            };
            let expr = after_open[..end].trim();
            out.push_str(&self.render_expr(expr));
            rest = &after_open[end + 2..];
        }
        out.push_str(rest);
        out
    }

    fn render_expr(&self, expr: &str) -> String {
        let (path, transformer) = match expr.split_once('|') {
            Some((p, t)) => (p.trim(), Some(t.trim())),
            None => (expr, None),
        };
        let rendered = self
            .resolve_path(path)
            .map(|v| v.to_string())
            .unwrap_or_default();
        match transformer {
            Some("urlenc") => urlenc(&rendered),
            Some("int") => rendered
                .trim()
                .parse::<f64>()
                .map(|f| (f as i64).to_string())
                .unwrap_or_default(),
            _ => rendered,
        }
    }
}

/// Minimal `application/x-www-form-urlencoded`-style percent-encoding;
/// reserved characters only, matching what the rule engine actually needs
/// to build query strings from template output.
fn urlenc(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedState;
    impl StateLookup for FixedState {
        fn lookup(&self, owner: &str, path: &str) -> Option<Value> {
            if owner == "com.adobe.module.lifecycle" && path == "lifecyclecontextdata.carriername" {
                Some(Value::from("AT&T"))
            } else {
                None
            }
        }
    }

    fn ctx() -> TokenContext {
        let mut data = Value::map();
        data.set_path("lifecyclecontextdata.launchevent", Value::from("LaunchEvent"));
        TokenContext {
            event_type: "lifecycle".to_string(),
            source: "responseContent".to_string(),
            timestamp: Utc::now(),
            id: "evt-1".to_string(),
            sdk_version: "1.2.3".to_string(),
            data,
            state: Some(Box::new(FixedState)),
        }
    }

    #[test]
    fn resolves_event_metadata_tokens() {
        assert_eq!(ctx().resolve_path("~type"), Some(Value::from("lifecycle")));
        assert_eq!(ctx().resolve_path("~sdkver"), Some(Value::from("1.2.3")));
    }

    #[test]
    fn resolves_shared_state_token() {
        let v = ctx().resolve_path("~state.com.adobe.module.lifecycle/lifecyclecontextdata.carriername");
        assert_eq!(v, Some(Value::from("AT&T")));
    }

    #[test]
    fn resolves_dotted_event_data_path() {
        let v = ctx().resolve_path("lifecyclecontextdata.launchevent");
        assert_eq!(v, Some(Value::from("LaunchEvent")));
    }

    #[test]
    fn missing_path_is_none() {
        assert_eq!(ctx().resolve_path("nope.nothere"), None);
    }

    #[test]
    fn render_substitutes_multiple_tokens() {
        let rendered = ctx().render("type={% ~type %}&carrier={% ~state.com.adobe.module.lifecycle/lifecyclecontextdata.carriername %}");
        assert_eq!(rendered, "type=lifecycle&carrier=AT&T");
    }

    #[test]
    fn render_misses_become_empty_string() {
        assert_eq!(ctx().render("x={% nope %}y"), "x=y");
    }

    #[test]
    fn render_applies_urlenc_transformer() {
        let mut data = Value::map();
        data.set_path("q", Value::from("a b&c"));
        let c = TokenContext::from_event_data(data);
        assert_eq!(c.render("{% q|urlenc %}"), "a+b%26c");
    }

    #[test]
    fn render_applies_int_transformer() {
        let mut data = Value::map();
        data.set_path("n", Value::from("3.9"));
        let c = TokenContext::from_event_data(data);
        assert_eq!(c.render("{% n|int %}"), "3");
    }

    #[test]
    fn render_is_a_no_op_without_tokens() {
        let c = TokenContext::from_event_data(Value::map());
        assert_eq!(c.render("plain text"), "plain text");
    }
}
