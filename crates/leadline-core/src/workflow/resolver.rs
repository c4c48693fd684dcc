//! Lazy `{{path}}` variable substitution over JSON values.
//!
//! Resolution happens at the instant a step is about to execute, so a later
//! step can reference the output of an earlier step that did not exist when
//! the workflow was authored. Substitution recurses through arbitrary nested
//! structures, replacing every string leaf that contains tokens.
//!
//! Token namespaces:
//! - `input.*` -- the original trigger payload
//! - `config.*` -- static workflow configuration
//! - `<stepId>.output.*` -- a prior step's recorded output
//! - `now` -- the current UTC timestamp (RFC 3339)
//! - `item.*` / `index` -- only inside a for-each iteration
//!
//! A string that is exactly one token resolves type-preserving (an array
//! stays an array); tokens embedded in a larger string are stringified.
//! An unresolvable path fails only the step being resolved.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::{Map, Value, json};

use super::step::StepError;

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// Everything a token can resolve against, threaded explicitly -- the
/// resolver has no ambient state.
#[derive(Debug, Clone, Copy)]
pub struct ResolveScope<'a> {
    /// Original trigger payload.
    pub input: &'a Value,
    /// Static workflow configuration.
    pub config: &'a HashMap<String, Value>,
    /// Prior step outputs keyed by step id.
    pub outputs: &'a HashMap<String, Value>,
    /// Current element inside a for-each iteration.
    pub item: Option<&'a Value>,
    /// Current index inside a for-each iteration.
    pub index: Option<usize>,
}

impl<'a> ResolveScope<'a> {
    pub fn new(
        input: &'a Value,
        config: &'a HashMap<String, Value>,
        outputs: &'a HashMap<String, Value>,
    ) -> Self {
        Self {
            input,
            config,
            outputs,
            item: None,
            index: None,
        }
    }

    /// The same scope with an item/index overlay for one iteration.
    pub fn with_item(&self, item: &'a Value, index: usize) -> Self {
        Self {
            item: Some(item),
            index: Some(index),
            ..*self
        }
    }
}

// ---------------------------------------------------------------------------
// Path lookup
// ---------------------------------------------------------------------------

/// Resolve a dotted path against the scope. Returns `None` when any segment
/// is missing. Numeric segments index into arrays.
pub fn lookup_path(path: &str, scope: &ResolveScope<'_>) -> Option<Value> {
    let segments: Vec<&str> = path.split('.').collect();
    match segments[0] {
        "now" if segments.len() == 1 => Some(Value::String(Utc::now().to_rfc3339())),
        "input" => descend(scope.input, &segments[1..]),
        "config" => {
            let key = segments.get(1)?;
            let value = scope.config.get(*key)?;
            descend(value, &segments[2..])
        }
        "item" => scope.item.and_then(|item| descend(item, &segments[1..])),
        "index" if segments.len() == 1 => scope.index.map(|i| json!(i)),
        step_id => {
            let output = scope.outputs.get(step_id)?;
            if segments.get(1) != Some(&"output") {
                return None;
            }
            descend(output, &segments[2..])
        }
    }
}

fn descend(value: &Value, segments: &[&str]) -> Option<Value> {
    let mut current = value;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(*segment)?,
            Value::Array(items) => {
                let idx: usize = segment.parse().ok()?;
                items.get(idx)?
            }
            _ => return None,
        };
    }
    Some(current.clone())
}

// ---------------------------------------------------------------------------
// Substitution
// ---------------------------------------------------------------------------

/// Resolve a string that may contain `{{path}}` tokens.
///
/// A string that is exactly one token returns the referenced value with its
/// type preserved. Embedded tokens are stringified in place.
pub fn resolve_string(
    raw: &str,
    scope: &ResolveScope<'_>,
    step_id: &str,
) -> Result<Value, StepError> {
    if let Some(path) = whole_token(raw) {
        let value = lookup_path(path, scope).ok_or_else(|| StepError::UnresolvedVariable {
            token: format!("{{{{{path}}}}}"),
            step_id: step_id.to_string(),
        })?;
        return Ok(value);
    }
    resolve_template(raw, scope, step_id).map(Value::String)
}

/// Resolve every token in a string, stringifying the referenced values.
pub fn resolve_template(
    raw: &str,
    scope: &ResolveScope<'_>,
    step_id: &str,
) -> Result<String, StepError> {
    let mut result = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let Some(close) = after.find("}}") else {
            // Unbalanced braces are literal text
            result.push_str(rest);
            return Ok(result);
        };
        let path = after[..close].trim();
        result.push_str(&rest[..start]);

        let value = lookup_path(path, scope).ok_or_else(|| StepError::UnresolvedVariable {
            token: format!("{{{{{path}}}}}"),
            step_id: step_id.to_string(),
        })?;
        result.push_str(&value_to_string(&value));

        rest = &after[close + 2..];
    }
    result.push_str(rest);
    Ok(result)
}

/// Recursively resolve every string leaf of a JSON value.
pub fn resolve_value(
    value: &Value,
    scope: &ResolveScope<'_>,
    step_id: &str,
) -> Result<Value, StepError> {
    match value {
        Value::String(s) => resolve_string(s, scope, step_id),
        Value::Array(items) => {
            let resolved: Result<Vec<Value>, StepError> = items
                .iter()
                .map(|item| resolve_value(item, scope, step_id))
                .collect();
            Ok(Value::Array(resolved?))
        }
        Value::Object(map) => {
            let mut resolved = Map::with_capacity(map.len());
            for (key, item) in map {
                resolved.insert(key.clone(), resolve_value(item, scope, step_id)?);
            }
            Ok(Value::Object(resolved))
        }
        other => Ok(other.clone()),
    }
}

/// If the trimmed string is exactly one `{{path}}` token, return the path.
fn whole_token(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    let inner = trimmed.strip_prefix("{{")?.strip_suffix("}}")?;
    if inner.contains("{{") || inner.contains("}}") {
        return None;
    }
    let path = inner.trim();
    if path.is_empty() { None } else { Some(path) }
}

/// Convert a JSON value to a display string for embedded substitution.
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        // For objects/arrays, return compact JSON
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn config_map() -> HashMap<String, Value> {
        HashMap::from([("crm_base_url".to_string(), json!("https://crm.internal"))])
    }

    fn outputs_map() -> HashMap<String, Value> {
        HashMap::from([(
            "fetch".to_string(),
            json!({"status": 200, "body": {"email": "lead@example.com", "score": 82}}),
        )])
    }

    // -----------------------------------------------------------------------
    // Path lookup
    // -----------------------------------------------------------------------

    #[test]
    fn input_path_resolves() {
        let input = json!({"leadId": "abc"});
        let config = HashMap::new();
        let outputs = HashMap::new();
        let scope = ResolveScope::new(&input, &config, &outputs);

        assert_eq!(lookup_path("input.leadId", &scope), Some(json!("abc")));
    }

    #[test]
    fn missing_path_is_none() {
        let input = json!({"leadId": "abc"});
        let config = HashMap::new();
        let outputs = HashMap::new();
        let scope = ResolveScope::new(&input, &config, &outputs);

        assert_eq!(lookup_path("missing.field", &scope), None);
        assert_eq!(lookup_path("input.nope", &scope), None);
    }

    #[test]
    fn step_output_path_requires_output_segment() {
        let input = json!({});
        let config = HashMap::new();
        let outputs = outputs_map();
        let scope = ResolveScope::new(&input, &config, &outputs);

        assert_eq!(
            lookup_path("fetch.output.body.email", &scope),
            Some(json!("lead@example.com"))
        );
        // Without the `.output` segment the reference is invalid
        assert_eq!(lookup_path("fetch.body.email", &scope), None);
    }

    #[test]
    fn config_path_resolves() {
        let input = json!({});
        let config = config_map();
        let outputs = HashMap::new();
        let scope = ResolveScope::new(&input, &config, &outputs);

        assert_eq!(
            lookup_path("config.crm_base_url", &scope),
            Some(json!("https://crm.internal"))
        );
    }

    #[test]
    fn now_resolves_to_rfc3339() {
        let input = json!({});
        let config = HashMap::new();
        let outputs = HashMap::new();
        let scope = ResolveScope::new(&input, &config, &outputs);

        let now = lookup_path("now", &scope).unwrap();
        let text = now.as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(text).is_ok());
    }

    #[test]
    fn array_index_segments() {
        let input = json!({"leads": [{"id": "l1"}, {"id": "l2"}]});
        let config = HashMap::new();
        let outputs = HashMap::new();
        let scope = ResolveScope::new(&input, &config, &outputs);

        assert_eq!(lookup_path("input.leads.1.id", &scope), Some(json!("l2")));
        assert_eq!(lookup_path("input.leads.9.id", &scope), None);
    }

    #[test]
    fn item_and_index_only_in_iteration_scope() {
        let input = json!({});
        let config = HashMap::new();
        let outputs = HashMap::new();
        let scope = ResolveScope::new(&input, &config, &outputs);
        assert_eq!(lookup_path("item.id", &scope), None);
        assert_eq!(lookup_path("index", &scope), None);

        let item = json!({"id": "l7"});
        let iter_scope = scope.with_item(&item, 3);
        assert_eq!(lookup_path("item.id", &iter_scope), Some(json!("l7")));
        assert_eq!(lookup_path("index", &iter_scope), Some(json!(3)));
    }

    // -----------------------------------------------------------------------
    // String substitution
    // -----------------------------------------------------------------------

    #[test]
    fn whole_token_preserves_type() {
        let input = json!({"tags": ["hot", "inbound"], "score": 82});
        let config = HashMap::new();
        let outputs = HashMap::new();
        let scope = ResolveScope::new(&input, &config, &outputs);

        assert_eq!(
            resolve_string("{{input.tags}}", &scope, "s").unwrap(),
            json!(["hot", "inbound"])
        );
        assert_eq!(
            resolve_string("{{input.score}}", &scope, "s").unwrap(),
            json!(82)
        );
        // Inner whitespace is tolerated
        assert_eq!(
            resolve_string("{{ input.score }}", &scope, "s").unwrap(),
            json!(82)
        );
    }

    #[test]
    fn embedded_tokens_stringify() {
        let input = json!({"leadId": "abc", "score": 82});
        let config = config_map();
        let outputs = HashMap::new();
        let scope = ResolveScope::new(&input, &config, &outputs);

        let resolved = resolve_string(
            "{{config.crm_base_url}}/leads/{{input.leadId}}?score={{input.score}}",
            &scope,
            "s",
        )
        .unwrap();
        assert_eq!(
            resolved,
            json!("https://crm.internal/leads/abc?score=82")
        );
    }

    #[test]
    fn unresolved_token_names_token_and_step() {
        let input = json!({"leadId": "abc"});
        let config = HashMap::new();
        let outputs = HashMap::new();
        let scope = ResolveScope::new(&input, &config, &outputs);

        let err = resolve_string("{{missing.field}}", &scope, "fetch-lead").unwrap_err();
        match err {
            StepError::UnresolvedVariable { token, step_id } => {
                assert_eq!(token, "{{missing.field}}");
                assert_eq!(step_id, "fetch-lead");
            }
            other => panic!("expected UnresolvedVariable, got {other:?}"),
        }
    }

    #[test]
    fn plain_string_passes_through() {
        let input = json!({});
        let config = HashMap::new();
        let outputs = HashMap::new();
        let scope = ResolveScope::new(&input, &config, &outputs);

        assert_eq!(
            resolve_string("no tokens here", &scope, "s").unwrap(),
            json!("no tokens here")
        );
    }

    #[test]
    fn unbalanced_braces_are_literal() {
        let input = json!({});
        let config = HashMap::new();
        let outputs = HashMap::new();
        let scope = ResolveScope::new(&input, &config, &outputs);

        assert_eq!(
            resolve_string("open {{ but never closed", &scope, "s").unwrap(),
            json!("open {{ but never closed")
        );
    }

    // -----------------------------------------------------------------------
    // Recursive value substitution
    // -----------------------------------------------------------------------

    #[test]
    fn nested_structure_resolution() {
        let input = json!({"leadId": "abc", "email": "lead@example.com"});
        let config = HashMap::new();
        let outputs = outputs_map();
        let scope = ResolveScope::new(&input, &config, &outputs);

        let body = json!({
            "lead": "{{input.leadId}}",
            "contact": {"email": "{{input.email}}"},
            "scores": ["{{fetch.output.body.score}}", 10],
            "static": true,
        });
        let resolved = resolve_value(&body, &scope, "s").unwrap();
        assert_eq!(
            resolved,
            json!({
                "lead": "abc",
                "contact": {"email": "lead@example.com"},
                "scores": [82, 10],
                "static": true,
            })
        );
    }

    #[test]
    fn nested_unresolved_fails_whole_resolution() {
        let input = json!({});
        let config = HashMap::new();
        let outputs = HashMap::new();
        let scope = ResolveScope::new(&input, &config, &outputs);

        let body = json!({"a": {"b": "{{input.gone}}"}});
        let err = resolve_value(&body, &scope, "s").unwrap_err();
        assert!(matches!(err, StepError::UnresolvedVariable { .. }));
    }

    #[test]
    fn object_embedded_in_template_is_compact_json() {
        let input = json!({"lead": {"id": "abc"}});
        let config = HashMap::new();
        let outputs = HashMap::new();
        let scope = ResolveScope::new(&input, &config, &outputs);

        let resolved = resolve_template("payload: {{input.lead}}", &scope, "s").unwrap();
        assert_eq!(resolved, r#"payload: {"id":"abc"}"#);
    }
}
