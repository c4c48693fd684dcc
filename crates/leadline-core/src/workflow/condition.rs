//! Typed predicate evaluation for conditionals, waits, and validations.
//!
//! Predicates compare a resolved context path against a literal value with
//! one of seven operators. A missing field makes every comparison false
//! except `Neq`, which holds vacuously.

use leadline_types::workflow::{ComparisonOp, Predicate, PredicateMode};
use serde_json::Value;

use super::resolver::{ResolveScope, lookup_path};

/// Evaluate a predicate list under the given combination mode.
pub fn evaluate_predicates(
    predicates: &[Predicate],
    mode: PredicateMode,
    scope: &ResolveScope<'_>,
) -> bool {
    match mode {
        PredicateMode::All => predicates.iter().all(|p| evaluate_predicate(p, scope)),
        PredicateMode::Any => predicates.iter().any(|p| evaluate_predicate(p, scope)),
    }
}

/// Evaluate a single predicate against the scope.
pub fn evaluate_predicate(predicate: &Predicate, scope: &ResolveScope<'_>) -> bool {
    match lookup_path(&predicate.field, scope) {
        Some(actual) => compare_values(predicate.op, &actual, &predicate.value),
        None => matches!(predicate.op, ComparisonOp::Neq),
    }
}

/// Apply a comparison operator to two JSON values.
///
/// Numbers compare as f64 regardless of integer/float representation.
/// Ordering operators fall back to lexicographic comparison for strings and
/// are false for mixed or non-comparable types.
pub fn compare_values(op: ComparisonOp, actual: &Value, expected: &Value) -> bool {
    match op {
        ComparisonOp::Eq => values_equal(actual, expected),
        ComparisonOp::Neq => !values_equal(actual, expected),
        ComparisonOp::Gt => ordering(actual, expected).map_or(false, |o| o.is_gt()),
        ComparisonOp::Gte => ordering(actual, expected).map_or(false, |o| o.is_ge()),
        ComparisonOp::Lt => ordering(actual, expected).map_or(false, |o| o.is_lt()),
        ComparisonOp::Lte => ordering(actual, expected).map_or(false, |o| o.is_le()),
        ComparisonOp::Contains => contains(actual, expected),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn ordering(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x.partial_cmp(&y);
    }
    if let (Value::String(x), Value::String(y)) = (a, b) {
        return Some(x.cmp(y));
    }
    None
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::String(s) => needle.as_str().map_or(false, |n| s.contains(n)),
        Value::Array(items) => items.iter().any(|item| values_equal(item, needle)),
        Value::Object(map) => needle.as_str().map_or(false, |n| map.contains_key(n)),
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn empty_maps() -> (HashMap<String, Value>, HashMap<String, Value>) {
        (HashMap::new(), HashMap::new())
    }

    fn pred(field: &str, op: ComparisonOp, value: Value) -> Predicate {
        Predicate {
            field: field.to_string(),
            op,
            value,
        }
    }

    // -----------------------------------------------------------------------
    // Operators
    // -----------------------------------------------------------------------

    #[test]
    fn numeric_comparisons() {
        assert!(compare_values(ComparisonOp::Eq, &json!(82), &json!(82.0)));
        assert!(compare_values(ComparisonOp::Gt, &json!(82), &json!(50)));
        assert!(compare_values(ComparisonOp::Gte, &json!(50), &json!(50)));
        assert!(compare_values(ComparisonOp::Lt, &json!(10), &json!(50)));
        assert!(compare_values(ComparisonOp::Lte, &json!(50), &json!(50)));
        assert!(!compare_values(ComparisonOp::Gt, &json!(50), &json!(50)));
    }

    #[test]
    fn string_comparisons() {
        assert!(compare_values(ComparisonOp::Eq, &json!("hot"), &json!("hot")));
        assert!(compare_values(ComparisonOp::Neq, &json!("hot"), &json!("cold")));
        assert!(compare_values(ComparisonOp::Gt, &json!("b"), &json!("a")));
    }

    #[test]
    fn mixed_types_do_not_order() {
        assert!(!compare_values(ComparisonOp::Gt, &json!("10"), &json!(5)));
        assert!(!compare_values(ComparisonOp::Lt, &json!(true), &json!(5)));
    }

    #[test]
    fn contains_string_array_object() {
        assert!(compare_values(
            ComparisonOp::Contains,
            &json!("lead@example.com"),
            &json!("@")
        ));
        assert!(compare_values(
            ComparisonOp::Contains,
            &json!(["hot", "inbound"]),
            &json!("hot")
        ));
        assert!(compare_values(
            ComparisonOp::Contains,
            &json!([1, 2, 3]),
            &json!(2.0)
        ));
        assert!(compare_values(
            ComparisonOp::Contains,
            &json!({"email": "x"}),
            &json!("email")
        ));
        assert!(!compare_values(
            ComparisonOp::Contains,
            &json!(42),
            &json!(4)
        ));
    }

    // -----------------------------------------------------------------------
    // Predicates against a scope
    // -----------------------------------------------------------------------

    #[test]
    fn predicate_against_input() {
        let input = json!({"score": 82, "source": "webinar"});
        let (config, outputs) = empty_maps();
        let scope = ResolveScope::new(&input, &config, &outputs);

        assert!(evaluate_predicate(
            &pred("input.score", ComparisonOp::Gte, json!(80)),
            &scope
        ));
        assert!(!evaluate_predicate(
            &pred("input.score", ComparisonOp::Lt, json!(80)),
            &scope
        ));
        assert!(evaluate_predicate(
            &pred("input.source", ComparisonOp::Eq, json!("webinar")),
            &scope
        ));
    }

    #[test]
    fn missing_field_is_false_except_neq() {
        let input = json!({});
        let (config, outputs) = empty_maps();
        let scope = ResolveScope::new(&input, &config, &outputs);

        assert!(!evaluate_predicate(
            &pred("input.score", ComparisonOp::Eq, json!(1)),
            &scope
        ));
        assert!(!evaluate_predicate(
            &pred("input.score", ComparisonOp::Gt, json!(1)),
            &scope
        ));
        assert!(evaluate_predicate(
            &pred("input.score", ComparisonOp::Neq, json!(1)),
            &scope
        ));
    }

    // -----------------------------------------------------------------------
    // Combination modes
    // -----------------------------------------------------------------------

    #[test]
    fn all_mode_requires_every_predicate() {
        let input = json!({"score": 82, "region": "emea"});
        let (config, outputs) = empty_maps();
        let scope = ResolveScope::new(&input, &config, &outputs);

        let preds = vec![
            pred("input.score", ComparisonOp::Gte, json!(80)),
            pred("input.region", ComparisonOp::Eq, json!("emea")),
        ];
        assert!(evaluate_predicates(&preds, PredicateMode::All, &scope));

        let preds = vec![
            pred("input.score", ComparisonOp::Gte, json!(80)),
            pred("input.region", ComparisonOp::Eq, json!("apac")),
        ];
        assert!(!evaluate_predicates(&preds, PredicateMode::All, &scope));
    }

    #[test]
    fn any_mode_requires_one_predicate() {
        let input = json!({"score": 42});
        let (config, outputs) = empty_maps();
        let scope = ResolveScope::new(&input, &config, &outputs);

        let preds = vec![
            pred("input.score", ComparisonOp::Gte, json!(80)),
            pred("input.score", ComparisonOp::Gte, json!(40)),
        ];
        assert!(evaluate_predicates(&preds, PredicateMode::Any, &scope));

        let preds = vec![
            pred("input.score", ComparisonOp::Gte, json!(80)),
            pred("input.score", ComparisonOp::Gte, json!(90)),
        ];
        assert!(!evaluate_predicates(&preds, PredicateMode::Any, &scope));
    }
}
