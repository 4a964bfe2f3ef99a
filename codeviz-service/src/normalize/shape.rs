//! Recognized-fields-only projection
//!
//! Each record type is described by a table of [`FieldSpec`]s. Projection copies the
//! listed fields out of whatever the model produced, coerces them to the declared kind
//! and fills the default when a field is missing or unusable. Keys not in the table are
//! dropped.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::NormalizeError;

/// How a field is coerced and what it defaults to
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    /// Non-negative integer; falls back to the element's 1-based position
    Position,
    /// Non-negative integer or null
    OptionalLine,
    /// Integer clamped at zero; defaults to 0
    Line,
    /// String; scalars are stringified
    Text(&'static str),
    /// Like `Text`, trimmed and lower-cased; blank falls back to the default
    Label(&'static str),
    /// JSON object; defaults to `{}`
    Mapping,
    /// JSON array; a lone non-empty string becomes a one-element array; defaults to `[]`
    Sequence,
    /// Array of sub-records projected with their own table
    Records(&'static [FieldSpec]),
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

const fn field(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec { name, kind }
}

pub const STEP_FIELDS: &[FieldSpec] = &[
    field("step", FieldKind::Position),
    field("line", FieldKind::OptionalLine),
    field("operation", FieldKind::Text("")),
    field("explanation", FieldKind::Text("")),
    field("variables", FieldKind::Mapping),
    field("call_stack", FieldKind::Sequence),
    field("outputs", FieldKind::Text("")),
    field("memory_state", FieldKind::Mapping),
    field("control_flow", FieldKind::Text("")),
    field("data_structures", FieldKind::Mapping),
    field("execution_context", FieldKind::Text("")),
    field("next_action", FieldKind::Text("")),
];

pub const ISSUE_FIELDS: &[FieldSpec] = &[
    field("type", FieldKind::Label("logic")),
    field("line", FieldKind::Line),
    field("title", FieldKind::Text("Potential issue")),
    field("explanation", FieldKind::Text("")),
    field("suggestion", FieldKind::Text("")),
];

pub const LOOP_FIELDS: &[FieldSpec] = &[
    field("location", FieldKind::Text("")),
    field("complexity", FieldKind::Text("")),
    field("explanation", FieldKind::Text("")),
];

pub const RECURSION_FIELDS: &[FieldSpec] = &[
    field("location", FieldKind::Text("")),
    field("recurrence", FieldKind::Text("")),
    field("solution", FieldKind::Text("")),
];

pub const FUNCTION_FIELDS: &[FieldSpec] = &[
    field("name", FieldKind::Text("main")),
    field("time_complexity", FieldKind::Text("O(1)")),
    field("space_complexity", FieldKind::Text("O(1)")),
    field("notes", FieldKind::Text("")),
    field("loops", FieldKind::Records(LOOP_FIELDS)),
    field("recursions", FieldKind::Records(RECURSION_FIELDS)),
];

/// Project one element; `position` is 1-based
pub fn project(source: &Value, fields: &[FieldSpec], position: usize) -> Map<String, Value> {
    let object = source.as_object();
    fields
        .iter()
        .map(|spec| {
            let raw = object.and_then(|o| o.get(spec.name));
            (spec.name.to_string(), coerce(spec.kind, raw, position))
        })
        .collect()
}

/// Project one element straight into its typed record
pub fn project_into<T: DeserializeOwned>(
    source: &Value,
    fields: &[FieldSpec],
    position: usize,
) -> Result<T, NormalizeError> {
    serde_json::from_value(Value::Object(project(source, fields, position)))
        .map_err(NormalizeError::Shape)
}

/// Project every element of a (possibly missing) array field
pub fn project_all<T: DeserializeOwned>(
    items: Option<&Value>,
    fields: &[FieldSpec],
    limit: usize,
) -> Result<Vec<T>, NormalizeError> {
    match items {
        Some(Value::Array(items)) => items
            .iter()
            .take(limit)
            .enumerate()
            .map(|(i, item)| project_into(item, fields, i + 1))
            .collect(),
        _ => Ok(Vec::new()),
    }
}

fn coerce(kind: FieldKind, raw: Option<&Value>, position: usize) -> Value {
    let raw = raw.filter(|v| !v.is_null());
    match kind {
        FieldKind::Position => raw
            .and_then(as_unsigned)
            .map(Value::from)
            .unwrap_or_else(|| Value::from(position as u64)),
        FieldKind::OptionalLine => raw.and_then(as_unsigned).map(Value::from).unwrap_or(Value::Null),
        FieldKind::Line => Value::from(raw.and_then(as_signed).unwrap_or(0).max(0) as u64),
        FieldKind::Text(default) => Value::String(text_or(raw, default)),
        FieldKind::Label(default) => {
            let label = text_or(raw, default).trim().to_lowercase();
            if label.is_empty() {
                Value::String(default.to_string())
            } else {
                Value::String(label)
            }
        }
        FieldKind::Mapping => match raw {
            Some(Value::Object(map)) => Value::Object(map.clone()),
            _ => Value::Object(Map::new()),
        },
        FieldKind::Sequence => match raw {
            Some(Value::Array(items)) => Value::Array(items.clone()),
            Some(Value::String(s)) if !s.trim().is_empty() => {
                Value::Array(vec![Value::String(s.clone())])
            }
            _ => Value::Array(Vec::new()),
        },
        FieldKind::Records(fields) => match raw {
            Some(Value::Array(items)) => Value::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| Value::Object(project(item, fields, i + 1)))
                    .collect(),
            ),
            Some(item @ Value::Object(_)) => Value::Array(vec![Value::Object(project(item, fields, 1))]),
            _ => Value::Array(Vec::new()),
        },
    }
}

/// Text for a text-kind field; `None` and null fall back to `default`
pub(crate) fn text_or(raw: Option<&Value>, default: &str) -> String {
    match raw {
        None | Some(Value::Null) => default.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(compound) => compound.to_string(),
    }
}

fn as_unsigned(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f <= u64::MAX as f64)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_signed(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().map(|u| i64::try_from(u).unwrap_or(i64::MAX)))
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_position_fallback() {
        let projected = project(&json!({"operation": "x"}), STEP_FIELDS, 4);
        assert_eq!(projected["step"], json!(4));

        let projected = project(&json!({"step": "seven"}), STEP_FIELDS, 2);
        assert_eq!(projected["step"], json!(2));

        let projected = project(&json!({"step": -1}), STEP_FIELDS, 3);
        assert_eq!(projected["step"], json!(3));
    }

    #[test]
    fn test_position_accepts_numeric_forms() {
        assert_eq!(project(&json!({"step": "5"}), STEP_FIELDS, 1)["step"], json!(5));
        assert_eq!(project(&json!({"step": 6.0}), STEP_FIELDS, 1)["step"], json!(6));
        assert_eq!(project(&json!({"step": 0}), STEP_FIELDS, 1)["step"], json!(0));
    }

    #[test]
    fn test_optional_line() {
        assert_eq!(project(&json!({"line": 12}), STEP_FIELDS, 1)["line"], json!(12));
        assert_eq!(project(&json!({"line": " 3 "}), STEP_FIELDS, 1)["line"], json!(3));
        assert_eq!(project(&json!({"line": "n/a"}), STEP_FIELDS, 1)["line"], Value::Null);
        assert_eq!(project(&json!({}), STEP_FIELDS, 1)["line"], Value::Null);
    }

    #[test]
    fn test_issue_line_clamped() {
        assert_eq!(project(&json!({"line": -4}), ISSUE_FIELDS, 1)["line"], json!(0));
        assert_eq!(project(&json!({"line": "17"}), ISSUE_FIELDS, 1)["line"], json!(17));
        assert_eq!(project(&json!({"line": 2.9}), ISSUE_FIELDS, 1)["line"], json!(2));
        assert_eq!(project(&json!({"line": null}), ISSUE_FIELDS, 1)["line"], json!(0));
    }

    #[test]
    fn test_label_lowercased_with_default() {
        assert_eq!(project(&json!({"type": " Syntax "}), ISSUE_FIELDS, 1)["type"], json!("syntax"));
        assert_eq!(project(&json!({"type": ""}), ISSUE_FIELDS, 1)["type"], json!("logic"));
        assert_eq!(project(&json!({}), ISSUE_FIELDS, 1)["type"], json!("logic"));
    }

    #[test]
    fn test_text_coercion() {
        let projected = project(
            &json!({"operation": 42, "explanation": true, "outputs": ["a", "b"], "control_flow": null}),
            STEP_FIELDS,
            1,
        );
        assert_eq!(projected["operation"], json!("42"));
        assert_eq!(projected["explanation"], json!("true"));
        assert_eq!(projected["outputs"], json!(r#"["a","b"]"#));
        assert_eq!(projected["control_flow"], json!(""));
    }

    #[test]
    fn test_wrong_typed_containers_default() {
        let projected = project(
            &json!({"variables": "x=1", "memory_state": [1], "call_stack": 7}),
            STEP_FIELDS,
            1,
        );
        assert_eq!(projected["variables"], json!({}));
        assert_eq!(projected["memory_state"], json!({}));
        assert_eq!(projected["call_stack"], json!([]));
    }

    #[test]
    fn test_lone_string_call_stack_wrapped() {
        let projected = project(&json!({"call_stack": "main"}), STEP_FIELDS, 1);
        assert_eq!(projected["call_stack"], json!(["main"]));
    }

    #[test]
    fn test_unknown_keys_dropped() {
        let projected = project(&json!({"operation": "x", "confidence": 0.9}), STEP_FIELDS, 1);
        assert!(!projected.contains_key("confidence"));
        assert_eq!(projected.len(), STEP_FIELDS.len());
    }

    #[test]
    fn test_non_object_element_gets_all_defaults() {
        let projected = project(&json!("just a string"), FUNCTION_FIELDS, 1);
        assert_eq!(projected["name"], json!("main"));
        assert_eq!(projected["time_complexity"], json!("O(1)"));
        assert_eq!(projected["loops"], json!([]));
    }

    #[test]
    fn test_nested_records() {
        let projected = project(
            &json!({
                "name": "fib",
                "recursions": {"location": "line 3", "recurrence": "T(n)=T(n-1)+T(n-2)", "extra": 1},
                "loops": [{"location": "line 5"}]
            }),
            FUNCTION_FIELDS,
            1,
        );
        assert_eq!(
            projected["recursions"],
            json!([{"location": "line 3", "recurrence": "T(n)=T(n-1)+T(n-2)", "solution": ""}])
        );
        assert_eq!(
            projected["loops"],
            json!([{"location": "line 5", "complexity": "", "explanation": ""}])
        );
    }

    #[test]
    fn test_project_all_respects_limit() {
        let items = json!([{}, {}, {}, {}]);
        let steps: Vec<Value> = project_all(Some(&items), LOOP_FIELDS, 2).unwrap();
        assert_eq!(steps.len(), 2);

        let none: Vec<Value> = project_all(Some(&json!("nope")), LOOP_FIELDS, 10).unwrap();
        assert!(none.is_empty());
    }
}
