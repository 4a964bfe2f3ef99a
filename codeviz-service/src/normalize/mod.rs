//! Response normalization: raw model text in, schema-shaped record out
//!
//! Parsing walks a fallback ladder and stops at the first stage that yields JSON:
//!
//! 1. strict parse of the whole reply
//! 2. strip a surrounding markdown fence
//! 3. cut from the first `{` to the last `}` and parse that
//! 4. run the [`JsonRepair`] strategy over the candidate and parse the result
//!
//! If the last stage fails the reply is [`NormalizeError::Unparseable`]. Shaping never
//! fails on field-level problems; see [`shape`].

pub mod records;
mod repair;
pub mod shape;

pub use records::{
    AnalysisRecord, ComplexityReport, ErrorReport, FunctionComplexity, Issue, LoopComplexity,
    NormalizedTrace, RecursionComplexity, Step,
};
pub use repair::{JsonRepair, StructuralRepair};

use regex::Regex;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::sync::{Arc, LazyLock};
use thiserror::Error;
use tracing::{debug, warn};

use crate::prompt::TaskKind;
use shape::{FUNCTION_FIELDS, ISSUE_FIELDS, STEP_FIELDS, project_all, text_or};

/// Errors from normalizing a model reply
#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("model output is not valid JSON even after repair: {0}")]
    Unparseable(#[source] serde_json::Error),

    #[error("model output is JSON but not an object (got {0})")]
    NotAnObject(&'static str),

    #[error("projected record does not fit its type: {0}")]
    Shape(#[source] serde_json::Error),
}

/// Which ladder stage produced the parsed value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStage {
    Direct,
    Extracted,
    Repaired,
}

#[derive(Debug, Clone)]
pub struct ParsedReply {
    pub value: Value,
    pub stage: ParseStage,
}

static FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^```[A-Za-z0-9_+\-]*[ \t]*\r?\n|\r?\n```[ \t]*$").expect("fence pattern compiles")
});

/// Strip one markdown fence pair if the trimmed reply starts with one
pub fn strip_code_fences(text: &str) -> Cow<'_, str> {
    let trimmed = text.trim();
    if trimmed.starts_with("```") {
        FENCE.replace_all(trimmed, "")
    } else {
        Cow::Borrowed(text)
    }
}

/// Inclusive span from the first `{` to the last `}`, if the last comes after the first
pub fn extract_json_block(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Run the fallback ladder over a raw reply
pub fn parse_model_output(raw: &str, repair: &dyn JsonRepair) -> Result<ParsedReply, NormalizeError> {
    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        return Ok(ParsedReply {
            value,
            stage: ParseStage::Direct,
        });
    }

    let stripped = strip_code_fences(raw);
    let candidate = extract_json_block(&stripped).unwrap_or(stripped.as_ref());

    if let Ok(value) = serde_json::from_str::<Value>(candidate) {
        return Ok(ParsedReply {
            value,
            stage: ParseStage::Extracted,
        });
    }

    let repaired = repair.repair(candidate);
    serde_json::from_str::<Value>(&repaired)
        .map(|value| ParsedReply {
            value,
            stage: ParseStage::Repaired,
        })
        .map_err(NormalizeError::Unparseable)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A stray `{` in prose ahead of the reply makes repair nest the real object under a
/// blank key; unwrap it when that is all the root holds
fn lift_blank_key(mut map: Map<String, Value>, stage: ParseStage) -> Map<String, Value> {
    if stage != ParseStage::Repaired || map.len() != 1 {
        return map;
    }
    match map.remove("") {
        Some(Value::Object(inner)) => {
            warn!("Repaired reply nested its object under a blank key, lifting it");
            inner
        }
        Some(other) => {
            map.insert(String::new(), other);
            map
        }
        None => map,
    }
}

/// Parses replies and shapes them into records
#[derive(Clone)]
pub struct Normalizer {
    repair: Arc<dyn JsonRepair>,
    max_steps: usize,
}

impl Normalizer {
    pub fn new(max_steps: usize) -> Self {
        Self::with_repair(Arc::new(StructuralRepair), max_steps)
    }

    pub fn with_repair(repair: Arc<dyn JsonRepair>, max_steps: usize) -> Self {
        Self { repair, max_steps }
    }

    /// Run the ladder without shaping
    pub fn parse(&self, raw: &str) -> Result<ParsedReply, NormalizeError> {
        parse_model_output(raw, self.repair.as_ref())
    }

    /// Parse a reply and insist on a top-level object
    pub fn parse_object(&self, raw: &str) -> Result<Map<String, Value>, NormalizeError> {
        let parsed = parse_model_output(raw, self.repair.as_ref())?;
        debug!(stage = ?parsed.stage, reply_len = raw.len(), "Parsed model reply");
        match parsed.value {
            Value::Object(map) => Ok(lift_blank_key(map, parsed.stage)),
            other => Err(NormalizeError::NotAnObject(json_kind(&other))),
        }
    }

    /// Normalize a reply for the given task
    pub fn normalize(
        &self,
        task: TaskKind,
        raw: &str,
        language: &str,
    ) -> Result<AnalysisRecord, NormalizeError> {
        Ok(match task {
            TaskKind::Trace => AnalysisRecord::Trace(self.trace(raw, language)?),
            TaskKind::ErrorScan => AnalysisRecord::ErrorScan(self.error_report(raw)?),
            TaskKind::Complexity => AnalysisRecord::Complexity(self.complexity(raw)?),
        })
    }

    pub fn trace(&self, raw: &str, language: &str) -> Result<NormalizedTrace, NormalizeError> {
        let root = self.parse_object(raw)?;

        let mut model_language = text_or(root.get("language"), "");
        if model_language.trim().is_empty() {
            model_language = language.to_string();
        }

        let steps_value = root.get("steps");
        if let Some(Value::Array(steps)) = steps_value
            && steps.len() > self.max_steps
        {
            warn!(
                steps = steps.len(),
                max_steps = self.max_steps,
                "Model returned more steps than allowed, truncating"
            );
        }

        Ok(NormalizedTrace {
            language: model_language,
            summary: text_or(root.get("summary"), ""),
            steps: project_all(steps_value, STEP_FIELDS, self.max_steps)?,
        })
    }

    pub fn error_report(&self, raw: &str) -> Result<ErrorReport, NormalizeError> {
        let root = self.parse_object(raw)?;
        Ok(ErrorReport {
            issues: project_all(root.get("issues"), ISSUE_FIELDS, usize::MAX)?,
            corrected_code: text_or(root.get("corrected_code"), ""),
        })
    }

    pub fn complexity(&self, raw: &str) -> Result<ComplexityReport, NormalizeError> {
        let root = self.parse_object(raw)?;
        Ok(ComplexityReport {
            functions: project_all(root.get("functions"), FUNCTION_FIELDS, usize::MAX)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const VALID: &str = r#"{"language":"python","summary":"loop","steps":[{"step":1,"line":1,"operation":"assign"},{"step":2,"line":2,"operation":"print"}]}"#;

    fn parse(raw: &str) -> Result<ParsedReply, NormalizeError> {
        parse_model_output(raw, &StructuralRepair)
    }

    #[test]
    fn test_ladder_direct() {
        let parsed = parse(VALID).unwrap();
        assert_eq!(parsed.stage, ParseStage::Direct);
        assert_eq!(parsed.value["steps"][1]["operation"], json!("print"));
    }

    #[test]
    fn test_ladder_fenced() {
        let fenced = format!("```json\n{VALID}\n```");
        let parsed = parse(&fenced).unwrap();
        assert_eq!(parsed.stage, ParseStage::Extracted);
        assert_eq!(parsed.value, serde_json::from_str::<Value>(VALID).unwrap());
    }

    #[test]
    fn test_ladder_trailing_comma() {
        let broken = VALID.replace(r#""operation":"print"}"#, r#""operation":"print",}"#);
        let parsed = parse(&broken).unwrap();
        assert_eq!(parsed.stage, ParseStage::Repaired);
        assert_eq!(parsed.value, serde_json::from_str::<Value>(VALID).unwrap());
    }

    #[test]
    fn test_ladder_truncated_mid_array_is_repaired_deterministically() {
        let truncated = &VALID[..VALID.find(r#"{"step":2"#).unwrap() + 12];
        let first = parse(truncated).unwrap();
        let second = parse(truncated).unwrap();
        assert_eq!(first.stage, ParseStage::Repaired);
        assert_eq!(first.value, second.value);
        assert_eq!(first.value["steps"].as_array().unwrap().len(), 1);
        assert_eq!(first.value["steps"][0]["operation"], json!("assign"));
    }

    #[test]
    fn test_trace_survives_reply_cut_inside_emoji_escape() {
        let raw = r#"{"steps":[{"line":1,"outputs":"smile \ud83d"#;
        assert_eq!(parse(raw).unwrap().stage, ParseStage::Repaired);

        let trace = Normalizer::new(10).trace(raw, "python").unwrap();
        assert_eq!(trace.steps.len(), 1);
        assert_eq!(trace.steps[0].outputs, "smile \u{fffd}");
    }

    #[test]
    fn test_brace_in_leading_prose_does_not_hide_reply() {
        let raw = "Here is f() {:\n{\"language\":\"python\",\"steps\":[{\"line\":1}]}";
        let trace = Normalizer::new(10).trace(raw, "rust").unwrap();
        assert_eq!(trace.language, "python");
        assert_eq!(trace.steps.len(), 1);
        assert_eq!(trace.steps[0].line, Some(1));
    }

    #[test]
    fn test_blank_key_kept_when_not_repaired() {
        let root = Normalizer::new(10).parse_object(r#"{"": {"a": 1}}"#).unwrap();
        assert!(root.contains_key(""));
    }

    #[test]
    fn test_ladder_prose_around_json() {
        let chatty = format!("Here is the analysis you asked for:\n\n{VALID}\n\nHope this helps!");
        assert_eq!(parse(&chatty).unwrap().stage, ParseStage::Extracted);
    }

    #[test]
    fn test_ladder_gives_up_without_json() {
        let err = parse("I'm sorry, I can't analyze that code.").unwrap_err();
        assert!(matches!(err, NormalizeError::Unparseable(_)));
    }

    #[test]
    fn test_strip_code_fences_variants() {
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("  ```JSON \r\n{}\r\n```  "), "{}");
        assert_eq!(strip_code_fences("{}"), "{}");
        assert_eq!(strip_code_fences("see ```json\n{}\n```"), "see ```json\n{}\n```");
    }

    #[test]
    fn test_extract_json_block() {
        assert_eq!(extract_json_block("a {x} b {y} c"), Some("{x} b {y}"));
        assert_eq!(extract_json_block("} backwards {"), None);
        assert_eq!(extract_json_block("no braces"), None);
    }

    #[test]
    fn test_end_to_end_example() {
        let reply = "```json\n{\"language\":\"python\",\"summary\":\"adds two numbers\",\"steps\":[{\"line\":1,\"operation\":\"assign\"},]}\n```";
        let trace = Normalizer::new(500).trace(reply, "python").unwrap();

        assert_eq!(trace.language, "python");
        assert_eq!(trace.summary, "adds two numbers");
        assert_eq!(trace.steps.len(), 1);
        let step = &trace.steps[0];
        assert_eq!(step.step, 1);
        assert_eq!(step.line, Some(1));
        assert_eq!(step.operation, "assign");
        assert_eq!(step.explanation, "");
        assert!(step.variables.is_empty());
        assert!(step.call_stack.is_empty());
        assert_eq!(step.outputs, "");
        assert!(step.memory_state.is_empty());
        assert_eq!(step.next_action, "");
    }

    #[test]
    fn test_index_backfill() {
        let reply = r#"{"steps":[{"operation":"a"},{"operation":"b"},{"operation":"c"}]}"#;
        let trace = Normalizer::new(500).trace(reply, "go").unwrap();
        let indices: Vec<u64> = trace.steps.iter().map(|s| s.step).collect();
        assert_eq!(indices, vec![1, 2, 3]);
    }

    #[test]
    fn test_extra_keys_dropped_recognized_kept() {
        let reply = r#"{"steps":[{"step":1,"line":4,"operation":"call","confidence":0.3,"variables":{"x":1}}]}"#;
        let trace = Normalizer::new(500).trace(reply, "js").unwrap();
        let as_json = serde_json::to_value(&trace.steps[0]).unwrap();
        assert!(as_json.get("confidence").is_none());
        assert_eq!(as_json["line"], json!(4));
        assert_eq!(as_json["variables"], json!({"x": 1}));
    }

    #[test]
    fn test_defaulting_is_idempotent() {
        let full = r#"{"language":"python","summary":"s","steps":[{"step":1,"line":2,"operation":"op","explanation":"","variables":{},"call_stack":[],"outputs":"","memory_state":{},"control_flow":"","data_structures":{},"execution_context":"","next_action":""}]}"#;
        let sparse = r#"{"language":"python","summary":"s","steps":[{"line":2,"operation":"op"}]}"#;
        let normalizer = Normalizer::new(500);
        assert_eq!(
            normalizer.trace(full, "python").unwrap(),
            normalizer.trace(sparse, "python").unwrap()
        );
    }

    #[test]
    fn test_top_level_defaults() {
        let trace = Normalizer::new(500).trace("{}", "ruby").unwrap();
        assert_eq!(trace.language, "ruby");
        assert_eq!(trace.summary, "");
        assert!(trace.steps.is_empty());

        let blank_language = Normalizer::new(500)
            .trace(r#"{"language":"  ","steps":"none"}"#, "ruby")
            .unwrap();
        assert_eq!(blank_language.language, "ruby");
        assert!(blank_language.steps.is_empty());
    }

    #[test]
    fn test_max_steps_truncates() {
        let reply = json!({"steps": (0..10).map(|i| json!({"line": i})).collect::<Vec<_>>()});
        let trace = Normalizer::new(3).trace(&reply.to_string(), "c").unwrap();
        assert_eq!(trace.steps.len(), 3);
        assert_eq!(trace.steps[2].step, 3);
    }

    #[test]
    fn test_non_object_reply_rejected() {
        let err = Normalizer::new(10).trace("[1, 2, 3]", "c").unwrap_err();
        assert!(matches!(err, NormalizeError::NotAnObject("array")));
    }

    #[test]
    fn test_error_report_shaping() {
        let reply = r#"```json
{"issues":[{"type":"Runtime","line":"3","title":"Division by zero","explanation":"b may be 0"},{"line":-1}],
 "corrected_code": "def f(a, b):\n    return a / b if b else 0"}
```"#;
        let report = Normalizer::new(10).error_report(reply).unwrap();
        assert_eq!(report.issues.len(), 2);
        assert_eq!(report.issues[0].kind, "runtime");
        assert_eq!(report.issues[0].line, 3);
        assert_eq!(report.issues[0].suggestion, "");
        assert_eq!(report.issues[1].kind, "logic");
        assert_eq!(report.issues[1].line, 0);
        assert_eq!(report.issues[1].title, "Potential issue");
        assert!(report.corrected_code.contains("return a / b"));
    }

    #[test]
    fn test_complexity_shaping() {
        let reply = r#"{'functions': [{'name': 'merge_sort', 'time_complexity': 'O(n log n)',
            'recursions': [{'location': 'line 4', 'recurrence': 'T(n)=2T(n/2)+n'}]}, {}]}"#;
        let report = Normalizer::new(10).complexity(reply).unwrap();
        assert_eq!(report.functions.len(), 2);
        let merge = &report.functions[0];
        assert_eq!(merge.name, "merge_sort");
        assert_eq!(merge.space_complexity, "O(1)");
        assert_eq!(merge.recursions[0].solution, "");
        assert!(merge.loops.is_empty());
        assert_eq!(report.functions[1].name, "main");
    }

    #[test]
    fn test_normalize_dispatches_on_task() {
        let normalizer = Normalizer::new(10);
        let record = normalizer
            .normalize(TaskKind::ErrorScan, r#"{"issues":[]}"#, "go")
            .unwrap();
        assert!(matches!(record, AnalysisRecord::ErrorScan(ref r) if r.issues.is_empty()));
        assert_eq!(serde_json::to_value(&record).unwrap()["task"], json!("error_scan"));
    }

    struct NoRepair;

    impl JsonRepair for NoRepair {
        fn repair(&self, text: &str) -> String {
            text.to_string()
        }
    }

    #[test]
    fn test_repair_strategy_is_swappable() {
        let normalizer = Normalizer::with_repair(Arc::new(NoRepair), 10);
        assert!(normalizer.trace(r#"{"steps":[],}"#, "c").is_err());
        assert!(Normalizer::new(10).trace(r#"{"steps":[],}"#, "c").is_ok());
    }
}
