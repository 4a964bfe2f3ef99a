//! Normalized analysis records
//!
//! These are what the presentation layer consumes. Every field is always present; the
//! projection in `shape` guarantees the JSON handed to these types already has the
//! right shape.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Hypothesized execution of the submitted code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedTrace {
    pub language: String,
    pub summary: String,
    pub steps: Vec<Step>,
}

/// One point of hypothesized execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub step: u64,
    pub line: Option<u64>,
    pub operation: String,
    pub explanation: String,
    pub variables: Map<String, Value>,
    pub call_stack: Vec<Value>,
    pub outputs: String,
    pub memory_state: Map<String, Value>,
    pub control_flow: String,
    pub data_structures: Map<String, Value>,
    pub execution_context: String,
    pub next_action: String,
}

impl Step {
    /// Call stack frames as display strings
    pub fn call_stack_labels(&self) -> Vec<String> {
        self.call_stack
            .iter()
            .map(|frame| match frame {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect()
    }
}

/// Issues found in the code, plus a corrected version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub issues: Vec<Issue>,
    pub corrected_code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// One of syntax, runtime, logic, style, performance (not enforced)
    #[serde(rename = "type")]
    pub kind: String,
    /// 1-based line, 0 when unknown
    pub line: u64,
    pub title: String,
    pub explanation: String,
    pub suggestion: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityReport {
    pub functions: Vec<FunctionComplexity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionComplexity {
    pub name: String,
    pub time_complexity: String,
    pub space_complexity: String,
    pub notes: String,
    pub loops: Vec<LoopComplexity>,
    pub recursions: Vec<RecursionComplexity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopComplexity {
    pub location: String,
    pub complexity: String,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecursionComplexity {
    pub location: String,
    pub recurrence: String,
    pub solution: String,
}

/// Result of one analysis, tagged by task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum AnalysisRecord {
    Trace(NormalizedTrace),
    ErrorScan(ErrorReport),
    Complexity(ComplexityReport),
}

impl AnalysisRecord {
    pub fn as_trace(&self) -> Option<&NormalizedTrace> {
        match self {
            AnalysisRecord::Trace(trace) => Some(trace),
            _ => None,
        }
    }
}
