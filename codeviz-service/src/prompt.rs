//! Prompt construction for the three analysis tasks
//!
//! Every task is one [`PromptTemplate`]: a system role, a task description, the JSON
//! shape the model must return and a few task-specific rules. Rendering is pure.

use serde::{Deserialize, Serialize};

/// Which analysis the model is asked to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Step-by-step execution trace
    Trace,
    /// Syntax/runtime/logic issues plus a corrected program
    #[serde(alias = "errors")]
    ErrorScan,
    /// Big-O estimates per function
    Complexity,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Trace => "trace",
            TaskKind::ErrorScan => "error_scan",
            TaskKind::Complexity => "complexity",
        }
    }

    pub fn template(&self) -> &'static PromptTemplate {
        match self {
            TaskKind::Trace => &TRACE_TEMPLATE,
            TaskKind::ErrorScan => &ERROR_SCAN_TEMPLATE,
            TaskKind::Complexity => &COMPLEXITY_TEMPLATE,
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(TaskKind::Trace),
            "errors" | "error_scan" | "error-scan" => Ok(TaskKind::ErrorScan),
            "complexity" => Ok(TaskKind::Complexity),
            other => Err(format!("unknown task kind: {other}")),
        }
    }
}

/// System and user instruction for one model call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPair {
    pub system: String,
    pub user: String,
}

/// One task's prompt, as data
#[derive(Debug)]
pub struct PromptTemplate {
    /// System instruction: who the model is and what it must return
    pub role: &'static str,
    /// Opening line of the user instruction
    pub task_description: &'static str,
    /// JSON skeleton; `"{language}"` is replaced with the quoted language tag
    pub output_schema: &'static str,
    /// Task-specific rules, numbered after the shared formatting rules
    pub extra_rules: &'static [&'static str],
}

const FORMAT_RULES: &[&str] = &[
    "Return ONLY the JSON object. No markdown fences, no prose before or after it.",
    "Use only double quotes for keys and strings.",
    "No trailing commas, no comments.",
];

const LANGUAGE_PLACEHOLDER: &str = "\"{language}\"";

impl PromptTemplate {
    /// Render the template for a language tag and a code blob
    pub fn render(&self, language: &str, code: &str) -> PromptPair {
        let quoted_language =
            serde_json::to_string(language).unwrap_or_else(|_| "\"unknown\"".to_string());
        let schema = self
            .output_schema
            .replace(LANGUAGE_PLACEHOLDER, &quoted_language);

        let mut user = String::new();
        user.push_str(&format!("Language: {language}\nCode:\n<CODE>\n{code}\n</CODE>\n\n"));
        user.push_str(self.task_description);
        user.push_str(" Return a JSON object with exactly this structure:\n");
        user.push_str(&schema);
        user.push_str("\n\nRULES:\n");
        for (i, rule) in FORMAT_RULES.iter().chain(self.extra_rules).enumerate() {
            user.push_str(&format!("{}. {}\n", i + 1, rule));
        }

        PromptPair {
            system: self.role.to_string(),
            user,
        }
    }
}

/// Build the prompt pair for a task
pub fn build_prompts(task: TaskKind, language: &str, code: &str) -> PromptPair {
    task.template().render(language, code)
}

pub static TRACE_TEMPLATE: PromptTemplate = PromptTemplate {
    role: "You are Code Visualizer AI, an expert at analyzing code execution step by step. \
Create a detailed, accurate visualization of how the code executes: every line, every operation, \
every variable change and every control flow decision. Be precise about variable values, memory \
state and execution flow. The summary must explain the code's purpose, each function's role, the \
algorithm, the data flow, the expected output, the concepts demonstrated and, where it applies, \
time and space complexity. Return ONLY valid JSON that a strict JSON parser accepts.",
    task_description: "Create a detailed step-by-step execution analysis.",
    output_schema: r#"{
  "language": "{language}",
  "summary": "Educational overview: purpose, functions and their roles, algorithm, data flow, expected output, key concepts, complexity",
  "steps": [
    {
      "step": 1,
      "line": 1,
      "operation": "Operation name such as 'Variable Declaration', 'Function Call', 'Conditional Check', 'Loop Iteration'",
      "explanation": "What happens at this step and why",
      "variables": { "varName": "current_value", "varName_type": "data_type" },
      "call_stack": ["function_name", "nested_function"],
      "outputs": "Console output, return values or side effects",
      "memory_state": { "heap": { "object_id": "object_details" }, "stack": ["local_variables"] },
      "control_flow": "branch taken, loop condition or exception handling",
      "data_structures": { "list_name": { "elements": [1, 2, 3], "index": 0, "length": 3 } },
      "execution_context": "Which part of the program is executing",
      "next_action": "What happens in the next step"
    }
  ]
}"#,
    extra_rules: &[
        "Track every variable assignment, function call, conditional check and loop iteration.",
        "Show the exact values of variables at each step, with their data types.",
        "Show control flow decisions (if/else branches, loop conditions).",
        "Show the current state of lists, dicts and objects in data_structures.",
        "Use real 1-based line numbers; every executable line should have a step.",
        "Write the summary as 3-5 educational paragraphs.",
    ],
};

pub static ERROR_SCAN_TEMPLATE: PromptTemplate = PromptTemplate {
    role: "You are an expert debugging assistant. Identify syntax, runtime and logic errors in code. \
Explain the root cause in plain language and propose safe, actionable fixes. Provide a fully \
corrected version of the code that applies those fixes. Return ONLY strict JSON matching the \
required schema.",
    task_description: "Analyze potential issues WITHOUT executing the code.",
    output_schema: r#"{
  "issues": [
    {
      "type": "syntax|runtime|logic|style|performance",
      "line": 0,
      "title": "Short human-readable title",
      "explanation": "Clear explanation of the problem and its impact",
      "suggestion": "Concrete fix with example code or steps"
    }
  ],
  "corrected_code": "FULL corrected code with all safe fixes applied"
}"#,
    extra_rules: &[
        "If the line cannot be determined, set line to 0.",
        "Prefer minimal, safe fixes. Do NOT invent APIs.",
    ],
};

pub static COMPLEXITY_TEMPLATE: PromptTemplate = PromptTemplate {
    role: "You are an algorithms and complexity expert. Estimate precise time and space complexity \
for functions. Identify dominant terms and give Big-O, with best/average/worst notes where \
relevant. Detect loops and recursion and model their growth. Return ONLY strict JSON.",
    task_description: "Provide a complexity analysis.",
    output_schema: r#"{
  "functions": [
    {
      "name": "function_name",
      "time_complexity": "O(n log n)",
      "space_complexity": "O(n)",
      "notes": "Short justification and dominant factors",
      "loops": [{ "location": "line 23", "complexity": "O(n)", "explanation": "for loop over n items" }],
      "recursions": [{ "location": "line 45", "recurrence": "T(n)=2T(n/2)+n", "solution": "O(n log n)" }]
    }
  ]
}"#,
    extra_rules: &["If names are unknown, infer reasonable names like \"main\"."],
};
