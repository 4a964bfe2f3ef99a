//! Stepping state and frame rendering for a trace
//!
//! [`ViewState`] is a plain value: every control returns a new state instead of
//! mutating shared fields. A [`Frame`] is what one redraw needs.

use crate::normalize::{NormalizedTrace, Step};
use serde::Serialize;
use std::fmt::Write;
use std::time::{Duration, Instant};

/// Cursor and playback state over a trace of `total` steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewState {
    cursor: usize,
    total: usize,
    playing: bool,
    last_tick: Option<Instant>,
}

impl ViewState {
    pub fn new(total: usize) -> Self {
        Self {
            cursor: 0,
            total,
            playing: false,
            last_tick: None,
        }
    }

    pub fn for_trace(trace: &NormalizedTrace) -> Self {
        Self::new(trace.steps.len())
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Advance one step, wrapping; pauses playback
    pub fn next(self) -> Self {
        if self.is_empty() {
            return self.paused();
        }
        Self {
            cursor: (self.cursor + 1) % self.total,
            ..self.paused()
        }
    }

    /// Go back one step, wrapping; pauses playback
    pub fn prev(self) -> Self {
        if self.is_empty() {
            return self.paused();
        }
        Self {
            cursor: (self.cursor + self.total - 1) % self.total,
            ..self.paused()
        }
    }

    /// Start or stop playback; starting restarts the tick clock
    pub fn toggle_play(self, now: Instant) -> Self {
        if self.playing {
            self.paused()
        } else {
            Self {
                playing: true,
                last_tick: Some(now),
                ..self
            }
        }
    }

    /// Back to the first step, paused
    pub fn reset(self) -> Self {
        Self {
            cursor: 0,
            ..self.paused()
        }
    }

    /// Auto-advance when playing and the interval has elapsed since the last tick
    pub fn tick(self, now: Instant, interval: Duration) -> Self {
        if !self.playing || self.is_empty() {
            return self;
        }
        match self.last_tick {
            Some(last) if now.saturating_duration_since(last) < interval => self,
            Some(_) => Self {
                cursor: (self.cursor + 1) % self.total,
                last_tick: Some(now),
                ..self
            },
            None => Self {
                last_tick: Some(now),
                ..self
            },
        }
    }

    /// "Step i / n", 1-based
    pub fn progress(&self) -> String {
        if self.is_empty() {
            return "No steps".to_string();
        }
        format!("Step {} / {}", self.cursor + 1, self.total)
    }

    fn paused(self) -> Self {
        Self {
            playing: false,
            last_tick: None,
            ..self
        }
    }
}

/// One source line as displayed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceLine {
    pub number: usize,
    pub text: String,
    pub highlighted: bool,
}

/// Everything needed to draw the current step
#[derive(Debug, Clone, Serialize)]
pub struct Frame<'a> {
    pub progress: String,
    pub playing: bool,
    pub step: Option<&'a Step>,
    pub lines: Vec<SourceLine>,
}

/// Build the frame for the cursor position in `state`
pub fn frame<'a>(trace: &'a NormalizedTrace, source: &str, state: &ViewState) -> Frame<'a> {
    let step = trace.steps.get(state.cursor);
    let active = step
        .and_then(|s| s.line)
        .and_then(|line| usize::try_from(line).ok());
    Frame {
        progress: state.progress(),
        playing: state.playing,
        step,
        lines: highlight_source(source, active),
    }
}

/// Number the source lines, marking `active` (1-based); out-of-range marks nothing
pub fn highlight_source(source: &str, active: Option<usize>) -> Vec<SourceLine> {
    source
        .lines()
        .enumerate()
        .map(|(i, text)| SourceLine {
            number: i + 1,
            text: text.to_string(),
            highlighted: active == Some(i + 1),
        })
        .collect()
}

fn push_mapping(out: &mut String, label: &str, map: &serde_json::Map<String, serde_json::Value>) {
    if map.is_empty() {
        return;
    }
    let _ = writeln!(out, "{label}:");
    for (name, value) in map {
        let _ = writeln!(out, "  {name} = {value}");
    }
}

/// Plain-text rendering of a frame
pub fn render_frame(frame: &Frame<'_>) -> String {
    let mut out = String::new();
    let width = frame.lines.len().to_string().len();

    let state = if frame.playing { "playing" } else { "paused" };
    let _ = writeln!(out, "{} [{state}]", frame.progress);
    out.push('\n');

    for line in &frame.lines {
        let marker = if line.highlighted { '>' } else { ' ' };
        let _ = writeln!(out, "{marker} {:>width$} | {}", line.number, line.text);
    }

    let Some(step) = frame.step else {
        return out;
    };

    out.push('\n');
    if !step.operation.is_empty() {
        let _ = writeln!(out, "Operation: {}", step.operation);
    }
    if !step.explanation.is_empty() {
        let _ = writeln!(out, "{}", step.explanation);
    }
    push_mapping(&mut out, "Variables", &step.variables);
    let stack = step.call_stack_labels();
    if !stack.is_empty() {
        let _ = writeln!(out, "Call stack: {}", stack.join(" > "));
    }
    if !step.outputs.is_empty() {
        let _ = writeln!(out, "Output: {}", step.outputs);
    }
    if !step.control_flow.is_empty() {
        let _ = writeln!(out, "Control flow: {}", step.control_flow);
    }
    push_mapping(&mut out, "Data structures", &step.data_structures);
    if !step.next_action.is_empty() {
        let _ = writeln!(out, "Next: {}", step.next_action);
    }
    out
}
