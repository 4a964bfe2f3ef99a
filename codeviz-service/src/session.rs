//! Per-user analysis session
//!
//! Holds the most recent normalized record and its view state. Each analysis gets a
//! [`Ticket`]; results for anything but the latest ticket are discarded, so a slow
//! reply can never overwrite a newer one.

use crate::analyzer::{AnalysisError, AnalysisRequest};
use crate::normalize::{AnalysisRecord, NormalizedTrace};
use crate::view::ViewState;
use tracing::{debug, info};

/// Identifies one in-flight analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

/// What happened to a finished analysis
#[derive(Debug, PartialEq)]
pub enum Outcome {
    /// Result is now the current record
    Applied,
    /// Analysis failed; the session was cleared
    Failed(String),
    /// A newer analysis was started; the result was dropped
    Discarded,
}

#[derive(Debug, Clone)]
struct Current {
    request: AnalysisRequest,
    record: AnalysisRecord,
    view: ViewState,
}

#[derive(Debug, Default)]
pub struct Session {
    generation: u64,
    pending: Option<(Ticket, AnalysisRequest)>,
    current: Option<Current>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start an analysis, superseding any pending one
    pub fn begin(&mut self, request: AnalysisRequest) -> Ticket {
        self.generation += 1;
        let ticket = Ticket(self.generation);
        if let Some((old, _)) = self.pending.replace((ticket, request)) {
            debug!(superseded = old.0, current = ticket.0, "Superseding pending analysis");
        }
        ticket
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Deliver the result for `ticket`
    pub fn finish(
        &mut self,
        ticket: Ticket,
        result: Result<AnalysisRecord, AnalysisError>,
    ) -> Outcome {
        let request = match self.pending.take() {
            Some((pending, request)) if pending == ticket => request,
            other => {
                self.pending = other;
                debug!(ticket = ticket.0, "Discarding stale analysis result");
                return Outcome::Discarded;
            }
        };

        match result {
            Ok(record) => {
                let total = record.as_trace().map_or(0, |t| t.steps.len());
                info!(task = %request.task(), steps = total, "Analysis applied");
                self.current = Some(Current {
                    request,
                    record,
                    view: ViewState::new(total),
                });
                Outcome::Applied
            }
            Err(e) => {
                self.current = None;
                Outcome::Failed(e.to_string())
            }
        }
    }

    pub fn record(&self) -> Option<&AnalysisRecord> {
        self.current.as_ref().map(|c| &c.record)
    }

    pub fn trace(&self) -> Option<&NormalizedTrace> {
        self.record().and_then(AnalysisRecord::as_trace)
    }

    pub fn request(&self) -> Option<&AnalysisRequest> {
        self.current.as_ref().map(|c| &c.request)
    }

    pub fn view(&self) -> Option<ViewState> {
        self.current.as_ref().map(|c| c.view)
    }

    /// Replace the view state with `f(view)`
    pub fn update_view(&mut self, f: impl FnOnce(ViewState) -> ViewState) {
        if let Some(current) = self.current.as_mut() {
            current.view = f(current.view);
        }
    }
}
