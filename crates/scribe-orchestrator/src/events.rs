//! Run event model for streaming orchestration progress.
//!
//! This is the canonical event stream contract for a headless run. Clients
//! subscribe for progress, per-turn deltas, review outcomes, and the final
//! result; emission is best-effort and never blocks the engine.

use serde::{Deserialize, Serialize};

use scribe_models::Action;

use crate::state::Phase;

/// A unique identifier correlating events within one run.
pub type RunId = String;

/// What a dispatch batch was doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchKind {
    /// Writer fan-out.
    Write,
    /// Reviewer fan-out.
    Review,
}

/// High-level events emitted during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// A run began.
    RunStarted {
        run_id: RunId,
        subject: String,
    },

    /// One decision-loop turn completed, with the sections it touched.
    TurnCompleted {
        run_id: RunId,
        iteration: u32,
        phase: Phase,
        action: Action,
        reasoning: String,
        changed_sections: Vec<String>,
    },

    /// A batch of section tasks was dispatched.
    SectionsDispatched {
        run_id: RunId,
        kind: DispatchKind,
        section_ids: Vec<String>,
    },

    /// A section's content was (re)written.
    SectionWritten {
        run_id: RunId,
        section_id: String,
    },

    /// A section's review resolved.
    SectionReviewed {
        run_id: RunId,
        section_id: String,
        status: String,
        forced: bool,
        retries: u32,
    },

    /// The decision policy produced an action outside the known set.
    ControlError {
        run_id: RunId,
        action: String,
    },

    /// The run finished.
    RunFinished {
        run_id: RunId,
        finish_reason: String,
    },
}
