//! External capability contracts.
//!
//! Everything the engine cannot decide for itself — what to write, whether it
//! is acceptable, what the subject looks like, which sections to plan — sits
//! behind one of these traits. Implementations are free to call out to
//! models, retrieval stores, or fixtures; the engine only requires that a
//! failed call can be replaced by the capability's documented fallback.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

use scribe_models::{Decision, Plan, Profile, ReviewVerdict};

use crate::error::Result;
use crate::state::RunState;

/// Placeholder content recorded when a writer fails or times out.
pub const WRITE_FALLBACK_CONTENT: &str = "<!-- failed to generate section -->";

/// Chooses the next control action from a snapshot of the run state.
///
/// Fallback on failure: the engine finishes the run with a policy-failure
/// reason rather than retrying, so a policy outage can never hang a run.
#[async_trait]
pub trait DecisionPolicy: Send + Sync {
    /// Produce the decision for the next turn.
    async fn decide(&self, state: &RunState) -> Result<Decision>;

    /// Policy name for logging.
    fn name(&self) -> &'static str {
        "decision-policy"
    }
}

/// Extracts a structured profile from the subject's source material.
///
/// Fallback on failure: `Profile::unknown`.
#[async_trait]
pub trait Profiler: Send + Sync {
    /// Profile the subject identified by `subject` with source at `source`.
    async fn profile(&self, subject: &str, source: &str) -> Result<Profile>;
}

/// Turns a profile into an ordered section plan.
///
/// Fallback on failure: the empty plan, which legitimately yields an empty
/// artifact.
#[async_trait]
pub trait Planner: Send + Sync {
    /// Plan the sections to produce for this profile.
    async fn plan(&self, profile: &Profile) -> Result<Plan>;
}

/// Input snapshot handed to a writer task. Owned, so the task can run without
/// touching shared state.
#[derive(Debug, Clone)]
pub struct WriteRequest {
    /// Section being written.
    pub section_id: String,
    /// Display title for the section.
    pub title: String,
    /// Merged instructions: section hints, this turn's decision instructions,
    /// and any accumulated review feedback.
    pub instructions: String,
    /// Subject profile.
    pub profile: Profile,
    /// The section's current content; writers replace it wholesale.
    pub prior_content: String,
}

/// Input snapshot handed to a review task.
#[derive(Debug, Clone)]
pub struct ReviewRequest {
    /// Section under review.
    pub section_id: String,
    /// Content under review.
    pub content: String,
    /// Subject profile.
    pub profile: Profile,
}

/// Produces content for one section.
///
/// Fallback on failure or timeout: [`WRITE_FALLBACK_CONTENT`], never an error
/// surfacing into the batch.
#[async_trait]
pub trait SectionWriter: Send + Sync {
    /// Write (or rewrite) the section's content.
    async fn write(&self, request: &WriteRequest) -> Result<String>;

    /// Writer name for logging and routing diagnostics.
    fn name(&self) -> &'static str {
        "writer"
    }
}

/// Judges one section's content.
///
/// Fallback on failure or timeout: an accepting verdict with explanatory
/// feedback, so a broken reviewer cannot deadlock the retry loop.
#[async_trait]
pub trait SectionReviewer: Send + Sync {
    /// Review the section's content.
    async fn review(&self, request: &ReviewRequest) -> Result<ReviewVerdict>;

    /// Reviewer name, used to label feedback when verdicts are combined.
    fn name(&self) -> &'static str {
        "reviewer"
    }
}

/// Data-driven routing table selecting a writer per section id.
///
/// Rules are checked in insertion order; ids matching no rule fall through to
/// the default writer. The table is injected into the engine, keeping the
/// writer-selection policy swappable and testable on its own.
pub struct WriterRouter {
    rules: Vec<(HashSet<String>, Arc<dyn SectionWriter>)>,
    default_writer: Arc<dyn SectionWriter>,
}

impl WriterRouter {
    /// Router that sends every section to one writer.
    pub fn new(default_writer: Arc<dyn SectionWriter>) -> Self {
        Self { rules: Vec::new(), default_writer }
    }

    /// Add a rule routing the given section ids to a writer.
    #[must_use]
    pub fn with_rule<I, S>(mut self, ids: I, writer: Arc<dyn SectionWriter>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: HashSet<String> = ids.into_iter().map(Into::into).collect();
        self.rules.push((ids, writer));
        self
    }

    /// Select the writer for a section id.
    pub fn route(&self, section_id: &str) -> Arc<dyn SectionWriter> {
        for (ids, writer) in &self.rules {
            if ids.contains(section_id) {
                return Arc::clone(writer);
            }
        }
        Arc::clone(&self.default_writer)
    }
}
