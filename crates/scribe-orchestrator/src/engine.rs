//! Decision loop driving one document-generation run.
//!
//! A single control thread owns the run state. Each turn it consults the
//! decision policy, routes the chosen action, and merges whatever patches the
//! turn produced — fan-out happens inside a turn, behind the dispatch
//! barrier, so the loop itself stays sequential. A hard cap on turns is
//! checked before the policy is consulted, so even a policy that never
//! chooses to finish cannot keep a run alive.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use scribe_models::{Action, Decision, Plan, Profile, ReviewVerdict, SectionSpec, SectionStatus};

use crate::aggregator;
use crate::capabilities::{
    DecisionPolicy, Planner, Profiler, ReviewRequest, SectionReviewer, WriteRequest, WriterRouter,
    WRITE_FALLBACK_CONTENT,
};
use crate::config::EngineConfig;
use crate::dispatch::{run_batch, DispatchJob};
use crate::error::{OrchestratorError, Result};
use crate::events::{DispatchKind, RunEvent};
use crate::review::{apply_review_outcomes, combine_verdicts, ReviewOutcome};
use crate::state::{Phase, RunState, StatePatch};

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// The decision policy chose FINISH.
    Completed,
    /// The global turn cap forced the finish.
    HardCapReached,
    /// The decision policy failed; the run finished with whatever it had.
    PolicyFailure,
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::HardCapReached => write!(f, "hard_cap_reached"),
            Self::PolicyFailure => write!(f, "policy_failure"),
        }
    }
}

/// Final per-section record carried in the run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionReport {
    /// Status at finish time.
    pub status: SectionStatus,
    /// Review rejections the section accumulated.
    pub retries: u32,
    /// Last combined reviewer feedback, retained for audit.
    pub feedback: String,
}

/// What a finished run hands back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Correlation id shared with the event stream.
    pub run_id: String,
    /// Subject the run documented.
    pub subject: String,
    /// The assembled artifact; may be empty for an empty plan.
    pub artifact: String,
    /// How the run ended.
    pub finish_reason: FinishReason,
    /// Decision-loop turns consumed.
    pub iterations: u32,
    /// Per-section outcomes keyed by section id.
    pub sections: std::collections::BTreeMap<String, SectionReport>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    /// Whether the run ended through a normal FINISH decision.
    pub fn is_success(&self) -> bool {
        matches!(self.finish_reason, FinishReason::Completed)
    }

    /// Whether any output was produced at all.
    pub fn has_output(&self) -> bool {
        !self.artifact.trim().is_empty()
    }
}

/// The orchestration engine: capabilities plus the decision loop.
pub struct Orchestrator {
    policy: Arc<dyn DecisionPolicy>,
    profiler: Arc<dyn Profiler>,
    planner: Arc<dyn Planner>,
    writers: WriterRouter,
    reviewers: Vec<Arc<dyn SectionReviewer>>,
    config: EngineConfig,
    event_tx: Option<broadcast::Sender<RunEvent>>,
}

impl Orchestrator {
    /// Create an engine over the given capability set.
    pub fn new(
        policy: Arc<dyn DecisionPolicy>,
        profiler: Arc<dyn Profiler>,
        planner: Arc<dyn Planner>,
        writers: WriterRouter,
        reviewers: Vec<Arc<dyn SectionReviewer>>,
        config: EngineConfig,
    ) -> Self {
        Self { policy, profiler, planner, writers, reviewers, config, event_tx: None }
    }

    /// Create an engine with the default configuration.
    pub fn with_defaults(
        policy: Arc<dyn DecisionPolicy>,
        profiler: Arc<dyn Profiler>,
        planner: Arc<dyn Planner>,
        writers: WriterRouter,
        reviewers: Vec<Arc<dyn SectionReviewer>>,
    ) -> Self {
        Self::new(policy, profiler, planner, writers, reviewers, EngineConfig::default())
    }

    /// Set the event sender used to stream run progress.
    pub fn set_event_sender(&mut self, event_tx: Option<broadcast::Sender<RunEvent>>) {
        self.event_tx = event_tx;
    }

    fn emit(&self, event: RunEvent) {
        if let Some(ref tx) = self.event_tx {
            let _ = tx.send(event);
        }
    }

    /// Execute one run to completion.
    ///
    /// A caller-provided plan seeds the state directly (the planning
    /// capability is never consulted for it). Returns a report for every
    /// normal termination path; only a control error is an `Err`.
    pub async fn run(
        &self,
        subject: &str,
        source: &str,
        initial_plan: Option<Plan>,
    ) -> Result<RunReport> {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let mut state = RunState::new(subject, source);

        self.emit(RunEvent::RunStarted {
            run_id: run_id.clone(),
            subject: subject.to_string(),
        });
        info!(run_id = %run_id, subject, "run started");

        if let Some(plan) = initial_plan {
            debug!(sections = plan.sections.len(), "seeding run with caller-provided plan");
            state.apply(StatePatch::new().with_plan(plan).with_phase(Phase::Execution));
        }

        loop {
            // Safety net: checked before the policy gets a say.
            if state.iteration >= self.config.hard_cap {
                warn!(iterations = state.iteration, "hard turn cap reached, forcing finish");
                return Ok(self.finish(run_id, started_at, &state, FinishReason::HardCapReached));
            }

            let decision = match self.policy.decide(&state).await {
                Ok(decision) => decision,
                Err(e) => {
                    warn!(policy = self.policy.name(), error = %e, "decision policy failed, finishing run");
                    state.apply(StatePatch::new().with_iteration(state.iteration + 1));
                    return Ok(self.finish(run_id, started_at, &state, FinishReason::PolicyFailure));
                }
            };

            state.apply(StatePatch::new().with_iteration(state.iteration + 1));
            info!(
                iteration = state.iteration,
                action = %decision.action,
                reasoning = %decision.reasoning,
                "decision"
            );

            let changed_sections = match &decision.action {
                Action::Profile => self.run_profile(&mut state).await,
                Action::Plan => self.run_plan(&mut state).await,
                Action::Delegate => self.run_delegate(&run_id, &mut state, &decision).await,
                Action::Review => self.run_review(&run_id, &mut state, &decision).await,
                Action::Finish => {
                    return Ok(self.finish(run_id, started_at, &state, FinishReason::Completed));
                }
                Action::Unknown(other) => {
                    warn!(action = %other, "unrecognized action, terminating as control error");
                    self.emit(RunEvent::ControlError {
                        run_id: run_id.clone(),
                        action: other.clone(),
                    });
                    return Err(OrchestratorError::ControlError(other.clone()));
                }
            };

            self.emit(RunEvent::TurnCompleted {
                run_id: run_id.clone(),
                iteration: state.iteration,
                phase: state.phase,
                action: decision.action.clone(),
                reasoning: decision.reasoning.clone(),
                changed_sections,
            });
        }
    }

    async fn run_profile(&self, state: &mut RunState) -> Vec<String> {
        let profile = match self.profiler.profile(&state.subject, &state.source).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(error = %e, "profiler failed, using unknown profile");
                Profile::unknown(&state.subject)
            }
        };
        state.apply(StatePatch::new().with_profile(profile).with_phase(Phase::Planning));
        Vec::new()
    }

    async fn run_plan(&self, state: &mut RunState) -> Vec<String> {
        let profile = state.profile.clone().unwrap_or_else(|| Profile::unknown(&state.subject));
        let plan = match self.planner.plan(&profile).await {
            Ok(plan) => plan,
            Err(e) => {
                warn!(error = %e, "planner failed, using empty plan");
                Plan::empty()
            }
        };
        let seeded: Vec<String> = plan.enabled_sections().map(|s| s.id.clone()).collect();
        if state.plan.is_some() {
            debug!("plan replaced, dropping section records from the previous plan");
            state.clear_section_records();
        }
        state.apply(StatePatch::new().with_plan(plan).with_phase(Phase::Execution));
        seeded
    }

    async fn run_delegate(
        &self,
        run_id: &str,
        state: &mut RunState,
        decision: &Decision,
    ) -> Vec<String> {
        let Some(plan) = state.plan.clone() else {
            warn!("DELEGATE requested before a plan exists, skipping turn");
            return Vec::new();
        };
        let profile = state.profile.clone().unwrap_or_else(|| Profile::unknown(&state.subject));

        let mut jobs = Vec::new();
        let mut targets = Vec::new();
        for section in plan.enabled_sections() {
            if !decision.target_sections.contains(&section.id) {
                continue;
            }
            targets.push(section.id.clone());

            let writer = self.writers.route(&section.id);
            let request = WriteRequest {
                section_id: section.id.clone(),
                title: section.display_title().to_string(),
                instructions: build_instructions(
                    section,
                    decision,
                    state.review_feedback.get(&section.id),
                ),
                profile: profile.clone(),
                prior_content: state.sections_content.get(&section.id).cloned().unwrap_or_default(),
            };

            let fallback = StatePatch::new()
                .with_section_content(&section.id, WRITE_FALLBACK_CONTENT)
                .with_section_status(&section.id, SectionStatus::ReviewPending);

            let section_id = section.id.clone();
            let task_fallback = fallback.clone();
            jobs.push(DispatchJob::new(
                section.id.as_str(),
                async move {
                    match writer.write(&request).await {
                        Ok(content) => StatePatch::new()
                            .with_section_content(&section_id, content)
                            .with_section_status(&section_id, SectionStatus::ReviewPending),
                        Err(e) => {
                            warn!(section = %section_id, error = %e, "writer failed, recording placeholder");
                            task_fallback
                        }
                    }
                },
                fallback,
            ));
        }

        if targets.is_empty() {
            debug!("DELEGATE matched no enabled sections");
            return Vec::new();
        }

        self.emit(RunEvent::SectionsDispatched {
            run_id: run_id.to_string(),
            kind: DispatchKind::Write,
            section_ids: targets.clone(),
        });

        let patches = run_batch(jobs, &self.config.dispatch).await;
        for patch in patches {
            state.apply(patch);
        }
        for section_id in &targets {
            self.emit(RunEvent::SectionWritten {
                run_id: run_id.to_string(),
                section_id: section_id.clone(),
            });
        }
        targets
    }

    async fn run_review(
        &self,
        run_id: &str,
        state: &mut RunState,
        decision: &Decision,
    ) -> Vec<String> {
        let Some(plan) = state.plan.clone() else {
            warn!("REVIEW requested before a plan exists, skipping turn");
            return Vec::new();
        };
        let profile = state.profile.clone().unwrap_or_else(|| Profile::unknown(&state.subject));

        let mut jobs = Vec::new();
        let mut targets = Vec::new();
        for section in plan.enabled_sections() {
            if !decision.target_sections.contains(&section.id) {
                continue;
            }
            // Accepted sections are terminal; re-reviewing one could push its
            // retry counter past the budget.
            if state
                .section_status
                .get(&section.id)
                .copied()
                .is_some_and(SectionStatus::is_terminal)
            {
                debug!(section = %section.id, "section already accepted, skipping review");
                continue;
            }
            targets.push(section.id.clone());

            let request = ReviewRequest {
                section_id: section.id.clone(),
                content: state.sections_content.get(&section.id).cloned().unwrap_or_default(),
                profile: profile.clone(),
            };
            let reviewers = self.reviewers.clone();
            let section_id = section.id.clone();

            let fallback = ReviewOutcome {
                section_id: section.id.clone(),
                accepted: true,
                feedback: "review did not complete; accepting content as written".to_string(),
            };

            jobs.push(DispatchJob::new(
                section.id.as_str(),
                async move {
                    let mut verdicts = Vec::with_capacity(reviewers.len());
                    for reviewer in &reviewers {
                        let verdict = match reviewer.review(&request).await {
                            Ok(verdict) => verdict,
                            Err(e) => {
                                warn!(
                                    section = %section_id,
                                    reviewer = reviewer.name(),
                                    error = %e,
                                    "reviewer failed, accepting content"
                                );
                                ReviewVerdict::pass("reviewer unavailable; accepting content as written")
                            }
                        };
                        verdicts.push((reviewer.name().to_string(), verdict));
                    }
                    let (accepted, feedback) = combine_verdicts(&verdicts);
                    ReviewOutcome { section_id, accepted, feedback }
                },
                fallback,
            ));
        }

        if targets.is_empty() {
            debug!("REVIEW matched no enabled sections");
            return Vec::new();
        }

        self.emit(RunEvent::SectionsDispatched {
            run_id: run_id.to_string(),
            kind: DispatchKind::Review,
            section_ids: targets.clone(),
        });

        let outcomes = run_batch(jobs, &self.config.dispatch).await;
        let resolutions = apply_review_outcomes(state, &outcomes, self.config.retry_budget);
        for resolution in &resolutions {
            self.emit(RunEvent::SectionReviewed {
                run_id: run_id.to_string(),
                section_id: resolution.section_id.clone(),
                status: resolution.status.to_string(),
                forced: resolution.forced,
                retries: resolution.retries,
            });
        }
        targets
    }

    fn finish(
        &self,
        run_id: String,
        started_at: DateTime<Utc>,
        state: &RunState,
        finish_reason: FinishReason,
    ) -> RunReport {
        let artifact = state
            .plan
            .as_ref()
            .map(|plan| aggregator::aggregate(plan, &state.sections_content))
            .unwrap_or_default();

        let sections = state
            .section_status
            .iter()
            .map(|(id, status)| {
                (
                    id.clone(),
                    SectionReport {
                        status: *status,
                        retries: state.section_retries.get(id).copied().unwrap_or(0),
                        feedback: state.review_feedback.get(id).cloned().unwrap_or_default(),
                    },
                )
            })
            .collect();

        self.emit(RunEvent::RunFinished {
            run_id: run_id.clone(),
            finish_reason: finish_reason.to_string(),
        });
        info!(
            run_id = %run_id,
            reason = %finish_reason,
            iterations = state.iteration,
            artifact_bytes = artifact.len(),
            "run finished"
        );

        RunReport {
            run_id,
            subject: state.subject.clone(),
            artifact,
            finish_reason,
            iterations: state.iteration,
            sections,
            started_at,
            finished_at: Utc::now(),
        }
    }
}

/// Merge section hints, the turn's decision instructions, and accumulated
/// review feedback into the writer's instruction string. Feedback comes with
/// an explicit rewrite-from-scratch directive since content replacement is
/// wholesale.
fn build_instructions(
    section: &SectionSpec,
    decision: &Decision,
    feedback: Option<&String>,
) -> String {
    let mut out = section.instructions.clone().unwrap_or_default();
    if let Some(extra) = decision.instructions.as_deref() {
        if !extra.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(extra);
        }
    }
    if let Some(feedback) = feedback {
        if !feedback.is_empty() {
            out.push_str("\n\nPrevious review feedback to address: ");
            out.push_str(feedback);
            out.push_str("\nRewrite the section from scratch, replacing the current content entirely.");
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct StaticProfiler;

    #[async_trait]
    impl Profiler for StaticProfiler {
        async fn profile(&self, subject: &str, _source: &str) -> Result<Profile> {
            Ok(Profile::unknown(subject))
        }
    }

    struct StaticPlanner(Plan);

    #[async_trait]
    impl Planner for StaticPlanner {
        async fn plan(&self, _profile: &Profile) -> Result<Plan> {
            Ok(self.0.clone())
        }
    }

    struct EchoWriter;

    #[async_trait]
    impl crate::capabilities::SectionWriter for EchoWriter {
        async fn write(&self, request: &WriteRequest) -> Result<String> {
            Ok(format!("## {}\n\nbody of {}", request.title, request.section_id))
        }
    }

    struct UnknownActionPolicy;

    #[async_trait]
    impl DecisionPolicy for UnknownActionPolicy {
        async fn decide(&self, _state: &RunState) -> Result<Decision> {
            Ok(Decision::new(Action::Unknown("ESCALATE".to_string())))
        }
    }

    fn engine(policy: Arc<dyn DecisionPolicy>, plan: Plan) -> Orchestrator {
        Orchestrator::with_defaults(
            policy,
            Arc::new(StaticProfiler),
            Arc::new(StaticPlanner(plan)),
            WriterRouter::new(Arc::new(EchoWriter)),
            Vec::new(),
        )
    }

    #[tokio::test]
    async fn unknown_action_is_a_control_error() {
        let engine = engine(Arc::new(UnknownActionPolicy), Plan::empty());
        let result = engine.run("demo", "/tmp/demo", None).await;
        match result {
            Err(OrchestratorError::ControlError(action)) => assert_eq!(action, "ESCALATE"),
            other => panic!("expected control error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_reviewers_means_sections_pass_immediately() {
        let plan = Plan::new(vec![SectionSpec::new("a").with_title("Alpha")]);
        let engine = engine(Arc::new(crate::policy::RuleBasedPolicy), plan);
        let report = engine.run("demo", "/tmp/demo", None).await.unwrap();

        assert!(report.is_success());
        assert_eq!(report.sections["a"].status, SectionStatus::Pass);
        assert!(report.artifact.contains("## Alpha"));
    }

    #[tokio::test]
    async fn replacing_a_plan_clears_stale_section_records() {
        let new_plan = Plan::new(vec![SectionSpec::new("b")]);
        let engine = engine(Arc::new(UnknownActionPolicy), new_plan);

        let mut state = RunState::new("demo", "/tmp/demo");
        state.apply(
            StatePatch::new()
                .with_plan(Plan::new(vec![SectionSpec::new("a")]))
                .with_section_content("a", "alpha")
                .with_retries("a", 2),
        );
        state.apply(StatePatch::new().with_section_status("a", SectionStatus::Pass));

        let seeded = engine.run_plan(&mut state).await;

        assert_eq!(seeded, vec!["b"]);
        assert!(state.sections_content.is_empty());
        assert!(!state.section_status.contains_key("a"));
        assert!(!state.section_retries.contains_key("a"));
        assert_eq!(state.section_status.get("b"), Some(&SectionStatus::Pending));
    }

    #[test]
    fn instructions_merge_feedback_last() {
        let section = SectionSpec::new("usage").with_instructions("keep it short");
        let decision =
            Decision::new(Action::Delegate).with_instructions("use second person");
        let feedback = "missing example".to_string();
        let merged = build_instructions(&section, &decision, Some(&feedback));

        assert!(merged.starts_with("keep it short\nuse second person"));
        assert!(merged.contains("Previous review feedback to address: missing example"));
    }

    #[test]
    fn instructions_empty_when_nothing_provided() {
        let section = SectionSpec::new("usage");
        let decision = Decision::new(Action::Delegate);
        assert_eq!(build_instructions(&section, &decision, None), "");
    }
}
