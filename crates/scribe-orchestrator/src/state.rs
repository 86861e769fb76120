//! Run-scoped state store and merge reducer.
//!
//! `RunState` is the single mutable record of a run. It is owned by the
//! control thread; workers only ever see immutable snapshots of the pieces
//! they need and hand back `StatePatch` values, which the control thread
//! merges strictly after the dispatch barrier. Scalar fields are
//! last-write-wins; map fields merge key by key. Because concurrently
//! produced patches target disjoint keys (the dispatcher builds one task per
//! section id), merging a batch is commutative and associative, and
//! re-applying an identical patch is a no-op.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use scribe_models::{Plan, Profile, SectionStatus};

/// Coarse run phase, advanced by the decision loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No profile yet.
    Start,
    /// Profile set, no plan yet.
    Planning,
    /// Plan set; sections being written and reviewed.
    Execution,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Planning => write!(f, "planning"),
            Self::Execution => write!(f, "execution"),
        }
    }
}

/// The single mutable record of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    /// Subject identifier (e.g. repository name).
    pub subject: String,
    /// Handle to the subject's source material (e.g. a path).
    pub source: String,
    /// Profile of the subject, set at most once, replaced wholesale.
    pub profile: Option<Profile>,
    /// Section plan, immutable once set.
    pub plan: Option<Plan>,
    /// Current phase.
    pub phase: Phase,
    /// Global decision-loop turn counter; monotonically increasing.
    pub iteration: u32,
    /// Latest content per section id; replaced wholesale by each write.
    pub sections_content: BTreeMap<String, String>,
    /// Lifecycle status per enabled section id.
    pub section_status: BTreeMap<String, SectionStatus>,
    /// Combined reviewer feedback per section id.
    pub review_feedback: BTreeMap<String, String>,
    /// Review rejections seen per section id; never exceeds the retry budget.
    pub section_retries: BTreeMap<String, u32>,
}

impl RunState {
    /// Fresh state for a new run.
    pub fn new(subject: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            source: source.into(),
            profile: None,
            plan: None,
            phase: Phase::Start,
            iteration: 0,
            sections_content: BTreeMap::new(),
            section_status: BTreeMap::new(),
            review_feedback: BTreeMap::new(),
            section_retries: BTreeMap::new(),
        }
    }

    /// Merge a partial update into the state.
    pub fn apply(&mut self, patch: StatePatch) {
        if let Some(profile) = patch.profile {
            self.profile = Some(profile);
        }
        if let Some(plan) = patch.plan {
            self.plan = Some(plan);
        }
        if let Some(phase) = patch.phase {
            self.phase = phase;
        }
        if let Some(iteration) = patch.iteration {
            self.iteration = iteration;
        }
        self.sections_content.extend(patch.sections_content);
        self.section_status.extend(patch.section_status);
        self.review_feedback.extend(patch.review_feedback);
        self.section_retries.extend(patch.section_retries);
    }

    /// Drop every per-section record.
    ///
    /// Called by the control thread when a new plan replaces an existing one,
    /// so records exist only for sections of the current plan.
    pub fn clear_section_records(&mut self) {
        self.sections_content.clear();
        self.section_status.clear();
        self.review_feedback.clear();
        self.section_retries.clear();
    }

    /// Section ids currently carrying the given status, in id order.
    pub fn sections_with_status(&self, status: SectionStatus) -> Vec<String> {
        self.section_status
            .iter()
            .filter(|(_, s)| **s == status)
            .map(|(id, _)| id.clone())
            .collect()
    }
}

/// A partial state update produced by one turn or one worker task.
///
/// Map entries carry absolute values per key (never increments), which is what
/// makes re-application idempotent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatePatch {
    /// Replacement profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
    /// Replacement plan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,
    /// Phase transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    /// New global iteration value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration: Option<u32>,
    /// Content updates keyed by section id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sections_content: BTreeMap<String, String>,
    /// Status updates keyed by section id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub section_status: BTreeMap<String, SectionStatus>,
    /// Feedback updates keyed by section id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub review_feedback: BTreeMap<String, String>,
    /// Retry-counter updates keyed by section id (absolute values).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub section_retries: BTreeMap<String, u32>,
}

impl StatePatch {
    /// Empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the profile.
    #[must_use]
    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.profile = Some(profile);
        self
    }

    /// Set the plan and initialize a pending status for every enabled section
    /// (and no others), per the section-record invariant.
    #[must_use]
    pub fn with_plan(mut self, plan: Plan) -> Self {
        for section in plan.enabled_sections() {
            self.section_status.insert(section.id.clone(), SectionStatus::Pending);
        }
        self.plan = Some(plan);
        self
    }

    /// Advance the phase.
    #[must_use]
    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }

    /// Set the global iteration counter.
    #[must_use]
    pub fn with_iteration(mut self, iteration: u32) -> Self {
        self.iteration = Some(iteration);
        self
    }

    /// Replace one section's content.
    #[must_use]
    pub fn with_section_content(
        mut self,
        id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        self.sections_content.insert(id.into(), content.into());
        self
    }

    /// Set one section's status.
    #[must_use]
    pub fn with_section_status(mut self, id: impl Into<String>, status: SectionStatus) -> Self {
        self.section_status.insert(id.into(), status);
        self
    }

    /// Set one section's review feedback.
    #[must_use]
    pub fn with_feedback(mut self, id: impl Into<String>, feedback: impl Into<String>) -> Self {
        self.review_feedback.insert(id.into(), feedback.into());
        self
    }

    /// Set one section's retry counter to an absolute value.
    #[must_use]
    pub fn with_retries(mut self, id: impl Into<String>, retries: u32) -> Self {
        self.section_retries.insert(id.into(), retries);
        self
    }

    /// Section ids touched by this patch, sorted and deduplicated.
    pub fn changed_sections(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .sections_content
            .keys()
            .chain(self.section_status.keys())
            .chain(self.review_feedback.keys())
            .chain(self.section_retries.keys())
            .cloned()
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_models::SectionSpec;

    fn content_patch(id: &str, content: &str) -> StatePatch {
        StatePatch::new()
            .with_section_content(id, content)
            .with_section_status(id, SectionStatus::ReviewPending)
    }

    #[test]
    fn scalar_fields_are_last_write_wins() {
        let mut state = RunState::new("demo", "/tmp/demo");
        state.apply(StatePatch::new().with_iteration(1).with_phase(Phase::Planning));
        state.apply(StatePatch::new().with_iteration(2).with_phase(Phase::Execution));
        assert_eq!(state.iteration, 2);
        assert_eq!(state.phase, Phase::Execution);
    }

    #[test]
    fn disjoint_patches_merge_in_any_order() {
        let patches = vec![
            content_patch("a", "alpha"),
            content_patch("b", "bravo"),
            content_patch("c", "charlie"),
        ];

        let mut forward = RunState::new("demo", "/tmp/demo");
        for patch in patches.clone() {
            forward.apply(patch);
        }

        let mut reverse = RunState::new("demo", "/tmp/demo");
        for patch in patches.into_iter().rev() {
            reverse.apply(patch);
        }

        assert_eq!(forward, reverse);
        assert_eq!(forward.sections_content.len(), 3);
        assert_eq!(forward.sections_content["b"], "bravo");
    }

    #[test]
    fn reapplying_a_patch_is_a_no_op() {
        let mut state = RunState::new("demo", "/tmp/demo");
        let patch = content_patch("a", "alpha").with_retries("a", 2);
        state.apply(patch.clone());
        let snapshot = state.clone();
        state.apply(patch);
        assert_eq!(state, snapshot);
    }

    #[test]
    fn plan_patch_seeds_pending_for_enabled_only() {
        let plan = Plan::new(vec![
            SectionSpec::new("a"),
            SectionSpec::new("b").disabled(),
            SectionSpec::new("c"),
        ]);
        let mut state = RunState::new("demo", "/tmp/demo");
        state.apply(StatePatch::new().with_plan(plan).with_phase(Phase::Execution));

        assert_eq!(state.section_status.get("a"), Some(&SectionStatus::Pending));
        assert_eq!(state.section_status.get("c"), Some(&SectionStatus::Pending));
        assert!(!state.section_status.contains_key("b"));
        assert_eq!(state.sections_with_status(SectionStatus::Pending), vec!["a", "c"]);
    }

    #[test]
    fn changed_sections_union_of_map_keys() {
        let patch = content_patch("b", "x").with_feedback("a", "needs work").with_retries("a", 1);
        assert_eq!(patch.changed_sections(), vec!["a", "b"]);
    }
}
