//! Shared data model for the Scribe document-generation pipeline.
//!
//! These types cross the capability boundary: the orchestration engine and
//! every pluggable capability (profiler, planner, writers, reviewers, decision
//! policy) exchange them, so they live in their own crate.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured profile of the subject under documentation.
///
/// Produced by the profiling capability, set at most once per run and replaced
/// wholesale on re-profiling. All collection fields default to empty so a
/// partial profile still deserializes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Name of the subject (repository, project, module).
    pub name: String,
    /// Kind of project, e.g. "cli_tool", "library", "web_service".
    #[serde(default)]
    pub project_type: String,
    /// Primary implementation language.
    #[serde(default)]
    pub main_language: String,
    /// One-line description taken verbatim from the subject's manifest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// SPDX license identifier if one was found.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_name: Option<String>,
    /// Homepage or docs URL if explicitly listed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage_url: Option<String>,
    /// Key runtime dependencies by name.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Commands to install the project.
    #[serde(default)]
    pub install_methods: Vec<String>,
    /// CLI commands or entry points.
    #[serde(default)]
    pub commands: Vec<String>,
    /// Extracted code snippets showing usage.
    #[serde(default)]
    pub usage_snippets: Vec<String>,
    /// Configuration keys, env vars, or defaults.
    #[serde(default)]
    pub config_options: Vec<String>,
    /// Notable features of the subject.
    #[serde(default)]
    pub key_features: Vec<String>,
    /// Intended audience.
    #[serde(default = "default_audience")]
    pub audience: String,
}

fn default_audience() -> String {
    "Developers".to_string()
}

impl Profile {
    /// Fallback profile used when the profiling capability fails.
    ///
    /// Carries the subject name and nothing else, which still satisfies the
    /// profile invariant (set once, replaced wholesale).
    pub fn unknown(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            project_type: "unknown".to_string(),
            main_language: String::new(),
            description: None,
            license_name: None,
            homepage_url: None,
            dependencies: Vec::new(),
            install_methods: Vec::new(),
            commands: Vec::new(),
            usage_snippets: Vec::new(),
            config_options: Vec::new(),
            key_features: Vec::new(),
            audience: default_audience(),
        }
    }
}

/// One planned section of the final artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionSpec {
    /// Section identifier, unique within a plan (e.g. "installation").
    pub id: String,
    /// Disabled sections are excluded from all downstream processing.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Display title; falls back to the id when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Free-form hint text for the writer capability.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl SectionSpec {
    /// Create an enabled section with no title or instructions.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), enabled: true, title: None, instructions: None }
    }

    /// Set the display title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set writer instructions.
    #[must_use]
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Mark the section as excluded from processing.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Title to render, falling back to the id.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.id)
    }
}

/// Ordered list of sections to produce. Immutable once set on a run; plan
/// order is the authoritative output order of the final artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Sections in output order.
    pub sections: Vec<SectionSpec>,
}

impl Plan {
    /// Create a plan from an ordered section list.
    pub fn new(sections: Vec<SectionSpec>) -> Self {
        Self { sections }
    }

    /// The empty plan, the planner capability's failure fallback. Legitimately
    /// yields an empty artifact.
    pub fn empty() -> Self {
        Self { sections: Vec::new() }
    }

    /// Enabled sections in plan order.
    pub fn enabled_sections(&self) -> impl Iterator<Item = &SectionSpec> {
        self.sections.iter().filter(|s| s.enabled)
    }

    /// Look up a section by id.
    pub fn section(&self, id: &str) -> Option<&SectionSpec> {
        self.sections.iter().find(|s| s.id == id)
    }

    /// Whether an enabled section with this id exists.
    pub fn contains_enabled(&self, id: &str) -> bool {
        self.enabled_sections().any(|s| s.id == id)
    }
}

/// Lifecycle of one section within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionStatus {
    /// Planned but not yet written.
    Pending,
    /// Written, awaiting review.
    ReviewPending,
    /// Accepted (terminal).
    Pass,
    /// Rejected by review, eligible for a rewrite.
    Fail,
}

impl SectionStatus {
    /// Terminal statuses require no further processing.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Pass)
    }
}

impl fmt::Display for SectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::ReviewPending => write!(f, "review_pending"),
            Self::Pass => write!(f, "pass"),
            Self::Fail => write!(f, "fail"),
        }
    }
}

/// Control action chosen by the decision policy each turn.
///
/// Serialized as the uppercase action strings the policy contract uses. Any
/// unrecognized string deserializes into `Unknown` so the engine can surface a
/// control error instead of a parse failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Profile the subject.
    #[serde(rename = "PROFILE")]
    Profile,
    /// Produce a section plan from the profile.
    #[serde(rename = "PLAN")]
    Plan,
    /// Fan out write tasks over the target sections.
    #[serde(rename = "DELEGATE")]
    Delegate,
    /// Fan out review tasks over the target sections.
    #[serde(rename = "REVIEW")]
    Review,
    /// Aggregate and terminate the run.
    #[serde(rename = "FINISH")]
    Finish,
    /// Anything outside the known action set; routing this is a control error.
    #[serde(untagged)]
    Unknown(String),
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Profile => write!(f, "PROFILE"),
            Self::Plan => write!(f, "PLAN"),
            Self::Delegate => write!(f, "DELEGATE"),
            Self::Review => write!(f, "REVIEW"),
            Self::Finish => write!(f, "FINISH"),
            Self::Unknown(other) => write!(f, "{other}"),
        }
    }
}

/// One decision-loop turn's output, consumed immediately and not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// The action to route.
    pub action: Action,
    /// Why the policy chose this action.
    #[serde(default)]
    pub reasoning: String,
    /// Section ids to process for DELEGATE/REVIEW.
    #[serde(default)]
    pub target_sections: Vec<String>,
    /// Run-wide instruction augmentation for this turn's writers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

impl Decision {
    /// Create a decision with empty reasoning and no targets.
    pub fn new(action: Action) -> Self {
        Self { action, reasoning: String::new(), target_sections: Vec::new(), instructions: None }
    }

    /// Attach reasoning.
    #[must_use]
    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    /// Attach target section ids.
    #[must_use]
    pub fn with_targets(mut self, targets: Vec<String>) -> Self {
        self.target_sections = targets;
        self
    }

    /// Attach a run-wide instruction augmentation.
    #[must_use]
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }
}

/// Verdict of a single review capability over a single section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewVerdict {
    /// Accept or reject.
    pub status: ReviewStatus,
    /// Explanation; carried back to the writer on rejection.
    #[serde(default)]
    pub feedback: String,
}

/// Review outcome for one reviewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    /// Content accepted.
    Pass,
    /// Content rejected.
    Fail,
}

impl ReviewVerdict {
    /// Accepting verdict.
    pub fn pass(feedback: impl Into<String>) -> Self {
        Self { status: ReviewStatus::Pass, feedback: feedback.into() }
    }

    /// Rejecting verdict.
    pub fn fail(feedback: impl Into<String>) -> Self {
        Self { status: ReviewStatus::Fail, feedback: feedback.into() }
    }

    /// Whether the verdict accepts the content.
    pub fn is_pass(&self) -> bool {
        self.status == ReviewStatus::Pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn action_serializes_to_uppercase_strings() {
        assert_eq!(serde_json::to_value(Action::Profile).unwrap(), json!("PROFILE"));
        assert_eq!(serde_json::to_value(Action::Delegate).unwrap(), json!("DELEGATE"));
        assert_eq!(serde_json::to_value(Action::Finish).unwrap(), json!("FINISH"));
    }

    #[test]
    fn unrecognized_action_deserializes_as_unknown() {
        let action: Action = serde_json::from_value(json!("ESCALATE")).unwrap();
        assert_eq!(action, Action::Unknown("ESCALATE".to_string()));
        assert_eq!(action.to_string(), "ESCALATE");
    }

    #[test]
    fn known_action_round_trips() {
        let action: Action = serde_json::from_value(json!("REVIEW")).unwrap();
        assert_eq!(action, Action::Review);
    }

    #[test]
    fn decision_deserializes_with_defaults() {
        let decision: Decision = serde_json::from_value(json!({"action": "FINISH"})).unwrap();
        assert_eq!(decision.action, Action::Finish);
        assert!(decision.reasoning.is_empty());
        assert!(decision.target_sections.is_empty());
        assert!(decision.instructions.is_none());
    }

    #[test]
    fn section_spec_defaults_to_enabled() {
        let spec: SectionSpec = serde_json::from_value(json!({"id": "usage"})).unwrap();
        assert!(spec.enabled);
        assert_eq!(spec.display_title(), "usage");
    }

    #[test]
    fn plan_enabled_sections_preserve_order() {
        let plan = Plan::new(vec![
            SectionSpec::new("a"),
            SectionSpec::new("b").disabled(),
            SectionSpec::new("c"),
        ]);
        let ids: Vec<&str> = plan.enabled_sections().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert!(plan.contains_enabled("a"));
        assert!(!plan.contains_enabled("b"));
        assert!(plan.section("b").is_some());
    }

    #[test]
    fn unknown_profile_keeps_name() {
        let profile = Profile::unknown("demo");
        assert_eq!(profile.name, "demo");
        assert_eq!(profile.project_type, "unknown");
        assert!(profile.install_methods.is_empty());
    }

    #[test]
    fn section_status_display() {
        assert_eq!(SectionStatus::ReviewPending.to_string(), "review_pending");
        assert!(SectionStatus::Pass.is_terminal());
        assert!(!SectionStatus::Fail.is_terminal());
    }

    #[test]
    fn review_verdict_helpers() {
        assert!(ReviewVerdict::pass("ok").is_pass());
        assert!(!ReviewVerdict::fail("missing heading").is_pass());
    }
}
