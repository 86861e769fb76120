//! Deterministic, rule-based decision policy.
//!
//! Follows the natural pipeline ordering: profile, plan, write what is
//! pending or rejected, review what awaits review, finish when every enabled
//! section has been accepted. Useful as a reference policy, for offline runs,
//! and as the workhorse of the test suite; a model-backed policy implements
//! the same trait.

use async_trait::async_trait;

use scribe_models::{Action, Decision, SectionStatus};

use crate::capabilities::DecisionPolicy;
use crate::error::Result;
use crate::state::RunState;

/// Pure function of the state snapshot; holds no state of its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedPolicy;

#[async_trait]
impl DecisionPolicy for RuleBasedPolicy {
    async fn decide(&self, state: &RunState) -> Result<Decision> {
        if state.profile.is_none() {
            return Ok(Decision::new(Action::Profile).with_reasoning("no profile yet"));
        }
        let Some(plan) = &state.plan else {
            return Ok(Decision::new(Action::Plan).with_reasoning("no plan yet"));
        };

        let mut to_write = Vec::new();
        let mut to_review = Vec::new();
        for section in plan.enabled_sections() {
            match state.section_status.get(&section.id) {
                None | Some(SectionStatus::Pending | SectionStatus::Fail) => {
                    to_write.push(section.id.clone());
                }
                Some(SectionStatus::ReviewPending) => to_review.push(section.id.clone()),
                Some(SectionStatus::Pass) => {}
            }
        }

        if !to_write.is_empty() {
            Ok(Decision::new(Action::Delegate)
                .with_targets(to_write)
                .with_reasoning("sections awaiting content"))
        } else if !to_review.is_empty() {
            Ok(Decision::new(Action::Review)
                .with_targets(to_review)
                .with_reasoning("sections awaiting review"))
        } else {
            Ok(Decision::new(Action::Finish).with_reasoning("all enabled sections accepted"))
        }
    }

    fn name(&self) -> &'static str {
        "rule-based"
    }
}
