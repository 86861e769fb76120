//! Retry-bounded review loop.
//!
//! Review tasks stay pure: each one consults the configured reviewers and
//! reports an accept/reject outcome with combined feedback. The retry
//! accounting happens here, on the control thread, strictly after the
//! dispatch barrier — a rejected section increments its retry counter and is
//! force-accepted once the budget is exhausted, with its last feedback
//! retained for audit. This bounds every section to at most `retry_budget`
//! write/review round-trips regardless of reviewer behavior.

use tracing::warn;

use scribe_models::{ReviewVerdict, SectionStatus};

use crate::state::{RunState, StatePatch};

/// Outcome of one section's review pass, produced by a review task.
#[derive(Debug, Clone)]
pub struct ReviewOutcome {
    /// Section that was reviewed.
    pub section_id: String,
    /// Whether every consulted reviewer accepted the content.
    pub accepted: bool,
    /// Combined reviewer feedback.
    pub feedback: String,
}

/// How one section's review resolved after retry accounting.
#[derive(Debug, Clone)]
pub struct ReviewResolution {
    /// Section id.
    pub section_id: String,
    /// Status after applying the transition.
    pub status: SectionStatus,
    /// True when the section was accepted only because its budget ran out.
    pub forced: bool,
    /// Retry counter after this review.
    pub retries: u32,
}

/// Combine per-reviewer verdicts into one outcome.
///
/// A section fails if any reviewer rejects. Rejection feedback is labelled
/// with the reviewer's name and concatenated so the next write attempt sees
/// every complaint; on acceptance, any informational feedback is kept.
pub fn combine_verdicts(verdicts: &[(String, ReviewVerdict)]) -> (bool, String) {
    let rejections: Vec<String> = verdicts
        .iter()
        .filter(|(_, v)| !v.is_pass())
        .map(|(name, v)| {
            if v.feedback.is_empty() {
                format!("{name}: rejected without feedback")
            } else {
                format!("{name}: {}", v.feedback)
            }
        })
        .collect();

    if rejections.is_empty() {
        let notes: Vec<String> = verdicts
            .iter()
            .filter(|(_, v)| !v.feedback.is_empty())
            .map(|(name, v)| format!("{name}: {}", v.feedback))
            .collect();
        (true, notes.join(" "))
    } else {
        (false, rejections.join(" "))
    }
}

/// Apply review outcomes to the state under the retry budget.
///
/// Runs on the control thread after the barrier; this is the only place the
/// retry counters move, so they are monotone and never exceed the budget.
pub fn apply_review_outcomes(
    state: &mut RunState,
    outcomes: &[ReviewOutcome],
    retry_budget: u32,
) -> Vec<ReviewResolution> {
    let mut patch = StatePatch::new();
    let mut resolutions = Vec::with_capacity(outcomes.len());

    for outcome in outcomes {
        // A terminal section's record never moves again; dropping the outcome
        // here keeps the retry bound intact even for a redundant review.
        if state
            .section_status
            .get(&outcome.section_id)
            .copied()
            .is_some_and(SectionStatus::is_terminal)
        {
            warn!(section = %outcome.section_id, "ignoring review outcome for accepted section");
            continue;
        }
        let prior = state.section_retries.get(&outcome.section_id).copied().unwrap_or(0);

        let (status, retries, forced) = if outcome.accepted {
            (SectionStatus::Pass, prior, false)
        } else {
            let retries = prior + 1;
            if retries >= retry_budget {
                warn!(
                    section = %outcome.section_id,
                    retries,
                    "retry budget exhausted, forcing acceptance"
                );
                (SectionStatus::Pass, retries, true)
            } else {
                (SectionStatus::Fail, retries, false)
            }
        };

        patch = patch
            .with_section_status(&outcome.section_id, status)
            .with_feedback(&outcome.section_id, outcome.feedback.clone());
        if retries != prior {
            patch = patch.with_retries(&outcome.section_id, retries);
        }

        resolutions.push(ReviewResolution {
            section_id: outcome.section_id.clone(),
            status,
            forced,
            retries,
        });
    }

    state.apply(patch);
    resolutions
}
