use std::collections::BTreeMap;

use approval_schema::{SourceKind, VoteRole};

use crate::alignment::alignment;
use crate::config::PolicyImpactConfig;
use crate::engine::{ApprovalEngine, BatchReport};
use crate::error::ApprovalResult;
use crate::ids::ActorId;
use crate::position::PolicyProposal;
use crate::segments::{PopulationSegment, ReachScope};

pub fn role_weight(role: VoteRole, config: &PolicyImpactConfig) -> f32 {
    match role {
        VoteRole::Proposer => config.proposer_weight(),
        VoteRole::Yes => config.yes_weight(),
        VoteRole::No => config.no_weight(),
        VoteRole::Abstain => config.abstain_weight(),
    }
}

/// Pre-clamp approval delta for one segment.
pub fn policy_delta(
    policy: &PolicyProposal,
    segment: &PopulationSegment,
    weight: f32,
    max_impact: f32,
) -> f32 {
    alignment(&policy.position, &segment.default_position, &segment.salience) * weight * max_impact
}

impl ApprovalEngine {
    /// Moves `actor`'s approval in every segment by how well `policy` aligns with it.
    ///
    /// Abstaining, or any role configured with a zero weight, is skipped entirely.
    pub fn apply_policy_impact(
        &self,
        actor: ActorId,
        policy: &PolicyProposal,
        role: VoteRole,
        turn: u64,
    ) -> ApprovalResult<BatchReport> {
        self.require_actor(actor)?;
        let config = self.config.policy();
        let weight = role_weight(role, config);
        if role == VoteRole::Abstain || weight == 0.0 {
            tracing::debug!(
                target: "approval.policy",
                actor = %actor,
                policy = %policy.id,
                role = role.as_str(),
                "policy.skipped"
            );
            return Ok(BatchReport::empty(actor, SourceKind::Policy, turn));
        }

        let max_impact = config.max_impact();
        let segments = self.segments.in_scope(&ReachScope::All);
        let metadata = BTreeMap::from([
            ("policy".to_string(), policy.id.to_string()),
            ("role".to_string(), role.as_str().to_string()),
        ]);
        let report = self.fan_out(actor, &segments, SourceKind::Policy, turn, &metadata, |segment| {
            policy_delta(policy, segment, weight, max_impact)
        });

        for failure in &report.failures {
            tracing::warn!(
                target: "approval.policy",
                actor = %actor,
                segment = %failure.segment,
                error = %failure.error,
                "policy.segment_failed"
            );
        }
        tracing::info!(
            target: "approval.policy",
            actor = %actor,
            policy = %policy.id,
            role = role.as_str(),
            turn,
            touched = report.touched(),
            failed = report.failures.len(),
            "policy.applied"
        );
        Ok(report)
    }
}
