//! Peer-to-peer endorsement transfer.
//!
//! The endorser's population-weighted approval picks a tier; every segment then
//! draws its own transfer from that tier's range. Draws come from a per-segment
//! `SmallRng` derived from one base seed, so results do not depend on which
//! worker thread handles which segment.

use std::collections::BTreeMap;

use approval_schema::{EndorsementState, EndorsementTier, SourceKind};
use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::config::EndorsementConfig;
use crate::engine::{ApprovalEngine, BatchReport};
use crate::error::{ApprovalResult, ValidationError};
use crate::ids::{ActorId, SegmentId};
use crate::segments::ReachScope;

pub fn tier_for(approval: f32, config: &EndorsementConfig) -> EndorsementTier {
    if approval >= config.high_threshold() {
        EndorsementTier::High
    } else if approval >= config.mid_threshold() {
        EndorsementTier::Mid
    } else {
        EndorsementTier::Low
    }
}

/// Inclusive transfer range for `tier`.
pub fn transfer_range(tier: EndorsementTier, config: &EndorsementConfig) -> (f32, f32) {
    match tier {
        EndorsementTier::Low => config.low_range(),
        EndorsementTier::Mid => config.mid_range(),
        EndorsementTier::High => config.high_range(),
    }
}

fn segment_seed(base: u64, segment: SegmentId) -> u64 {
    base ^ u64::from(segment.0).wrapping_mul(0x9e37_79b9_7f4a_7c15)
}

pub fn sample_transfer(base_seed: u64, segment: SegmentId, range: (f32, f32)) -> f32 {
    let (low, high) = range;
    let mut rng = SmallRng::seed_from_u64(segment_seed(base_seed, segment));
    rng.gen_range(low..=high)
}

/// Summary of one applied endorsement.
#[derive(Debug, Clone, PartialEq)]
pub struct Endorsement {
    pub endorser: ActorId,
    pub endorsed: ActorId,
    pub turn: u64,
    pub tier: EndorsementTier,
    pub representative_approval: f32,
    pub segments_affected: u32,
    pub average_transfer: f32,
    pub positive: u32,
    pub negative: u32,
}

impl Endorsement {
    pub fn from_state(state: &EndorsementState) -> Self {
        Self {
            endorser: ActorId(state.endorser),
            endorsed: ActorId(state.endorsed),
            turn: state.turn,
            tier: state.tier,
            representative_approval: state.representative_approval,
            segments_affected: state.segments_affected,
            average_transfer: state.average_transfer,
            positive: state.positive,
            negative: state.negative,
        }
    }

    pub fn to_state(&self) -> EndorsementState {
        EndorsementState {
            endorser: self.endorser.0,
            endorsed: self.endorsed.0,
            turn: self.turn,
            tier: self.tier,
            representative_approval: self.representative_approval,
            segments_affected: self.segments_affected,
            average_transfer: self.average_transfer,
            positive: self.positive,
            negative: self.negative,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EndorsementOutcome {
    pub endorsement: Endorsement,
    pub report: BatchReport,
}

impl EndorsementOutcome {
    pub fn failed_segments(&self) -> Vec<SegmentId> {
        self.report.failed_segments()
    }
}

impl ApprovalEngine {
    /// Transfers approval from `endorser`'s standing to `endorsed` in every segment.
    pub fn endorse(
        &self,
        endorser: ActorId,
        endorsed: ActorId,
        turn: u64,
    ) -> ApprovalResult<EndorsementOutcome> {
        if endorser == endorsed {
            return Err(ValidationError::SelfEndorsement(endorser).into());
        }
        self.require_actor(endorsed)?;
        let representative = self
            .approval_summary(endorser, &ReachScope::All)?
            .weighted_approval;
        let config = self.config.endorsement();
        let tier = tier_for(representative, config);
        let range = transfer_range(tier, config);
        let base_seed: u64 = self.rng.lock().gen();

        let segments = self.segments.in_scope(&ReachScope::All);
        let metadata = BTreeMap::from([
            ("endorser".to_string(), endorser.to_string()),
            ("tier".to_string(), tier.as_str().to_string()),
        ]);
        let report = self.fan_out(
            endorsed,
            &segments,
            SourceKind::Endorsement,
            turn,
            &metadata,
            |segment| sample_transfer(base_seed, segment.id, range),
        );

        for failure in &report.failures {
            tracing::warn!(
                target: "approval.endorsement",
                endorser = %endorser,
                endorsed = %endorsed,
                segment = %failure.segment,
                error = %failure.error,
                "endorsement.segment_failed"
            );
        }

        let transfers = report.effects.iter().map(|effect| effect.requested);
        let total: f32 = transfers.clone().sum();
        let affected = report.effects.len();
        let endorsement = Endorsement {
            endorser,
            endorsed,
            turn,
            tier,
            representative_approval: representative,
            segments_affected: affected as u32,
            average_transfer: if affected > 0 {
                total / affected as f32
            } else {
                0.0
            },
            positive: transfers.clone().filter(|value| *value > 0.0).count() as u32,
            negative: transfers.filter(|value| *value < 0.0).count() as u32,
        };
        tracing::info!(
            target: "approval.endorsement",
            endorser = %endorser,
            endorsed = %endorsed,
            tier = tier.as_str(),
            representative,
            affected,
            average = endorsement.average_transfer,
            failed = report.failures.len(),
            "endorsement.applied"
        );
        self.endorsements.lock().push(endorsement.clone());
        Ok(EndorsementOutcome {
            endorsement,
            report,
        })
    }

    pub fn endorsements_for(&self, endorsed: ActorId) -> Vec<Endorsement> {
        self.endorsements
            .lock()
            .iter()
            .filter(|endorsement| endorsement.endorsed == endorsed)
            .cloned()
            .collect()
    }
}
