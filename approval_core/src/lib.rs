//! Approval subsystem for the turn-based political simulation.
//!
//! Tracks how every population segment regards every actor and mutates that
//! standing through policy votes, campaigns, endorsements, news coverage and
//! turn decay. A turn resolves when [`run_turn`] is invoked on the app built
//! by [`build_headless_app`].

pub mod actions;
pub mod alignment;
pub mod audit;
mod campaign;
pub mod config;
mod decay;
mod endorsement;
mod engine;
mod error;
mod ids;
mod news;
mod policy;
mod position;
mod segments;
pub mod store;
mod turn;

use std::sync::Arc;

use bevy::prelude::*;

pub use actions::{ActionQueue, ActionSender, ApprovalAction, DrainReport, SubmitError};
pub use alignment::alignment;
pub use approval_schema::{CampaignStatus, EndorsementTier, Issue, SourceKind, VoteRole};
pub use audit::{AuditLog, AuditQuery, CompactionReport, ReputationChange, SourceMask};
pub use campaign::{Campaign, CampaignCompletion, CampaignSweep};
pub use config::{
    load_approval_config_from_env, ApprovalConfig, ApprovalConfigError, MAX_HISTORY_CAPACITY,
};
pub use decay::{decay_delta, DecayReport};
pub use endorsement::{sample_transfer, tier_for, transfer_range, Endorsement, EndorsementOutcome};
pub use engine::{ApprovalEngine, ApprovalSummary, BatchReport, SegmentEffect, SegmentFailure};
pub use error::{ApprovalError, ApprovalResult, ErrorKind, ValidationError};
pub use ids::{ActorId, CampaignId, OutletId, PolicyId, ScoreKey, SegmentId};
pub use policy::{policy_delta, role_weight};
pub use position::{
    ActorProfile, Outlet, PoliticalCube, PoliticalPosition, PolicyProposal, SalienceWeights,
    POSITION_LIMIT, SALIENCE_LIMIT,
};
pub use segments::{
    CulturalProfile, EconomicProfile, PopulationSegment, ReachScope, SegmentDatasetError,
    SegmentLocation, SegmentRegistry,
};
pub use store::{
    InMemoryScoreStore, ReputationScore, ScoreStore, StoreError, MAX_APPROVAL, MIN_APPROVAL,
    NEUTRAL_APPROVAL,
};
pub use turn::{
    ActionInbox, ApprovalEngineHandle, ApprovalTurn, PendingTurnReport, TurnReport, TurnReports,
    TURN_REPORT_RETENTION,
};

/// Construct a Bevy [`App`] that resolves approval turn boundaries for `engine`.
pub fn build_headless_app(engine: Arc<ApprovalEngine>) -> App {
    let mut app = App::new();

    app.insert_resource(ApprovalEngineHandle(engine))
        .insert_resource(ApprovalTurn::default())
        .insert_resource(ActionInbox::default())
        .insert_resource(PendingTurnReport::default())
        .insert_resource(TurnReports::default())
        .add_plugins(MinimalPlugins)
        .add_systems(
            Update,
            (
                turn::drain_actions,
                turn::complete_campaigns,
                turn::decay_scores,
                turn::compact_history,
                turn::record_turn_report,
                turn::advance_turn,
            )
                .chain(),
        );

    app
}

/// Resolve a single turn boundary.
///
/// Each call runs the chained systems configured in [`build_headless_app`]
/// (queued actions → campaign completion → decay → history compaction →
/// report → turn increment).
pub fn run_turn(app: &mut App) {
    app.update();
}
