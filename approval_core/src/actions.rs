//! Inbox for player-triggered effects submitted during a turn.
//!
//! Any thread can hold an [`ActionSender`]; the turn boundary drains the
//! queue into the engine before campaigns complete and decay runs.

use approval_schema::{ActionRecord, VoteRole};
use crossbeam_channel::{unbounded, Receiver, Sender, TrySendError};

use crate::engine::ApprovalEngine;
use crate::error::{ApprovalError, ValidationError};
use crate::ids::{ActorId, CampaignId, OutletId, PolicyId, SegmentId};
use crate::position::{ActorProfile, Outlet, PoliticalPosition, PolicyProposal};
use crate::segments::ReachScope;

#[derive(Debug, Clone, PartialEq)]
pub enum ApprovalAction {
    RegisterActor(ActorProfile),
    PolicyVote {
        actor: ActorId,
        policy: PolicyProposal,
        role: VoteRole,
    },
    Endorse {
        endorser: ActorId,
        endorsed: ActorId,
    },
    PublishNews {
        outlet: Outlet,
        scope: ReachScope,
    },
    StartCampaign {
        actor: ActorId,
        segment: SegmentId,
        boost: Option<u8>,
    },
    CancelCampaign(CampaignId),
}

impl ApprovalAction {
    pub fn label(&self) -> &'static str {
        match self {
            ApprovalAction::RegisterActor(_) => "register_actor",
            ApprovalAction::PolicyVote { .. } => "policy_vote",
            ApprovalAction::Endorse { .. } => "endorse",
            ApprovalAction::PublishNews { .. } => "publish_news",
            ApprovalAction::StartCampaign { .. } => "start_campaign",
            ApprovalAction::CancelCampaign(_) => "cancel_campaign",
        }
    }

    /// Validates a submitted record into a domain action.
    pub fn from_record(record: &ActionRecord) -> Result<Self, ValidationError> {
        let action = match record {
            ActionRecord::RegisterActor { actor, position } => {
                let mut profile = ActorProfile::new(ActorId(*actor));
                if let Some(position) = position {
                    profile = profile.with_position(PoliticalPosition::from_state(position)?);
                }
                ApprovalAction::RegisterActor(profile)
            }
            ActionRecord::PolicyVote {
                actor,
                policy,
                position,
                role,
            } => ApprovalAction::PolicyVote {
                actor: ActorId(*actor),
                policy: PolicyProposal::new(
                    PolicyId(*policy),
                    PoliticalPosition::from_state(position)?,
                ),
                role: *role,
            },
            ActionRecord::Endorse { endorser, endorsed } => ApprovalAction::Endorse {
                endorser: ActorId(*endorser),
                endorsed: ActorId(*endorsed),
            },
            ActionRecord::PublishNews {
                outlet,
                owner,
                position,
                scope,
            } => ApprovalAction::PublishNews {
                outlet: Outlet::new(
                    OutletId(*outlet),
                    ActorId(*owner),
                    PoliticalPosition::from_state(position)?,
                ),
                scope: ReachScope::from_state(scope),
            },
            ActionRecord::StartCampaign {
                actor,
                segment,
                boost,
            } => ApprovalAction::StartCampaign {
                actor: ActorId(*actor),
                segment: SegmentId(*segment),
                boost: *boost,
            },
            ActionRecord::CancelCampaign { campaign } => {
                ApprovalAction::CancelCampaign(CampaignId(*campaign))
            }
        };
        Ok(action)
    }

    /// Applies the action at `turn`. Returns how many segment writes failed.
    pub fn apply(self, engine: &ApprovalEngine, turn: u64) -> Result<usize, ApprovalError> {
        match self {
            ApprovalAction::RegisterActor(profile) => {
                engine.register_actor(profile)?;
                Ok(0)
            }
            ApprovalAction::PolicyVote {
                actor,
                policy,
                role,
            } => Ok(engine
                .apply_policy_impact(actor, &policy, role, turn)?
                .failures
                .len()),
            ApprovalAction::Endorse { endorser, endorsed } => Ok(engine
                .endorse(endorser, endorsed, turn)?
                .report
                .failures
                .len()),
            ApprovalAction::PublishNews { outlet, scope } => Ok(engine
                .apply_news_impact(&outlet, &scope, turn)?
                .failures
                .len()),
            ApprovalAction::StartCampaign {
                actor,
                segment,
                boost,
            } => {
                match boost {
                    Some(boost) => engine.start_campaign_with_boost(actor, segment, turn, boost)?,
                    None => engine.start_campaign(actor, segment, turn)?,
                };
                Ok(0)
            }
            ApprovalAction::CancelCampaign(id) => {
                engine.cancel_campaign(id)?;
                Ok(0)
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("approval action inbox is closed")]
    Closed,
}

/// Cloneable handle for submitting actions from any thread.
#[derive(Debug, Clone)]
pub struct ActionSender {
    sender: Sender<ApprovalAction>,
}

impl ActionSender {
    pub fn submit(&self, action: ApprovalAction) -> Result<(), SubmitError> {
        self.sender.try_send(action).map_err(|err| match err {
            TrySendError::Full(_) | TrySendError::Disconnected(_) => SubmitError::Closed,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrainReport {
    pub turn: u64,
    pub applied: usize,
    pub rejected: Vec<(&'static str, String)>,
    pub segment_failures: usize,
}

#[derive(Debug)]
pub struct ActionQueue {
    sender: Sender<ApprovalAction>,
    receiver: Receiver<ApprovalAction>,
}

impl Default for ActionQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionQueue {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    pub fn sender(&self) -> ActionSender {
        ActionSender {
            sender: self.sender.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Applies every queued action in submission order.
    pub fn drain(&self, engine: &ApprovalEngine, turn: u64) -> DrainReport {
        let mut report = DrainReport {
            turn,
            ..Default::default()
        };
        for action in self.receiver.try_iter() {
            let label = action.label();
            match action.apply(engine, turn) {
                Ok(failures) => {
                    report.applied += 1;
                    report.segment_failures += failures;
                }
                Err(err) => {
                    tracing::warn!(
                        target: "approval.actions",
                        action = label,
                        turn,
                        kind = %err.kind(),
                        error = %err,
                        "action.rejected"
                    );
                    report.rejected.push((label, err.to_string()));
                }
            }
        }
        if report.applied > 0 || !report.rejected.is_empty() {
            tracing::debug!(
                target: "approval.actions",
                turn,
                applied = report.applied,
                rejected = report.rejected.len(),
                "actions.drained"
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use approval_schema::{CubeState, PositionState, ReachScopeState};

    use super::*;

    #[test]
    fn invalid_position_is_rejected_at_submission() {
        let record = ActionRecord::PublishNews {
            outlet: 1,
            owner: 2,
            position: PositionState {
                cube: CubeState {
                    economic: 14.0,
                    authority: 0.0,
                    social: 0.0,
                },
                issues: Default::default(),
            },
            scope: ReachScopeState::All,
        };
        let err = ApprovalAction::from_record(&record).expect_err("economic axis too high");
        assert!(matches!(err, ValidationError::OutOfRange { .. }));
    }

    #[test]
    fn senders_feed_one_queue() {
        let queue = ActionQueue::new();
        let first = queue.sender();
        let second = first.clone();
        first
            .submit(ApprovalAction::CancelCampaign(CampaignId(1)))
            .expect("queue is open");
        std::thread::spawn(move || {
            second
                .submit(ApprovalAction::CancelCampaign(CampaignId(2)))
                .expect("queue is open");
        })
        .join()
        .expect("sender thread");
        assert_eq!(queue.len(), 2);
    }
}
