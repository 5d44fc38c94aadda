//! Timed promotional campaigns.
//!
//! A campaign targets one segment for one actor and pays out a fixed boost
//! when it completes. At most one campaign per (actor, segment) pair is active
//! at a time; completed and cancelled campaigns are terminal.

use std::collections::{BTreeMap, HashMap};

use approval_schema::{CampaignState, CampaignStatus, SourceKind};
use rand::Rng;

use crate::audit::PendingChange;
use crate::engine::ApprovalEngine;
use crate::error::{ApprovalError, ApprovalResult, ValidationError};
use crate::ids::{ActorId, CampaignId, ScoreKey, SegmentId};
use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq)]
pub struct Campaign {
    pub id: CampaignId,
    pub actor: ActorId,
    pub segment: SegmentId,
    pub start_turn: u64,
    pub end_turn: u64,
    pub boost: u8,
    status: CampaignStatus,
}

impl Campaign {
    pub fn status(&self) -> CampaignStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == CampaignStatus::Active
    }

    pub fn is_due(&self, turn: u64) -> bool {
        self.is_active() && self.end_turn <= turn
    }

    pub fn key(&self) -> ScoreKey {
        ScoreKey::new(self.actor, self.segment)
    }

    pub fn from_state(state: &CampaignState) -> Self {
        Self {
            id: CampaignId(state.id),
            actor: ActorId(state.actor),
            segment: SegmentId(state.segment),
            start_turn: state.start_turn,
            end_turn: state.end_turn,
            boost: state.boost,
            status: state.status,
        }
    }

    pub fn to_state(&self) -> CampaignState {
        CampaignState {
            id: self.id.0,
            actor: self.actor.0,
            segment: self.segment.0,
            start_turn: self.start_turn,
            end_turn: self.end_turn,
            boost: self.boost,
            status: self.status,
        }
    }
}

/// Campaign records plus the index of active (actor, segment) pairs.
#[derive(Debug, Default)]
pub(crate) struct CampaignBook {
    campaigns: BTreeMap<CampaignId, Campaign>,
    active: HashMap<ScoreKey, CampaignId>,
    next_id: u64,
}

impl CampaignBook {
    pub(crate) fn from_states(states: &[CampaignState], next_id: u64) -> ApprovalResult<Self> {
        let mut book = CampaignBook {
            next_id,
            ..Default::default()
        };
        for state in states {
            let campaign = Campaign::from_state(state);
            if campaign.is_active() {
                if let Some(existing) = book.active.insert(campaign.key(), campaign.id) {
                    return Err(ApprovalError::CampaignConflict {
                        actor: campaign.actor,
                        segment: campaign.segment,
                        existing,
                    });
                }
            }
            book.next_id = book.next_id.max(campaign.id.0 + 1);
            book.campaigns.insert(campaign.id, campaign);
        }
        Ok(book)
    }

    pub(crate) fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Creates a campaign and moves it straight from pending to active.
    pub(crate) fn open(
        &mut self,
        key: ScoreKey,
        start_turn: u64,
        duration: u64,
        boost: u8,
    ) -> ApprovalResult<Campaign> {
        if let Some(existing) = self.active.get(&key) {
            return Err(ApprovalError::CampaignConflict {
                actor: key.actor,
                segment: key.segment,
                existing: *existing,
            });
        }
        let id = CampaignId(self.next_id);
        self.next_id += 1;
        let mut campaign = Campaign {
            id,
            actor: key.actor,
            segment: key.segment,
            start_turn,
            end_turn: start_turn.saturating_add(duration),
            boost,
            status: CampaignStatus::Pending,
        };
        campaign.status = CampaignStatus::Active;
        self.active.insert(key, id);
        self.campaigns.insert(id, campaign.clone());
        Ok(campaign)
    }

    pub(crate) fn get(&self, id: CampaignId) -> Option<&Campaign> {
        self.campaigns.get(&id)
    }

    pub(crate) fn due(&self, turn: u64) -> Vec<Campaign> {
        self.campaigns
            .values()
            .filter(|campaign| campaign.is_due(turn))
            .cloned()
            .collect()
    }

    /// Moves an active campaign into a terminal state. Returns the resulting status.
    pub(crate) fn close(&mut self, id: CampaignId, status: CampaignStatus) -> Option<CampaignStatus> {
        let campaign = self.campaigns.get_mut(&id)?;
        if campaign.is_active() {
            campaign.status = status;
            self.active.remove(&campaign.key());
        }
        Some(campaign.status)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Campaign> {
        self.campaigns.values()
    }

    pub(crate) fn states(&self) -> Vec<CampaignState> {
        self.campaigns.values().map(Campaign::to_state).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CampaignCompletion {
    pub campaign: CampaignId,
    pub actor: ActorId,
    pub segment: SegmentId,
    pub boost: u8,
    pub applied: f32,
    pub resulting: f32,
    pub seq: u64,
}

/// Outcome of completing every due campaign at a turn boundary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CampaignSweep {
    pub turn: u64,
    pub completed: Vec<CampaignCompletion>,
    pub failures: Vec<(CampaignId, StoreError)>,
}

impl ApprovalEngine {
    /// Starts a campaign with a boost drawn from the configured range.
    pub fn start_campaign(
        &self,
        actor: ActorId,
        segment: SegmentId,
        turn: u64,
    ) -> ApprovalResult<Campaign> {
        let config = self.config.campaign();
        let boost = self
            .rng
            .lock()
            .gen_range(config.boost_min()..=config.boost_max());
        self.start_campaign_with_boost(actor, segment, turn, boost)
    }

    /// Starts a campaign with a boost already decided by the caller.
    pub fn start_campaign_with_boost(
        &self,
        actor: ActorId,
        segment: SegmentId,
        turn: u64,
        boost: u8,
    ) -> ApprovalResult<Campaign> {
        self.require_actor(actor)?;
        self.require_segment(segment)?;
        let config = self.config.campaign();
        if !(config.boost_min()..=config.boost_max()).contains(&boost) {
            return Err(ValidationError::BoostOutOfRange(boost).into());
        }
        let campaign = self.campaigns.lock().open(
            ScoreKey::new(actor, segment),
            turn,
            config.duration_turns(),
            boost,
        )?;
        tracing::info!(
            target: "approval.campaign",
            campaign = %campaign.id,
            actor = %actor,
            segment = %segment,
            boost,
            end_turn = campaign.end_turn,
            "campaign.started"
        );
        Ok(campaign)
    }

    /// Completes one campaign. Returns `None` when it is no longer active.
    pub fn complete_campaign(
        &self,
        id: CampaignId,
        turn: u64,
    ) -> ApprovalResult<Option<CampaignCompletion>> {
        let mut book = self.campaigns.lock();
        let campaign = book
            .get(id)
            .cloned()
            .ok_or(ApprovalError::UnknownCampaign(id))?;
        if !campaign.is_active() {
            return Ok(None);
        }
        if campaign.end_turn > turn {
            return Err(ApprovalError::CampaignNotDue {
                id,
                end_turn: campaign.end_turn,
                turn,
            });
        }
        let completion = self.pay_out(&mut book, campaign, turn)?;
        Ok(Some(completion))
    }

    /// Completes every active campaign whose end turn has been reached.
    ///
    /// Campaigns whose payout write fails stay active and are retried next call.
    pub fn complete_due_campaigns(&self, turn: u64) -> CampaignSweep {
        let mut book = self.campaigns.lock();
        let mut sweep = CampaignSweep {
            turn,
            ..Default::default()
        };
        for campaign in book.due(turn) {
            let id = campaign.id;
            match self.pay_out(&mut book, campaign, turn) {
                Ok(completion) => sweep.completed.push(completion),
                Err(error) => {
                    tracing::warn!(
                        target: "approval.campaign",
                        campaign = %id,
                        error = %error,
                        "campaign.payout_failed"
                    );
                    sweep.failures.push((id, error));
                }
            }
        }
        if !sweep.completed.is_empty() || !sweep.failures.is_empty() {
            tracing::info!(
                target: "approval.campaign",
                turn,
                completed = sweep.completed.len(),
                failed = sweep.failures.len(),
                "campaign.sweep"
            );
        }
        sweep
    }

    fn pay_out(
        &self,
        book: &mut CampaignBook,
        campaign: Campaign,
        turn: u64,
    ) -> Result<CampaignCompletion, StoreError> {
        let id = campaign.id;
        let key = campaign.key();
        let capacity = self.config.history().capacity();
        let mut applied = None;
        self.store.upsert(key, &mut |score| {
            applied = Some(score.apply_delta(
                f32::from(campaign.boost),
                SourceKind::Campaign,
                turn,
                capacity,
            ));
        })?;
        let change = applied.ok_or_else(|| StoreError::not_applied(key))?;
        book.close(id, CampaignStatus::Completed);

        let seq = self.audit.append(PendingChange {
            key,
            delta: change.applied,
            resulting: change.resulting,
            source: SourceKind::Campaign,
            turn,
            metadata: BTreeMap::from([
                ("campaign".to_string(), id.to_string()),
                ("boost".to_string(), campaign.boost.to_string()),
            ]),
        });
        tracing::info!(
            target: "approval.campaign",
            campaign = %id,
            actor = %campaign.actor,
            segment = %campaign.segment,
            resulting = change.resulting,
            "campaign.completed"
        );
        Ok(CampaignCompletion {
            campaign: id,
            actor: campaign.actor,
            segment: campaign.segment,
            boost: campaign.boost,
            applied: change.applied,
            resulting: change.resulting,
            seq,
        })
    }

    /// Cancels an active campaign without paying out. Terminal campaigns are left as is.
    pub fn cancel_campaign(&self, id: CampaignId) -> ApprovalResult<CampaignStatus> {
        let status = self
            .campaigns
            .lock()
            .close(id, CampaignStatus::Cancelled)
            .ok_or(ApprovalError::UnknownCampaign(id))?;
        tracing::info!(
            target: "approval.campaign",
            campaign = %id,
            status = ?status,
            "campaign.cancel_requested"
        );
        Ok(status)
    }

    pub fn campaign(&self, id: CampaignId) -> Option<Campaign> {
        self.campaigns.lock().get(id).cloned()
    }

    pub fn campaigns_for(&self, actor: ActorId) -> Vec<Campaign> {
        self.campaigns
            .lock()
            .iter()
            .filter(|campaign| campaign.actor == actor)
            .cloned()
            .collect()
    }

    pub fn active_campaigns(&self) -> Vec<Campaign> {
        self.campaigns
            .lock()
            .iter()
            .filter(|campaign| campaign.is_active())
            .cloned()
            .collect()
    }
}
