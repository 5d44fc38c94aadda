//! Stateful approval engine.
//!
//! [`ApprovalEngine`] owns the segment registry, the score store, the audit log
//! and the campaign book. Effect engines live in their own modules as `impl`
//! blocks on this type and share the segment fan-out defined here.

use std::collections::BTreeMap;
use std::sync::Arc;

use approval_schema::{ActorState, ApprovalSnapshot, SnapshotHeader, SourceKind};
use parking_lot::{Mutex, RwLock};
use rand::{rngs::SmallRng, SeedableRng};
use rayon::prelude::*;

use crate::audit::{AuditLog, AuditQuery, PendingChange, ReputationChange};
use crate::campaign::CampaignBook;
use crate::config::ApprovalConfig;
use crate::endorsement::Endorsement;
use crate::error::{ApprovalError, ApprovalResult};
use crate::ids::{ActorId, ScoreKey, SegmentId};
use crate::position::{ActorProfile, PoliticalPosition};
use crate::segments::{PopulationSegment, ReachScope, SegmentRegistry};
use crate::store::{InMemoryScoreStore, ReputationScore, ScoreStore, StoreError, NEUTRAL_APPROVAL};

/// Per-segment outcome of a successful fan-out write.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentEffect {
    pub segment: SegmentId,
    pub requested: f32,
    pub applied: f32,
    pub resulting: f32,
    /// Sequence number of the audit entry written for this change.
    pub seq: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentFailure {
    pub segment: SegmentId,
    pub error: StoreError,
}

/// Result of one fan-out across segments. Failures never abort the batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub actor: ActorId,
    pub source: SourceKind,
    pub turn: u64,
    pub effects: Vec<SegmentEffect>,
    pub failures: Vec<SegmentFailure>,
}

impl BatchReport {
    pub fn empty(actor: ActorId, source: SourceKind, turn: u64) -> Self {
        Self {
            actor,
            source,
            turn,
            effects: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn failed_segments(&self) -> Vec<SegmentId> {
        self.failures.iter().map(|failure| failure.segment).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn touched(&self) -> usize {
        self.effects.len()
    }

    pub fn effect(&self, segment: SegmentId) -> Option<&SegmentEffect> {
        self.effects.iter().find(|effect| effect.segment == segment)
    }
}

/// Population-weighted view of one actor's approval over a scope.
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalSummary {
    pub actor: ActorId,
    pub segments: usize,
    pub population: u64,
    pub weighted_approval: f32,
    pub voter_population: u64,
    pub voter_weighted_approval: f32,
}

#[derive(Default)]
struct WeightedMean {
    weighted: f64,
    weight: u64,
    plain: f64,
    count: usize,
}

impl WeightedMean {
    fn push(&mut self, value: f32, weight: u64) {
        self.weighted += f64::from(value) * weight as f64;
        self.weight += weight;
        self.plain += f64::from(value);
        self.count += 1;
    }

    /// Falls back to the unweighted mean when every weight is zero.
    fn mean(&self) -> f32 {
        if self.weight > 0 {
            (self.weighted / self.weight as f64) as f32
        } else if self.count > 0 {
            (self.plain / self.count as f64) as f32
        } else {
            NEUTRAL_APPROVAL
        }
    }
}

pub struct ApprovalEngine {
    pub(crate) config: Arc<ApprovalConfig>,
    pub(crate) segments: Arc<SegmentRegistry>,
    pub(crate) store: Arc<dyn ScoreStore>,
    pub(crate) audit: AuditLog,
    pub(crate) actors: RwLock<BTreeMap<ActorId, ActorProfile>>,
    pub(crate) campaigns: Mutex<CampaignBook>,
    pub(crate) endorsements: Mutex<Vec<Endorsement>>,
    pub(crate) rng: Mutex<SmallRng>,
}

impl ApprovalEngine {
    pub fn new(segments: Arc<SegmentRegistry>, config: Arc<ApprovalConfig>) -> Self {
        Self::with_store(segments, config, Arc::new(InMemoryScoreStore::new()))
    }

    pub fn with_store(
        segments: Arc<SegmentRegistry>,
        config: Arc<ApprovalConfig>,
        store: Arc<dyn ScoreStore>,
    ) -> Self {
        let rng = SmallRng::seed_from_u64(config.seed());
        Self {
            config,
            segments,
            store,
            audit: AuditLog::new(),
            actors: RwLock::new(BTreeMap::new()),
            campaigns: Mutex::new(CampaignBook::default()),
            endorsements: Mutex::new(Vec::new()),
            rng: Mutex::new(rng),
        }
    }

    pub fn config(&self) -> &ApprovalConfig {
        &self.config
    }

    pub fn segments(&self) -> &SegmentRegistry {
        &self.segments
    }

    pub fn store(&self) -> &dyn ScoreStore {
        self.store.as_ref()
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn query_audit(&self, query: &AuditQuery) -> Vec<ReputationChange> {
        self.audit.query(query)
    }

    /// Registers an actor whose scores are created lazily on first mutation.
    pub fn register_actor(&self, profile: ActorProfile) -> ApprovalResult<()> {
        let mut actors = self.actors.write();
        if actors.contains_key(&profile.id) {
            return Err(ApprovalError::DuplicateActor(profile.id));
        }
        tracing::debug!(target: "approval.actions", actor = %profile.id, "actor.registered");
        actors.insert(profile.id, profile);
        Ok(())
    }

    /// Registers an actor and eagerly creates a score at `baseline` for every segment.
    pub fn initialize_actor(&self, profile: ActorProfile, baseline: f32) -> ApprovalResult<usize> {
        let actor = profile.id;
        self.register_actor(profile)?;
        let mut created = 0usize;
        for segment in self.segments.iter() {
            let key = ScoreKey::new(actor, segment.id);
            if self
                .store
                .insert_if_absent(key, ReputationScore::with_approval(baseline))?
            {
                created += 1;
            }
        }
        tracing::info!(
            target: "approval.actions",
            actor = %actor,
            baseline,
            created,
            "actor.initialized"
        );
        Ok(created)
    }

    pub fn actor(&self, actor: ActorId) -> Option<ActorProfile> {
        self.actors.read().get(&actor).cloned()
    }

    pub fn actor_ids(&self) -> Vec<ActorId> {
        self.actors.read().keys().copied().collect()
    }

    pub fn is_registered(&self, actor: ActorId) -> bool {
        self.actors.read().contains_key(&actor)
    }

    pub(crate) fn require_actor(&self, actor: ActorId) -> ApprovalResult<()> {
        if self.is_registered(actor) {
            Ok(())
        } else {
            Err(ApprovalError::UnknownActor(actor))
        }
    }

    pub(crate) fn require_segment(&self, segment: SegmentId) -> ApprovalResult<&PopulationSegment> {
        self.segments
            .get(segment)
            .ok_or(ApprovalError::UnknownSegment(segment))
    }

    /// Resolves a scope, rejecting explicit segment lists that name unknown ids.
    pub(crate) fn resolve_scope(&self, scope: &ReachScope) -> ApprovalResult<Vec<&PopulationSegment>> {
        if let ReachScope::Segments(ids) = scope {
            for id in ids {
                self.require_segment(*id)?;
            }
        }
        Ok(self.segments.in_scope(scope))
    }

    /// Current approval, or neutral when the pair has never been mutated.
    pub fn get_approval(&self, actor: ActorId, segment: SegmentId) -> ApprovalResult<f32> {
        self.require_actor(actor)?;
        self.require_segment(segment)?;
        let score = self.store.read(ScoreKey::new(actor, segment))?;
        Ok(score.map_or(NEUTRAL_APPROVAL, |score| score.approval()))
    }

    pub fn score(&self, actor: ActorId, segment: SegmentId) -> ApprovalResult<Option<ReputationScore>> {
        self.require_actor(actor)?;
        self.require_segment(segment)?;
        Ok(self.store.read(ScoreKey::new(actor, segment))?)
    }

    pub fn approval_summary(
        &self,
        actor: ActorId,
        scope: &ReachScope,
    ) -> ApprovalResult<ApprovalSummary> {
        self.require_actor(actor)?;
        let segments = self.resolve_scope(scope)?;
        let mut everyone = WeightedMean::default();
        let mut voters = WeightedMean::default();
        for segment in &segments {
            let approval = self
                .store
                .read(ScoreKey::new(actor, segment.id))?
                .map_or(NEUTRAL_APPROVAL, |score| score.approval());
            everyone.push(approval, segment.population);
            if segment.voting_eligible {
                voters.push(approval, segment.population);
            }
        }
        Ok(ApprovalSummary {
            actor,
            segments: segments.len(),
            population: everyone.weight,
            weighted_approval: everyone.mean(),
            voter_population: voters.weight,
            voter_weighted_approval: voters.mean(),
        })
    }

    /// Applies `delta_for(segment)` to `actor`'s score in every segment, in parallel.
    ///
    /// Store failures are collected per segment; successful writes are audited
    /// as one batch in ascending segment order.
    pub(crate) fn fan_out<F>(
        &self,
        actor: ActorId,
        segments: &[&PopulationSegment],
        source: SourceKind,
        turn: u64,
        metadata: &BTreeMap<String, String>,
        delta_for: F,
    ) -> BatchReport
    where
        F: Fn(&PopulationSegment) -> f32 + Sync,
    {
        let capacity = self.config.history().capacity();
        let store = self.store.as_ref();
        let outcomes: Vec<Result<SegmentEffect, SegmentFailure>> = segments
            .par_iter()
            .map(|&segment| {
                let key = ScoreKey::new(actor, segment.id);
                let delta = delta_for(segment);
                let mut applied = None;
                let fail = |error: StoreError| SegmentFailure {
                    segment: segment.id,
                    error,
                };
                store
                    .upsert(key, &mut |score| {
                        applied = Some(score.apply_delta(delta, source, turn, capacity));
                    })
                    .map_err(fail)?;
                let change = applied.ok_or_else(|| fail(StoreError::not_applied(key)))?;
                tracing::trace!(
                    target: "approval.history",
                    actor = %actor,
                    segment = %segment.id,
                    source = source.as_str(),
                    previous = change.previous,
                    resulting = change.resulting,
                    "score.updated"
                );
                Ok(SegmentEffect {
                    segment: segment.id,
                    requested: change.requested,
                    applied: change.applied,
                    resulting: change.resulting,
                    seq: 0,
                })
            })
            .collect();

        let mut report = BatchReport::empty(actor, source, turn);
        for outcome in outcomes {
            match outcome {
                Ok(effect) => report.effects.push(effect),
                Err(failure) => report.failures.push(failure),
            }
        }
        report.effects.sort_by_key(|effect| effect.segment);
        report.failures.sort_by_key(|failure| failure.segment);

        let pending = report
            .effects
            .iter()
            .map(|effect| {
                let mut metadata = metadata.clone();
                if (effect.requested - effect.applied).abs() > f32::EPSILON {
                    metadata.insert("requested_delta".to_string(), effect.requested.to_string());
                }
                PendingChange {
                    key: ScoreKey::new(actor, effect.segment),
                    delta: effect.applied,
                    resulting: effect.resulting,
                    source,
                    turn,
                    metadata,
                }
            })
            .collect();
        let seqs = self.audit.append_batch(pending);
        for (effect, seq) in report.effects.iter_mut().zip(seqs) {
            effect.seq = seq;
        }
        report
    }

    /// Captures every score, campaign, endorsement and audit entry.
    pub fn snapshot(&self, turn: u64) -> ApprovalSnapshot {
        let actors: Vec<ActorState> = self
            .actors
            .read()
            .values()
            .map(|profile| ActorState {
                id: profile.id.0,
                position: profile.position.as_ref().map(PoliticalPosition::to_state),
            })
            .collect();
        let scores: Vec<_> = self
            .store
            .records()
            .into_iter()
            .map(|(key, score)| score.to_state(key))
            .collect();
        let (campaigns, next_campaign_id) = {
            let book = self.campaigns.lock();
            (book.states(), book.next_id())
        };
        let endorsements: Vec<_> = self
            .endorsements
            .lock()
            .iter()
            .map(Endorsement::to_state)
            .collect();
        let audit = self.audit.states();
        ApprovalSnapshot {
            header: SnapshotHeader::new(turn, scores.len(), campaigns.len(), audit.len()),
            actors,
            scores,
            campaigns,
            endorsements,
            audit,
            next_campaign_id,
            next_audit_seq: self.audit.next_seq(),
        }
    }

    /// Replaces all mutable state with `snapshot`. Nothing changes if validation fails.
    pub fn restore_snapshot(&self, snapshot: &ApprovalSnapshot) -> ApprovalResult<()> {
        let mut actors = BTreeMap::new();
        for state in &snapshot.actors {
            let mut profile = ActorProfile::new(ActorId(state.id));
            if let Some(position) = &state.position {
                profile = profile.with_position(PoliticalPosition::from_state(position)?);
            }
            actors.insert(profile.id, profile);
        }
        let capacity = self.config.history().capacity();
        let scores: Vec<_> = snapshot
            .scores
            .iter()
            .map(|state| {
                let (key, mut score) = ReputationScore::from_state(state);
                score.trim_history(capacity);
                (key, score)
            })
            .collect();
        for (key, _) in &scores {
            self.require_segment(key.segment)?;
        }
        let book = CampaignBook::from_states(&snapshot.campaigns, snapshot.next_campaign_id)?;
        let endorsements: Vec<_> = snapshot
            .endorsements
            .iter()
            .map(Endorsement::from_state)
            .collect();

        self.store.replace_all(scores)?;
        *self.actors.write() = actors;
        *self.campaigns.lock() = book;
        *self.endorsements.lock() = endorsements;
        self.audit.restore(&snapshot.audit, snapshot.next_audit_seq);
        tracing::info!(
            target: "approval.history",
            turn = snapshot.header.turn,
            scores = snapshot.scores.len(),
            campaigns = snapshot.campaigns.len(),
            audit = snapshot.audit.len(),
            "snapshot.restored"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use approval_schema::{
        ClassTier, Gender, HistoryEntryState, PositionState, PropertyStatus,
        ReputationScoreState, SegmentRecord, SettlementKind,
    };

    use super::*;

    fn record(id: u32, population: u64, voting_eligible: bool) -> SegmentRecord {
        SegmentRecord {
            id,
            population,
            region: "coast".to_string(),
            settlement: SettlementKind::Urban,
            occupation: "clerk".to_string(),
            class_tier: ClassTier::Middle,
            property: PropertyStatus::Renter,
            gender: Gender::Other,
            ethnicity: "mixed".to_string(),
            religion: "none".to_string(),
            voting_eligible,
            default_position: PositionState::default(),
            salience: BTreeMap::new(),
        }
    }

    fn engine() -> ApprovalEngine {
        let registry = SegmentRegistry::from_records(&[
            record(1, 300, true),
            record(2, 100, false),
            record(3, 0, true),
        ])
        .expect("valid registry");
        let engine = ApprovalEngine::new(Arc::new(registry), ApprovalConfig::builtin());
        engine
            .register_actor(ActorProfile::new(ActorId(1)))
            .expect("first registration");
        engine
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let engine = engine();
        let err = engine
            .get_approval(ActorId(9), SegmentId(1))
            .expect_err("actor 9 was never registered");
        assert!(matches!(err, ApprovalError::UnknownActor(ActorId(9))));
        let err = engine
            .get_approval(ActorId(1), SegmentId(42))
            .expect_err("segment 42 is not in the dataset");
        assert!(matches!(err, ApprovalError::UnknownSegment(SegmentId(42))));
    }

    #[test]
    fn unmutated_pair_reads_neutral_without_creating_a_record() {
        let engine = engine();
        assert_eq!(engine.get_approval(ActorId(1), SegmentId(2)).unwrap(), 50.0);
        assert!(engine.store().is_empty());
    }

    #[test]
    fn duplicate_registration_is_a_conflict() {
        let engine = engine();
        let err = engine
            .register_actor(ActorProfile::new(ActorId(1)))
            .expect_err("already registered");
        assert_eq!(err.kind(), crate::error::ErrorKind::Conflict);
    }

    #[test]
    fn summary_weights_by_population_and_voters() {
        let engine = engine();
        engine
            .store()
            .insert_if_absent(
                ScoreKey::new(ActorId(1), SegmentId(1)),
                ReputationScore::with_approval(70.0),
            )
            .unwrap();
        engine
            .store()
            .insert_if_absent(
                ScoreKey::new(ActorId(1), SegmentId(2)),
                ReputationScore::with_approval(30.0),
            )
            .unwrap();

        let summary = engine
            .approval_summary(ActorId(1), &ReachScope::All)
            .expect("summary");
        assert_eq!(summary.segments, 3);
        assert_eq!(summary.population, 400);
        // (70 * 300 + 30 * 100 + 50 * 0) / 400
        assert!((summary.weighted_approval - 60.0).abs() < 1e-4);
        assert_eq!(summary.voter_population, 300);
        assert!((summary.voter_weighted_approval - 70.0).abs() < 1e-4);
    }

    #[test]
    fn empty_scope_summary_is_neutral() {
        let engine = engine();
        let summary = engine
            .approval_summary(ActorId(1), &ReachScope::Region("inland".to_string()))
            .expect("summary");
        assert_eq!(summary.segments, 0);
        assert_eq!(summary.population, 0);
        assert_eq!(summary.weighted_approval, 50.0);
    }

    #[test]
    fn initialize_actor_creates_baseline_records() {
        let engine = engine();
        let created = engine
            .initialize_actor(ActorProfile::new(ActorId(2)), 62.0)
            .expect("initialize");
        assert_eq!(created, 3);
        assert_eq!(engine.get_approval(ActorId(2), SegmentId(3)).unwrap(), 62.0);
        assert!(engine.audit().is_empty());
    }

    #[test]
    fn fan_out_audits_in_segment_order() {
        let engine = engine();
        let segments = engine.segments.in_scope(&ReachScope::All);
        let report = engine.fan_out(
            ActorId(1),
            &segments,
            SourceKind::News,
            4,
            &BTreeMap::new(),
            |segment| segment.id.0 as f32 * 20.0,
        );
        assert!(report.is_complete());
        assert_eq!(report.touched(), 3);
        let clamped = report.effect(SegmentId(3)).expect("segment 3");
        assert!((clamped.requested - 60.0).abs() < 1e-6);
        assert!((clamped.applied - 50.0).abs() < 1e-6);

        let entries = engine.query_audit(&AuditQuery::new());
        let segments: Vec<u32> = entries.iter().map(|entry| entry.segment.0).collect();
        assert_eq!(segments, vec![1, 2, 3]);
        assert_eq!(
            entries[2].metadata.get("requested_delta").map(String::as_str),
            Some("60")
        );
    }

    #[test]
    fn restored_history_is_trimmed_to_capacity() {
        let engine = engine();
        let history: Vec<_> = (0..80u64)
            .map(|turn| HistoryEntryState {
                turn,
                delta: 0.5,
                resulting: 50.5,
                source: SourceKind::News,
            })
            .collect();
        let scores = vec![ReputationScoreState {
            actor: 1,
            segment: 2,
            approval: 50.5,
            last_decay_turn: None,
            history,
        }];
        let snapshot = ApprovalSnapshot {
            header: SnapshotHeader::new(80, scores.len(), 0, 0),
            actors: vec![ActorState {
                id: 1,
                position: None,
            }],
            scores,
            ..Default::default()
        };

        engine.restore_snapshot(&snapshot).expect("restores");
        let score = engine
            .score(ActorId(1), SegmentId(2))
            .unwrap()
            .expect("restored record");
        let capacity = engine.config().history().capacity();
        assert_eq!(score.history().len(), capacity);
        // oldest entries are the ones evicted
        assert_eq!(score.history().front().map(|entry| entry.turn), Some(80 - capacity as u64));
    }
}
