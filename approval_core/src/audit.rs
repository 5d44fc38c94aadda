//! Audit log and rolling-history maintenance.
//!
//! Every approval mutation lands in two places: the unbounded, append-only
//! [`AuditLog`] and the bounded history on the mutated score. The log is the
//! source of truth for reporting; score histories are trimmed to capacity on
//! write and again by [`compact_histories`] on the configured turn interval.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use approval_schema::{ReputationChangeState, SourceKind};
use bitflags::bitflags;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::ids::{ActorId, ScoreKey, SegmentId};
use crate::store::ScoreStore;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct SourceMask: u32 {
        const POLICY = 1 << 0;
        const CAMPAIGN = 1 << 1;
        const ENDORSEMENT = 1 << 2;
        const NEWS = 1 << 3;
        const DECAY = 1 << 4;
    }
}

impl SourceMask {
    pub fn includes(self, source: SourceKind) -> bool {
        self.bits() & source.bit() != 0
    }
}

impl Default for SourceMask {
    fn default() -> Self {
        SourceMask::all()
    }
}

impl From<SourceKind> for SourceMask {
    fn from(source: SourceKind) -> Self {
        SourceMask::from_bits_truncate(source.bit())
    }
}

/// Immutable record of one approval mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct ReputationChange {
    pub seq: u64,
    pub actor: ActorId,
    pub segment: SegmentId,
    pub delta: f32,
    pub resulting: f32,
    pub source: SourceKind,
    pub turn: u64,
    pub metadata: BTreeMap<String, String>,
}

impl ReputationChange {
    pub fn key(&self) -> ScoreKey {
        ScoreKey::new(self.actor, self.segment)
    }

    pub fn from_state(state: &ReputationChangeState) -> Self {
        Self {
            seq: state.seq,
            actor: ActorId(state.actor),
            segment: SegmentId(state.segment),
            delta: state.delta,
            resulting: state.resulting,
            source: state.source,
            turn: state.turn,
            metadata: state.metadata.clone(),
        }
    }

    pub fn to_state(&self) -> ReputationChangeState {
        ReputationChangeState {
            seq: self.seq,
            actor: self.actor.0,
            segment: self.segment.0,
            delta: self.delta,
            resulting: self.resulting,
            source: self.source,
            turn: self.turn,
            metadata: self.metadata.clone(),
        }
    }
}

/// Audit entry before a sequence number is assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingChange {
    pub key: ScoreKey,
    pub delta: f32,
    pub resulting: f32,
    pub source: SourceKind,
    pub turn: u64,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditQuery {
    pub actor: Option<u32>,
    pub segment: Option<u32>,
    pub turns: Option<(u64, u64)>,
    pub sources: SourceMask,
    /// Keep only the most recent `limit` matches.
    pub limit: Option<usize>,
}

impl AuditQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actor(mut self, actor: ActorId) -> Self {
        self.actor = Some(actor.0);
        self
    }

    pub fn segment(mut self, segment: SegmentId) -> Self {
        self.segment = Some(segment.0);
        self
    }

    pub fn turns(mut self, turns: RangeInclusive<u64>) -> Self {
        self.turns = Some((*turns.start(), *turns.end()));
        self
    }

    pub fn turn(self, turn: u64) -> Self {
        self.turns(turn..=turn)
    }

    pub fn sources(mut self, sources: SourceMask) -> Self {
        self.sources = sources;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, change: &ReputationChange) -> bool {
        self.actor.map_or(true, |actor| change.actor.0 == actor)
            && self.segment.map_or(true, |segment| change.segment.0 == segment)
            && self
                .turns
                .map_or(true, |(start, end)| (start..=end).contains(&change.turn))
            && self.sources.includes(change.source)
    }
}

#[derive(Debug, Default)]
struct AuditInner {
    entries: Vec<ReputationChange>,
    next_seq: u64,
}

/// Append-only log of approval changes.
#[derive(Debug, Default)]
pub struct AuditLog {
    inner: Mutex<AuditInner>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a batch atomically, assigning consecutive sequence numbers in order.
    pub fn append_batch(&self, pending: Vec<PendingChange>) -> Vec<u64> {
        let mut inner = self.inner.lock();
        inner.entries.reserve(pending.len());
        pending
            .into_iter()
            .map(|change| {
                let seq = inner.next_seq;
                inner.next_seq += 1;
                inner.entries.push(ReputationChange {
                    seq,
                    actor: change.key.actor,
                    segment: change.key.segment,
                    delta: change.delta,
                    resulting: change.resulting,
                    source: change.source,
                    turn: change.turn,
                    metadata: change.metadata,
                });
                seq
            })
            .collect()
    }

    pub fn append(&self, pending: PendingChange) -> u64 {
        self.append_batch(vec![pending])[0]
    }

    pub fn query(&self, query: &AuditQuery) -> Vec<ReputationChange> {
        let inner = self.inner.lock();
        let mut matches: Vec<ReputationChange> = inner
            .entries
            .iter()
            .filter(|change| query.matches(change))
            .cloned()
            .collect();
        if let Some(limit) = query.limit {
            let skip = matches.len().saturating_sub(limit);
            matches.drain(..skip);
        }
        matches
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn next_seq(&self) -> u64 {
        self.inner.lock().next_seq
    }

    pub fn states(&self) -> Vec<ReputationChangeState> {
        self.inner
            .lock()
            .entries
            .iter()
            .map(ReputationChange::to_state)
            .collect()
    }

    pub fn restore(&self, states: &[ReputationChangeState], next_seq: u64) {
        let entries: Vec<ReputationChange> =
            states.iter().map(ReputationChange::from_state).collect();
        let floor = entries.last().map_or(0, |entry| entry.seq + 1);
        let mut inner = self.inner.lock();
        inner.entries = entries;
        inner.next_seq = next_seq.max(floor);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionReport {
    pub records_scanned: usize,
    pub records_trimmed: usize,
    pub entries_evicted: usize,
}

/// Trims every score history in `store` to `capacity`.
pub fn compact_histories(store: &dyn ScoreStore, capacity: usize) -> CompactionReport {
    let mut report = CompactionReport::default();
    for key in store.keys() {
        let mut evicted = 0usize;
        match store.update_existing(key, &mut |score| evicted = score.trim_history(capacity)) {
            Ok(true) => {
                report.records_scanned += 1;
                if evicted > 0 {
                    report.records_trimmed += 1;
                    report.entries_evicted += evicted;
                }
            }
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(
                    target: "approval.history",
                    actor = %key.actor,
                    segment = %key.segment,
                    error = %err,
                    "history.compaction_skipped"
                );
            }
        }
    }
    tracing::debug!(
        target: "approval.history",
        scanned = report.records_scanned,
        trimmed = report.records_trimmed,
        evicted = report.entries_evicted,
        "history.compacted"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryScoreStore, ReputationScore};

    fn pending(actor: u32, segment: u32, source: SourceKind, turn: u64) -> PendingChange {
        PendingChange {
            key: ScoreKey::new(ActorId(actor), SegmentId(segment)),
            delta: 1.0,
            resulting: 51.0,
            source,
            turn,
            metadata: BTreeMap::new(),
        }
    }

    fn seeded_log() -> AuditLog {
        let log = AuditLog::new();
        log.append_batch(vec![
            pending(1, 1, SourceKind::Policy, 1),
            pending(1, 2, SourceKind::Policy, 1),
            pending(2, 1, SourceKind::News, 2),
            pending(1, 1, SourceKind::Decay, 3),
            pending(1, 1, SourceKind::Campaign, 4),
        ]);
        log
    }

    #[test]
    fn sequence_numbers_are_consecutive() {
        let log = seeded_log();
        let seq = log.append(pending(3, 3, SourceKind::Endorsement, 5));
        assert_eq!(seq, 5);
        let all = log.query(&AuditQuery::new());
        let seqs: Vec<u64> = all.iter().map(|change| change.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn query_filters_combine() {
        let log = seeded_log();
        let actor_one = log.query(&AuditQuery::new().actor(ActorId(1)));
        assert_eq!(actor_one.len(), 4);

        let segment_one_early = log.query(
            &AuditQuery::new()
                .segment(SegmentId(1))
                .turns(1..=3),
        );
        assert_eq!(segment_one_early.len(), 3);

        let no_decay = log.query(
            &AuditQuery::new()
                .actor(ActorId(1))
                .sources(SourceMask::all() - SourceMask::DECAY),
        );
        assert_eq!(no_decay.len(), 3);
        assert!(no_decay.iter().all(|change| change.source != SourceKind::Decay));
    }

    #[test]
    fn limit_keeps_most_recent() {
        let log = seeded_log();
        let recent = log.query(&AuditQuery::new().actor(ActorId(1)).limit(2));
        let turns: Vec<u64> = recent.iter().map(|change| change.turn).collect();
        assert_eq!(turns, vec![3, 4]);
    }

    #[test]
    fn query_deserializes_from_reporting_json() {
        let query: AuditQuery =
            serde_json::from_str(r#"{ "actor": 2, "sources": "NEWS | DECAY" }"#)
                .expect("query json");
        assert_eq!(query.actor, Some(2));
        assert!(query.sources.includes(SourceKind::News));
        assert!(!query.sources.includes(SourceKind::Policy));
        assert_eq!(seeded_log().query(&query).len(), 1);
    }

    #[test]
    fn restore_never_reuses_sequence_numbers() {
        let log = seeded_log();
        let states = log.states();
        let restored = AuditLog::new();
        restored.restore(&states, 0);
        assert_eq!(restored.next_seq(), 5);
        assert_eq!(restored.append(pending(9, 9, SourceKind::News, 9)), 5);
    }

    #[test]
    fn compaction_trims_oversized_histories() {
        let store = InMemoryScoreStore::new();
        let key = ScoreKey::new(ActorId(1), SegmentId(1));
        let mut score = ReputationScore::neutral();
        for turn in 0..80 {
            score.apply_delta(0.01, SourceKind::Decay, turn, usize::MAX);
        }
        store.insert_if_absent(key, score).expect("insert");
        store
            .insert_if_absent(ScoreKey::new(ActorId(1), SegmentId(2)), ReputationScore::neutral())
            .expect("insert");

        let report = compact_histories(&store, 50);
        assert_eq!(report.records_scanned, 2);
        assert_eq!(report.records_trimmed, 1);
        assert_eq!(report.entries_evicted, 30);
        let trimmed = store.read(key).expect("read").expect("exists");
        assert_eq!(trimmed.history().len(), 50);
    }
}
