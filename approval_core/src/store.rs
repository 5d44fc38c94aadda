use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use approval_schema::{HistoryEntryState, ReputationScoreState, SourceKind};
use parking_lot::{Mutex, RwLock};
use thiserror::Error;

use crate::ids::{ActorId, ScoreKey, SegmentId};

pub const NEUTRAL_APPROVAL: f32 = 50.0;
pub const MIN_APPROVAL: f32 = 0.0;
pub const MAX_APPROVAL: f32 = 100.0;

pub fn clamp_approval(value: f32) -> f32 {
    if value.is_nan() {
        return NEUTRAL_APPROVAL;
    }
    value.clamp(MIN_APPROVAL, MAX_APPROVAL)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryEntry {
    pub turn: u64,
    pub delta: f32,
    pub resulting: f32,
    pub source: SourceKind,
}

impl HistoryEntry {
    fn from_state(state: &HistoryEntryState) -> Self {
        Self {
            turn: state.turn,
            delta: state.delta,
            resulting: state.resulting,
            source: state.source,
        }
    }

    fn to_state(self) -> HistoryEntryState {
        HistoryEntryState {
            turn: self.turn,
            delta: self.delta,
            resulting: self.resulting,
            source: self.source,
        }
    }
}

/// Outcome of a single clamped mutation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AppliedChange {
    pub previous: f32,
    pub requested: f32,
    pub applied: f32,
    pub resulting: f32,
}

impl AppliedChange {
    pub fn was_clamped(&self) -> bool {
        (self.requested - self.applied).abs() > f32::EPSILON
    }
}

/// Approval of one actor within one segment, plus its rolling change history.
#[derive(Debug, Clone, PartialEq)]
pub struct ReputationScore {
    approval: f32,
    history: VecDeque<HistoryEntry>,
    last_decay_turn: Option<u64>,
}

impl Default for ReputationScore {
    fn default() -> Self {
        Self::neutral()
    }
}

impl ReputationScore {
    pub fn neutral() -> Self {
        Self::with_approval(NEUTRAL_APPROVAL)
    }

    pub fn with_approval(approval: f32) -> Self {
        Self {
            approval: clamp_approval(approval),
            history: VecDeque::new(),
            last_decay_turn: None,
        }
    }

    pub fn approval(&self) -> f32 {
        self.approval
    }

    pub fn history(&self) -> &VecDeque<HistoryEntry> {
        &self.history
    }

    pub fn last_decay_turn(&self) -> Option<u64> {
        self.last_decay_turn
    }

    pub fn decayed_at(&self, turn: u64) -> bool {
        self.last_decay_turn == Some(turn)
    }

    /// Adds `delta`, clamps into `[0, 100]` and records the applied change.
    pub fn apply_delta(
        &mut self,
        delta: f32,
        source: SourceKind,
        turn: u64,
        history_capacity: usize,
    ) -> AppliedChange {
        let previous = self.approval;
        let requested = if delta.is_finite() { delta } else { 0.0 };
        let resulting = clamp_approval(previous + requested);
        self.approval = resulting;
        let applied = resulting - previous;
        self.push_history(
            HistoryEntry {
                turn,
                delta: applied,
                resulting,
                source,
            },
            history_capacity,
        );
        AppliedChange {
            previous,
            requested,
            applied,
            resulting,
        }
    }

    pub fn mark_decayed(&mut self, turn: u64) {
        self.last_decay_turn = Some(turn);
    }

    fn push_history(&mut self, entry: HistoryEntry, capacity: usize) {
        self.history.push_back(entry);
        self.trim_history(capacity);
    }

    /// Evicts oldest entries beyond `capacity`. Returns how many were dropped.
    pub fn trim_history(&mut self, capacity: usize) -> usize {
        let excess = self.history.len().saturating_sub(capacity);
        self.history.drain(..excess);
        excess
    }

    pub fn from_state(state: &ReputationScoreState) -> (ScoreKey, Self) {
        let key = ScoreKey::new(ActorId(state.actor), SegmentId(state.segment));
        let score = Self {
            approval: clamp_approval(state.approval),
            history: state.history.iter().map(HistoryEntry::from_state).collect(),
            last_decay_turn: state.last_decay_turn,
        };
        (key, score)
    }

    pub fn to_state(&self, key: ScoreKey) -> ReputationScoreState {
        ReputationScoreState {
            actor: key.actor.0,
            segment: key.segment.0,
            approval: self.approval,
            last_decay_turn: self.last_decay_turn,
            history: self.history.iter().map(|entry| entry.to_state()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("score record {}/{} is unavailable: {reason}", .key.actor, .key.segment)]
    Unavailable { key: ScoreKey, reason: String },
    #[error("score store rejected write for {}/{}: {reason}", .key.actor, .key.segment)]
    WriteRejected { key: ScoreKey, reason: String },
}

impl StoreError {
    pub(crate) fn not_applied(key: ScoreKey) -> Self {
        StoreError::WriteRejected {
            key,
            reason: "write acknowledged without running the update".to_string(),
        }
    }
}

/// Storage seam for reputation records.
///
/// Implementations must serialise read-modify-write on a single key; callers
/// fan out across keys from many threads at once.
pub trait ScoreStore: Send + Sync {
    fn read(&self, key: ScoreKey) -> Result<Option<ReputationScore>, StoreError>;

    /// Applies `op` under the record lock, creating a neutral record first if absent.
    fn upsert(
        &self,
        key: ScoreKey,
        op: &mut dyn FnMut(&mut ReputationScore),
    ) -> Result<(), StoreError>;

    /// Applies `op` only if the record exists. Returns whether it did.
    fn update_existing(
        &self,
        key: ScoreKey,
        op: &mut dyn FnMut(&mut ReputationScore),
    ) -> Result<bool, StoreError>;

    /// Inserts `score` unless a record already exists. Returns whether it inserted.
    fn insert_if_absent(&self, key: ScoreKey, score: ReputationScore) -> Result<bool, StoreError>;

    /// All keys, sorted.
    fn keys(&self) -> Vec<ScoreKey>;

    /// All records, sorted by key.
    fn records(&self) -> Vec<(ScoreKey, ReputationScore)>;

    fn replace_all(&self, records: Vec<(ScoreKey, ReputationScore)>) -> Result<(), StoreError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

type SharedRecord = Arc<Mutex<ReputationScore>>;

/// Map of independently locked records.
#[derive(Debug, Default)]
pub struct InMemoryScoreStore {
    records: RwLock<HashMap<ScoreKey, SharedRecord>>,
}

impl InMemoryScoreStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, key: ScoreKey) -> Option<SharedRecord> {
        self.records.read().get(&key).cloned()
    }

    fn record_or_insert(
        &self,
        key: ScoreKey,
        initial: impl FnOnce() -> ReputationScore,
    ) -> SharedRecord {
        if let Some(record) = self.record(key) {
            return record;
        }
        let mut guard = self.records.write();
        Arc::clone(
            guard
                .entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(initial()))),
        )
    }
}

impl ScoreStore for InMemoryScoreStore {
    fn read(&self, key: ScoreKey) -> Result<Option<ReputationScore>, StoreError> {
        Ok(self.record(key).map(|record| record.lock().clone()))
    }

    fn upsert(
        &self,
        key: ScoreKey,
        op: &mut dyn FnMut(&mut ReputationScore),
    ) -> Result<(), StoreError> {
        let record = self.record_or_insert(key, ReputationScore::neutral);
        let mut guard = record.lock();
        op(&mut guard);
        Ok(())
    }

    fn update_existing(
        &self,
        key: ScoreKey,
        op: &mut dyn FnMut(&mut ReputationScore),
    ) -> Result<bool, StoreError> {
        let Some(record) = self.record(key) else {
            return Ok(false);
        };
        let mut guard = record.lock();
        op(&mut guard);
        Ok(true)
    }

    fn insert_if_absent(&self, key: ScoreKey, score: ReputationScore) -> Result<bool, StoreError> {
        let mut guard = self.records.write();
        if guard.contains_key(&key) {
            return Ok(false);
        }
        guard.insert(key, Arc::new(Mutex::new(score)));
        Ok(true)
    }

    fn keys(&self) -> Vec<ScoreKey> {
        let mut keys: Vec<_> = self.records.read().keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    fn records(&self) -> Vec<(ScoreKey, ReputationScore)> {
        let guard = self.records.read();
        let mut records: Vec<_> = guard
            .iter()
            .map(|(key, record)| (*key, record.lock().clone()))
            .collect();
        records.sort_unstable_by_key(|(key, _)| *key);
        records
    }

    fn replace_all(&self, records: Vec<(ScoreKey, ReputationScore)>) -> Result<(), StoreError> {
        let rebuilt = records
            .into_iter()
            .map(|(key, score)| (key, Arc::new(Mutex::new(score))))
            .collect();
        *self.records.write() = rebuilt;
        Ok(())
    }

    fn len(&self) -> usize {
        self.records.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(actor: u32, segment: u32) -> ScoreKey {
        ScoreKey::new(ActorId(actor), SegmentId(segment))
    }

    #[test]
    fn apply_delta_clamps_and_reports_applied_change() {
        let mut score = ReputationScore::with_approval(95.0);
        let change = score.apply_delta(12.0, SourceKind::Policy, 3, 50);
        assert_eq!(change.resulting, 100.0);
        assert!((change.applied - 5.0).abs() < 1e-6);
        assert!(change.was_clamped());
        assert_eq!(score.history().len(), 1);

        let change = score.apply_delta(-250.0, SourceKind::News, 4, 50);
        assert_eq!(change.resulting, 0.0);
        assert_eq!(score.approval(), 0.0);
    }

    #[test]
    fn history_evicts_oldest_beyond_capacity() {
        let mut score = ReputationScore::neutral();
        for turn in 0..60u64 {
            score.apply_delta(0.1, SourceKind::Campaign, turn, 50);
        }
        assert_eq!(score.history().len(), 50);
        assert_eq!(score.history().front().map(|entry| entry.turn), Some(10));
        assert_eq!(score.history().back().map(|entry| entry.turn), Some(59));
    }

    #[test]
    fn upsert_creates_neutral_record() {
        let store = InMemoryScoreStore::new();
        let mut seen = None;
        store
            .upsert(key(1, 2), &mut |score| seen = Some(score.approval()))
            .expect("in-memory store does not fail");
        assert_eq!(seen, Some(NEUTRAL_APPROVAL));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn update_existing_skips_missing_records() {
        let store = InMemoryScoreStore::new();
        let touched = store
            .update_existing(key(1, 2), &mut |score| score.mark_decayed(1))
            .expect("in-memory store does not fail");
        assert!(!touched);
        assert!(store.is_empty());
    }

    #[test]
    fn concurrent_upserts_on_one_key_do_not_lose_writes() {
        let store = Arc::new(InMemoryScoreStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for turn in 0..25u64 {
                        store
                            .upsert(key(7, 7), &mut |score| {
                                score.apply_delta(0.1, SourceKind::Endorsement, turn, 500);
                            })
                            .expect("in-memory store does not fail");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("worker thread panicked");
        }
        let score = store.read(key(7, 7)).unwrap().expect("record exists");
        assert!((score.approval() - 70.0).abs() < 1e-2);
        assert_eq!(score.history().len(), 200);
    }

    #[test]
    fn state_round_trip_keeps_decay_marker() {
        let mut score = ReputationScore::with_approval(61.0);
        score.mark_decayed(9);
        let state = score.to_state(key(4, 5));
        let (restored_key, restored) = ReputationScore::from_state(&state);
        assert_eq!(restored_key, key(4, 5));
        assert_eq!(restored, score);
    }
}
