//! Passive drift of every stored score toward neutral.
//!
//! Each score remembers the last turn it decayed on, so re-running decay for
//! a turn that already ran leaves it untouched.

use std::collections::BTreeMap;

use approval_schema::SourceKind;
use rayon::prelude::*;

use crate::audit::PendingChange;
use crate::engine::ApprovalEngine;
use crate::ids::ScoreKey;
use crate::store::{StoreError, NEUTRAL_APPROVAL};

/// Change that moves `approval` a `rate` fraction of the way to neutral.
pub fn decay_delta(approval: f32, rate: f32) -> f32 {
    (NEUTRAL_APPROVAL - approval) * rate
}

fn sanitize_rate(rate: f32) -> f32 {
    if rate.is_finite() {
        rate.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecayReport {
    pub turn: u64,
    pub rate: f32,
    /// Scores that moved toward neutral.
    pub decayed: usize,
    /// Scores already at neutral; marked but not audited.
    pub unchanged: usize,
    /// Scores that had already decayed on this turn.
    pub skipped: usize,
    pub failures: Vec<(ScoreKey, StoreError)>,
}

enum DecayOutcome {
    Decayed {
        key: ScoreKey,
        applied: f32,
        resulting: f32,
    },
    Unchanged,
    Skipped,
    Missing,
}

impl ApprovalEngine {
    pub fn apply_turn_decay(&self, turn: u64) -> DecayReport {
        self.apply_turn_decay_with_rate(turn, self.config.decay().rate())
    }

    /// Decays every stored score that has not yet decayed on `turn`.
    pub fn apply_turn_decay_with_rate(&self, turn: u64, rate: f32) -> DecayReport {
        let rate = sanitize_rate(rate);
        let capacity = self.config.history().capacity();
        let store = self.store.as_ref();
        let outcomes: Vec<Result<DecayOutcome, (ScoreKey, StoreError)>> = store
            .keys()
            .into_par_iter()
            .map(|key| {
                let mut outcome = DecayOutcome::Missing;
                store
                    .update_existing(key, &mut |score| {
                        if score.decayed_at(turn) {
                            outcome = DecayOutcome::Skipped;
                            return;
                        }
                        let delta = decay_delta(score.approval(), rate);
                        outcome = if delta == 0.0 {
                            DecayOutcome::Unchanged
                        } else {
                            let change = score.apply_delta(delta, SourceKind::Decay, turn, capacity);
                            DecayOutcome::Decayed {
                                key,
                                applied: change.applied,
                                resulting: change.resulting,
                            }
                        };
                        score.mark_decayed(turn);
                    })
                    .map_err(|error| (key, error))?;
                Ok(outcome)
            })
            .collect();

        let mut report = DecayReport {
            turn,
            rate,
            ..Default::default()
        };
        let mut pending = Vec::new();
        let metadata = BTreeMap::from([("rate".to_string(), rate.to_string())]);
        for outcome in outcomes {
            match outcome {
                Ok(DecayOutcome::Decayed {
                    key,
                    applied,
                    resulting,
                }) => {
                    report.decayed += 1;
                    pending.push(PendingChange {
                        key,
                        delta: applied,
                        resulting,
                        source: SourceKind::Decay,
                        turn,
                        metadata: metadata.clone(),
                    });
                }
                Ok(DecayOutcome::Unchanged) => report.unchanged += 1,
                Ok(DecayOutcome::Skipped) => report.skipped += 1,
                Ok(DecayOutcome::Missing) => {}
                Err((key, error)) => {
                    tracing::warn!(
                        target: "approval.decay",
                        actor = %key.actor,
                        segment = %key.segment,
                        error = %error,
                        "decay.score_failed"
                    );
                    report.failures.push((key, error));
                }
            }
        }
        self.audit.append_batch(pending);

        tracing::info!(
            target: "approval.decay",
            turn,
            rate,
            decayed = report.decayed,
            unchanged = report.unchanged,
            skipped = report.skipped,
            failed = report.failures.len(),
            "decay.applied"
        );
        report
    }
}
