use std::collections::VecDeque;
use std::sync::Arc;

use bevy::prelude::*;

use crate::actions::{ActionQueue, ActionSender, DrainReport};
use crate::audit::{compact_histories, CompactionReport};
use crate::engine::ApprovalEngine;

/// Shared handle to the engine owned by the turn app.
#[derive(Resource, Clone)]
pub struct ApprovalEngineHandle(pub Arc<ApprovalEngine>);

impl ApprovalEngineHandle {
    pub fn get(&self) -> &ApprovalEngine {
        &self.0
    }
}

/// Turn currently being resolved.
#[derive(Resource, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApprovalTurn(pub u64);

#[derive(Resource, Debug, Default)]
pub struct ActionInbox(pub ActionQueue);

impl ActionInbox {
    pub fn sender(&self) -> ActionSender {
        self.0.sender()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnReport {
    pub turn: u64,
    pub actions: DrainReport,
    pub campaigns_completed: usize,
    pub campaign_failures: usize,
    pub decayed: usize,
    pub decay_failures: usize,
    pub compaction: Option<CompactionReport>,
}

/// Report for the turn in flight; systems fill it in order.
#[derive(Resource, Debug, Default)]
pub struct PendingTurnReport(pub TurnReport);

/// Number of resolved turns kept in [`TurnReports`].
pub const TURN_REPORT_RETENTION: usize = 64;

/// Most recent turn reports, oldest evicted first.
#[derive(Resource, Debug)]
pub struct TurnReports {
    reports: VecDeque<TurnReport>,
    retention: usize,
}

impl Default for TurnReports {
    fn default() -> Self {
        Self::with_retention(TURN_REPORT_RETENTION)
    }
}

impl TurnReports {
    pub fn with_retention(retention: usize) -> Self {
        let retention = retention.max(1);
        Self {
            reports: VecDeque::with_capacity(retention),
            retention,
        }
    }

    pub fn latest(&self) -> Option<&TurnReport> {
        self.reports.back()
    }

    /// Retained reports in turn order.
    pub fn iter(&self) -> impl Iterator<Item = &TurnReport> {
        self.reports.iter()
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    fn push(&mut self, report: TurnReport) {
        if self.reports.len() == self.retention {
            self.reports.pop_front();
        }
        self.reports.push_back(report);
    }
}

pub fn drain_actions(
    engine: Res<ApprovalEngineHandle>,
    turn: Res<ApprovalTurn>,
    inbox: Res<ActionInbox>,
    mut pending: ResMut<PendingTurnReport>,
) {
    pending.0 = TurnReport {
        turn: turn.0,
        actions: inbox.0.drain(engine.get(), turn.0),
        ..Default::default()
    };
}

pub fn complete_campaigns(
    engine: Res<ApprovalEngineHandle>,
    turn: Res<ApprovalTurn>,
    mut pending: ResMut<PendingTurnReport>,
) {
    let sweep = engine.get().complete_due_campaigns(turn.0);
    pending.0.campaigns_completed = sweep.completed.len();
    pending.0.campaign_failures = sweep.failures.len();
}

pub fn decay_scores(
    engine: Res<ApprovalEngineHandle>,
    turn: Res<ApprovalTurn>,
    mut pending: ResMut<PendingTurnReport>,
) {
    let report = engine.get().apply_turn_decay(turn.0);
    pending.0.decayed = report.decayed;
    pending.0.decay_failures = report.failures.len();
}

pub fn compact_history(
    engine: Res<ApprovalEngineHandle>,
    turn: Res<ApprovalTurn>,
    mut pending: ResMut<PendingTurnReport>,
) {
    let engine = engine.get();
    let history = engine.config().history();
    if history.compacts_on(turn.0) {
        pending.0.compaction = Some(compact_histories(engine.store(), history.capacity()));
    }
}

pub fn record_turn_report(
    mut pending: ResMut<PendingTurnReport>,
    mut reports: ResMut<TurnReports>,
) {
    let report = std::mem::take(&mut pending.0);
    tracing::debug!(
        target: "approval.history",
        turn = report.turn,
        actions = report.actions.applied,
        campaigns = report.campaigns_completed,
        decayed = report.decayed,
        "turn.resolved"
    );
    reports.push(report);
}

pub fn advance_turn(mut turn: ResMut<ApprovalTurn>) {
    turn.0 = turn.0.wrapping_add(1);
}
