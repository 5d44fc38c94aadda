use std::collections::BTreeMap;

use approval_schema::SourceKind;

use crate::alignment::alignment;
use crate::engine::{ApprovalEngine, BatchReport};
use crate::error::{ApprovalResult, ValidationError};
use crate::position::Outlet;
use crate::segments::ReachScope;

impl ApprovalEngine {
    /// Applies a published story with the configured base magnitude.
    pub fn apply_news_impact(
        &self,
        outlet: &Outlet,
        scope: &ReachScope,
        turn: u64,
    ) -> ApprovalResult<BatchReport> {
        let base_magnitude = self.config.news().base_magnitude();
        self.apply_news_impact_scaled(outlet, scope, base_magnitude, turn)
    }

    /// Moves the outlet owner's approval in every reached segment by
    /// `alignment * base_magnitude`.
    pub fn apply_news_impact_scaled(
        &self,
        outlet: &Outlet,
        scope: &ReachScope,
        base_magnitude: f32,
        turn: u64,
    ) -> ApprovalResult<BatchReport> {
        if !base_magnitude.is_finite() {
            return Err(ValidationError::NotFinite {
                field: "news.base_magnitude".to_string(),
            }
            .into());
        }
        self.require_actor(outlet.owner)?;
        let segments = self.resolve_scope(scope)?;
        let scope_label = scope.label();
        let metadata = BTreeMap::from([
            ("outlet".to_string(), outlet.id.to_string()),
            ("scope".to_string(), scope_label.clone()),
        ]);
        let report = self.fan_out(
            outlet.owner,
            &segments,
            SourceKind::News,
            turn,
            &metadata,
            |segment| {
                alignment(&outlet.position, &segment.default_position, &segment.salience)
                    * base_magnitude
            },
        );

        for failure in &report.failures {
            tracing::warn!(
                target: "approval.news",
                outlet = %outlet.id,
                segment = %failure.segment,
                error = %failure.error,
                "news.segment_failed"
            );
        }
        tracing::info!(
            target: "approval.news",
            outlet = %outlet.id,
            owner = %outlet.owner,
            scope = %scope_label,
            turn,
            touched = report.touched(),
            failed = report.failures.len(),
            "news.applied"
        );
        Ok(report)
    }
}
