use std::{
    env, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::Deserialize;
use thiserror::Error;

pub const BUILTIN_APPROVAL_CONFIG: &str = include_str!("data/approval_config.json");
pub const APPROVAL_CONFIG_ENV: &str = "APPROVAL_CONFIG_PATH";
/// Upper bound on per-score history entries.
pub const MAX_HISTORY_CAPACITY: usize = 50;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    seed: u64,
    policy: PolicyImpactConfig,
    campaign: CampaignConfig,
    endorsement: EndorsementConfig,
    news: NewsConfig,
    decay: DecayConfig,
    history: HistoryConfig,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            seed: 0x5eed_a99c,
            policy: PolicyImpactConfig::default(),
            campaign: CampaignConfig::default(),
            endorsement: EndorsementConfig::default(),
            news: NewsConfig::default(),
            decay: DecayConfig::default(),
            history: HistoryConfig::default(),
        }
    }
}

impl ApprovalConfig {
    pub fn builtin() -> Arc<Self> {
        Arc::new(
            serde_json::from_str(BUILTIN_APPROVAL_CONFIG)
                .expect("builtin approval config should parse"),
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, ApprovalConfigError> {
        let config: ApprovalConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ApprovalConfigError> {
        let contents =
            fs::read_to_string(path).map_err(|source| ApprovalConfigError::ReadFailed {
                path: path.to_path_buf(),
                source,
            })?;
        ApprovalConfig::from_json_str(&contents)
    }

    fn validate(&self) -> Result<(), ApprovalConfigError> {
        let endorsement = &self.endorsement;
        for (name, range) in [
            ("endorsement.low_range", endorsement.low_range),
            ("endorsement.mid_range", endorsement.mid_range),
            ("endorsement.high_range", endorsement.high_range),
        ] {
            if !range.iter().all(|bound| bound.is_finite()) {
                return Err(ApprovalConfigError::Invalid {
                    field: name,
                    reason: format!("bounds {} and {} must be finite", range[0], range[1]),
                });
            }
            if range[0] > range[1] {
                return Err(ApprovalConfigError::Invalid {
                    field: name,
                    reason: format!("lower bound {} exceeds upper bound {}", range[0], range[1]),
                });
            }
        }
        for (name, value) in [
            ("endorsement.mid_threshold", endorsement.mid_threshold),
            ("endorsement.high_threshold", endorsement.high_threshold),
            ("policy.max_impact", self.policy.max_impact),
            ("policy.proposer_weight", self.policy.proposer_weight),
            ("policy.yes_weight", self.policy.yes_weight),
            ("policy.no_weight", self.policy.no_weight),
            ("policy.abstain_weight", self.policy.abstain_weight),
            ("news.base_magnitude", self.news.base_magnitude),
        ] {
            if !value.is_finite() {
                return Err(ApprovalConfigError::Invalid {
                    field: name,
                    reason: format!("value {value} must be finite"),
                });
            }
        }
        if endorsement.mid_threshold > endorsement.high_threshold {
            return Err(ApprovalConfigError::Invalid {
                field: "endorsement.mid_threshold",
                reason: "mid tier threshold must not exceed high tier threshold".to_string(),
            });
        }
        if self.campaign.boost_min == 0 || self.campaign.boost_min > self.campaign.boost_max {
            return Err(ApprovalConfigError::Invalid {
                field: "campaign.boost_min",
                reason: format!(
                    "boost range {}..={} is empty or starts at zero",
                    self.campaign.boost_min, self.campaign.boost_max
                ),
            });
        }
        if !(1..=MAX_HISTORY_CAPACITY).contains(&self.history.capacity) {
            return Err(ApprovalConfigError::Invalid {
                field: "history.capacity",
                reason: format!(
                    "capacity {} must lie in 1..={MAX_HISTORY_CAPACITY}",
                    self.history.capacity
                ),
            });
        }
        if !(0.0..1.0).contains(&self.decay.rate) {
            return Err(ApprovalConfigError::Invalid {
                field: "decay.rate",
                reason: format!("rate {} must lie in [0, 1)", self.decay.rate),
            });
        }
        Ok(())
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn policy(&self) -> &PolicyImpactConfig {
        &self.policy
    }

    pub fn campaign(&self) -> &CampaignConfig {
        &self.campaign
    }

    pub fn endorsement(&self) -> &EndorsementConfig {
        &self.endorsement
    }

    pub fn news(&self) -> &NewsConfig {
        &self.news
    }

    pub fn decay(&self) -> &DecayConfig {
        &self.decay
    }

    pub fn history(&self) -> &HistoryConfig {
        &self.history
    }
}

#[derive(Debug, Error)]
pub enum ApprovalConfigError {
    #[error("failed to parse approval config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read approval config from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid approval config field `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicyImpactConfig {
    max_impact: f32,
    proposer_weight: f32,
    yes_weight: f32,
    no_weight: f32,
    abstain_weight: f32,
}

impl PolicyImpactConfig {
    pub fn max_impact(&self) -> f32 {
        self.max_impact
    }

    pub fn proposer_weight(&self) -> f32 {
        self.proposer_weight
    }

    pub fn yes_weight(&self) -> f32 {
        self.yes_weight
    }

    pub fn no_weight(&self) -> f32 {
        self.no_weight
    }

    pub fn abstain_weight(&self) -> f32 {
        self.abstain_weight
    }
}

impl Default for PolicyImpactConfig {
    fn default() -> Self {
        Self {
            max_impact: 100.0,
            proposer_weight: 1.0,
            yes_weight: 0.4,
            no_weight: -0.2,
            abstain_weight: 0.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CampaignConfig {
    duration_turns: u64,
    boost_min: u8,
    boost_max: u8,
}

impl CampaignConfig {
    pub fn duration_turns(&self) -> u64 {
        self.duration_turns
    }

    pub fn boost_min(&self) -> u8 {
        self.boost_min
    }

    pub fn boost_max(&self) -> u8 {
        self.boost_max
    }
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            duration_turns: 12,
            boost_min: 1,
            boost_max: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EndorsementConfig {
    mid_threshold: f32,
    high_threshold: f32,
    low_range: [f32; 2],
    mid_range: [f32; 2],
    high_range: [f32; 2],
}

impl EndorsementConfig {
    pub fn mid_threshold(&self) -> f32 {
        self.mid_threshold
    }

    pub fn high_threshold(&self) -> f32 {
        self.high_threshold
    }

    pub fn low_range(&self) -> (f32, f32) {
        (self.low_range[0], self.low_range[1])
    }

    pub fn mid_range(&self) -> (f32, f32) {
        (self.mid_range[0], self.mid_range[1])
    }

    pub fn high_range(&self) -> (f32, f32) {
        (self.high_range[0], self.high_range[1])
    }
}

impl Default for EndorsementConfig {
    fn default() -> Self {
        Self {
            mid_threshold: 40.0,
            high_threshold: 60.0,
            low_range: [-7.0, 1.0],
            mid_range: [-5.0, 5.0],
            high_range: [-1.0, 7.0],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    base_magnitude: f32,
}

impl NewsConfig {
    pub fn base_magnitude(&self) -> f32 {
        self.base_magnitude
    }
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            base_magnitude: 5.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DecayConfig {
    rate: f32,
}

impl DecayConfig {
    pub fn rate(&self) -> f32 {
        self.rate
    }
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self { rate: 0.02 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    capacity: usize,
    compaction_interval: u64,
}

impl HistoryConfig {
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn compaction_interval(&self) -> u64 {
        self.compaction_interval.max(1)
    }

    pub fn compacts_on(&self, turn: u64) -> bool {
        turn % self.compaction_interval() == 0
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: 50,
            compaction_interval: 3,
        }
    }
}

/// Loads the config named by `APPROVAL_CONFIG_PATH`, falling back to the builtin.
pub fn load_approval_config_from_env() -> Arc<ApprovalConfig> {
    let Some(path) = env::var(APPROVAL_CONFIG_ENV).ok().map(PathBuf::from) else {
        tracing::info!(
            target: "approval.config",
            "approval_config.loaded=builtin"
        );
        return ApprovalConfig::builtin();
    };

    match ApprovalConfig::from_file(&path) {
        Ok(config) => {
            tracing::info!(
                target: "approval.config",
                path = %path.display(),
                "approval_config.loaded=file"
            );
            Arc::new(config)
        }
        Err(err) => {
            tracing::warn!(
                target: "approval.config",
                path = %path.display(),
                error = %err,
                "approval_config.load_failed"
            );
            ApprovalConfig::builtin()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_matches_defaults() {
        let builtin = ApprovalConfig::builtin();
        let defaults = ApprovalConfig::default();
        assert_eq!(builtin.policy().max_impact(), defaults.policy().max_impact());
        assert_eq!(builtin.campaign().duration_turns(), 12);
        assert_eq!(builtin.endorsement().low_range(), (-7.0, 1.0));
        assert_eq!(builtin.history().capacity(), 50);
        assert_eq!(builtin.history().compaction_interval(), 3);
        assert!((builtin.decay().rate() - 0.02).abs() < f32::EPSILON);
    }

    #[test]
    fn partial_json_keeps_section_defaults() {
        let config =
            ApprovalConfig::from_json_str(r#"{ "decay": { "rate": 0.05 } }"#).expect("parses");
        assert!((config.decay().rate() - 0.05).abs() < f32::EPSILON);
        assert!((config.news().base_magnitude() - 5.0).abs() < f32::EPSILON);
    }

    #[test]
    fn inverted_endorsement_range_is_rejected() {
        let err = ApprovalConfig::from_json_str(
            r#"{ "endorsement": { "high_range": [7.0, -1.0] } }"#,
        )
        .expect_err("inverted range");
        assert!(matches!(
            err,
            ApprovalConfigError::Invalid {
                field: "endorsement.high_range",
                ..
            }
        ));
    }

    #[test]
    fn decay_rate_of_one_is_rejected() {
        let err = ApprovalConfig::from_json_str(r#"{ "decay": { "rate": 1.0 } }"#)
            .expect_err("rate must stay below one");
        assert!(matches!(err, ApprovalConfigError::Invalid { .. }));
    }

    #[test]
    fn non_finite_endorsement_bound_is_rejected() {
        // -1e39 overflows f32 to negative infinity
        let err = ApprovalConfig::from_json_str(
            r#"{ "endorsement": { "low_range": [-1e39, 1.0] } }"#,
        )
        .expect_err("infinite lower bound");
        assert!(matches!(
            err,
            ApprovalConfigError::Invalid {
                field: "endorsement.low_range",
                ..
            }
        ));
    }

    #[test]
    fn non_finite_threshold_is_rejected() {
        let err = ApprovalConfig::from_json_str(
            r#"{ "endorsement": { "high_threshold": 1e39 } }"#,
        )
        .expect_err("infinite threshold");
        assert!(matches!(
            err,
            ApprovalConfigError::Invalid {
                field: "endorsement.high_threshold",
                ..
            }
        ));
    }

    #[test]
    fn history_capacity_must_stay_within_bound() {
        for capacity in [0, 51, 500] {
            let json = format!(r#"{{ "history": {{ "capacity": {capacity} }} }}"#);
            let err = ApprovalConfig::from_json_str(&json).expect_err("capacity out of range");
            assert!(matches!(
                err,
                ApprovalConfigError::Invalid {
                    field: "history.capacity",
                    ..
                }
            ));
        }
        let config = ApprovalConfig::from_json_str(r#"{ "history": { "capacity": 10 } }"#)
            .expect("capacity in range");
        assert_eq!(config.history().capacity(), 10);
    }

    #[test]
    fn compaction_runs_on_interval_multiples() {
        let history = HistoryConfig::default();
        assert!(history.compacts_on(0));
        assert!(!history.compacts_on(4));
        assert!(history.compacts_on(6));
    }
}
