//! Data contracts for the approval subsystem.
//!
//! These types cross the boundary to collaborators (segment generator, turn
//! orchestrator, reporting UI) and to whatever persistence layer stores
//! engine snapshots. They carry raw ids and plain values; validation happens
//! in `approval_core` when records are turned into domain types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Number of discrete policy issues tracked on a political position.
pub const ISSUE_COUNT: usize = 34;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Issue {
    IncomeTax = 0,
    CorporateTax = 1,
    MinimumWage = 2,
    LaborUnions = 3,
    Welfare = 4,
    Pensions = 5,
    Healthcare = 6,
    Education = 7,
    Housing = 8,
    Infrastructure = 9,
    Privatization = 10,
    MarketRegulation = 11,
    TradeProtection = 12,
    AgricultureSubsidies = 13,
    LandReform = 14,
    EnergyPolicy = 15,
    EnvironmentalProtection = 16,
    Immigration = 17,
    Policing = 18,
    CriminalJustice = 19,
    DrugPolicy = 20,
    FirearmControl = 21,
    Surveillance = 22,
    PressFreedom = 23,
    FreeSpeech = 24,
    ReligiousFreedom = 25,
    ChurchAndState = 26,
    MarriageEquality = 27,
    ReproductiveRights = 28,
    MilitarySpending = 29,
    ForeignIntervention = 30,
    RegionalAutonomy = 31,
    ElectoralReform = 32,
    TermLimits = 33,
}

impl Issue {
    pub const ALL: [Issue; ISSUE_COUNT] = [
        Issue::IncomeTax,
        Issue::CorporateTax,
        Issue::MinimumWage,
        Issue::LaborUnions,
        Issue::Welfare,
        Issue::Pensions,
        Issue::Healthcare,
        Issue::Education,
        Issue::Housing,
        Issue::Infrastructure,
        Issue::Privatization,
        Issue::MarketRegulation,
        Issue::TradeProtection,
        Issue::AgricultureSubsidies,
        Issue::LandReform,
        Issue::EnergyPolicy,
        Issue::EnvironmentalProtection,
        Issue::Immigration,
        Issue::Policing,
        Issue::CriminalJustice,
        Issue::DrugPolicy,
        Issue::FirearmControl,
        Issue::Surveillance,
        Issue::PressFreedom,
        Issue::FreeSpeech,
        Issue::ReligiousFreedom,
        Issue::ChurchAndState,
        Issue::MarriageEquality,
        Issue::ReproductiveRights,
        Issue::MilitarySpending,
        Issue::ForeignIntervention,
        Issue::RegionalAutonomy,
        Issue::ElectoralReform,
        Issue::TermLimits,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Issue::IncomeTax => "income_tax",
            Issue::CorporateTax => "corporate_tax",
            Issue::MinimumWage => "minimum_wage",
            Issue::LaborUnions => "labor_unions",
            Issue::Welfare => "welfare",
            Issue::Pensions => "pensions",
            Issue::Healthcare => "healthcare",
            Issue::Education => "education",
            Issue::Housing => "housing",
            Issue::Infrastructure => "infrastructure",
            Issue::Privatization => "privatization",
            Issue::MarketRegulation => "market_regulation",
            Issue::TradeProtection => "trade_protection",
            Issue::AgricultureSubsidies => "agriculture_subsidies",
            Issue::LandReform => "land_reform",
            Issue::EnergyPolicy => "energy_policy",
            Issue::EnvironmentalProtection => "environmental_protection",
            Issue::Immigration => "immigration",
            Issue::Policing => "policing",
            Issue::CriminalJustice => "criminal_justice",
            Issue::DrugPolicy => "drug_policy",
            Issue::FirearmControl => "firearm_control",
            Issue::Surveillance => "surveillance",
            Issue::PressFreedom => "press_freedom",
            Issue::FreeSpeech => "free_speech",
            Issue::ReligiousFreedom => "religious_freedom",
            Issue::ChurchAndState => "church_and_state",
            Issue::MarriageEquality => "marriage_equality",
            Issue::ReproductiveRights => "reproductive_rights",
            Issue::MilitarySpending => "military_spending",
            Issue::ForeignIntervention => "foreign_intervention",
            Issue::RegionalAutonomy => "regional_autonomy",
            Issue::ElectoralReform => "electoral_reform",
            Issue::TermLimits => "term_limits",
        }
    }
}

/// Three-axis political cube coordinates, each expected in `[-10, 10]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct CubeState {
    pub economic: f32,
    pub authority: f32,
    pub social: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PositionState {
    pub cube: CubeState,
    #[serde(default)]
    pub issues: BTreeMap<Issue, f32>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SettlementKind {
    Urban,
    Suburban,
    Rural,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ClassTier {
    Lower,
    Working,
    Middle,
    UpperMiddle,
    Upper,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PropertyStatus {
    Owner,
    Renter,
    Landless,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
}

/// One population segment as produced by the external dataset generator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SegmentRecord {
    pub id: u32,
    pub population: u64,
    pub region: String,
    pub settlement: SettlementKind,
    pub occupation: String,
    pub class_tier: ClassTier,
    pub property: PropertyStatus,
    pub gender: Gender,
    pub ethnicity: String,
    pub religion: String,
    pub voting_eligible: bool,
    pub default_position: PositionState,
    #[serde(default)]
    pub salience: BTreeMap<Issue, f32>,
}

pub fn decode_segments_json(data: &str) -> serde_json::Result<Vec<SegmentRecord>> {
    serde_json::from_str(data)
}

pub fn encode_segments_json(records: &[SegmentRecord]) -> serde_json::Result<String> {
    serde_json::to_string(records)
}

/// Kind of effect that produced an approval change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum SourceKind {
    Policy = 0,
    Campaign = 1,
    Endorsement = 2,
    News = 3,
    Decay = 4,
}

impl SourceKind {
    pub const ALL: [SourceKind; 5] = [
        SourceKind::Policy,
        SourceKind::Campaign,
        SourceKind::Endorsement,
        SourceKind::News,
        SourceKind::Decay,
    ];

    pub fn bit(self) -> u32 {
        1 << (self as u32)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Policy => "policy",
            SourceKind::Campaign => "campaign",
            SourceKind::Endorsement => "endorsement",
            SourceKind::News => "news",
            SourceKind::Decay => "decay",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntryState {
    pub turn: u64,
    pub delta: f32,
    pub resulting: f32,
    pub source: SourceKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReputationScoreState {
    pub actor: u32,
    pub segment: u32,
    pub approval: f32,
    pub last_decay_turn: Option<u64>,
    pub history: Vec<HistoryEntryState>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum CampaignStatus {
    Pending = 0,
    Active = 1,
    Completed = 2,
    Cancelled = 3,
}

impl CampaignStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, CampaignStatus::Completed | CampaignStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CampaignState {
    pub id: u64,
    pub actor: u32,
    pub segment: u32,
    pub start_turn: u64,
    pub end_turn: u64,
    pub boost: u8,
    pub status: CampaignStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ActorState {
    pub id: u32,
    #[serde(default)]
    pub position: Option<PositionState>,
}

/// Relation of an actor to a policy being voted on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VoteRole {
    Proposer,
    Yes,
    No,
    Abstain,
}

impl VoteRole {
    pub fn as_str(self) -> &'static str {
        match self {
            VoteRole::Proposer => "proposer",
            VoteRole::Yes => "yes",
            VoteRole::No => "no",
            VoteRole::Abstain => "abstain",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReachScopeState {
    #[default]
    All,
    Region(String),
    Settlement(SettlementKind),
    Segments(Vec<u32>),
}

/// Player-triggered effect as submitted by the action-economy subsystem.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionRecord {
    RegisterActor {
        actor: u32,
        #[serde(default)]
        position: Option<PositionState>,
    },
    PolicyVote {
        actor: u32,
        policy: u32,
        position: PositionState,
        role: VoteRole,
    },
    Endorse {
        endorser: u32,
        endorsed: u32,
    },
    PublishNews {
        outlet: u32,
        owner: u32,
        position: PositionState,
        #[serde(default)]
        scope: ReachScopeState,
    },
    StartCampaign {
        actor: u32,
        segment: u32,
        #[serde(default)]
        boost: Option<u8>,
    },
    CancelCampaign {
        campaign: u64,
    },
}

/// One entry of a replay script: an action submitted during `turn`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScriptStep {
    pub turn: u64,
    pub action: ActionRecord,
}

pub fn decode_script_json(data: &str) -> serde_json::Result<Vec<ScriptStep>> {
    serde_json::from_str(data)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum EndorsementTier {
    Low = 0,
    Mid = 1,
    High = 2,
}

impl EndorsementTier {
    pub fn as_str(self) -> &'static str {
        match self {
            EndorsementTier::Low => "low",
            EndorsementTier::Mid => "mid",
            EndorsementTier::High => "high",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndorsementState {
    pub endorser: u32,
    pub endorsed: u32,
    pub turn: u64,
    pub tier: EndorsementTier,
    pub representative_approval: f32,
    pub segments_affected: u32,
    pub average_transfer: f32,
    pub positive: u32,
    pub negative: u32,
}

/// Append-only audit record of a single approval mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReputationChangeState {
    pub seq: u64,
    pub actor: u32,
    pub segment: u32,
    pub delta: f32,
    pub resulting: f32,
    pub source: SourceKind,
    pub turn: u64,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SnapshotHeader {
    pub turn: u64,
    pub score_count: u64,
    pub campaign_count: u64,
    pub audit_count: u64,
}

impl SnapshotHeader {
    pub fn new(turn: u64, score_count: usize, campaign_count: usize, audit_count: usize) -> Self {
        Self {
            turn,
            score_count: score_count as u64,
            campaign_count: campaign_count as u64,
            audit_count: audit_count as u64,
        }
    }
}

/// Complete persisted state of an approval engine at a turn boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ApprovalSnapshot {
    pub header: SnapshotHeader,
    pub actors: Vec<ActorState>,
    pub scores: Vec<ReputationScoreState>,
    pub campaigns: Vec<CampaignState>,
    pub endorsements: Vec<EndorsementState>,
    pub audit: Vec<ReputationChangeState>,
    pub next_campaign_id: u64,
    pub next_audit_seq: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotCodecError {
    #[error("failed to encode approval snapshot: {0}")]
    Encode(#[source] bincode::Error),
    #[error("failed to decode approval snapshot: {0}")]
    Decode(#[source] bincode::Error),
    #[error("approval snapshot header mismatch: expected {expected} {field}, found {found}")]
    HeaderMismatch {
        field: &'static str,
        expected: u64,
        found: u64,
    },
}

pub fn encode_snapshot(snapshot: &ApprovalSnapshot) -> Result<Vec<u8>, SnapshotCodecError> {
    bincode::serialize(snapshot).map_err(SnapshotCodecError::Encode)
}

pub fn decode_snapshot(data: &[u8]) -> Result<ApprovalSnapshot, SnapshotCodecError> {
    let snapshot: ApprovalSnapshot =
        bincode::deserialize(data).map_err(SnapshotCodecError::Decode)?;
    check_header(&snapshot)?;
    Ok(snapshot)
}

pub fn encode_snapshot_json(snapshot: &ApprovalSnapshot) -> serde_json::Result<String> {
    serde_json::to_string(snapshot)
}

pub fn decode_snapshot_json(data: &str) -> serde_json::Result<ApprovalSnapshot> {
    serde_json::from_str(data)
}

fn check_header(snapshot: &ApprovalSnapshot) -> Result<(), SnapshotCodecError> {
    let counts = [
        ("scores", snapshot.header.score_count, snapshot.scores.len()),
        (
            "campaigns",
            snapshot.header.campaign_count,
            snapshot.campaigns.len(),
        ),
        ("audit entries", snapshot.header.audit_count, snapshot.audit.len()),
    ];
    for (field, expected, found) in counts {
        let found = found as u64;
        if expected != found {
            return Err(SnapshotCodecError::HeaderMismatch {
                field,
                expected,
                found,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_indices_follow_catalogue_order() {
        for (idx, issue) in Issue::ALL.iter().enumerate() {
            assert_eq!(issue.index(), idx);
        }
    }

    #[test]
    fn segment_record_parses_from_generator_json() {
        let json = r#"[{
            "id": 7,
            "population": 12000,
            "region": "north",
            "settlement": "rural",
            "occupation": "farmer",
            "class_tier": "working",
            "property": "owner",
            "gender": "female",
            "ethnicity": "highland",
            "religion": "orthodox",
            "voting_eligible": true,
            "default_position": {
                "cube": { "economic": 2.5, "authority": 4.0, "social": 6.0 },
                "issues": { "agriculture_subsidies": 8.0, "immigration": -3.0 }
            },
            "salience": { "agriculture_subsidies": 4.0, "immigration": 1.5 }
        }]"#;

        let records = decode_segments_json(json).expect("dataset should parse");
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.id, 7);
        assert_eq!(record.settlement, SettlementKind::Rural);
        assert_eq!(
            record.default_position.issues.get(&Issue::AgricultureSubsidies),
            Some(&8.0)
        );
        assert_eq!(record.salience.get(&Issue::Immigration), Some(&1.5));
    }

    #[test]
    fn snapshot_decode_rejects_inconsistent_header() {
        let snapshot = ApprovalSnapshot {
            header: SnapshotHeader::new(4, 2, 0, 0),
            ..Default::default()
        };
        let bytes = encode_snapshot(&snapshot).expect("encode");
        let err = decode_snapshot(&bytes).expect_err("header claims two scores");
        assert!(matches!(
            err,
            SnapshotCodecError::HeaderMismatch {
                field: "scores",
                expected: 2,
                found: 0
            }
        ));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn header_counts_do_not_wrap_past_u32() {
        let large = u32::MAX as usize + 7;
        let header = SnapshotHeader::new(9, large, 1, large);
        assert_eq!(header.score_count, u64::from(u32::MAX) + 7);
        assert_eq!(header.audit_count, u64::from(u32::MAX) + 7);

        let snapshot = ApprovalSnapshot {
            header,
            ..Default::default()
        };
        let bytes = encode_snapshot(&snapshot).expect("encode");
        let err = decode_snapshot(&bytes).expect_err("header claims more scores than stored");
        assert!(matches!(
            err,
            SnapshotCodecError::HeaderMismatch {
                field: "scores",
                found: 0,
                ..
            }
        ));
    }

    #[test]
    fn script_steps_parse_tagged_actions() {
        let json = r#"[
            { "turn": 0, "action": { "kind": "register_actor", "actor": 1 } },
            { "turn": 1, "action": { "kind": "publish_news", "outlet": 4, "owner": 1,
                "position": { "cube": { "economic": 1.0, "authority": 0.0, "social": -2.0 } },
                "scope": { "region": "north" } } },
            { "turn": 2, "action": { "kind": "policy_vote", "actor": 1, "policy": 9,
                "position": { "cube": { "economic": 0.0, "authority": 0.0, "social": 0.0 } },
                "role": "yes" } }
        ]"#;
        let steps = decode_script_json(json).expect("script should parse");
        assert_eq!(steps.len(), 3);
        assert_eq!(
            steps[0].action,
            ActionRecord::RegisterActor {
                actor: 1,
                position: None
            }
        );
        match &steps[1].action {
            ActionRecord::PublishNews { scope, .. } => {
                assert_eq!(*scope, ReachScopeState::Region("north".to_string()))
            }
            other => panic!("unexpected action {other:?}"),
        }
        assert!(matches!(
            steps[2].action,
            ActionRecord::PolicyVote {
                role: VoteRole::Yes,
                ..
            }
        ));
    }

    #[test]
    fn source_bits_are_distinct() {
        let mask = SourceKind::ALL
            .iter()
            .fold(0u32, |acc, source| acc | source.bit());
        assert_eq!(mask.count_ones(), SourceKind::ALL.len() as u32);
    }
}
