use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
};

use approval_schema::{
    decode_segments_json, ClassTier, Gender, PropertyStatus, ReachScopeState, SegmentRecord,
    SettlementKind,
};
use thiserror::Error;

use crate::error::ValidationError;
use crate::ids::SegmentId;
use crate::position::{PoliticalPosition, SalienceWeights};

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentLocation {
    pub region: String,
    pub settlement: SettlementKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EconomicProfile {
    pub occupation: String,
    pub class_tier: ClassTier,
    pub property: PropertyStatus,
    pub gender: Gender,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CulturalProfile {
    pub ethnicity: String,
    pub religion: String,
}

/// Immutable population slice with its default political stance.
#[derive(Debug, Clone, PartialEq)]
pub struct PopulationSegment {
    pub id: SegmentId,
    pub population: u64,
    pub location: SegmentLocation,
    pub economics: EconomicProfile,
    pub culture: CulturalProfile,
    pub voting_eligible: bool,
    pub default_position: PoliticalPosition,
    pub salience: SalienceWeights,
}

impl PopulationSegment {
    pub fn from_record(record: &SegmentRecord) -> Result<Self, ValidationError> {
        Ok(Self {
            id: SegmentId(record.id),
            population: record.population,
            location: SegmentLocation {
                region: record.region.clone(),
                settlement: record.settlement,
            },
            economics: EconomicProfile {
                occupation: record.occupation.clone(),
                class_tier: record.class_tier,
                property: record.property,
                gender: record.gender,
            },
            culture: CulturalProfile {
                ethnicity: record.ethnicity.clone(),
                religion: record.religion.clone(),
            },
            voting_eligible: record.voting_eligible,
            default_position: PoliticalPosition::from_state(&record.default_position)?,
            salience: SalienceWeights::from_map(&record.salience)?,
        })
    }

    pub fn to_record(&self) -> SegmentRecord {
        SegmentRecord {
            id: self.id.0,
            population: self.population,
            region: self.location.region.clone(),
            settlement: self.location.settlement,
            occupation: self.economics.occupation.clone(),
            class_tier: self.economics.class_tier,
            property: self.economics.property,
            gender: self.economics.gender,
            ethnicity: self.culture.ethnicity.clone(),
            religion: self.culture.religion.clone(),
            voting_eligible: self.voting_eligible,
            default_position: self.default_position.to_state(),
            salience: self.salience.to_map(),
        }
    }
}

/// Which segments an effect reaches.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReachScope {
    #[default]
    All,
    Region(String),
    Settlement(SettlementKind),
    Segments(Vec<SegmentId>),
}

impl ReachScope {
    pub fn contains(&self, segment: &PopulationSegment) -> bool {
        match self {
            ReachScope::All => true,
            ReachScope::Region(region) => segment.location.region == *region,
            ReachScope::Settlement(kind) => segment.location.settlement == *kind,
            ReachScope::Segments(ids) => ids.contains(&segment.id),
        }
    }

    pub fn from_state(state: &ReachScopeState) -> Self {
        match state {
            ReachScopeState::All => ReachScope::All,
            ReachScopeState::Region(region) => ReachScope::Region(region.clone()),
            ReachScopeState::Settlement(kind) => ReachScope::Settlement(*kind),
            ReachScopeState::Segments(ids) => {
                ReachScope::Segments(ids.iter().copied().map(SegmentId).collect())
            }
        }
    }

    pub fn label(&self) -> String {
        match self {
            ReachScope::All => "all".to_string(),
            ReachScope::Region(region) => format!("region:{region}"),
            ReachScope::Settlement(kind) => format!("settlement:{kind:?}").to_lowercase(),
            ReachScope::Segments(ids) => format!("segments:{}", ids.len()),
        }
    }
}

#[derive(Debug, Error)]
pub enum SegmentDatasetError {
    #[error("failed to parse segment dataset: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read segment dataset from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("segment record {id} rejected: {source}")]
    InvalidRecord {
        id: u32,
        #[source]
        source: ValidationError,
    },
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Read-only registry of the session's population segments, ordered by id.
#[derive(Debug, Clone, Default)]
pub struct SegmentRegistry {
    segments: Vec<PopulationSegment>,
    index: HashMap<SegmentId, usize>,
}

impl SegmentRegistry {
    pub fn new(mut segments: Vec<PopulationSegment>) -> Result<Self, ValidationError> {
        segments.sort_by_key(|segment| segment.id);
        let mut index = HashMap::with_capacity(segments.len());
        for (idx, segment) in segments.iter().enumerate() {
            if index.insert(segment.id, idx).is_some() {
                return Err(ValidationError::DuplicateSegment(segment.id));
            }
        }
        Ok(Self { segments, index })
    }

    pub fn from_records(records: &[SegmentRecord]) -> Result<Self, SegmentDatasetError> {
        let segments = records
            .iter()
            .map(|record| {
                PopulationSegment::from_record(record).map_err(|source| {
                    SegmentDatasetError::InvalidRecord {
                        id: record.id,
                        source,
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(segments)?)
    }

    pub fn from_json_str(json: &str) -> Result<Self, SegmentDatasetError> {
        let records = decode_segments_json(json)?;
        Self::from_records(&records)
    }

    pub fn from_file(path: &Path) -> Result<Self, SegmentDatasetError> {
        let contents =
            fs::read_to_string(path).map_err(|source| SegmentDatasetError::ReadFailed {
                path: path.to_path_buf(),
                source,
            })?;
        let registry = Self::from_json_str(&contents)?;
        tracing::info!(
            target: "approval.segments",
            path = %path.display(),
            segments = registry.len(),
            population = registry.total_population(),
            "segment_dataset.loaded"
        );
        Ok(registry)
    }

    pub fn get(&self, id: SegmentId) -> Option<&PopulationSegment> {
        self.index.get(&id).map(|idx| &self.segments[*idx])
    }

    pub fn contains(&self, id: SegmentId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PopulationSegment> {
        self.segments.iter()
    }

    pub fn as_slice(&self) -> &[PopulationSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn total_population(&self) -> u64 {
        self.segments.iter().map(|segment| segment.population).sum()
    }

    pub fn in_scope(&self, scope: &ReachScope) -> Vec<&PopulationSegment> {
        self.segments
            .iter()
            .filter(|segment| scope.contains(segment))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use approval_schema::{Issue, PositionState};

    use super::*;

    fn record(id: u32, region: &str, settlement: SettlementKind) -> SegmentRecord {
        SegmentRecord {
            id,
            population: 1_000 * id as u64,
            region: region.to_string(),
            settlement,
            occupation: "clerk".to_string(),
            class_tier: ClassTier::Middle,
            property: PropertyStatus::Renter,
            gender: Gender::Other,
            ethnicity: "coastal".to_string(),
            religion: "none".to_string(),
            voting_eligible: true,
            default_position: PositionState::default(),
            salience: Default::default(),
        }
    }

    #[test]
    fn registry_orders_segments_by_id() {
        let registry = SegmentRegistry::from_records(&[
            record(3, "north", SettlementKind::Urban),
            record(1, "south", SettlementKind::Rural),
        ])
        .expect("valid dataset");
        let ids: Vec<_> = registry.iter().map(|segment| segment.id.0).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(registry.total_population(), 4_000);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = SegmentRegistry::from_records(&[
            record(2, "north", SettlementKind::Urban),
            record(2, "south", SettlementKind::Urban),
        ])
        .expect_err("duplicate id");
        assert!(matches!(
            err,
            SegmentDatasetError::Invalid(ValidationError::DuplicateSegment(SegmentId(2)))
        ));
    }

    #[test]
    fn invalid_salience_names_the_record() {
        let mut bad = record(5, "east", SettlementKind::Suburban);
        bad.salience.insert(Issue::Welfare, 8.0);
        bad.salience.insert(Issue::Housing, 3.0);
        let err = SegmentRegistry::from_records(&[bad]).expect_err("salience sum 11");
        assert!(matches!(err, SegmentDatasetError::InvalidRecord { id: 5, .. }));
    }

    #[test]
    fn scopes_filter_by_location() {
        let registry = SegmentRegistry::from_records(&[
            record(1, "north", SettlementKind::Urban),
            record(2, "north", SettlementKind::Rural),
            record(3, "south", SettlementKind::Rural),
        ])
        .expect("valid dataset");

        let north = ReachScope::Region("north".to_string());
        assert_eq!(registry.in_scope(&north).len(), 2);
        let rural = ReachScope::Settlement(SettlementKind::Rural);
        assert_eq!(registry.in_scope(&rural).len(), 2);
        let explicit = ReachScope::Segments(vec![SegmentId(3), SegmentId(9)]);
        assert_eq!(registry.in_scope(&explicit).len(), 1);
        assert_eq!(registry.in_scope(&ReachScope::All).len(), 3);
        assert_eq!(rural.label(), "settlement:rural");
    }
}
