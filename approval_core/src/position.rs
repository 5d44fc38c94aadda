use std::collections::BTreeMap;

use approval_schema::{CubeState, Issue, PositionState, ISSUE_COUNT};

use crate::error::ValidationError;
use crate::ids::{ActorId, OutletId, PolicyId};

/// Bound on every cube axis and issue value.
pub const POSITION_LIMIT: f32 = 10.0;
/// Maximum total salience a segment may distribute across issues.
pub const SALIENCE_LIMIT: f32 = 10.0;
const SALIENCE_TOLERANCE: f32 = 1e-4;

fn check_value(field: &str, value: f32) -> Result<f32, ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NotFinite {
            field: field.to_string(),
        });
    }
    if !(-POSITION_LIMIT..=POSITION_LIMIT).contains(&value) {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            value,
        });
    }
    Ok(value)
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PoliticalCube {
    economic: f32,
    authority: f32,
    social: f32,
}

impl PoliticalCube {
    pub fn new(economic: f32, authority: f32, social: f32) -> Result<Self, ValidationError> {
        Ok(Self {
            economic: check_value("cube.economic", economic)?,
            authority: check_value("cube.authority", authority)?,
            social: check_value("cube.social", social)?,
        })
    }

    pub fn economic(&self) -> f32 {
        self.economic
    }

    pub fn authority(&self) -> f32 {
        self.authority
    }

    pub fn social(&self) -> f32 {
        self.social
    }

    pub fn axes(&self) -> [f32; 3] {
        [self.economic, self.authority, self.social]
    }

    pub fn distance(&self, other: &PoliticalCube) -> f32 {
        self.axes()
            .iter()
            .zip(other.axes())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// Validated position on the political cube plus a sparse set of issue stances.
#[derive(Debug, Clone, PartialEq)]
pub struct PoliticalPosition {
    cube: PoliticalCube,
    issues: [Option<f32>; ISSUE_COUNT],
}

impl PoliticalPosition {
    pub fn new(cube: PoliticalCube) -> Self {
        Self {
            cube,
            issues: [None; ISSUE_COUNT],
        }
    }

    pub fn with_issue(mut self, issue: Issue, value: f32) -> Result<Self, ValidationError> {
        self.issues[issue.index()] = Some(check_value(issue.as_str(), value)?);
        Ok(self)
    }

    pub fn from_state(state: &PositionState) -> Result<Self, ValidationError> {
        let cube = PoliticalCube::new(state.cube.economic, state.cube.authority, state.cube.social)?;
        state
            .issues
            .iter()
            .try_fold(Self::new(cube), |position, (issue, value)| {
                position.with_issue(*issue, *value)
            })
    }

    pub fn to_state(&self) -> PositionState {
        PositionState {
            cube: CubeState {
                economic: self.cube.economic,
                authority: self.cube.authority,
                social: self.cube.social,
            },
            issues: self.issues().collect(),
        }
    }

    pub fn cube(&self) -> &PoliticalCube {
        &self.cube
    }

    pub fn issue(&self, issue: Issue) -> Option<f32> {
        self.issues[issue.index()]
    }

    pub fn issues(&self) -> impl Iterator<Item = (Issue, f32)> + '_ {
        Issue::ALL
            .iter()
            .filter_map(|issue| self.issues[issue.index()].map(|value| (*issue, value)))
    }
}

/// Per-segment issue weights. Non-negative, summing to at most [`SALIENCE_LIMIT`].
#[derive(Debug, Clone, PartialEq)]
pub struct SalienceWeights {
    weights: [f32; ISSUE_COUNT],
    total: f32,
}

impl Default for SalienceWeights {
    fn default() -> Self {
        Self {
            weights: [0.0; ISSUE_COUNT],
            total: 0.0,
        }
    }
}

impl SalienceWeights {
    pub fn new<I>(entries: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = (Issue, f32)>,
    {
        let mut weights = [0.0f32; ISSUE_COUNT];
        for (issue, weight) in entries {
            if !weight.is_finite() {
                return Err(ValidationError::NotFinite {
                    field: format!("salience.{}", issue.as_str()),
                });
            }
            if weight < 0.0 {
                return Err(ValidationError::NegativeSalience {
                    issue: issue.as_str(),
                    weight,
                });
            }
            weights[issue.index()] = weight;
        }
        let total: f32 = weights.iter().sum();
        if total > SALIENCE_LIMIT + SALIENCE_TOLERANCE {
            return Err(ValidationError::SalienceOverflow {
                total,
                limit: SALIENCE_LIMIT,
            });
        }
        Ok(Self { weights, total })
    }

    pub fn from_map(map: &BTreeMap<Issue, f32>) -> Result<Self, ValidationError> {
        Self::new(map.iter().map(|(issue, weight)| (*issue, *weight)))
    }

    pub fn weight(&self, issue: Issue) -> f32 {
        self.weights[issue.index()]
    }

    pub fn total(&self) -> f32 {
        self.total
    }

    /// Issues carrying a strictly positive weight.
    pub fn active(&self) -> impl Iterator<Item = (Issue, f32)> + '_ {
        Issue::ALL
            .iter()
            .map(|issue| (*issue, self.weights[issue.index()]))
            .filter(|(_, weight)| *weight > 0.0)
    }

    pub fn to_map(&self) -> BTreeMap<Issue, f32> {
        self.active().collect()
    }
}

/// Structured stance of a proposed or voted policy.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyProposal {
    pub id: PolicyId,
    pub position: PoliticalPosition,
}

impl PolicyProposal {
    pub fn new(id: PolicyId, position: PoliticalPosition) -> Self {
        Self { id, position }
    }
}

/// Publishing outlet; its owner receives the approval effect of published media.
#[derive(Debug, Clone, PartialEq)]
pub struct Outlet {
    pub id: OutletId,
    pub owner: ActorId,
    pub position: PoliticalPosition,
}

impl Outlet {
    pub fn new(id: OutletId, owner: ActorId, position: PoliticalPosition) -> Self {
        Self {
            id,
            owner,
            position,
        }
    }
}

/// Player or organisation known to the engine, with an optional declared stance.
#[derive(Debug, Clone, PartialEq)]
pub struct ActorProfile {
    pub id: ActorId,
    pub position: Option<PoliticalPosition>,
}

impl ActorProfile {
    pub fn new(id: ActorId) -> Self {
        Self { id, position: None }
    }

    pub fn with_position(mut self, position: PoliticalPosition) -> Self {
        self.position = Some(position);
        self
    }
}
