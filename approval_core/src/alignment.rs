//! Signed alignment between two political positions.
//!
//! Issue agreement is weighted by the receiving segment's salience and blended
//! with cube proximity. The result is centred so that `0.0` means no net effect,
//! `1.0` identical stances and `-1.0` maximal opposition.

use crate::position::{PoliticalPosition, SalienceWeights, POSITION_LIMIT};

pub const ISSUE_WEIGHT: f32 = 0.7;
pub const CUBE_WEIGHT: f32 = 0.3;
/// Issue alignment used when the two positions share no salient issue.
pub const NEUTRAL_ISSUE_ALIGNMENT: f32 = 0.5;

const ISSUE_SPAN: f32 = 2.0 * POSITION_LIMIT;

fn max_cube_distance() -> f32 {
    (3.0 * ISSUE_SPAN * ISSUE_SPAN).sqrt()
}

/// Salience-weighted mean of `1 - |a - b| / 20` over issues present in both positions.
pub fn issue_alignment(
    a: &PoliticalPosition,
    b: &PoliticalPosition,
    salience: &SalienceWeights,
) -> f32 {
    let mut weighted = 0.0f32;
    let mut total_weight = 0.0f32;
    for (issue, weight) in salience.active() {
        let (Some(lhs), Some(rhs)) = (a.issue(issue), b.issue(issue)) else {
            continue;
        };
        let agreement = 1.0 - (lhs - rhs).abs() / ISSUE_SPAN;
        weighted += agreement * weight;
        total_weight += weight;
    }
    if total_weight <= f32::EPSILON {
        NEUTRAL_ISSUE_ALIGNMENT
    } else {
        (weighted / total_weight).clamp(0.0, 1.0)
    }
}

pub fn cube_alignment(a: &PoliticalPosition, b: &PoliticalPosition) -> f32 {
    let distance = a.cube().distance(b.cube());
    (1.0 - distance / max_cube_distance()).clamp(0.0, 1.0)
}

/// Unsigned blend in `[0, 1]`.
pub fn combined_alignment(
    a: &PoliticalPosition,
    b: &PoliticalPosition,
    salience: &SalienceWeights,
) -> f32 {
    let combined =
        ISSUE_WEIGHT * issue_alignment(a, b, salience) + CUBE_WEIGHT * cube_alignment(a, b);
    combined.clamp(0.0, 1.0)
}

pub fn alignment(a: &PoliticalPosition, b: &PoliticalPosition, salience: &SalienceWeights) -> f32 {
    ((combined_alignment(a, b, salience) - 0.5) * 2.0).clamp(-1.0, 1.0)
}
