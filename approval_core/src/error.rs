use std::fmt;

use thiserror::Error;

use crate::ids::{ActorId, CampaignId, SegmentId};
use crate::store::StoreError;

/// Data-entry failures. Offending values are never stored.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field} value {value} is outside [-10, 10]")]
    OutOfRange { field: String, value: f32 },
    #[error("{field} value is not a finite number")]
    NotFinite { field: String },
    #[error("salience weight for {issue} is negative ({weight})")]
    NegativeSalience { issue: &'static str, weight: f32 },
    #[error("salience weights sum to {total}, exceeding the limit of {limit}")]
    SalienceOverflow { total: f32, limit: f32 },
    #[error("duplicate segment id {0}")]
    DuplicateSegment(SegmentId),
    #[error("campaign boost {0} is outside the allowed range")]
    BoostOutOfRange(u8),
    #[error("actor {0} cannot endorse itself")]
    SelfEndorsement(ActorId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Store,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Store => "store",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("actor {0} is already registered")]
    DuplicateActor(ActorId),
    #[error("actor {0} is not known to the approval engine")]
    UnknownActor(ActorId),
    #[error("segment {0} is not registered")]
    UnknownSegment(SegmentId),
    #[error("campaign {0} does not exist")]
    UnknownCampaign(CampaignId),
    #[error("actor {actor} already runs campaign {existing} on segment {segment}")]
    CampaignConflict {
        actor: ActorId,
        segment: SegmentId,
        existing: CampaignId,
    },
    #[error("campaign {id} ends at turn {end_turn}; cannot complete at turn {turn}")]
    CampaignNotDue {
        id: CampaignId,
        end_turn: u64,
        turn: u64,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApprovalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApprovalError::Validation(_) => ErrorKind::Validation,
            ApprovalError::UnknownActor(_)
            | ApprovalError::UnknownSegment(_)
            | ApprovalError::UnknownCampaign(_) => ErrorKind::NotFound,
            ApprovalError::DuplicateActor(_)
            | ApprovalError::CampaignConflict { .. }
            | ApprovalError::CampaignNotDue { .. } => ErrorKind::Conflict,
            ApprovalError::Store(_) => ErrorKind::Store,
        }
    }
}

pub type ApprovalResult<T> = Result<T, ApprovalError>;
