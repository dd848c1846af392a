use ulid::Ulid;

use crate::model::Span;

/// Kind of record a `NotFound` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Slot,
    Interviewer,
    Request,
    Schedule,
    Panel,
    Candidate,
    Department,
    Designation,
    Technology,
}

impl Entity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Entity::Slot => "slot",
            Entity::Interviewer => "interviewer",
            Entity::Request => "request",
            Entity::Schedule => "schedule",
            Entity::Panel => "panel",
            Entity::Candidate => "candidate",
            Entity::Department => "department",
            Entity::Designation => "designation",
            Entity::Technology => "technology",
        }
    }
}

#[derive(Debug)]
pub enum EngineError {
    NotFound(Entity, Ulid),
    /// The record in the way, and what is wrong with it.
    Conflict(Ulid, &'static str),
    OutOfRange {
        requested: Span,
        slot: Span,
    },
    /// Carries the rejected caller.
    Unauthorized(Ulid),
    AlreadyCancelled(Ulid),
    Validation(&'static str),
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    /// Short stable label, used as a metrics dimension.
    pub fn label(&self) -> &'static str {
        match self {
            EngineError::NotFound(..) => "not_found",
            EngineError::Conflict(..) => "conflict",
            EngineError::OutOfRange { .. } => "out_of_range",
            EngineError::Unauthorized(_) => "unauthorized",
            EngineError::AlreadyCancelled(_) => "already_cancelled",
            EngineError::Validation(_) => "validation",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::WalError(_) => "wal",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(entity, id) => write!(f, "{} not found: {id}", entity.as_str()),
            EngineError::Conflict(id, reason) => write!(f, "conflict with {id}: {reason}"),
            EngineError::OutOfRange { requested, slot } => write!(
                f,
                "booking [{}, {}) is outside slot [{}, {})",
                requested.start, requested.end, slot.start, slot.end
            ),
            EngineError::Unauthorized(caller) => write!(f, "caller {caller} is not allowed to do this"),
            EngineError::AlreadyCancelled(id) => write!(f, "already cancelled: {id}"),
            EngineError::Validation(msg) => write!(f, "invalid input: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
