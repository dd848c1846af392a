use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

pub(crate) fn validate_span(span: &Span) -> Result<(), EngineError> {
    if span.start >= span.end {
        return Err(EngineError::Validation("start must be before end"));
    }
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(EngineError::LimitExceeded("span too wide"));
    }
    Ok(())
}

/// Query windows may be wider than a slot, up to `MAX_QUERY_WINDOW_MS`.
pub(crate) fn validate_window(span: &Span) -> Result<(), EngineError> {
    if span.start >= span.end {
        return Err(EngineError::Validation("start must be before end"));
    }
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if span.duration_ms() > MAX_QUERY_WINDOW_MS {
        return Err(EngineError::LimitExceeded("query window too wide"));
    }
    Ok(())
}

/// Fails on the first active slot strictly overlapping `span`.
pub(crate) fn check_no_overlap(rs: &InterviewerState, span: &Span) -> Result<(), EngineError> {
    match rs.active_overlapping(span).next() {
        Some(existing) => Err(EngineError::Conflict(existing.id, "overlaps an existing slot")),
        None => Ok(()),
    }
}

/// A slot can take a booking of `span` only while AVAILABLE and only inside its own interval.
pub(crate) fn check_bookable(slot: &Slot, span: &Span) -> Result<(), EngineError> {
    if slot.state != SlotState::Available {
        return Err(EngineError::Conflict(slot.id, "slot is not available"));
    }
    if !slot.span.contains_span(span) {
        return Err(EngineError::OutOfRange {
            requested: *span,
            slot: slot.span,
        });
    }
    Ok(())
}

pub(crate) fn check_text(value: Option<&str>, max: usize, what: &'static str) -> Result<(), EngineError> {
    match value {
        Some(v) if v.len() > max => Err(EngineError::LimitExceeded(what)),
        _ => Ok(()),
    }
}
