use ulid::Ulid;

use super::availability::PolicyViolation;

/// Message returned for every overlap rejection. Clients match on it.
pub const CONFLICT_MESSAGE: &str = "The selected time slot is already booked.";

#[derive(Debug)]
pub enum EngineError {
    Invalid {
        field: &'static str,
        reason: String,
    },
    PlaceNotFound(Ulid),
    BookingNotFound(Ulid),
    Forbidden(&'static str),
    /// Overlaps the booked reservation with this id.
    Conflict(Ulid),
    Unavailable(PolicyViolation),
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        EngineError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Invalid { field, reason } => write!(f, "invalid {field}: {reason}"),
            EngineError::PlaceNotFound(id) => write!(f, "place not found: {id}"),
            EngineError::BookingNotFound(id) => write!(f, "booking not found: {id}"),
            EngineError::Forbidden(msg) => write!(f, "forbidden: {msg}"),
            EngineError::Conflict(_) => f.write_str(CONFLICT_MESSAGE),
            EngineError::Unavailable(v) => write!(f, "place unavailable: {v}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "journal error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
