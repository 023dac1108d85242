use chrono::{NaiveDate, NaiveTime};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// Anything that can occupy a slot on a place.
pub trait SlotHolder<D = NaiveDate, T = NaiveTime> {
    fn holder_id(&self) -> Ulid;
    fn held_slot(&self) -> Slot<D, T>;
    /// Inactive holders (e.g. cancelled bookings) never conflict.
    fn is_active(&self) -> bool;
}

impl SlotHolder for Reservation {
    fn holder_id(&self) -> Ulid {
        self.id
    }

    fn held_slot(&self) -> Slot {
        self.slot()
    }

    fn is_active(&self) -> bool {
        self.is_booked()
    }
}

/// First active holder in `existing` whose slot conflicts with `candidate`.
///
/// Dates and times are compared as two independent closed intervals and the
/// results conjoined, so a time window recurs on every date of the range.
/// `exclude` skips the candidate's own record when re-checking an update.
pub fn find_conflict<'a, D, T, H, I>(
    candidate: &Slot<D, T>,
    existing: I,
    exclude: Option<Ulid>,
) -> Option<&'a H>
where
    D: Ord,
    T: Ord,
    H: SlotHolder<D, T> + 'a,
    I: IntoIterator<Item = &'a H>,
{
    existing
        .into_iter()
        .filter(|h| h.is_active())
        .filter(|h| exclude != Some(h.holder_id()))
        .find(|h| candidate.conflicts_with(&h.held_slot()))
}

/// Conflict check against one place's reservations. Caller holds the place lock.
pub(crate) fn check_no_conflict(
    ps: &PlaceState,
    candidate: &Slot,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    match find_conflict(candidate, ps.overlapping(&candidate.dates), exclude) {
        Some(existing) => Err(EngineError::Conflict(existing.id)),
        None => Ok(()),
    }
}

pub(crate) fn validate_slot(slot: &Slot) -> Result<(), EngineError> {
    if slot.dates.end < slot.dates.start {
        return Err(EngineError::invalid(
            "end_date",
            "must be a date after or equal to start_date",
        ));
    }
    if slot.times.end <= slot.times.start {
        return Err(EngineError::invalid("end_time", "must be a time after start_time"));
    }
    let days = (slot.dates.end - slot.dates.start).num_days() + 1;
    if days > MAX_RESERVATION_DAYS {
        return Err(EngineError::LimitExceeded("reservation spans too many days"));
    }
    Ok(())
}

pub(crate) fn validate_event_name(name: &str) -> Result<(), EngineError> {
    if name.trim().is_empty() {
        return Err(EngineError::invalid("event_name", "is required"));
    }
    if name.chars().count() > MAX_EVENT_NAME_LEN {
        return Err(EngineError::LimitExceeded("event name too long"));
    }
    Ok(())
}
