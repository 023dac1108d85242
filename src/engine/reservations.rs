use chrono::Utc;
use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::availability::check_policy;
use super::conflict::{check_no_conflict, validate_event_name, validate_slot};
use super::{Engine, EngineError};

fn outcome_label<T>(result: &Result<T, EngineError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(EngineError::Conflict(_)) => "conflict",
        Err(EngineError::WalError(_)) => "error",
        Err(_) => "rejected",
    }
}

fn record<T>(operation: &'static str, result: &Result<T, EngineError>) {
    metrics::counter!(
        observability::BOOKINGS_TOTAL,
        "operation" => operation,
        "outcome" => outcome_label(result),
    )
    .increment(1);
    if let Err(EngineError::Conflict(existing)) = result {
        metrics::counter!(observability::BOOKING_CONFLICTS_TOTAL).increment(1);
        debug!(operation, %existing, "slot already booked");
    }
}

/// Not owned reads as absent so ids of other users' bookings stay opaque.
fn owned_by<'a>(
    reservation: Option<&'a Reservation>,
    principal: &Principal,
    id: Ulid,
) -> Result<&'a Reservation, EngineError> {
    reservation
        .filter(|r| r.user_id == principal.user_id)
        .ok_or(EngineError::BookingNotFound(id))
}

impl Engine {
    /// Admission rules a slot must pass on `ps` before it may be stored as
    /// booked: a live place, the availability policy when enforced, and no
    /// conflict with another booked reservation.
    fn admit(&self, ps: &PlaceState, slot: &Slot, exclude: Option<Ulid>) -> Result<(), EngineError> {
        if ps.place.is_deleted() {
            return Err(EngineError::PlaceNotFound(ps.place.id));
        }
        if self.enforce_availability {
            check_policy(&ps.place, slot).map_err(EngineError::Unavailable)?;
        }
        check_no_conflict(ps, slot, exclude)
    }

    pub async fn create_reservation(
        &self,
        principal: &Principal,
        new: NewReservation,
    ) -> Result<Reservation, EngineError> {
        let result = self.create_reservation_inner(principal, new).await;
        record("create", &result);
        result
    }

    async fn create_reservation_inner(
        &self,
        principal: &Principal,
        new: NewReservation,
    ) -> Result<Reservation, EngineError> {
        validate_event_name(&new.event_name)?;
        let slot = new.slot();
        validate_slot(&slot)?;

        let ps = self.place_handle(new.place_id)?;
        let mut guard = ps.write().await;
        if guard.booked().count() >= MAX_RESERVATIONS_PER_PLACE {
            return Err(EngineError::LimitExceeded("too many reservations on place"));
        }
        self.admit(&guard, &slot, None)?;

        let now = Utc::now();
        let reservation = Reservation {
            id: Ulid::new(),
            user_id: principal.user_id.clone(),
            place_id: new.place_id,
            start_date: new.start_date,
            end_date: new.end_date,
            start_time: new.start_time,
            end_time: new.end_time,
            status: BookingStatus::Booked,
            event_name: new.event_name,
            created_at: now,
            updated_at: now,
        };
        let event = Event::ReservationCreated {
            reservation: reservation.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        info!(
            reservation_id = %reservation.id,
            place_id = %reservation.place_id,
            user = %reservation.user_id,
            "reservation created"
        );
        Ok(reservation)
    }

    /// Merge `patch` over the stored reservation, re-check the merged slot
    /// against every other booked reservation, and store it as booked.
    /// A rejected update leaves the stored record untouched.
    pub async fn update_reservation(
        &self,
        principal: &Principal,
        id: Ulid,
        patch: ReservationPatch,
    ) -> Result<Reservation, EngineError> {
        let result = self.update_reservation_inner(principal, id, patch).await;
        record("update", &result);
        result
    }

    async fn update_reservation_inner(
        &self,
        principal: &Principal,
        id: Ulid,
        patch: ReservationPatch,
    ) -> Result<Reservation, EngineError> {
        if let Some(ref name) = patch.event_name {
            validate_event_name(name)?;
        }
        // Ownership first, so a foreign id never reveals anything about the
        // place named in the patch.
        self.get_reservation(principal, id).await?;

        let mut locks = self.lock_reservation(id, patch.place_id).await?;
        let current = owned_by(locks.source.reservation(id), principal, id)?.clone();
        let previous_place_id = current.place_id;

        let mut next = patch.merged_over(&current);
        let slot = next.slot();
        validate_slot(&slot)?;
        next.status = BookingStatus::Booked;
        next.updated_at = Utc::now();

        let event = Event::ReservationUpdated {
            reservation: next.clone(),
            previous_place_id,
        };
        match locks.target.as_mut() {
            None => {
                self.admit(&locks.source, &slot, Some(id))?;
                self.persist_and_apply(&mut locks.source, &event).await?;
            }
            Some(target) => {
                if target.booked().count() >= MAX_RESERVATIONS_PER_PLACE {
                    return Err(EngineError::LimitExceeded("too many reservations on place"));
                }
                self.admit(&**target, &slot, Some(id))?;
                self.wal_append(&event).await?;
                self.store.detach_reservation(&mut locks.source, id);
                self.store.apply_event(&mut **target, &event);
            }
        }
        info!(
            reservation_id = %id,
            place_id = %next.place_id,
            from_place = %previous_place_id,
            "reservation updated"
        );
        Ok(next)
    }

    /// Mark the reservation cancelled. The record is kept and its slot
    /// freed. Cancelling an already cancelled reservation changes nothing.
    pub async fn cancel_reservation(
        &self,
        principal: &Principal,
        id: Ulid,
    ) -> Result<Reservation, EngineError> {
        let result = self.cancel_reservation_inner(principal, id).await;
        record("cancel", &result);
        result
    }

    async fn cancel_reservation_inner(
        &self,
        principal: &Principal,
        id: Ulid,
    ) -> Result<Reservation, EngineError> {
        let mut locks = self.lock_reservation(id, None).await?;
        let current = owned_by(locks.source.reservation(id), principal, id)?;
        if !current.is_booked() {
            return Ok(current.clone());
        }
        let place_id = current.place_id;
        let event = Event::ReservationCancelled {
            id,
            place_id,
            at: Utc::now(),
        };
        self.persist_and_apply(&mut locks.source, &event).await?;
        info!(reservation_id = %id, %place_id, "reservation cancelled");
        locks
            .source
            .reservation(id)
            .cloned()
            .ok_or(EngineError::BookingNotFound(id))
    }

    /// Permanent removal.
    pub async fn delete_reservation(&self, principal: &Principal, id: Ulid) -> Result<(), EngineError> {
        let result = self.delete_reservation_inner(principal, id).await;
        record("delete", &result);
        result
    }

    async fn delete_reservation_inner(
        &self,
        principal: &Principal,
        id: Ulid,
    ) -> Result<(), EngineError> {
        let mut locks = self.lock_reservation(id, None).await?;
        let place_id = owned_by(locks.source.reservation(id), principal, id)?.place_id;
        let event = Event::ReservationDeleted { id, place_id };
        self.persist_and_apply(&mut locks.source, &event).await?;
        info!(reservation_id = %id, %place_id, "reservation deleted");
        Ok(())
    }
}
