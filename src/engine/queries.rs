use chrono::{NaiveDate, NaiveTime};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::find_conflict;
use super::{Engine, EngineError};

/// True when no booked reservation on `ps` blocks the filter's window.
/// With both dates and times the full date×time rule applies; with dates
/// only, any booked reservation touching those dates blocks the place.
fn free_for(
    ps: &PlaceState,
    dates: &ClosedRange<NaiveDate>,
    times: Option<&ClosedRange<NaiveTime>>,
) -> bool {
    let mut candidates = ps.overlapping(dates).filter(|r| r.is_booked());
    match times {
        Some(times) => {
            let probe = Slot {
                dates: *dates,
                times: *times,
            };
            find_conflict(&probe, candidates, None).is_none()
        }
        None => candidates.next().is_none(),
    }
}

impl Engine {
    /// A live place. Soft-deleted places read as absent.
    pub async fn get_place(&self, id: Ulid) -> Result<Place, EngineError> {
        let ps = self.place_handle(id)?;
        let guard = ps.read().await;
        if guard.place.is_deleted() {
            return Err(EngineError::PlaceNotFound(id));
        }
        Ok(guard.place.clone())
    }

    /// Live places, ordered by id.
    pub async fn list_places(&self) -> Vec<Place> {
        let mut places = Vec::new();
        for ps in self.store.place_handles() {
            let guard = ps.read().await;
            if !guard.place.is_deleted() {
                places.push(guard.place.clone());
            }
        }
        places
    }

    pub async fn filter_places(&self, filter: &PlaceFilter) -> Result<Vec<Place>, EngineError> {
        if let Some(dates) = &filter.dates
            && dates.end < dates.start
        {
            return Err(EngineError::invalid(
                "end_date",
                "must be a date after or equal to start_date",
            ));
        }
        if let Some(times) = &filter.times
            && times.end <= times.start
        {
            return Err(EngineError::invalid("end_time", "must be a time after start_time"));
        }

        let mut matches = Vec::new();
        for ps in self.store.place_handles() {
            let guard = ps.read().await;
            let place = &guard.place;
            if place.is_deleted()
                || filter.kind.is_some_and(|k| k != place.kind)
                || filter.min_capacity.is_some_and(|c| place.capacity < c)
            {
                continue;
            }
            if let Some(dates) = &filter.dates
                && !free_for(&guard, dates, filter.times.as_ref())
            {
                continue;
            }
            matches.push(place.clone());
            if matches.len() >= MAX_FILTER_RESULTS {
                break;
            }
        }
        Ok(matches)
    }

    /// Booked slots of a live place, in date order, without owner identity.
    pub async fn booked_schedule(&self, place_id: Ulid) -> Result<Vec<ScheduleEntry>, EngineError> {
        let ps = self.place_handle(place_id)?;
        let guard = ps.read().await;
        if guard.place.is_deleted() {
            return Err(EngineError::PlaceNotFound(place_id));
        }
        Ok(guard.booked().map(ScheduleEntry::from).collect())
    }

    /// Every reservation on a place, any status, ordered by start date.
    pub async fn reservations_for_place(
        &self,
        place_id: Ulid,
    ) -> Result<Vec<Reservation>, EngineError> {
        let ps = self.place_handle(place_id)?;
        let guard = ps.read().await;
        Ok(guard.reservations.clone())
    }

    /// Every reservation owned by `user`, ordered by id.
    pub async fn reservations_for_user(&self, user: &UserId) -> Vec<Reservation> {
        let mut ids = self.store.reservation_ids_for_user(user);
        ids.sort();
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(place_id) = self.store.place_of(&id) else {
                continue;
            };
            let Some(ps) = self.store.get_place(&place_id) else {
                continue;
            };
            let guard = ps.read().await;
            if let Some(r) = guard.reservation(id).filter(|r| r.user_id == *user) {
                out.push(r.clone());
            }
        }
        out
    }

    pub async fn get_reservation(
        &self,
        principal: &Principal,
        id: Ulid,
    ) -> Result<Reservation, EngineError> {
        let place_id = self
            .store
            .place_of(&id)
            .ok_or(EngineError::BookingNotFound(id))?;
        let ps = self
            .store
            .get_place(&place_id)
            .ok_or(EngineError::BookingNotFound(id))?;
        let guard = ps.read().await;
        guard
            .reservation(id)
            .filter(|r| r.user_id == principal.user_id)
            .cloned()
            .ok_or(EngineError::BookingNotFound(id))
    }

    pub async fn list_reservations(&self, principal: &Principal) -> Vec<Reservation> {
        self.reservations_for_user(&principal.user_id).await
    }
}
