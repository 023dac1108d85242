use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::*;

use super::SharedPlaceState;

/// Places with their reservations, plus the two lookup indices the service
/// needs: reservation → place and owner → reservations.
///
/// Index entries are only touched from `apply_event`, which runs while the
/// caller holds the write lock of the affected place.
pub struct InMemoryStore {
    places: DashMap<Ulid, SharedPlaceState>,
    reservation_to_place: DashMap<Ulid, Ulid>,
    by_user: DashMap<UserId, Vec<Ulid>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            places: DashMap::new(),
            reservation_to_place: DashMap::new(),
            by_user: DashMap::new(),
        }
    }

    // ── Places ───────────────────────────────────────────────

    /// Includes soft-deleted places.
    pub fn place_count(&self) -> usize {
        self.places.len()
    }

    pub fn get_place(&self, id: &Ulid) -> Option<SharedPlaceState> {
        self.places.get(id).map(|e| e.value().clone())
    }

    pub fn insert_place(&self, state: PlaceState) {
        self.places.insert(state.place.id, Arc::new(RwLock::new(state)));
    }

    /// Ids sorted ascending.
    pub fn place_ids(&self) -> Vec<Ulid> {
        let mut ids: Vec<Ulid> = self.places.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }

    /// Handles in id order. Collected up front so no shard guard is held
    /// across an `.await` on the place locks.
    pub fn place_handles(&self) -> Vec<SharedPlaceState> {
        self.place_ids()
            .iter()
            .filter_map(|id| self.get_place(id))
            .collect()
    }

    // ── Reservation indices ──────────────────────────────────

    pub fn place_of(&self, reservation_id: &Ulid) -> Option<Ulid> {
        self.reservation_to_place.get(reservation_id).map(|e| *e.value())
    }

    pub fn reservation_ids_for_user(&self, user: &UserId) -> Vec<Ulid> {
        self.by_user
            .get(user)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    fn index_reservation(&self, reservation: &Reservation) {
        self.reservation_to_place
            .insert(reservation.id, reservation.place_id);
        let mut owned = self.by_user.entry(reservation.user_id.clone()).or_default();
        if !owned.contains(&reservation.id) {
            owned.push(reservation.id);
        }
    }

    fn unindex_reservation(&self, reservation: &Reservation) {
        self.reservation_to_place.remove(&reservation.id);
        if let Some(mut owned) = self.by_user.get_mut(&reservation.user_id) {
            owned.retain(|id| *id != reservation.id);
        }
    }

    // ── Event application ────────────────────────────────────

    /// Apply `event` to the place it targets. `PlaceCreated` is handled at the
    /// map level by `insert_place`. A `ReservationUpdated` that moves places is
    /// applied to the destination; the caller detaches the record from the
    /// source with `detach_reservation`.
    pub fn apply_event(&self, ps: &mut PlaceState, event: &Event) {
        match event {
            Event::PlaceUpdated { place } => {
                ps.place = place.clone();
            }
            Event::PlaceDeleted { deleted_at, .. } => {
                ps.place.deleted_at = Some(*deleted_at);
                ps.place.updated_at = *deleted_at;
            }
            Event::ReservationCreated { reservation } => {
                ps.insert_reservation(reservation.clone());
                self.index_reservation(reservation);
            }
            Event::ReservationUpdated { reservation, .. } => {
                // Remove and reinsert so the start_date ordering holds.
                ps.remove_reservation(reservation.id);
                ps.insert_reservation(reservation.clone());
                self.index_reservation(reservation);
            }
            Event::ReservationCancelled { id, at, .. } => {
                if let Some(r) = ps.reservation_mut(*id) {
                    r.status = BookingStatus::Cancelled;
                    r.updated_at = *at;
                }
            }
            Event::ReservationDeleted { id, .. } => {
                if let Some(removed) = ps.remove_reservation(*id) {
                    self.unindex_reservation(&removed);
                }
            }
            Event::PlaceCreated { .. } => {}
        }
    }

    /// Remove a reservation from its old place during a move. The indices are
    /// rewritten when the destination applies the update.
    pub fn detach_reservation(&self, source: &mut PlaceState, id: Ulid) {
        source.remove_reservation(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn place() -> Place {
        let now = Utc::now();
        Place {
            id: Ulid::new(),
            name: "Sala 1".into(),
            description: "Ground floor".into(),
            capacity: 12,
            kind: PlaceKind::MeetingRoom,
            active: true,
            available_from: None,
            available_to: None,
            default_days: WeekdaySet::default(),
            default_hours: HourWindow::default(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    fn reservation(place_id: Ulid, user: &str, day: &str) -> Reservation {
        let now = Utc::now();
        let date: NaiveDate = day.parse().unwrap();
        Reservation {
            id: Ulid::new(),
            user_id: UserId::from(user),
            place_id,
            start_date: date,
            end_date: date,
            start_time: hhmm::parse("10:00").unwrap(),
            end_time: hhmm::parse("11:00").unwrap(),
            status: BookingStatus::Booked,
            event_name: "Sync".into(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn create_indexes_by_place_and_user() {
        let store = InMemoryStore::new();
        let p = place();
        let mut ps = PlaceState::new(p.clone());
        let r = reservation(p.id, "ana", "2024-10-15");

        store.apply_event(&mut ps, &Event::ReservationCreated { reservation: r.clone() });

        assert_eq!(store.place_of(&r.id), Some(p.id));
        assert_eq!(store.reservation_ids_for_user(&UserId::from("ana")), vec![r.id]);
        assert!(store.reservation_ids_for_user(&UserId::from("bob")).is_empty());
        assert_eq!(ps.reservations.len(), 1);
    }

    #[test]
    fn cancel_keeps_record_and_index() {
        let store = InMemoryStore::new();
        let p = place();
        let mut ps = PlaceState::new(p.clone());
        let r = reservation(p.id, "ana", "2024-10-15");
        store.apply_event(&mut ps, &Event::ReservationCreated { reservation: r.clone() });

        let at = Utc::now();
        store.apply_event(
            &mut ps,
            &Event::ReservationCancelled { id: r.id, place_id: p.id, at },
        );

        let stored = ps.reservation(r.id).unwrap();
        assert_eq!(stored.status, BookingStatus::Cancelled);
        assert_eq!(stored.updated_at, at);
        assert_eq!(store.place_of(&r.id), Some(p.id));
        assert_eq!(ps.booked().count(), 0);
    }

    #[test]
    fn delete_drops_record_and_indices() {
        let store = InMemoryStore::new();
        let p = place();
        let mut ps = PlaceState::new(p.clone());
        let r = reservation(p.id, "ana", "2024-10-15");
        store.apply_event(&mut ps, &Event::ReservationCreated { reservation: r.clone() });
        store.apply_event(&mut ps, &Event::ReservationDeleted { id: r.id, place_id: p.id });

        assert!(ps.reservations.is_empty());
        assert_eq!(store.place_of(&r.id), None);
        assert!(store.reservation_ids_for_user(&UserId::from("ana")).is_empty());
    }

    #[test]
    fn update_resorts_by_start_date() {
        let store = InMemoryStore::new();
        let p = place();
        let mut ps = PlaceState::new(p.clone());
        let early = reservation(p.id, "ana", "2024-10-10");
        let late = reservation(p.id, "ana", "2024-10-20");
        store.apply_event(&mut ps, &Event::ReservationCreated { reservation: early.clone() });
        store.apply_event(&mut ps, &Event::ReservationCreated { reservation: late.clone() });

        let mut moved = early.clone();
        moved.start_date = "2024-10-25".parse().unwrap();
        moved.end_date = moved.start_date;
        store.apply_event(
            &mut ps,
            &Event::ReservationUpdated { reservation: moved, previous_place_id: p.id },
        );

        let order: Vec<Ulid> = ps.reservations.iter().map(|r| r.id).collect();
        assert_eq!(order, vec![late.id, early.id]);
        assert_eq!(store.reservation_ids_for_user(&UserId::from("ana")).len(), 2);
    }

    #[test]
    fn move_between_places_reindexes() {
        let store = InMemoryStore::new();
        let a = place();
        let b = place();
        let mut source = PlaceState::new(a.clone());
        let mut dest = PlaceState::new(b.clone());
        let r = reservation(a.id, "ana", "2024-10-15");
        store.apply_event(&mut source, &Event::ReservationCreated { reservation: r.clone() });

        let mut moved = r.clone();
        moved.place_id = b.id;
        store.detach_reservation(&mut source, r.id);
        store.apply_event(
            &mut dest,
            &Event::ReservationUpdated { reservation: moved, previous_place_id: a.id },
        );

        assert!(source.reservations.is_empty());
        assert_eq!(dest.reservations.len(), 1);
        assert_eq!(store.place_of(&r.id), Some(b.id));
    }

    #[test]
    fn soft_delete_marks_place() {
        let store = InMemoryStore::new();
        let p = place();
        let mut ps = PlaceState::new(p.clone());
        store.apply_event(&mut ps, &Event::PlaceDeleted { id: p.id, deleted_at: Utc::now() });
        assert!(ps.place.is_deleted());
    }
}
