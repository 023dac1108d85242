use chrono::Utc;
use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::{Engine, EngineError};

/// Gate for registry mutations.
pub fn require_admin(principal: &Principal) -> Result<(), EngineError> {
    if principal.is_admin() {
        Ok(())
    } else {
        Err(EngineError::Forbidden("Only administrators can manage places"))
    }
}

/// Field rules shared by create and update. Runs on the fully merged place.
fn validate_place(place: &Place) -> Result<(), EngineError> {
    if place.name.trim().is_empty() {
        return Err(EngineError::invalid("name", "is required"));
    }
    if place.name.chars().count() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("place name too long"));
    }
    if place.description.trim().is_empty() {
        return Err(EngineError::invalid("description", "is required"));
    }
    if place.description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(EngineError::LimitExceeded("place description too long"));
    }
    if place.capacity < 1 {
        return Err(EngineError::invalid("capacity", "must be at least 1"));
    }
    if place.capacity > MAX_CAPACITY {
        return Err(EngineError::LimitExceeded("capacity too large"));
    }
    if let (Some(from), Some(to)) = (place.available_from, place.available_to)
        && from > to
    {
        return Err(EngineError::invalid(
            "available_to",
            "must be a date after or equal to available_from",
        ));
    }
    if place.default_days.is_empty() {
        return Err(EngineError::invalid(
            "default_days",
            "must contain at least one weekday",
        ));
    }
    Ok(())
}

impl Engine {
    pub async fn create_place(
        &self,
        principal: &Principal,
        new: NewPlace,
    ) -> Result<Place, EngineError> {
        require_admin(principal)?;
        let now = Utc::now();
        let place = Place {
            id: Ulid::new(),
            name: new.name,
            description: new.description,
            capacity: new.capacity,
            kind: new.kind,
            active: new.active,
            available_from: new.available_from,
            available_to: new.available_to,
            default_days: new.default_days,
            default_hours: new.default_hours,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        validate_place(&place)?;

        let _catalog = self.catalog_gate.lock().await;
        if self.store.place_count() >= MAX_PLACES {
            return Err(EngineError::LimitExceeded("too many places"));
        }
        let event = Event::PlaceCreated {
            place: place.clone(),
        };
        self.wal_append(&event).await?;
        self.store.insert_place(PlaceState::new(place.clone()));
        metrics::gauge!(observability::PLACES_ACTIVE).increment(1.0);
        info!(place_id = %place.id, by = %principal.user_id, "place created");
        Ok(place)
    }

    /// Merge `patch` over the stored place and re-validate the result.
    /// Existing reservations are not re-checked against a narrowed policy.
    pub async fn update_place(
        &self,
        principal: &Principal,
        id: Ulid,
        patch: PlacePatch,
    ) -> Result<Place, EngineError> {
        require_admin(principal)?;
        let ps = self.place_handle(id)?;
        let mut guard = ps.write().await;
        if guard.place.is_deleted() {
            return Err(EngineError::PlaceNotFound(id));
        }

        let mut next = guard.place.clone();
        patch.apply_to(&mut next);
        validate_place(&next)?;
        next.updated_at = Utc::now();

        let event = Event::PlaceUpdated {
            place: next.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        info!(place_id = %id, by = %principal.user_id, "place updated");
        Ok(next)
    }

    /// Soft delete. The place disappears from reads; its reservations stay
    /// readable by their owners.
    pub async fn delete_place(&self, principal: &Principal, id: Ulid) -> Result<(), EngineError> {
        require_admin(principal)?;
        let ps = self.place_handle(id)?;
        let mut guard = ps.write().await;
        if guard.place.is_deleted() {
            return Err(EngineError::PlaceNotFound(id));
        }
        let event = Event::PlaceDeleted {
            id,
            deleted_at: Utc::now(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::gauge!(observability::PLACES_ACTIVE).decrement(1.0);
        info!(place_id = %id, by = %principal.user_id, "place deleted");
        Ok(())
    }
}
