use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use ulid::Ulid;

use crate::auth::AuthUser;
use crate::limits::MAX_EVENT_NAME_LEN;
use crate::model::{NewReservation, ReservationPatch};

use super::fields::FieldParser;
use super::{ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub place_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub event_name: Option<String>,
}

/// Every field optional; `null` reads as absent.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateBookingRequest {
    pub place_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub event_name: Option<String>,
}

pub async fn index(
    AuthUser(principal): AuthUser,
    State(state): State<AppState>,
) -> Result<ApiResponse, ApiError> {
    let bookings = state.engine.list_reservations(&principal).await;
    ApiResponse::ok("bookings", bookings, "Bookings obtained successfully.")
}

pub async fn store(
    AuthUser(principal): AuthUser,
    State(state): State<AppState>,
    body: Result<Json<CreateBookingRequest>, JsonRejection>,
) -> Result<ApiResponse, ApiError> {
    let Json(req) = body?;

    let mut p = FieldParser::new();
    let place_id = p.required("place_id", req.place_id.as_deref());
    let place_id = p.id("place_id", place_id);
    let start_date = p.required("start_date", req.start_date.as_deref());
    let start_date = p.date("start_date", start_date);
    let end_date = p.required("end_date", req.end_date.as_deref());
    let end_date = p.date("end_date", end_date);
    let start_time = p.required("start_time", req.start_time.as_deref());
    let start_time = p.time("start_time", start_time);
    let end_time = p.required("end_time", req.end_time.as_deref());
    let end_time = p.time("end_time", end_time);
    let event_name = req.event_name.filter(|s| !s.trim().is_empty());
    let event_name = p.required("event_name", event_name);
    let event_name = p.text("event_name", event_name, MAX_EVENT_NAME_LEN);
    p.finish()?;

    let (Some(place_id), Some(start_date), Some(end_date), Some(start_time), Some(end_time), Some(event_name)) =
        (place_id, start_date, end_date, start_time, end_time, event_name)
    else {
        return Err(ApiError::BadRequest("incomplete booking".into()));
    };
    let new = NewReservation {
        place_id,
        start_date,
        end_date,
        start_time,
        end_time,
        event_name,
    };
    let booking = state.engine.create_reservation(&principal, new).await?;
    ApiResponse::created("booking", booking, "Booking created successfully.")
}

pub async fn show(
    AuthUser(principal): AuthUser,
    State(state): State<AppState>,
    id: Result<Path<Ulid>, PathRejection>,
) -> Result<ApiResponse, ApiError> {
    let Path(id) = id?;
    let booking = state.engine.get_reservation(&principal, id).await?;
    ApiResponse::ok("booking", booking, "Booking details.")
}

pub async fn update(
    AuthUser(principal): AuthUser,
    State(state): State<AppState>,
    id: Result<Path<Ulid>, PathRejection>,
    body: Result<Json<UpdateBookingRequest>, JsonRejection>,
) -> Result<ApiResponse, ApiError> {
    let Path(id) = id?;
    let Json(req) = body?;

    let mut p = FieldParser::new();
    let event_name = req.event_name.filter(|s| !s.trim().is_empty());
    let patch = ReservationPatch {
        place_id: p.id("place_id", req.place_id.as_deref()),
        start_date: p.date("start_date", req.start_date.as_deref()),
        end_date: p.date("end_date", req.end_date.as_deref()),
        start_time: p.time("start_time", req.start_time.as_deref()),
        end_time: p.time("end_time", req.end_time.as_deref()),
        event_name: p.text("event_name", event_name, MAX_EVENT_NAME_LEN),
    };
    p.finish()?;

    let booking = state.engine.update_reservation(&principal, id, patch).await?;
    ApiResponse::ok("booking", booking, "Booking updated successfully.")
}

/// Hard delete. Succeeds with an empty 204.
pub async fn destroy(
    AuthUser(principal): AuthUser,
    State(state): State<AppState>,
    id: Result<Path<Ulid>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = id?;
    state.engine.delete_reservation(&principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn cancel(
    AuthUser(principal): AuthUser,
    State(state): State<AppState>,
    id: Result<Path<Ulid>, PathRejection>,
) -> Result<ApiResponse, ApiError> {
    let Path(id) = id?;
    let booking = state.engine.cancel_reservation(&principal, id).await?;
    ApiResponse::ok("booking", booking, "Booking cancelled successfully.")
}
