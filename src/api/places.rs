use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::auth::AuthUser;
use crate::engine::require_admin;
use crate::limits::{MAX_DESCRIPTION_LEN, MAX_NAME_LEN};
use crate::model::{
    weekday_name, ClosedRange, HourWindow, NewPlace, Place, PlaceFilter, PlacePatch,
};

use super::fields::{double_option, FieldParser};
use super::{ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub struct CreatePlaceRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub capacity: Option<i64>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub active: Option<bool>,
    pub available_from: Option<String>,
    pub available_to: Option<String>,
    pub default_days: Option<Vec<String>>,
    pub default_hours: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePlaceRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub capacity: Option<i64>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub active: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub available_from: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub available_to: Option<Option<String>>,
    pub default_days: Option<Vec<String>>,
    pub default_hours: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FilterQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub capacity: Option<i64>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

#[derive(Serialize)]
struct Availability {
    days: Vec<&'static str>,
    hours: HourWindow,
}

#[derive(Serialize)]
struct PlaceDetail {
    place: Place,
    availability: Availability,
}

impl From<Place> for PlaceDetail {
    fn from(place: Place) -> Self {
        let availability = Availability {
            days: place.default_days.iter().map(weekday_name).collect(),
            hours: place.default_hours,
        };
        Self {
            place,
            availability,
        }
    }
}

pub async fn index(_user: AuthUser, State(state): State<AppState>) -> Result<ApiResponse, ApiError> {
    let places = state.engine.list_places().await;
    let message = if places.is_empty() {
        "No places found."
    } else {
        "Places obtained successfully."
    };
    ApiResponse::ok("places", places, message)
}

pub async fn store(
    AuthUser(principal): AuthUser,
    State(state): State<AppState>,
    body: Result<Json<CreatePlaceRequest>, JsonRejection>,
) -> Result<ApiResponse, ApiError> {
    require_admin(&principal)?;
    let Json(req) = body?;

    let mut p = FieldParser::new();
    let name = p.text("name", non_blank(req.name), MAX_NAME_LEN);
    let name = p.required("name", name);
    let description = p.text("description", non_blank(req.description), MAX_DESCRIPTION_LEN);
    let description = p.required("description", description);
    let capacity = match req.capacity {
        None => p.required("capacity", None),
        raw => p.capacity("capacity", raw),
    };
    let kind = p.kind("type", req.kind.as_deref());
    let available_from = p.date("available_from", req.available_from.as_deref());
    let available_to = p.date("available_to", req.available_to.as_deref());
    let default_days = p.days("default_days", req.default_days.as_deref());
    let default_hours = p.hours("default_hours", req.default_hours.as_deref());
    p.finish()?;

    let (Some(name), Some(description), Some(capacity)) = (name, description, capacity) else {
        return Err(ApiError::BadRequest("incomplete place".into()));
    };
    let new = NewPlace {
        name,
        description,
        capacity,
        kind: kind.unwrap_or_default(),
        active: req.active.unwrap_or(true),
        available_from,
        available_to,
        default_days: default_days.unwrap_or_default(),
        default_hours: default_hours.unwrap_or_default(),
    };
    let place = state.engine.create_place(&principal, new).await?;
    ApiResponse::created("place", place, "Place created successfully.")
}

fn non_blank(raw: Option<String>) -> Option<String> {
    raw.filter(|s| !s.trim().is_empty())
}

pub async fn show(
    _user: AuthUser,
    State(state): State<AppState>,
    id: Result<Path<Ulid>, PathRejection>,
) -> Result<ApiResponse, ApiError> {
    let Path(id) = id?;
    let place = state.engine.get_place(id).await?;
    ApiResponse::with_data(PlaceDetail::from(place), "Place retrieved successfully.")
}

pub async fn update(
    AuthUser(principal): AuthUser,
    State(state): State<AppState>,
    id: Result<Path<Ulid>, PathRejection>,
    body: Result<Json<UpdatePlaceRequest>, JsonRejection>,
) -> Result<ApiResponse, ApiError> {
    let Path(id) = id?;
    require_admin(&principal)?;
    let Json(req) = body?;

    let mut p = FieldParser::new();
    let patch = PlacePatch {
        name: p.text("name", req.name, MAX_NAME_LEN),
        description: p.text("description", req.description, MAX_DESCRIPTION_LEN),
        capacity: p.capacity("capacity", req.capacity),
        kind: p.kind("type", req.kind.as_deref()),
        active: req.active,
        available_from: req
            .available_from
            .map(|raw| p.date("available_from", raw.as_deref())),
        available_to: req
            .available_to
            .map(|raw| p.date("available_to", raw.as_deref())),
        default_days: p.days("default_days", req.default_days.as_deref()),
        default_hours: p.hours("default_hours", req.default_hours.as_deref()),
    };
    p.finish()?;

    let place = state.engine.update_place(&principal, id, patch).await?;
    ApiResponse::ok("place", place, "Place updated successfully.")
}

pub async fn destroy(
    AuthUser(principal): AuthUser,
    State(state): State<AppState>,
    id: Result<Path<Ulid>, PathRejection>,
) -> Result<ApiResponse, ApiError> {
    let Path(id) = id?;
    state.engine.delete_place(&principal, id).await?;
    Ok(ApiResponse::message("Place deleted successfully."))
}

/// Dates and times only narrow the result when both ends are given.
pub async fn filter(
    _user: AuthUser,
    State(state): State<AppState>,
    query: Result<Query<FilterQuery>, QueryRejection>,
) -> Result<ApiResponse, ApiError> {
    let Query(q) = query?;

    let mut p = FieldParser::new();
    let kind = p.kind("type", q.kind.as_deref());
    let min_capacity = p.capacity("capacity", q.capacity);
    let start_date = p.date("start_date", q.start_date.as_deref());
    let end_date = p.date("end_date", q.end_date.as_deref());
    let start_time = p.time("start_time", q.start_time.as_deref());
    let end_time = p.time("end_time", q.end_time.as_deref());
    p.finish()?;

    let filter = PlaceFilter {
        kind,
        min_capacity,
        dates: start_date.zip(end_date).map(|(s, e)| ClosedRange::new(s, e)),
        times: start_time.zip(end_time).map(|(s, e)| ClosedRange::new(s, e)),
    };
    let places = state.engine.filter_places(&filter).await?;
    ApiResponse::ok("places", places, "Filtered places obtained successfully.")
}

pub async fn booked_schedule(
    _user: AuthUser,
    State(state): State<AppState>,
    id: Result<Path<Ulid>, PathRejection>,
) -> Result<ApiResponse, ApiError> {
    let Path(id) = id?;
    let schedule = state.engine.booked_schedule(id).await?;
    ApiResponse::ok("schedule", schedule, "Booked schedule obtained successfully.")
}
