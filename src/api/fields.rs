use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Deserializer};
use ulid::Ulid;

use crate::model::{hhmm, parse_weekday, HourWindow, PlaceKind, WeekdaySet};

use super::response::{ApiError, FieldErrors};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Collects per-field problems while a request body is turned into typed
/// values, so one response reports every bad field at once.
#[derive(Default)]
pub struct FieldParser {
    errors: FieldErrors,
}

impl FieldParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, field: &str, message: impl Into<String>) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn required<T>(&mut self, field: &str, value: Option<T>) -> Option<T> {
        if value.is_none() {
            self.error(field, format!("The {field} field is required."));
        }
        value
    }

    pub fn date(&mut self, field: &str, raw: Option<&str>) -> Option<NaiveDate> {
        let raw = raw?;
        match NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT) {
            Ok(d) => Some(d),
            Err(_) => {
                self.error(field, format!("The {field} is not a valid date (YYYY-MM-DD)."));
                None
            }
        }
    }

    pub fn time(&mut self, field: &str, raw: Option<&str>) -> Option<NaiveTime> {
        let raw = raw?;
        match hhmm::parse(raw.trim()) {
            Ok(t) => Some(t),
            Err(_) => {
                self.error(field, format!("The {field} does not match the format H:i."));
                None
            }
        }
    }

    pub fn id(&mut self, field: &str, raw: Option<&str>) -> Option<Ulid> {
        let raw = raw?;
        match Ulid::from_string(raw.trim()) {
            Ok(id) => Some(id),
            Err(_) => {
                self.error(field, format!("The selected {field} is invalid."));
                None
            }
        }
    }

    pub fn kind(&mut self, field: &str, raw: Option<&str>) -> Option<PlaceKind> {
        let raw = raw?;
        match raw.parse() {
            Ok(kind) => Some(kind),
            Err(_) => {
                self.error(field, format!("The selected {field} is invalid."));
                None
            }
        }
    }

    pub fn days(&mut self, field: &str, raw: Option<&[String]>) -> Option<WeekdaySet> {
        let raw = raw?;
        let mut set = WeekdaySet::EMPTY;
        for name in raw {
            match parse_weekday(name) {
                Some(day) => set.insert(day),
                None => self.error(field, format!("The selected {field} entry {name} is invalid.")),
            }
        }
        Some(set)
    }

    pub fn hours(&mut self, field: &str, raw: Option<&str>) -> Option<HourWindow> {
        let raw = raw?;
        match raw.trim().parse() {
            Ok(window) => Some(window),
            Err(e) => {
                self.error(field, format!("The {field} is invalid: {e}."));
                None
            }
        }
    }

    pub fn capacity(&mut self, field: &str, raw: Option<i64>) -> Option<u32> {
        let raw = raw?;
        if raw < 1 {
            self.error(field, format!("The {field} must be at least 1."));
            return None;
        }
        match u32::try_from(raw) {
            Ok(c) => Some(c),
            Err(_) => {
                self.error(field, format!("The {field} is too large."));
                None
            }
        }
    }

    pub fn text(&mut self, field: &str, raw: Option<String>, max: usize) -> Option<String> {
        let raw = raw?;
        if raw.chars().count() > max {
            self.error(
                field,
                format!("The {field} may not be greater than {max} characters."),
            );
        }
        Some(raw)
    }

    /// `Err` with every collected message, or `Ok` when the body was clean.
    pub fn finish(self) -> Result<(), ApiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation {
                message: "Validation Error.".into(),
                errors: self.errors,
            })
        }
    }
}

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`). Use with `#[serde(default)]`.
pub fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
