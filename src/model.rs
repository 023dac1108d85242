use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc, Weekday};
use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Serialize, Serializer};
use ulid::Ulid;

/// Closed interval `[start, end]`: both endpoints belong to the range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClosedRange<T> {
    pub start: T,
    pub end: T,
}

impl<T: Ord> ClosedRange<T> {
    pub fn new(start: T, end: T) -> Self {
        Self { start, end }
    }

    /// Touching endpoints count as overlap.
    pub fn overlaps(&self, other: &ClosedRange<T>) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// A reservation footprint: a closed date range crossed with a recurring
/// closed time-of-day window. The window applies to every date in the range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot<D = NaiveDate, T = NaiveTime> {
    pub dates: ClosedRange<D>,
    pub times: ClosedRange<T>,
}

impl<D: Ord, T: Ord> Slot<D, T> {
    /// Two slots conflict when their date ranges overlap AND their time
    /// windows overlap. The two tests are independent of each other.
    pub fn conflicts_with(&self, other: &Slot<D, T>) -> bool {
        self.dates.overlaps(&other.dates) && self.times.overlaps(&other.times)
    }
}

impl Slot {
    pub fn on(start_date: NaiveDate, end_date: NaiveDate, start_time: NaiveTime, end_time: NaiveTime) -> Self {
        Self {
            dates: ClosedRange::new(start_date, end_date),
            times: ClosedRange::new(start_time, end_time),
        }
    }
}

/// `HH:MM` wall-clock serde helpers.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%H:%M";

    /// Strict `HH:MM`, seconds are rejected.
    pub fn parse(s: &str) -> Result<NaiveTime, chrono::ParseError> {
        NaiveTime::parse_from_str(s, FORMAT)
    }

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&time.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse(&s).map_err(serde::de::Error::custom)
    }
}

// ── Identity ─────────────────────────────────────────────────────

/// Opaque user identifier handed over by the auth collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// The authenticated caller of a core operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub roles: Vec<Role>,
}

impl Principal {
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            user_id: UserId(id.into()),
            roles: vec![Role::User],
        }
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            user_id: UserId(id.into()),
            roles: vec![Role::Admin],
        }
    }

    pub fn is_admin(&self) -> bool {
        self.roles.contains(&Role::Admin)
    }
}

// ── Places ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaceKind {
    #[default]
    #[serde(rename = "salon")]
    Salon,
    #[serde(rename = "auditorio")]
    Auditorium,
    #[serde(rename = "sala de reunion")]
    MeetingRoom,
    #[serde(rename = "sala de conferencia")]
    ConferenceRoom,
}

impl FromStr for PlaceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "salon" => Ok(PlaceKind::Salon),
            "auditorio" => Ok(PlaceKind::Auditorium),
            "sala de reunion" | "sala de reunión" => Ok(PlaceKind::MeetingRoom),
            "sala de conferencia" => Ok(PlaceKind::ConferenceRoom),
            other => Err(format!("unknown place type: {other}")),
        }
    }
}

/// Set of weekdays, one bit per day counted from Monday.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub const EMPTY: WeekdaySet = WeekdaySet(0);
    pub const ALL: WeekdaySet = WeekdaySet(0b111_1111);
    /// Monday through Friday.
    pub const WORKWEEK: WeekdaySet = WeekdaySet(0b001_1111);

    pub fn insert(&mut self, day: Weekday) {
        self.0 |= 1 << day.num_days_from_monday();
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_monday()) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = Weekday> {
        let bits = self.0;
        (0..7u8)
            .filter(move |&bit| bits & (1 << bit) != 0)
            .filter_map(|bit| Weekday::try_from(bit).ok())
    }
}

impl Default for WeekdaySet {
    fn default() -> Self {
        Self::WORKWEEK
    }
}

impl FromIterator<Weekday> for WeekdaySet {
    fn from_iter<I: IntoIterator<Item = Weekday>>(iter: I) -> Self {
        let mut set = WeekdaySet::EMPTY;
        for day in iter {
            set.insert(day);
        }
        set
    }
}

impl fmt::Debug for WeekdaySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter().map(weekday_name)).finish()
    }
}

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// English names in any case, or the Spanish abbreviations `Lun`..`Dom`.
pub fn parse_weekday(name: &str) -> Option<Weekday> {
    let lowered = name.trim().to_lowercase();
    let spanish = match lowered.as_str() {
        "lun" => Some(Weekday::Mon),
        "mar" => Some(Weekday::Tue),
        "mie" | "mié" => Some(Weekday::Wed),
        "jue" => Some(Weekday::Thu),
        "vie" => Some(Weekday::Fri),
        "sab" | "sáb" => Some(Weekday::Sat),
        "dom" => Some(Weekday::Sun),
        _ => None,
    };
    spanish.or_else(|| lowered.parse::<Weekday>().ok())
}

impl Serialize for WeekdaySet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // Explicit length: the journal codec cannot encode unsized sequences.
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        for day in self.iter() {
            seq.serialize_element(weekday_name(day))?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for WeekdaySet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DaysVisitor;

        impl<'de> Visitor<'de> for DaysVisitor {
            type Value = WeekdaySet;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a list of weekday names")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<WeekdaySet, A::Error> {
                let mut set = WeekdaySet::EMPTY;
                while let Some(name) = seq.next_element::<String>()? {
                    let day = parse_weekday(&name)
                        .ok_or_else(|| de::Error::custom(format!("unknown weekday: {name}")))?;
                    set.insert(day);
                }
                Ok(set)
            }
        }

        deserializer.deserialize_seq(DaysVisitor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HourWindowError {
    Malformed,
    Inverted,
}

impl fmt::Display for HourWindowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HourWindowError::Malformed => f.write_str("hours must look like HH:MM-HH:MM"),
            HourWindowError::Inverted => f.write_str("opening time must be before closing time"),
        }
    }
}

impl std::error::Error for HourWindowError {}

/// Daily opening hours, `open < close`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HourWindow {
    pub open: NaiveTime,
    pub close: NaiveTime,
}

fn clock(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default()
}

impl HourWindow {
    pub fn new(open: NaiveTime, close: NaiveTime) -> Result<Self, HourWindowError> {
        if open >= close {
            return Err(HourWindowError::Inverted);
        }
        Ok(Self { open, close })
    }

    pub fn contains(&self, times: &ClosedRange<NaiveTime>) -> bool {
        self.open <= times.start && times.end <= self.close
    }
}

impl Default for HourWindow {
    fn default() -> Self {
        Self {
            open: clock(9, 0),
            close: clock(17, 0),
        }
    }
}

impl FromStr for HourWindow {
    type Err = HourWindowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (open, close) = s.split_once('-').ok_or(HourWindowError::Malformed)?;
        let strict = |part: &str| -> Result<NaiveTime, HourWindowError> {
            let b = part.as_bytes();
            let shaped = b.len() == 5
                && b[2] == b':'
                && [0, 1, 3, 4].iter().all(|&i| b[i].is_ascii_digit());
            if !shaped {
                return Err(HourWindowError::Malformed);
            }
            hhmm::parse(part).map_err(|_| HourWindowError::Malformed)
        };
        HourWindow::new(strict(open)?, strict(close)?)
    }
}

impl fmt::Display for HourWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            self.open.format(hhmm::FORMAT),
            self.close.format(hhmm::FORMAT)
        )
    }
}

impl Serialize for HourWindow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for HourWindow {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// A bookable place and its availability policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Place {
    pub id: Ulid,
    pub name: String,
    pub description: String,
    pub capacity: u32,
    #[serde(rename = "type")]
    pub kind: PlaceKind,
    pub active: bool,
    pub available_from: Option<NaiveDate>,
    pub available_to: Option<NaiveDate>,
    pub default_days: WeekdaySet,
    pub default_hours: HourWindow,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Place {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Single-date availability: inside the date window, on an offered
    /// weekday, and within the daily hours.
    pub fn is_available(&self, date: NaiveDate, times: &ClosedRange<NaiveTime>) -> bool {
        self.active
            && self.offers_date(date)
            && self.default_days.contains(date.weekday())
            && self.default_hours.contains(times)
    }

    pub fn offers_date(&self, date: NaiveDate) -> bool {
        self.available_from.is_none_or(|from| from <= date)
            && self.available_to.is_none_or(|to| date <= to)
    }
}

/// Fields for a new place. Policy fields default the same way a bare
/// admin request does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPlace {
    pub name: String,
    pub description: String,
    pub capacity: u32,
    pub kind: PlaceKind,
    pub active: bool,
    pub available_from: Option<NaiveDate>,
    pub available_to: Option<NaiveDate>,
    pub default_days: WeekdaySet,
    pub default_hours: HourWindow,
}

impl NewPlace {
    pub fn named(name: impl Into<String>, capacity: u32) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            capacity,
            kind: PlaceKind::default(),
            active: true,
            available_from: None,
            available_to: None,
            default_days: WeekdaySet::default(),
            default_hours: HourWindow::default(),
        }
    }
}

/// Partial place update. `None` keeps the stored value; for the date
/// window `Some(None)` clears the bound.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlacePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub capacity: Option<u32>,
    pub kind: Option<PlaceKind>,
    pub active: Option<bool>,
    pub available_from: Option<Option<NaiveDate>>,
    pub available_to: Option<Option<NaiveDate>>,
    pub default_days: Option<WeekdaySet>,
    pub default_hours: Option<HourWindow>,
}

impl PlacePatch {
    pub fn apply_to(self, place: &mut Place) {
        if let Some(name) = self.name {
            place.name = name;
        }
        if let Some(description) = self.description {
            place.description = description;
        }
        if let Some(capacity) = self.capacity {
            place.capacity = capacity;
        }
        if let Some(kind) = self.kind {
            place.kind = kind;
        }
        if let Some(active) = self.active {
            place.active = active;
        }
        if let Some(from) = self.available_from {
            place.available_from = from;
        }
        if let Some(to) = self.available_to {
            place.available_to = to;
        }
        if let Some(days) = self.default_days {
            place.default_days = days;
        }
        if let Some(hours) = self.default_hours {
            place.default_hours = hours;
        }
    }
}

// ── Reservations ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Booked,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub user_id: UserId,
    pub place_id: Ulid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub status: BookingStatus,
    pub event_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    pub fn slot(&self) -> Slot {
        Slot::on(self.start_date, self.end_date, self.start_time, self.end_time)
    }

    pub fn is_booked(&self) -> bool {
        self.status == BookingStatus::Booked
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReservation {
    pub place_id: Ulid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub event_name: String,
}

impl NewReservation {
    pub fn slot(&self) -> Slot {
        Slot::on(self.start_date, self.end_date, self.start_time, self.end_time)
    }
}

/// Partial reservation update; every present field replaces the stored one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReservationPatch {
    pub place_id: Option<Ulid>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub event_name: Option<String>,
}

impl ReservationPatch {
    /// Merge over a copy of `current`. Status and timestamps are left alone.
    pub fn merged_over(&self, current: &Reservation) -> Reservation {
        let mut next = current.clone();
        if let Some(place_id) = self.place_id {
            next.place_id = place_id;
        }
        if let Some(d) = self.start_date {
            next.start_date = d;
        }
        if let Some(d) = self.end_date {
            next.end_date = d;
        }
        if let Some(t) = self.start_time {
            next.start_time = t;
        }
        if let Some(t) = self.end_time {
            next.end_time = t;
        }
        if let Some(ref name) = self.event_name {
            next.event_name = name.clone();
        }
        next
    }
}

// ── Per-place state ──────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PlaceState {
    pub place: Place,
    /// Every reservation on the place, cancelled ones included, sorted by `start_date`.
    pub reservations: Vec<Reservation>,
}

impl PlaceState {
    pub fn new(place: Place) -> Self {
        Self {
            place,
            reservations: Vec::new(),
        }
    }

    /// Insert keeping sort order by start_date.
    pub fn insert_reservation(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .partition_point(|r| r.start_date <= reservation.start_date);
        self.reservations.insert(pos, reservation);
    }

    pub fn remove_reservation(&mut self, id: Ulid) -> Option<Reservation> {
        let pos = self.reservations.iter().position(|r| r.id == id)?;
        Some(self.reservations.remove(pos))
    }

    pub fn reservation(&self, id: Ulid) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }

    pub fn reservation_mut(&mut self, id: Ulid) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == id)
    }

    /// Reservations whose date range overlaps `dates` (closed), any status.
    /// Binary search skips everything starting after `dates.end`.
    pub fn overlapping(&self, dates: &ClosedRange<NaiveDate>) -> impl Iterator<Item = &Reservation> {
        let right_bound = self.reservations.partition_point(|r| r.start_date <= dates.end);
        let start = dates.start;
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.end_date >= start)
    }

    pub fn booked(&self) -> impl Iterator<Item = &Reservation> {
        self.reservations.iter().filter(|r| r.is_booked())
    }
}

/// The journal record format. One variant per state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    PlaceCreated {
        place: Place,
    },
    PlaceUpdated {
        place: Place,
    },
    PlaceDeleted {
        id: Ulid,
        deleted_at: DateTime<Utc>,
    },
    ReservationCreated {
        reservation: Reservation,
    },
    ReservationUpdated {
        reservation: Reservation,
        previous_place_id: Ulid,
    },
    ReservationCancelled {
        id: Ulid,
        place_id: Ulid,
        at: DateTime<Utc>,
    },
    ReservationDeleted {
        id: Ulid,
        place_id: Ulid,
    },
}

impl Event {
    /// The place whose state this event mutates.
    pub fn place_id(&self) -> Ulid {
        match self {
            Event::PlaceCreated { place } | Event::PlaceUpdated { place } => place.id,
            Event::PlaceDeleted { id, .. } => *id,
            Event::ReservationCreated { reservation }
            | Event::ReservationUpdated { reservation, .. } => reservation.place_id,
            Event::ReservationCancelled { place_id, .. }
            | Event::ReservationDeleted { place_id, .. } => *place_id,
        }
    }
}

// ── Query types ──────────────────────────────────────────────────

/// Criteria for `filter_places`. Time criteria only apply together with dates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaceFilter {
    pub kind: Option<PlaceKind>,
    pub min_capacity: Option<u32>,
    pub dates: Option<ClosedRange<NaiveDate>>,
    pub times: Option<ClosedRange<NaiveTime>>,
}

/// A booked slot on a place, without owner identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleEntry {
    pub id: Ulid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub event_name: String,
}

impl From<&Reservation> for ScheduleEntry {
    fn from(r: &Reservation) -> Self {
        Self {
            id: r.id,
            start_date: r.start_date,
            end_date: r.end_date,
            start_time: r.start_time,
            end_time: r.end_time,
            event_name: r.event_name.clone(),
        }
    }
}
