use chrono::{Datelike, NaiveDate, Weekday};

use crate::model::*;

/// Why a slot falls outside a place's availability policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyViolation {
    Inactive,
    OutsideDateWindow { date: NaiveDate },
    DayNotOffered { date: NaiveDate, weekday: Weekday },
    OutsideHours { hours: HourWindow },
}

impl std::fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyViolation::Inactive => f.write_str("place is not active"),
            PolicyViolation::OutsideDateWindow { date } => {
                write!(f, "{date} is outside the place's availability window")
            }
            PolicyViolation::DayNotOffered { date, weekday } => {
                write!(f, "{date} is a {}, which the place does not offer", weekday_name(*weekday))
            }
            PolicyViolation::OutsideHours { hours } => {
                write!(f, "requested time is outside opening hours {hours}")
            }
        }
    }
}

/// Availability-policy check, independent of other bookings.
///
/// Every date of the slot must pass `Place::is_available`. Returns the
/// violation for the first failing date, scanning dates in order.
pub fn check_policy(place: &Place, slot: &Slot) -> Result<(), PolicyViolation> {
    match slot
        .dates
        .start
        .iter_days()
        .take_while(|d| *d <= slot.dates.end)
        .find(|d| !place.is_available(*d, &slot.times))
    {
        Some(date) => Err(violation(place, date, slot)),
        None => Ok(()),
    }
}

/// Which part of the policy rejects `date`. Only called for dates that
/// fail `Place::is_available`.
fn violation(place: &Place, date: NaiveDate, slot: &Slot) -> PolicyViolation {
    if !place.active {
        PolicyViolation::Inactive
    } else if !place.default_hours.contains(&slot.times) {
        PolicyViolation::OutsideHours {
            hours: place.default_hours,
        }
    } else if !place.offers_date(date) {
        PolicyViolation::OutsideDateWindow { date }
    } else {
        PolicyViolation::DayNotOffered {
            date,
            weekday: date.weekday(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ulid::Ulid;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn slot(start: &str, end: &str, from: &str, to: &str) -> Slot {
        Slot::on(d(start), d(end), hhmm::parse(from).unwrap(), hhmm::parse(to).unwrap())
    }

    fn place() -> Place {
        let now = Utc::now();
        Place {
            id: Ulid::new(),
            name: "Auditorium".into(),
            description: "Main hall".into(),
            capacity: 300,
            kind: PlaceKind::Auditorium,
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

    #[test]
    fn weekday_inside_hours_is_allowed() {
        // 2024-10-15 is a Tuesday.
        assert_eq!(check_policy(&place(), &slot("2024-10-15", "2024-10-15", "14:00", "16:00")), Ok(()));
    }

    #[test]
    fn hours_boundaries_are_inclusive() {
        assert_eq!(check_policy(&place(), &slot("2024-10-15", "2024-10-15", "09:00", "17:00")), Ok(()));
        assert!(matches!(
            check_policy(&place(), &slot("2024-10-15", "2024-10-15", "08:59", "10:00")),
            Err(PolicyViolation::OutsideHours { .. })
        ));
        assert!(matches!(
            check_policy(&place(), &slot("2024-10-15", "2024-10-15", "16:00", "17:01")),
            Err(PolicyViolation::OutsideHours { .. })
        ));
    }

    #[test]
    fn weekend_rejected_by_default_days() {
        // 2024-10-19 is a Saturday.
        assert_eq!(
            check_policy(&place(), &slot("2024-10-19", "2024-10-19", "10:00", "11:00")),
            Err(PolicyViolation::DayNotOffered {
                date: d("2024-10-19"),
                weekday: Weekday::Sat
            })
        );
    }

    #[test]
    fn multi_day_span_checks_every_date() {
        // Thursday to Monday crosses the weekend.
        assert!(matches!(
            check_policy(&place(), &slot("2024-10-17", "2024-10-21", "10:00", "11:00")),
            Err(PolicyViolation::DayNotOffered { weekday: Weekday::Sat, .. })
        ));
        let mut open_daily = place();
        open_daily.default_days = WeekdaySet::ALL;
        assert_eq!(
            check_policy(&open_daily, &slot("2024-10-17", "2024-10-21", "10:00", "11:00")),
            Ok(())
        );
    }

    #[test]
    fn date_window_bounds_apply_independently() {
        let mut p = place();
        p.available_from = Some(d("2024-10-01"));
        assert_eq!(
            check_policy(&p, &slot("2024-09-30", "2024-10-01", "10:00", "11:00")),
            Err(PolicyViolation::OutsideDateWindow { date: d("2024-09-30") })
        );
        assert_eq!(check_policy(&p, &slot("2025-06-02", "2025-06-02", "10:00", "11:00")), Ok(()));

        p.available_to = Some(d("2024-10-31"));
        assert_eq!(
            check_policy(&p, &slot("2024-10-31", "2024-11-01", "10:00", "11:00")),
            Err(PolicyViolation::OutsideDateWindow { date: d("2024-11-01") })
        );
    }

    #[test]
    fn inactive_place_offers_nothing() {
        let mut p = place();
        p.active = false;
        assert_eq!(
            check_policy(&p, &slot("2024-10-15", "2024-10-15", "10:00", "11:00")),
            Err(PolicyViolation::Inactive)
        );
    }

    #[test]
    fn single_date_predicate() {
        let p = place();
        let times = ClosedRange::new(hhmm::parse("10:00").unwrap(), hhmm::parse("11:00").unwrap());
        assert!(p.is_available(d("2024-10-18"), &times));
        assert!(!p.is_available(d("2024-10-19"), &times));
        let late = ClosedRange::new(hhmm::parse("16:30").unwrap(), hhmm::parse("17:30").unwrap());
        assert!(!p.is_available(d("2024-10-18"), &late));
    }
}
