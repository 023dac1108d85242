//! Hard limits enforced by the engine. Requests past a limit fail with
//! `EngineError::LimitExceeded` before anything is journaled.

pub const MAX_PLACES: usize = 10_000;
pub const MAX_NAME_LEN: usize = 255;
pub const MAX_DESCRIPTION_LEN: usize = 10_000;
pub const MAX_EVENT_NAME_LEN: usize = 255;
/// Booked reservations per place. Cancelled records do not count.
pub const MAX_RESERVATIONS_PER_PLACE: usize = 100_000;
/// Longest reservation, counted in calendar days including both ends.
pub const MAX_RESERVATION_DAYS: i64 = 366;
pub const MAX_CAPACITY: u32 = 1_000_000;
pub const MAX_FILTER_RESULTS: usize = 1_000;
