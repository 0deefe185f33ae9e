//! Calendar exclusion capability.
//!
//! Calendars live outside the trigger; a trigger only carries the calendar's
//! name and the scheduler resolves it before asking for fire times.

use chrono::{DateTime, Utc};

/// Tells the fire-time search whether a candidate instant is blacked out.
///
/// Implementations must be cheap and side-effect free; the search may call
/// this many times per computation.
pub trait Calendar {
    /// Returns `true` if no trigger may fire at `instant`.
    fn is_excluded(&self, instant: DateTime<Utc>) -> bool;
}

impl<F> Calendar for F
where
    F: Fn(DateTime<Utc>) -> bool,
{
    fn is_excluded(&self, instant: DateTime<Utc>) -> bool {
        self(instant)
    }
}

/// Check an optional calendar; no calendar excludes nothing.
pub(crate) fn is_excluded(calendar: Option<&dyn Calendar>, instant: DateTime<Utc>) -> bool {
    calendar.is_some_and(|c| c.is_excluded(instant))
}
