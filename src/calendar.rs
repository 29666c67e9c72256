//! Business-day adjustment.
//!
//! The business week is Monday through Friday. Holidays are not modeled.

use jiff::{
    ToSpan,
    civil::{Date, Weekday},
};

/// Which way to move a date that lands on a weekend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Toward earlier dates.
    Backward,

    /// Toward later dates.
    Forward,
}

pub fn is_business_day(date: Date) -> bool {
    !matches!(date.weekday(), Weekday::Saturday | Weekday::Sunday)
}

/// Moves `date` one day at a time in `direction` until it is a business day.
///
/// Takes at most two steps. Dates already on a business day are returned as is.
pub fn adjust(mut date: Date, direction: Direction) -> Date {
    while !is_business_day(date) {
        let next = match direction {
            Direction::Backward => date.saturating_sub(1.day()),
            Direction::Forward => date.saturating_add(1.day()),
        };
        // Pinned at the edge of the supported range.
        if next == date {
            break;
        }
        date = next;
    }
    date
}
