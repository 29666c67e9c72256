//! Trigger dates: when each notice for an obligation becomes eligible.

use jiff::{ToSpan, civil::Date};
use serde::Serialize;

use crate::calendar::{self, Direction};
use crate::config::Policy;
use crate::model::NoticeKind;

/// The two trigger dates derived from a due date. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerWindow {
    pub reminder_date: Date,
    pub overdue_date: Date,
}

impl TriggerWindow {
    pub fn trigger(&self, kind: NoticeKind) -> Date {
        match kind {
            NoticeKind::Reminder => self.reminder_date,
            NoticeKind::Overdue => self.overdue_date,
        }
    }
}

/// Computes the reminder and overdue trigger dates for `due_date`.
///
/// Both dates are pulled back to the preceding business day when they land on
/// a weekend, so a notice may go out early but never late.
pub fn compute_window(due_date: Date, policy: &Policy) -> TriggerWindow {
    let reminder = due_date.saturating_sub(i64::from(policy.reminder_offset_days).days());
    let overdue = due_date.saturating_add(i64::from(policy.overdue_grace_days).days());

    TriggerWindow {
        reminder_date: calendar::adjust(reminder, Direction::Backward),
        overdue_date: calendar::adjust(overdue, Direction::Backward),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use jiff::civil::date;

    fn policy(overdue_grace_days: u16) -> Policy {
        Policy {
            overdue_grace_days,
            ..Policy::default()
        }
    }

    #[test]
    fn friday_due_date_with_default_policy() {
        let window = compute_window(date(2024, 3, 15), &Policy::default());

        assert_eq!(window.reminder_date, date(2024, 3, 13));
        assert_eq!(window.overdue_date, date(2024, 3, 25));
    }

    #[test]
    fn reminder_on_weekend_is_pulled_back_to_friday() {
        // Due Monday 2024-03-18: two days before is Saturday 03-16.
        let window = compute_window(date(2024, 3, 18), &Policy::default());
        assert_eq!(window.reminder_date, date(2024, 3, 15));

        // Due Tuesday 2024-03-19: two days before is Sunday 03-17.
        let window = compute_window(date(2024, 3, 19), &Policy::default());
        assert_eq!(window.reminder_date, date(2024, 3, 15));
    }

    #[test]
    fn overdue_on_weekend_is_pulled_back_not_pushed_forward() {
        // Due Wednesday 2024-03-06 + 10 days = Saturday 03-16.
        let window = compute_window(date(2024, 3, 6), &policy(10));
        assert_eq!(window.overdue_date, date(2024, 3, 15));
    }

    #[test]
    fn grace_period_is_configurable() {
        // Due Friday 2024-03-15 + 20 days = Thursday 04-04.
        let window = compute_window(date(2024, 3, 15), &policy(20));
        assert_eq!(window.overdue_date, date(2024, 4, 4));
    }

    #[test]
    fn reminder_precedes_due_date_and_overdue_follows_it() {
        let due = date(2024, 7, 1);
        let window = compute_window(due, &Policy::default());

        assert!(window.reminder_date < due);
        assert!(window.overdue_date > due);
        assert_eq!(window.trigger(NoticeKind::Reminder), window.reminder_date);
        assert_eq!(window.trigger(NoticeKind::Overdue), window.overdue_date);
    }
}
