//! Output formatting for CLI display.

use std::fmt::Write as _;

use jiff::{ToSpan, civil::Date};

use crate::calendar::{self, Direction};
use crate::engine::Planned;
use crate::model::{Decision, KindCounts, NoticeKind, NoticeRecord, TickReport};
use crate::trigger::TriggerWindow;

/// Format a tick report as a short per-kind summary.
pub(super) fn format_report(report: &TickReport) -> String {
    let mut out = format!(
        "Tick {} on {}: {} obligations, {} sent\n",
        report.tick_id,
        report.date,
        report.obligations,
        report.total_sent()
    );
    for kind in NoticeKind::ALL {
        let _ = writeln!(out, "  {kind:<9} {}", format_counts(report.counts(kind)));
    }
    for failure in &report.ledger_failures {
        let _ = writeln!(
            out,
            "  NOT RECORDED: {} {}: {}",
            failure.obligation_id, failure.kind, failure.error
        );
    }
    out
}

fn format_counts(counts: &KindCounts) -> String {
    format!(
        "sent {}, exempt {}, already issued {}, out of window {}, failed {}",
        counts.sent, counts.exempt, counts.already_issued, counts.out_of_window, counts.failed
    )
}

/// Format one ledger row.
pub(super) fn format_record(record: &NoticeRecord) -> String {
    let mut line = format!(
        "{}  {} {:<8} {:<9} {:<7}",
        record.recorded_at.strftime("%Y-%m-%d %H:%M:%S"),
        record.obligation_id,
        record.kind,
        record.channel,
        record.outcome
    );
    if let Some(destination) = &record.destination {
        let _ = write!(line, " {destination}");
    }
    if !record.detail.is_empty() {
        let _ = write!(line, " ({})", record.detail);
    }
    line
}

pub(super) fn format_decision(decision: &Decision) -> String {
    match decision {
        Decision::Suppressed => "suppressed (no balance)".to_string(),
        Decision::AlreadyIssued => "already issued".to_string(),
        Decision::NotYetDue { trigger } => format!("not yet due (triggers {trigger})"),
        Decision::Due { trigger } => format!("due (triggered {trigger})"),
        Decision::Missed { trigger } => format!("missed (triggered {trigger})"),
    }
}

pub(super) fn format_planned(plan: &Planned) -> String {
    format!(
        "  {} {:<9} {}",
        plan.obligation_id,
        plan.kind,
        format_decision(&plan.decision)
    )
}

/// Format the trigger dates of a due date, with the last day each may still fire.
pub(super) fn format_window(due_date: Date, window: &TriggerWindow, catch_up_days: u16) -> String {
    let mut out = format!("Due date: {due_date}");
    if !calendar::is_business_day(due_date) {
        let next = calendar::adjust(due_date, Direction::Forward);
        let _ = write!(out, " (weekend, next business day {next})");
    }
    out.push('\n');
    for kind in NoticeKind::ALL {
        let trigger = window.trigger(kind);
        let last = trigger.saturating_add(i64::from(catch_up_days).days());
        let _ = writeln!(out, "  {kind:<9} {trigger} (until {last})");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    use jiff::{Timestamp, civil::date};
    use uuid::Uuid;

    use crate::model::{Channel, LedgerFailure, Outcome};

    #[test]
    fn report_lists_both_kinds_and_failures() {
        let mut report = TickReport::new(Uuid::nil(), Timestamp::UNIX_EPOCH, date(2024, 3, 13));
        report.obligations = 3;
        report.reminder.sent = 2;
        report.overdue.out_of_window = 3;
        report.ledger_failures.push(LedgerFailure {
            obligation_id: "42".into(),
            kind: NoticeKind::Reminder,
            error: "disk full".into(),
        });

        let text = format_report(&report);

        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("Tick 00000000-0000-0000-0000-000000000000 on 2024-03-13: 3 obligations, 2 sent")
        );
        assert_eq!(
            lines.next(),
            Some("  reminder  sent 2, exempt 0, already issued 0, out of window 0, failed 0")
        );
        assert_eq!(
            lines.next(),
            Some("  overdue   sent 0, exempt 0, already issued 0, out of window 3, failed 0")
        );
        assert!(text.contains("NOT RECORDED: 42 reminder: disk full"));
    }

    #[test]
    fn record_shows_destination_and_detail() {
        let record = NoticeRecord {
            recorded_at: "2024-03-13T09:00:00Z".parse().unwrap(),
            tick_id: Uuid::nil(),
            obligation_id: "42".into(),
            kind: NoticeKind::Overdue,
            channel: Channel::Messaging,
            destination: Some("+543511234567".into()),
            outcome: Outcome::Failed,
            detail: "HTTP 500".into(),
        };

        assert_eq!(
            format_record(&record),
            "2024-03-13 09:00:00  42 overdue  messaging failed  +543511234567 (HTTP 500)"
        );
    }

    #[test]
    fn decisions_name_their_trigger() {
        let trigger = date(2024, 3, 13);
        assert_eq!(format_decision(&Decision::Due { trigger }), "due (triggered 2024-03-13)");
        assert_eq!(
            format_decision(&Decision::NotYetDue { trigger }),
            "not yet due (triggers 2024-03-13)"
        );
        assert_eq!(format_decision(&Decision::AlreadyIssued), "already issued");
    }

    #[test]
    fn window_shows_catch_up_end() {
        let window = TriggerWindow {
            reminder_date: date(2024, 3, 13),
            overdue_date: date(2024, 3, 25),
        };

        let text = format_window(date(2024, 3, 15), &window, 7);

        assert_eq!(
            text,
            "Due date: 2024-03-15\n\
             \x20 reminder  2024-03-13 (until 2024-03-20)\n\
             \x20 overdue   2024-03-25 (until 2024-04-01)\n"
        );
    }

    #[test]
    fn weekend_due_date_names_next_business_day() {
        let window = TriggerWindow {
            reminder_date: date(2024, 3, 14),
            overdue_date: date(2024, 3, 26),
        };

        let text = format_window(date(2024, 3, 16), &window, 7);

        assert!(text.starts_with("Due date: 2024-03-16 (weekend, next business day 2024-03-18)\n"));
    }
}
