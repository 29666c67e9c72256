//! Notice rendering: the reminder and overdue variants, as HTML for email
//! and plain text for messaging.

use std::fmt::Write;

use crate::config::NoticeConfig;
use crate::model::{NoticeKind, Obligation};

const AUTOMATED_FOOTER: &str = "*** THIS IS AN AUTOMATED MESSAGE. PLEASE DO NOT REPLY. ***";
const SETTLED_FOOTER: &str = "*** IF YOU HAVE ALREADY PAID OR ARE ARRANGING PAYMENT, \
    PLEASE DISREGARD THIS MESSAGE. ***";

/// A rendered notice, ready for a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Renders notices using the configured organization details.
#[derive(Debug, Clone, Default)]
pub struct Renderer {
    notice: NoticeConfig,
}

impl Renderer {
    pub fn new(notice: NoticeConfig) -> Self {
        Self { notice }
    }

    pub fn render(&self, obligation: &Obligation, kind: NoticeKind) -> Message {
        Message {
            subject: self.subject(obligation, kind),
            html: self.html(obligation, kind),
            text: self.text(obligation, kind),
        }
    }

    fn subject(&self, obligation: &Obligation, kind: NoticeKind) -> String {
        let mut subject = match kind {
            NoticeKind::Reminder => format!(
                "Upcoming due date: {} {}",
                obligation.id, obligation.holder
            ),
            NoticeKind::Overdue => {
                format!("Unpaid obligation {} {}", obligation.id, obligation.holder)
            }
        };
        if let Some(org) = &self.notice.organization {
            let _ = write!(subject, " ({org})");
        }
        single_line(&subject)
    }

    /// Body paragraphs shared by both renderings, without markup.
    fn paragraphs(&self, obligation: &Obligation, kind: NoticeKind) -> Vec<String> {
        let due = obligation.due_date.strftime("%d/%m/%Y").to_string();
        let mut paragraphs = Vec::new();

        match kind {
            NoticeKind::Reminder => {
                let mut details = format!(
                    "This is a reminder that the following obligation is due soon.\n\
                     Reference: {}\nDue date: {due}",
                    obligation.id
                );
                if let Some(amount) = obligation.amount_due {
                    let _ = write!(details, "\nAmount due: ${amount:.2}");
                }
                paragraphs.push(details);
                paragraphs.push(
                    "Please contact your assigned inspector or the administration \
                     to settle your account."
                        .to_string(),
                );
            }
            NoticeKind::Overdue => {
                paragraphs.push(format!(
                    "Obligation {} was due on {due} and remains unpaid.",
                    obligation.id
                ));
                paragraphs.push(
                    "Please contact your assigned inspector or the administration \
                     for the updated amount and to settle your account."
                        .to_string(),
                );
                if let Some(days) = self.notice.escalation_days {
                    paragraphs.push(format!(
                        "IMPORTANT: {days} days after the due date, the account will be \
                         referred for legal collection."
                    ));
                }
            }
        }

        if let Some(contact) = &self.notice.contact {
            paragraphs.push(contact.clone());
        }
        paragraphs
    }

    fn greeting(obligation: &Obligation) -> String {
        match &obligation.tax_id {
            Some(tax_id) => format!("Dear {}, {tax_id}", obligation.holder),
            None => format!("Dear {}", obligation.holder),
        }
    }

    fn text(&self, obligation: &Obligation, kind: NoticeKind) -> String {
        let mut text = Self::greeting(obligation);
        for paragraph in self.paragraphs(obligation, kind) {
            text.push_str("\n\n");
            text.push_str(&paragraph);
        }
        text.push_str("\n\nKind regards.");
        if let Some(org) = &self.notice.organization {
            text.push('\n');
            text.push_str(org);
        }
        let _ = write!(text, "\n\n{AUTOMATED_FOOTER}\n{SETTLED_FOOTER}");
        text
    }

    fn html(&self, obligation: &Obligation, kind: NoticeKind) -> String {
        let mut html = String::from("<html>\n");
        html.push_str(
            "<body style=\"font-family: Arial, sans-serif; line-height: 1.6; margin: 20px;\">\n",
        );
        let _ = writeln!(html, "<p>{}</p>", escape(&Self::greeting(obligation)));
        for paragraph in self.paragraphs(obligation, kind) {
            let _ = writeln!(html, "<p>{}</p>", escape(&paragraph).replace('\n', "<br>\n"));
        }
        html.push_str("<p>Kind regards.</p>\n");
        if let Some(org) = &self.notice.organization {
            let _ = writeln!(html, "<p>{}</p>", escape(org));
        }
        let _ = writeln!(
            html,
            "<div style=\"color: #d32f2f; font-weight: bold;\">\n<p>{}</p>\n<p>{}</p>\n</div>",
            escape(AUTOMATED_FOOTER),
            escape(SETTLED_FOOTER),
        );
        html.push_str("</body>\n</html>\n");
        html
    }
}

/// Collapses line breaks so a value is safe inside a mail header.
pub(super) fn single_line(s: &str) -> String {
    s.split(['\r', '\n'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
