//! Notice dispatch: deliver one notice over every channel an obligation has.
//!
//! The engine only sees the [`Dispatcher`] trait. [`ChannelDispatcher`] is the
//! stock implementation, attempting email and messaging independently and
//! reporting one [`ChannelAttempt`] per destination.

mod email;
mod messaging;
mod render;

use std::time::Duration;

use tracing::{debug, warn};

use crate::config::Config;
use crate::model::{Channel, ChannelAttempt, NoticeKind, Obligation};

pub use email::EmailChannel;
pub use messaging::MessagingChannel;
pub use render::{Message, Renderer};

/// Why a single delivery attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("channel not configured")]
    NotConfigured,

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("mail command exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid phone number: {0}")]
    InvalidPhone(String),

    #[error("webhook request failed: {0}")]
    Http(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Attempts delivery of a notice and reports the outcome per channel.
///
/// Implementations never fail as a whole: every problem is an attempt
/// with a `Failed` or `Skipped` outcome.
pub trait Dispatcher {
    fn dispatch(&self, obligation: &Obligation, kind: NoticeKind) -> Vec<ChannelAttempt>;
}

/// Delivers notices over the configured email and messaging channels.
#[derive(Debug, Clone, Default)]
pub struct ChannelDispatcher {
    email: Option<EmailChannel>,
    messaging: Option<MessagingChannel>,
    renderer: Renderer,
}

impl ChannelDispatcher {
    pub fn new(
        email: Option<EmailChannel>,
        messaging: Option<MessagingChannel>,
        renderer: Renderer,
    ) -> Self {
        Self {
            email,
            messaging,
            renderer,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.email.as_ref().map(EmailChannel::new),
            config.messaging.as_ref().map(MessagingChannel::new),
            Renderer::new(config.notice.clone()),
        )
    }

    fn send_email(&self, to: &str, message: &Message) -> ChannelAttempt {
        let Some(channel) = &self.email else {
            return ChannelAttempt::skipped(
                Channel::Email,
                Some(to.to_string()),
                "email channel not configured",
            );
        };
        match channel.send(to, message) {
            Ok(()) => {
                debug!(to, "email sent");
                ChannelAttempt::sent(Channel::Email, to)
            }
            Err(e) => {
                warn!(to, error = %e, "email failed");
                ChannelAttempt::failed(Channel::Email, Some(to.to_string()), e.to_string())
            }
        }
    }

    fn send_message(&self, raw: &str, message: &Message) -> ChannelAttempt {
        let Some(channel) = &self.messaging else {
            return ChannelAttempt::skipped(
                Channel::Messaging,
                Some(raw.to_string()),
                "messaging channel not configured",
            );
        };
        let to = match channel.normalize(raw) {
            Ok(to) => to,
            Err(e) => {
                warn!(phone = raw, error = %e, "unusable phone number");
                return ChannelAttempt::failed(
                    Channel::Messaging,
                    Some(raw.to_string()),
                    e.to_string(),
                );
            }
        };
        match channel.send(&to, &message.text) {
            Ok(()) => {
                debug!(to = %to, "message sent");
                ChannelAttempt::sent(Channel::Messaging, to)
            }
            Err(e) => {
                warn!(to = %to, error = %e, "message failed");
                ChannelAttempt::failed(Channel::Messaging, Some(to), e.to_string())
            }
        }
    }
}

impl Dispatcher for ChannelDispatcher {
    fn dispatch(&self, obligation: &Obligation, kind: NoticeKind) -> Vec<ChannelAttempt> {
        let recipients = &obligation.recipients;
        if recipients.is_empty() {
            return vec![ChannelAttempt::skipped(
                Channel::Batch,
                None,
                "no recipient channels",
            )];
        }

        let message = self.renderer.render(obligation, kind);
        let mut attempts = Vec::new();

        if let Some(email) = recipients.email.as_deref().map(str::trim)
            && !email.is_empty()
        {
            attempts.push(self.send_email(email, &message));
        }
        for phone in recipients.phones.iter().map(|p| p.trim()) {
            if !phone.is_empty() {
                attempts.push(self.send_message(phone, &message));
            }
        }

        attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use jiff::civil::date;

    use crate::config::MessagingConfig;
    use crate::model::{Outcome, Recipients};

    fn obligation(recipients: Recipients) -> Obligation {
        Obligation {
            id: "42".into(),
            due_date: date(2024, 3, 15),
            amount_due: Some(1000.0),
            holder: "Acme SA".into(),
            tax_id: None,
            recipients,
        }
    }

    #[test]
    fn no_recipients_is_one_batch_skip() {
        let attempts = ChannelDispatcher::default()
            .dispatch(&obligation(Recipients::default()), NoticeKind::Reminder);

        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].channel, Channel::Batch);
        assert_eq!(attempts[0].outcome, Outcome::Skipped);
    }

    #[test]
    fn unconfigured_channels_are_skipped_per_destination() {
        let recipients = Recipients {
            email: Some("acme@example.org".into()),
            phones: vec!["0351 1234567".into(), " ".into(), "0351 7654321".into()],
        };

        let attempts =
            ChannelDispatcher::default().dispatch(&obligation(recipients), NoticeKind::Overdue);

        let channels: Vec<_> = attempts.iter().map(|a| a.channel).collect();
        assert_eq!(channels, vec![Channel::Email, Channel::Messaging, Channel::Messaging]);
        assert!(attempts.iter().all(|a| a.outcome == Outcome::Skipped));
        assert_eq!(attempts[0].destination.as_deref(), Some("acme@example.org"));
    }

    #[test]
    fn invalid_phone_fails_without_network() {
        let messaging = MessagingChannel::new(&MessagingConfig {
            webhook: "http://127.0.0.1:9/unused".into(),
            token: None,
            country_code: "54".into(),
            timeout_secs: 1,
        });
        let dispatcher = ChannelDispatcher::new(None, Some(messaging), Renderer::default());
        let recipients = Recipients {
            email: None,
            phones: vec!["123".into()],
        };

        let attempts = dispatcher.dispatch(&obligation(recipients), NoticeKind::Reminder);

        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].outcome, Outcome::Failed);
        assert!(attempts[0].detail.contains("invalid phone number"));
    }

    #[cfg(unix)]
    #[test]
    fn email_success_is_sent() {
        let email = EmailChannel::new(&crate::config::EmailConfig {
            command: vec!["sh".into(), "-c".into(), "cat > /dev/null".into()],
            sender: "notices@example.org".into(),
            timeout_secs: 5,
        });
        let dispatcher = ChannelDispatcher::new(Some(email), None, Renderer::default());
        let recipients = Recipients {
            email: Some("acme@example.org".into()),
            phones: vec![],
        };

        let attempts = dispatcher.dispatch(&obligation(recipients), NoticeKind::Reminder);

        assert_eq!(attempts, vec![ChannelAttempt::sent(Channel::Email, "acme@example.org")]);
    }
}
