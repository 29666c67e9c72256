//! Messaging delivery: post a plain-text notice to an HTTP webhook.

use std::{fmt, time::Duration};

use serde::Serialize;

use crate::config::MessagingConfig;

use super::DeliveryError;

/// Shortest accepted normalized number, `+` and country code included.
const MIN_PHONE_LEN: usize = 12;

#[derive(Serialize)]
struct Payload<'a> {
    to: &'a str,
    body: &'a str,
}

/// Sends messages through a webhook that relays them to phone numbers.
#[derive(Clone)]
pub struct MessagingChannel {
    agent: ureq::Agent,
    webhook: String,
    token: Option<String>,
    country_code: String,
}

// Keeps the token out of logs.
impl fmt::Debug for MessagingChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessagingChannel")
            .field("webhook", &self.webhook)
            .field("country_code", &self.country_code)
            .finish_non_exhaustive()
    }
}

impl MessagingChannel {
    pub fn new(config: &MessagingConfig) -> Self {
        let timeout = Duration::from_secs(config.timeout_secs);
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .build();
        Self {
            agent,
            webhook: config.webhook.clone(),
            token: config.token.clone(),
            country_code: config.country_code.clone(),
        }
    }

    /// Normalizes a raw phone number with this channel's country code.
    pub fn normalize(&self, raw: &str) -> Result<String, DeliveryError> {
        normalize_phone(raw, &self.country_code)
    }

    /// Delivers `body` to an already normalized phone number.
    pub fn send(&self, to: &str, body: &str) -> Result<(), DeliveryError> {
        let mut request = self
            .agent
            .post(&self.webhook)
            .set("Content-Type", "application/json");
        if let Some(token) = &self.token {
            request = request.set("Authorization", &format!("Bearer {token}"));
        }
        request
            .send_json(Payload { to, body })
            .map_err(|e| DeliveryError::Http(e.to_string()))?;
        Ok(())
    }
}

/// Turns a number as written in the source into international form.
///
/// Non-digits are dropped. A leading `0` (national trunk prefix) is replaced
/// by the country code; a number that already starts with the country code
/// only gains a `+`; anything else gets the country code prepended.
pub fn normalize_phone(raw: &str, country_code: &str) -> Result<String, DeliveryError> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();

    let normalized = if let Some(rest) = digits.strip_prefix('0') {
        format!("+{country_code}{rest}")
    } else if digits.starts_with(country_code) {
        format!("+{digits}")
    } else {
        format!("+{country_code}{digits}")
    };

    if normalized.len() < MIN_PHONE_LEN {
        return Err(DeliveryError::InvalidPhone(raw.to_string()));
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::{
        io::{BufRead, BufReader, Read, Write},
        net::TcpListener,
        thread,
    };

    #[test]
    fn trunk_prefix_is_replaced_by_country_code() {
        assert_eq!(normalize_phone("0351 155-123456", "54").unwrap(), "+54351155123456");
    }

    #[test]
    fn existing_country_code_gains_plus() {
        assert_eq!(normalize_phone("54 9 351 1234567", "54").unwrap(), "+5493511234567");
    }

    #[test]
    fn bare_number_gets_country_code() {
        assert_eq!(normalize_phone("(351) 1234567", "54").unwrap(), "+543511234567");
    }

    #[test]
    fn short_number_is_rejected() {
        let err = normalize_phone("12345", "54").unwrap_err();
        assert!(matches!(err, DeliveryError::InvalidPhone(raw) if raw == "12345"));
    }

    fn config(webhook: String) -> MessagingConfig {
        MessagingConfig {
            webhook,
            token: Some("secret".into()),
            country_code: "54".into(),
            timeout_secs: 5,
        }
    }

    /// Accepts one HTTP request, answers with `status`, and returns the raw request.
    fn serve_once(status: u16) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/send", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut head = String::new();
            let mut content_length = 0;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                    content_length = value.trim().parse().unwrap();
                }
                head.push_str(&line);
                if line == "\r\n" {
                    break;
                }
            }
            let mut body = vec![0; content_length];
            reader.read_exact(&mut body).unwrap();
            let response =
                format!("HTTP/1.1 {status} X\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
            reader.get_mut().write_all(response.as_bytes()).unwrap();
            head + &String::from_utf8(body).unwrap()
        });
        (url, handle)
    }

    #[test]
    fn posts_json_with_bearer_token() {
        let (url, server) = serve_once(200);
        let channel = MessagingChannel::new(&config(url));

        channel.send("+543511234567", "Hello").unwrap();

        let request = server.join().unwrap();
        assert!(request.starts_with("POST /send"));
        assert!(request.contains("Bearer secret"));
        assert!(request.ends_with(r#"{"to":"+543511234567","body":"Hello"}"#));
    }

    #[test]
    fn error_status_is_a_failure() {
        let (url, server) = serve_once(500);
        let channel = MessagingChannel::new(&config(url));

        let err = channel.send("+543511234567", "Hello").unwrap_err();

        server.join().unwrap();
        assert!(matches!(err, DeliveryError::Http(_)));
    }
}
