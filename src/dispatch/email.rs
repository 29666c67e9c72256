//! Email delivery: pipe an RFC 5322 message to a sendmail-compatible command.

use std::{
    io::{self, Read, Write},
    process::{Command, Stdio},
    thread,
    time::{Duration, Instant},
};

use crate::config::EmailConfig;

use super::{
    DeliveryError,
    render::{Message, single_line},
};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Sends email by running a local mail submission program.
#[derive(Debug, Clone)]
pub struct EmailChannel {
    command: Vec<String>,
    sender: String,
    timeout: Duration,
}

impl EmailChannel {
    pub fn new(config: &EmailConfig) -> Self {
        Self {
            command: config.command.clone(),
            sender: config.sender.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Delivers `message` to `to`. The command is killed once the timeout elapses.
    pub fn send(&self, to: &str, message: &Message) -> Result<(), DeliveryError> {
        let raw = compose(&self.sender, to, message);
        run_with_timeout(&self.command, raw.as_bytes(), self.timeout)
    }
}

/// Builds the full message text, headers included.
fn compose(from: &str, to: &str, message: &Message) -> String {
    format!(
        "From: {}\r\nTo: {}\r\nSubject: {}\r\nMIME-Version: 1.0\r\n\
         Content-Type: text/html; charset=utf-8\r\nContent-Transfer-Encoding: 8bit\r\n\r\n{}",
        single_line(from),
        single_line(to),
        single_line(&message.subject),
        message.html,
    )
}

fn run_with_timeout(
    command: &[String],
    input: &[u8],
    timeout: Duration,
) -> Result<(), DeliveryError> {
    let (program, args) = command.split_first().ok_or(DeliveryError::NotConfigured)?;
    let deadline = Instant::now() + timeout;

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| DeliveryError::Spawn {
            program: program.clone(),
            source: e,
        })?;

    // Written on its own thread so a program that never reads stdin cannot
    // outlast the deadline. Killing the child closes the pipe and frees it.
    let writer = child.stdin.take().map(|mut stdin| {
        let input = input.to_vec();
        thread::spawn(move || stdin.write_all(&input))
    });

    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            if let Some(writer) = writer {
                let _ = writer.join();
            }
            return Err(DeliveryError::Timeout(timeout));
        }
        thread::sleep(POLL_INTERVAL);
    };

    // A program that exits without reading its input is judged by its exit status.
    if let Some(writer) = writer
        && let Ok(Err(e)) = writer.join()
        && e.kind() != io::ErrorKind::BrokenPipe
        && status.success()
    {
        return Err(e.into());
    }

    if status.success() {
        return Ok(());
    }
    let mut stderr = String::new();
    if let Some(mut pipe) = child.stderr.take() {
        let _ = pipe.read_to_string(&mut stderr);
    }
    Err(DeliveryError::Exit {
        status: status.to_string(),
        stderr: stderr.trim().to_string(),
    })
}
