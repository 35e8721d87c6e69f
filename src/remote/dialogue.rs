//! Ordered prompt/response automation for menu-driven remote tools.
//!
//! The tool under automation has no structured API; the only integration
//! point is matching its raw prompt text. The exchange tables passed in
//! by callers are therefore the single artifact coupled to the tool's
//! wording.

use std::thread;
use std::time::{Duration, Instant};

use regex::{Regex, RegexBuilder};

use super::{Console, SessionError};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// One scripted (expected prompt, reply) pair.
#[derive(Clone, Debug)]
pub struct Exchange {
    prompt: Regex,
    reply: String,
}

impl Exchange {
    /// Compiles a prompt pattern (case-insensitive, multi-line) and pairs
    /// it with the reply to send on a match.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Pattern`] when the pattern does not
    /// compile.
    pub fn new(prompt: &str, reply: impl Into<String>) -> Result<Self, SessionError> {
        let compiled = RegexBuilder::new(prompt)
            .case_insensitive(true)
            .multi_line(true)
            .build()
            .map_err(|err| SessionError::Pattern {
                pattern: prompt.to_owned(),
                message: err.to_string(),
            })?;
        Ok(Self {
            prompt: compiled,
            reply: reply.into(),
        })
    }

    /// Returns the source text of the prompt pattern.
    #[must_use]
    pub fn prompt_pattern(&self) -> &str {
        self.prompt.as_str()
    }
}

/// Result of driving one scripted command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DialogueOutcome {
    /// Whether the completion marker was observed before the timeout.
    ///
    /// `false` is an outcome, not an error: the caller decides how to
    /// treat a command that never printed its marker.
    pub completed: bool,
    /// Everything received from the remote shell during the run.
    pub transcript: String,
}

/// Drives a command through an ordered script of exchanges until a
/// completion marker appears or the timeout elapses.
#[derive(Clone, Debug)]
pub struct Dialogue {
    exchanges: Vec<Exchange>,
    completion_marker: String,
    timeout: Duration,
    poll_interval: Duration,
}

impl Dialogue {
    /// Creates a dialogue with the default poll interval.
    #[must_use]
    pub fn new(
        exchanges: Vec<Exchange>,
        completion_marker: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            exchanges,
            completion_marker: completion_marker.into(),
            timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Overrides the pause between output polls.
    ///
    /// This is primarily used by tests to keep timeout scenarios fast.
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Sends `command` and walks the exchange script against accumulated
    /// output.
    ///
    /// Only the current pending prompt is ever matched; on a match the
    /// reply is sent, the cursor advances, and the accumulated buffer is
    /// cleared so stale output cannot satisfy the next pattern. Running
    /// out of exchanges is not an error — the remote tool may continue
    /// unprompted until its marker appears.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Io`] when the console fails; a timeout is
    /// reported through [`DialogueOutcome::completed`], not as an error.
    pub fn run<C: Console>(
        &self,
        console: &mut C,
        command: &str,
    ) -> Result<DialogueOutcome, SessionError> {
        console.send(&format!("{command}\n"))?;
        tracing::debug!(command, "started scripted command");

        let started = Instant::now();
        let mut buffer = String::new();
        let mut transcript = String::new();
        let mut cursor = 0_usize;

        loop {
            let chunk = console.recv_available()?;
            if chunk.is_empty() {
                if started.elapsed() >= self.timeout {
                    tracing::warn!(command, "scripted command timed out");
                    return Ok(DialogueOutcome {
                        completed: false,
                        transcript,
                    });
                }
                thread::sleep(self.poll_interval);
                continue;
            }

            buffer.push_str(&chunk);
            transcript.push_str(&chunk);

            if let Some(exchange) = self.exchanges.get(cursor) {
                if exchange.prompt.is_match(&buffer) {
                    tracing::debug!(
                        prompt = exchange.prompt_pattern(),
                        "matched prompt, sending reply"
                    );
                    console.send(&exchange.reply)?;
                    cursor += 1;
                    buffer.clear();
                }
            }

            if buffer.contains(&self.completion_marker) {
                tracing::debug!(marker = %self.completion_marker, "scripted command completed");
                return Ok(DialogueOutcome {
                    completed: true,
                    transcript,
                });
            }

            if started.elapsed() >= self.timeout {
                tracing::warn!(command, "scripted command timed out");
                return Ok(DialogueOutcome {
                    completed: false,
                    transcript,
                });
            }
        }
    }
}
