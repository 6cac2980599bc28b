//! Response classification.
//!
//! Every fetch attempt ends in a [`FetchOutcome`]; [`ResponseClassifier`] maps it to
//! exactly one [`Classification`], which is the only input the retry policy uses.

use std::fmt;
use std::time::Duration;

/// Transport-level failure tag (no HTTP response was obtained).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    /// The response could not be read or decoded.
    Malformed,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportErrorKind::Timeout => write!(f, "timeout"),
            TransportErrorKind::Connect => write!(f, "connect"),
            TransportErrorKind::Malformed => write!(f, "malformed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Http(u16),
    Transport(TransportErrorKind),
}

/// Result of one network attempt. Consumed immediately, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub status: FetchStatus,
    pub body: String,
    pub elapsed: Duration,
}

impl FetchOutcome {
    pub fn http(status: u16, body: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            status: FetchStatus::Http(status),
            body: body.into(),
            elapsed,
        }
    }

    pub fn transport(kind: TransportErrorKind, elapsed: Duration) -> Self {
        Self {
            status: FetchStatus::Transport(kind),
            body: String::new(),
            elapsed,
        }
    }

    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    pub fn status_code(&self) -> Option<u16> {
        match self.status {
            FetchStatus::Http(code) => Some(code),
            FetchStatus::Transport(_) => None,
        }
    }

    pub fn is_transport_error(&self) -> bool {
        matches!(self.status, FetchStatus::Transport(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Ok,
    /// Bot wall, captcha or rate-limit page.
    Blocked,
    RetryableError,
    FatalError,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Ok => "ok",
            Classification::Blocked => "blocked",
            Classification::RetryableError => "retryable_error",
            Classification::FatalError => "fatal_error",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Phrases that mark a captcha, robot-check or temporary ban page.
pub const DEFAULT_BLOCK_PHRASES: &[&str] = &[
    "captcha",
    "não é um robô",
    "verifique que você",
    "access denied",
    "temporariamente bloqueado",
    "robot check",
    "unusual traffic",
];

/// Bodies shorter than this are treated as bot walls even with a 2xx status.
pub const DEFAULT_MIN_BODY_LEN: usize = 512;

#[derive(Debug, Clone)]
pub struct ResponseClassifier {
    min_body_len: usize,
    /// Stored lowercase.
    block_phrases: Vec<String>,
}

impl Default for ResponseClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_BODY_LEN)
    }
}

impl ResponseClassifier {
    pub fn new(min_body_len: usize) -> Self {
        Self {
            min_body_len,
            block_phrases: DEFAULT_BLOCK_PHRASES
                .iter()
                .map(|p| p.to_lowercase())
                .collect(),
        }
    }

    pub fn with_block_phrase(mut self, phrase: &str) -> Self {
        self.block_phrases.push(phrase.to_lowercase());
        self
    }

    pub fn min_body_len(&self) -> usize {
        self.min_body_len
    }

    pub fn classify(&self, outcome: &FetchOutcome) -> Classification {
        let code = match outcome.status {
            FetchStatus::Transport(TransportErrorKind::Timeout)
            | FetchStatus::Transport(TransportErrorKind::Connect) => {
                return Classification::RetryableError;
            }
            FetchStatus::Transport(TransportErrorKind::Malformed) => {
                return Classification::FatalError;
            }
            FetchStatus::Http(code) => code,
        };

        match code {
            403 | 429 | 503 => return Classification::Blocked,
            500 | 502 => return Classification::RetryableError,
            _ => {}
        }

        if self.matches_block_phrase(&outcome.body) {
            return Classification::Blocked;
        }

        if (200..300).contains(&code) {
            if outcome.body_len() < self.min_body_len {
                Classification::Blocked
            } else {
                Classification::Ok
            }
        } else {
            Classification::FatalError
        }
    }

    fn matches_block_phrase(&self, body: &str) -> bool {
        if body.is_empty() {
            return false;
        }
        let lower = body.to_lowercase();
        self.block_phrases.iter().any(|p| lower.contains(p.as_str()))
    }
}
