//! Error classification for retry decisions

use std::io;

/// How the coordinator treats a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transport failure, timeout or abort. Retried with backoff.
    Network,

    /// Well-formed failure from the server or the operation itself. Not retried.
    Application,

    /// Unauthorized even after one token refresh. Not retried; the caller
    /// must re-authenticate.
    AuthRequired,
}

/// Trait for error classification
pub trait RetryClassifiable {
    fn classify(&self) -> ErrorClass;

    fn is_retryable(&self) -> bool {
        matches!(self.classify(), ErrorClass::Network)
    }
}

/// Substrings that mark a transport-level failure in an error message.
///
/// Matched case-insensitively. Covers browser-style fetch failures as well as
/// the messages hyper/reqwest and the OS produce for dropped connections.
const NETWORK_ERROR_PATTERNS: &[&str] = &[
    "failed to fetch",
    "networkerror",
    "network error",
    "load failed",
    "connection reset",
    "connection refused",
    "connection closed",
    "connection aborted",
    "broken pipe",
    "error sending request",
    "dns error",
    "timed out",
    "timeout",
    "aborted",
];

/// Classify an error from its message alone.
///
/// Used for errors that carry no structure, e.g. strings surfaced by
/// foreign callbacks.
pub fn classify_message(message: &str) -> ErrorClass {
    let lowered = message.to_ascii_lowercase();
    if NETWORK_ERROR_PATTERNS.iter().any(|p| lowered.contains(p)) {
        ErrorClass::Network
    } else {
        ErrorClass::Application
    }
}

impl RetryClassifiable for str {
    fn classify(&self) -> ErrorClass {
        classify_message(self)
    }
}

impl RetryClassifiable for String {
    fn classify(&self) -> ErrorClass {
        classify_message(self)
    }
}

impl RetryClassifiable for io::Error {
    fn classify(&self) -> ErrorClass {
        match self.kind() {
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::TimedOut
            | io::ErrorKind::UnexpectedEof => ErrorClass::Network,
            _ => classify_message(&self.to_string()),
        }
    }
}
