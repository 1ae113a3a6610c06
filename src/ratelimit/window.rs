//! Per-second bucket key generation.

use chrono::{DateTime, Utc};
use std::fmt;

/// Bucket timestamp layout, one bucket per whole second.
const BUCKET_FORMAT: &str = "%Y%m%d%H%M%S";

const SENDER_NAMESPACE: &str = "sender";
const GLOBAL_NAMESPACE: &str = "global";

/// The admission domain a counter belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope<'a> {
    /// A single sender
    Sender(&'a str),
    /// The system-wide domain
    Global,
}

impl fmt::Display for Scope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Sender(id) => write!(f, "{}:{}", SENDER_NAMESPACE, id),
            Scope::Global => f.write_str(GLOBAL_NAMESPACE),
        }
    }
}

/// Builds counter keys of the form `{prefix}:sender:{id}:{ts}` and
/// `{prefix}:global:{ts}`.
///
/// Sender and global keys live in disjoint namespaces, so a sender whose
/// identifier is literally `global` never shares a bucket with the global
/// counter. Keys are derived fresh from the supplied instant on every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowKeys {
    prefix: String,
}

impl WindowKeys {
    /// Create a key builder under `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// The key prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Key of the one-second bucket containing `at`.
    pub fn bucket_key(&self, scope: &Scope<'_>, at: DateTime<Utc>) -> String {
        format!("{}:{}:{}", self.prefix, scope, at.format(BUCKET_FORMAT))
    }

    /// Glob pattern matching every per-sender key.
    pub fn sender_pattern(&self) -> String {
        format!("{}:{}:*", self.prefix, SENDER_NAMESPACE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32, ms: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, h, m, s).unwrap() + chrono::Duration::milliseconds(ms)
    }

    #[test]
    fn test_sender_key_layout() {
        let keys = WindowKeys::new("rate_limit");
        let key = keys.bucket_key(&Scope::Sender("+1234567890"), at(7, 5, 3, 0));
        assert_eq!(key, "rate_limit:sender:+1234567890:20240309070503");
    }

    #[test]
    fn test_global_key_layout() {
        let keys = WindowKeys::new("rate_limit");
        let key = keys.bucket_key(&Scope::Global, at(23, 59, 59, 0));
        assert_eq!(key, "rate_limit:global:20240309235959");
    }

    #[test]
    fn test_truncates_to_whole_second() {
        let keys = WindowKeys::new("p");
        assert_eq!(
            keys.bucket_key(&Scope::Global, at(1, 2, 3, 0)),
            keys.bucket_key(&Scope::Global, at(1, 2, 3, 999))
        );
        assert_ne!(
            keys.bucket_key(&Scope::Global, at(1, 2, 3, 999)),
            keys.bucket_key(&Scope::Global, at(1, 2, 4, 0))
        );
    }

    #[test]
    fn test_sender_named_global_does_not_collide() {
        let keys = WindowKeys::new("rate_limit");
        let now = at(12, 0, 0, 0);
        assert_ne!(
            keys.bucket_key(&Scope::Sender("global"), now),
            keys.bucket_key(&Scope::Global, now)
        );
    }

    #[test]
    fn test_sender_pattern() {
        let keys = WindowKeys::new("rate_limit");
        assert_eq!(keys.sender_pattern(), "rate_limit:sender:*");
        assert!(!keys
            .bucket_key(&Scope::Global, at(0, 0, 0, 0))
            .starts_with("rate_limit:sender:"));
    }
}
