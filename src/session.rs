//! In-memory session tokens bridging `/login/` and the `/peer/*` endpoints.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// How long an unused token stays valid.
pub const TOKEN_TTL: Duration = Duration::from_secs(60);
/// Interval of the background task evicting expired entries.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5);

const CAPACITY: usize = 1000;

struct Entry {
    token: String,
    issued_at: Instant,
}

/// Bounded `ASN → token` map with per-entry TTL.
///
/// Tokens are single-use: a successful `take` removes the entry. At most
/// one token is live per ASN; a new `issue` replaces the previous one.
pub struct TokenCache {
    inner: Mutex<HashMap<u32, Entry>>,
    ttl: Duration,
    capacity: usize,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::with_limits(TOKEN_TTL, CAPACITY)
    }

    pub fn with_limits(ttl: Duration, capacity: usize) -> Self {
        TokenCache {
            inner: Mutex::new(HashMap::new()),
            ttl,
            capacity,
        }
    }

    /// Mint a fresh UUIDv4 token for the ASN.
    pub fn issue(&self, asn: u32) -> String {
        let token = Uuid::new_v4().to_string();
        let mut map = self.inner.lock();
        map.retain(|_, entry| entry.issued_at.elapsed() < self.ttl);
        if map.len() >= self.capacity && !map.contains_key(&asn) {
            let oldest = map
                .iter()
                .min_by_key(|(_, entry)| entry.issued_at)
                .map(|(asn, _)| *asn);
            if let Some(asn) = oldest {
                map.remove(&asn);
            }
        }
        map.insert(
            asn,
            Entry {
                token: token.clone(),
                issued_at: Instant::now(),
            },
        );
        token
    }

    /// Consume the ASN's token if it matches and has not expired.
    ///
    /// Lookup, compare and remove happen as one step under the lock; a
    /// mismatch leaves the live entry untouched.
    pub fn take(&self, asn: u32, token: &str) -> bool {
        let mut map = self.inner.lock();
        match map.get(&asn) {
            Some(entry) if entry.issued_at.elapsed() >= self.ttl => {
                map.remove(&asn);
                false
            }
            Some(entry) if entry.token == token => {
                map.remove(&asn);
                true
            }
            _ => false,
        }
    }

    /// Drop expired entries; live tokens are kept.
    pub fn sweep(&self) {
        self.inner
            .lock()
            .retain(|_, entry| entry.issued_at.elapsed() < self.ttl);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ASN: u32 = 4242420257;

    #[test]
    fn test_issue_and_take() {
        let cache = TokenCache::new();
        let token = cache.issue(ASN);
        assert!(cache.take(ASN, &token));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_tokens_are_single_use() {
        let cache = TokenCache::new();
        let token = cache.issue(ASN);
        assert!(cache.take(ASN, &token));
        assert!(!cache.take(ASN, &token));
    }

    #[test]
    fn test_one_live_token_per_asn() {
        let cache = TokenCache::new();
        let first = cache.issue(ASN);
        let second = cache.issue(ASN);
        assert_ne!(first, second);
        assert_eq!(cache.len(), 1);
        assert!(!cache.take(ASN, &first));
        assert!(cache.take(ASN, &second));
    }

    #[test]
    fn test_mismatch_keeps_entry() {
        let cache = TokenCache::new();
        let token = cache.issue(ASN);
        assert!(!cache.take(ASN, "wrong-token"));
        assert!(!cache.take(ASN + 1, &token));
        assert!(cache.take(ASN, &token));
    }

    #[test]
    fn test_expired_token_rejected() {
        let cache = TokenCache::with_limits(Duration::from_millis(10), 10);
        let token = cache.issue(ASN);
        std::thread::sleep(Duration::from_millis(20));
        assert!(!cache.take(ASN, &token));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_sweep_drops_only_expired() {
        let cache = TokenCache::with_limits(Duration::from_millis(50), 10);
        cache.issue(1);
        std::thread::sleep(Duration::from_millis(60));
        let token = cache.issue(2);
        cache.sweep();
        assert_eq!(cache.len(), 1);
        assert!(cache.take(2, &token));
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let cache = TokenCache::with_limits(Duration::from_secs(60), 2);
        let first = cache.issue(1);
        std::thread::sleep(Duration::from_millis(5));
        let second = cache.issue(2);
        std::thread::sleep(Duration::from_millis(5));
        let third = cache.issue(3);
        assert_eq!(cache.len(), 2);
        assert!(!cache.take(1, &first));
        assert!(cache.take(2, &second));
        assert!(cache.take(3, &third));
    }

    #[test]
    fn test_token_is_uuid_shaped() {
        let cache = TokenCache::new();
        let token = cache.issue(ASN);
        assert_eq!(token.len(), 36);
        assert_eq!(token.matches('-').count(), 4);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase() || c == '-'));
    }
}
