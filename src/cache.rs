//! Fingerprints and shard paths for cached derivatives.
//!
//! Every derivative is addressed by a **fingerprint**: an MD5 digest of the
//! canonical request parameters. Equal parameter *sets* always produce the
//! same key, whatever order the caller supplied them in, because
//! [`Parameters`] is a sorted map and the signature parameter is dropped
//! before hashing.
//!
//! ## Keys
//!
//! - [`to_key`] hashes a list of strings joined with `"||"`. The same
//!   function fingerprints bare source paths for cascade-delete
//!   bookkeeping (`to_key(&[path])`).
//! - [`fingerprint`] serializes the signature-free parameter map as a JSON
//!   object and passes that single string to [`to_key`].
//!
//! ## Sharding
//!
//! Destination paths are spread over nested directories so no single
//! directory grows unbounded. [`shard`] cuts `depth` segments of `width`
//! characters off the front of the key and appends either the remaining
//! suffix (`rest_only`) or the whole key. With `width = 0` or `depth = 0`
//! the key is used as-is.
//!
//! ```text
//! key = e89d66bdfdd4dd26b682cc77e23a86eb
//! shard(key, 2, 2, false) → e8/9d/e89d66bdfdd4dd26b682cc77e23a86eb
//! shard(key, 2, 3, true)  → e8/9d/66/bdfdd4dd26b682cc77e23a86eb
//! ```

use crate::parameters::Parameters;
use md5::{Digest, Md5};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Separator placed between the parts hashed by [`to_key`].
const KEY_SEPARATOR: &str = "||";

/// Suffix of the index key holding the derivatives of a source path.
pub const CHILDREN_SUFFIX: &str = ":children";

/// MD5 of the parts joined with `"||"`, as 32 lowercase hex characters.
pub fn to_key(parts: &[&str]) -> String {
    let digest = Md5::digest(parts.join(KEY_SEPARATOR).as_bytes());
    format!("{:x}", digest)
}

/// Fingerprint of a canonical parameter map. The signature parameter never
/// takes part.
pub fn fingerprint(params: &Parameters) -> String {
    let canonical = params.canonical_json();
    to_key(&[canonical.as_str()])
}

/// Index key of the children set for a source path.
pub fn children_key(source_path: &str) -> String {
    format!("{}{}", to_key(&[source_path]), CHILDREN_SUFFIX)
}

/// Split a key into directory segments.
///
/// Keys shorter than `width * depth` produce as many full segments as fit;
/// a trailing partial segment is kept so no character is lost.
pub fn shard(key: &str, width: usize, depth: usize, rest_only: bool) -> Vec<String> {
    let chars: Vec<char> = key.chars().collect();
    let mut segments = Vec::with_capacity(depth + 1);
    let mut offset = 0;

    if width > 0 {
        for _ in 0..depth {
            if offset >= chars.len() {
                break;
            }
            let end = (offset + width).min(chars.len());
            segments.push(chars[offset..end].iter().collect());
            offset = end;
        }
    }

    if rest_only {
        if offset < chars.len() {
            segments.push(chars[offset..].iter().collect());
        }
    } else {
        segments.push(key.to_string());
    }
    segments
}

/// [`shard`] joined with `/`.
pub fn shard_path(key: &str, width: usize, depth: usize, rest_only: bool) -> String {
    shard(key, width, depth, rest_only).join("/")
}

/// Counters for the cache-or-compute decisions made by a processor.
///
/// Shared between concurrent requests, so every counter is atomic.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    forced: AtomicU64,
    stale: AtomicU64,
    not_modified: AtomicU64,
}

impl CacheStats {
    pub fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn forced(&self) {
        self.forced.fetch_add(1, Ordering::Relaxed);
    }

    /// Index pointed at a derivative the destination store no longer has.
    pub fn stale(&self) {
        self.stale.fetch_add(1, Ordering::Relaxed);
    }

    pub fn not_modified(&self) {
        self.not_modified.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn forced_count(&self) -> u64 {
        self.forced.load(Ordering::Relaxed)
    }

    pub fn stale_count(&self) -> u64 {
        self.stale.load(Ordering::Relaxed)
    }

    pub fn not_modified_count(&self) -> u64 {
        self.not_modified.load(Ordering::Relaxed)
    }

    /// Requests that went through the engine.
    pub fn processed(&self) -> u64 {
        self.misses() + self.forced_count() + self.stale_count()
    }

    pub fn total(&self) -> u64 {
        self.hits() + self.processed() + self.not_modified_count()
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hits = self.hits();
        let processed = self.processed();
        let not_modified = self.not_modified_count();

        if hits == 0 && not_modified == 0 {
            return write!(f, "{} processed", processed);
        }
        write!(f, "{} cached, {} processed", hits, processed)?;
        if not_modified > 0 {
            write!(f, ", {} not modified", not_modified)?;
        }
        let stale = self.stale_count();
        if stale > 0 {
            write!(f, " ({} stale)", stale)?;
        }
        write!(f, " ({} total)", self.total())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::ParamValue;

    const KEY: &str = "e89d66bdfdd4dd26b682cc77e23a86eb";

    // =========================================================================
    // Keys
    // =========================================================================

    #[test]
    fn to_key_known_vector() {
        assert_eq!(to_key(&["test1", "test2"]), KEY);
    }

    #[test]
    fn to_key_is_lowercase_hex() {
        let key = to_key(&["photos/cat.jpg"]);
        assert_eq!(key.len(), 32);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn fingerprint_ignores_insertion_order() {
        let mut a = Parameters::new();
        a.insert("op", "resize");
        a.insert("w", "100");
        a.insert("path", "cat.jpg");

        let mut b = Parameters::new();
        b.insert("path", "cat.jpg");
        b.insert("w", "100");
        b.insert("op", "resize");

        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn fingerprint_ignores_signature() {
        let mut a = Parameters::new();
        a.insert("op", "resize");
        a.insert("w", "100");

        let mut b = a.clone();
        b.insert("sig", "deadbeef");

        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn fingerprint_changes_with_values() {
        let mut a = Parameters::new();
        a.insert("op", "resize");
        a.insert("w", "100");

        let mut b = a.clone();
        b.insert("w", "101");

        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn fingerprint_distinguishes_lists_from_scalars() {
        let mut a = Parameters::new();
        a.insert("op", "resize");

        let mut b = Parameters::new();
        b.set("op", ParamValue::List(vec!["resize".into()]));

        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn children_key_has_suffix() {
        let key = children_key("cat.jpg");
        assert!(key.ends_with(":children"));
        assert_eq!(&key[..32], to_key(&["cat.jpg"]));
    }

    // =========================================================================
    // Sharding
    // =========================================================================

    #[test]
    fn shard_width_one_depth_two() {
        assert_eq!(shard(KEY, 1, 2, false), vec!["e", "8", KEY]);
    }

    #[test]
    fn shard_width_two_depth_two() {
        assert_eq!(shard(KEY, 2, 2, false), vec!["e8", "9d", KEY]);
    }

    #[test]
    fn shard_rest_only_keeps_suffix() {
        assert_eq!(
            shard(KEY, 2, 3, true),
            vec!["e8", "9d", "66", "bdfdd4dd26b682cc77e23a86eb"]
        );
    }

    #[test]
    fn shard_disabled_returns_key() {
        assert_eq!(shard(KEY, 0, 0, false), vec![KEY]);
        assert_eq!(shard(KEY, 0, 3, true), vec![KEY]);
    }

    #[test]
    fn shard_short_key_does_not_panic() {
        assert_eq!(shard("abc", 2, 3, false), vec!["ab", "c", "abc"]);
        assert_eq!(shard("abcd", 2, 2, true), vec!["ab", "cd"]);
    }

    #[test]
    fn shard_path_joins_with_slash() {
        assert_eq!(shard_path(KEY, 2, 2, false), format!("e8/9d/{KEY}"));
    }

    // =========================================================================
    // CacheStats
    // =========================================================================

    #[test]
    fn cache_stats_display_without_hits() {
        let s = CacheStats::default();
        s.miss();
        s.miss();
        s.forced();
        assert_eq!(format!("{}", s), "3 processed");
    }

    #[test]
    fn cache_stats_display_with_hits() {
        let s = CacheStats::default();
        for _ in 0..5 {
            s.hit();
        }
        s.miss();
        s.miss();
        assert_eq!(format!("{}", s), "5 cached, 2 processed (7 total)");
    }

    #[test]
    fn cache_stats_display_with_stale_and_not_modified() {
        let s = CacheStats::default();
        s.hit();
        s.stale();
        s.not_modified();
        assert_eq!(
            format!("{}", s),
            "1 cached, 1 processed, 1 not modified (1 stale) (3 total)"
        );
    }
}
