use std::fmt;

use serde::{Deserialize, Serialize};

/// 64-bit identity derived deterministically from a string key.
///
/// A `LongKey` is the canonical identity of a stored object: cache lookups,
/// the key directory, and cross-references between records all use it instead
/// of the application-level string key. The mapping is a pure function of the
/// string key — stable across process runs, so keys derived in one session
/// correctly address records created in a previous one.
///
/// The derivation is assumed collision-free for the domain's key space; a
/// collision is a data-integrity failure, not a handled condition.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LongKey(u64);

impl LongKey {
    /// Derive the long key for a string key.
    ///
    /// Computes the BLAKE3 digest of the UTF-8 bytes, then folds the 32
    /// digest bytes into a `u64`, each XOR-ed in under a fixed
    /// `(i * 11) % 64` rotation schedule. The fold spreads every digest
    /// byte across the whole integer key space instead of truncating to
    /// the first eight bytes.
    pub fn derive(string_key: &str) -> Self {
        let digest = blake3::hash(string_key.as_bytes());
        let mut key: u64 = 0;
        for (i, &byte) in digest.as_bytes().iter().enumerate() {
            key ^= u64::from(byte).rotate_left(((i * 11) % 64) as u32);
        }
        Self(key)
    }

    /// Wrap a raw 64-bit value.
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// The raw 64-bit value.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for LongKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LongKey({:016x})", self.0)
    }
}

impl fmt::Display for LongKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl From<LongKey> for u64 {
    fn from(key: LongKey) -> Self {
        key.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn derive_is_deterministic() {
        let k1 = LongKey::derive("spectrum_title_42");
        let k2 = LongKey::derive("spectrum_title_42");
        assert_eq!(k1, k2);
    }

    #[test]
    fn different_keys_produce_different_values() {
        let k1 = LongKey::derive("PEPTIDER");
        let k2 = LongKey::derive("PEPTIDEK");
        assert_ne!(k1, k2);
    }

    #[test]
    fn empty_string_is_valid() {
        let k1 = LongKey::derive("");
        let k2 = LongKey::derive("");
        assert_eq!(k1, k2);
    }

    #[test]
    fn no_clustering_over_sequential_keys() {
        // Sequential string keys must not collide and should not share a
        // common high-byte prefix the way a truncated digest would.
        let keys: HashSet<u64> = (0..1000)
            .map(|i| LongKey::derive(&format!("spec_{i}")).as_u64())
            .collect();
        assert_eq!(keys.len(), 1000);
    }

    #[test]
    fn display_is_16_hex_digits() {
        let key = LongKey::from_raw(0xab);
        assert_eq!(format!("{key}"), "00000000000000ab");
        let derived = LongKey::derive("x");
        assert_eq!(format!("{derived}").len(), 16);
    }

    #[test]
    fn raw_roundtrip() {
        let key = LongKey::from_raw(0xdead_beef_cafe_f00d);
        assert_eq!(key.as_u64(), 0xdead_beef_cafe_f00d);
        assert_eq!(u64::from(key), 0xdead_beef_cafe_f00d);
    }

    #[test]
    fn serde_roundtrip() {
        let key = LongKey::derive("serde test");
        let json = serde_json::to_string(&key).unwrap();
        let parsed: LongKey = serde_json::from_str(&json).unwrap();
        assert_eq!(key, parsed);
    }

    proptest! {
        #[test]
        fn derive_never_panics_and_is_stable(s in ".*") {
            let k1 = LongKey::derive(&s);
            let k2 = LongKey::derive(&s);
            prop_assert_eq!(k1, k2);
        }

        #[test]
        fn distinct_strings_rarely_collide(a in "[a-z]{1,20}", b in "[A-Z]{1,20}") {
            // Disjoint alphabets guarantee a != b.
            prop_assert_ne!(LongKey::derive(&a), LongKey::derive(&b));
        }
    }
}
