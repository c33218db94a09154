//! Stable keys and key generation.
//!
//! Every block and inline child carries a key that identifies it for the
//! whole of its lifetime. Patches and selections address nodes by key rather
//! than by array index, so identity survives concurrent inserts and removals
//! around a node. Keys are never reused within a document.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Key identifying a block, inline child or mark definition.
///
/// Serializes as a plain string (the `_key` property on wire objects).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StableKey(String);

impl StableKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StableKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for StableKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Produces unique-enough keys for newly created nodes.
///
/// The default generator derives keys from random UUIDs. Tests inject a
/// sequential generator so document fixtures stay readable.
#[derive(Clone)]
pub struct KeyGenerator {
    inner: Arc<Inner>,
}

enum Inner {
    Random,
    Sequential { prefix: String, next: AtomicU64 },
}

impl KeyGenerator {
    /// Random keys (12 hex characters from a v4 UUID).
    pub fn random() -> Self {
        Self {
            inner: Arc::new(Inner::Random),
        }
    }

    /// Deterministic `{prefix}0`, `{prefix}1`, ... sequence.
    pub fn sequential(prefix: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner::Sequential {
                prefix: prefix.into(),
                next: AtomicU64::new(0),
            }),
        }
    }

    pub fn generate(&self) -> StableKey {
        match &*self.inner {
            Inner::Random => {
                let mut hex = Uuid::new_v4().simple().to_string();
                hex.truncate(12);
                StableKey(hex)
            }
            Inner::Sequential { prefix, next } => {
                let n = next.fetch_add(1, Ordering::Relaxed);
                StableKey(format!("{prefix}{n}"))
            }
        }
    }
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::random()
    }
}

impl fmt::Debug for KeyGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.inner {
            Inner::Random => f.write_str("KeyGenerator::random"),
            Inner::Sequential { prefix, .. } => write!(f, "KeyGenerator::sequential({prefix:?})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_sequential_keys() {
        let gen = KeyGenerator::sequential("A-");
        assert_eq!(gen.generate().as_str(), "A-0");
        assert_eq!(gen.generate().as_str(), "A-1");
        assert_eq!(gen.generate().as_str(), "A-2");
    }

    #[test]
    fn test_random_keys_are_unique_and_short() {
        let gen = KeyGenerator::random();
        let mut seen = HashSet::new();
        for _ in 0..100 {
            let key = gen.generate();
            assert_eq!(key.as_str().len(), 12);
            assert!(seen.insert(key));
        }
    }

    #[test]
    fn test_key_serializes_as_plain_string() {
        let key = StableKey::new("k0");
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"k0\"");
    }
}
