//! Stable identifiers derived from caller-supplied keys.
//!
//! Recovery addresses snapshots by a (foundry, workflow) key pair that must
//! survive process restarts. Keys are hashed into name-based (v5) UUIDs under
//! a fixed namespace, so the same string always maps to the same id.

use uuid::Uuid;

/// Namespace for all Forge-derived identifiers.
const FORGE_NAMESPACE: Uuid = Uuid::from_u128(0x6f72_6765_2d73_6d69_7468_2d6b_6579_7300);

/// Deterministic string -> UUID mapping.
pub struct StableKey;

impl StableKey {
    /// Derive the stable UUID for `key`.
    pub fn derive(key: &str) -> Uuid {
        Uuid::new_v5(&FORGE_NAMESPACE, key.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_is_deterministic() {
        assert_eq!(StableKey::derive("order-123"), StableKey::derive("order-123"));
    }

    #[test]
    fn derive_distinguishes_keys() {
        assert_ne!(StableKey::derive("order-123"), StableKey::derive("order-124"));
        assert_ne!(StableKey::derive(""), StableKey::derive(" "));
    }

    #[test]
    fn derive_produces_v5() {
        assert_eq!(StableKey::derive("checkout").get_version_num(), 5);
    }
}
