//! Structural fingerprints for virtual nodes.
//!
//! Every node summarises its type, properties and children into a single
//! `u64`. Equal fingerprints are treated as structurally equal by the
//! reconciler, so a subtree whose fingerprint did not change is reused
//! wholesale without being walked.

use core::hash::Hash;
use std::hash::Hasher;

pub type Fingerprint = u64;

/// Contribution of an absent (`null`) child slot.
pub const HOLE: Fingerprint = 0x9e37_79b9_7f4a_7c15;

#[cfg(feature = "std-hash")]
pub mod default {
    pub use std::collections::hash_map::DefaultHasher;

    #[inline]
    pub fn new() -> DefaultHasher {
        DefaultHasher::new()
    }
}

#[cfg(not(feature = "std-hash"))]
pub mod default {
    pub use ahash::AHasher as DefaultHasher;

    #[inline]
    pub fn new() -> DefaultHasher {
        DefaultHasher::default()
    }
}

/// Hash a single value with whichever default hasher is active.
#[inline]
pub fn hash_one<T: Hash + ?Sized>(v: &T) -> Fingerprint {
    let mut h = default::new();
    v.hash(&mut h);
    h.finish()
}

/// Fold `x` into the running fingerprint `h` (`h * 33 + x`, wrapping).
#[inline]
pub fn combine(h: Fingerprint, x: Fingerprint) -> Fingerprint {
    h.wrapping_add(h.wrapping_shl(5)).wrapping_add(x)
}

/// Fingerprint of a single `name = value` pair.
pub fn property<V: Hash + ?Sized>(name: &str, value: &V) -> Fingerprint {
    combine(combine(0, hash_one(name)), hash_one(value))
}

/// Fingerprint of a node before its children are folded in.
#[inline]
pub fn node(type_hash: Fingerprint, props: Fingerprint) -> Fingerprint {
    type_hash.wrapping_shl(5).wrapping_add(props)
}
