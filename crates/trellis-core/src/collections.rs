#[cfg(feature = "std-hash")]
pub mod map {
    pub use std::collections::{HashMap, HashSet};

    pub type IndexSet<K> = indexmap::IndexSet<K, std::collections::hash_map::RandomState>;
}

#[cfg(not(feature = "std-hash"))]
pub mod map {
    pub use hashbrown::{HashMap, HashSet};

    pub type IndexSet<K> = indexmap::IndexSet<K, ahash::RandomState>;
}
