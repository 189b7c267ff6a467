pub mod allocator;
pub mod bitset;
pub mod geometry;
pub mod work_timer;

use ahash::AHashMap;
pub type SmallKeyHashMap<K, V> = AHashMap<K, V>;

// Re-exports.
pub use approx;
pub use ilattice::glam as glam;
pub use ilattice;
pub use static_assertions;
