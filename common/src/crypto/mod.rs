pub mod hash;
pub mod random;

pub use hash::{hash, Hash, Hashable, HASH_SIZE};
