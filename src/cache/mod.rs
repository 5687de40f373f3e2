pub mod keys;
pub mod mutation;
pub mod store;

pub use keys::QueryKey;
pub use mutation::{run_optimistic, PendingChange};
pub use store::{CacheEntry, CacheStore};
