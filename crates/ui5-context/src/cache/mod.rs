//
// cache/mod.rs
//
// In-memory artifact store and on-disk descriptor cache
//

pub mod category;
pub mod disk;
pub mod documents;
pub mod locks;
pub mod store;

pub use documents::DocumentOperation;
pub use store::CacheStore;
