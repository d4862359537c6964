//! Concrete storage layouts implementing [`StorageBackend`](crate::StorageBackend).

mod aos;
mod soa;
mod tiled;

pub use aos::AosStorage;
pub use soa::SoaStorage;
pub use tiled::{TiledStorage, VECTOR_LENGTH};
