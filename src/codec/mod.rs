//! Codec boundary between transports and the reference store.
//!
//! Codecs translate a wire payload into store references before a flow runs
//! and re-assemble a resource into a payload afterwards. They are consumed by
//! the construction layer around `Manager::call`; the engine itself has no
//! knowledge of wire formats.

pub mod json;

use anyhow::Result;

use crate::refs::Store;

pub use json::JsonCodec;

/// Translates between a wire payload and store references
pub trait Codec: Send + Sync {
    /// Re-assemble the codec's resource from the given store into a payload
    fn marshal(&self, store: &Store) -> Result<Vec<u8>>;

    /// Decompose the given payload into references inside the store
    fn unmarshal(&self, data: &[u8], store: &Store) -> Result<()>;
}
