//! Persistence layer: a checksummed binary snapshot of the index.

pub mod codec;
pub mod serialization;

pub use codec::{from_bytes, load, load_file, save, save_file, to_bytes};
