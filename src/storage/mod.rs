//! Durable output: the JSON Lines sink and the per-search checkpoint.

pub mod checkpoint;
pub mod sink;

pub use checkpoint::{state_path, Checkpoint};
pub use sink::{load_emitted_ids, JsonlSink};
