//! Application wiring helpers for the owning binary.

mod setup;

pub use setup::{setup_chunk_materials, setup_scene};
