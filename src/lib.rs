pub mod block;
pub mod chunk;
pub mod fluid;
pub mod lighting;
pub mod noise;
pub mod persist;
pub mod ron;
pub use crate::ron as ron_loader;
pub mod settings;
pub mod world;
pub mod worldgen;
