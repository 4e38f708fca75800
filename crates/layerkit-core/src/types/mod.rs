//! Type aliases shared across layerkit crates.
//!
//! - [`aliases`]: `Arc<RwLock<..>>` style wrappers for registries shared between
//!   handler closures.

pub mod aliases;

pub use aliases::*;
