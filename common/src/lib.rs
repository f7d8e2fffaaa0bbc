//! Shared wire types for Sparrow: the runtime configuration document decoded
//! by loaders, the per-probe result payloads, and the store envelope. Kept
//! dependency-light (serde + chrono only) so loaders, the engine, and the
//! HTTP API can all depend on it without pulling in tokio or prometheus.

pub mod payload;
pub mod result;
pub mod runtime_config;
pub mod target;

pub use payload::*;
pub use result::*;
pub use runtime_config::*;
pub use target::*;
