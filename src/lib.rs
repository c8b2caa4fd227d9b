// === Public Modules (The Canonical Paths) ===
pub mod calendar;
pub mod compiler;
pub mod continuations;
pub mod error;
pub mod loader;
pub mod pipeline;
pub mod registry;
pub mod schema;
pub mod types;
pub mod websocket;

// === Convenience ===
pub mod prelude;
pub mod sorted_vec_map;

pub use crate::compiler::compile;
