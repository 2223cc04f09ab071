//! Model schemas: field types, per-model descriptors and the registry.

mod descriptor;
mod field;
mod registry;

pub use descriptor::*;
pub use field::*;
pub use registry::*;
