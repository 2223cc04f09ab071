//! Safe SQL builder: identifiers from the registry only, values as parameters.

mod builder;
pub mod ddl;
pub mod filter;
pub mod params;
pub use builder::*;
pub use filter::{build_filter, BoolOp, Clause};
pub use params::*;
