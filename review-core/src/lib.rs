//! Domain types shared by the review service and its tooling.

mod lenient;
pub mod model;
pub mod snowflake;

pub use model::*;
pub use snowflake::{decompose, IdGenerator, IdGeneratorError, IdParts};
