//! Domain models for rxmatch.

mod candidate;
mod catalog;
mod drug;
mod query;

pub use candidate::*;
pub use catalog::*;
pub use drug::*;
pub use query::*;
