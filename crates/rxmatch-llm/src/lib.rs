//! Vision-model prescription extraction for rxmatch.
//!
//! This crate turns the JSON a vision model returns for a prescription image
//! into [`rxmatch_core::DrugQuery`] inputs for the search orchestrator.

pub mod extraction;
pub mod prompts;

pub use extraction::*;
pub use prompts::*;
