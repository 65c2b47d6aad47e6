// Glazyr shared type definitions
// Each submodule defines types used across the capture pipeline.

pub mod capture;
pub mod errors;
pub mod page;
pub mod policy;
pub mod settings;
