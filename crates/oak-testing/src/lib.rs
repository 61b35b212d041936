//! Testing infrastructure for oak-ci integration tests.
//!
//! - `TestWorld`: isolated temp workspace with its own database and vector
//!   store
//! - `fixtures`: session/observation/activity row builders
//! - `assertions`: custom checks over `Tools` JSON output
//! - `process`: background process management for `oak-ci serve`

pub mod assertions;
pub mod fixtures;
pub mod process;
pub mod world;

pub use world::TestWorld;
