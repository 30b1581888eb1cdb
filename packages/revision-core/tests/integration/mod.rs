//! Integration test suite for the versioning engine.
//!
//! Organized by concern:
//! - history scenarios end to end
//! - concurrent writers
//! - revert planning and application

pub mod concurrency_tests;
pub mod helpers;
pub mod history_tests;
pub mod revert_tests;
