//! Integration test suite.
//!
//! 1. End-to-end decoding and transaction reconstruction
//! 2. Registry watermarks, garbage collection and ordering properties

pub mod end_to_end_tests;
pub mod registry_tests;
