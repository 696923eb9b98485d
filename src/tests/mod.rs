//! Test helpers shared by the unit tests of this crate and the tests/ suite.
pub mod common;
