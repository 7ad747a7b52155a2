//! the test_utils folder here will share fixtures between unit tests of
//! different modules
mod common;

pub use common::*;
