//! Step definitions for tool server lifecycle scenarios.

mod given;
mod then;
mod when;
pub mod world;
