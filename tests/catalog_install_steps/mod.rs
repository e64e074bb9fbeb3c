//! Step definitions for catalog installation scenarios.

mod given;
mod then;
mod when;
pub mod world;
