//! Behaviour tests for installing servers from catalog templates.

mod catalog_install_steps;

use catalog_install_steps::world::{InstallWorld, world};
use rstest_bdd_macros::scenario;

#[scenario(
    path = "tests/features/catalog_install.feature",
    name = "Installing a template registers and starts a server"
)]
#[tokio::test(flavor = "multi_thread")]
async fn install_registers_and_starts(world: InstallWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/catalog_install.feature",
    name = "Installing the same template twice is a conflict"
)]
#[tokio::test(flavor = "multi_thread")]
async fn second_install_conflicts(world: InstallWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/catalog_install.feature",
    name = "Missing required fields are rejected"
)]
#[tokio::test(flavor = "multi_thread")]
async fn missing_fields_rejected(world: InstallWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/catalog_install.feature",
    name = "Unknown templates are rejected"
)]
#[tokio::test(flavor = "multi_thread")]
async fn unknown_templates_rejected(world: InstallWorld) {
    let _ = world;
}
