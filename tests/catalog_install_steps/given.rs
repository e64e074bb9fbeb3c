//! Given steps for catalog installation scenarios.

use super::world::InstallWorld;
use conduit::tool_server::{
    adapters::StaticCatalog,
    domain::{CatalogTemplate, TemplateField, TemplateId, TransportTemplate},
};
use eyre::WrapErr;
use rstest_bdd_macros::given;
use std::collections::BTreeMap;

#[given(r#"a catalog with template "{template_id}" requiring field "{field}""#)]
fn catalog_with_template(
    world: &mut InstallWorld,
    template_id: String,
    field: String,
) -> Result<(), eyre::Report> {
    let template = CatalogTemplate::new(
        TemplateId::new(template_id).wrap_err("valid template id")?,
        "Time",
        TransportTemplate::Process {
            command: "uvx".to_owned(),
            args: vec!["mcp-server-time".to_owned(), format!("--tz={{{{ {field} }}}}")],
            env: BTreeMap::new(),
            working_directory: None,
        },
    )
    .with_field(TemplateField::required(field));
    world.install_catalog(StaticCatalog::new([template]))
}
