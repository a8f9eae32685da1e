use anyhow::{Context, Result};
use std::path::Path;

use groceria_core::service::GroceriaService;

use super::helpers::print_json;

pub(crate) fn cmd_export(svc: &GroceriaService, output: Option<&Path>) -> Result<()> {
    let data = svc.export_snapshot()?;
    let json = serde_json::to_string_pretty(&data)?;

    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!(
                "Exported {} product(s), {} recipe(s) to {}",
                data.products.len(),
                data.recipes.len(),
                path.display()
            );
        }
        None => println!("{json}"),
    }
    Ok(())
}

pub(crate) fn cmd_import(svc: &GroceriaService, file: &Path, json: bool) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let summary = svc.import_json(&content)?;

    if json {
        return print_json(&summary);
    }

    println!("Import complete:");
    println!("  Sections created:  {}", summary.sections_created);
    println!("  Products created:  {}", summary.products_created);
    println!("  Recipes created:   {}", summary.recipes_created);
    println!("  Relations created: {}", summary.relations_created);
    for warning in &summary.warnings {
        eprintln!("Warning: {warning}");
    }
    Ok(())
}
