use anyhow::Result;
use std::process;
use tabled::{Table, Tabled, settings::Style};

use groceria_core::models::{NewRecipe, UpdateRecipe};
use groceria_core::service::GroceriaService;

use super::helpers::{print_json, resolve_products, resolve_recipe, truncate};

pub(crate) fn cmd_recipe_list(svc: &GroceriaService, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct RecipeRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Title")]
        title: String,
        #[tabled(rename = "Products")]
        products: usize,
    }

    let recipes = svc.recipe_get_all()?;
    if recipes.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No recipes found");
        }
        process::exit(2);
    }

    if json {
        return print_json(&recipes);
    }

    let relations = svc.recipe_relations_get_all()?;
    let rows: Vec<RecipeRow> = recipes
        .iter()
        .map(|r| RecipeRow {
            id: r.id.clone(),
            title: truncate(&r.title, 30),
            products: relations.iter().filter(|rel| rel.recipe_id == r.id).count(),
        })
        .collect();

    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");

    Ok(())
}

pub(crate) fn cmd_recipe_show(svc: &GroceriaService, key: &str, json: bool) -> Result<()> {
    let recipe = resolve_recipe(svc, key)?;
    let detail = svc.recipe_get(&recipe.id)?;

    if json {
        return print_json(&detail);
    }

    println!("=== {} ===", detail.recipe.title);
    if detail.products.is_empty() {
        println!("  (no products)");
    }
    for product in &detail.products {
        let section = product
            .section
            .as_ref()
            .map_or("-", |s| s.title.as_str());
        println!("  {} [{section}]", product.title);
    }

    Ok(())
}

pub(crate) fn cmd_recipe_create(
    svc: &GroceriaService,
    title: &str,
    products: &[String],
    json: bool,
) -> Result<()> {
    let product_ids = resolve_products(svc, products)?;
    let recipe = svc.recipe_create(&NewRecipe {
        title: title.to_string(),
        product_ids,
    })?;

    if json {
        return print_json(&recipe);
    }
    println!("Created recipe: {} (id: {})", recipe.title, recipe.id);
    if products.is_empty() {
        println!(
            "Add products with: groceria recipe edit \"{}\" --product <title>",
            recipe.title
        );
    }
    Ok(())
}

/// Rename and/or replace the product list. Products are kept when none are given.
pub(crate) fn cmd_recipe_edit(
    svc: &GroceriaService,
    key: &str,
    title: Option<String>,
    products: &[String],
    json: bool,
) -> Result<()> {
    let existing = resolve_recipe(svc, key)?;
    let product_ids = if products.is_empty() {
        svc.recipe_get(&existing.id)?
            .products
            .into_iter()
            .map(|p| p.id)
            .collect()
    } else {
        resolve_products(svc, products)?
    };

    let recipe = svc.recipe_update(&UpdateRecipe {
        id: existing.id,
        title: title.unwrap_or(existing.title),
        product_ids,
    })?;

    if json {
        return print_json(&recipe);
    }
    println!("Updated recipe: {}", recipe.title);
    Ok(())
}

pub(crate) fn cmd_recipe_delete(svc: &GroceriaService, key: &str, json: bool) -> Result<()> {
    let recipe = resolve_recipe(svc, key)?;
    let deleted = svc.recipe_delete(&recipe.id)?;
    if json {
        return print_json(&deleted);
    }
    println!("Deleted recipe: {}", deleted.title);
    Ok(())
}
