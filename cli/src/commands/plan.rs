use anyhow::{Context, Result};
use std::path::Path;
use std::process;

use groceria_core::plan::PlanState;
use groceria_core::service::GroceriaService;

use super::helpers::{
    json_error, parse_date, print_count_table, print_json, resolve_product, resolve_recipe,
};

fn print_plan(svc: &GroceriaService, state: &PlanState) -> Result<()> {
    let recipes = svc.recipe_get_all()?;
    let chosen: Vec<&str> = state
        .chosen_recipes
        .iter()
        .filter_map(|id| recipes.iter().find(|r| &r.id == id))
        .map(|r| r.title.as_str())
        .collect();

    if chosen.is_empty() {
        println!("No recipes chosen");
    } else {
        println!("Chosen: {}", chosen.join(", "));
    }
    if state.products.iter().any(|cp| cp.count > 0) {
        print_count_table(&state.products);
    }
    Ok(())
}

pub(crate) fn cmd_plan_show(svc: &GroceriaService, json: bool) -> Result<()> {
    let state = svc.plan_load()?;
    if json {
        return print_json(&state);
    }
    print_plan(svc, &state)
}

pub(crate) fn cmd_plan_choose(svc: &GroceriaService, keys: &[String], json: bool) -> Result<()> {
    let mut state = None;
    for key in keys {
        let recipe = resolve_recipe(svc, key)?;
        state = Some(svc.plan_choose_recipe(&recipe.id)?);
    }
    let state = match state {
        Some(state) => state,
        None => svc.plan_load()?,
    };
    if json {
        return print_json(&state);
    }
    print_plan(svc, &state)
}

pub(crate) fn cmd_plan_unchoose(svc: &GroceriaService, key: &str, json: bool) -> Result<()> {
    let recipe = resolve_recipe(svc, key)?;
    if !svc.plan_load()?.chosen_recipes.contains(&recipe.id) {
        let message = format!("Recipe '{}' is not chosen", recipe.title);
        if json {
            println!("{}", json_error(&message));
        } else {
            eprintln!("{message}");
        }
        process::exit(2);
    }

    let state = svc.plan_unchoose_recipe(&recipe.id)?;
    if json {
        return print_json(&state);
    }
    print_plan(svc, &state)
}

pub(crate) fn cmd_plan_set_count(
    svc: &GroceriaService,
    key: &str,
    count: u32,
    json: bool,
) -> Result<()> {
    let product = resolve_product(svc, key)?;
    let state = svc.plan_set_count(&product.id, count)?;
    if json {
        return print_json(&state);
    }
    println!("{}: {}", product.title, state.count_of(&product.id));
    Ok(())
}

pub(crate) fn cmd_plan_clear(svc: &GroceriaService, json: bool) -> Result<()> {
    let state = svc.plan_clear()?;
    if json {
        return print_json(&state);
    }
    println!("Plan cleared");
    Ok(())
}

pub(crate) fn cmd_plan_list(
    svc: &GroceriaService,
    date: Option<String>,
    output: Option<&Path>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let list = svc.plan_grocery_list(date)?;

    if json {
        return print_json(&list);
    }

    match output {
        Some(path) => {
            std::fs::write(path, &list.text)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Wrote grocery list to {}", path.display());
        }
        None => print!("{}", list.text),
    }

    for cp in &list.unsectioned {
        eprintln!(
            "Warning: {} ({}) has no section and is not on the list",
            cp.product.title, cp.count
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use groceria_core::models::NewRecipe;

    #[test]
    fn test_choose_several_recipes() {
        let svc = GroceriaService::open_in_memory("tester").unwrap();
        let ids: Vec<String> = ["Soup", "Stew"]
            .iter()
            .map(|title| {
                svc.recipe_create(&NewRecipe {
                    title: (*title).to_string(),
                    product_ids: Vec::new(),
                })
                .unwrap()
                .id
            })
            .collect();

        cmd_plan_choose(&svc, &["Soup".to_string(), "Stew".to_string()], true).unwrap();
        assert_eq!(svc.plan_load().unwrap().chosen_recipes, ids);
    }
}
