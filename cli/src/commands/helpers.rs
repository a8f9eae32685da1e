use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use groceria_core::models::{CountableProduct, Product, Recipe};
use groceria_core::service::GroceriaService;

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(Local::now().date_naive()),
        Some(s) => match s.as_str() {
            "today" => Ok(Local::now().date_naive()),
            "yesterday" => Ok(Local::now().date_naive() - chrono::Duration::days(1)),
            "tomorrow" => Ok(Local::now().date_naive() + chrono::Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, "%Y-%m-%d").with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
            }),
        },
    }
}

/// Find a recipe by ID, then by exact title.
pub(crate) fn resolve_recipe(svc: &GroceriaService, key: &str) -> Result<Recipe> {
    if let Ok(detail) = svc.recipe_get(key) {
        return Ok(detail.recipe);
    }
    match svc.recipe_find(key)? {
        Some(recipe) => Ok(recipe),
        None => bail!("No recipe found for '{key}'"),
    }
}

/// Find a visible product by ID, then by exact title. An owned product wins
/// over a public one with the same title.
pub(crate) fn resolve_product(svc: &GroceriaService, key: &str) -> Result<Product> {
    if let Ok(product) = svc.product_get(key) {
        return Ok(product);
    }
    let key = key.trim();
    let mut matches: Vec<Product> = svc
        .product_get_all()?
        .into_iter()
        .filter(|p| p.title == key)
        .collect();
    matches.sort_by_key(Product::is_public);
    match matches.into_iter().next() {
        Some(product) => Ok(product),
        None => bail!("No product found for '{key}'"),
    }
}

pub(crate) fn resolve_products(svc: &GroceriaService, keys: &[String]) -> Result<Vec<String>> {
    keys.iter()
        .map(|k| resolve_product(svc, k).map(|p| p.id))
        .collect()
}

/// Section ID for a title, creating the section if it is new.
pub(crate) fn section_id_for(svc: &GroceriaService, title: Option<&str>) -> Result<Option<String>> {
    title
        .map(|t| svc.section_create(t).map(|s| s.id))
        .transpose()
        .map_err(Into::into)
}

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn print_product_table(products: &[Product]) {
    #[derive(Tabled)]
    struct ProductRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Title")]
        title: String,
        #[tabled(rename = "Section")]
        section: String,
        #[tabled(rename = "Check stock")]
        check_stock: String,
        #[tabled(rename = "Owner")]
        owner: String,
    }

    let rows: Vec<ProductRow> = products
        .iter()
        .map(|p| ProductRow {
            id: p.id.clone(),
            title: truncate(&p.title, 35),
            section: p
                .section
                .as_ref()
                .map(|s| truncate(&s.title, 20))
                .unwrap_or_default(),
            check_stock: if p.check_stock { "yes" } else { "" }.to_string(),
            owner: p.owner_id.clone().unwrap_or_else(|| "public".to_string()),
        })
        .collect();

    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
}

pub(crate) fn print_count_table(products: &[CountableProduct]) {
    #[derive(Tabled)]
    struct CountRow {
        #[tabled(rename = "Product")]
        title: String,
        #[tabled(rename = "Section")]
        section: String,
        #[tabled(rename = "Count")]
        count: u32,
    }

    let rows: Vec<CountRow> = products
        .iter()
        .filter(|cp| cp.count > 0)
        .map(|cp| CountRow {
            title: truncate(&cp.product.title, 35),
            section: cp
                .product
                .section
                .as_ref()
                .map(|s| s.title.clone())
                .unwrap_or_else(|| "-".to_string()),
            count: cp.count,
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
