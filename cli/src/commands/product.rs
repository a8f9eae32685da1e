use anyhow::Result;
use std::process;

use groceria_core::models::{NewProduct, UpdateProduct};
use groceria_core::service::GroceriaService;

use super::helpers::{print_json, print_product_table, resolve_product, section_id_for};

pub(crate) fn cmd_product_list(svc: &GroceriaService, json: bool) -> Result<()> {
    let products = svc.product_get_all()?;
    if products.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No products found");
        }
        process::exit(2);
    }

    if json {
        return print_json(&products);
    }
    print_product_table(&products);
    Ok(())
}

pub(crate) fn cmd_product_add(
    svc: &GroceriaService,
    title: &str,
    section: Option<&str>,
    check_stock: bool,
    public: bool,
    json: bool,
) -> Result<()> {
    let section_id = section_id_for(svc, section)?;
    let product = svc.product_create(&NewProduct {
        title: title.to_string(),
        section_id,
        check_stock,
        public_product: public,
    })?;

    if json {
        return print_json(&product);
    }
    let placement = product
        .section
        .as_ref()
        .map_or_else(|| "no section".to_string(), |s| s.title.clone());
    println!("Added {} ({placement}, id: {})", product.title, product.id);
    Ok(())
}

pub(crate) struct ProductEdit {
    pub title: Option<String>,
    pub section: Option<String>,
    pub no_section: bool,
    pub check_stock: Option<bool>,
    pub public: Option<bool>,
}

pub(crate) fn cmd_product_edit(
    svc: &GroceriaService,
    key: &str,
    edit: ProductEdit,
    json: bool,
) -> Result<()> {
    let existing = resolve_product(svc, key)?;
    let section_id = if edit.no_section {
        None
    } else if edit.section.is_some() {
        section_id_for(svc, edit.section.as_deref())?
    } else {
        existing.section_id.clone()
    };

    let product = svc.product_update(&UpdateProduct {
        id: existing.id.clone(),
        title: edit.title.unwrap_or_else(|| existing.title.clone()),
        section_id,
        check_stock: edit.check_stock.unwrap_or(existing.check_stock),
        public_product: edit.public.unwrap_or(existing.is_public()),
    })?;

    if json {
        return print_json(&product);
    }
    println!("Updated {} (id: {})", product.title, product.id);
    Ok(())
}

pub(crate) fn cmd_product_delete(svc: &GroceriaService, key: &str, json: bool) -> Result<()> {
    let product = resolve_product(svc, key)?;
    let deleted = svc.product_delete(&product.id)?;
    if json {
        return print_json(&deleted);
    }
    println!("Deleted {}", deleted.title);
    Ok(())
}

pub(crate) fn cmd_product_clear(svc: &GroceriaService, json: bool) -> Result<()> {
    let deleted = svc.product_delete_many()?;
    if json {
        return print_json(&deleted);
    }
    println!("Deleted {} product(s)", deleted.count);
    Ok(())
}
