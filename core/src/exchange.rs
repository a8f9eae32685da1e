//! Snapshot export and the title-based reconciliation used by import and the
//! batch procedures.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::db::Database;
use crate::error::Result;
use crate::models::{
    ExportData, ExportProduct, ExportRecipe, ImportSummary, NewProductByTitle, NewRecipeByTitles,
    validate_export_data, validate_title,
};

/// Rows created by a title-based batch.
#[derive(Debug, Default)]
pub(crate) struct BatchOutcome {
    pub created: i64,
    pub sections_created: i64,
    pub relations_created: i64,
    pub warnings: Vec<String>,
}

/// Everything the owner can see, with embedded sections.
pub fn export_snapshot(db: &Database, owner: &str) -> Result<ExportData> {
    let products = db
        .list_products(owner)?
        .into_iter()
        .map(ExportProduct::from)
        .collect();
    let recipes = db
        .list_recipes(owner)?
        .into_iter()
        .map(ExportRecipe::from)
        .collect();
    let recipe_to_product = db.list_relations(owner)?;
    Ok(ExportData {
        recipes,
        products,
        recipe_to_product,
    })
}

/// Create the products whose title is not in `existing`.
/// Section titles that do not exist are created.
pub(crate) fn create_products_by_title(
    db: &Database,
    owner: &str,
    items: &[NewProductByTitle],
    mut existing: HashSet<String>,
) -> Result<BatchOutcome> {
    let mut outcome = BatchOutcome::default();

    for item in items {
        let title = validate_title("Product", &item.title)?;
        if !existing.insert(title.clone()) {
            continue;
        }
        let section_id = match item.section_title.as_deref().map(str::trim) {
            Some(section_title) if !section_title.is_empty() => {
                let section_title = validate_title("Section", section_title)?;
                let (section, created) = db.get_or_create_section(owner, &section_title)?;
                if created {
                    outcome.sections_created += 1;
                }
                Some(section.id)
            }
            _ => None,
        };
        db.insert_product(Some(owner), &title, section_id.as_deref(), item.check_stock)?;
        outcome.created += 1;
    }

    Ok(outcome)
}

/// Create the recipes whose title the owner does not have yet, linking each to
/// the visible products with matching titles. Owned products win over public
/// ones with the same title. Unknown product titles are reported and skipped.
pub(crate) fn create_recipes_by_titles(
    db: &Database,
    owner: &str,
    items: &[NewRecipeByTitles],
) -> Result<BatchOutcome> {
    let mut outcome = BatchOutcome::default();

    let mut by_title: HashMap<String, String> = HashMap::new();
    for product in db.list_products(owner)? {
        if product.is_public() {
            by_title.entry(product.title).or_insert(product.id);
        } else {
            by_title.insert(product.title, product.id);
        }
    }

    let mut existing: HashSet<String> = db
        .list_recipes(owner)?
        .into_iter()
        .map(|r| r.title)
        .collect();

    for item in items {
        let title = validate_title("Recipe", &item.title)?;
        if !existing.insert(title.clone()) {
            continue;
        }

        let mut product_ids = Vec::new();
        for product_title in &item.product_titles {
            match by_title.get(product_title.trim()) {
                Some(id) => product_ids.push(id.clone()),
                None => {
                    tracing::warn!(
                        recipe = %title,
                        product = %product_title,
                        "unknown product title"
                    );
                    outcome.warnings.push(format!(
                        "Recipe \"{title}\": no product titled \"{product_title}\""
                    ));
                }
            }
        }

        let recipe = db.insert_recipe(owner, &title)?;
        outcome.relations_created += db.insert_relations(&recipe.id, &product_ids)?;
        outcome.created += 1;
    }

    Ok(outcome)
}

/// Merge a snapshot into the owner's data by title. Nothing that already
/// exists is changed, so importing the same snapshot twice is a no-op.
pub fn import_snapshot(db: &Database, owner: &str, data: &ExportData) -> Result<ImportSummary> {
    validate_export_data(data)?;

    db.transaction(|| {
        let mut summary = ImportSummary::default();

        // Sections referenced by imported products
        let section_titles: BTreeSet<String> = data
            .products
            .iter()
            .filter_map(|p| p.section.as_ref())
            .map(|s| s.title.trim().to_string())
            .collect();
        for title in &section_titles {
            let (_, created) = db.get_or_create_section(owner, title)?;
            if created {
                summary.sections_created += 1;
            }
        }

        // Products, skipping any title the owner can already see
        let visible: HashSet<String> = db
            .list_products(owner)?
            .into_iter()
            .map(|p| p.title)
            .collect();
        let products: Vec<NewProductByTitle> = data
            .products
            .iter()
            .map(|p| NewProductByTitle {
                title: p.title.clone(),
                section_title: p.section.as_ref().map(|s| s.title.clone()),
                check_stock: p.check_stock,
            })
            .collect();
        let outcome = create_products_by_title(db, owner, &products, visible)?;
        summary.products_created = outcome.created;
        summary.sections_created += outcome.sections_created;

        // Recipes, with ingredients resolved to titles through the snapshot
        let product_titles: HashMap<&str, &str> = data
            .products
            .iter()
            .map(|p| (p.id.as_str(), p.title.as_str()))
            .collect();
        let mut recipes = Vec::with_capacity(data.recipes.len());
        for recipe in &data.recipes {
            let mut titles = Vec::new();
            for rel in data
                .recipe_to_product
                .iter()
                .filter(|r| r.recipe_id == recipe.id)
            {
                match product_titles.get(rel.product_id.as_str()) {
                    Some(title) => titles.push((*title).to_string()),
                    None => {
                        tracing::warn!(
                            recipe = %recipe.title,
                            product_id = %rel.product_id,
                            "relation points outside snapshot"
                        );
                        summary.warnings.push(format!(
                            "Recipe \"{}\": product {} is not in the snapshot",
                            recipe.title, rel.product_id
                        ));
                    }
                }
            }
            recipes.push(NewRecipeByTitles {
                title: recipe.title.clone(),
                product_titles: titles,
            });
        }
        let outcome = create_recipes_by_titles(db, owner, &recipes)?;
        summary.recipes_created = outcome.created;
        summary.relations_created = outcome.relations_created;
        summary.warnings.extend(outcome.warnings);

        Ok(summary)
    })
    .inspect(|summary| {
        tracing::info!(
            sections = summary.sections_created,
            products = summary.products_created,
            recipes = summary.recipes_created,
            relations = summary.relations_created,
            warnings = summary.warnings.len(),
            "import complete"
        );
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExportSection, RecipeRelation};

    fn db_with_user(owner: &str) -> Database {
        let db = Database::open_in_memory().unwrap();
        db.ensure_user(owner).unwrap();
        db
    }

    fn snapshot() -> ExportData {
        let product = |id: &str, title: &str, section: &str| ExportProduct {
            id: id.to_string(),
            title: title.to_string(),
            section_id: None,
            check_stock: false,
            owner_id: None,
            section: Some(ExportSection {
                id: None,
                title: section.to_string(),
            }),
        };
        ExportData {
            recipes: vec![
                ExportRecipe {
                    id: "r1".to_string(),
                    title: "Omelette".to_string(),
                    owner_id: None,
                },
                ExportRecipe {
                    id: "r2".to_string(),
                    title: "Pancakes".to_string(),
                    owner_id: None,
                },
            ],
            products: vec![
                product("p1", "Eggs", "Dairy"),
                product("p2", "Milk", "Dairy"),
                product("p3", "Flour", "Pantry"),
            ],
            recipe_to_product: vec![
                RecipeRelation {
                    recipe_id: "r1".to_string(),
                    product_id: "p1".to_string(),
                },
                RecipeRelation {
                    recipe_id: "r2".to_string(),
                    product_id: "p1".to_string(),
                },
                RecipeRelation {
                    recipe_id: "r2".to_string(),
                    product_id: "p2".to_string(),
                },
                RecipeRelation {
                    recipe_id: "r2".to_string(),
                    product_id: "p3".to_string(),
                },
            ],
        }
    }

    #[test]
    fn test_import_into_empty_store() {
        let db = db_with_user("alice");
        let summary = import_snapshot(&db, "alice", &snapshot()).unwrap();
        assert_eq!(summary.sections_created, 2);
        assert_eq!(summary.products_created, 3);
        assert_eq!(summary.recipes_created, 2);
        assert_eq!(summary.relations_created, 4);
        assert!(summary.warnings.is_empty());

        let products = db.list_products("alice").unwrap();
        let flour = products.iter().find(|p| p.title == "Flour").unwrap();
        assert_eq!(flour.section.as_ref().unwrap().title, "Pantry");
    }

    #[test]
    fn test_import_twice_creates_nothing_new() {
        let db = db_with_user("alice");
        import_snapshot(&db, "alice", &snapshot()).unwrap();
        let second = import_snapshot(&db, "alice", &snapshot()).unwrap();
        assert_eq!(second, ImportSummary::default());

        assert_eq!(db.list_sections("alice").unwrap().len(), 2);
        assert_eq!(db.list_products("alice").unwrap().len(), 3);
        assert_eq!(db.list_recipes("alice").unwrap().len(), 2);
        assert_eq!(db.list_relations("alice").unwrap().len(), 4);
    }

    #[test]
    fn test_export_then_import_round_trips_titles() {
        let source = db_with_user("alice");
        import_snapshot(&source, "alice", &snapshot()).unwrap();
        let exported = export_snapshot(&source, "alice").unwrap();

        let target = db_with_user("bob");
        let json = serde_json::to_string(&exported).unwrap();
        let parsed = ExportData::from_json(&json).unwrap();
        import_snapshot(&target, "bob", &parsed).unwrap();

        let titles = |db: &Database, owner: &str| -> Vec<String> {
            db.list_products(owner)
                .unwrap()
                .into_iter()
                .map(|p| p.title)
                .collect()
        };
        assert_eq!(titles(&source, "alice"), titles(&target, "bob"));
        assert_eq!(
            source.list_recipes("alice").unwrap().len(),
            target.list_recipes("bob").unwrap().len()
        );
        assert_eq!(
            source.list_relations("alice").unwrap().len(),
            target.list_relations("bob").unwrap().len()
        );

        // IDs are not carried over
        let source_ids: HashSet<String> = source
            .list_products("alice")
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert!(
            target
                .list_products("bob")
                .unwrap()
                .iter()
                .all(|p| !source_ids.contains(&p.id))
        );
    }

    #[test]
    fn test_import_skips_dangling_relation() {
        let db = db_with_user("alice");
        let mut data = snapshot();
        data.recipe_to_product.push(RecipeRelation {
            recipe_id: "r1".to_string(),
            product_id: "nowhere".to_string(),
        });
        let summary = import_snapshot(&db, "alice", &data).unwrap();
        assert_eq!(summary.relations_created, 4);
        assert_eq!(summary.warnings.len(), 1);
        assert!(summary.warnings[0].contains("nowhere"));
    }

    #[test]
    fn test_import_keeps_existing_rows() {
        let db = db_with_user("alice");
        let section = db.insert_section("alice", "Fridge").unwrap();
        let eggs = db
            .insert_product(Some("alice"), "Eggs", Some(&section.id), true)
            .unwrap();

        let summary = import_snapshot(&db, "alice", &snapshot()).unwrap();
        assert_eq!(summary.products_created, 2);

        // Existing product untouched, and recipes link to it
        let product = db.get_product("alice", &eggs).unwrap();
        assert_eq!(product.section.unwrap().title, "Fridge");
        assert!(product.check_stock);
        let omelette = db.find_recipe_by_title("alice", "Omelette").unwrap().unwrap();
        let linked = db.recipe_products(&omelette.id).unwrap();
        assert_eq!(linked[0].id, eggs);
    }

    #[test]
    fn test_import_own_export_with_public_products() {
        let db = db_with_user("alice");
        db.insert_product(None, "Salt", None, false).unwrap();
        let exported = export_snapshot(&db, "alice").unwrap();

        let summary = import_snapshot(&db, "alice", &exported).unwrap();
        assert_eq!(summary.products_created, 0);

        let products = db.list_products("alice").unwrap();
        assert_eq!(products.len(), 1);
        assert!(products[0].is_public());
    }

    #[test]
    fn test_import_links_recipes_to_public_products() {
        let db = db_with_user("alice");
        let eggs = db.insert_product(None, "Eggs", None, false).unwrap();
        let summary = import_snapshot(&db, "alice", &snapshot()).unwrap();
        assert_eq!(summary.products_created, 2);

        let omelette = db.find_recipe_by_title("alice", "Omelette").unwrap().unwrap();
        let linked = db.recipe_products(&omelette.id).unwrap();
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].id, eggs);
    }

    #[test]
    fn test_import_rejects_blank_title_without_writing() {
        let db = db_with_user("alice");
        let mut data = snapshot();
        data.products[2].title = "  ".to_string();
        assert!(import_snapshot(&db, "alice", &data).is_err());
        assert!(db.list_sections("alice").unwrap().is_empty());
        assert!(db.list_products("alice").unwrap().is_empty());
    }

    #[test]
    fn test_create_recipes_reports_unknown_titles() {
        let db = db_with_user("alice");
        db.insert_product(Some("alice"), "Eggs", None, false).unwrap();
        let outcome = create_recipes_by_titles(
            &db,
            "alice",
            &[NewRecipeByTitles {
                title: "Omelette".to_string(),
                product_titles: vec!["Eggs".to_string(), "Truffle".to_string()],
            }],
        )
        .unwrap();
        assert_eq!(outcome.created, 1);
        assert_eq!(outcome.relations_created, 1);
        assert_eq!(outcome.warnings.len(), 1);
    }

    #[test]
    fn test_create_recipes_prefers_owned_product() {
        let db = db_with_user("alice");
        db.insert_product(None, "Salt", None, false).unwrap();
        let mine = db.insert_product(Some("alice"), "Salt", None, false).unwrap();
        create_recipes_by_titles(
            &db,
            "alice",
            &[NewRecipeByTitles {
                title: "Soup".to_string(),
                product_titles: vec!["Salt".to_string()],
            }],
        )
        .unwrap();
        let relations = db.list_relations("alice").unwrap();
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].product_id, mine);
    }

    #[test]
    fn test_create_products_skips_duplicates_in_input() {
        let db = db_with_user("alice");
        let item = NewProductByTitle {
            title: "Milk".to_string(),
            section_title: Some("Dairy".to_string()),
            check_stock: false,
        };
        let outcome = create_products_by_title(
            &db,
            "alice",
            &[item.clone(), item],
            db.owned_product_titles("alice").unwrap(),
        )
        .unwrap();
        assert_eq!(outcome.created, 1);
        assert_eq!(outcome.sections_created, 1);
    }
}
