//! Recipe selection, product counts, and grocery-list rendering.
//!
//! Everything here is pure. Loading and saving the session lives in
//! [`crate::service::GroceriaService`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write as _;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{CountableProduct, Product, RecipeRelation};

pub const CHOSEN_RECIPES_KEY: &str = "chosenRecipes";
pub const PRODUCTS_KEY: &str = "products";
pub const COUNT_ADJUSTMENTS_KEY: &str = "countAdjustments";

fn clamp_count(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

/// Add each product's delta to its count, clamping at zero.
/// Products missing from `delta` are left as they are.
pub fn apply_delta(products: &mut [CountableProduct], delta: &HashMap<String, i64>) {
    for cp in products.iter_mut() {
        if let Some(d) = delta.get(&cp.product.id) {
            cp.count = clamp_count(i64::from(cp.count) + d);
        }
    }
}

/// The delta for toggling one recipe: `step` for every product it references.
#[must_use]
pub fn recipe_delta(
    recipe_id: &str,
    relations: &[RecipeRelation],
    step: i64,
) -> HashMap<String, i64> {
    let mut delta = HashMap::new();
    for rel in relations.iter().filter(|r| r.recipe_id == recipe_id) {
        delta.insert(rel.product_id.clone(), step);
    }
    delta
}

/// Count each product by how many chosen recipes reference it, then add
/// any manual adjustment. The result keeps the order of `products`.
#[must_use]
pub fn recompute_counts(
    products: &[Product],
    relations: &[RecipeRelation],
    chosen: &[String],
    adjustments: &BTreeMap<String, i64>,
) -> Vec<CountableProduct> {
    let chosen: HashSet<&str> = chosen.iter().map(String::as_str).collect();
    let mut derived: HashMap<&str, i64> = HashMap::new();
    let mut seen: HashSet<(&str, &str)> = HashSet::new();
    for rel in relations {
        if !chosen.contains(rel.recipe_id.as_str()) {
            continue;
        }
        if seen.insert((rel.recipe_id.as_str(), rel.product_id.as_str())) {
            *derived.entry(rel.product_id.as_str()).or_insert(0) += 1;
        }
    }

    products
        .iter()
        .map(|p| {
            let base = derived.get(p.id.as_str()).copied().unwrap_or(0);
            let adjust = adjustments.get(&p.id).copied().unwrap_or(0);
            CountableProduct {
                product: p.clone(),
                count: clamp_count(base + adjust),
            }
        })
        .collect()
}

/// The persisted planning session for one owner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanState {
    pub chosen_recipes: Vec<String>,
    pub products: Vec<CountableProduct>,
    pub count_adjustments: BTreeMap<String, i64>,
}

impl PlanState {
    /// Add a recipe to the chosen set. Returns false if it was already chosen.
    pub fn choose(&mut self, recipe_id: &str) -> bool {
        if self.chosen_recipes.iter().any(|id| id == recipe_id) {
            return false;
        }
        self.chosen_recipes.push(recipe_id.to_string());
        true
    }

    /// Remove a recipe from the chosen set. Returns false if it was not chosen.
    pub fn unchoose(&mut self, recipe_id: &str) -> bool {
        let before = self.chosen_recipes.len();
        self.chosen_recipes.retain(|id| id != recipe_id);
        self.chosen_recipes.len() != before
    }

    /// Pin a product's effective count by storing the difference from its
    /// recipe-derived count. Call [`PlanState::refresh`] afterwards.
    pub fn set_count(&mut self, product_id: &str, count: u32, relations: &[RecipeRelation]) {
        let chosen: HashSet<&str> = self.chosen_recipes.iter().map(String::as_str).collect();
        let derived = relations
            .iter()
            .filter(|r| r.product_id == product_id && chosen.contains(r.recipe_id.as_str()))
            .map(|r| r.recipe_id.as_str())
            .collect::<HashSet<_>>()
            .len();
        let derived = i64::try_from(derived).unwrap_or(i64::MAX);
        let adjust = i64::from(count) - derived;
        if adjust == 0 {
            self.count_adjustments.remove(product_id);
        } else {
            self.count_adjustments.insert(product_id.to_string(), adjust);
        }
    }

    /// Rebuild `products` from the current catalog. Chosen recipes and
    /// adjustments that refer to rows which no longer exist are dropped.
    pub fn refresh(
        &mut self,
        products: &[Product],
        relations: &[RecipeRelation],
        recipe_ids: &HashSet<String>,
    ) {
        self.chosen_recipes.retain(|id| recipe_ids.contains(id));
        let product_ids: HashSet<&str> = products.iter().map(|p| p.id.as_str()).collect();
        self.count_adjustments
            .retain(|id, _| product_ids.contains(id.as_str()));
        self.products = recompute_counts(
            products,
            relations,
            &self.chosen_recipes,
            &self.count_adjustments,
        );
    }

    #[must_use]
    pub fn count_of(&self, product_id: &str) -> u32 {
        self.products
            .iter()
            .find(|cp| cp.product.id == product_id)
            .map_or(0, |cp| cp.count)
    }
}

/// A rendered grocery list plus the wanted products that could not be
/// placed under a section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroceryList {
    pub text: String,
    pub unsectioned: Vec<CountableProduct>,
}

/// Render the products with a positive count as a markdown checklist,
/// grouped by section. Sections are ordered by descending ID.
#[must_use]
pub fn generate_grocery_list(products: &[CountableProduct], date: NaiveDate) -> GroceryList {
    // section id -> (title, item lines)
    let mut sections: BTreeMap<&str, (&str, Vec<String>)> = BTreeMap::new();
    let mut unsectioned = Vec::new();

    for cp in products.iter().filter(|cp| cp.count > 0) {
        let Some(section) = cp.product.section.as_ref() else {
            unsectioned.push(cp.clone());
            continue;
        };
        let mut line = format!("* [ ] {} ({})", cp.product.title, cp.count);
        if cp.product.check_stock {
            line.push_str(" (check stock)");
        }
        sections
            .entry(section.id.as_str())
            .or_insert_with(|| (section.title.as_str(), Vec::new()))
            .1
            .push(line);
    }

    let mut text = format!("# Groceries {}\n", date.format("%Y-%m-%d"));
    for (title, lines) in sections.values().rev() {
        let _ = write!(text, "\n## {title}\n");
        for line in lines {
            text.push_str(line);
            text.push('\n');
        }
    }

    if !unsectioned.is_empty() {
        tracing::warn!(
            count = unsectioned.len(),
            "products without a section left off the grocery list"
        );
    }

    GroceryList { text, unsectioned }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Section;

    fn section(id: &str, title: &str) -> Section {
        Section {
            id: id.to_string(),
            title: title.to_string(),
            owner_id: "u1".to_string(),
        }
    }

    fn product(id: &str, title: &str, section: Option<Section>) -> Product {
        Product {
            id: id.to_string(),
            title: title.to_string(),
            section_id: section.as_ref().map(|s| s.id.clone()),
            check_stock: false,
            owner_id: Some("u1".to_string()),
            section,
        }
    }

    fn relation(recipe_id: &str, product_id: &str) -> RecipeRelation {
        RecipeRelation {
            recipe_id: recipe_id.to_string(),
            product_id: product_id.to_string(),
        }
    }

    fn countable(p: Product, count: u32) -> CountableProduct {
        CountableProduct { product: p, count }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
    }

    #[test]
    fn test_apply_delta_clamps_at_zero() {
        let mut products = vec![
            countable(product("p1", "Eggs", None), 1),
            countable(product("p2", "Milk", None), 0),
        ];
        let delta = HashMap::from([("p1".to_string(), -3), ("p2".to_string(), 2)]);
        apply_delta(&mut products, &delta);
        assert_eq!(products[0].count, 0);
        assert_eq!(products[1].count, 2);
    }

    #[test]
    fn test_apply_delta_then_inverse_restores() {
        let relations = vec![relation("r1", "p1"), relation("r1", "p2")];
        let mut products = vec![
            countable(product("p1", "Eggs", None), 2),
            countable(product("p2", "Milk", None), 0),
            countable(product("p3", "Salt", None), 5),
        ];
        let original = products.clone();
        apply_delta(&mut products, &recipe_delta("r1", &relations, 1));
        apply_delta(&mut products, &recipe_delta("r1", &relations, -1));
        assert_eq!(products, original);
    }

    #[test]
    fn test_apply_delta_agrees_with_recompute() {
        let catalog = vec![product("p1", "Eggs", None), product("p2", "Milk", None)];
        let relations = vec![
            relation("r1", "p1"),
            relation("r1", "p2"),
            relation("r2", "p1"),
        ];

        let mut incremental: Vec<CountableProduct> =
            catalog.iter().cloned().map(CountableProduct::new).collect();
        apply_delta(&mut incremental, &recipe_delta("r1", &relations, 1));
        apply_delta(&mut incremental, &recipe_delta("r2", &relations, 1));

        let chosen = vec!["r1".to_string(), "r2".to_string()];
        let recomputed = recompute_counts(&catalog, &relations, &chosen, &BTreeMap::new());
        assert_eq!(incremental, recomputed);
        assert_eq!(recomputed[0].count, 2);
        assert_eq!(recomputed[1].count, 1);
    }

    #[test]
    fn test_choose_and_unchoose_example() {
        let catalog = vec![product("p1", "Eggs", None), product("p2", "Milk", None)];
        let relations = vec![relation("r1", "p1"), relation("r1", "p2")];
        let recipe_ids = HashSet::from(["r1".to_string()]);
        let mut state = PlanState::default();

        assert!(state.choose("r1"));
        state.refresh(&catalog, &relations, &recipe_ids);
        assert_eq!(state.count_of("p1"), 1);
        assert_eq!(state.count_of("p2"), 1);

        assert!(state.unchoose("r1"));
        state.refresh(&catalog, &relations, &recipe_ids);
        assert_eq!(state.count_of("p1"), 0);
        assert_eq!(state.count_of("p2"), 0);
    }

    #[test]
    fn test_double_choose_is_noop() {
        let catalog = vec![product("p1", "Eggs", None)];
        let relations = vec![relation("r1", "p1")];
        let recipe_ids = HashSet::from(["r1".to_string()]);
        let mut state = PlanState::default();

        assert!(state.choose("r1"));
        assert!(!state.choose("r1"));
        state.refresh(&catalog, &relations, &recipe_ids);
        assert_eq!(state.chosen_recipes, vec!["r1".to_string()]);
        assert_eq!(state.count_of("p1"), 1);

        assert!(state.unchoose("r1"));
        assert!(!state.unchoose("r1"));
    }

    #[test]
    fn test_set_count_survives_recompute() {
        let catalog = vec![product("p1", "Eggs", None), product("p2", "Milk", None)];
        let relations = vec![relation("r1", "p1"), relation("r2", "p1")];
        let recipe_ids = HashSet::from(["r1".to_string(), "r2".to_string()]);
        let mut state = PlanState::default();

        state.choose("r1");
        state.set_count("p1", 4, &relations);
        state.set_count("p2", 1, &relations);
        state.refresh(&catalog, &relations, &recipe_ids);
        assert_eq!(state.count_of("p1"), 4);
        assert_eq!(state.count_of("p2"), 1);

        // Adjustment is relative to the derived count
        state.choose("r2");
        state.refresh(&catalog, &relations, &recipe_ids);
        assert_eq!(state.count_of("p1"), 5);

        state.unchoose("r1");
        state.unchoose("r2");
        state.refresh(&catalog, &relations, &recipe_ids);
        assert_eq!(state.count_of("p1"), 3);
    }

    #[test]
    fn test_set_count_to_zero_below_derived() {
        let catalog = vec![product("p1", "Eggs", None)];
        let relations = vec![relation("r1", "p1")];
        let recipe_ids = HashSet::from(["r1".to_string()]);
        let mut state = PlanState::default();

        state.choose("r1");
        state.set_count("p1", 0, &relations);
        state.refresh(&catalog, &relations, &recipe_ids);
        assert_eq!(state.count_of("p1"), 0);

        state.unchoose("r1");
        state.refresh(&catalog, &relations, &recipe_ids);
        assert_eq!(state.count_of("p1"), 0);
    }

    #[test]
    fn test_refresh_drops_stale_references() {
        let catalog = vec![product("p1", "Eggs", None)];
        let mut state = PlanState {
            chosen_recipes: vec!["gone".to_string()],
            products: Vec::new(),
            count_adjustments: BTreeMap::from([("missing".to_string(), 2)]),
        };
        state.refresh(&catalog, &[], &HashSet::new());
        assert!(state.chosen_recipes.is_empty());
        assert!(state.count_adjustments.is_empty());
        assert_eq!(state.products.len(), 1);
    }

    #[test]
    fn test_plan_state_uses_persisted_key_names() {
        let json = serde_json::to_value(PlanState::default()).unwrap();
        assert!(json.get(CHOSEN_RECIPES_KEY).is_some());
        assert!(json.get(PRODUCTS_KEY).is_some());
        assert!(json.get(COUNT_ADJUSTMENTS_KEY).is_some());
    }

    #[test]
    fn test_grocery_list_example() {
        let dairy = section("s1", "Dairy");
        let products = vec![
            countable(product("p1", "Eggs", Some(dairy.clone())), 1),
            countable(product("p2", "Milk", Some(dairy)), 1),
        ];
        let list = generate_grocery_list(&products, date());
        assert_eq!(
            list.text,
            "# Groceries 2024-03-09\n\n## Dairy\n* [ ] Eggs (1)\n* [ ] Milk (1)\n"
        );
        assert!(list.unsectioned.is_empty());
    }

    #[test]
    fn test_grocery_list_sections_descending_by_id() {
        let a = section("a", "Produce");
        let b = section("b", "Bakery");
        let c = section("c", "Dairy");
        let products = vec![
            countable(product("p1", "Apples", Some(a)), 2),
            countable(product("p2", "Bread", Some(b)), 1),
            countable(product("p3", "Cheese", Some(c)), 3),
        ];
        let list = generate_grocery_list(&products, date());
        let headers: Vec<&str> = list
            .text
            .lines()
            .filter(|l| l.starts_with("## "))
            .collect();
        assert_eq!(headers, vec!["## Dairy", "## Bakery", "## Produce"]);
    }

    #[test]
    fn test_grocery_list_groups_items_under_their_section() {
        let produce = section("s1", "Produce");
        let dairy = section("s2", "Dairy");
        let products = vec![
            countable(product("p1", "Apples", Some(produce.clone())), 2),
            countable(product("p2", "Cheese", Some(dairy)), 1),
            countable(product("p3", "Pears", Some(produce)), 1),
        ];
        let list = generate_grocery_list(&products, date());
        assert_eq!(
            list.text,
            "# Groceries 2024-03-09\n\
             \n## Dairy\n* [ ] Cheese (1)\n\
             \n## Produce\n* [ ] Apples (2)\n* [ ] Pears (1)\n"
        );
    }

    #[test]
    fn test_grocery_list_is_idempotent() {
        let s = section("s1", "Pantry");
        let products = vec![
            countable(product("p1", "Rice", Some(s.clone())), 1),
            countable(product("p2", "Beans", Some(s)), 2),
        ];
        let first = generate_grocery_list(&products, date());
        let second = generate_grocery_list(&products, date());
        assert_eq!(first.text, second.text);
    }

    #[test]
    fn test_grocery_list_check_stock_and_zero_counts() {
        let s = section("s1", "Pantry");
        let mut salt = product("p1", "Salt", Some(s.clone()));
        salt.check_stock = true;
        let products = vec![
            countable(salt, 1),
            countable(product("p2", "Pepper", Some(s)), 0),
        ];
        let list = generate_grocery_list(&products, date());
        assert!(list.text.contains("* [ ] Salt (1) (check stock)\n"));
        assert!(!list.text.contains("Pepper"));
    }

    #[test]
    fn test_grocery_list_empty_is_heading_only() {
        let products = vec![countable(product("p1", "Eggs", None), 0)];
        let list = generate_grocery_list(&products, date());
        assert_eq!(list.text, "# Groceries 2024-03-09\n");
    }

    #[test]
    fn test_grocery_list_reports_unsectioned() {
        let s = section("s1", "Dairy");
        let products = vec![
            countable(product("p1", "Milk", Some(s)), 1),
            countable(product("p2", "Mystery", None), 2),
        ];
        let list = generate_grocery_list(&products, date());
        assert!(!list.text.contains("Mystery"));
        assert_eq!(list.unsectioned.len(), 1);
        assert_eq!(list.unsectioned[0].product.title, "Mystery");
    }
}
