use std::collections::HashSet;
use std::path::Path;

use chrono::NaiveDate;

use crate::db::Database;
use crate::error::{Error, Result};
use crate::exchange;
use crate::models::{
    BatchCount, ExportData, ImportSummary, NewProduct, NewProductByTitle, NewRecipe,
    NewRecipeByTitles, Product, Recipe, RecipeDetail, RecipeRelation, Section, UpdateProduct,
    UpdateRecipe, validate_id, validate_title,
};
use crate::plan::{
    self, CHOSEN_RECIPES_KEY, COUNT_ADJUSTMENTS_KEY, GroceryList, PRODUCTS_KEY, PlanState,
};

/// The procedure surface, bound to the owner every call acts for.
pub struct GroceriaService {
    db: Database,
    owner: String,
}

impl GroceriaService {
    pub fn open(db_path: &Path, owner: &str) -> Result<Self> {
        Self::with_database(Database::open(db_path)?, owner)
    }

    pub fn open_in_memory(owner: &str) -> Result<Self> {
        Self::with_database(Database::open_in_memory()?, owner)
    }

    fn with_database(db: Database, owner: &str) -> Result<Self> {
        validate_id("User", owner)?;
        db.ensure_user(owner)?;
        Ok(Self {
            db,
            owner: owner.to_string(),
        })
    }

    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Act as a different owner on the same store.
    pub fn switch_owner(&mut self, owner: &str) -> Result<()> {
        validate_id("User", owner)?;
        self.db.ensure_user(owner)?;
        self.owner = owner.to_string();
        Ok(())
    }

    fn check_section(&self, section_id: Option<&str>) -> Result<()> {
        if let Some(id) = section_id {
            self.db.get_section(&self.owner, id)?;
        }
        Ok(())
    }

    /// Keep the first occurrence of each ID and make sure the owner can see it.
    fn check_products(&self, product_ids: &[String]) -> Result<Vec<String>> {
        let mut seen = HashSet::new();
        let mut ids = Vec::with_capacity(product_ids.len());
        for id in product_ids {
            if seen.insert(id.as_str()) {
                self.db.get_product(&self.owner, id)?;
                ids.push(id.clone());
            }
        }
        Ok(ids)
    }

    // --- Products ---

    pub fn product_get_all(&self) -> Result<Vec<Product>> {
        self.db.list_products(&self.owner)
    }

    pub fn product_get(&self, id: &str) -> Result<Product> {
        self.db.get_product(&self.owner, id)
    }

    pub fn product_create(&self, input: &NewProduct) -> Result<Product> {
        let title = validate_title("Product", &input.title)?;
        let owner = (!input.public_product).then_some(self.owner.as_str());
        if self.db.product_title_exists(owner, &title, None)? {
            return Err(Error::conflict(format!("Product \"{title}\" already exists")));
        }
        self.check_section(input.section_id.as_deref())?;
        let id = self.db.insert_product(
            owner,
            &title,
            input.section_id.as_deref(),
            input.check_stock,
        )?;
        self.db.get_product(&self.owner, &id)
    }

    pub fn product_create_many(&self, items: &[NewProductByTitle]) -> Result<BatchCount> {
        let outcome = self.db.transaction(|| {
            let owned = self.db.owned_product_titles(&self.owner)?;
            exchange::create_products_by_title(&self.db, &self.owner, items, owned)
        })?;
        Ok(BatchCount {
            count: outcome.created,
        })
    }

    /// Owned and public products can be updated. Setting `public_product`
    /// releases the product to everyone; clearing it takes ownership.
    pub fn product_update(&self, input: &UpdateProduct) -> Result<Product> {
        let existing = self.db.get_product(&self.owner, &input.id)?;
        let title = validate_title("Product", &input.title)?;
        let owner = (!input.public_product).then_some(self.owner.as_str());
        if self
            .db
            .product_title_exists(owner, &title, Some(&existing.id))?
        {
            return Err(Error::conflict(format!("Product \"{title}\" already exists")));
        }
        self.check_section(input.section_id.as_deref())?;
        self.db.update_product(
            &existing.id,
            owner,
            &title,
            input.section_id.as_deref(),
            input.check_stock,
        )?;
        self.db.get_product(&self.owner, &existing.id)
    }

    pub fn product_delete(&self, id: &str) -> Result<Product> {
        let product = self.db.get_product(&self.owner, id)?;
        self.db.transaction(|| self.db.delete_product(&product.id))?;
        Ok(product)
    }

    /// Delete every product the owner owns. Public products stay.
    pub fn product_delete_many(&self) -> Result<BatchCount> {
        let count = self
            .db
            .transaction(|| self.db.delete_owned_products(&self.owner))?;
        Ok(BatchCount { count })
    }

    // --- Sections ---

    pub fn section_get_all(&self) -> Result<Vec<Section>> {
        self.db.list_sections(&self.owner)
    }

    /// Returns the existing section when the title is already taken.
    pub fn section_create(&self, title: &str) -> Result<Section> {
        let title = validate_title("Section", title)?;
        let (section, _) = self.db.get_or_create_section(&self.owner, &title)?;
        Ok(section)
    }

    pub fn section_create_many(&self, titles: &[String]) -> Result<BatchCount> {
        let count = self.db.transaction(|| {
            let mut count = 0;
            for title in titles {
                let title = validate_title("Section", title)?;
                let (_, created) = self.db.get_or_create_section(&self.owner, &title)?;
                if created {
                    count += 1;
                }
            }
            Ok(count)
        })?;
        Ok(BatchCount { count })
    }

    // --- Recipes ---

    pub fn recipe_get_all(&self) -> Result<Vec<Recipe>> {
        self.db.list_recipes(&self.owner)
    }

    pub fn recipe_get(&self, id: &str) -> Result<RecipeDetail> {
        let recipe = self.db.get_recipe(&self.owner, id)?;
        let products = self.db.recipe_products(&recipe.id)?;
        Ok(RecipeDetail { recipe, products })
    }

    pub fn recipe_find(&self, title: &str) -> Result<Option<Recipe>> {
        self.db.find_recipe_by_title(&self.owner, title.trim())
    }

    pub fn recipe_create(&self, input: &NewRecipe) -> Result<Recipe> {
        let title = validate_title("Recipe", &input.title)?;
        if self.db.find_recipe_by_title(&self.owner, &title)?.is_some() {
            return Err(Error::conflict(format!("Recipe \"{title}\" already exists")));
        }
        let product_ids = self.check_products(&input.product_ids)?;
        self.db.transaction(|| {
            let recipe = self.db.insert_recipe(&self.owner, &title)?;
            self.db.insert_relations(&recipe.id, &product_ids)?;
            Ok(recipe)
        })
    }

    pub fn recipe_create_many(&self, items: &[NewRecipeByTitles]) -> Result<BatchCount> {
        let outcome = self
            .db
            .transaction(|| exchange::create_recipes_by_titles(&self.db, &self.owner, items))?;
        Ok(BatchCount {
            count: outcome.created,
        })
    }

    /// Rename the recipe and replace all of its relations.
    pub fn recipe_update(&self, input: &UpdateRecipe) -> Result<Recipe> {
        let existing = self.db.get_recipe(&self.owner, &input.id)?;
        let title = validate_title("Recipe", &input.title)?;
        if self
            .db
            .find_recipe_by_title(&self.owner, &title)?
            .is_some_and(|other| other.id != existing.id)
        {
            return Err(Error::conflict(format!("Recipe \"{title}\" already exists")));
        }
        let product_ids = self.check_products(&input.product_ids)?;
        self.db.transaction(|| {
            self.db.rename_recipe(&existing.id, &title)?;
            self.db.replace_relations(&existing.id, &product_ids)?;
            Ok(())
        })?;
        self.db.get_recipe(&self.owner, &existing.id)
    }

    pub fn recipe_delete(&self, id: &str) -> Result<Recipe> {
        let recipe = self.db.get_recipe(&self.owner, id)?;
        self.db.transaction(|| self.db.delete_recipe(&recipe.id))?;
        Ok(recipe)
    }

    pub fn recipe_relations_get_all(&self) -> Result<Vec<RecipeRelation>> {
        self.db.list_relations(&self.owner)
    }

    // --- Export / Import ---

    pub fn export_snapshot(&self) -> Result<ExportData> {
        exchange::export_snapshot(&self.db, &self.owner)
    }

    pub fn import_snapshot(&self, data: &ExportData) -> Result<ImportSummary> {
        exchange::import_snapshot(&self.db, &self.owner, data)
    }

    pub fn import_json(&self, json: &str) -> Result<ImportSummary> {
        let data = ExportData::from_json(json)?;
        self.import_snapshot(&data)
    }

    // --- Plan session ---

    fn read_state<T: serde::de::DeserializeOwned + Default>(&self, key: &str) -> Result<T> {
        match self.db.get_state(&self.owner, key)? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(T::default()),
        }
    }

    fn save_plan(&self, state: &PlanState) -> Result<()> {
        self.db.transaction(|| {
            self.db.set_state(
                &self.owner,
                CHOSEN_RECIPES_KEY,
                &serde_json::to_string(&state.chosen_recipes)?,
            )?;
            self.db.set_state(
                &self.owner,
                PRODUCTS_KEY,
                &serde_json::to_string(&state.products)?,
            )?;
            self.db.set_state(
                &self.owner,
                COUNT_ADJUSTMENTS_KEY,
                &serde_json::to_string(&state.count_adjustments)?,
            )?;
            Ok(())
        })
    }

    /// Recompute counts against the current catalog before handing the
    /// state out, so edits to recipes or products are always reflected.
    fn refreshed(&self, mut state: PlanState) -> Result<PlanState> {
        let products = self.db.list_products(&self.owner)?;
        let relations = self.db.list_relations(&self.owner)?;
        let recipe_ids: HashSet<String> = self
            .db
            .list_recipes(&self.owner)?
            .into_iter()
            .map(|r| r.id)
            .collect();
        state.refresh(&products, &relations, &recipe_ids);
        Ok(state)
    }

    pub fn plan_load(&self) -> Result<PlanState> {
        let state = PlanState {
            chosen_recipes: self.read_state(CHOSEN_RECIPES_KEY)?,
            products: self.read_state(PRODUCTS_KEY)?,
            count_adjustments: self.read_state(COUNT_ADJUSTMENTS_KEY)?,
        };
        self.refreshed(state)
    }

    pub fn plan_choose_recipe(&self, recipe_id: &str) -> Result<PlanState> {
        self.db.get_recipe(&self.owner, recipe_id)?;
        let mut state = self.plan_load()?;
        if state.choose(recipe_id) {
            state = self.refreshed(state)?;
            self.save_plan(&state)?;
        }
        Ok(state)
    }

    pub fn plan_unchoose_recipe(&self, recipe_id: &str) -> Result<PlanState> {
        let mut state = self.plan_load()?;
        if state.unchoose(recipe_id) {
            state = self.refreshed(state)?;
            self.save_plan(&state)?;
        }
        Ok(state)
    }

    pub fn plan_set_count(&self, product_id: &str, count: u32) -> Result<PlanState> {
        self.db.get_product(&self.owner, product_id)?;
        let mut state = self.plan_load()?;
        let relations = self.db.list_relations(&self.owner)?;
        state.set_count(product_id, count, &relations);
        let state = self.refreshed(state)?;
        self.save_plan(&state)?;
        Ok(state)
    }

    pub fn plan_clear(&self) -> Result<PlanState> {
        self.db.transaction(|| {
            for key in [CHOSEN_RECIPES_KEY, PRODUCTS_KEY, COUNT_ADJUSTMENTS_KEY] {
                self.db.delete_state(&self.owner, key)?;
            }
            Ok(())
        })?;
        self.refreshed(PlanState::default())
    }

    pub fn plan_grocery_list(&self, date: NaiveDate) -> Result<GroceryList> {
        let state = self.plan_load()?;
        Ok(plan::generate_grocery_list(&state.products, date))
    }
}
