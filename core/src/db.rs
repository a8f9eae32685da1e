use std::collections::HashSet;
use std::path::Path;

use chrono::Local;
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Product, Recipe, RecipeRelation, Section};

const PRODUCT_COLUMNS: &str = "p.id, p.title, p.section_id, p.check_stock, p.owner_id,
     s.id, s.title, s.owner_id";

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Database { conn };
        db.migrate()?;
        tracing::debug!(path = %path.display(), "opened database");
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS users (
                    id TEXT PRIMARY KEY NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS sections (
                    id TEXT PRIMARY KEY NOT NULL,
                    title TEXT NOT NULL,
                    owner_id TEXT NOT NULL REFERENCES users(id),
                    created_at TEXT NOT NULL,
                    UNIQUE (owner_id, title)
                );

                CREATE TABLE IF NOT EXISTS products (
                    id TEXT PRIMARY KEY NOT NULL,
                    title TEXT NOT NULL,
                    section_id TEXT REFERENCES sections(id) ON DELETE SET NULL,
                    check_stock INTEGER NOT NULL DEFAULT 0,
                    owner_id TEXT REFERENCES users(id),
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS recipes (
                    id TEXT PRIMARY KEY NOT NULL,
                    title TEXT NOT NULL,
                    owner_id TEXT NOT NULL REFERENCES users(id),
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    UNIQUE (owner_id, title)
                );

                CREATE TABLE IF NOT EXISTS recipe_relations (
                    recipe_id TEXT NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
                    product_id TEXT NOT NULL REFERENCES products(id) ON DELETE CASCADE,
                    PRIMARY KEY (recipe_id, product_id)
                );

                CREATE TABLE IF NOT EXISTS local_state (
                    owner_id TEXT NOT NULL,
                    key TEXT NOT NULL,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (owner_id, key)
                );

                CREATE INDEX IF NOT EXISTS idx_products_owner ON products(owner_id);
                CREATE INDEX IF NOT EXISTS idx_products_title ON products(title);
                CREATE INDEX IF NOT EXISTS idx_recipes_owner ON recipes(owner_id);
                CREATE INDEX IF NOT EXISTS idx_relations_product ON recipe_relations(product_id);

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    /// Run `f` inside a transaction. Rolled back if `f` fails.
    pub fn transaction<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let tx = self.conn.unchecked_transaction()?;
        let value = f()?;
        tx.commit()?;
        Ok(value)
    }

    // --- Row mapping helpers ---

    // Expects PRODUCT_COLUMNS:
    // 0: p.id, 1: p.title, 2: p.section_id, 3: p.check_stock, 4: p.owner_id,
    // 5: s.id, 6: s.title, 7: s.owner_id
    fn product_from_row(row: &rusqlite::Row) -> rusqlite::Result<Product> {
        let section_id: Option<String> = row.get(5)?;
        let section = match section_id {
            Some(id) => Some(Section {
                id,
                title: row.get(6)?,
                owner_id: row.get(7)?,
            }),
            None => None,
        };
        Ok(Product {
            id: row.get(0)?,
            title: row.get(1)?,
            section_id: row.get(2)?,
            check_stock: row.get(3)?,
            owner_id: row.get(4)?,
            section,
        })
    }

    fn section_from_row(row: &rusqlite::Row) -> rusqlite::Result<Section> {
        Ok(Section {
            id: row.get(0)?,
            title: row.get(1)?,
            owner_id: row.get(2)?,
        })
    }

    fn recipe_from_row(row: &rusqlite::Row) -> rusqlite::Result<Recipe> {
        Ok(Recipe {
            id: row.get(0)?,
            title: row.get(1)?,
            owner_id: row.get(2)?,
        })
    }

    // --- Users ---

    pub fn ensure_user(&self, owner: &str) -> Result<()> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT OR IGNORE INTO users (id, created_at) VALUES (?1, ?2)",
            params![owner, now],
        )?;
        Ok(())
    }

    // --- Sections ---

    pub fn list_sections(&self, owner: &str) -> Result<Vec<Section>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, owner_id FROM sections WHERE owner_id = ?1 ORDER BY title",
        )?;
        let sections = stmt
            .query_map(params![owner], Self::section_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sections)
    }

    pub fn get_section(&self, owner: &str, id: &str) -> Result<Section> {
        self.conn
            .query_row(
                "SELECT id, title, owner_id FROM sections WHERE id = ?1 AND owner_id = ?2",
                params![id, owner],
                Self::section_from_row,
            )
            .optional()?
            .ok_or_else(|| Error::not_found(format!("Section {id} not found")))
    }

    pub fn find_section_by_title(&self, owner: &str, title: &str) -> Result<Option<Section>> {
        let section = self
            .conn
            .query_row(
                "SELECT id, title, owner_id FROM sections WHERE owner_id = ?1 AND title = ?2",
                params![owner, title],
                Self::section_from_row,
            )
            .optional()?;
        Ok(section)
    }

    pub fn insert_section(&self, owner: &str, title: &str) -> Result<Section> {
        let id = Uuid::new_v4().to_string();
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO sections (id, title, owner_id, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, title, owner, now],
        )?;
        tracing::debug!(%id, %title, "inserted section");
        Ok(Section {
            id,
            title: title.to_string(),
            owner_id: owner.to_string(),
        })
    }

    /// Return the owner's section with this title, creating it if missing.
    pub fn get_or_create_section(&self, owner: &str, title: &str) -> Result<(Section, bool)> {
        if let Some(existing) = self.find_section_by_title(owner, title)? {
            return Ok((existing, false));
        }
        Ok((self.insert_section(owner, title)?, true))
    }

    // --- Products ---

    /// The owner's products plus every public product, ordered by title.
    pub fn list_products(&self, owner: &str) -> Result<Vec<Product>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PRODUCT_COLUMNS}
             FROM products p
             LEFT JOIN sections s ON p.section_id = s.id
             WHERE p.owner_id = ?1 OR p.owner_id IS NULL
             ORDER BY p.title, p.id"
        ))?;
        let products = stmt
            .query_map(params![owner], Self::product_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(products)
    }

    /// A product the owner can see: their own or a public one.
    pub fn get_product(&self, owner: &str, id: &str) -> Result<Product> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {PRODUCT_COLUMNS}
                     FROM products p
                     LEFT JOIN sections s ON p.section_id = s.id
                     WHERE p.id = ?1 AND (p.owner_id = ?2 OR p.owner_id IS NULL)"
                ),
                params![id, owner],
                Self::product_from_row,
            )
            .optional()?
            .ok_or_else(|| Error::not_found(format!("Product {id} not found")))
    }

    /// Whether a product with this title exists in the given scope.
    /// `owner = None` checks public products. `exclude_id` skips the row being edited.
    pub fn product_title_exists(
        &self,
        owner: Option<&str>,
        title: &str,
        exclude_id: Option<&str>,
    ) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM products
             WHERE title = ?1 AND owner_id IS ?2 AND (?3 IS NULL OR id != ?3)",
            params![title, owner, exclude_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Titles of the products owned by `owner` (public ones excluded).
    pub fn owned_product_titles(&self, owner: &str) -> Result<HashSet<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT title FROM products WHERE owner_id = ?1")?;
        let titles = stmt
            .query_map(params![owner], |row| row.get(0))?
            .collect::<std::result::Result<HashSet<String>, _>>()?;
        Ok(titles)
    }

    pub fn insert_product(
        &self,
        owner: Option<&str>,
        title: &str,
        section_id: Option<&str>,
        check_stock: bool,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO products (id, title, section_id, check_stock, owner_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![id, title, section_id, check_stock, owner, now, now],
        )?;
        tracing::debug!(%id, %title, "inserted product");
        Ok(id)
    }

    pub fn update_product(
        &self,
        id: &str,
        owner: Option<&str>,
        title: &str,
        section_id: Option<&str>,
        check_stock: bool,
    ) -> Result<()> {
        let now = Local::now().to_rfc3339();
        let rows = self.conn.execute(
            "UPDATE products SET title = ?1, section_id = ?2, check_stock = ?3, owner_id = ?4,
             updated_at = ?5 WHERE id = ?6",
            params![title, section_id, check_stock, owner, now, id],
        )?;
        if rows == 0 {
            return Err(Error::not_found(format!("Product {id} not found")));
        }
        tracing::debug!(%id, "updated product");
        Ok(())
    }

    pub fn delete_product(&self, id: &str) -> Result<bool> {
        // Relations first so none point at a missing product
        self.conn.execute(
            "DELETE FROM recipe_relations WHERE product_id = ?1",
            params![id],
        )?;
        let rows = self
            .conn
            .execute("DELETE FROM products WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    /// Delete every product owned by `owner`. Public products are untouched.
    #[allow(clippy::cast_possible_wrap)]
    pub fn delete_owned_products(&self, owner: &str) -> Result<i64> {
        self.conn.execute(
            "DELETE FROM recipe_relations WHERE product_id IN (
                SELECT id FROM products WHERE owner_id = ?1
            )",
            params![owner],
        )?;
        let rows = self
            .conn
            .execute("DELETE FROM products WHERE owner_id = ?1", params![owner])?;
        Ok(rows as i64)
    }

    // --- Recipes ---

    pub fn list_recipes(&self, owner: &str) -> Result<Vec<Recipe>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, owner_id FROM recipes WHERE owner_id = ?1 ORDER BY title",
        )?;
        let recipes = stmt
            .query_map(params![owner], Self::recipe_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(recipes)
    }

    pub fn get_recipe(&self, owner: &str, id: &str) -> Result<Recipe> {
        self.conn
            .query_row(
                "SELECT id, title, owner_id FROM recipes WHERE id = ?1 AND owner_id = ?2",
                params![id, owner],
                Self::recipe_from_row,
            )
            .optional()?
            .ok_or_else(|| Error::not_found(format!("Recipe {id} not found")))
    }

    pub fn find_recipe_by_title(&self, owner: &str, title: &str) -> Result<Option<Recipe>> {
        let recipe = self
            .conn
            .query_row(
                "SELECT id, title, owner_id FROM recipes WHERE owner_id = ?1 AND title = ?2",
                params![owner, title],
                Self::recipe_from_row,
            )
            .optional()?;
        Ok(recipe)
    }

    pub fn insert_recipe(&self, owner: &str, title: &str) -> Result<Recipe> {
        let id = Uuid::new_v4().to_string();
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO recipes (id, title, owner_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, title, owner, now, now],
        )?;
        tracing::debug!(%id, %title, "inserted recipe");
        Ok(Recipe {
            id,
            title: title.to_string(),
            owner_id: owner.to_string(),
        })
    }

    pub fn rename_recipe(&self, id: &str, title: &str) -> Result<()> {
        let now = Local::now().to_rfc3339();
        let rows = self.conn.execute(
            "UPDATE recipes SET title = ?1, updated_at = ?2 WHERE id = ?3",
            params![title, now, id],
        )?;
        if rows == 0 {
            return Err(Error::not_found(format!("Recipe {id} not found")));
        }
        Ok(())
    }

    pub fn delete_recipe(&self, id: &str) -> Result<bool> {
        // Delete relations first (CASCADE should handle this, but be explicit)
        self.conn.execute(
            "DELETE FROM recipe_relations WHERE recipe_id = ?1",
            params![id],
        )?;
        let rows = self
            .conn
            .execute("DELETE FROM recipes WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // --- Recipe relations ---

    /// Insert one relation per product ID. Pairs that already exist are skipped.
    #[allow(clippy::cast_possible_wrap)]
    pub fn insert_relations(&self, recipe_id: &str, product_ids: &[String]) -> Result<i64> {
        let mut stmt = self.conn.prepare(
            "INSERT OR IGNORE INTO recipe_relations (recipe_id, product_id) VALUES (?1, ?2)",
        )?;
        let mut inserted: i64 = 0;
        for product_id in product_ids {
            inserted += stmt.execute(params![recipe_id, product_id])? as i64;
        }
        Ok(inserted)
    }

    pub fn replace_relations(&self, recipe_id: &str, product_ids: &[String]) -> Result<i64> {
        self.conn.execute(
            "DELETE FROM recipe_relations WHERE recipe_id = ?1",
            params![recipe_id],
        )?;
        self.insert_relations(recipe_id, product_ids)
    }

    /// Relations whose recipe belongs to `owner`.
    pub fn list_relations(&self, owner: &str) -> Result<Vec<RecipeRelation>> {
        let mut stmt = self.conn.prepare(
            "SELECT rr.recipe_id, rr.product_id
             FROM recipe_relations rr
             JOIN recipes r ON rr.recipe_id = r.id
             WHERE r.owner_id = ?1
             ORDER BY rr.recipe_id, rr.product_id",
        )?;
        let relations = stmt
            .query_map(params![owner], |row| {
                Ok(RecipeRelation {
                    recipe_id: row.get(0)?,
                    product_id: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(relations)
    }

    pub fn recipe_products(&self, recipe_id: &str) -> Result<Vec<Product>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PRODUCT_COLUMNS}
             FROM recipe_relations rr
             JOIN products p ON rr.product_id = p.id
             LEFT JOIN sections s ON p.section_id = s.id
             WHERE rr.recipe_id = ?1
             ORDER BY p.title, p.id"
        ))?;
        let products = stmt
            .query_map(params![recipe_id], Self::product_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(products)
    }

    // --- Local state (per-owner key/value) ---

    pub fn set_state(&self, owner: &str, key: &str, value: &str) -> Result<()> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO local_state (owner_id, key, value, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(owner_id, key) DO UPDATE SET value = ?3, updated_at = ?4",
            params![owner, key, value, now],
        )?;
        Ok(())
    }

    pub fn get_state(&self, owner: &str, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM local_state WHERE owner_id = ?1 AND key = ?2",
                params![owner, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn delete_state(&self, owner: &str, key: &str) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM local_state WHERE owner_id = ?1 AND key = ?2",
            params![owner, key],
        )?;
        Ok(rows > 0)
    }
}
