use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Longest title accepted for sections, products, and recipes.
pub const MAX_TITLE_LEN: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: String,
    pub title: String,
    pub owner_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub title: String,
    pub section_id: Option<String>,
    pub check_stock: bool,
    /// `None` means the product is public.
    pub owner_id: Option<String>,
    // Joined for display and list grouping
    #[serde(default)]
    pub section: Option<Section>,
}

impl Product {
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.owner_id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    pub id: String,
    pub title: String,
    pub owner_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeRelation {
    pub recipe_id: String,
    pub product_id: String,
}

/// A recipe together with the products it references.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeDetail {
    #[serde(flatten)]
    pub recipe: Recipe,
    pub products: Vec<Product>,
}

// --- Procedure inputs ---

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub title: String,
    #[serde(default)]
    pub section_id: Option<String>,
    #[serde(default)]
    pub check_stock: bool,
    #[serde(default)]
    pub public_product: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProduct {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub section_id: Option<String>,
    #[serde(default)]
    pub check_stock: bool,
    #[serde(default)]
    pub public_product: bool,
}

/// Product creation by section title, used by batch creation and import.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProductByTitle {
    pub title: String,
    #[serde(default)]
    pub section_title: Option<String>,
    #[serde(default)]
    pub check_stock: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRecipe {
    pub title: String,
    #[serde(default)]
    pub product_ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRecipe {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub product_ids: Vec<String>,
}

/// Recipe creation by product titles, used by batch creation and import.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRecipeByTitles {
    pub title: String,
    #[serde(default)]
    pub product_titles: Vec<String>,
}

/// Result of a batch procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCount {
    pub count: i64,
}

// --- Planning ---

/// A product annotated with how many times the current plan asks for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountableProduct {
    #[serde(flatten)]
    pub product: Product,
    pub count: u32,
}

impl CountableProduct {
    #[must_use]
    pub fn new(product: Product) -> Self {
        Self { product, count: 0 }
    }
}

// --- Export / Import types ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportProduct {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub section_id: Option<String>,
    #[serde(default)]
    pub check_stock: bool,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub section: Option<ExportSection>,
}

impl From<Product> for ExportProduct {
    fn from(p: Product) -> Self {
        Self {
            id: p.id,
            title: p.title,
            section_id: p.section_id,
            check_stock: p.check_stock,
            owner_id: p.owner_id,
            section: p.section.map(|s| ExportSection {
                id: Some(s.id),
                title: s.title,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRecipe {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub owner_id: Option<String>,
}

impl From<Recipe> for ExportRecipe {
    fn from(r: Recipe) -> Self {
        Self {
            id: r.id,
            title: r.title,
            owner_id: Some(r.owner_id),
        }
    }
}

/// The downloadable snapshot. IDs inside are only meaningful within the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportData {
    #[serde(default)]
    pub recipes: Vec<ExportRecipe>,
    #[serde(default)]
    pub products: Vec<ExportProduct>,
    #[serde(default, rename = "recipeToProduct")]
    pub recipe_to_product: Vec<RecipeRelation>,
}

impl ExportData {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::validation(format!("Invalid snapshot: {e}")))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_field_names)]
pub struct ImportSummary {
    pub sections_created: i64,
    pub products_created: i64,
    pub recipes_created: i64,
    pub relations_created: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

// --- Validation ---

/// Trim a title and reject empty or oversized ones.
pub fn validate_title(kind: &str, title: &str) -> Result<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(Error::validation(format!("{kind} title must not be empty")));
    }
    if trimmed.chars().count() > MAX_TITLE_LEN {
        return Err(Error::validation(format!(
            "{kind} title must be at most {MAX_TITLE_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}

pub fn validate_id(kind: &str, id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(Error::validation(format!("{kind} id must not be empty")));
    }
    Ok(())
}

/// Validate a snapshot before any of it is written.
pub fn validate_export_data(data: &ExportData) -> Result<()> {
    for product in &data.products {
        validate_title("Product", &product.title)?;
        if let Some(section) = &product.section {
            validate_title("Section", &section.title)?;
        }
    }
    for recipe in &data.recipes {
        validate_title("Recipe", &recipe.title)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_title_trims() {
        assert_eq!(validate_title("Product", "  Eggs ").unwrap(), "Eggs");
    }

    #[test]
    fn test_validate_title_rejects_empty() {
        assert!(matches!(
            validate_title("Product", "   "),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_validate_title_rejects_long() {
        let long = "x".repeat(MAX_TITLE_LEN + 1);
        assert!(validate_title("Recipe", &long).is_err());
        let max = "x".repeat(MAX_TITLE_LEN);
        assert!(validate_title("Recipe", &max).is_ok());
    }

    #[test]
    fn test_snapshot_uses_camel_case_keys() {
        let data = ExportData {
            recipes: vec![ExportRecipe {
                id: "r1".to_string(),
                title: "Omelette".to_string(),
                owner_id: Some("u1".to_string()),
            }],
            products: vec![ExportProduct {
                id: "p1".to_string(),
                title: "Eggs".to_string(),
                section_id: Some("s1".to_string()),
                check_stock: true,
                owner_id: None,
                section: Some(ExportSection {
                    id: Some("s1".to_string()),
                    title: "Dairy".to_string(),
                }),
            }],
            recipe_to_product: vec![RecipeRelation {
                recipe_id: "r1".to_string(),
                product_id: "p1".to_string(),
            }],
        };
        let json = serde_json::to_value(&data).unwrap();
        assert!(json["recipeToProduct"].is_array());
        assert_eq!(json["recipeToProduct"][0]["recipeId"], "r1");
        assert_eq!(json["products"][0]["checkStock"], true);
        assert_eq!(json["products"][0]["sectionId"], "s1");
        assert_eq!(json["products"][0]["section"]["title"], "Dairy");
    }

    #[test]
    fn test_snapshot_accepts_minimal_section() {
        let json = r#"{
            "recipes": [],
            "products": [{"id": "p1", "title": "Apples", "section": {"title": "Produce"}}],
            "recipeToProduct": []
        }"#;
        let data = ExportData::from_json(json).unwrap();
        assert_eq!(data.products[0].section.as_ref().unwrap().title, "Produce");
        assert!(!data.products[0].check_stock);
    }

    #[test]
    fn test_snapshot_ignores_extra_fields() {
        let json = r#"{
            "recipes": [{"id": "r1", "title": "Soup", "userId": "abc", "createdAt": "x"}],
            "products": [],
            "recipeToProduct": [{"recipeId": "r1", "productId": "p1"}]
        }"#;
        let data = ExportData::from_json(json).unwrap();
        assert_eq!(data.recipes.len(), 1);
        assert_eq!(data.recipe_to_product.len(), 1);
    }

    #[test]
    fn test_malformed_snapshot_is_validation_error() {
        assert!(matches!(
            ExportData::from_json("{not json"),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_validate_export_data_rejects_blank_titles() {
        let data = ExportData {
            recipes: vec![ExportRecipe {
                id: "r1".to_string(),
                title: " ".to_string(),
                owner_id: None,
            }],
            ..ExportData::default()
        };
        assert!(validate_export_data(&data).is_err());
    }

    #[test]
    fn test_countable_product_flattens() {
        let cp = CountableProduct {
            product: Product {
                id: "p1".to_string(),
                title: "Milk".to_string(),
                section_id: None,
                check_stock: false,
                owner_id: None,
                section: None,
            },
            count: 2,
        };
        let json = serde_json::to_value(&cp).unwrap();
        assert_eq!(json["title"], "Milk");
        assert_eq!(json["count"], 2);
        let back: CountableProduct = serde_json::from_value(json).unwrap();
        assert_eq!(back, cp);
    }
}
