use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Path, Query, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;

use groceria_core::Error;
use groceria_core::models::{
    BatchCount, ExportData, ImportSummary, NewProduct, NewProductByTitle, NewRecipe,
    NewRecipeByTitles, Product, Recipe, RecipeDetail, RecipeRelation, Section, UpdateProduct,
    UpdateRecipe,
};
use groceria_core::plan::PlanState;
use groceria_core::service::GroceriaService;

const BODY_LIMIT: usize = 10 * 1024 * 1024; // 10 MB

#[derive(Clone)]
struct AppState {
    service: Arc<Mutex<GroceriaService>>,
    api_key: Option<String>,
}

impl AppState {
    fn service(&self) -> MutexGuard<'_, GroceriaService> {
        self.service
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct CreateSectionRequest {
    title: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateProductRequest {
    title: String,
    #[serde(default)]
    section_id: Option<String>,
    #[serde(default)]
    check_stock: bool,
    #[serde(default)]
    public_product: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRecipeRequest {
    title: String,
    #[serde(default)]
    product_ids: Vec<String>,
}

#[derive(Deserialize)]
struct SetCountRequest {
    count: u32,
}

#[derive(Deserialize)]
struct ListQuery {
    date: Option<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    BadRequest(String),
    Core(Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) | Self::Core(Error::Validation(msg)) => {
                (StatusCode::BAD_REQUEST, msg)
            }
            Self::Core(Error::NotFound(msg)) => (StatusCode::NOT_FOUND, msg),
            Self::Core(Error::Conflict(msg)) => (StatusCode::CONFLICT, msg),
            Self::Core(err) => {
                tracing::error!(error = %err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self::Core(err)
    }
}

/// First and last four characters of the key, or a placeholder when the key
/// is too short to abbreviate.
fn key_hint(key: &str) -> String {
    let head = key.get(..4);
    let tail = key.len().checked_sub(4).and_then(|start| key.get(start..));
    match (head, tail) {
        (Some(head), Some(tail)) if key.len() > 8 => format!("{head}...{tail}"),
        _ => "****".to_string(),
    }
}

// --- Middleware ---

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(ref expected_key) = state.api_key {
        let authorized = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected_key);

        if !authorized {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid or missing API key".to_string(),
                }),
            )
                .into_response();
        }
    }
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Product handlers ---

async fn list_products(State(state): State<AppState>) -> Result<Json<Vec<Product>>, ApiError> {
    Ok(Json(state.service().product_get_all()?))
}

async fn create_product(
    State(state): State<AppState>,
    Json(req): Json<NewProduct>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let product = state.service().product_create(&req)?;
    Ok((StatusCode::CREATED, Json(product)))
}

async fn create_products(
    State(state): State<AppState>,
    Json(req): Json<Vec<NewProductByTitle>>,
) -> Result<Json<BatchCount>, ApiError> {
    Ok(Json(state.service().product_create_many(&req)?))
}

async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateProductRequest>,
) -> Result<Json<Product>, ApiError> {
    let product = state.service().product_update(&UpdateProduct {
        id,
        title: req.title,
        section_id: req.section_id,
        check_stock: req.check_stock,
        public_product: req.public_product,
    })?;
    Ok(Json(product))
}

async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Product>, ApiError> {
    Ok(Json(state.service().product_delete(&id)?))
}

async fn delete_products(State(state): State<AppState>) -> Result<Json<BatchCount>, ApiError> {
    Ok(Json(state.service().product_delete_many()?))
}

// --- Section handlers ---

async fn list_sections(State(state): State<AppState>) -> Result<Json<Vec<Section>>, ApiError> {
    Ok(Json(state.service().section_get_all()?))
}

async fn create_section(
    State(state): State<AppState>,
    Json(req): Json<CreateSectionRequest>,
) -> Result<Json<Section>, ApiError> {
    Ok(Json(state.service().section_create(&req.title)?))
}

async fn create_sections(
    State(state): State<AppState>,
    Json(req): Json<Vec<String>>,
) -> Result<Json<BatchCount>, ApiError> {
    Ok(Json(state.service().section_create_many(&req)?))
}

// --- Recipe handlers ---

async fn list_recipes(State(state): State<AppState>) -> Result<Json<Vec<Recipe>>, ApiError> {
    Ok(Json(state.service().recipe_get_all()?))
}

async fn create_recipe(
    State(state): State<AppState>,
    Json(req): Json<NewRecipe>,
) -> Result<(StatusCode, Json<Recipe>), ApiError> {
    let recipe = state.service().recipe_create(&req)?;
    Ok((StatusCode::CREATED, Json(recipe)))
}

async fn create_recipes(
    State(state): State<AppState>,
    Json(req): Json<Vec<NewRecipeByTitles>>,
) -> Result<Json<BatchCount>, ApiError> {
    Ok(Json(state.service().recipe_create_many(&req)?))
}

async fn get_recipe(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RecipeDetail>, ApiError> {
    Ok(Json(state.service().recipe_get(&id)?))
}

async fn update_recipe(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateRecipeRequest>,
) -> Result<Json<Recipe>, ApiError> {
    let recipe = state.service().recipe_update(&UpdateRecipe {
        id,
        title: req.title,
        product_ids: req.product_ids,
    })?;
    Ok(Json(recipe))
}

async fn delete_recipe(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Recipe>, ApiError> {
    Ok(Json(state.service().recipe_delete(&id)?))
}

async fn list_relations(
    State(state): State<AppState>,
) -> Result<Json<Vec<RecipeRelation>>, ApiError> {
    Ok(Json(state.service().recipe_relations_get_all()?))
}

// --- Export / Import handlers ---

async fn export_data(State(state): State<AppState>) -> Result<Json<ExportData>, ApiError> {
    Ok(Json(state.service().export_snapshot()?))
}

// Raw body so a malformed snapshot surfaces as a validation error
async fn import_data(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<ImportSummary>, ApiError> {
    Ok(Json(state.service().import_json(&body)?))
}

// --- Plan handlers ---

async fn get_plan(State(state): State<AppState>) -> Result<Json<PlanState>, ApiError> {
    Ok(Json(state.service().plan_load()?))
}

async fn clear_plan(State(state): State<AppState>) -> Result<Json<PlanState>, ApiError> {
    Ok(Json(state.service().plan_clear()?))
}

async fn choose_recipe(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PlanState>, ApiError> {
    Ok(Json(state.service().plan_choose_recipe(&id)?))
}

async fn unchoose_recipe(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PlanState>, ApiError> {
    Ok(Json(state.service().plan_unchoose_recipe(&id)?))
}

async fn set_product_count(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SetCountRequest>,
) -> Result<Json<PlanState>, ApiError> {
    Ok(Json(state.service().plan_set_count(&id, req.count)?))
}

async fn grocery_list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Response, ApiError> {
    let date = match query.date.as_deref() {
        None => Local::now().date_naive(),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|_| ApiError::BadRequest(format!("Invalid date '{s}'. Use YYYY-MM-DD")))?,
    };
    let list = state.service().plan_grocery_list(date)?;
    Ok((
        [(header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
        list.text,
    )
        .into_response())
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/products",
            get(list_products)
                .post(create_product)
                .delete(delete_products),
        )
        .route("/api/products/batch", post(create_products))
        .route(
            "/api/products/{id}",
            put(update_product).delete(delete_product),
        )
        .route("/api/sections", get(list_sections).post(create_section))
        .route("/api/sections/batch", post(create_sections))
        .route("/api/recipes", get(list_recipes).post(create_recipe))
        .route("/api/recipes/batch", post(create_recipes))
        .route(
            "/api/recipes/{id}",
            get(get_recipe).put(update_recipe).delete(delete_recipe),
        )
        .route("/api/recipe-relations", get(list_relations))
        .route("/api/export", get(export_data))
        .route("/api/import", post(import_data))
        .route("/api/plan", get(get_plan).delete(clear_plan))
        .route(
            "/api/plan/recipes/{id}",
            post(choose_recipe).delete(unchoose_recipe),
        )
        .route("/api/plan/products/{id}", put(set_product_count))
        .route("/api/plan/list", get(grocery_list))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(
    service: GroceriaService,
    port: u16,
    bind: &str,
    api_key: Option<String>,
) -> anyhow::Result<()> {
    let owner = service.owner().to_string();
    let state = AppState {
        service: Arc::new(Mutex::new(service)),
        api_key: api_key.clone(),
    };

    let app = build_router(state);

    if let Some(ref key) = api_key {
        tracing::info!(
            "API key: {} (see api_key file in data directory)",
            key_hint(key)
        );
    } else {
        tracing::warn!("Authentication disabled (--no-auth). API is open to anyone.");
    }

    if bind != "127.0.0.1" && bind != "localhost" && api_key.is_none() {
        tracing::warn!(
            "Listening on {bind} with no authentication. Any device on your network can access this API."
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}")).await?;
    tracing::info!(%owner, "Listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}
