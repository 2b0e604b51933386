//! axum JSON API over the catalog store.
//!
//! Exposes the article/cross query and update endpoints; authentication and
//! session handling live outside this crate, at the deployment boundary in
//! front of the router.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{error, info};

use artcross_core::{ArticleCross, ProductPatch, ProductRecord};
use artcross_storage::{CatalogStore, StoreError};

pub const CRATE_NAME: &str = "artcross-web";

#[derive(Clone)]
pub struct AppState {
    pub store: CatalogStore,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
}

/// Create payload; everything but article and brand defaults to empty.
#[derive(Debug, Deserialize)]
pub struct NewArticle {
    pub article: String,
    pub brand: String,
    #[serde(default)]
    pub trading_numbers: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub additional_name: String,
    #[serde(default)]
    pub product_status: String,
    #[serde(default)]
    pub specifications: String,
}

/// Update payload; absent fields are left untouched.
#[derive(Debug, Deserialize)]
pub struct UpdateArticle {
    pub article: String,
    pub brand: Option<String>,
    pub trading_numbers: Option<String>,
    pub description: Option<String>,
    pub additional_name: Option<String>,
    pub product_status: Option<String>,
    pub specifications: Option<String>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/articles", get(list_articles).post(create_article))
        .route("/api/articles/update", post(update_article))
        .with_state(Arc::new(state))
}

pub async fn serve(store: CatalogStore, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "serving catalog API");
    axum::serve(listener, app(AppState { store })).await?;
    Ok(())
}

async fn list_articles(State(state): State<Arc<AppState>>) -> Response {
    match state.store.list_article_crosses().await {
        Ok(rows) => Json(rows).into_response(),
        Err(err) => server_error(err),
    }
}

async fn create_article(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewArticle>,
) -> Response {
    let record = ProductRecord {
        article: body.article,
        brand: body.brand,
        trading_numbers: body.trading_numbers,
        description: body.description,
        additional_name: body.additional_name,
        product_status: body.product_status,
        specifications: body.specifications,
        product_group_id: None,
    };

    match state.store.create_product(&record).await {
        Ok(product) => (
            StatusCode::CREATED,
            Json(ArticleCross {
                article: product.article,
                brand: product.brand,
                trading_numbers: product.trading_numbers,
            }),
        )
            .into_response(),
        Err(StoreError::DuplicateArticle(article)) => (
            StatusCode::CONFLICT,
            Json(ErrorBody {
                detail: format!("article '{article}' already exists"),
            }),
        )
            .into_response(),
        Err(err) => server_error(err),
    }
}

async fn update_article(
    State(state): State<Arc<AppState>>,
    Json(body): Json<UpdateArticle>,
) -> Response {
    let patch = ProductPatch {
        article: body.article,
        brand: body.brand,
        trading_numbers: body.trading_numbers,
        description: body.description,
        additional_name: body.additional_name,
        product_status: body.product_status,
        specifications: body.specifications,
    };

    match state.store.update_product_fields(&patch).await {
        Ok(product) => Json(ArticleCross {
            article: product.article,
            brand: product.brand,
            trading_numbers: product.trading_numbers,
        })
        .into_response(),
        Err(StoreError::ArticleNotFound(article)) => (
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                detail: format!("article '{article}' not found"),
            }),
        )
            .into_response(),
        Err(err) => server_error(err),
    }
}

fn server_error(err: StoreError) -> Response {
    error!("storage failure: {err}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            detail: "internal server error".into(),
        }),
    )
        .into_response()
}
