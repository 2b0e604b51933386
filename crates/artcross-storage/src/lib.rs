//! SQLite-backed store for the product catalog.
//!
//! Group/product mutations used by the import path take a bare connection so
//! the reconciler can scope them inside one per-row transaction; the
//! pool-level methods on [`CatalogStore`] serve the query/update API.

use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool, Transaction};
use thiserror::Error;
use tracing::debug;

use artcross_core::{ArticleCross, Product, ProductGroup, ProductPatch, ProductRecord};

pub const CRATE_NAME: &str = "artcross-storage";

// Group names are deliberately NOT unique at the schema level; the importer
// only relies on its own get-or-create calls being consistent within a run.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS product_groups (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    name      TEXT NOT NULL,
    parent_id INTEGER NULL REFERENCES product_groups(id)
);

CREATE TABLE IF NOT EXISTS products (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    article          TEXT NOT NULL UNIQUE,
    brand            TEXT NOT NULL DEFAULT '',
    trading_numbers  TEXT NOT NULL DEFAULT '',
    description      TEXT NOT NULL DEFAULT '',
    additional_name  TEXT NOT NULL DEFAULT '',
    product_status   TEXT NOT NULL DEFAULT '',
    specifications   TEXT NOT NULL DEFAULT '',
    product_group_id INTEGER NULL REFERENCES product_groups(id)
);
"#;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("article '{0}' already exists")]
    DuplicateArticle(String),
    #[error("article '{0}' not found")]
    ArticleNotFound(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

#[derive(Debug, Clone)]
pub struct CatalogStore {
    pool: SqlitePool,
}

impl CatalogStore {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let options = url
            .parse::<SqliteConnectOptions>()
            .with_context(|| format!("parsing sqlite url {url}"))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .with_context(|| format!("connecting sqlite pool for {url}"))?;
        Ok(Self { pool })
    }

    /// In-memory store on a single-connection pool, so every caller sees the
    /// same database. Used by tests and throwaway runs.
    pub async fn in_memory() -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::new().in_memory(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("connecting in-memory sqlite pool")?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&self.pool)
            .await
            .context("applying catalog schema")?;
        debug!("catalog schema applied");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, StoreError> {
        Ok(self.pool.begin().await?)
    }

    pub async fn list_article_crosses(&self) -> Result<Vec<ArticleCross>, StoreError> {
        let rows = sqlx::query(
            "SELECT article, brand, trading_numbers FROM products ORDER BY article",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(ArticleCross {
                article: row.try_get("article")?,
                brand: row.try_get("brand")?,
                trading_numbers: row.try_get("trading_numbers")?,
            });
        }
        Ok(out)
    }

    pub async fn product_by_article(&self, article: &str) -> Result<Option<Product>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        product_by_article(&mut conn, article).await
    }

    pub async fn group_by_name(&self, name: &str) -> Result<Option<ProductGroup>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        group_by_name(&mut conn, name).await
    }

    pub async fn count_groups_named(&self, name: &str) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM product_groups WHERE name = ?")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Create a new product, failing with [`StoreError::DuplicateArticle`]
    /// when the article is already taken (the API's 409 path).
    pub async fn create_product(&self, record: &ProductRecord) -> Result<Product, StoreError> {
        let mut tx = self.pool.begin().await?;
        if product_by_article(tx.as_mut(), &record.article).await?.is_some() {
            return Err(StoreError::DuplicateArticle(record.article.clone()));
        }
        insert_product(tx.as_mut(), record).await?;
        let product = product_by_article(tx.as_mut(), &record.article)
            .await?
            .ok_or(StoreError::Sqlx(sqlx::Error::RowNotFound))?;
        tx.commit().await?;
        Ok(product)
    }

    /// Apply a partial update keyed on article, failing with
    /// [`StoreError::ArticleNotFound`] when absent (the API's 404 path).
    pub async fn update_product_fields(&self, patch: &ProductPatch) -> Result<Product, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut product = product_by_article(tx.as_mut(), &patch.article)
            .await?
            .ok_or_else(|| StoreError::ArticleNotFound(patch.article.clone()))?;

        if let Some(value) = &patch.brand {
            product.brand = value.clone();
        }
        if let Some(value) = &patch.trading_numbers {
            product.trading_numbers = value.clone();
        }
        if let Some(value) = &patch.description {
            product.description = value.clone();
        }
        if let Some(value) = &patch.additional_name {
            product.additional_name = value.clone();
        }
        if let Some(value) = &patch.product_status {
            product.product_status = value.clone();
        }
        if let Some(value) = &patch.specifications {
            product.specifications = value.clone();
        }

        sqlx::query(
            r#"
            UPDATE products
               SET brand = ?, trading_numbers = ?, description = ?,
                   additional_name = ?, product_status = ?, specifications = ?
             WHERE id = ?
            "#,
        )
        .bind(&product.brand)
        .bind(&product.trading_numbers)
        .bind(&product.description)
        .bind(&product.additional_name)
        .bind(&product.product_status)
        .bind(&product.specifications)
        .bind(product.id)
        .execute(tx.as_mut())
        .await?;
        tx.commit().await?;
        Ok(product)
    }
}

pub async fn group_by_name(
    conn: &mut SqliteConnection,
    name: &str,
) -> Result<Option<ProductGroup>, StoreError> {
    let row = sqlx::query(
        "SELECT id, name, parent_id FROM product_groups WHERE name = ? ORDER BY id LIMIT 1",
    )
    .bind(name)
    .fetch_optional(&mut *conn)
    .await?;
    row.map(|r| group_from_row(&r)).transpose()
}

pub async fn group_by_id(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<ProductGroup>, StoreError> {
    let row = sqlx::query("SELECT id, name, parent_id FROM product_groups WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(|r| group_from_row(&r)).transpose()
}

/// Fetch a group by name or create it with a null parent. The boolean is
/// true when the group was created by this call.
pub async fn get_or_create_group(
    conn: &mut SqliteConnection,
    name: &str,
) -> Result<(ProductGroup, bool), StoreError> {
    if let Some(group) = group_by_name(conn, name).await? {
        return Ok((group, false));
    }
    let id: i64 =
        sqlx::query_scalar("INSERT INTO product_groups (name, parent_id) VALUES (?, NULL) RETURNING id")
            .bind(name)
            .fetch_one(&mut *conn)
            .await?;
    Ok((
        ProductGroup {
            id,
            name: name.to_string(),
            parent_id: None,
        },
        true,
    ))
}

pub async fn set_group_parent(
    conn: &mut SqliteConnection,
    group_id: i64,
    parent_id: Option<i64>,
) -> Result<(), StoreError> {
    sqlx::query("UPDATE product_groups SET parent_id = ? WHERE id = ?")
        .bind(parent_id)
        .bind(group_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn product_by_article(
    conn: &mut SqliteConnection,
    article: &str,
) -> Result<Option<Product>, StoreError> {
    let row = sqlx::query(
        r#"
        SELECT id, article, brand, trading_numbers, description,
               additional_name, product_status, specifications, product_group_id
          FROM products
         WHERE article = ?
        "#,
    )
    .bind(article)
    .fetch_optional(&mut *conn)
    .await?;
    row.map(|r| product_from_row(&r)).transpose()
}

/// Create-or-replace keyed on article: every field of `record` overwrites
/// the stored value, including the group reference.
pub async fn upsert_product(
    conn: &mut SqliteConnection,
    record: &ProductRecord,
) -> Result<UpsertOutcome, StoreError> {
    let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM products WHERE article = ?")
        .bind(&record.article)
        .fetch_optional(&mut *conn)
        .await?;

    match existing {
        Some(id) => {
            sqlx::query(
                r#"
                UPDATE products
                   SET brand = ?, trading_numbers = ?, description = ?,
                       additional_name = ?, product_status = ?, specifications = ?,
                       product_group_id = ?
                 WHERE id = ?
                "#,
            )
            .bind(&record.brand)
            .bind(&record.trading_numbers)
            .bind(&record.description)
            .bind(&record.additional_name)
            .bind(&record.product_status)
            .bind(&record.specifications)
            .bind(record.product_group_id)
            .bind(id)
            .execute(&mut *conn)
            .await?;
            Ok(UpsertOutcome::Updated)
        }
        None => {
            insert_product(conn, record).await?;
            Ok(UpsertOutcome::Created)
        }
    }
}

async fn insert_product(
    conn: &mut SqliteConnection,
    record: &ProductRecord,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO products (
            article, brand, trading_numbers, description,
            additional_name, product_status, specifications, product_group_id
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.article)
    .bind(&record.brand)
    .bind(&record.trading_numbers)
    .bind(&record.description)
    .bind(&record.additional_name)
    .bind(&record.product_status)
    .bind(&record.specifications)
    .bind(record.product_group_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn group_from_row(row: &SqliteRow) -> Result<ProductGroup, StoreError> {
    Ok(ProductGroup {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        parent_id: row.try_get("parent_id")?,
    })
}

fn product_from_row(row: &SqliteRow) -> Result<Product, StoreError> {
    Ok(Product {
        id: row.try_get("id")?,
        article: row.try_get("article")?,
        brand: row.try_get("brand")?,
        trading_numbers: row.try_get("trading_numbers")?,
        description: row.try_get("description")?,
        additional_name: row.try_get("additional_name")?,
        product_status: row.try_get("product_status")?,
        specifications: row.try_get("specifications")?,
        product_group_id: row.try_get("product_group_id")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> CatalogStore {
        let store = CatalogStore::in_memory().await.expect("in-memory store");
        store.migrate().await.expect("migrate");
        store
    }

    fn record(article: &str, brand: &str) -> ProductRecord {
        ProductRecord {
            article: article.to_string(),
            brand: brand.to_string(),
            trading_numbers: String::new(),
            description: String::new(),
            additional_name: String::new(),
            product_status: String::new(),
            specifications: String::new(),
            product_group_id: None,
        }
    }

    #[tokio::test]
    async fn get_or_create_group_is_idempotent() {
        let store = store().await;
        let mut conn = store.pool().acquire().await.unwrap();

        let (first, created) = get_or_create_group(&mut conn, "Тормоза").await.unwrap();
        assert!(created);
        assert_eq!(first.parent_id, None);

        let (second, created) = get_or_create_group(&mut conn, "Тормоза").await.unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);

        // release the single in-memory connection before pool-level queries
        drop(conn);
        assert_eq!(store.count_groups_named("Тормоза").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn set_group_parent_round_trips() {
        let store = store().await;
        let mut conn = store.pool().acquire().await.unwrap();

        let (root, _) = get_or_create_group(&mut conn, "Автозапчасти").await.unwrap();
        let (child, _) = get_or_create_group(&mut conn, "Подвеска колеса").await.unwrap();
        set_group_parent(&mut conn, child.id, Some(root.id)).await.unwrap();

        let reloaded = group_by_id(&mut conn, child.id).await.unwrap().unwrap();
        assert_eq!(reloaded.parent_id, Some(root.id));

        set_group_parent(&mut conn, child.id, None).await.unwrap();
        let reloaded = group_by_id(&mut conn, child.id).await.unwrap().unwrap();
        assert_eq!(reloaded.parent_id, None);
    }

    #[tokio::test]
    async fn upsert_creates_then_replaces() {
        let store = store().await;
        let mut conn = store.pool().acquire().await.unwrap();

        let outcome = upsert_product(&mut conn, &record("A1", "X")).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Created);

        let mut second = record("A1", "Y");
        second.description = "replaced".into();
        let outcome = upsert_product(&mut conn, &second).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);

        let product = product_by_article(&mut conn, "A1").await.unwrap().unwrap();
        assert_eq!(product.brand, "Y");
        assert_eq!(product.description, "replaced");
    }

    #[tokio::test]
    async fn create_product_rejects_duplicates() {
        let store = store().await;
        store.create_product(&record("A1", "X")).await.unwrap();

        let err = store.create_product(&record("A1", "Y")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateArticle(a) if a == "A1"));
    }

    #[tokio::test]
    async fn update_product_fields_patches_only_provided_fields() {
        let store = store().await;
        let mut created = record("A1", "X");
        created.description = "original".into();
        store.create_product(&created).await.unwrap();

        let patch = ProductPatch {
            article: "A1".into(),
            brand: Some("Y".into()),
            ..ProductPatch::default()
        };
        let updated = store.update_product_fields(&patch).await.unwrap();
        assert_eq!(updated.brand, "Y");
        assert_eq!(updated.description, "original");

        let missing = ProductPatch {
            article: "nope".into(),
            ..ProductPatch::default()
        };
        let err = store.update_product_fields(&missing).await.unwrap_err();
        assert!(matches!(err, StoreError::ArticleNotFound(a) if a == "nope"));
    }
}
