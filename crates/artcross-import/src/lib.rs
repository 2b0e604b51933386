//! Spreadsheet import pipeline: header normalization + catalog reconciliation.
//!
//! A run is strictly sequential: later rows may depend on product groups
//! created by earlier rows, so there is no intra-file parallelism. Runs on
//! different files are independent; group get-or-create across concurrent
//! runs can race on the name lookup, which is an accepted limitation of the
//! current schema (no unique constraint on group names).

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use artcross_core::{
    canonical_field_for_header, required_parent_for, CanonicalRow, ProductGroup, ProductRecord,
    ROOT_GROUP_NAME,
};
use artcross_storage::{self as storage, CatalogStore, StoreError, UpsertOutcome};

pub const CRATE_NAME: &str = "artcross-import";

/// Fatal-to-the-run load failures. Anything here aborts before the first
/// row is processed.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot open spreadsheet {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse spreadsheet {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error("spreadsheet {path} contains no data rows")]
    Empty { path: String },
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Load(#[from] LoadError),
    /// Store failure while establishing the root group, before any row.
    /// Per-row store failures never surface here; they become row outcomes.
    #[error("preparing root product group: {0}")]
    Store(#[from] StoreError),
}

/// Loads the spreadsheet and normalizes it into canonical rows.
///
/// Headers are trimmed and lowercased, then mapped through the fixed alias
/// table; unrecognized columns are dropped. Cell values are preserved raw.
pub fn load_rows(path: &Path) -> Result<Vec<CanonicalRow>, LoadError> {
    let display = path.display().to_string();
    let file = std::fs::File::open(path).map_err(|source| LoadError::Open {
        path: display.clone(),
        source,
    })?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|source| LoadError::Parse {
            path: display.clone(),
            source,
        })?
        .clone();
    let columns: Vec<_> = headers
        .iter()
        .enumerate()
        .filter_map(|(idx, header)| canonical_field_for_header(header).map(|field| (idx, field)))
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|source| LoadError::Parse {
            path: display.clone(),
            source,
        })?;
        let mut row = CanonicalRow::default();
        for &(idx, field) in &columns {
            if let Some(value) = record.get(idx) {
                row.set(field, value.to_string());
            }
        }
        rows.push(row);
    }

    if rows.is_empty() {
        return Err(LoadError::Empty { path: display });
    }
    Ok(rows)
}

/// Observational per-row progress hook; must not affect control flow.
pub trait ProgressSink: Send + Sync {
    /// `current_row` uses visual spreadsheet numbering: the first data row
    /// reports as 2. `total_rows` is the data row count.
    fn on_row(&self, current_row: usize, total_rows: usize);
}

#[derive(Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn on_row(&self, _current_row: usize, _total_rows: usize) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RowStatus {
    Created,
    Updated,
    Skipped,
    Error,
}

impl std::fmt::Display for RowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Skipped => "skipped",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RowOutcome {
    pub row_number: usize,
    pub article: Option<String>,
    pub status: RowStatus,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total_rows: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: usize,
    pub outcomes: Vec<RowOutcome>,
}

pub struct Importer {
    store: CatalogStore,
    progress: Box<dyn ProgressSink>,
}

impl Importer {
    pub fn new(store: CatalogStore) -> Self {
        Self {
            store,
            progress: Box::new(NoopProgress),
        }
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Runs one import: load + normalize, then reconcile row by row.
    ///
    /// Only load failures (and a store failure while establishing the root
    /// group) abort; every per-row failure is logged, recorded as an
    /// `error` outcome and the run continues with the next row.
    pub async fn run(&self, path: &Path) -> Result<ImportSummary, ImportError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, path = %path.display(), "starting catalog import");

        let rows = load_rows(path)?;
        let total_rows = rows.len();
        let root = self.ensure_root_group().await?;

        let mut outcomes = Vec::with_capacity(total_rows);
        for (index, row) in rows.iter().enumerate() {
            // Row 1 is the header row in the source sheet.
            let row_number = index + 2;
            let outcome = match self.process_row(&root, row_number, row).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    error!(%run_id, row_number, row = ?row, "row failed: {err}");
                    RowOutcome {
                        row_number,
                        article: non_empty(row.article.as_deref()),
                        status: RowStatus::Error,
                        detail: err.to_string(),
                    }
                }
            };
            info!(
                %run_id,
                row_number,
                article = outcome.article.as_deref().unwrap_or(""),
                status = %outcome.status,
                "{}",
                outcome.detail
            );
            outcomes.push(outcome);
            self.progress.on_row(row_number, total_rows);
        }

        let summary = ImportSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            total_rows,
            created: count(&outcomes, RowStatus::Created),
            updated: count(&outcomes, RowStatus::Updated),
            skipped: count(&outcomes, RowStatus::Skipped),
            errors: count(&outcomes, RowStatus::Error),
            outcomes,
        };
        info!(
            %run_id,
            total_rows = summary.total_rows,
            created = summary.created,
            updated = summary.updated,
            skipped = summary.skipped,
            errors = summary.errors,
            "catalog import finished"
        );
        Ok(summary)
    }

    /// Like [`Importer::run`], but deletes the transient source file after
    /// the run no matter how it went.
    pub async fn run_and_cleanup(&self, path: &Path) -> Result<ImportSummary, ImportError> {
        let result = self.run(path).await;
        match std::fs::remove_file(path) {
            Ok(()) => info!(path = %path.display(), "removed transient spreadsheet"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!(path = %path.display(), "failed to remove transient spreadsheet: {err}")
            }
        }
        result
    }

    /// Get-or-create the fixed root group and force its parent to null
    /// regardless of prior state.
    async fn ensure_root_group(&self) -> Result<ProductGroup, StoreError> {
        let mut tx = self.store.begin().await?;
        let (mut root, created) = storage::get_or_create_group(tx.as_mut(), ROOT_GROUP_NAME).await?;
        if root.parent_id.is_some() {
            warn!(group = ROOT_GROUP_NAME, "root group had a parent, resetting to null");
            storage::set_group_parent(tx.as_mut(), root.id, None).await?;
            root.parent_id = None;
        }
        tx.commit().await?;
        if created {
            info!(group = ROOT_GROUP_NAME, "created root product group");
        }
        Ok(root)
    }

    async fn process_row(
        &self,
        root: &ProductGroup,
        row_number: usize,
        row: &CanonicalRow,
    ) -> Result<RowOutcome, StoreError> {
        let Some(article) = non_empty(row.article.as_deref()) else {
            warn!(row_number, "row has no article, skipping");
            return Ok(RowOutcome {
                row_number,
                article: None,
                status: RowStatus::Skipped,
                detail: "article is missing or empty".into(),
            });
        };

        // One transaction per row: group writes and the product upsert for
        // this row land together or not at all.
        let mut tx = self.store.begin().await?;
        let group_id = resolve_group(tx.as_mut(), root, row.product_group_name.as_deref()).await?;
        let record = sanitize_row(row, Some(group_id));
        let upsert = storage::upsert_product(tx.as_mut(), &record).await?;
        tx.commit().await?;

        let (status, detail) = match upsert {
            UpsertOutcome::Created => (RowStatus::Created, format!("created product {article}")),
            UpsertOutcome::Updated => (RowStatus::Updated, format!("updated product {article}")),
        };
        Ok(RowOutcome {
            row_number,
            article: Some(article),
            status,
            detail,
        })
    }
}

/// Resolves a raw group cell to a group id under the fixed policy:
/// blank -> root; root's own name -> root (re-healing its parent); a name
/// in the parent rule table -> get-or-create re-pointed under the root;
/// anything else -> get-or-create with its parent left alone.
async fn resolve_group(
    conn: &mut SqliteConnection,
    root: &ProductGroup,
    raw: Option<&str>,
) -> Result<i64, StoreError> {
    let name = raw.unwrap_or_default().trim();
    if name.is_empty() {
        return Ok(root.id);
    }

    if name == root.name {
        let current = storage::group_by_id(conn, root.id).await?;
        if current.is_some_and(|group| group.parent_id.is_some()) {
            storage::set_group_parent(conn, root.id, None).await?;
        }
        return Ok(root.id);
    }

    let (group, created) = storage::get_or_create_group(conn, name).await?;
    if created {
        info!(group = name, "created product group");
    }
    if required_parent_for(name).is_some() && group.parent_id != Some(root.id) {
        // One level deep only: listed children always hang under the root.
        storage::set_group_parent(conn, group.id, Some(root.id)).await?;
    }
    Ok(group.id)
}

/// Builds the upsert payload: missing cells become empty strings, present
/// cells pass through unmodified. `product_group_name` was consumed by
/// group resolution and is excluded here.
fn sanitize_row(row: &CanonicalRow, product_group_id: Option<i64>) -> ProductRecord {
    ProductRecord {
        article: row.article.clone().unwrap_or_default(),
        brand: row.brand.clone().unwrap_or_default(),
        trading_numbers: row.trading_numbers.clone().unwrap_or_default(),
        description: row.description.clone().unwrap_or_default(),
        additional_name: row.additional_name.clone().unwrap_or_default(),
        product_status: row.product_status.clone().unwrap_or_default(),
        specifications: row.specifications.clone().unwrap_or_default(),
        product_group_id,
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

fn count(outcomes: &[RowOutcome], status: RowStatus) -> usize {
    outcomes.iter().filter(|o| o.status == status).count()
}
