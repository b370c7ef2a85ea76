//! spines: bookshelf photo inventory.
//!
//! Photographs of bookshelves go in; structured, searchable catalog
//! records come out. Pixel understanding is delegated to an external
//! vision model; everything downstream of that response (parsing,
//! normalization, position-aware storage) lives here.

pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod intake;
pub mod models;
pub mod parser;
pub mod scanner;
pub mod users;
pub mod vision;

pub use config::Config;
pub use error::{InventoryError, ValidationError};

use rusqlite::Connection;
use serde::Serialize;

use crate::catalog::{insert_catalog_batch, insert_shelf_batch};
use crate::intake::ValidatedUpload;
use crate::models::{CatalogRecord, ShelfRecord};
use crate::parser::{parse_listing, ParseMode};
use crate::vision::{VisionClient, CATALOG_PROMPT, SHELF_PROMPT};

/// Outcome of processing one shelf photo, in the shape the upload
/// endpoint reports: `{success, message, records}`.
#[derive(Debug, Serialize)]
pub struct ShelfScan {
    pub success: bool,
    pub message: String,
    pub records: Vec<ShelfRecord>,
}

/// Interactive per-shelf mode: one extraction call, then one storage
/// transaction. An empty model response means zero records: nothing
/// is written and the scan reports no recognized books.
pub fn process_shelf_image(
    conn: &mut Connection,
    client: &VisionClient,
    upload: &ValidatedUpload,
    source_image: &str,
) -> Result<ShelfScan, InventoryError> {
    let raw = client.extract(&upload.image_bytes, upload.mime_type, SHELF_PROMPT)?;
    let parsed = parse_listing(&raw, source_image, ParseMode::Shelf);
    if parsed.is_empty() {
        log::info!("no books recognized in {}", source_image);
        return Ok(ShelfScan {
            success: false,
            message: "no books recognized in the image".to_string(),
            records: Vec::new(),
        });
    }
    let records = insert_shelf_batch(conn, &upload.placement, &parsed)?;
    Ok(ShelfScan {
        success: true,
        message: format!("{} books added to the catalog", records.len()),
        records,
    })
}

/// Batch-catalog mode: same pipeline, three-field lines, and an empty
/// response collapses to a single all-sentinel record so the source
/// image still leaves a trace in the store.
pub fn process_catalog_image(
    conn: &mut Connection,
    client: &VisionClient,
    owner: Option<&str>,
    image_bytes: &[u8],
    source_image: &str,
) -> Result<Vec<CatalogRecord>, InventoryError> {
    let mime = intake::sniff_image(image_bytes)?;
    let raw = client.extract(image_bytes, mime, CATALOG_PROMPT)?;
    let parsed = parse_listing(&raw, source_image, ParseMode::Catalog);
    insert_catalog_batch(conn, owner, &parsed)
}
