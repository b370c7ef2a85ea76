//! Persistence for both catalog variants.
//!
//! Every batch insert runs inside one scoped transaction, committed (or
//! rolled back) before the call returns, so concurrent uploads of
//! different images never interleave partial batches. All functions
//! take an explicit connection; there is no process-wide handle.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{InventoryError, ValidationError};
use crate::intake::ShelfPlacement;
use crate::models::{CatalogRecord, ShelfRecord, Side};
use crate::parser::{ParsedBook, UNKNOWN};

/// One page of query results, in the shape the listing endpoints
/// return: `{records, total, total_pages, page, per_page}`.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub records: Vec<T>,
    pub total: i64,
    pub total_pages: i64,
    pub page: i64,
    pub per_page: i64,
}

/// Field edits for a catalog record; `None` leaves a field untouched.
#[derive(Debug, Default, Clone)]
pub struct CatalogUpdate {
    pub title: Option<String>,
    pub author: Option<String>,
    pub publisher: Option<String>,
}

/// Insert one shelf-scan batch transactionally and return the stored
/// records in position order.
pub fn insert_shelf_batch(
    conn: &mut Connection,
    placement: &ShelfPlacement,
    parsed: &[ParsedBook],
) -> Result<Vec<ShelfRecord>, InventoryError> {
    let tx = conn.transaction()?;
    let now = Utc::now();
    let mut records = Vec::with_capacity(parsed.len());
    for book in parsed {
        let record = ShelfRecord {
            id: Uuid::new_v4().to_string(),
            title: book.title.clone(),
            author: book.author.clone(),
            row: placement.row,
            column: placement.column.clone(),
            side: placement.side,
            location: placement.location(),
            position: book.position,
            source_image: book.source_image.clone(),
            created_at: now,
        };
        tx.execute(
            "INSERT INTO shelf_books (id, title, author, shelf_row, shelf_column, side, \
             location, position, source_image, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                record.id,
                record.title,
                record.author,
                record.row,
                record.column,
                record.side.as_str(),
                record.location,
                record.position,
                record.source_image,
                now.timestamp_millis()
            ],
        )?;
        records.push(record);
    }
    tx.commit()?;
    log::info!("inserted {} shelf records", records.len());
    Ok(records)
}

/// Insert one batch-catalog batch transactionally.
pub fn insert_catalog_batch(
    conn: &mut Connection,
    owner: Option<&str>,
    parsed: &[ParsedBook],
) -> Result<Vec<CatalogRecord>, InventoryError> {
    let tx = conn.transaction()?;
    let now = Utc::now();
    let mut records = Vec::with_capacity(parsed.len());
    for book in parsed {
        let record = CatalogRecord {
            id: Uuid::new_v4().to_string(),
            title: book.title.clone(),
            author: book.author.clone(),
            publisher: book.publisher.clone().unwrap_or_else(|| UNKNOWN.to_string()),
            position: book.position,
            source_image: book.source_image.clone(),
            owner: owner.map(|value| value.to_string()),
            created_at: now,
        };
        tx.execute(
            "INSERT INTO catalog_books (id, title, author, publisher, position, \
             source_image, owner_id, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.id,
                record.title,
                record.author,
                record.publisher,
                record.position,
                record.source_image,
                record.owner,
                now.timestamp_millis()
            ],
        )?;
        records.push(record);
    }
    tx.commit()?;
    log::info!("inserted {} catalog records", records.len());
    Ok(records)
}

/// All shelf records in stable shelf order: row, column, side, then
/// position within the photo.
pub fn list_shelf(conn: &Connection) -> Result<Vec<ShelfRecord>, InventoryError> {
    let mut stmt = conn.prepare(
        "SELECT id, title, author, shelf_row, shelf_column, side, location, position, \
         source_image, created_at \
         FROM shelf_books \
         ORDER BY shelf_row, shelf_column, side, position",
    )?;
    let rows = stmt.query_map([], map_shelf_row)?;
    let mut records = Vec::new();
    for row in rows {
        records.push(row?);
    }
    Ok(records)
}

/// Paginated catalog listing in insertion order, newest first.
pub fn list_catalog(
    conn: &Connection,
    owner: Option<&str>,
    page: i64,
    per_page: i64,
) -> Result<Page<CatalogRecord>, InventoryError> {
    check_pagination(page, per_page)?;
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM catalog_books WHERE owner_id IS ?1",
        params![owner],
        |row| row.get(0),
    )?;
    let mut stmt = conn.prepare(
        "SELECT id, title, author, publisher, position, source_image, owner_id, created_at \
         FROM catalog_books \
         WHERE owner_id IS ?1 \
         ORDER BY created_at DESC, rowid DESC \
         LIMIT ?2 OFFSET ?3",
    )?;
    let rows = stmt.query_map(
        params![owner, per_page, (page - 1) * per_page],
        map_catalog_row,
    )?;
    let mut records = Vec::new();
    for row in rows {
        records.push(row?);
    }
    Ok(make_page(records, total, page, per_page))
}

/// Case-insensitive substring search against title or author, scoped
/// to the requesting owner, paginated like `list_catalog`.
pub fn search_catalog(
    conn: &Connection,
    owner: Option<&str>,
    query: &str,
    page: i64,
    per_page: i64,
) -> Result<Page<CatalogRecord>, InventoryError> {
    check_pagination(page, per_page)?;
    let pattern = format!("%{}%", escape_like(query));
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM catalog_books \
         WHERE owner_id IS ?1 AND (title LIKE ?2 ESCAPE '\\' OR author LIKE ?2 ESCAPE '\\')",
        params![owner, pattern],
        |row| row.get(0),
    )?;
    let mut stmt = conn.prepare(
        "SELECT id, title, author, publisher, position, source_image, owner_id, created_at \
         FROM catalog_books \
         WHERE owner_id IS ?1 AND (title LIKE ?2 ESCAPE '\\' OR author LIKE ?2 ESCAPE '\\') \
         ORDER BY created_at DESC, rowid DESC \
         LIMIT ?3 OFFSET ?4",
    )?;
    let rows = stmt.query_map(
        params![owner, pattern, per_page, (page - 1) * per_page],
        map_catalog_row,
    )?;
    let mut records = Vec::new();
    for row in rows {
        records.push(row?);
    }
    Ok(make_page(records, total, page, per_page))
}

/// Edit a catalog record's content fields. A missing id and a foreign
/// owner are indistinguishable to the caller.
pub fn update_catalog_record(
    conn: &Connection,
    owner: Option<&str>,
    id: &str,
    update: &CatalogUpdate,
) -> Result<(), InventoryError> {
    let changed = conn.execute(
        "UPDATE catalog_books SET \
         title = COALESCE(?1, title), \
         author = COALESCE(?2, author), \
         publisher = COALESCE(?3, publisher) \
         WHERE id = ?4 AND owner_id IS ?5",
        params![
            normalized(update.title.as_deref()),
            normalized(update.author.as_deref()),
            normalized(update.publisher.as_deref()),
            id,
            owner
        ],
    )?;
    if changed == 0 {
        return Err(InventoryError::NotFound);
    }
    Ok(())
}

pub fn delete_catalog_record(
    conn: &Connection,
    owner: Option<&str>,
    id: &str,
) -> Result<(), InventoryError> {
    let changed = conn.execute(
        "DELETE FROM catalog_books WHERE id = ?1 AND owner_id IS ?2",
        params![id, owner],
    )?;
    if changed == 0 {
        return Err(InventoryError::NotFound);
    }
    Ok(())
}

/// Edit a shelf record's content fields; placement and position are
/// immutable after intake.
pub fn update_shelf_record(
    conn: &Connection,
    id: &str,
    title: Option<&str>,
    author: Option<&str>,
) -> Result<(), InventoryError> {
    let changed = conn.execute(
        "UPDATE shelf_books SET \
         title = COALESCE(?1, title), \
         author = COALESCE(?2, author) \
         WHERE id = ?3",
        params![normalized(title), normalized(author), id],
    )?;
    if changed == 0 {
        return Err(InventoryError::NotFound);
    }
    Ok(())
}

pub fn delete_shelf_record(conn: &Connection, id: &str) -> Result<(), InventoryError> {
    let changed = conn.execute("DELETE FROM shelf_books WHERE id = ?1", params![id])?;
    if changed == 0 {
        return Err(InventoryError::NotFound);
    }
    Ok(())
}

/// Remove every record scanned at one physical slot, e.g. before
/// re-photographing a shelf.
pub fn delete_shelf_by_placement(
    conn: &Connection,
    row: i64,
    column: &str,
    side: Side,
) -> Result<usize, InventoryError> {
    let deleted = conn.execute(
        "DELETE FROM shelf_books \
         WHERE shelf_row = ?1 AND shelf_column = ?2 AND side = ?3",
        params![row, column, side.as_str()],
    )?;
    Ok(deleted)
}

fn check_pagination(page: i64, per_page: i64) -> Result<(), InventoryError> {
    if page < 1 || per_page < 1 {
        return Err(ValidationError::OutOfRange.into());
    }
    Ok(())
}

fn make_page<T>(records: Vec<T>, total: i64, page: i64, per_page: i64) -> Page<T> {
    Page {
        records,
        total,
        total_pages: (total + per_page - 1) / per_page,
        page,
        per_page,
    }
}

/// Escape LIKE wildcards so a user query matches literally.
fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// `None` leaves the column untouched; an edit to whitespace collapses
/// to the sentinel so a title can never become the empty string.
fn normalized(field: Option<&str>) -> Option<String> {
    field.map(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            UNKNOWN.to_string()
        } else {
            trimmed.to_string()
        }
    })
}

fn map_shelf_row(row: &Row) -> rusqlite::Result<ShelfRecord> {
    let side_raw: String = row.get(5)?;
    let side = Side::parse(&side_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            Type::Text,
            format!("unknown side {:?}", side_raw).into(),
        )
    })?;
    Ok(ShelfRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        author: row.get(2)?,
        row: row.get(3)?,
        column: row.get(4)?,
        side,
        location: row.get(6)?,
        position: row.get(7)?,
        source_image: row.get(8)?,
        created_at: timestamp_from_millis(row.get(9)?),
    })
}

fn map_catalog_row(row: &Row) -> rusqlite::Result<CatalogRecord> {
    Ok(CatalogRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        author: row.get(2)?,
        publisher: row.get(3)?,
        position: row.get(4)?,
        source_image: row.get(5)?,
        owner: row.get(6)?,
        created_at: timestamp_from_millis(row.get(7)?),
    })
}

fn timestamp_from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
