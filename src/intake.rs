//! Upload validation. Everything here is checked once, before any
//! extraction call is issued; nothing touches storage.

use crate::error::ValidationError;
use crate::models::Side;

const MIN_ROW: i64 = 1;
const MAX_ROW: i64 = 10;
const MAX_COLUMN_CHARS: usize = 2;

/// Physical shelf coordinates for a scan batch. Validated at
/// construction and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShelfPlacement {
    pub row: i64,
    pub column: String,
    pub side: Side,
}

impl ShelfPlacement {
    pub fn new(row: i64, column: &str, side: &str) -> Result<ShelfPlacement, ValidationError> {
        if !(MIN_ROW..=MAX_ROW).contains(&row) {
            return Err(ValidationError::OutOfRange);
        }
        let column = column.trim();
        let column_len = column.chars().count();
        if column_len == 0
            || column_len > MAX_COLUMN_CHARS
            || !column.chars().all(|c| c.is_alphabetic())
        {
            return Err(ValidationError::BadFormat);
        }
        let side = Side::parse(side).ok_or(ValidationError::BadEnum)?;
        Ok(ShelfPlacement {
            row,
            column: column.to_string(),
            side,
        })
    }

    /// Denormalized shelf label, e.g. `3A`.
    pub fn location(&self) -> String {
        format!("{}{}", self.row, self.column)
    }
}

/// An image that decoded as a supported raster format, plus the
/// placement it was submitted with.
#[derive(Debug, Clone)]
pub struct ValidatedUpload {
    pub image_bytes: Vec<u8>,
    pub mime_type: &'static str,
    pub placement: ShelfPlacement,
}

impl ValidatedUpload {
    pub fn new(
        image_bytes: Vec<u8>,
        placement: ShelfPlacement,
    ) -> Result<ValidatedUpload, ValidationError> {
        let mime_type = sniff_image(&image_bytes)?;
        Ok(ValidatedUpload {
            image_bytes,
            mime_type,
            placement,
        })
    }
}

/// Decode the buffer as a raster image and return its MIME type for
/// the extraction request. A full decode, not just a magic-byte check,
/// so truncated files are rejected here instead of at the model.
pub fn sniff_image(image_bytes: &[u8]) -> Result<&'static str, ValidationError> {
    let format =
        image::guess_format(image_bytes).map_err(|_| ValidationError::UndecodableImage)?;
    image::load_from_memory_with_format(image_bytes, format)
        .map_err(|_| ValidationError::UndecodableImage)?;
    Ok(format.to_mime_type())
}
