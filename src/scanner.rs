//! Directory batch mode: walk a folder of shelf photos, extract each
//! one, and write a single semicolon-separated CSV. Every image ends up
//! in the output: a failed extraction becomes an `ERROR` row and an
//! empty response an `N/A` row, so no file is ever silently skipped.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{fs, thread};

use serde::Serialize;
use walkdir::WalkDir;

use crate::error::InventoryError;
use crate::intake;
use crate::parser::{parse_listing, ParseMode, ParsedBook, IMAGE_ERROR, UNKNOWN};
use crate::vision::{VisionClient, CATALOG_PROMPT};

pub const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];
pub const CSV_HEADER: [&str; 4] = ["Title", "Author", "Publisher", "SourceFile"];

// Bounded pause between successive submissions, to stay under the
// upstream quota.
const PAUSE_BETWEEN_IMAGES: Duration = Duration::from_secs(1);

#[derive(Debug, Default, Clone, Serialize)]
pub struct ScanStats {
    pub images: u64,
    pub rows: u64,
    pub failed_images: u64,
}

/// Scan `root` for supported images and write one catalog CSV to
/// `out_path`.
pub fn scan_directory(
    client: &VisionClient,
    root: &Path,
    out_path: &Path,
) -> Result<ScanStats, InventoryError> {
    let files = collect_image_files(root)?;
    log::info!("scanning {} images under {}", files.len(), root.display());

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .from_path(out_path)?;
    writer.write_record(CSV_HEADER)?;

    let mut stats = ScanStats::default();
    for (index, path) in files.iter().enumerate() {
        if index > 0 {
            thread::sleep(PAUSE_BETWEEN_IMAGES);
        }
        let source_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();
        log::info!("processing {}", source_name);
        stats.images += 1;

        let books = match extract_books(client, path, &source_name) {
            Ok(books) => books,
            Err(err) => {
                log::warn!("extraction failed for {}: {}", source_name, err);
                stats.failed_images += 1;
                vec![error_row(&source_name)]
            }
        };
        append_books(&mut writer, &books)?;
        stats.rows += books.len() as u64;
    }

    writer.flush()?;
    log::info!(
        "scan complete: {} images, {} rows, {} failures",
        stats.images,
        stats.rows,
        stats.failed_images
    );
    Ok(stats)
}

/// Supported image files under `root`, sorted for a deterministic
/// output order.
pub fn collect_image_files(root: &Path) -> Result<Vec<PathBuf>, InventoryError> {
    if !root.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("image directory does not exist: {}", root.display()),
        )
        .into());
    }
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .filter(|entry| {
            let ext = entry
                .path()
                .extension()
                .and_then(|value| value.to_str())
                .unwrap_or("")
                .to_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext.as_str())
        })
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    Ok(files)
}

fn extract_books(
    client: &VisionClient,
    path: &Path,
    source_name: &str,
) -> Result<Vec<ParsedBook>, InventoryError> {
    let bytes = fs::read(path)?;
    let mime = intake::sniff_image(&bytes)?;
    let raw = client.extract(&bytes, mime, CATALOG_PROMPT)?;
    // Catalog mode: an empty response still yields one N/A row tagged
    // with the source file.
    Ok(parse_listing(&raw, source_name, ParseMode::Catalog))
}

fn error_row(source_name: &str) -> ParsedBook {
    ParsedBook {
        position: 1,
        title: IMAGE_ERROR.to_string(),
        author: IMAGE_ERROR.to_string(),
        publisher: Some(IMAGE_ERROR.to_string()),
        source_image: source_name.to_string(),
    }
}

fn append_books<W: Write>(
    writer: &mut csv::Writer<W>,
    books: &[ParsedBook],
) -> Result<(), InventoryError> {
    for book in books {
        writer.write_record([
            book.title.as_str(),
            book.author.as_str(),
            book.publisher.as_deref().unwrap_or(UNKNOWN),
            book.source_image.as_str(),
        ])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{append_books, collect_image_files, error_row, CSV_HEADER};
    use crate::parser::{parse_listing, ParseMode};
    use std::fs;
    use std::io::Cursor;

    fn write_png(path: &std::path::Path) {
        let mut buffer = Cursor::new(Vec::new());
        image::RgbImage::new(2, 2)
            .write_to(&mut buffer, image::ImageFormat::Png)
            .unwrap();
        fs::write(path, buffer.into_inner()).unwrap();
    }

    fn rows_to_string(books: &[crate::parser::ParsedBook]) -> String {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b';')
            .from_writer(Vec::new());
        writer.write_record(CSV_HEADER).unwrap();
        append_books(&mut writer, books).unwrap();
        String::from_utf8(writer.into_inner().unwrap()).unwrap()
    }

    #[test]
    fn collects_only_supported_extensions_recursively() {
        let dir = tempfile::tempdir().unwrap();
        write_png(&dir.path().join("b.png"));
        write_png(&dir.path().join("a.JPG"));
        fs::write(dir.path().join("notes.txt"), "not an image").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        write_png(&dir.path().join("nested").join("c.webp"));

        let files = collect_image_files(dir.path()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(files.len(), 3);
        assert!(names.contains(&"a.JPG".to_string()));
        assert!(names.contains(&"b.png".to_string()));
        assert!(names.contains(&"c.webp".to_string()));
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(collect_image_files(&missing).is_err());
    }

    #[test]
    fn rows_carry_header_and_source_file() {
        let books = parse_listing(
            "\"De Hobbit\";\"J.R.R. Tolkien\";\"Unieboek\"",
            "shelf1.jpg",
            ParseMode::Catalog,
        );
        let output = rows_to_string(&books);
        let mut lines = output.lines();
        assert_eq!(lines.next(), Some("Title;Author;Publisher;SourceFile"));
        assert_eq!(lines.next(), Some("De Hobbit;J.R.R. Tolkien;Unieboek;shelf1.jpg"));
    }

    #[test]
    fn delimiter_inside_a_field_is_quoted_on_output() {
        let books = parse_listing(
            "\"Crime; and Punishment\";\"Dostoevsky\";\"Penguin\"",
            "img.png",
            ParseMode::Catalog,
        );
        let output = rows_to_string(&books);
        assert!(output.contains("\"Crime; and Punishment\";Dostoevsky;Penguin;img.png"));
    }

    #[test]
    fn failed_image_renders_as_error_row() {
        let output = rows_to_string(&[error_row("broken.jpg")]);
        assert!(output.contains("ERROR;ERROR;ERROR;broken.jpg"));
    }

    #[test]
    fn empty_extraction_renders_as_sentinel_row() {
        let books = parse_listing("", "empty.jpg", ParseMode::Catalog);
        let output = rows_to_string(&books);
        assert!(output.contains("N/A;N/A;N/A;empty.jpg"));
    }
}
