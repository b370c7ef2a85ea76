//! Turns the raw vision-model response into ordered candidate records.
//!
//! The model is an untrusted text source: field counts, quoting, and
//! delimiters are all suspect. Every non-empty line must come out the
//! other end as exactly one record, because each line stands for a
//! physical slot on the shelf.

use std::sync::OnceLock;

use regex::Regex;

/// Sentinel for a field the model could not read, or that a line lacked.
pub const UNKNOWN: &str = "N/A";
/// Sentinel for a line whose structure could not be decoded at all.
pub const LINE_ERROR: &str = "CSV_ERROR";
/// Sentinel row value for an image whose extraction call failed wholly.
pub const IMAGE_ERROR: &str = "ERROR";

const DELIMITER: char = ';';

/// Field layout expected from the instruction template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// `"Title";"Author"` lines; an empty response means zero records.
    Shelf,
    /// `"Title";"Author";"Publisher"` lines; an empty response collapses
    /// to a single all-sentinel record so the source image still shows
    /// up in the output.
    Catalog,
}

impl ParseMode {
    fn field_count(self) -> usize {
        match self {
            ParseMode::Shelf => 2,
            ParseMode::Catalog => 3,
        }
    }
}

/// One normalized line from the model output. `publisher` is only
/// populated in catalog mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedBook {
    pub position: i64,
    pub title: String,
    pub author: String,
    pub publisher: Option<String>,
    pub source_image: String,
}

/// Parse a raw model response into records, one per non-empty line.
///
/// Pure function of its input: identical text yields identical records,
/// and line order becomes `position`. Lines that cannot be decoded are
/// kept as `CSV_ERROR` rows rather than dropped, so downstream slots
/// stay aligned with the photo.
pub fn parse_listing(raw_text: &str, source_image: &str, mode: ParseMode) -> Vec<ParsedBook> {
    let body = strip_code_fence(raw_text);
    let lines: Vec<&str> = body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    if lines.is_empty() {
        return match mode {
            ParseMode::Shelf => Vec::new(),
            ParseMode::Catalog => vec![fallback_record(source_image, mode, UNKNOWN)],
        };
    }

    lines
        .iter()
        .enumerate()
        .map(|(index, line)| parse_line(line, index as i64 + 1, source_image, mode))
        .collect()
}

fn parse_line(line: &str, position: i64, source_image: &str, mode: ParseMode) -> ParsedBook {
    let mut fields = match split_quoted(line) {
        Ok(fields) => fields,
        Err(()) => {
            log::warn!("undecodable line at position {}: {:?}", position, line);
            let mut record = fallback_record(source_image, mode, LINE_ERROR);
            record.position = position;
            return record;
        }
    };

    // Pad up to the mode's minimum; extra trailing fields are ignored.
    while fields.len() < mode.field_count() {
        fields.push(UNKNOWN.to_string());
    }

    ParsedBook {
        position,
        title: fields[0].clone(),
        author: fields[1].clone(),
        publisher: match mode {
            ParseMode::Shelf => None,
            ParseMode::Catalog => Some(fields[2].clone()),
        },
        source_image: source_image.to_string(),
    }
}

fn fallback_record(source_image: &str, mode: ParseMode, sentinel: &str) -> ParsedBook {
    ParsedBook {
        position: 1,
        title: sentinel.to_string(),
        author: sentinel.to_string(),
        publisher: match mode {
            ParseMode::Shelf => None,
            ParseMode::Catalog => Some(sentinel.to_string()),
        },
        source_image: source_image.to_string(),
    }
}

/// Split a line on the delimiter, honoring double quotes so a quoted
/// field may contain `;`. An unterminated quote is a decode failure.
fn split_quoted(line: &str) -> Result<Vec<String>, ()> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in line.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            c if c == DELIMITER && !in_quotes => {
                fields.push(clean_field(&current));
                current.clear();
            }
            c => current.push(c),
        }
    }
    if in_quotes {
        return Err(());
    }
    fields.push(clean_field(&current));
    Ok(fields)
}

/// Trim surrounding whitespace; an empty field becomes the `N/A`
/// sentinel so titles are never the empty string. Quote characters were
/// already consumed by the splitter.
fn clean_field(raw: &str) -> String {
    let cleaned = raw.trim();
    if cleaned.is_empty() {
        UNKNOWN.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Models regularly wrap their output in a markdown code fence despite
/// being told not to. Strip one surrounding fence before line splitting.
fn strip_code_fence(raw: &str) -> &str {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let fence = FENCE.get_or_init(|| {
        Regex::new(r"(?s)\A\s*```[A-Za-z]*\s*\n(.*?)\n?\s*```\s*\z").expect("fence regex")
    });
    match fence.captures(raw) {
        Some(captures) => captures.get(1).map(|m| m.as_str()).unwrap_or(raw),
        None => raw,
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_listing, ParseMode, ParsedBook, LINE_ERROR, UNKNOWN};

    fn titles(records: &[ParsedBook]) -> Vec<&str> {
        records.iter().map(|r| r.title.as_str()).collect()
    }

    #[test]
    fn one_record_per_nonempty_line_in_order() {
        let raw = "\"De Hobbit\";\"J.R.R. Tolkien\";\"Unieboek\"\n\n  \n\"Dune\";\"Frank Herbert\";\"Ace\"\n";
        let records = parse_listing(raw, "shelf1.jpg", ParseMode::Catalog);
        assert_eq!(records.len(), 2);
        assert_eq!(titles(&records), vec!["De Hobbit", "Dune"]);
        assert_eq!(records[0].position, 1);
        assert_eq!(records[1].position, 2);
        assert!(records.iter().all(|r| r.source_image == "shelf1.jpg"));
    }

    #[test]
    fn fields_are_unquoted_and_trimmed() {
        let records = parse_listing(
            "\"De Hobbit\";\"J.R.R. Tolkien\";\"Unieboek\"",
            "img.png",
            ParseMode::Catalog,
        );
        assert_eq!(records[0].title, "De Hobbit");
        assert_eq!(records[0].author, "J.R.R. Tolkien");
        assert_eq!(records[0].publisher.as_deref(), Some("Unieboek"));
    }

    #[test]
    fn missing_fields_are_padded_with_sentinel() {
        let records = parse_listing("Only A Title", "img.png", ParseMode::Catalog);
        assert_eq!(records[0].title, "Only A Title");
        assert_eq!(records[0].author, UNKNOWN);
        assert_eq!(records[0].publisher.as_deref(), Some(UNKNOWN));
    }

    #[test]
    fn empty_fields_become_sentinel_never_empty_string() {
        let records = parse_listing(";;", "img.png", ParseMode::Catalog);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, UNKNOWN);
        assert_eq!(records[0].author, UNKNOWN);
        assert_eq!(records[0].publisher.as_deref(), Some(UNKNOWN));
    }

    #[test]
    fn extra_fields_are_ignored_in_shelf_mode() {
        let records = parse_listing(
            "\"Dune\";\"Frank Herbert\";\"Ace\";\"extra\"",
            "img.png",
            ParseMode::Shelf,
        );
        assert_eq!(records[0].title, "Dune");
        assert_eq!(records[0].author, "Frank Herbert");
        assert_eq!(records[0].publisher, None);
    }

    #[test]
    fn quoted_delimiter_stays_inside_field() {
        let records = parse_listing(
            "\"Crime; and Punishment\";\"Dostoevsky\"",
            "img.png",
            ParseMode::Shelf,
        );
        assert_eq!(records[0].title, "Crime; and Punishment");
        assert_eq!(records[0].author, "Dostoevsky");
    }

    #[test]
    fn undecodable_line_becomes_error_row_and_batch_continues() {
        let raw = "\"Good\";\"Line\"\n\"Unterminated;quote\n\"Fine\";\"Again\"";
        let records = parse_listing(raw, "img.png", ParseMode::Shelf);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].title, "Good");
        assert_eq!(records[1].title, LINE_ERROR);
        assert_eq!(records[1].author, LINE_ERROR);
        assert_eq!(records[1].position, 2);
        assert_eq!(records[2].title, "Fine");
        assert_eq!(records[2].position, 3);
    }

    #[test]
    fn empty_response_yields_zero_records_in_shelf_mode() {
        assert!(parse_listing("", "img.png", ParseMode::Shelf).is_empty());
        assert!(parse_listing("  \n \n", "img.png", ParseMode::Shelf).is_empty());
    }

    #[test]
    fn empty_response_yields_single_sentinel_record_in_catalog_mode() {
        let records = parse_listing("", "empty.jpg", ParseMode::Catalog);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, UNKNOWN);
        assert_eq!(records[0].author, UNKNOWN);
        assert_eq!(records[0].publisher.as_deref(), Some(UNKNOWN));
        assert_eq!(records[0].source_image, "empty.jpg");
        assert_eq!(records[0].position, 1);
    }

    #[test]
    fn parse_is_idempotent() {
        let raw = "\"A\";\"B\"\ngarbage \" line\n\"C\";\"D\"";
        let first = parse_listing(raw, "img.png", ParseMode::Shelf);
        let second = parse_listing(raw, "img.png", ParseMode::Shelf);
        assert_eq!(first, second);
    }

    #[test]
    fn code_fence_wrapper_is_stripped() {
        let raw = "```csv\n\"Dune\";\"Frank Herbert\"\n\"Emma\";\"Jane Austen\"\n```";
        let records = parse_listing(raw, "img.png", ParseMode::Shelf);
        assert_eq!(titles(&records), vec!["Dune", "Emma"]);
    }

    #[test]
    fn unfenced_text_passes_through_untouched() {
        let raw = "\"Dune\";\"Frank Herbert\"";
        assert_eq!(parse_listing(raw, "i.png", ParseMode::Shelf).len(), 1);
    }
}
