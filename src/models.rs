use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which face of a double-stacked shelf a photo shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Front,
    Back,
}

impl Side {
    pub fn parse(raw: &str) -> Option<Side> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "front" => Some(Side::Front),
            "back" => Some(Side::Back),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Front => "front",
            Side::Back => "back",
        }
    }
}

/// A book recognized on a physical shelf photo, pinned to its slot.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ShelfRecord {
    pub id: String, // UUID
    pub title: String,
    pub author: String,
    pub row: i64,
    pub column: String,
    pub side: Side,
    pub location: String, // "{row}{column}"
    pub position: i64, // 1-based, top to bottom within the source image
    pub source_image: String,
    pub created_at: DateTime<Utc>,
}

/// A book from the batch-catalog variant, optionally owned by a user.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CatalogRecord {
    pub id: String, // UUID
    pub title: String,
    pub author: String,
    pub publisher: String,
    pub position: i64,
    pub source_image: String,
    pub owner: Option<String>, // user id
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    pub id: String, // UUID
    pub username: String,
}
