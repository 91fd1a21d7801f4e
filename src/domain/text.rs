use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Verse id → Catechism paragraph numbers. Verses without links are absent.
pub type CatechismLinks = HashMap<i64, Vec<i64>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    #[serde(rename = "version_id")]
    pub id: i64,
    pub lang_id: i64,
    /// Short code, also used to address content units.
    pub abbr: String,
    pub full_name: String,
}

/// One verse-typed content unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verse {
    pub id: i64,
    pub book_label: String,
    pub version_code: String,
    pub chapter_number: u32,
    pub verse_number: u32,
    pub sort_key: i64,
    /// `testament.version.book.chapter`
    #[serde(default)]
    pub path: String,
    pub content: String,
}

impl Verse {
    pub fn display_line(&self) -> String {
        format!("{:>3}  {}", self.verse_number, self.content.trim())
    }
}
