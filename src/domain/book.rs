use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Book entry as listed under a genre.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSummary {
    pub id: i64,
    pub bible_order: i64,
    pub title: String,
    pub abbr: String,
    pub slug: String,
    /// Normalized label used to address the book's content units.
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookDetail {
    pub id: i64,
    pub title: String,
    pub label: String,
}

/// Turn a book abbreviation into the label the content tables are keyed by.
///
/// Every run of characters outside `[A-Za-z0-9_]` becomes a single `_`, the
/// result is lowercased, and a leading digit gets a `b` prefix so the label
/// is a valid identifier (`"1 Cor."` → `"b1_cor_"`).
pub fn normalize_label(abbr: &str) -> String {
    lazy_static! {
        static ref NON_WORD_RE: Regex = Regex::new(r"[^A-Za-z0-9_]+").unwrap();
    }

    let label = NON_WORD_RE.replace_all(abbr, "_").to_lowercase();
    if label.starts_with(|c: char| c.is_ascii_digit()) {
        format!("b{}", label)
    } else {
        label
    }
}

/// Pick the alternate abbreviation when it carries something, else the regular one.
pub fn label_source<'a>(abbr: &'a str, alt_abbr: Option<&'a str>) -> &'a str {
    alt_abbr.filter(|a| !a.trim().is_empty()).unwrap_or(abbr)
}
