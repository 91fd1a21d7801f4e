use std::fmt;

/// Identity of a cached result, rendered as `name:part:part`.
///
/// Two requests with equal keys share one in-flight fetch and one cached value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
    name: &'static str,
    parts: Vec<String>,
}

impl QueryKey {
    pub fn new(name: &'static str, parts: Vec<String>) -> Self {
        Self { name, parts }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    pub fn testaments() -> Self {
        Self::new("testaments", vec![])
    }

    pub fn testament_detail(slug: &str) -> Self {
        Self::new("testament_detail", vec![slug.to_string()])
    }

    pub fn testament_genres(testament_id: i64) -> Self {
        Self::new("testament_genres", vec![testament_id.to_string()])
    }

    pub fn genre_detail(slug: &str) -> Self {
        Self::new("genre_detail", vec![slug.to_string()])
    }

    pub fn books_by_genre(genre_id: i64) -> Self {
        Self::new("books_by_genre", vec![genre_id.to_string()])
    }

    pub fn book_detail(slug: &str) -> Self {
        Self::new("book_detail", vec![slug.to_string()])
    }

    pub fn bible_versions() -> Self {
        Self::new("bible_versions", vec![])
    }

    pub fn chapter_numbers(book_id: i64, book_label: &str, version_code: &str) -> Self {
        Self::new(
            "chapter_numbers",
            vec![
                book_id.to_string(),
                book_label.to_string(),
                version_code.to_string(),
            ],
        )
    }

    pub fn verse_text(book_label: &str, chapter: u32, version_code: &str) -> Self {
        Self::new(
            "verseText",
            vec![
                book_label.to_string(),
                chapter.to_string(),
                version_code.to_string(),
            ],
        )
    }

    /// Ids are sorted on a copy so the caller's slice keeps its order.
    pub fn ccc_links(verse_ids: &[i64]) -> Self {
        let mut sorted = verse_ids.to_vec();
        sorted.sort_unstable();
        let joined = sorted
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        Self::new("cccLinks", vec![joined])
    }

    pub fn book_prefetch(slug: &str) -> Self {
        Self::new("book_prefetch", vec![slug.to_string()])
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)?;
        for part in &self.parts {
            write!(f, ":{}", part)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rendering() {
        assert_eq!(QueryKey::testaments().to_string(), "testaments");
        assert_eq!(
            QueryKey::testament_detail("ancien-testament").to_string(),
            "testament_detail:ancien-testament"
        );
        assert_eq!(QueryKey::testament_genres(1).to_string(), "testament_genres:1");
        assert_eq!(QueryKey::books_by_genre(7).to_string(), "books_by_genre:7");
        assert_eq!(QueryKey::bible_versions().to_string(), "bible_versions");
        assert_eq!(
            QueryKey::chapter_numbers(1, "gen", "CRAMPON").to_string(),
            "chapter_numbers:1:gen:CRAMPON"
        );
        assert_eq!(
            QueryKey::verse_text("gen", 1, "CRAMPON").to_string(),
            "verseText:gen:1:CRAMPON"
        );
    }

    #[test]
    fn test_ccc_links_key_is_order_independent() {
        let ids = vec![103, 101, 102];
        let key = QueryKey::ccc_links(&ids);
        assert_eq!(key.to_string(), "cccLinks:101,102,103");
        assert_eq!(key, QueryKey::ccc_links(&[101, 102, 103]));
        // caller's order untouched
        assert_eq!(ids, vec![103, 101, 102]);
    }

    #[test]
    fn test_distinct_inputs_give_distinct_keys() {
        assert_ne!(
            QueryKey::verse_text("gen", 1, "CRAMPON"),
            QueryKey::verse_text("gen", 2, "CRAMPON")
        );
        assert_ne!(QueryKey::book_detail("gen"), QueryKey::book_prefetch("gen"));
    }
}
