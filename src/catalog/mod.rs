//! Domain access: typed reads of the Bible tables.
//!
//! Every function validates its identifiers, issues one or more remote calls
//! and maps the rows into domain types. Nothing here caches results except
//! the language-name → id map, which is immutable for the process lifetime.

mod language;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use crate::app::{LectioError, Result};
use crate::config::{LibraryConfig, LinkStrategy};
use crate::domain::book::label_source;
use crate::domain::{
    normalize_label, BookDetail, BookSummary, CatechismLinks, GenreDetail, GenreTranslation,
    TestamentDetail, TestamentTranslation, Verse, Version,
};
use crate::remote::{decode_rows, decode_single, RemoteClient, TableQuery, CCC_LINKS_PROCEDURE};

pub use language::LanguageCache;

#[derive(Debug, Deserialize)]
struct BookRow {
    book_id: i64,
    bible_order: i64,
}

#[derive(Debug, Deserialize)]
struct BookTranslationRow {
    book_id: i64,
    title: String,
    abbr: String,
    #[serde(default)]
    alt_abbr: Option<String>,
    #[serde(default)]
    slug: Option<String>,
}

impl BookTranslationRow {
    fn label(&self) -> String {
        normalize_label(label_source(&self.abbr, self.alt_abbr.as_deref()))
    }
}

#[derive(Debug, Deserialize)]
struct GenreIdRow {
    genre_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ChapterNumberRow {
    chapter_number: u32,
}

#[derive(Debug, Deserialize)]
struct CccLinkRow {
    verse_id: i64,
    ccc_nums: Option<Vec<i64>>,
}

#[derive(Debug, Deserialize)]
struct VerseReferenceRow {
    id: i64,
    reference_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct IndexRow {
    reference_id: i64,
    ccc_num: Option<i64>,
}

pub struct Catalog {
    client: Arc<dyn RemoteClient + Send + Sync>,
    languages: LanguageCache,
    language: String,
    link_strategy: LinkStrategy,
}

impl Catalog {
    pub fn new(client: Arc<dyn RemoteClient + Send + Sync>, library: &LibraryConfig) -> Self {
        Self {
            client,
            languages: LanguageCache::new(),
            language: library.language.clone(),
            link_strategy: library.catechism_links,
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Look up a language id by name, hitting the backend once per name.
    pub async fn resolve_language_id(&self, name: &str) -> Result<i64> {
        require("language name", name)?;
        if let Some(id) = self.languages.get(name) {
            return Ok(id);
        }

        tracing::debug!("Fetching language id for {}", name);
        let query = TableQuery::from("languages")
            .select("lang_id")
            .eq("lang", name)
            .single();
        let rows = self
            .client
            .query(&query)
            .await
            .map_err(|e| not_found_as(e, || format!("language '{}'", name)))?;

        #[derive(Deserialize)]
        struct LangIdRow {
            lang_id: i64,
        }
        let row: LangIdRow = decode_single(rows)?;
        self.languages.insert(name, row.lang_id);
        Ok(row.lang_id)
    }

    /// Id of the configured reading language.
    pub async fn default_language_id(&self) -> Result<i64> {
        self.resolve_language_id(&self.language).await
    }

    pub async fn list_testaments(&self, lang_id: i64) -> Result<Vec<TestamentTranslation>> {
        let query = TableQuery::from("bible_testament_translations")
            .select("testament_id,lang_id,name,slug")
            .eq("lang_id", lang_id)
            .order("testament_id");
        decode_rows(self.client.query(&query).await?)
    }

    pub async fn get_testament_by_slug(&self, slug: &str, lang_id: i64) -> Result<TestamentDetail> {
        require("testament slug", slug)?;
        let query = TableQuery::from("bible_testament_translations")
            .select("name,testament_id")
            .eq("slug", slug)
            .eq("lang_id", lang_id)
            .single();
        let rows = self
            .client
            .query(&query)
            .await
            .map_err(|e| not_found_as(e, || format!("testament with slug '{}'", slug)))?;
        decode_single(rows)
    }

    /// Genres of the books in a testament.
    ///
    /// Two phases: distinct genre ids of the testament's books, then their
    /// translations. A testament without genre-tagged books yields an empty
    /// list and no second call.
    pub async fn list_genres_for_testament(
        &self,
        testament_id: i64,
        lang_id: i64,
    ) -> Result<Vec<GenreTranslation>> {
        let query = TableQuery::from("bible_books")
            .select("genre_id")
            .eq("testament_id", testament_id)
            .not_null("genre_id");
        let rows: Vec<GenreIdRow> = decode_rows(self.client.query(&query).await?)?;

        let genre_ids: BTreeSet<i64> = rows.into_iter().filter_map(|r| r.genre_id).collect();
        if genre_ids.is_empty() {
            tracing::debug!("No genres found for testament {}", testament_id);
            return Ok(Vec::new());
        }

        let query = TableQuery::from("bible_genre_translations")
            .select("genre_id,lang_id,name,slug")
            .is_in("genre_id", genre_ids)
            .eq("lang_id", lang_id)
            .order("genre_id");
        decode_rows(self.client.query(&query).await?)
    }

    pub async fn get_genre_by_slug(&self, slug: &str, lang_id: i64) -> Result<GenreDetail> {
        require("genre slug", slug)?;
        let query = TableQuery::from("bible_genre_translations")
            .select("name,genre_id")
            .eq("slug", slug)
            .eq("lang_id", lang_id)
            .single();
        let rows = self
            .client
            .query(&query)
            .await
            .map_err(|e| not_found_as(e, || format!("genre with slug '{}'", slug)))?;
        decode_single(rows)
    }

    /// Books of a genre in canonical order, joined to their translation.
    /// Books without a translation in the language, or without a slug to
    /// open them by, are left out.
    pub async fn list_books_by_genre(
        &self,
        genre_id: i64,
        lang_id: i64,
    ) -> Result<Vec<BookSummary>> {
        let query = TableQuery::from("bible_books")
            .select("book_id,bible_order")
            .eq("genre_id", genre_id)
            .order("bible_order");
        let books: Vec<BookRow> = decode_rows(self.client.query(&query).await?)?;
        if books.is_empty() {
            return Ok(Vec::new());
        }

        let query = TableQuery::from("bible_book_translations")
            .select("book_id,title,abbr,alt_abbr,slug")
            .is_in("book_id", books.iter().map(|b| b.book_id))
            .eq("lang_id", lang_id);
        let translations: Vec<BookTranslationRow> =
            decode_rows(self.client.query(&query).await?)?;
        let mut by_book: HashMap<i64, BookTranslationRow> = translations
            .into_iter()
            .map(|t| (t.book_id, t))
            .collect();

        Ok(books
            .into_iter()
            .filter_map(|book| {
                let translation = by_book.remove(&book.book_id)?;
                let label = translation.label();
                let Some(slug) = translation.slug else {
                    tracing::debug!("Skipping book {} without a slug", book.book_id);
                    return None;
                };
                Some(BookSummary {
                    id: book.book_id,
                    bible_order: book.bible_order,
                    slug,
                    title: translation.title,
                    abbr: translation.abbr,
                    label,
                })
            })
            .collect())
    }

    pub async fn get_book_by_slug(&self, slug: &str, lang_id: i64) -> Result<BookDetail> {
        require("book slug", slug)?;
        let query = TableQuery::from("bible_book_translations")
            .select("book_id,title,abbr,alt_abbr")
            .eq("slug", slug)
            .eq("lang_id", lang_id)
            .single();
        let rows = self
            .client
            .query(&query)
            .await
            .map_err(|e| not_found_as(e, || format!("book with slug '{}'", slug)))?;
        let row: BookTranslationRow = decode_single(rows)?;

        Ok(BookDetail {
            id: row.book_id,
            label: row.label(),
            title: row.title,
        })
    }

    pub async fn list_versions(&self, lang_id: i64) -> Result<Vec<Version>> {
        let query = TableQuery::from("bible_versions")
            .select("version_id,abbr,full_name,lang_id")
            .eq("lang_id", lang_id)
            .order("abbr");
        decode_rows(self.client.query(&query).await?)
    }

    /// Ascending, de-duplicated chapter numbers that have verses in a version.
    pub async fn list_chapter_numbers(
        &self,
        book_label: &str,
        version_code: &str,
    ) -> Result<Vec<u32>> {
        require("book label", book_label)?;
        require("version code", version_code)?;

        let query = TableQuery::from("bible_content_units")
            .select("chapter_number")
            .eq("unit_type", "verse")
            .eq("book_label", book_label)
            .eq("version_code", version_code)
            .order("chapter_number");
        let rows: Vec<ChapterNumberRow> = decode_rows(self.client.query(&query).await?)?;

        let chapters: BTreeSet<u32> = rows.into_iter().map(|r| r.chapter_number).collect();
        Ok(chapters.into_iter().collect())
    }

    pub async fn list_verses_for_chapter(
        &self,
        book_label: &str,
        chapter: u32,
        version_code: &str,
    ) -> Result<Vec<Verse>> {
        require("book label", book_label)?;
        require("version code", version_code)?;
        if chapter == 0 {
            return Err(LectioError::Validation(format!(
                "chapter number for '{}' must be positive",
                book_label
            )));
        }

        let query = TableQuery::from("bible_content_units")
            .select("id,book_label,version_code,chapter_number,verse_number,sort_key,path,content")
            .eq("unit_type", "verse")
            .eq("book_label", book_label)
            .eq("chapter_number", chapter)
            .eq("version_code", version_code)
            .order("sort_key");
        decode_rows(self.client.query(&query).await?)
    }

    /// Catechism paragraphs cited for each verse.
    ///
    /// Empty input returns an empty map without a remote call. Duplicate ids
    /// are collapsed before the call. Verses without links are absent.
    pub async fn get_catechism_links(&self, verse_ids: &[i64]) -> Result<CatechismLinks> {
        if verse_ids.is_empty() {
            return Ok(CatechismLinks::new());
        }
        let unique: Vec<i64> = verse_ids
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let links = match self.link_strategy {
            LinkStrategy::Rpc => self.catechism_links_via_rpc(&unique).await?,
            LinkStrategy::Join => self.catechism_links_via_join(&unique).await?,
        };
        tracing::debug!(
            "Catechism links for {} verse ids: {} linked",
            unique.len(),
            links.len()
        );
        Ok(links)
    }

    async fn catechism_links_via_rpc(&self, verse_ids: &[i64]) -> Result<CatechismLinks> {
        let rows = self
            .client
            .call(CCC_LINKS_PROCEDURE, json!({ "target_verse_ids": verse_ids }))
            .await?;
        let rows: Vec<CccLinkRow> = decode_rows(rows)?;

        Ok(rows
            .into_iter()
            .filter_map(|row| match row.ccc_nums {
                Some(nums) if !nums.is_empty() && verse_ids.contains(&row.verse_id) => {
                    Some((row.verse_id, nums))
                }
                _ => None,
            })
            .collect())
    }

    async fn catechism_links_via_join(&self, verse_ids: &[i64]) -> Result<CatechismLinks> {
        let query = TableQuery::from("bible_content_units")
            .select("id,reference_id")
            .is_in("id", verse_ids.iter())
            .not_null("reference_id");
        let refs: Vec<VerseReferenceRow> = decode_rows(self.client.query(&query).await?)?;

        let verse_to_reference: HashMap<i64, i64> = refs
            .into_iter()
            .filter_map(|r| r.reference_id.map(|reference| (r.id, reference)))
            .collect();
        if verse_to_reference.is_empty() {
            return Ok(CatechismLinks::new());
        }

        let reference_ids: BTreeSet<i64> = verse_to_reference.values().copied().collect();
        let query = TableQuery::from("catechism_bible_index")
            .select("reference_id,ccc_num")
            .is_in("reference_id", reference_ids);
        let index: Vec<IndexRow> = decode_rows(self.client.query(&query).await?)?;

        let mut paragraphs: HashMap<i64, Vec<i64>> = HashMap::new();
        for entry in index {
            if let Some(num) = entry.ccc_num {
                paragraphs.entry(entry.reference_id).or_default().push(num);
            }
        }

        Ok(verse_ids
            .iter()
            .filter_map(|verse_id| {
                let reference = verse_to_reference.get(verse_id)?;
                let nums = paragraphs.get(reference).filter(|n| !n.is_empty())?;
                Some((*verse_id, nums.clone()))
            })
            .collect())
    }
}

fn require(what: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(LectioError::Validation(format!("{} is required", what)));
    }
    Ok(())
}

/// Reword a backend "no rows" error with the identifier that was looked up.
fn not_found_as(err: LectioError, what: impl FnOnce() -> String) -> LectioError {
    match err {
        LectioError::NotFound(_) => LectioError::NotFound(format!("{} not found", what())),
        other => other,
    }
}
