//! Cached reads of the Bible catalog, one definition per cache key.
//!
//! Each `*_def` builds the [`QueryDef`] for a key family; the plain async
//! methods read through the cache once, the `*_query` methods hand out
//! reactive [`Query`] handles over the same definitions. Queries that are not
//! parameterised by language resolve the configured one inside the loader.

use std::sync::Arc;

use futures::FutureExt;

use crate::app::{LectioError, Result};
use crate::catalog::Catalog;
use crate::domain::{
    BookDetail, BookSummary, CatechismLinks, GenreDetail, GenreTranslation, TestamentDetail,
    TestamentTranslation, Verse, Version,
};
use crate::query::{Query, QueryCache, QueryDef, QueryInput, QueryKey, QueryOptions};

pub const BOOK_DETAIL_OPTIONS: QueryOptions = QueryOptions::minutes(5, 30);
pub const VERSIONS_OPTIONS: QueryOptions = QueryOptions::minutes(10, 30);
pub const CHAPTER_NUMBERS_OPTIONS: QueryOptions = QueryOptions::minutes(10, 30);
pub const VERSE_TEXT_OPTIONS: QueryOptions = QueryOptions::minutes(5, 30);
pub const CCC_LINKS_OPTIONS: QueryOptions = QueryOptions::minutes(10, 30);
pub const BOOK_PREFETCH_OPTIONS: QueryOptions = QueryOptions::minutes(1, 30);

/// Chapter numbers are keyed by book id as well as label.
pub type ChapterInput = (i64, String, String);
pub type VerseInput = (String, u32, String);

#[derive(Clone)]
pub struct BibleQueries {
    cache: QueryCache,
    catalog: Arc<Catalog>,
    defaults: QueryOptions,
}

impl BibleQueries {
    pub fn new(cache: QueryCache, catalog: Arc<Catalog>, defaults: QueryOptions) -> Self {
        Self {
            cache,
            catalog,
            defaults,
        }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Read one value through the cache.
    pub async fn get<I, T>(&self, def: &QueryDef<I, T>, input: I) -> Result<Arc<T>>
    where
        I: QueryInput,
        T: Send + Sync + 'static,
    {
        let key = def.key(&input);
        let def = def.clone();
        self.cache
            .fetch(&key, def.options(), move || def.load(input))
            .await
    }

    pub fn testaments_def(&self) -> QueryDef<(), Vec<TestamentTranslation>> {
        let catalog = self.catalog.clone();
        QueryDef::new(|_| QueryKey::testaments(), self.defaults, move |()| {
            let catalog = catalog.clone();
            async move {
                let lang_id = catalog.default_language_id().await?;
                catalog.list_testaments(lang_id).await
            }
            .boxed()
        })
    }

    pub fn testament_def(&self) -> QueryDef<String, TestamentDetail> {
        let catalog = self.catalog.clone();
        QueryDef::new(
            |slug| QueryKey::testament_detail(slug),
            self.defaults,
            move |slug: String| {
                let catalog = catalog.clone();
                async move {
                    let lang_id = catalog.default_language_id().await?;
                    catalog.get_testament_by_slug(&slug, lang_id).await
                }
                .boxed()
            },
        )
    }

    pub fn testament_genres_def(&self) -> QueryDef<i64, Vec<GenreTranslation>> {
        let catalog = self.catalog.clone();
        QueryDef::new(
            |id| QueryKey::testament_genres(*id),
            self.defaults,
            move |testament_id: i64| {
                let catalog = catalog.clone();
                async move {
                    let lang_id = catalog.default_language_id().await?;
                    catalog.list_genres_for_testament(testament_id, lang_id).await
                }
                .boxed()
            },
        )
    }

    pub fn genre_def(&self) -> QueryDef<String, GenreDetail> {
        let catalog = self.catalog.clone();
        QueryDef::new(
            |slug| QueryKey::genre_detail(slug),
            self.defaults,
            move |slug: String| {
                let catalog = catalog.clone();
                async move {
                    let lang_id = catalog.default_language_id().await?;
                    catalog.get_genre_by_slug(&slug, lang_id).await
                }
                .boxed()
            },
        )
    }

    pub fn books_by_genre_def(&self) -> QueryDef<i64, Vec<BookSummary>> {
        let catalog = self.catalog.clone();
        QueryDef::new(
            |id| QueryKey::books_by_genre(*id),
            self.defaults,
            move |genre_id: i64| {
                let catalog = catalog.clone();
                async move {
                    let lang_id = catalog.default_language_id().await?;
                    catalog.list_books_by_genre(genre_id, lang_id).await
                }
                .boxed()
            },
        )
    }

    pub fn book_def(&self) -> QueryDef<String, BookDetail> {
        let catalog = self.catalog.clone();
        QueryDef::new(
            |slug| QueryKey::book_detail(slug),
            BOOK_DETAIL_OPTIONS,
            move |slug: String| {
                let catalog = catalog.clone();
                async move {
                    let lang_id = catalog.default_language_id().await?;
                    catalog.get_book_by_slug(&slug, lang_id).await
                }
                .boxed()
            },
        )
    }

    pub fn versions_def(&self) -> QueryDef<(), Vec<Version>> {
        let catalog = self.catalog.clone();
        QueryDef::new(|_| QueryKey::bible_versions(), VERSIONS_OPTIONS, move |()| {
            let catalog = catalog.clone();
            async move {
                let lang_id = catalog.default_language_id().await?;
                catalog.list_versions(lang_id).await
            }
            .boxed()
        })
    }

    pub fn chapter_numbers_def(&self) -> QueryDef<ChapterInput, Vec<u32>> {
        let catalog = self.catalog.clone();
        QueryDef::new(
            |(book_id, label, code)| QueryKey::chapter_numbers(*book_id, label, code),
            CHAPTER_NUMBERS_OPTIONS,
            move |(_, label, code): ChapterInput| {
                let catalog = catalog.clone();
                async move { catalog.list_chapter_numbers(&label, &code).await }.boxed()
            },
        )
    }

    pub fn verses_def(&self) -> QueryDef<VerseInput, Vec<Verse>> {
        let catalog = self.catalog.clone();
        QueryDef::new(
            |(label, chapter, code)| QueryKey::verse_text(label, *chapter, code),
            VERSE_TEXT_OPTIONS,
            move |(label, chapter, code): VerseInput| {
                let catalog = catalog.clone();
                async move { catalog.list_verses_for_chapter(&label, chapter, &code).await }
                    .boxed()
            },
        )
    }

    pub fn catechism_links_def(&self) -> QueryDef<Vec<i64>, CatechismLinks> {
        let catalog = self.catalog.clone();
        QueryDef::new(
            |ids| QueryKey::ccc_links(ids),
            CCC_LINKS_OPTIONS,
            move |ids: Vec<i64>| {
                let catalog = catalog.clone();
                async move { catalog.get_catechism_links(&ids).await }.boxed()
            },
        )
    }

    pub async fn testaments(&self) -> Result<Arc<Vec<TestamentTranslation>>> {
        self.get(&self.testaments_def(), ()).await
    }

    pub async fn testament(&self, slug: &str) -> Result<Arc<TestamentDetail>> {
        self.get(&self.testament_def(), slug.to_string()).await
    }

    pub async fn testament_genres(
        &self,
        testament_id: i64,
    ) -> Result<Arc<Vec<GenreTranslation>>> {
        self.get(&self.testament_genres_def(), testament_id).await
    }

    pub async fn genre(&self, slug: &str) -> Result<Arc<GenreDetail>> {
        self.get(&self.genre_def(), slug.to_string()).await
    }

    pub async fn books_by_genre(&self, genre_id: i64) -> Result<Arc<Vec<BookSummary>>> {
        self.get(&self.books_by_genre_def(), genre_id).await
    }

    pub async fn book(&self, slug: &str) -> Result<Arc<BookDetail>> {
        self.get(&self.book_def(), slug.to_string()).await
    }

    pub async fn versions(&self) -> Result<Arc<Vec<Version>>> {
        self.get(&self.versions_def(), ()).await
    }

    pub async fn chapter_numbers(
        &self,
        book: &BookDetail,
        version_code: &str,
    ) -> Result<Arc<Vec<u32>>> {
        let input = (book.id, book.label.clone(), version_code.to_string());
        self.get(&self.chapter_numbers_def(), input).await
    }

    pub async fn verses(
        &self,
        book_label: &str,
        chapter: u32,
        version_code: &str,
    ) -> Result<Arc<Vec<Verse>>> {
        let input = (book_label.to_string(), chapter, version_code.to_string());
        self.get(&self.verses_def(), input).await
    }

    pub async fn catechism_links(&self, verse_ids: &[i64]) -> Result<Arc<CatechismLinks>> {
        self.get(&self.catechism_links_def(), verse_ids.to_vec()).await
    }

    /// Pick a version by code (case-insensitive), else by id, else the first listed.
    pub async fn resolve_version(&self, code: Option<&str>, default_id: i64) -> Result<Version> {
        let versions = self.versions().await?;
        match code {
            Some(code) => versions
                .iter()
                .find(|v| v.abbr.eq_ignore_ascii_case(code))
                .cloned()
                .ok_or_else(|| LectioError::NotFound(format!("version '{}' not found", code))),
            None => choose_version(&versions, default_id)
                .cloned()
                .ok_or_else(|| LectioError::NotFound("no Bible versions available".into())),
        }
    }

    pub fn testaments_query(&self) -> Query<(), Vec<TestamentTranslation>> {
        Query::with_initial_data(self.cache.clone(), self.testaments_def(), Vec::new())
    }

    pub fn testament_query(&self) -> Query<String, TestamentDetail> {
        Query::new(self.cache.clone(), self.testament_def())
    }

    pub fn testament_genres_query(&self) -> Query<i64, Vec<GenreTranslation>> {
        Query::with_initial_data(self.cache.clone(), self.testament_genres_def(), Vec::new())
    }

    pub fn genre_query(&self) -> Query<String, GenreDetail> {
        Query::new(self.cache.clone(), self.genre_def())
    }

    pub fn books_by_genre_query(&self) -> Query<i64, Vec<BookSummary>> {
        Query::with_initial_data(self.cache.clone(), self.books_by_genre_def(), Vec::new())
    }

    pub fn book_query(&self) -> Query<String, BookDetail> {
        Query::new(self.cache.clone(), self.book_def())
    }

    pub fn versions_query(&self) -> Query<(), Vec<Version>> {
        Query::with_initial_data(self.cache.clone(), self.versions_def(), Vec::new())
    }

    pub fn chapter_numbers_query(&self) -> Query<ChapterInput, Vec<u32>> {
        Query::with_initial_data(self.cache.clone(), self.chapter_numbers_def(), Vec::new())
    }

    pub fn verses_query(&self) -> Query<VerseInput, Vec<Verse>> {
        Query::with_initial_data(self.cache.clone(), self.verses_def(), Vec::new())
    }

    pub fn catechism_links_query(&self) -> Query<Vec<i64>, CatechismLinks> {
        Query::with_initial_data(
            self.cache.clone(),
            self.catechism_links_def(),
            CatechismLinks::new(),
        )
    }
}

/// The version with `default_id` if listed, otherwise the first one.
pub fn choose_version(versions: &[Version], default_id: i64) -> Option<&Version> {
    versions
        .iter()
        .find(|v| v.id == default_id)
        .or_else(|| versions.first())
}
