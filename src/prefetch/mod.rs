//! Warms the cache for a book before the reader opens it.
//!
//! The sequence is book detail → versions → chapter numbers → first chapter's
//! verses → their Catechism links. Only the book detail is required; later
//! steps that fail are logged and the book is still returned.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::app::{LectioError, Result};
use crate::domain::BookDetail;
use crate::query::bible::{choose_version, BOOK_PREFETCH_OPTIONS};
use crate::query::{BibleQueries, QueryKey};

#[derive(Clone)]
pub struct Prefetcher {
    queries: BibleQueries,
    default_version_id: i64,
}

impl Prefetcher {
    pub fn new(queries: BibleQueries, default_version_id: i64) -> Self {
        Self {
            queries,
            default_version_id,
        }
    }

    /// Run the sequence for `slug`, cached for a minute under `book_prefetch:{slug}`.
    pub async fn prefetch_book(&self, slug: &str) -> Result<Arc<BookDetail>> {
        if slug.trim().is_empty() {
            return Err(LectioError::Validation("book slug is required".into()));
        }

        let key = QueryKey::book_prefetch(slug);
        let sequencer = self.clone();
        let slug = slug.to_string();
        self.queries
            .cache()
            .fetch(&key, BOOK_PREFETCH_OPTIONS, move || async move {
                sequencer.run(&slug).await
            })
            .await
    }

    /// Fire-and-forget variant for hover/focus triggers.
    pub fn spawn_book_prefetch(&self, slug: &str) -> JoinHandle<()> {
        let prefetcher = self.clone();
        let slug = slug.to_string();
        tokio::spawn(async move {
            if let Err(e) = prefetcher.prefetch_book(&slug).await {
                tracing::warn!("Prefetch of {} failed: {}", slug, e);
            }
        })
    }

    async fn run(&self, slug: &str) -> Result<BookDetail> {
        tracing::debug!("Prefetching book {}", slug);
        let book = self.queries.book(slug).await?;

        if let Err(e) = self.warm_first_chapter(&book).await {
            tracing::warn!("{}", e);
        }
        Ok(book.as_ref().clone())
    }

    async fn warm_first_chapter(&self, book: &BookDetail) -> Result<()> {
        let versions = self.queries.versions().await.map_err(partial("versions"))?;
        let Some(version) = choose_version(&versions, self.default_version_id) else {
            tracing::info!("No versions available, skipping chapter prefetch for {}", book.label);
            return Ok(());
        };

        let chapters = self
            .queries
            .chapter_numbers(book, &version.abbr)
            .await
            .map_err(partial("chapter_numbers"))?;
        let Some(&first) = chapters.first() else {
            tracing::debug!("{} has no chapters in {}", book.label, version.abbr);
            return Ok(());
        };

        let verses = self
            .queries
            .verses(&book.label, first, &version.abbr)
            .await
            .map_err(partial("verses"))?;
        if verses.is_empty() {
            return Ok(());
        }

        let mut verse_ids: Vec<i64> = verses.iter().map(|v| v.id).collect();
        verse_ids.sort_unstable();
        self.queries
            .catechism_links(&verse_ids)
            .await
            .map_err(partial("catechism_links"))?;

        tracing::debug!(
            "Prefetched {} {} chapter {} ({} verses)",
            book.label,
            version.abbr,
            first,
            verses.len()
        );
        Ok(())
    }
}

fn partial(step: &'static str) -> impl FnOnce(LectioError) -> LectioError {
    move |source| LectioError::Prefetch {
        step,
        source: Box::new(source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{fixtures, Catalog};
    use crate::config::LibraryConfig;
    use crate::query::{QueryCache, QueryOptions};
    use crate::remote::CCC_LINKS_PROCEDURE;
    use crate::remote::MemoryClient;

    fn setup() -> (Arc<MemoryClient>, QueryCache, Prefetcher) {
        let client = Arc::new(fixtures::client());
        let catalog = Arc::new(Catalog::new(client.clone(), &LibraryConfig::default()));
        let cache = QueryCache::new();
        let queries = BibleQueries::new(cache.clone(), catalog, QueryOptions::default());
        (client, cache, Prefetcher::new(queries, 1))
    }

    fn keys(cache: &QueryCache) -> Vec<String> {
        cache.keys().iter().map(|k| k.to_string()).collect()
    }

    #[tokio::test]
    async fn test_prefetch_populates_first_chapter_only() {
        let (_, cache, prefetcher) = setup();

        let book = prefetcher.prefetch_book("gen").await.unwrap();

        assert_eq!(book.label, "gen");
        assert_eq!(
            keys(&cache),
            vec![
                "bible_versions",
                "book_detail:gen",
                "book_prefetch:gen",
                "cccLinks:101,102,103",
                "chapter_numbers:1:gen:CRAMPON",
                "verseText:gen:1:CRAMPON",
            ]
        );
        assert!(!cache.contains(&QueryKey::verse_text("gen", 2, "CRAMPON")));
    }

    #[tokio::test]
    async fn test_catechism_failure_keeps_book_and_verses() {
        let (client, cache, prefetcher) = setup();
        client.fail(CCC_LINKS_PROCEDURE, "function timed out");

        let book = prefetcher.prefetch_book("exo").await.unwrap();

        assert_eq!(book.title, "Exode");
        assert!(cache.contains(&QueryKey::verse_text("ex", 1, "CRAMPON")));
        assert!(!cache.contains(&QueryKey::ccc_links(&[401, 402])));
    }

    #[tokio::test]
    async fn test_unknown_book_fails() {
        let (_, cache, prefetcher) = setup();

        let err = prefetcher.prefetch_book("tobit").await.unwrap_err();

        assert!(matches!(err, LectioError::NotFound(ref m) if m.contains("tobit")));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_version_failure_stops_after_book() {
        let (client, cache, prefetcher) = setup();
        client.fail("bible_versions", "connection reset");

        let book = prefetcher.prefetch_book("gen").await.unwrap();

        assert_eq!(book.id, 1);
        assert_eq!(keys(&cache), vec!["book_detail:gen", "book_prefetch:gen"]);
    }

    #[tokio::test]
    async fn test_repeat_prefetch_is_cached() {
        let (client, _, prefetcher) = setup();

        prefetcher.prefetch_book("gen").await.unwrap();
        let calls = client.call_count();
        prefetcher.prefetch_book("gen").await.unwrap();

        assert_eq!(client.call_count(), calls);
    }

    #[tokio::test]
    async fn test_spawned_prefetch_warms_cache() {
        let (_, cache, prefetcher) = setup();

        prefetcher.spawn_book_prefetch("1co").await.unwrap();

        assert!(cache.contains(&QueryKey::verse_text("b1_cor", 13, "CRAMPON")));
    }

    #[tokio::test]
    async fn test_blank_slug_rejected() {
        let (client, _, prefetcher) = setup();
        let err = prefetcher.prefetch_book(" ").await.unwrap_err();
        assert!(matches!(err, LectioError::Validation(_)));
        assert_eq!(client.call_count(), 0);
    }
}
