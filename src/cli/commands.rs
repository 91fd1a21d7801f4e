use crate::app::{AppContext, LectioError, Result};
use crate::domain::Version;
use crate::reader::{DisplayMode, ReaderState};
use crate::route::Route;

async fn version(ctx: &AppContext, code: Option<&str>) -> Result<Version> {
    ctx.queries
        .resolve_version(code, ctx.config.library.default_version_id)
        .await
}

pub async fn list_testaments(ctx: &AppContext) -> Result<()> {
    let testaments = ctx.queries.testaments().await?;

    if testaments.is_empty() {
        println!("No testaments");
        return Ok(());
    }

    for testament in testaments.iter() {
        println!("{}\n  {}", testament.name, testament.slug);
    }
    Ok(())
}

pub async fn list_genres(ctx: &AppContext, testament_slug: &str) -> Result<()> {
    let testament = ctx.queries.testament(testament_slug).await?;
    let genres = ctx.queries.testament_genres(testament.id).await?;

    if genres.is_empty() {
        println!("No genres in {}", testament.name);
        return Ok(());
    }

    println!("{}", testament.name);
    for genre in genres.iter() {
        println!("  {} ({})", genre.name, genre.slug);
    }
    Ok(())
}

pub async fn list_books(ctx: &AppContext, genre_slug: &str) -> Result<()> {
    let genre = ctx.queries.genre(genre_slug).await?;
    let books = ctx.queries.books_by_genre(genre.id).await?;

    if books.is_empty() {
        println!("No books in {}", genre.name);
        return Ok(());
    }

    println!("{}", genre.name);
    for book in books.iter() {
        println!("  {:<24} {:<8} {}", book.title, book.abbr, book.slug);
    }
    Ok(())
}

pub async fn list_versions(ctx: &AppContext) -> Result<()> {
    let versions = ctx.queries.versions().await?;

    if versions.is_empty() {
        println!("No versions");
        return Ok(());
    }

    for v in versions.iter() {
        let marker = if v.id == ctx.config.library.default_version_id {
            "*"
        } else {
            " "
        };
        println!("{} {:<10} {}", marker, v.abbr, v.full_name);
    }
    Ok(())
}

pub async fn show_book(ctx: &AppContext, slug: &str, version_code: Option<&str>) -> Result<()> {
    let book = ctx.queries.book(slug).await?;
    let version = version(ctx, version_code).await?;
    let chapters = ctx.queries.chapter_numbers(&book, &version.abbr).await?;

    println!("{} ({})", book.title, version.abbr);
    if chapters.is_empty() {
        println!("No chapters in this version");
    } else {
        let list = chapters
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        println!("Chapters: {}", list);
    }
    Ok(())
}

pub async fn read_chapter(
    ctx: &AppContext,
    slug: &str,
    chapter: Option<u32>,
    version_code: Option<&str>,
    paragraph: bool,
) -> Result<()> {
    // warms the first chapter alongside the explicit reads below
    let prefetch = ctx.prefetcher.spawn_book_prefetch(slug);

    let book = ctx.queries.book(slug).await?;
    let version = version(ctx, version_code).await?;

    let mut state = ReaderState::new(&version.abbr);
    state.select_book(book.as_ref().clone());
    state.display_mode = if paragraph {
        DisplayMode::Paragraph
    } else {
        DisplayMode::VerseByVerse
    };

    let chapter = match chapter {
        Some(n) => n,
        None => {
            let chapters = ctx.queries.chapter_numbers(&book, &version.abbr).await?;
            chapters.first().copied().ok_or_else(|| {
                LectioError::NotFound(format!("chapters of '{}' in {}", slug, version.abbr))
            })?
        }
    };
    state.select_chapter(chapter);

    let verses = ctx.queries.verses(&book.label, chapter, &version.abbr).await?;
    if verses.is_empty() {
        return Err(LectioError::NotFound(format!(
            "{} in {}",
            state.current_reference(),
            version.abbr
        )));
    }

    let ids: Vec<i64> = verses.iter().map(|v| v.id).collect();
    let links = match ctx.queries.catechism_links(&ids).await {
        Ok(links) => Some(links),
        Err(e) => {
            tracing::warn!("Catechism references unavailable: {}", e);
            None
        }
    };

    println!("{} ({})\n", state.current_reference(), version.abbr);
    println!(
        "{}",
        state.render(&verses, |id| links
            .as_ref()
            .and_then(|l| l.get(&id))
            .map(Vec::as_slice))
    );

    if let Err(e) = prefetch.await {
        tracing::error!("Prefetch task failed: {}", e);
    }
    Ok(())
}

pub async fn open_path(ctx: &AppContext, path: &str) -> Result<()> {
    let route = Route::parse(path)?;
    let version = version(ctx, None).await?;
    let resolved = route.resolve(&ctx.queries, &version).await?;

    println!("Testament: {}", resolved.testament.name);
    if let Some(genre) = &resolved.genre {
        println!("Genre:     {}", genre.name);
    }
    if let Some(book) = &resolved.book {
        println!("Book:      {} [{}]", book.title, book.label);
    }
    if let Some(chapter) = resolved.chapter {
        println!("Chapter:   {} ({})", chapter, version.abbr);
    }
    Ok(())
}

pub async fn prefetch_book(ctx: &AppContext, slug: &str) -> Result<()> {
    let book = ctx.prefetcher.prefetch_book(slug).await?;
    println!("Prefetched {}", book.title);

    for key in ctx.cache.keys() {
        println!("  {}", key);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::catalog::fixtures;
    use crate::config::Config;
    use crate::query::QueryKey;

    fn context() -> AppContext {
        AppContext::with_client(Config::default(), Arc::new(fixtures::client()))
    }

    #[tokio::test]
    async fn test_listing_commands() {
        let ctx = context();
        assert!(list_testaments(&ctx).await.is_ok());
        assert!(list_genres(&ctx, "ancien-testament").await.is_ok());
        assert!(list_books(&ctx, "pentateuque").await.is_ok());
        assert!(list_versions(&ctx).await.is_ok());
        assert!(show_book(&ctx, "gen", Some("CRAMPON")).await.is_ok());
    }

    #[tokio::test]
    async fn test_read_defaults_to_first_chapter() {
        let ctx = context();
        read_chapter(&ctx, "gen", None, None, false).await.unwrap();

        assert!(ctx.cache.contains(&QueryKey::verse_text("gen", 1, "CRAMPON")));
        assert!(ctx.cache.contains(&QueryKey::ccc_links(&[101, 102, 103])));
    }

    #[tokio::test]
    async fn test_read_missing_chapter_is_not_found() {
        let ctx = context();
        let err = read_chapter(&ctx, "gen", Some(12), None, true)
            .await
            .unwrap_err();
        assert!(matches!(err, LectioError::NotFound(ref m) if m.contains("Genèse 12")));
    }

    #[tokio::test]
    async fn test_unknown_version_is_reported() {
        let ctx = context();
        let err = show_book(&ctx, "gen", Some("KJV")).await.unwrap_err();
        assert!(matches!(err, LectioError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_open_and_prefetch() {
        let ctx = context();
        open_path(&ctx, "/nouveau-testament/epitres/1co/13")
            .await
            .unwrap();
        prefetch_book(&ctx, "1co").await.unwrap();

        assert!(ctx.cache.contains(&QueryKey::book_prefetch("1co")));
    }
}
