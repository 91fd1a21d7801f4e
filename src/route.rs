//! Reader paths: `/{testament}[/{genre}[/{book}[/{chapter}]]]`.
//!
//! Parsing only checks shape. Resolution walks the segments through the
//! cached queries and rejects any segment that does not belong under its
//! parent.

use std::fmt;
use std::str::FromStr;

use crate::app::{LectioError, Result};
use crate::domain::{BookDetail, GenreDetail, TestamentDetail, Version};
use crate::query::BibleQueries;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub testament: String,
    pub genre: Option<String>,
    pub book: Option<String>,
    pub chapter: Option<u32>,
}

impl Route {
    pub fn parse(path: &str) -> Result<Self> {
        let segments: Vec<&str> = path
            .trim()
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        if segments.is_empty() {
            return Err(LectioError::Validation("path needs at least a testament".into()));
        }
        if segments.len() > 4 {
            return Err(LectioError::Validation(format!(
                "path '{}' has too many segments",
                path
            )));
        }

        let chapter = match segments.get(3) {
            Some(raw) => match raw.parse::<u32>() {
                Ok(n) if n > 0 => Some(n),
                _ => {
                    return Err(LectioError::Validation(format!(
                        "chapter '{}' is not a positive number",
                        raw
                    )))
                }
            },
            None => None,
        };

        Ok(Self {
            testament: segments[0].to_string(),
            genre: segments.get(1).map(|s| s.to_string()),
            book: segments.get(2).map(|s| s.to_string()),
            chapter,
        })
    }

    /// Look up every segment and check each belongs to its parent.
    pub async fn resolve(
        &self,
        queries: &BibleQueries,
        version: &Version,
    ) -> Result<ResolvedRoute> {
        let testament = queries.testament(&self.testament).await?;
        let mut resolved = ResolvedRoute {
            testament: testament.as_ref().clone(),
            genre: None,
            book: None,
            chapter: None,
        };

        let Some(genre_slug) = &self.genre else {
            return Ok(resolved);
        };
        let genre = queries.genre(genre_slug).await?;
        let genres = queries.testament_genres(testament.id).await?;
        if !genres.iter().any(|g| g.genre_id == genre.id) {
            return Err(LectioError::NotFound(format!(
                "genre '{}' in testament '{}'",
                genre_slug, self.testament
            )));
        }
        resolved.genre = Some(genre.as_ref().clone());

        let Some(book_slug) = &self.book else {
            return Ok(resolved);
        };
        let book = queries.book(book_slug).await?;
        let books = queries.books_by_genre(genre.id).await?;
        if !books.iter().any(|b| b.id == book.id) {
            return Err(LectioError::NotFound(format!(
                "book '{}' in genre '{}'",
                book_slug, genre_slug
            )));
        }

        if let Some(chapter) = self.chapter {
            let chapters = queries.chapter_numbers(&book, &version.abbr).await?;
            if !chapters.contains(&chapter) {
                return Err(LectioError::NotFound(format!(
                    "chapter {} of '{}' in {}",
                    chapter, book_slug, version.abbr
                )));
            }
            resolved.chapter = Some(chapter);
        }
        resolved.book = Some(book.as_ref().clone());

        Ok(resolved)
    }
}

impl FromStr for Route {
    type Err = LectioError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.testament)?;
        if let Some(genre) = &self.genre {
            write!(f, "/{}", genre)?;
        }
        if let Some(book) = &self.book {
            write!(f, "/{}", book)?;
        }
        if let Some(chapter) = self.chapter {
            write!(f, "/{}", chapter)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoute {
    pub testament: TestamentDetail,
    pub genre: Option<GenreDetail>,
    pub book: Option<BookDetail>,
    pub chapter: Option<u32>,
}
