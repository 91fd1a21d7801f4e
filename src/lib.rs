//! # Lectio
//!
//! A reading client for biblical text with Catechism cross-references,
//! backed by a PostgREST endpoint.
//!
//! ## Architecture
//!
//! ```text
//! Remote client → Catalog → Query cache → Prefetcher / Reader / CLI
//! ```
//!
//! - [`remote`]: PostgREST client and an in-memory backend for offline datasets
//! - [`catalog`]: Typed reads of testaments, genres, books, versions and verses
//! - [`query`]: Shared cache with staleness, coalescing and garbage collection
//! - [`prefetch`]: Warms the cache for a book's first chapter
//!
//! ## Quick Start
//!
//! ```bash
//! export LECTIO_URL=https://your-project.supabase.co
//! export LECTIO_API_KEY=...
//!
//! # Browse
//! lectio testaments
//! lectio genres ancien-testament
//! lectio books pentateuque
//!
//! # Read Genesis 1 with Catechism references
//! lectio read gen 1
//! ```

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires together the remote
/// client, catalog, query cache and prefetcher.
pub mod app;

/// Catalog reads over the remote client.
///
/// - [`Catalog`](catalog::Catalog): one async function per entity lookup
/// - language ids are resolved once per process
pub mod catalog;

/// Command-line interface using clap.
///
/// - `testaments`, `genres <testament>`, `books <genre>`, `versions`
/// - `book <slug>` - chapters of a book
/// - `read <book> [chapter]` - verses with Catechism references
/// - `open <path>` - resolve a reader path
/// - `prefetch <book>` - warm the cache
pub mod cli;

/// Configuration loaded from `~/.config/lectio/config.toml` and the environment.
pub mod config;

/// Core domain models.
///
/// - [`BookSummary`](domain::BookSummary) / [`BookDetail`](domain::BookDetail)
/// - [`Verse`](domain::Verse) and [`Version`](domain::Version)
/// - [`normalize_label`](domain::normalize_label): abbreviation → content label
pub mod domain;

/// Prefetch sequencer for a book's first chapter.
pub mod prefetch;

/// Shared query cache and reactive query handles.
///
/// - [`QueryCache`](query::QueryCache): stale-while-revalidate, coalescing, GC
/// - [`Query`](query::Query): input-gated observer with a watch channel
/// - [`BibleQueries`](query::BibleQueries): one definition per cache key
pub mod query;

/// Reader state: selected book and chapter, display mode.
pub mod reader;

/// Remote data access.
///
/// - [`RemoteClient`](remote::RemoteClient): async trait for table reads and RPC
/// - [`PostgrestClient`](remote::PostgrestClient): reqwest-based implementation
/// - [`MemoryClient`](remote::MemoryClient): JSON datasets, used offline and in tests
pub mod remote;

/// Reader paths and their resolution.
pub mod route;
