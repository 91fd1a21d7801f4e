use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::app::error::Result;
use crate::catalog::Catalog;
use crate::config::Config;
use crate::prefetch::Prefetcher;
use crate::query::{BibleQueries, QueryCache, QueryOptions};
use crate::remote::{PostgrestClient, RemoteClient};

pub struct AppContext {
    pub config: Config,
    pub client: Arc<dyn RemoteClient + Send + Sync>,
    pub catalog: Arc<Catalog>,
    pub cache: QueryCache,
    pub queries: BibleQueries,
    pub prefetcher: Prefetcher,
    janitor: Option<JoinHandle<()>>,
}

impl AppContext {
    /// Wire everything against the configured PostgREST endpoint.
    pub fn new(config: Config) -> Result<Self> {
        config.validate_remote()?;
        let client: Arc<dyn RemoteClient + Send + Sync> =
            Arc::new(PostgrestClient::new(&config.remote)?);
        Ok(Self::with_client(config, client))
    }

    pub fn with_client(config: Config, client: Arc<dyn RemoteClient + Send + Sync>) -> Self {
        let catalog = Arc::new(Catalog::new(client.clone(), &config.library));
        let cache = QueryCache::new();
        let queries = BibleQueries::new(
            cache.clone(),
            catalog.clone(),
            QueryOptions::from(&config.cache),
        );
        let prefetcher = Prefetcher::new(queries.clone(), config.library.default_version_id);

        Self {
            config,
            client,
            catalog,
            cache,
            queries,
            prefetcher,
            janitor: None,
        }
    }

    /// Start evicting idle cache entries in the background.
    pub fn start_janitor(&mut self) {
        if self.janitor.is_none() {
            let every = self.config.cache.janitor_interval();
            self.janitor = Some(self.cache.spawn_janitor(every));
        }
    }
}

impl Drop for AppContext {
    fn drop(&mut self) {
        if let Some(janitor) = self.janitor.take() {
            janitor.abort();
        }
    }
}
