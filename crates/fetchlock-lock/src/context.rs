use std::sync::Arc;

use fetchlock_fetch::{CacheClient, CacheToken, Fetcher, HttpClient};

/// Network capabilities handed to a [`Lock`](crate::Lock).
///
/// Everything that talks to the outside world goes through here, so tests
/// swap the transport instead of patching globals.
pub struct Context<C: HttpClient> {
    fetcher: Arc<Fetcher<C>>,
    cache:   CacheClient<C>,
}

impl<C: HttpClient> Context<C> {
    pub fn new(fetcher: Fetcher<C>, token: Option<CacheToken>) -> Self {
        let fetcher = Arc::new(fetcher);
        let cache = CacheClient::new(fetcher.clone(), token);
        Self { fetcher, cache }
    }

    pub fn fetcher(&self) -> &Fetcher<C> {
        &self.fetcher
    }

    pub fn cache(&self) -> &CacheClient<C> {
        &self.cache
    }
}
