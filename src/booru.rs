//! The searchable post collection: paged queries over the index cache plus
//! the storage operations that feed it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::baseline::{BaselineDirectory, Baselines};
use crate::cancel::CancelToken;
use crate::compose::{count, limit, skip};
use crate::config::Settings;
use crate::construct::{Post, PostId};
use crate::error::{Result, TagbooruError};
use crate::evaluate::Evaluator;
use crate::index::IndexCache;
use crate::persist::{Catalog, Persistor};
use crate::stream::PostStream;

pub struct Booru {
    persistor: Arc<Persistor>,
    cache: IndexCache,
    baselines: Arc<dyn Baselines>,
    timeout: Option<Duration>,
}

impl Booru {
    pub fn new(
        persistor: Arc<Persistor>,
        index: impl Into<PathBuf>,
        baselines: Arc<dyn Baselines>,
    ) -> Result<Self> {
        let catalog: Arc<dyn Catalog> = persistor.clone();
        let cache = IndexCache::new(index, catalog)?;
        Ok(Self {
            persistor,
            cache,
            baselines,
            timeout: None,
        })
    }

    /// Open storage (creating the schema when missing) and the index
    /// directory named by `settings`.
    pub fn open(settings: &Settings) -> Result<Self> {
        let persistor = Persistor::open(&settings.database)?;
        let baselines = BaselineDirectory::new(&settings.baseline);
        if !baselines.root().is_dir() {
            warn!(baseline = %settings.baseline, "baseline directory missing, baseline: queries will match nothing");
        }
        let booru = Self::new(Arc::new(persistor), &settings.index, Arc::new(baselines))?
            .with_timeout(settings.timeout());
        info!(database = %settings.database, index = %settings.index, "booru opened");
        Ok(booru)
    }

    /// Deadline applied to every query and count.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn cache(&self) -> &IndexCache {
        &self.cache
    }

    pub fn query(&self, query: &str, page: u64, length: u64) -> Result<Vec<Post>> {
        self.query_with(&CancelToken::new(), query, page, length)
    }

    /// One page of posts matching `query`, in stream order, each with its
    /// tags. Fewer than `length` posts means there is no next page.
    pub fn query_with(
        &self,
        caller: &CancelToken,
        query: &str,
        page: u64,
        length: u64,
    ) -> Result<Vec<Post>> {
        let started = Instant::now();
        let mut posts = self.run(caller, query, |token, results| {
            let selection = limit(token, skip(token, results, page.saturating_mul(length)), length);
            selection.collect::<Vec<_>>()
        })?;
        self.persistor.attach_tags(&mut posts)?;
        debug!(
            query,
            page,
            length,
            posts = posts.len(),
            ms = started.elapsed().as_secs_f64() * 1000.0,
            "query complete"
        );
        Ok(posts)
    }

    pub fn count(&self, query: &str) -> Result<u64> {
        self.count_with(&CancelToken::new(), query)
    }

    /// Number of posts matching `query`, by draining the whole stream.
    pub fn count_with(&self, caller: &CancelToken, query: &str) -> Result<u64> {
        self.run(caller, query, |_, results| count(results))
    }

    /// Evaluate `query` under a scope of its own and hand the stream to
    /// `drain`. Every stage is stopped before this returns.
    fn run<T>(
        &self,
        caller: &CancelToken,
        query: &str,
        drain: impl FnOnce(&CancelToken, PostStream) -> T,
    ) -> Result<T> {
        let token = caller.scope();
        let _guard = token.drop_guard();
        if let Some(timeout) = self.timeout {
            token.cancel_after(timeout);
        }
        let evaluator = Evaluator::new(&self.cache, self.baselines.as_ref());
        let results = evaluator.stream(&token, query)?;
        let drained = drain(&token, results);
        if let Some(failure) = token.take_failure() {
            return Err(failure);
        }
        if caller.is_cancelled() {
            return Err(TagbooruError::Cancelled);
        }
        Ok(drained)
    }

    /// Materialise every missing index entry.
    pub fn generate_indexes(&self) -> Result<()> {
        self.cache.generate_indexes(&CancelToken::new())
    }

    pub fn new_post(&self, post: &str, timestamp: DateTime<Utc>) -> Result<PostId> {
        self.persistor.new_post(post, timestamp)
    }
    pub fn tag_post(&self, id: PostId, tag: &str) -> Result<()> {
        self.persistor.tag_post(id, tag)
    }
    pub fn untag_post(&self, id: PostId, tag: &str) -> Result<()> {
        self.persistor.untag_post(id, tag)
    }
    pub fn post(&self, path: &str) -> Result<Post> {
        self.persistor.post(path)
    }
    pub fn post_by_id(&self, id: PostId) -> Result<Post> {
        self.persistor.post_by_id(id)
    }

    /// Close the database. If query stages are still winding down, the
    /// connection is closed by whichever of them exits last.
    pub fn close(self) -> Result<()> {
        let Self { persistor, cache, .. } = self;
        drop(cache);
        match Arc::try_unwrap(persistor) {
            Ok(persistor) => persistor.close(),
            Err(_) => {
                warn!("storage still shared at close");
                Ok(())
            }
        }
    }
}
