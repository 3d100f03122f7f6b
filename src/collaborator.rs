//! Seams to the external sources: catalog search and crowd tags.
//!
//! Every call goes through `call_with_timeout`, so a hung source costs at
//! most its timeout and surfaces as `CollaboratorError::Timeout`.

use crossbeam_channel::{bounded, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache::BoundedCache;
use crate::catalog::CatalogQuery;
use crate::config::{ResolverSettings, CATALOG_CACHE_MAX};
use crate::crowd::{usable_tag_names, CrowdTag};
use crate::error::CollaboratorError;
use crate::models::Candidate;

/// Curated catalog search (returns raw hits in catalog order).
pub trait CatalogSource: Send + Sync {
    fn search(&self, query: &CatalogQuery) -> Result<Vec<Candidate>, CollaboratorError>;
}

/// Crowd-tag lookup by artist name.
pub trait CrowdTagSource: Send + Sync {
    fn top_tags(&self, artist: &str) -> Result<Vec<CrowdTag>, CollaboratorError>;
}

/// Run `call` on a worker thread and wait at most `timeout` for its result.
/// A call that overruns is abandoned; its thread finishes in the background.
pub fn call_with_timeout<T, F>(timeout: Duration, call: F) -> Result<T, CollaboratorError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, CollaboratorError> + Send + 'static,
{
    let (tx, rx) = bounded(1);
    thread::Builder::new()
        .name("collaborator-call".to_string())
        .spawn(move || {
            // Receiver may be gone after a timeout; nothing to report then
            let _ = tx.send(call());
        })
        .map_err(|e| CollaboratorError::Transport(format!("failed to spawn worker: {}", e)))?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(CollaboratorError::Timeout(timeout)),
        Err(RecvTimeoutError::Disconnected) => Err(CollaboratorError::Transport(
            "collaborator call panicked".to_string(),
        )),
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// Catalog source memoizing results per artist/title. Failures are not cached.
pub struct CachedCatalog {
    inner: Arc<dyn CatalogSource>,
    cache: Mutex<BoundedCache<String, Vec<Candidate>>>,
}

impl CachedCatalog {
    pub fn new(inner: Arc<dyn CatalogSource>) -> Self {
        Self::with_capacity(inner, CATALOG_CACHE_MAX)
    }

    pub fn with_capacity(inner: Arc<dyn CatalogSource>, capacity: usize) -> Self {
        Self {
            inner,
            cache: Mutex::new(BoundedCache::new(capacity)),
        }
    }
}

impl CatalogSource for CachedCatalog {
    fn search(&self, query: &CatalogQuery) -> Result<Vec<Candidate>, CollaboratorError> {
        let key = query.cache_key();
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(hit) = cache.get(&key) {
                debug!(key = %key, "catalog cache hit");
                return Ok(hit);
            }
        }

        let candidates = self.inner.search(query)?;
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, candidates.clone());
        }
        Ok(candidates)
    }
}

/// Search the catalog within the configured timeout, keeping the first
/// `max_catalog_candidates` results.
pub fn lookup_catalog(
    source: &Arc<dyn CatalogSource>,
    query: &CatalogQuery,
    settings: &ResolverSettings,
) -> Result<Vec<Candidate>, CollaboratorError> {
    let source = Arc::clone(source);
    let owned_query = query.clone();
    let mut candidates =
        call_with_timeout(settings.catalog_timeout(), move || source.search(&owned_query))?;
    candidates.truncate(settings.max_catalog_candidates);
    Ok(candidates)
}

// ============================================================================
// Crowd Tags
// ============================================================================

/// Ask for crowd tags under each artist name in turn (e.g. the cleaned name,
/// then the raw one) and return the first lookup with usable tags.
///
/// Returns `Ok(vec![])` when some lookup answered but nothing was usable, and
/// the last error when every lookup failed.
pub fn crowd_tags_with_fallback(
    source: &Arc<dyn CrowdTagSource>,
    artist_names: &[String],
    settings: &ResolverSettings,
) -> Result<Vec<CrowdTag>, CollaboratorError> {
    let mut last_error = None;
    let mut answered = false;
    let mut tried: Vec<&str> = Vec::new();

    for name in artist_names.iter().map(|n| n.trim()) {
        if name.is_empty() || tried.contains(&name) {
            continue;
        }
        tried.push(name);

        let source = Arc::clone(source);
        let artist = name.to_string();
        match call_with_timeout(settings.crowd_timeout(), move || source.top_tags(&artist)) {
            Ok(tags) => {
                answered = true;
                let usable =
                    usable_tag_names(&tags, settings.crowd_min_count, settings.crowd_tag_limit);
                if !usable.is_empty() {
                    return Ok(tags);
                }
                debug!(artist = name, "no usable crowd tags");
            }
            Err(err) => {
                warn!(artist = name, error = %err, "crowd tag lookup failed");
                last_error = Some(err);
            }
        }
    }

    match (answered, last_error) {
        (false, Some(err)) => Err(err),
        _ => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingCatalog {
        calls: AtomicUsize,
    }

    impl CatalogSource for CountingCatalog {
        fn search(&self, query: &CatalogQuery) -> Result<Vec<Candidate>, CollaboratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![Candidate {
                artist: query.artist.clone(),
                title: query.title.clone(),
                mix_label: "Original Mix".to_string(),
                genre: "House".to_string(),
            }])
        }
    }

    struct SlowCatalog;

    impl CatalogSource for SlowCatalog {
        fn search(&self, _query: &CatalogQuery) -> Result<Vec<Candidate>, CollaboratorError> {
            thread::sleep(Duration::from_millis(500));
            Ok(Vec::new())
        }
    }

    struct ScriptedCrowd;

    impl CrowdTagSource for ScriptedCrowd {
        fn top_tags(&self, artist: &str) -> Result<Vec<CrowdTag>, CollaboratorError> {
            match artist {
                "Sasha" => Ok(vec![CrowdTag::new("progressive house", 80)]),
                "Sasha (UK)" => Ok(vec![CrowdTag::new("seen live", 5)]),
                _ => Err(CollaboratorError::Transport("connection refused".to_string())),
            }
        }
    }

    fn query() -> CatalogQuery {
        crate::catalog::search_query("Sasha", "Xpander")
    }

    #[test]
    fn test_call_with_timeout_returns_result() {
        let result = call_with_timeout(Duration::from_secs(1), || Ok(42));
        assert_eq!(result, Ok(42));
    }

    #[test]
    fn test_call_with_timeout_times_out() {
        let mut settings = ResolverSettings::default();
        settings.catalog_timeout_secs = 0;
        let source: Arc<dyn CatalogSource> = Arc::new(SlowCatalog);
        let result = lookup_catalog(&source, &query(), &settings);
        assert!(matches!(result, Err(CollaboratorError::Timeout(_))));
    }

    #[test]
    fn test_cached_catalog_hits_inner_once() {
        let inner = Arc::new(CountingCatalog {
            calls: AtomicUsize::new(0),
        });
        let cached = CachedCatalog::new(inner.clone());
        let first = cached.search(&query()).unwrap();
        let second = cached.search(&query()).unwrap();
        assert_eq!(first, second);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_lookup_catalog_truncates() {
        struct ManyResults;
        impl CatalogSource for ManyResults {
            fn search(&self, _query: &CatalogQuery) -> Result<Vec<Candidate>, CollaboratorError> {
                Ok(vec![Candidate::default(); 15])
            }
        }
        let source: Arc<dyn CatalogSource> = Arc::new(ManyResults);
        let result = lookup_catalog(&source, &query(), &ResolverSettings::default()).unwrap();
        assert_eq!(result.len(), 10);
    }

    #[test]
    fn test_crowd_fallback_uses_first_usable_name() {
        let source: Arc<dyn CrowdTagSource> = Arc::new(ScriptedCrowd);
        let names = vec!["Sasha (UK)".to_string(), "Sasha".to_string()];
        let tags = crowd_tags_with_fallback(&source, &names, &ResolverSettings::default()).unwrap();
        assert_eq!(tags, vec![CrowdTag::new("progressive house", 80)]);
    }

    #[test]
    fn test_crowd_fallback_all_failed() {
        let source: Arc<dyn CrowdTagSource> = Arc::new(ScriptedCrowd);
        let names = vec!["Nobody".to_string(), "".to_string()];
        let result = crowd_tags_with_fallback(&source, &names, &ResolverSettings::default());
        assert!(matches!(result, Err(CollaboratorError::Transport(_))));
    }

    #[test]
    fn test_crowd_fallback_answered_but_unusable() {
        let source: Arc<dyn CrowdTagSource> = Arc::new(ScriptedCrowd);
        let names = vec!["Sasha (UK)".to_string(), "Nobody".to_string()];
        let result = crowd_tags_with_fallback(&source, &names, &ResolverSettings::default());
        assert_eq!(result, Ok(Vec::new()));
    }
}
