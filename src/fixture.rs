//! Batch input: one JSON object per line describing a track, its analysis,
//! and the replies its external sources gave.
//!
//! ```json
//! {"filename": "Massive Attack - Teardrop.mp3",
//!  "existing": {"genre": "Other"},
//!  "ml": {"moods": {"happy": 0.2, "sad": 0.6, "aggressive": 0.1, "relaxed": 0.8},
//!         "genres": [{"label": "Downtempo", "prob": 0.4}]},
//!  "catalog": {"ok": []},
//!  "crowd": {"Massive Attack": {"ok": [{"name": "trip-hop", "count": 100}]}}}
//! ```
//!
//! A track may carry `ml_raw` (`moods`, `labels`, `probs`) instead of a ranked
//! `ml` prediction. A source reply may be `{"raw": ".."}`: the search page or
//! top-tags JSON exactly as the service sent it, parsed when served.
//!
//! Replies are served back through the collaborator traits, so a recorded
//! batch goes through the same timeout and cache path as a live one.

use anyhow::{Context, Result};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::catalog::{parse_search_page, search_query, CatalogQuery};
use crate::collaborator::{CatalogSource, CrowdTagSource};
use crate::config::ResolverSettings;
use crate::crowd::{parse_top_tags, CrowdTag};
use crate::error::CollaboratorError;
use crate::models::Candidate;
use crate::pipeline::TrackRequest;

/// A recorded source reply.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceReply<T> {
    Ok(T),
    /// Unparsed payload
    Raw(String),
    Error(String),
    /// The source never answered
    Timeout,
}

impl<T: Clone> SourceReply<T> {
    fn to_result(
        &self,
        timeout: Duration,
        parse: impl FnOnce(&str) -> Result<T, CollaboratorError>,
    ) -> Result<T, CollaboratorError> {
        match self {
            SourceReply::Ok(value) => Ok(value.clone()),
            SourceReply::Raw(payload) => parse(payload),
            SourceReply::Error(message) => Err(CollaboratorError::Transport(message.clone())),
            SourceReply::Timeout => Err(CollaboratorError::Timeout(timeout)),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackFixture {
    #[serde(flatten)]
    pub request: TrackRequest,
    /// Catalog reply for this track's search; absent means no results
    #[serde(default)]
    pub catalog: Option<SourceReply<Vec<Candidate>>>,
    /// Crowd-tag replies keyed by the artist name asked for
    #[serde(default)]
    pub crowd: BTreeMap<String, SourceReply<Vec<CrowdTag>>>,
}

impl TrackFixture {
    /// The catalog query the pipeline will issue for this track
    pub fn catalog_query(&self) -> CatalogQuery {
        let names = self.request.lookup_names();
        search_query(&names.artist_clean, &names.title)
    }
}

/// Load a JSON Lines fixture file. Blank lines and `#` comments are skipped.
pub fn load_fixtures(path: &Path) -> Result<Vec<TrackFixture>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read fixtures {}", path.display()))?;
    parse_fixtures(&raw).with_context(|| format!("Failed to parse fixtures {}", path.display()))
}

pub fn parse_fixtures(raw: &str) -> Result<Vec<TrackFixture>> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(idx, line)| {
            serde_json::from_str(line).with_context(|| format!("line {}", idx + 1))
        })
        .collect()
}

// ============================================================================
// Recorded Sources
// ============================================================================

/// Catalog serving recorded replies by query. Unknown queries return no results.
pub struct FixtureCatalog {
    replies: FxHashMap<String, SourceReply<Vec<Candidate>>>,
    timeout: Duration,
    max_candidates: usize,
}

impl FixtureCatalog {
    pub fn from_fixtures(fixtures: &[TrackFixture], settings: &ResolverSettings) -> Self {
        let replies = fixtures
            .iter()
            .filter_map(|f| Some((f.catalog_query().cache_key(), f.catalog.clone()?)))
            .collect();
        Self {
            replies,
            timeout: settings.catalog_timeout(),
            max_candidates: settings.max_catalog_candidates,
        }
    }
}

impl CatalogSource for FixtureCatalog {
    fn search(&self, query: &CatalogQuery) -> Result<Vec<Candidate>, CollaboratorError> {
        match self.replies.get(&query.cache_key()) {
            Some(reply) => {
                reply.to_result(self.timeout, |html| parse_search_page(html, self.max_candidates))
            }
            None => Ok(Vec::new()),
        }
    }
}

/// Crowd source serving recorded replies by artist. Unknown artists are an
/// error, as the live service reports them.
pub struct FixtureCrowd {
    replies: FxHashMap<String, SourceReply<Vec<CrowdTag>>>,
    timeout: Duration,
}

impl FixtureCrowd {
    pub fn from_fixtures(fixtures: &[TrackFixture], settings: &ResolverSettings) -> Self {
        let replies = fixtures
            .iter()
            .flat_map(|f| f.crowd.iter())
            .map(|(artist, reply)| (artist.to_lowercase(), reply.clone()))
            .collect();
        Self {
            replies,
            timeout: settings.crowd_timeout(),
        }
    }
}

impl CrowdTagSource for FixtureCrowd {
    fn top_tags(&self, artist: &str) -> Result<Vec<CrowdTag>, CollaboratorError> {
        match self.replies.get(&artist.to_lowercase()) {
            Some(reply) => reply.to_result(self.timeout, parse_top_tags),
            None => Err(CollaboratorError::Transport(format!(
                "artist not found: {}",
                artist
            ))),
        }
    }
}
