//! Resolver settings and fixed constants.
//!
//! Thresholds that shape scoring and tier acceptance live here so the
//! driver can override them from a JSON settings file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::scoring::{GENERIC_MIX_THRESHOLD, SPECIFIC_REMIX_THRESHOLD};

// ============================================================================
// Constants
// ============================================================================

/// Version stamp written to every tagged track. Bump when resolution or
/// reconciliation logic changes so already-tagged files are re-tagged.
pub const TAGGER_VERSION: &str = "v4";

/// Genre values treated as "no genre set". Matched case-sensitively.
pub const GENERIC_GENRES: [&str; 5] = ["Other", "Unknown", "Misc", "Music", ""];

/// Maximum entries kept by the catalog lookup cache
pub const CATALOG_CACHE_MAX: usize = 500;

/// Separator used when several genres are joined into one tag value
pub const GENRE_SEPARATOR: &str = "; ";

/// Genres joined into the written genre value
pub const MAX_WRITTEN_GENRES: usize = 4;

pub fn is_generic_genre(genre: &str) -> bool {
    GENERIC_GENRES.contains(&genre)
}

// ============================================================================
// Settings
// ============================================================================

/// Tunables for a resolution run. Every field has a default, so a settings
/// file only needs the keys it changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverSettings {
    /// Consult the catalog tier at all
    pub catalog_enabled: bool,
    /// Minimum best score when the track requests a specific remix
    pub specific_remix_threshold: i32,
    /// Minimum best score when any mix is acceptable
    pub generic_mix_threshold: i32,
    /// Catalog results scored per search (first N in catalog order)
    pub max_catalog_candidates: usize,
    /// ML genres below this probability are not used for resolution
    pub ml_keep_prob: f32,
    /// ML genres below this probability are dropped when building predictions
    pub ml_min_prob: f32,
    /// ML genres considered per track
    pub ml_genre_limit: usize,
    /// Crowd tags need strictly more votes than this
    pub crowd_min_count: u32,
    /// Crowd tags considered per artist
    pub crowd_tag_limit: usize,
    pub catalog_timeout_secs: u64,
    pub crowd_timeout_secs: u64,
    /// Version stamp compared against stored stamps
    pub version_stamp: String,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            catalog_enabled: true,
            specific_remix_threshold: SPECIFIC_REMIX_THRESHOLD,
            generic_mix_threshold: GENERIC_MIX_THRESHOLD,
            max_catalog_candidates: 10,
            ml_keep_prob: 0.10,
            ml_min_prob: 0.05,
            ml_genre_limit: 3,
            crowd_min_count: 20,
            crowd_tag_limit: 3,
            catalog_timeout_secs: 8,
            crowd_timeout_secs: 5,
            version_stamp: TAGGER_VERSION.to_string(),
        }
    }
}

impl ResolverSettings {
    /// Load settings from a JSON file; missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse settings file {}", path.display()))
    }

    pub fn catalog_timeout(&self) -> Duration {
        Duration::from_secs(self.catalog_timeout_secs)
    }

    pub fn crowd_timeout(&self) -> Duration {
        Duration::from_secs(self.crowd_timeout_secs)
    }
}
