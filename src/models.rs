//! Core data models for genre resolution.
//!
//! This module contains the identity, candidate and outcome types passed
//! between the normalizer, scorer, resolver and reconciler.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::GENRE_SEPARATOR;
use crate::normalize::{is_generic_mix_label, remix_key_words};

// ============================================================================
// Track Identity
// ============================================================================

/// Normalized mix/version request, e.g. "friction subsonic remix".
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RemixDescriptor {
    tokens: Vec<String>,
}

impl RemixDescriptor {
    /// Build from already-normalized text. Returns None when nothing is left.
    pub fn from_normalized(text: &str) -> Option<Self> {
        let tokens: Vec<String> = text.split_whitespace().map(str::to_string).collect();
        if tokens.is_empty() {
            None
        } else {
            Some(Self { tokens })
        }
    }

    /// Space-joined normalized form, comparable to a normalized mix label
    pub fn as_text(&self) -> String {
        self.tokens.join(" ")
    }

    /// A generic descriptor ("extended mix") asks for no particular remix.
    pub fn is_specific(&self) -> bool {
        !is_generic_mix_label(&self.as_text())
    }

    /// Descriptor words with generic mix-type and filler words removed
    pub fn key_words(&self) -> FxHashSet<String> {
        remix_key_words(&self.as_text())
    }
}

impl fmt::Display for RemixDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

/// Canonical (artist, title, remix) identity of one track.
/// Built once by `normalize::normalize_identity`, read-only afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TrackIdentity {
    artist: String,
    title: String,
    remix: Option<RemixDescriptor>,
}

impl TrackIdentity {
    pub fn new(artist: String, title: String, remix: Option<RemixDescriptor>) -> Self {
        Self {
            artist,
            title,
            remix,
        }
    }

    pub fn artist(&self) -> &str {
        &self.artist
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn remix(&self) -> Option<&RemixDescriptor> {
        self.remix.as_ref()
    }

    /// True when the track names a non-generic mix that must not be confused
    /// with other versions of the same track.
    pub fn requests_specific_remix(&self) -> bool {
        self.remix.as_ref().is_some_and(RemixDescriptor::is_specific)
    }
}

// ============================================================================
// Catalog Candidates
// ============================================================================

/// One catalog search hit (one release/version of a track).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub artist: String,
    pub title: String,
    /// e.g. "Original Mix", "Friction Remix", "Extended Mix"
    #[serde(default)]
    pub mix_label: String,
    #[serde(default)]
    pub genre: String,
}

/// Candidate with its match score and position in the catalog result list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub score: i32,
    /// Catalog-provided order, used to break score ties (lower wins)
    pub index: usize,
}

// ============================================================================
// Resolution Outcome
// ============================================================================

/// Which source produced the resolved genre.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceTier {
    #[serde(rename = "catalog")]
    Catalog,
    #[serde(rename = "crowd+ml")]
    CrowdMl,
    #[serde(rename = "ml")]
    Ml,
}

impl SourceTier {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceTier::Catalog => "catalog",
            SourceTier::CrowdMl => "crowd+ml",
            SourceTier::Ml => "ml",
        }
    }
}

impl fmt::Display for SourceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the catalog tier was accepted or passed over.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum CatalogVerdict {
    /// Catalog lookups switched off for this run
    Disabled,
    /// Collaborator failed or timed out
    Unavailable { reason: String },
    /// Search returned nothing
    NoCandidates,
    /// Best candidate scored under the acceptance bar
    BelowThreshold { best_score: i32, threshold: i32 },
    /// Best candidate was acceptable but carries no genre
    EmptyGenre { best_score: i32 },
    Accepted { best_score: i32, index: usize },
}

/// Data explaining how an outcome was reached.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Confidence {
    pub catalog: CatalogVerdict,
    /// Number of catalog candidates scored
    pub candidates_scored: usize,
    /// Usable crowd tags returned (None = crowd tier not consulted or unavailable)
    pub crowd_tags: Option<usize>,
    /// ML genres above the keep probability
    pub ml_genres: usize,
}

/// Result of the tier resolver for one track.
/// `genres` may be empty, meaning no source produced a usable genre.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResolutionOutcome {
    pub genres: Vec<String>,
    pub tier: SourceTier,
    pub confidence: Confidence,
}

impl ResolutionOutcome {
    pub fn has_genre(&self) -> bool {
        !self.genres.is_empty()
    }

    /// Genres joined for a single tag value, at most `limit` of them
    pub fn genre_value(&self, limit: usize) -> String {
        self.genres
            .iter()
            .take(limit)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(GENRE_SEPARATOR)
    }
}

// ============================================================================
// Moods and Existing Tags
// ============================================================================

/// Per-axis mood probabilities from the ML collaborator, each in [0, 1].
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MoodScores {
    pub happy: f64,
    pub sad: f64,
    pub aggressive: f64,
    pub relaxed: f64,
}

/// Tag values already present on a track, as read by the tag reader.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExistingTagSnapshot {
    pub genre: String,
    pub version_stamp: Option<String>,
    /// Stored metrics, used only when refreshing comment fields
    pub energy: Option<f64>,
    pub valence: Option<f64>,
}
