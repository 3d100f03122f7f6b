//! Merging a resolution outcome into a track's existing tags.
//!
//! Rules:
//! - The primary genre is only written over an empty or placeholder genre.
//!   Whatever was detected always goes to `GENRE_DETECTED`.
//! - A track already stamped with the current version is left alone unless forced.
//! - The source tier is always recorded in its own field.
//!
//! `reconcile` is pure; the same inputs always give the same write set.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::{is_generic_genre, MAX_WRITTEN_GENRES};
use crate::metrics::{detail_comment, format_value, summary_comment, DerivedMetrics};
use crate::models::{ExistingTagSnapshot, MoodScores, ResolutionOutcome};

// ============================================================================
// Tag Keys
// ============================================================================

/// Every tag this crate writes, one field per concept.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum TagKey {
    #[serde(rename = "GENRE")]
    Genre,
    #[serde(rename = "GENRE_DETECTED")]
    GenreDetected,
    #[serde(rename = "GENRE_SOURCE")]
    GenreSource,
    #[serde(rename = "ENERGY")]
    Energy,
    #[serde(rename = "VALENCE")]
    Valence,
    #[serde(rename = "MOOD_HAPPY")]
    MoodHappy,
    #[serde(rename = "MOOD_SAD")]
    MoodSad,
    #[serde(rename = "MOOD_AGGRESSIVE")]
    MoodAggressive,
    #[serde(rename = "MOOD_RELAXED")]
    MoodRelaxed,
    #[serde(rename = "TAGGER_VERSION")]
    TaggerVersion,
    /// Human-readable summary comment
    #[serde(rename = "COMMENT")]
    Comment,
    /// Hidden detailed comment with raw values
    #[serde(rename = "COMMENT_DETAIL")]
    CommentDetail,
}

impl TagKey {
    pub fn as_str(self) -> &'static str {
        match self {
            TagKey::Genre => "GENRE",
            TagKey::GenreDetected => "GENRE_DETECTED",
            TagKey::GenreSource => "GENRE_SOURCE",
            TagKey::Energy => "ENERGY",
            TagKey::Valence => "VALENCE",
            TagKey::MoodHappy => "MOOD_HAPPY",
            TagKey::MoodSad => "MOOD_SAD",
            TagKey::MoodAggressive => "MOOD_AGGRESSIVE",
            TagKey::MoodRelaxed => "MOOD_RELAXED",
            TagKey::TaggerVersion => "TAGGER_VERSION",
            TagKey::Comment => "COMMENT",
            TagKey::CommentDetail => "COMMENT_DETAIL",
        }
    }
}

// ============================================================================
// Write Set
// ============================================================================

/// What happened to the primary genre field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "existing", rename_all = "snake_case")]
pub enum GenreAction {
    /// Placeholder genre overwritten with the resolved one
    Replaced,
    /// A real genre was already set and kept
    Kept(String),
    /// Existing genre already equals the resolved one
    Matches,
    /// Nothing was resolved
    NoGenre,
}

/// Tag writes decided for one track. Empty means "leave the file alone".
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TagWriteSet {
    writes: BTreeMap<TagKey, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    genre_action: Option<GenreAction>,
}

impl TagWriteSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn get(&self, key: TagKey) -> Option<&str> {
        self.writes.get(&key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (TagKey, &str)> {
        self.writes.iter().map(|(k, v)| (*k, v.as_str()))
    }

    pub fn genre_action(&self) -> Option<&GenreAction> {
        self.genre_action.as_ref()
    }

    fn set(&mut self, key: TagKey, value: impl Into<String>) {
        self.writes.insert(key, value.into());
    }

    /// The snapshot a tag reader would return after these writes are saved.
    pub fn apply_to(&self, existing: &ExistingTagSnapshot) -> ExistingTagSnapshot {
        let parse = |key| self.get(key).and_then(|v| v.parse::<f64>().ok());
        ExistingTagSnapshot {
            genre: self
                .get(TagKey::Genre)
                .map_or_else(|| existing.genre.clone(), str::to_string),
            version_stamp: self
                .get(TagKey::TaggerVersion)
                .map(str::to_string)
                .or_else(|| existing.version_stamp.clone()),
            energy: parse(TagKey::Energy).or(existing.energy),
            valence: parse(TagKey::Valence).or(existing.valence),
        }
    }
}

// ============================================================================
// Reconciliation
// ============================================================================

/// Whether a track needs (re-)tagging under the current version stamp
pub fn needs_retag(existing: &ExistingTagSnapshot, force: bool, version_stamp: &str) -> bool {
    force || existing.version_stamp.as_deref() != Some(version_stamp)
}

/// Decide the complete set of tag writes for one track.
pub fn reconcile(
    existing: &ExistingTagSnapshot,
    outcome: &ResolutionOutcome,
    metrics: &DerivedMetrics,
    moods: &MoodScores,
    force: bool,
    version_stamp: &str,
) -> TagWriteSet {
    if !needs_retag(existing, force, version_stamp) {
        return TagWriteSet::empty();
    }

    let mut set = TagWriteSet::empty();
    let detected = outcome.genre_value(MAX_WRITTEN_GENRES);
    let current = existing.genre.trim();

    let action = if detected.is_empty() {
        GenreAction::NoGenre
    } else if is_generic_genre(current) {
        set.set(TagKey::Genre, detected.as_str());
        GenreAction::Replaced
    } else if current.eq_ignore_ascii_case(&detected) {
        GenreAction::Matches
    } else {
        GenreAction::Kept(current.to_string())
    };
    set.genre_action = Some(action);

    set.set(TagKey::GenreDetected, detected);
    set.set(TagKey::GenreSource, outcome.tier.as_str());

    set.set(TagKey::Energy, format_value(metrics.energy));
    set.set(TagKey::Valence, format_value(metrics.valence));
    set.set(TagKey::MoodHappy, format_value(moods.happy));
    set.set(TagKey::MoodSad, format_value(moods.sad));
    set.set(TagKey::MoodAggressive, format_value(moods.aggressive));
    set.set(TagKey::MoodRelaxed, format_value(moods.relaxed));

    set.set(TagKey::Comment, summary_comment(metrics));
    set.set(TagKey::CommentDetail, detail_comment(metrics, Some(moods)));
    set.set(TagKey::TaggerVersion, version_stamp);

    set
}

/// Rebuild both comment fields from stored energy/valence without resolving
/// anything. Tracks never stamped, or missing either metric, are skipped.
pub fn refresh_summary(existing: &ExistingTagSnapshot) -> TagWriteSet {
    let (Some(_), Some(energy), Some(valence)) =
        (existing.version_stamp.as_ref(), existing.energy, existing.valence)
    else {
        return TagWriteSet::empty();
    };

    let metrics = DerivedMetrics { energy, valence };
    let mut set = TagWriteSet::empty();
    set.set(TagKey::Comment, summary_comment(&metrics));
    set.set(TagKey::CommentDetail, detail_comment(&metrics, None));
    set
}
