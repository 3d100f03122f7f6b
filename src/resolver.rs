//! Three-tier genre resolution: curated catalog, then crowd tags merged with
//! ML, then ML alone.
//!
//! Tiers are tried in `TIER_PRIORITY` order and the first tier that accepts
//! ends the search. Data from a rejected tier is dropped, never carried into
//! the next one. Collaborator failures only ever mean "tier unavailable".

use tracing::debug;

use crate::config::ResolverSettings;
use crate::crowd::{is_generic_tag, usable_tag_names, CrowdTag};
use crate::error::CollaboratorError;
use crate::ml::MlPrediction;
use crate::models::{
    Candidate, CatalogVerdict, Confidence, ResolutionOutcome, SourceTier, TrackIdentity,
};
use crate::scoring::best_candidate;

/// Catalog search result as handed over by the caller
pub type CatalogResult = Result<Vec<Candidate>, CollaboratorError>;

// ============================================================================
// Crowd Tag Fetching
// ============================================================================

/// Lazily fetches crowd tags; only called when the catalog tier is rejected.
pub trait CrowdTagFetcher {
    fn fetch(&self, identity: &TrackIdentity) -> Result<Vec<CrowdTag>, CollaboratorError>;
}

impl<F> CrowdTagFetcher for F
where
    F: Fn(&TrackIdentity) -> Result<Vec<CrowdTag>, CollaboratorError>,
{
    fn fetch(&self, identity: &TrackIdentity) -> Result<Vec<CrowdTag>, CollaboratorError> {
        self(identity)
    }
}

/// Fetcher for runs without a crowd source
pub struct NoCrowdTags;

impl CrowdTagFetcher for NoCrowdTags {
    fn fetch(&self, _identity: &TrackIdentity) -> Result<Vec<CrowdTag>, CollaboratorError> {
        Err(CollaboratorError::Disabled("no crowd tag source configured".to_string()))
    }
}

// ============================================================================
// Tiers
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tier {
    Catalog,
    CrowdMl,
    Ml,
}

/// Most authoritative first
pub const TIER_PRIORITY: [Tier; 3] = [Tier::Catalog, Tier::CrowdMl, Tier::Ml];

struct TierInputs<'a> {
    identity: &'a TrackIdentity,
    catalog: &'a CatalogResult,
    crowd: &'a dyn CrowdTagFetcher,
    ml_genres: Vec<String>,
    settings: &'a ResolverSettings,
}

impl Tier {
    pub fn source(self) -> SourceTier {
        match self {
            Tier::Catalog => SourceTier::Catalog,
            Tier::CrowdMl => SourceTier::CrowdMl,
            Tier::Ml => SourceTier::Ml,
        }
    }

    /// Genres if this tier accepts the track, None to fall through.
    fn attempt(self, inputs: &TierInputs<'_>, confidence: &mut Confidence) -> Option<Vec<String>> {
        match self {
            Tier::Catalog => {
                let (verdict, scored, genre) =
                    judge_catalog(inputs.identity, inputs.catalog, inputs.settings);
                debug!(verdict = ?verdict, scored, "catalog tier");
                confidence.catalog = verdict;
                confidence.candidates_scored = scored;
                genre.map(|g| vec![g])
            }
            Tier::CrowdMl => match inputs.crowd.fetch(inputs.identity) {
                Ok(tags) => {
                    let names = usable_tag_names(
                        &tags,
                        inputs.settings.crowd_min_count,
                        inputs.settings.crowd_tag_limit,
                    );
                    debug!(tags = ?names, "crowd tier");
                    if names.is_empty() {
                        return None;
                    }
                    confidence.crowd_tags = Some(names.len());
                    Some(merge_genres(&names, &inputs.ml_genres))
                }
                Err(err) => {
                    debug!(error = %err, "crowd tier unavailable");
                    None
                }
            },
            Tier::Ml => Some(merge_genres(&[], &inputs.ml_genres)),
        }
    }
}

/// Acceptance bar for the catalog's best score: strict when a specific remix
/// is requested (a wrong version's genre is worse than none), lenient otherwise.
pub fn catalog_threshold(identity: &TrackIdentity, settings: &ResolverSettings) -> i32 {
    if identity.requests_specific_remix() {
        settings.specific_remix_threshold
    } else {
        settings.generic_mix_threshold
    }
}

/// Decide the catalog tier: verdict, number of candidates scored, and the
/// accepted genre if any.
fn judge_catalog(
    identity: &TrackIdentity,
    catalog: &CatalogResult,
    settings: &ResolverSettings,
) -> (CatalogVerdict, usize, Option<String>) {
    if !settings.catalog_enabled {
        return (CatalogVerdict::Disabled, 0, None);
    }
    let candidates = match catalog {
        Ok(candidates) => candidates,
        Err(err) => {
            return (
                CatalogVerdict::Unavailable {
                    reason: err.to_string(),
                },
                0,
                None,
            )
        }
    };

    let Some(best) = best_candidate(identity, candidates) else {
        return (CatalogVerdict::NoCandidates, 0, None);
    };

    let threshold = catalog_threshold(identity, settings);
    if best.score < threshold {
        return (
            CatalogVerdict::BelowThreshold {
                best_score: best.score,
                threshold,
            },
            candidates.len(),
            None,
        );
    }

    let genre = best.candidate.genre.trim();
    if genre.is_empty() || is_generic_tag(genre) {
        return (
            CatalogVerdict::EmptyGenre {
                best_score: best.score,
            },
            candidates.len(),
            None,
        );
    }

    (
        CatalogVerdict::Accepted {
            best_score: best.score,
            index: best.index,
        },
        candidates.len(),
        Some(genre.to_string()),
    )
}

/// Crowd names first, then ML names not already present (case-insensitive).
/// Placeholder names are dropped from both.
pub fn merge_genres(crowd: &[String], ml: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();
    for name in crowd.iter().chain(ml.iter()) {
        let name = name.trim();
        if name.is_empty() || is_generic_tag(name) {
            continue;
        }
        if !merged.iter().any(|g| g.eq_ignore_ascii_case(name)) {
            merged.push(name.to_string());
        }
    }
    merged
}

// ============================================================================
// Resolution
// ============================================================================

/// Pick the genre for one track.
///
/// `catalog` is the catalog search result (or its failure), `crowd` is only
/// consulted when the catalog tier is rejected, and `ml` may be absent when
/// the local classifier could not run. Never fails: with no usable source the
/// outcome has no genres and tier `ml`.
pub fn resolve(
    identity: &TrackIdentity,
    catalog: &CatalogResult,
    crowd: &dyn CrowdTagFetcher,
    ml: Option<&MlPrediction>,
    settings: &ResolverSettings,
) -> ResolutionOutcome {
    let ml_genres = ml
        .map(|p| p.top_genres(settings.ml_keep_prob, settings.ml_genre_limit))
        .unwrap_or_default();

    let mut confidence = Confidence {
        catalog: CatalogVerdict::Disabled,
        candidates_scored: 0,
        crowd_tags: None,
        ml_genres: ml_genres.len(),
    };

    let inputs = TierInputs {
        identity,
        catalog,
        crowd,
        ml_genres,
        settings,
    };

    for tier in TIER_PRIORITY {
        if let Some(genres) = tier.attempt(&inputs, &mut confidence) {
            return ResolutionOutcome {
                genres,
                tier: tier.source(),
                confidence,
            };
        }
    }

    // Ml always accepts; kept total in case the priority list changes
    ResolutionOutcome {
        genres: Vec::new(),
        tier: SourceTier::Ml,
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::GenreScore;
    use crate::models::MoodScores;
    use crate::normalize::normalize_identity;
    use std::cell::Cell;

    fn candidate(mix: &str, genre: &str) -> Candidate {
        Candidate {
            artist: "Massive Attack".to_string(),
            title: "Teardrop".to_string(),
            mix_label: mix.to_string(),
            genre: genre.to_string(),
        }
    }

    fn prediction(genres: &[(&str, f32)]) -> MlPrediction {
        MlPrediction {
            moods: MoodScores::default(),
            genres: genres
                .iter()
                .map(|(label, prob)| GenreScore {
                    label: label.to_string(),
                    prob: *prob,
                })
                .collect(),
        }
    }

    fn crowd_tags(_identity: &TrackIdentity) -> Result<Vec<CrowdTag>, CollaboratorError> {
        Ok(vec![CrowdTag::new("trip-hop", 100), CrowdTag::new("electronic", 60)])
    }

    fn crowd_down(_identity: &TrackIdentity) -> Result<Vec<CrowdTag>, CollaboratorError> {
        Err(CollaboratorError::Timeout(std::time::Duration::from_secs(5)))
    }

    fn remix_identity() -> TrackIdentity {
        normalize_identity("Massive Attack", "Teardrop (Friction & Subsonic Remix)", "")
    }

    #[test]
    fn test_remix_rejection_falls_through_to_crowd() {
        let catalog = Ok(vec![candidate("Original Mix", "Trip Hop")]);
        let ml = prediction(&[("Downtempo", 0.4)]);
        let outcome = resolve(&remix_identity(), &catalog, &crowd_tags, Some(&ml), &ResolverSettings::default());

        assert_eq!(outcome.tier, SourceTier::CrowdMl);
        assert_eq!(
            outcome.confidence.catalog,
            CatalogVerdict::BelowThreshold {
                best_score: 0,
                threshold: 10
            }
        );
        assert_eq!(outcome.genres, vec!["Trip-Hop", "Electronic", "Downtempo"]);
    }

    #[test]
    fn test_remix_acceptance_short_circuits() {
        let catalog = Ok(vec![
            candidate("Original Mix", "Trip Hop"),
            candidate("Friction & Subsonic Remix", "Drum & Bass"),
        ]);
        let crowd_called = Cell::new(false);
        let crowd = |_: &TrackIdentity| -> Result<Vec<CrowdTag>, CollaboratorError> {
            crowd_called.set(true);
            Ok(Vec::new())
        };
        let outcome = resolve(&remix_identity(), &catalog, &crowd, None, &ResolverSettings::default());

        assert_eq!(outcome.tier, SourceTier::Catalog);
        assert_eq!(outcome.genres, vec!["Drum & Bass"]);
        assert_eq!(
            outcome.confidence.catalog,
            CatalogVerdict::Accepted {
                best_score: 40,
                index: 1
            }
        );
        assert!(!crowd_called.get());
    }

    #[test]
    fn test_generic_descriptor_acceptance() {
        let identity = normalize_identity("Massive Attack", "Teardrop", "");
        let catalog = Ok(vec![candidate("Extended Mix", "Trip Hop")]);
        let outcome = resolve(&identity, &catalog, &crowd_tags, None, &ResolverSettings::default());
        assert_eq!(outcome.tier, SourceTier::Catalog);
        assert_eq!(outcome.genres, vec!["Trip Hop"]);
    }

    #[test]
    fn test_negative_score_rejected_without_descriptor() {
        let identity = normalize_identity("Someone", "Angel", "");
        let catalog = Ok(vec![candidate("Friction Remix", "Trip Hop")]);
        let outcome = resolve(&identity, &catalog, &crowd_tags, None, &ResolverSettings::default());
        assert_eq!(outcome.tier, SourceTier::CrowdMl);
        assert!(matches!(
            outcome.confidence.catalog,
            CatalogVerdict::BelowThreshold { best_score: -10, threshold: 0 }
        ));
    }

    #[test]
    fn test_empty_catalog_and_crowd_failure_fall_back_to_ml() {
        let identity = normalize_identity("Massive Attack", "Teardrop", "");
        let ml = prediction(&[("Trip Hop", 0.5), ("Downtempo", 0.2), ("Ambient", 0.05)]);
        let outcome = resolve(&identity, &Ok(Vec::new()), &crowd_down, Some(&ml), &ResolverSettings::default());

        assert_eq!(outcome.tier, SourceTier::Ml);
        assert_eq!(outcome.genres, vec!["Trip Hop", "Downtempo"]);
        assert_eq!(outcome.confidence.catalog, CatalogVerdict::NoCandidates);
        assert_eq!(outcome.confidence.crowd_tags, None);
    }

    #[test]
    fn test_catalog_failure_is_unavailable_not_error() {
        let identity = normalize_identity("Massive Attack", "Teardrop", "");
        let catalog = Err(CollaboratorError::Transport("503".to_string()));
        let outcome = resolve(&identity, &catalog, &NoCrowdTags, None, &ResolverSettings::default());
        assert_eq!(outcome.tier, SourceTier::Ml);
        assert!(outcome.genres.is_empty());
        assert!(matches!(outcome.confidence.catalog, CatalogVerdict::Unavailable { .. }));
    }

    #[test]
    fn test_missing_ml_gives_empty_ml_outcome() {
        let outcome = resolve(&remix_identity(), &Ok(Vec::new()), &crowd_down, None, &ResolverSettings::default());
        assert_eq!(outcome.tier, SourceTier::Ml);
        assert!(!outcome.has_genre());
    }

    #[test]
    fn test_best_candidate_without_genre_rejects_catalog() {
        let catalog = Ok(vec![candidate("Friction & Subsonic Remix", "")]);
        let ml = prediction(&[("Drum & Bass", 0.6)]);
        let outcome = resolve(&remix_identity(), &catalog, &crowd_down, Some(&ml), &ResolverSettings::default());
        assert_eq!(outcome.tier, SourceTier::Ml);
        assert_eq!(outcome.confidence.catalog, CatalogVerdict::EmptyGenre { best_score: 40 });
    }

    #[test]
    fn test_catalog_disabled() {
        let mut settings = ResolverSettings::default();
        settings.catalog_enabled = false;
        let catalog = Ok(vec![candidate("Friction & Subsonic Remix", "Drum & Bass")]);
        let outcome = resolve(&remix_identity(), &catalog, &crowd_tags, None, &settings);
        assert_eq!(outcome.tier, SourceTier::CrowdMl);
        assert_eq!(outcome.confidence.catalog, CatalogVerdict::Disabled);
    }

    #[test]
    fn test_generic_crowd_tags_are_replaced_by_ml() {
        let identity = normalize_identity("Massive Attack", "Teardrop", "");
        let crowd = |_: &TrackIdentity| -> Result<Vec<CrowdTag>, CollaboratorError> {
            Ok(vec![CrowdTag::new("music", 500)])
        };
        let ml = prediction(&[("Trip Hop", 0.5)]);
        let outcome = resolve(&identity, &Ok(Vec::new()), &crowd, Some(&ml), &ResolverSettings::default());
        assert_eq!(outcome.tier, SourceTier::CrowdMl);
        assert_eq!(outcome.genres, vec!["Trip Hop"]);
    }

    #[test]
    fn test_crowd_tags_below_vote_count_count_as_unavailable() {
        let identity = normalize_identity("Massive Attack", "Teardrop", "");
        let crowd = |_: &TrackIdentity| -> Result<Vec<CrowdTag>, CollaboratorError> {
            Ok(vec![CrowdTag::new("trip-hop", 3)])
        };
        let ml = prediction(&[("Trip Hop", 0.5)]);
        let outcome = resolve(&identity, &Ok(Vec::new()), &crowd, Some(&ml), &ResolverSettings::default());
        assert_eq!(outcome.tier, SourceTier::Ml);
    }

    #[test]
    fn test_merge_genres_dedupes_case_insensitively() {
        let crowd = vec!["Trip-Hop".to_string(), "Other".to_string()];
        let ml = vec!["trip-hop".to_string(), "Downtempo".to_string()];
        assert_eq!(merge_genres(&crowd, &ml), vec!["Trip-Hop", "Downtempo"]);
    }
}
