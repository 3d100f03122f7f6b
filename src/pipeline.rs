//! Per-track processing: normalize, resolve, reconcile.
//!
//! Each track is handled independently and produces either a complete
//! write set or an empty one, so tracks can run in parallel.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::catalog::search_query;
use crate::collaborator::{crowd_tags_with_fallback, lookup_catalog, CatalogSource, CrowdTagSource};
use crate::config::ResolverSettings;
use crate::crowd::CrowdTag;
use crate::error::CollaboratorError;
use crate::metrics::DerivedMetrics;
use crate::ml::{MlPrediction, RawMlOutput};
use crate::models::{ExistingTagSnapshot, ResolutionOutcome, TrackIdentity};
use crate::normalize::{normalize_identity, parse_filename, strip_country_code};
use crate::reconcile::{needs_retag, reconcile, refresh_summary, TagWriteSet};
use crate::resolver::{resolve, CatalogResult};

/// One track as handed over by the tag reader and the ML analyzer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackRequest {
    pub filename: String,
    /// Artist tag; blank falls back to the filename
    pub artist: String,
    /// Title tag; blank falls back to the filename
    pub title: String,
    pub existing: ExistingTagSnapshot,
    /// None when the audio could not be analyzed
    pub ml: Option<MlPrediction>,
    /// Unranked classifier output, used when `ml` is absent
    pub ml_raw: Option<RawMlOutput>,
}

/// Raw names used to query the external sources.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LookupNames {
    pub artist: String,
    pub artist_clean: String,
    pub title: String,
}

impl TrackRequest {
    /// The ranked prediction, built from raw classifier output when that is all there is
    pub fn prediction(&self, min_prob: f32) -> Option<Cow<'_, MlPrediction>> {
        match (&self.ml, &self.ml_raw) {
            (Some(ml), _) => Some(Cow::Borrowed(ml)),
            (None, Some(raw)) => Some(Cow::Owned(raw.to_prediction(min_prob))),
            (None, None) => None,
        }
    }

    pub fn lookup_names(&self) -> LookupNames {
        let parsed = parse_filename(&self.filename);
        let artist = if self.artist.trim().is_empty() {
            parsed.artist
        } else {
            self.artist.trim().to_string()
        };
        let title = if self.title.trim().is_empty() {
            parsed.title
        } else {
            self.title.trim().to_string()
        };
        LookupNames {
            artist_clean: strip_country_code(&artist),
            artist,
            title,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunMode {
    /// Resolve and tag; `force` ignores the version stamp
    Tag { force: bool },
    /// Only rebuild comment fields from stored metrics
    RefreshComments,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackStatus {
    Tagged,
    /// Already stamped with the current version
    UpToDate,
    /// No ML prediction, so no metrics to write
    NoAnalysis,
    Refreshed,
    /// Nothing stored to refresh from
    NothingToRefresh,
}

/// Result for one track, printed as one JSON line by the driver.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrackReport {
    pub filename: String,
    pub status: TrackStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ResolutionOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<DerivedMetrics>,
    pub writes: TagWriteSet,
}

impl TrackReport {
    fn without_writes(request: &TrackRequest, status: TrackStatus) -> Self {
        Self {
            filename: request.filename.clone(),
            status,
            outcome: None,
            metrics: None,
            writes: TagWriteSet::empty(),
        }
    }
}

pub struct Pipeline {
    catalog: Arc<dyn CatalogSource>,
    crowd: Arc<dyn CrowdTagSource>,
    settings: ResolverSettings,
    mode: RunMode,
}

impl Pipeline {
    pub fn new(
        catalog: Arc<dyn CatalogSource>,
        crowd: Arc<dyn CrowdTagSource>,
        settings: ResolverSettings,
        mode: RunMode,
    ) -> Self {
        Self {
            catalog,
            crowd,
            settings,
            mode,
        }
    }

    pub fn process(&self, request: &TrackRequest) -> TrackReport {
        match self.mode {
            RunMode::RefreshComments => self.refresh(request),
            RunMode::Tag { force } => self.tag(request, force),
        }
    }

    fn refresh(&self, request: &TrackRequest) -> TrackReport {
        let writes = refresh_summary(&request.existing);
        if writes.is_empty() {
            return TrackReport::without_writes(request, TrackStatus::NothingToRefresh);
        }
        TrackReport {
            writes,
            ..TrackReport::without_writes(request, TrackStatus::Refreshed)
        }
    }

    fn tag(&self, request: &TrackRequest, force: bool) -> TrackReport {
        let version = &self.settings.version_stamp;
        if !needs_retag(&request.existing, force, version) {
            debug!(file = %request.filename, "already tagged with {}", version);
            return TrackReport::without_writes(request, TrackStatus::UpToDate);
        }
        let Some(ml) = request.prediction(self.settings.ml_min_prob) else {
            warn!(file = %request.filename, "no ML prediction, skipping");
            return TrackReport::without_writes(request, TrackStatus::NoAnalysis);
        };

        let names = request.lookup_names();
        let identity = normalize_identity(&request.artist, &request.title, &request.filename);
        let catalog = self.search_catalog(&names);

        let crowd_names = [names.artist_clean.clone(), names.artist.clone()];
        let crowd = |_: &TrackIdentity| -> Result<Vec<CrowdTag>, CollaboratorError> {
            crowd_tags_with_fallback(&self.crowd, &crowd_names, &self.settings)
        };

        let outcome = resolve(&identity, &catalog, &crowd, Some(&*ml), &self.settings);
        let metrics = DerivedMetrics::from_moods(&ml.moods);
        let writes = reconcile(&request.existing, &outcome, &metrics, &ml.moods, force, version);

        debug!(
            file = %request.filename,
            tier = %outcome.tier,
            genres = ?outcome.genres,
            "resolved"
        );

        TrackReport {
            filename: request.filename.clone(),
            status: TrackStatus::Tagged,
            outcome: Some(outcome),
            metrics: Some(metrics),
            writes,
        }
    }

    fn search_catalog(&self, names: &LookupNames) -> CatalogResult {
        if !self.settings.catalog_enabled {
            return Err(CollaboratorError::Disabled("catalog lookups turned off".to_string()));
        }
        let query = search_query(&names.artist_clean, &names.title);
        lookup_catalog(&self.catalog, &query, &self.settings).map_err(|err| {
            warn!(query = %query.text, error = %err, "catalog lookup failed");
            err
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogQuery;
    use crate::config::TAGGER_VERSION;
    use crate::ml::GenreScore;
    use crate::models::{Candidate, MoodScores, SourceTier};
    use crate::reconcile::{GenreAction, TagKey};

    struct EmptyCatalog;

    impl CatalogSource for EmptyCatalog {
        fn search(&self, _query: &CatalogQuery) -> Result<Vec<Candidate>, CollaboratorError> {
            Ok(Vec::new())
        }
    }

    struct RemixCatalog;

    impl CatalogSource for RemixCatalog {
        fn search(&self, query: &CatalogQuery) -> Result<Vec<Candidate>, CollaboratorError> {
            assert_eq!(query.text, "Massive Attack Teardrop friction subsonic");
            Ok(vec![Candidate {
                artist: "Massive Attack".to_string(),
                title: "Teardrop".to_string(),
                mix_label: "Friction & Subsonic Remix".to_string(),
                genre: "Drum & Bass".to_string(),
            }])
        }
    }

    struct TripHopCrowd;

    impl CrowdTagSource for TripHopCrowd {
        fn top_tags(&self, artist: &str) -> Result<Vec<CrowdTag>, CollaboratorError> {
            match artist {
                "Massive Attack" => Ok(vec![
                    CrowdTag::new("trip-hop", 100),
                    CrowdTag::new("electronic", 60),
                    CrowdTag::new("seen live", 4),
                ]),
                _ => Err(CollaboratorError::Transport("artist not found".to_string())),
            }
        }
    }

    fn request(existing_genre: &str) -> TrackRequest {
        TrackRequest {
            filename: "Massive Attack (UK) - Teardrop.mp3".to_string(),
            existing: ExistingTagSnapshot {
                genre: existing_genre.to_string(),
                ..Default::default()
            },
            ml: Some(MlPrediction {
                moods: MoodScores {
                    happy: 0.2,
                    sad: 0.6,
                    aggressive: 0.1,
                    relaxed: 0.8,
                },
                genres: vec![GenreScore {
                    label: "Downtempo".to_string(),
                    prob: 0.4,
                }],
            }),
            ..Default::default()
        }
    }

    fn pipeline(catalog: Arc<dyn CatalogSource>, mode: RunMode) -> Pipeline {
        Pipeline::new(catalog, Arc::new(TripHopCrowd), ResolverSettings::default(), mode)
    }

    #[test]
    fn test_lookup_names_fall_back_to_filename() {
        let names = request("").lookup_names();
        assert_eq!(names.artist, "Massive Attack (UK)");
        assert_eq!(names.artist_clean, "Massive Attack");
        assert_eq!(names.title, "Teardrop");

        let tagged = TrackRequest {
            artist: " Portishead ".to_string(),
            title: "Roads".to_string(),
            ..request("")
        };
        assert_eq!(tagged.lookup_names().artist, "Portishead");
        assert_eq!(tagged.lookup_names().title, "Roads");
    }

    #[test]
    fn test_other_genre_track_end_to_end() {
        let report = pipeline(Arc::new(EmptyCatalog), RunMode::Tag { force: false }).process(&request("Other"));

        assert_eq!(report.status, TrackStatus::Tagged);
        let outcome = report.outcome.as_ref().unwrap();
        assert_eq!(outcome.tier, SourceTier::CrowdMl);
        assert_eq!(report.writes.get(TagKey::Genre), Some("Trip-Hop; Electronic; Downtempo"));
        assert_eq!(report.writes.get(TagKey::GenreSource), Some("crowd+ml"));
        assert_eq!(report.writes.get(TagKey::TaggerVersion), Some(TAGGER_VERSION));
        assert_eq!(report.writes.get(TagKey::Comment), Some("Energy: Mid | Mood: Dark"));
        assert_eq!(report.writes.genre_action(), Some(&GenreAction::Replaced));
    }

    #[test]
    fn test_remix_track_accepts_catalog() {
        let mut track = request("Techno");
        track.filename = "Massive Attack - Teardrop (Friction & Subsonic Remix).mp3".to_string();
        let report = pipeline(Arc::new(RemixCatalog), RunMode::Tag { force: false }).process(&track);

        assert_eq!(report.outcome.as_ref().unwrap().tier, SourceTier::Catalog);
        assert_eq!(report.writes.get(TagKey::Genre), None);
        assert_eq!(report.writes.get(TagKey::GenreDetected), Some("Drum & Bass"));
    }

    #[test]
    fn test_current_stamp_skips_unless_forced() {
        let mut track = request("Other");
        track.existing.version_stamp = Some(TAGGER_VERSION.to_string());

        let report = pipeline(Arc::new(EmptyCatalog), RunMode::Tag { force: false }).process(&track);
        assert_eq!(report.status, TrackStatus::UpToDate);
        assert!(report.writes.is_empty());

        let forced = pipeline(Arc::new(EmptyCatalog), RunMode::Tag { force: true }).process(&track);
        assert_eq!(forced.status, TrackStatus::Tagged);
        assert!(!forced.writes.is_empty());
    }

    #[test]
    fn test_raw_classifier_output_is_ranked() {
        let mut track = request("Other");
        let moods = track.ml.take().unwrap().moods;
        track.ml_raw = Some(RawMlOutput {
            moods,
            labels: vec![
                "Rock---Shoegaze".to_string(),
                "Electronic---Downtempo".to_string(),
            ],
            probs: vec![0.2, 0.4],
        });

        let report = pipeline(Arc::new(EmptyCatalog), RunMode::Tag { force: false }).process(&track);
        assert_eq!(report.status, TrackStatus::Tagged);
        assert_eq!(
            report.writes.get(TagKey::Genre),
            Some("Trip-Hop; Electronic; Downtempo; Shoegaze")
        );

        let mut settings = ResolverSettings::default();
        settings.ml_min_prob = 0.3;
        let strict = Pipeline::new(
            Arc::new(EmptyCatalog),
            Arc::new(TripHopCrowd),
            settings,
            RunMode::Tag { force: false },
        );
        let report = strict.process(&track);
        assert_eq!(report.writes.get(TagKey::Genre), Some("Trip-Hop; Electronic; Downtempo"));
    }

    #[test]
    fn test_missing_prediction_is_skipped() {
        let mut track = request("Other");
        track.ml = None;
        let report = pipeline(Arc::new(EmptyCatalog), RunMode::Tag { force: false }).process(&track);
        assert_eq!(report.status, TrackStatus::NoAnalysis);
        assert!(report.writes.is_empty());
    }

    #[test]
    fn test_disabled_catalog_never_searches() {
        let mut settings = ResolverSettings::default();
        settings.catalog_enabled = false;
        let pipeline = Pipeline::new(
            Arc::new(RemixCatalog),
            Arc::new(TripHopCrowd),
            settings,
            RunMode::Tag { force: false },
        );
        let report = pipeline.process(&request("Other"));
        assert_eq!(report.outcome.unwrap().tier, SourceTier::CrowdMl);
    }

    #[test]
    fn test_refresh_mode() {
        let mut track = request("House");
        track.existing.version_stamp = Some("v3".to_string());
        track.existing.energy = Some(0.9);
        track.existing.valence = Some(0.2);

        let report = pipeline(Arc::new(EmptyCatalog), RunMode::RefreshComments).process(&track);
        assert_eq!(report.status, TrackStatus::Refreshed);
        assert_eq!(report.writes.get(TagKey::Comment), Some("Energy: High | Mood: Dark"));
        assert_eq!(report.writes.get(TagKey::Genre), None);

        let report = pipeline(Arc::new(EmptyCatalog), RunMode::RefreshComments).process(&request("House"));
        assert_eq!(report.status, TrackStatus::NothingToRefresh);
    }
}
