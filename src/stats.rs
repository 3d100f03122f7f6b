//! Run statistics for a batch, logged as a `[STATS:phase]` JSON block.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::MAX_WRITTEN_GENRES;
use crate::metrics::{EnergyLevel, ValenceLevel};
use crate::models::{CatalogVerdict, SourceTier};
use crate::pipeline::{TrackReport, TrackStatus};
use crate::reconcile::GenreAction;

/// Per-run counts across every processed track.
#[derive(Default, Debug, Clone, PartialEq, Serialize)]
pub struct ResolutionStats {
    // Track status
    pub total_tracks: usize,
    pub tagged: usize,
    pub up_to_date: usize,
    pub no_analysis: usize,
    pub refreshed: usize,
    pub nothing_to_refresh: usize,

    // Source tiers of tagged tracks
    pub tier_catalog: usize,
    pub tier_crowd_ml: usize,
    pub tier_ml: usize,

    // Catalog verdicts
    pub catalog_accepted: usize,
    pub catalog_below_threshold: usize,
    pub catalog_empty_genre: usize,
    pub catalog_no_candidates: usize,
    pub catalog_unavailable: usize,
    pub catalog_disabled: usize,

    // Primary genre field
    pub genre_replaced: usize,
    pub genre_kept: usize,
    pub genre_matches: usize,
    pub no_genre: usize,

    // Energy/valence bins
    pub energy_low: usize,
    pub energy_mid: usize,
    pub energy_high: usize,
    pub valence_dark: usize,
    pub valence_neutral: usize,
    pub valence_bright: usize,

    /// Genre name → number of tracks resolved to it
    pub genre_counts: BTreeMap<String, usize>,

    // Timing
    pub elapsed_seconds: f64,
}

impl ResolutionStats {
    pub fn from_reports<'a>(reports: impl IntoIterator<Item = &'a TrackReport>) -> Self {
        let mut stats = Self::default();
        for report in reports {
            stats.record(report);
        }
        stats
    }

    pub fn record(&mut self, report: &TrackReport) {
        self.total_tracks += 1;
        match report.status {
            TrackStatus::Tagged => self.tagged += 1,
            TrackStatus::UpToDate => self.up_to_date += 1,
            TrackStatus::NoAnalysis => self.no_analysis += 1,
            TrackStatus::Refreshed => self.refreshed += 1,
            TrackStatus::NothingToRefresh => self.nothing_to_refresh += 1,
        }

        if let Some(outcome) = &report.outcome {
            match outcome.tier {
                SourceTier::Catalog => self.tier_catalog += 1,
                SourceTier::CrowdMl => self.tier_crowd_ml += 1,
                SourceTier::Ml => self.tier_ml += 1,
            }
            match outcome.confidence.catalog {
                CatalogVerdict::Accepted { .. } => self.catalog_accepted += 1,
                CatalogVerdict::BelowThreshold { .. } => self.catalog_below_threshold += 1,
                CatalogVerdict::EmptyGenre { .. } => self.catalog_empty_genre += 1,
                CatalogVerdict::NoCandidates => self.catalog_no_candidates += 1,
                CatalogVerdict::Unavailable { .. } => self.catalog_unavailable += 1,
                CatalogVerdict::Disabled => self.catalog_disabled += 1,
            }
            for genre in outcome.genres.iter().take(MAX_WRITTEN_GENRES) {
                *self.genre_counts.entry(genre.clone()).or_default() += 1;
            }
        }

        match report.writes.genre_action() {
            Some(GenreAction::Replaced) => self.genre_replaced += 1,
            Some(GenreAction::Kept(_)) => self.genre_kept += 1,
            Some(GenreAction::Matches) => self.genre_matches += 1,
            Some(GenreAction::NoGenre) => self.no_genre += 1,
            None => {}
        }

        if let Some(metrics) = &report.metrics {
            match EnergyLevel::from_energy(metrics.energy) {
                EnergyLevel::Low => self.energy_low += 1,
                EnergyLevel::Mid => self.energy_mid += 1,
                EnergyLevel::High => self.energy_high += 1,
            }
            match ValenceLevel::from_valence(metrics.valence) {
                ValenceLevel::Dark => self.valence_dark += 1,
                ValenceLevel::Neutral => self.valence_neutral += 1,
                ValenceLevel::Bright => self.valence_bright += 1,
            }
        }
    }

    /// Share of tagged tracks that ended up with any genre, as a percentage
    pub fn resolution_rate(&self) -> f64 {
        if self.tagged == 0 {
            0.0
        } else {
            100.0 * (self.tagged - self.no_genre) as f64 / self.tagged as f64
        }
    }

    /// Most frequent genres, ties in name order
    pub fn top_genres(&self, n: usize) -> Vec<(&str, usize)> {
        let mut genres: Vec<(&str, usize)> = self
            .genre_counts
            .iter()
            .map(|(g, c)| (g.as_str(), *c))
            .collect();
        genres.sort_by(|a, b| b.1.cmp(&a.1));
        genres.truncate(n);
        genres
    }

    /// Log stats to stderr in JSON format
    pub fn log_phase(&self, phase: &str) {
        if let Ok(json) = serde_json::to_string_pretty(self) {
            eprintln!("[STATS:{}]\n{}", phase, json);
        }
    }

    /// Write stats to a JSON file
    pub fn write_to_file(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::DerivedMetrics;
    use crate::models::{Confidence, ResolutionOutcome};
    use crate::reconcile::TagWriteSet;

    fn tagged(tier: SourceTier, verdict: CatalogVerdict, genres: &[&str], energy: f64) -> TrackReport {
        TrackReport {
            filename: "track.mp3".to_string(),
            status: TrackStatus::Tagged,
            outcome: Some(ResolutionOutcome {
                genres: genres.iter().map(|g| g.to_string()).collect(),
                tier,
                confidence: Confidence {
                    catalog: verdict,
                    candidates_scored: 1,
                    crowd_tags: None,
                    ml_genres: 0,
                },
            }),
            metrics: Some(DerivedMetrics {
                energy,
                valence: 0.5,
            }),
            writes: TagWriteSet::empty(),
        }
    }

    fn skipped() -> TrackReport {
        TrackReport {
            filename: "done.mp3".to_string(),
            status: TrackStatus::UpToDate,
            outcome: None,
            metrics: None,
            writes: TagWriteSet::empty(),
        }
    }

    #[test]
    fn test_counts_tiers_and_bins() {
        let reports = vec![
            tagged(
                SourceTier::Catalog,
                CatalogVerdict::Accepted {
                    best_score: 40,
                    index: 0,
                },
                &["House"],
                0.9,
            ),
            tagged(SourceTier::CrowdMl, CatalogVerdict::NoCandidates, &["House", "Techno"], 0.5),
            tagged(SourceTier::Ml, CatalogVerdict::Disabled, &["Ambient"], 0.2),
            skipped(),
        ];
        let stats = ResolutionStats::from_reports(&reports);

        assert_eq!(stats.total_tracks, 4);
        assert_eq!(stats.tagged, 3);
        assert_eq!(stats.up_to_date, 1);
        assert_eq!(stats.tier_catalog, 1);
        assert_eq!(stats.tier_crowd_ml, 1);
        assert_eq!(stats.tier_ml, 1);
        assert_eq!(stats.catalog_accepted, 1);
        assert_eq!(stats.catalog_disabled, 1);
        assert_eq!((stats.energy_low, stats.energy_mid, stats.energy_high), (1, 1, 1));
        assert_eq!(stats.valence_neutral, 3);
        assert_eq!(stats.top_genres(2), vec![("House", 2), ("Ambient", 1)]);
    }

    #[test]
    fn test_resolution_rate() {
        let mut stats = ResolutionStats::default();
        assert_eq!(stats.resolution_rate(), 0.0);
        stats.tagged = 4;
        stats.no_genre = 1;
        assert!((stats.resolution_rate() - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_write_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run-stats.json");
        let stats = ResolutionStats::from_reports(&[skipped()]);
        stats.write_to_file(&path).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["up_to_date"], 1);
        assert_eq!(written["total_tracks"], 1);
    }
}
