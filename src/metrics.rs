//! Energy/valence derivation and the human-readable summary built from them.
//!
//! All functions here are pure: the same moods always give the same metrics
//! and the same summary text, which keeps re-tagging idempotent.

use serde::Serialize;

use crate::models::MoodScores;

/// Energy and valence derived from mood probabilities, each in [0, 1].
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct DerivedMetrics {
    pub energy: f64,
    pub valence: f64,
}

impl DerivedMetrics {
    /// energy  = min(1, (aggressive + (1 - relaxed)) / 2 * 1.5 + 0.3)
    /// valence = (happy - sad + 1) / 2
    ///
    /// Inputs are clamped to [0, 1] first and results rounded to 3 decimals,
    /// the precision they are stored with.
    pub fn from_moods(moods: &MoodScores) -> Self {
        let happy = moods.happy.clamp(0.0, 1.0);
        let sad = moods.sad.clamp(0.0, 1.0);
        let aggressive = moods.aggressive.clamp(0.0, 1.0);
        let relaxed = moods.relaxed.clamp(0.0, 1.0);

        let raw_energy = (aggressive + (1.0 - relaxed)) / 2.0;
        let energy = (raw_energy * 1.5 + 0.3).min(1.0);
        let valence = (happy - sad + 1.0) / 2.0;

        Self {
            energy: round3(energy),
            valence: round3(valence),
        }
    }
}

pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Fixed-precision rendering used for every numeric tag value
pub fn format_value(value: f64) -> String {
    format!("{:.3}", round3(value))
}

// ============================================================================
// Binning
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum EnergyLevel {
    Low,
    Mid,
    High,
}

impl EnergyLevel {
    pub fn from_energy(energy: f64) -> Self {
        if energy < 0.4 {
            EnergyLevel::Low
        } else if energy < 0.7 {
            EnergyLevel::Mid
        } else {
            EnergyLevel::High
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EnergyLevel::Low => "Low",
            EnergyLevel::Mid => "Mid",
            EnergyLevel::High => "High",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ValenceLevel {
    Dark,
    Neutral,
    Bright,
}

impl ValenceLevel {
    pub fn from_valence(valence: f64) -> Self {
        if valence < 0.33 {
            ValenceLevel::Dark
        } else if valence < 0.66 {
            ValenceLevel::Neutral
        } else {
            ValenceLevel::Bright
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ValenceLevel::Dark => "Dark",
            ValenceLevel::Neutral => "Neutral",
            ValenceLevel::Bright => "Bright",
        }
    }
}

/// Highest-scoring mood axis. Ties resolve in the order happy, sad,
/// aggressive, relaxed.
pub fn dominant_mood(moods: &MoodScores) -> &'static str {
    let axes = [
        ("Happy", moods.happy),
        ("Sad", moods.sad),
        ("Aggressive", moods.aggressive),
        ("Relaxed", moods.relaxed),
    ];
    let mut best = axes[0];
    for axis in &axes[1..] {
        if axis.1 > best.1 {
            best = *axis;
        }
    }
    best.0
}

// ============================================================================
// Summary Text
// ============================================================================

/// Short summary shown in players: "Energy: High | Mood: Bright"
pub fn summary_comment(metrics: &DerivedMetrics) -> String {
    format!(
        "Energy: {} | Mood: {}",
        EnergyLevel::from_energy(metrics.energy).label(),
        ValenceLevel::from_valence(metrics.valence).label()
    )
}

/// Detailed comment with raw values and, when known, the dominant mood axis.
pub fn detail_comment(metrics: &DerivedMetrics, moods: Option<&MoodScores>) -> String {
    let mut detail = format!(
        "Energy:{} Mood:{} | E:{} V:{}",
        EnergyLevel::from_energy(metrics.energy).label(),
        ValenceLevel::from_valence(metrics.valence).label(),
        format_value(metrics.energy),
        format_value(metrics.valence)
    );
    if let Some(moods) = moods {
        detail.push_str(" | Dominant:");
        detail.push_str(dominant_mood(moods));
    }
    detail
}
