//! Local ML classifier output as consumed by the resolver.
//!
//! The classifier itself runs elsewhere; this module only shapes its raw
//! per-class probabilities into a ranked genre list.

use serde::{Deserialize, Serialize};

use crate::models::MoodScores;

/// Classifier labels come as "Parent---Style"; only the style is used.
const LABEL_SEPARATOR: &str = "---";

/// Genres kept from the raw class scores before any resolver filtering
const RAW_GENRE_LIMIT: usize = 5;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenreScore {
    pub label: String,
    pub prob: f32,
}

/// Moods and ranked genres predicted for one track.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MlPrediction {
    pub moods: MoodScores,
    /// Highest probability first
    #[serde(default)]
    pub genres: Vec<GenreScore>,
}

impl MlPrediction {
    /// Genre names with probability at or above `keep_prob`, best first, at most `limit`.
    pub fn top_genres(&self, keep_prob: f32, limit: usize) -> Vec<String> {
        self.genres
            .iter()
            .take(limit)
            .filter(|g| g.prob >= keep_prob && !g.label.trim().is_empty())
            .map(|g| g.label.clone())
            .collect()
    }
}

/// Classifier output before ranking: one probability per class label.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMlOutput {
    pub moods: MoodScores,
    pub labels: Vec<String>,
    pub probs: Vec<f32>,
}

impl RawMlOutput {
    pub fn to_prediction(&self, min_prob: f32) -> MlPrediction {
        MlPrediction {
            moods: self.moods,
            genres: rank_raw_scores(&self.labels, &self.probs, min_prob),
        }
    }
}

/// "Electronic---Deep House" → "Deep House"
pub fn clean_label(label: &str) -> String {
    label
        .rsplit(LABEL_SEPARATOR)
        .next()
        .unwrap_or(label)
        .trim()
        .to_string()
}

/// Build a ranked genre list from parallel label/probability arrays.
/// Keeps the five most probable classes, stopping at the first one below `min_prob`.
pub fn rank_raw_scores(labels: &[String], probs: &[f32], min_prob: f32) -> Vec<GenreScore> {
    let mut pairs: Vec<(&String, f32)> = labels.iter().zip(probs.iter().copied()).collect();
    pairs.sort_by(|a, b| b.1.total_cmp(&a.1));

    pairs
        .into_iter()
        .take(RAW_GENRE_LIMIT)
        .take_while(|(_, prob)| *prob >= min_prob)
        .map(|(label, prob)| GenreScore {
            label: clean_label(label),
            prob: (prob * 1000.0).round() / 1000.0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_label() {
        assert_eq!(clean_label("Electronic---Deep House"), "Deep House");
        assert_eq!(clean_label("Ambient"), "Ambient");
    }

    #[test]
    fn test_rank_raw_scores() {
        let labels: Vec<String> = [
            "Electronic---House",
            "Electronic---Techno",
            "Rock---Indie Rock",
            "Electronic---Trance",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let probs = [0.30, 0.45, 0.02, 0.08];

        let ranked = rank_raw_scores(&labels, &probs, 0.05);
        let names: Vec<&str> = ranked.iter().map(|g| g.label.as_str()).collect();
        assert_eq!(names, vec!["Techno", "House", "Trance"]);
    }

    #[test]
    fn test_raw_output_to_prediction() {
        let raw: RawMlOutput = serde_json::from_str(
            r#"{"moods": {"happy": 0.2, "sad": 0.6, "aggressive": 0.1, "relaxed": 0.8},
                "labels": ["Electronic---Trip Hop", "Electronic---Downtempo", "Rock---Shoegaze"],
                "probs": [0.52, 0.21, 0.07]}"#,
        )
        .unwrap();

        let prediction = raw.to_prediction(0.05);
        assert_eq!(prediction.moods.relaxed, 0.8);
        let names: Vec<&str> = prediction.genres.iter().map(|g| g.label.as_str()).collect();
        assert_eq!(names, vec!["Trip Hop", "Downtempo", "Shoegaze"]);

        assert_eq!(raw.to_prediction(0.10).genres.len(), 2);
    }

    #[test]
    fn test_top_genres_respects_keep_prob_and_limit() {
        let prediction = MlPrediction {
            moods: MoodScores::default(),
            genres: vec![
                GenreScore { label: "Techno".into(), prob: 0.45 },
                GenreScore { label: "House".into(), prob: 0.30 },
                GenreScore { label: "Trance".into(), prob: 0.08 },
                GenreScore { label: "Electro".into(), prob: 0.20 },
            ],
        };
        assert_eq!(prediction.top_genres(0.10, 3), vec!["Techno", "House"]);
        assert_eq!(prediction.top_genres(0.10, 1), vec!["Techno"]);
    }
}
