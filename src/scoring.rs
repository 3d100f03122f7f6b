//! Scoring of catalog candidates against a track identity.
//!
//! Every rule is an independent (predicate, weight) pair; a candidate's score
//! is the sum of the weights whose predicate holds. Remix mismatches must
//! outweigh a title + artist match, and partial descriptor overlap must rank
//! above a wrong remix, so the weights are fixed.

use tracing::debug;

use crate::models::{Candidate, ScoredCandidate, TrackIdentity};
use crate::normalize::{
    artist_credits, extract_mix_info, is_generic_mix_label, normalize_artist, normalize_text,
    normalize_title, remix_key_words,
};

// ============================================================================
// Score Thresholds
// ============================================================================

/// Minimum best score to accept the catalog when a specific remix is requested
pub const SPECIFIC_REMIX_THRESHOLD: i32 = 10;

/// Minimum best score to accept the catalog when any mix will do
pub const GENERIC_MIX_THRESHOLD: i32 = 0;

// ============================================================================
// Match Context
// ============================================================================

/// Comparisons between one identity and one candidate, computed once and
/// shared by all rules.
#[derive(Debug, Clone)]
pub struct MatchContext {
    pub title_match: bool,
    pub artist_match: bool,
    /// Track names a non-generic remix
    pub wants_specific: bool,
    /// Normalized candidate mix label
    pub label: String,
    pub label_generic: bool,
    pub exact_mix: bool,
    /// Shares at least one remix key word with the descriptor, not exact
    pub partial_mix: bool,
}

impl MatchContext {
    pub fn new(identity: &TrackIdentity, candidate: &Candidate) -> Self {
        let title_match =
            !identity.title().is_empty() && normalize_title(&candidate.title) == identity.title();

        let artist_match = !identity.artist().is_empty()
            && (normalize_artist(&candidate.artist) == identity.artist()
                || artist_credits(&candidate.artist)
                    .iter()
                    .any(|a| a == identity.artist()));

        let label = normalize_text(&effective_mix_label(candidate));
        let label_generic = is_generic_mix_label(&label);
        let wants_specific = identity.requests_specific_remix();

        let exact_mix = identity.remix().is_some_and(|r| r.as_text() == label);
        let partial_mix = wants_specific
            && !label_generic
            && !exact_mix
            && identity.remix().is_some_and(|r| {
                let wanted = r.key_words();
                remix_key_words(&label).iter().any(|w| wanted.contains(w))
            });

        Self {
            title_match,
            artist_match,
            wants_specific,
            label,
            label_generic,
            exact_mix,
            partial_mix,
        }
    }
}

/// The candidate's mix label, or the mix named in its title when the label is blank.
pub fn effective_mix_label(candidate: &Candidate) -> String {
    if candidate.mix_label.trim().is_empty() {
        extract_mix_info(&candidate.title).1.unwrap_or_default()
    } else {
        candidate.mix_label.clone()
    }
}

// ============================================================================
// Rule Table
// ============================================================================

/// One additive scoring rule.
pub struct ScoreRule {
    pub name: &'static str,
    pub weight: i32,
    pub applies: fn(&MatchContext) -> bool,
}

fn title_matches(ctx: &MatchContext) -> bool {
    ctx.title_match
}

fn artist_matches(ctx: &MatchContext) -> bool {
    ctx.artist_match
}

fn mix_exact(ctx: &MatchContext) -> bool {
    ctx.exact_mix
}

fn mix_partial(ctx: &MatchContext) -> bool {
    ctx.partial_mix
}

fn generic_wanted_generic_found(ctx: &MatchContext) -> bool {
    !ctx.wants_specific && ctx.label_generic
}

fn title_differs(ctx: &MatchContext) -> bool {
    !ctx.title_match
}

fn specific_wanted_generic_found(ctx: &MatchContext) -> bool {
    ctx.wants_specific && ctx.label_generic
}

fn specific_wanted_other_remix_found(ctx: &MatchContext) -> bool {
    ctx.wants_specific && !ctx.label_generic && !ctx.exact_mix && !ctx.partial_mix
}

pub static SCORE_RULES: [ScoreRule; 8] = [
    ScoreRule { name: "title_match", weight: 10, applies: title_matches },
    ScoreRule { name: "artist_match", weight: 5, applies: artist_matches },
    ScoreRule { name: "mix_exact", weight: 25, applies: mix_exact },
    ScoreRule { name: "mix_partial", weight: 15, applies: mix_partial },
    ScoreRule { name: "generic_mix_preferred", weight: 3, applies: generic_wanted_generic_found },
    ScoreRule { name: "title_mismatch", weight: -10, applies: title_differs },
    ScoreRule { name: "wanted_remix_got_generic", weight: -15, applies: specific_wanted_generic_found },
    ScoreRule { name: "wanted_remix_got_other", weight: -20, applies: specific_wanted_other_remix_found },
];

// ============================================================================
// Scoring
// ============================================================================

/// Rules that fired for this candidate, with their weights
pub fn score_breakdown(identity: &TrackIdentity, candidate: &Candidate) -> Vec<(&'static str, i32)> {
    let ctx = MatchContext::new(identity, candidate);
    SCORE_RULES
        .iter()
        .filter(|rule| (rule.applies)(&ctx))
        .map(|rule| (rule.name, rule.weight))
        .collect()
}

/// Score a candidate for match quality. Higher = better.
pub fn score(identity: &TrackIdentity, candidate: &Candidate) -> i32 {
    score_breakdown(identity, candidate)
        .iter()
        .map(|(_, weight)| weight)
        .sum()
}

/// Score all candidates and order them best first.
/// Equal scores keep catalog order, so the first-listed candidate wins ties.
pub fn rank_candidates(identity: &TrackIdentity, candidates: &[Candidate]) -> Vec<ScoredCandidate> {
    let mut scored: Vec<ScoredCandidate> = candidates
        .iter()
        .enumerate()
        .map(|(index, candidate)| {
            let breakdown = score_breakdown(identity, candidate);
            let score: i32 = breakdown.iter().map(|(_, w)| w).sum();
            debug!(
                index,
                score,
                title = %candidate.title,
                mix = %candidate.mix_label,
                rules = ?breakdown,
                "scored catalog candidate"
            );
            ScoredCandidate {
                candidate: candidate.clone(),
                score,
                index,
            }
        })
        .collect();

    // sort_by is stable: ties stay in catalog order
    scored.sort_by(|a, b| b.score.cmp(&a.score));
    scored
}

/// Best-scoring candidate, or None for an empty list
pub fn best_candidate(identity: &TrackIdentity, candidates: &[Candidate]) -> Option<ScoredCandidate> {
    rank_candidates(identity, candidates).into_iter().next()
}

// ============================================================================
// TESTS
// ============================================================================
