//! Identity normalization for genre lookups.
//! Turns raw filename/tag strings into a canonical (artist, title, remix) identity.
//!
//! CRITICAL: Catalog candidates are normalized with the same functions, so any
//! change here shifts candidate scores. Run tests after changes.

use any_ascii::any_ascii;
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashSet;
use std::path::Path;
use unicode_normalization::UnicodeNormalization;

use crate::models::{RemixDescriptor, TrackIdentity};

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Words that mark a bracketed or dashed segment as a mix/version descriptor
pub static MIX_WORDS: Lazy<Regex> = Lazy::new(||
    Regex::new(r"(?i)\b(?:remix|mix|edit|dub|rework|bootleg|version|vip)\b").unwrap()
);

/// Any parenthesized or bracketed segment: "(Friction Remix)", "[VIP]"
pub static BRACKETED: Lazy<Regex> = Lazy::new(||
    Regex::new(r"[\(\[]([^\)\]]*)[\)\]]").unwrap()
);

/// Dash with whitespace on both sides: "Teardrop - Friction Remix".
/// Hyphens inside words ("Jay-Z", "Re-Edit") are not separators.
pub static DASH_SEPARATOR: Lazy<Regex> = Lazy::new(||
    Regex::new(r"\s+[-–—]\s+").unwrap()
);

/// Matches file extensions in titles
pub static FILE_EXTENSION: Lazy<Regex> = Lazy::new(||
    Regex::new(r"(?i)\.(flac|mp3|wav|m4a|ogg|aac|aiff?)$").unwrap()
);

/// Matches track number prefixes like "03 - ", "Track 5 - ", "01. ", etc.
pub static TRACK_NUMBER_PREFIX: Lazy<Regex> = Lazy::new(||
    Regex::new(r"(?i)^(?:track\s*)?\d{1,4}\s*[-–—._]\s*").unwrap()
);

/// Country disambiguation suffix on artist names: "Sasha (UK)"
pub static COUNTRY_SUFFIX: Lazy<Regex> = Lazy::new(||
    Regex::new(r"\s*\([A-Z]{2}\)\s*$").unwrap()
);

/// Featured artist credits: "feat. Someone", "(ft. Someone)"
pub static FEATURING: Lazy<Regex> = Lazy::new(||
    Regex::new(r"(?i)\s*[\(\[]?\s*\b(?:feat\.?|ft\.?|featuring)\s+[^\)\]]*[\)\]]?").unwrap()
);

/// Multi-artist separator pattern for splitting credited artists.
/// Matches: &, /, ,, •, +, x, vs, and, with
pub static ARTIST_SEPARATOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*(?:[&/,•+×]|(?:\s+(?:x|vs\.?|and|with)\s+))\s*").unwrap()
});

/// Regex to collapse runs of whitespace into a single space
pub static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());

// ============================================================================
// MIX VOCABULARY
// ============================================================================

/// Normalized mix labels that name no particular remix
pub static GENERIC_MIX_LABELS: Lazy<FxHashSet<&str>> = Lazy::new(|| {
    [
        "",
        "original",
        "extended",
        "original mix",
        "extended mix",
        "radio edit",
        "radio mix",
        "club mix",
        "extended club mix",
    ]
    .into_iter()
    .collect()
});

/// Words ignored when comparing remix descriptors token by token.
/// Mix-type words say nothing about *which* remix it is.
pub static REMIX_STOP_WORDS: Lazy<FxHashSet<&str>> = Lazy::new(|| {
    [
        // Mix-type words
        "remix", "mix", "edit", "dub", "rework", "version", "original", "extended", "radio",
        "club",
        // Filler
        "feat", "ft", "featuring", "the", "an", "of", "in", "on", "at", "to", "for", "and", "vs",
    ]
    .into_iter()
    .collect()
});

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Check if a character is a Unicode combining mark (diacritical mark).
/// Used to filter out accents during normalization.
pub fn is_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0xFE20..=0xFE2F)
}

/// Fold Unicode text to ASCII by applying NFKD decomposition and removing combining marks.
/// e.g., "Beyoncé" → "beyonce", "Röyksopp" → "royksopp"
pub fn fold_to_ascii(s: &str) -> String {
    let stripped: String = s.nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect();
    // Transliterate any remaining non-ASCII (Cyrillic, Hebrew, CJK, etc.)
    any_ascii(&stripped).to_lowercase()
}

/// Fold to lowercase ASCII, drop punctuation and collapse whitespace.
/// Apostrophes are removed outright so "Don't" matches "Dont".
pub fn normalize_text(s: &str) -> String {
    let folded = fold_to_ascii(s).replace(['\'', '\u{2019}'], "");
    let spaced: String = folded
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect();
    MULTI_SPACE.replace_all(spaced.trim(), " ").to_string()
}

/// Whether a normalized mix label names no specific remix
pub fn is_generic_mix_label(normalized: &str) -> bool {
    GENERIC_MIX_LABELS.contains(normalized)
}

/// Descriptor words that identify a particular remix, in original order.
/// e.g. "friction subsonic remix" → ["friction", "subsonic"]
pub fn remix_key_terms(normalized: &str) -> Vec<String> {
    normalized
        .split_whitespace()
        .filter(|w| w.len() > 1 && !REMIX_STOP_WORDS.contains(w))
        .map(str::to_string)
        .collect()
}

/// Set form of `remix_key_terms`, used for overlap checks
pub fn remix_key_words(normalized: &str) -> FxHashSet<String> {
    remix_key_terms(normalized).into_iter().collect()
}

// ============================================================================
// FILENAME PARSING
// ============================================================================

/// Artist/title split out of an "Artist - Title.ext" filename.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedFilename {
    pub artist: String,
    /// Artist without a trailing country code like "(UK)"
    pub artist_clean: String,
    pub title: String,
}

/// "Sasha (UK)" → "Sasha"
pub fn strip_country_code(artist: &str) -> String {
    COUNTRY_SUFFIX.replace(artist, "").trim().to_string()
}

/// Parse "Artist - Title.mp3". Without a " - " separator the whole stem is the title.
pub fn parse_filename(path: &str) -> ParsedFilename {
    let file_name = Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path);
    let stem = FILE_EXTENSION.replace(file_name, "");
    let stem = stem.trim();
    // "03 - Artist - Title", but "311 - Amber" is an artist
    let stem = match TRACK_NUMBER_PREFIX.find(stem) {
        Some(prefix) if stem[prefix.end()..].contains(" - ") => &stem[prefix.end()..],
        _ => stem,
    };

    let (artist, title) = match stem.split_once(" - ") {
        Some((artist, title)) => (artist.trim().to_string(), title.trim().to_string()),
        None => (String::new(), stem.trim().to_string()),
    };
    let artist_clean = strip_country_code(&artist);

    ParsedFilename {
        artist,
        artist_clean,
        title,
    }
}

// ============================================================================
// MIX EXTRACTION
// ============================================================================

/// Split at the last spaced dash: "A - B - Jay-Z Remix" → ("A - B", "Jay-Z Remix")
fn split_trailing_dash(title: &str) -> Option<(&str, &str)> {
    let sep = DASH_SEPARATOR.find_iter(title).last()?;
    let segment = title[sep.end()..].trim();
    if segment.is_empty() {
        return None;
    }
    Some((&title[..sep.start()], segment))
}

/// Split a raw title into (base title, raw mix descriptor).
/// The first bracketed segment holding a mix word wins; otherwise a trailing
/// dash segment holding one. Other bracketed segments are dropped from the base.
pub fn extract_mix_info(title: &str) -> (String, Option<String>) {
    let mut mix = None;
    let mut base = title.to_string();

    if let Some(caps) = BRACKETED
        .captures_iter(title)
        .find(|c| MIX_WORDS.is_match(&c[1]))
    {
        mix = Some(caps[1].trim().to_string());
    } else if let Some((head, segment)) = split_trailing_dash(title) {
        if MIX_WORDS.is_match(segment) {
            mix = Some(segment.to_string());
            base = head.to_string();
        }
    }

    let base = BRACKETED.replace_all(&base, " ");
    let base = MULTI_SPACE.replace_all(base.trim(), " ").to_string();
    (base, mix.filter(|m| !m.is_empty()))
}

// ============================================================================
// NORMALIZATION FUNCTIONS
// ============================================================================

/// Normalize a title for matching.
/// Strips file extensions and bracketed segments, then folds and de-punctuates.
pub fn normalize_title(title: &str) -> String {
    let stripped = FILE_EXTENSION.replace(title.trim(), "");
    let (base, _) = extract_mix_info(&stripped);
    let normalized = normalize_text(&base);
    if normalized.is_empty() {
        // Title was nothing but a bracketed segment; keep its words
        normalize_text(&stripped)
    } else {
        normalized
    }
}

/// Normalize an artist name for matching.
/// Drops featured-artist credits and a leading "The".
pub fn normalize_artist(artist: &str) -> String {
    let without_feat = FEATURING.replace_all(artist, "");
    let normalized = normalize_text(&without_feat);
    match normalized.strip_prefix("the ") {
        Some(rest) if !rest.is_empty() => rest.to_string(),
        _ => normalized,
    }
}

/// Every credited artist in a multi-artist string, normalized.
/// e.g. "Friction & Subsonic" → ["friction", "subsonic"]
pub fn artist_credits(artist: &str) -> Vec<String> {
    let without_feat = FEATURING.replace_all(artist, "");
    ARTIST_SEPARATOR
        .split(&without_feat)
        .map(normalize_artist)
        .filter(|a| !a.is_empty())
        .collect()
}

/// Derive the canonical identity of a track.
///
/// Tag values win when present; blank ones fall back to the filename
/// (`raw_text`). A descriptor found only in the filename still counts.
/// Total: any input produces an identity.
pub fn normalize_identity(raw_artist: &str, raw_title: &str, raw_text: &str) -> TrackIdentity {
    let parsed = parse_filename(raw_text);

    let artist_source = if raw_artist.trim().is_empty() {
        parsed.artist_clean.as_str()
    } else {
        raw_artist
    };
    let title_source = if raw_title.trim().is_empty() {
        parsed.title.as_str()
    } else {
        raw_title
    };

    let (base, mut mix) = extract_mix_info(title_source);
    if mix.is_none() && !parsed.title.is_empty() {
        mix = extract_mix_info(&parsed.title).1;
    }

    let mut title = normalize_text(&base);
    if title.is_empty() {
        title = normalize_text(title_source);
    }
    let remix = mix.and_then(|m| RemixDescriptor::from_normalized(&normalize_text(&m)));

    TrackIdentity::new(normalize_artist(artist_source), title, remix)
}

// ============================================================================
// TESTS
// ============================================================================
