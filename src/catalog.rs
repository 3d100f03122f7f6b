//! Curated catalog search: query building and search-page parsing.
//!
//! The catalog's search page embeds its results as a Next.js data blob.
//! Fetching the page is the caller's job; this module turns the HTML into
//! `Candidate`s and warns loudly when the page layout changes.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::warn;

use crate::error::CollaboratorError;
use crate::models::Candidate;
use crate::normalize::{extract_mix_info, normalize_text, remix_key_terms, is_generic_mix_label};

/// Embedded page data: `<script id="__NEXT_DATA__" type="application/json">{..}</script>`
static NEXT_DATA: Lazy<Regex> = Lazy::new(||
    Regex::new(r#"(?s)__NEXT_DATA__.*?type="application/json">(.*?)</script>"#).unwrap()
);

/// Location of the result list inside the page data
const RESULTS_POINTER: &str = "/props/pageProps/dehydratedState/queries/0/state/data/data";

/// Ampersands between artists confuse the catalog's search
static ARTIST_AMPERSAND: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*&\s*").unwrap());

// ============================================================================
// Query Building
// ============================================================================

/// A catalog search request for one track.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogQuery {
    pub artist: String,
    pub title: String,
    /// Free-text search string sent to the catalog
    pub text: String,
}

impl CatalogQuery {
    /// Cache key: same artist/title always hits the same entry
    pub fn cache_key(&self) -> String {
        format!("{}|{}", self.artist, self.title).to_lowercase()
    }
}

/// Build the search for a raw artist/title pair. A specific remix adds its
/// remixer words so the right version shows up among the results.
pub fn search_query(artist: &str, title: &str) -> CatalogQuery {
    let (base_title, mix) = extract_mix_info(title);
    let artist_search = ARTIST_AMPERSAND.replace_all(artist.trim(), " ").to_string();

    let remix_terms = mix
        .map(|m| normalize_text(&m))
        .filter(|m| !is_generic_mix_label(m))
        .map(|m| remix_key_terms(&m).join(" "))
        .unwrap_or_default();

    let text = [artist_search.as_str(), base_title.as_str(), remix_terms.as_str()]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ");

    CatalogQuery {
        artist: artist.to_string(),
        title: title.to_string(),
        text,
    }
}

// ============================================================================
// Page Parsing
// ============================================================================

/// Extract up to `limit` candidates from a catalog search page.
/// A page without results is `Ok(vec![])`; a page we cannot read is an error.
pub fn parse_search_page(html: &str, limit: usize) -> Result<Vec<Candidate>, CollaboratorError> {
    let blob = NEXT_DATA
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| CollaboratorError::Parse("no embedded page data".to_string()))?;

    let data: Value = serde_json::from_str(blob)?;
    let items = match data.pointer(RESULTS_POINTER) {
        Some(Value::Array(items)) => items,
        Some(Value::Null) => return Ok(Vec::new()),
        _ => {
            warn!("catalog page structure changed; search results not found, falling back to other sources");
            return Err(CollaboratorError::Parse(format!(
                "results not found at {}",
                RESULTS_POINTER
            )));
        }
    };

    Ok(items.iter().take(limit).map(candidate_from_item).collect())
}

fn candidate_from_item(item: &Value) -> Candidate {
    let text = |key: &str| {
        item.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string()
    };

    let artists: Vec<&str> = item
        .get("artists")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|a| a.get("artist_name").and_then(Value::as_str))
                .filter(|name| !name.trim().is_empty())
                .collect()
        })
        .unwrap_or_default();

    let genre = item
        .get("genre")
        .and_then(Value::as_array)
        .and_then(|list| {
            list.iter()
                .filter_map(|g| g.get("genre_name").and_then(Value::as_str))
                .find(|name| !name.trim().is_empty())
        })
        .unwrap_or_default()
        .trim()
        .to_string();

    Candidate {
        artist: artists.join(", "),
        title: text("track_name"),
        mix_label: text("mix_name"),
        genre,
    }
}
