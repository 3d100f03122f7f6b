//! Crowd-sourced artist tags (top tags with vote counts).
//!
//! Parses the JSON returned by a top-tags endpoint and filters it down to the
//! names worth using as genres.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::GENERIC_GENRES;
use crate::error::CollaboratorError;

/// One crowd tag with its vote count.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrowdTag {
    pub name: String,
    #[serde(default)]
    pub count: u32,
}

impl CrowdTag {
    pub fn new(name: &str, count: u32) -> Self {
        Self {
            name: name.to_string(),
            count,
        }
    }
}

/// Parse a `{"toptags": {"tag": [{"name": .., "count": ..}]}}` payload.
/// API-level errors (`{"error": 6, "message": ..}`) become transport errors.
pub fn parse_top_tags(json: &str) -> Result<Vec<CrowdTag>, CollaboratorError> {
    let data: Value = serde_json::from_str(json)?;

    if let Some(message) = data.get("error").map(|_| {
        data.get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string()
    }) {
        return Err(CollaboratorError::Transport(message));
    }

    let tags = data
        .pointer("/toptags/tag")
        .ok_or_else(|| CollaboratorError::Parse("missing toptags.tag".to_string()))?;

    // A single tag is sometimes sent as an object instead of a list
    let items: Vec<&Value> = match tags {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => vec![tags],
        _ => Vec::new(),
    };

    Ok(items
        .into_iter()
        .filter_map(|item| {
            let name = item.get("name")?.as_str()?.trim();
            if name.is_empty() {
                return None;
            }
            Some(CrowdTag::new(name, vote_count(item.get("count"))))
        })
        .collect())
}

/// Counts arrive either as numbers or numeric strings
fn vote_count(value: Option<&Value>) -> u32 {
    match value {
        Some(Value::Number(n)) => n.as_u64().map_or(0, |n| n.min(u32::MAX as u64) as u32),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// Title-case a tag: "deep house" → "Deep House", "hip-hop" → "Hip-Hop"
pub fn title_case(tag: &str) -> String {
    let mut out = String::with_capacity(tag.len());
    let mut at_word_start = true;
    for c in tag.chars() {
        if at_word_start {
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }
        at_word_start = !c.is_alphabetic();
    }
    out
}

/// Usable genre names: the first `limit` tags, keeping those with more than
/// `min_count` votes, title-cased.
pub fn usable_tag_names(tags: &[CrowdTag], min_count: u32, limit: usize) -> Vec<String> {
    tags.iter()
        .take(limit)
        .filter(|t| t.count > min_count)
        .map(|t| title_case(&t.name))
        .collect()
}

/// Placeholder tags that say nothing about the genre
pub fn is_generic_tag(name: &str) -> bool {
    GENERIC_GENRES.iter().any(|g| g.eq_ignore_ascii_case(name.trim()))
}
