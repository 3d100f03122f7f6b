//! Genre resolution library - identity normalization, candidate scoring, tier
//! resolution and tag reconciliation behind the `genre-resolver` binary.

pub mod cache;
pub mod catalog;
pub mod collaborator;
pub mod config;
pub mod crowd;
pub mod error;
pub mod fixture;
pub mod metrics;
pub mod ml;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod progress;
pub mod reconcile;
pub mod resolver;
pub mod safety;
pub mod scoring;
pub mod stats;
