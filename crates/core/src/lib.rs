//! Core library: inventory scanning, duplicate analysis, taxonomy discovery and move planning.

pub mod classifier;
pub mod clusters;
pub mod config;
pub mod dates;
pub mod dedupe;
pub mod deletion;
pub mod error;
pub mod extractor;
pub mod models;
pub mod patterns;
pub mod pipeline;
pub mod planner;
pub mod report;
pub mod scanner;
pub mod shards;
pub mod taxonomy;
pub mod tree;
