//! Core library: scanning, duplicate detection, classification, plan
//! building and execution.

pub mod cancel;
pub mod classifier;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod executor;
pub mod export;
pub mod keywords;
pub mod metadata;
pub mod models;
pub mod paths;
pub mod pipeline;
pub mod plan;
pub mod rules;
pub mod scanner;
