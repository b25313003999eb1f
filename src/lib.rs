//! Quarry - Retrieval-Augmented Query Pipeline
//!
//! Classifies incoming natural-language queries for intent, matches them
//! against an embedded document corpus via approximate nearest-neighbor
//! search, and assembles context bundles for a downstream text generator.

pub mod classifier;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod index;
pub mod retrieval;

pub use error::{QuarryError, Result};
