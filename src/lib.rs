// SPDX-License-Identifier: MIT OR Apache-2.0

//! priorcase - Similar prior incident report retrieval
//!
//! Shared modules for the priorcase CLI tool.

pub mod backfill;
pub mod config;
pub mod embedding;
pub mod errors;
pub mod explain;
pub mod ingest;
pub mod keywords;
pub mod output;
mod process;
pub mod ranker;
pub mod service;
pub mod similarity;
pub mod store;
pub mod summary;

pub use errors::{Error, Result};
pub use ranker::{SimilarCase, SimilarityFinder, SimilarityQuery};
pub use similarity::similarity;
