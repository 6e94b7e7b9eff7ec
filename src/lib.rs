//! Organism census for BLAST tabular output.
//!
//! Subject accessions are resolved to NCBI taxonomy through a local SQLite cache,
//! then counted per taxonomy id into a JSON population report.

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod extract;
pub mod ncbi;
pub mod output;
pub mod report;
pub mod store;
