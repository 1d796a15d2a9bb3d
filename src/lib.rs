//! # bibget
//!
//! Resolve citation keys (MathSciNet MR-numbers, DOIs, arXiv identifiers,
//! PubMed IDs) into normalized BibTeX entries.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`models`]: Citation key classification and the canonical entry type
//! - [`sources`]: One adapter per metadata service behind the [`Source`] trait
//! - [`resolver`]: Fallback order between services, forwarding and the
//!   interactive update flow
//! - [`bibtex`]: BibTeX parsing/serialization, LaTeX escaping and sanitizing
//! - [`blg`]: Missing-citation scanner for BibTeX/Biber logs
//! - [`config`]: Configuration management
//! - [`utils`]: HTTP transport, rate limiting and terminal rendering

pub mod bibtex;
pub mod blg;
pub mod config;
pub mod models;
pub mod resolver;
pub mod sources;
pub mod utils;

// Re-export commonly used types
pub use models::{classify, BibEntry, Kind};
pub use resolver::{ResolveError, Resolver};
pub use sources::{Source, SourceError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
