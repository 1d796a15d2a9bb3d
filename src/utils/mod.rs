//! Plumbing shared by the sources and the CLI.
//!
//! - [`HttpClient`]: GET transport with a per-call timeout, returning
//!   [`HttpResponse`] values for every status code
//! - [`RateGate`]: token-bucket quota gate shared by concurrent calls
//! - [`display`]: side-by-side rendering for the interactive update prompt

pub mod display;
mod http;
mod rate_limit;

pub use http::{HttpClient, HttpResponse, DEFAULT_TIMEOUT_SECS};
pub use rate_limit::RateGate;
