//! Metadata services that turn a [`LookupParam`] into a bibliography entry.
//!
//! Every service implements the [`Source`] trait. A call either yields an
//! entry, forwards to a DOI that must be resolved again (arXiv and PubMed
//! records only carry a pointer to the published version), or fails with a
//! [`SourceError`] describing why.
//!
//! | Source | Accepts | Result |
//! |---|---|---|
//! | [`MathSciNetSource`] | MR-number, DOI | entry |
//! | [`CrossrefSource`] | DOI | sanitized entry |
//! | [`ScopusSource`] | DOI, PMID, title search | sanitized entry |
//! | [`ArxivSource`] | arXiv identifier | forward to DOI, or preprint entry |
//! | [`PubMedSource`] | PMID | forward to DOI |

pub mod arxiv;
pub mod crossref;
pub mod mathscinet;
pub mod mock;
pub mod pubmed;
pub mod scopus;

pub use arxiv::ArxivSource;
pub use crossref::CrossrefSource;
pub use mathscinet::MathSciNetSource;
pub use mock::MockSource;
pub use pubmed::PubMedSource;
pub use scopus::ScopusSource;

use async_trait::async_trait;
use std::fmt;

use crate::models::{strip_pmid_prefix, BibEntry, LookupParam, PMID};

bitflags::bitflags! {
    /// Lookups a source can answer
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SourceCapabilities: u32 {
        const MR_LOOKUP = 1 << 0;
        const DOI_LOOKUP = 1 << 1;
        const PMID_LOOKUP = 1 << 2;
        const ARXIV_LOOKUP = 1 << 3;
        const TITLE_SEARCH = 1 << 4;
    }
}

/// Successful outcome of a single source call.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// The service produced a complete entry
    Entry(BibEntry),
    /// The service only knows the DOI of the record; resolve that instead
    Forward(Forward),
}

/// A DOI to re-resolve, plus what to record on the entry it produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Forward {
    pub doi: String,
    pub provenance: Provenance,
}

/// Identifier the forwarding service was queried with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provenance {
    /// arXiv identifier, recorded as `eprint` + `archiveprefix`
    Arxiv(String),
    /// PubMed key, recorded as `pmid` without the `PMID:` prefix
    PubMed(String),
}

impl Provenance {
    /// Record this provenance on an entry, overwriting previous values
    pub fn apply(&self, entry: &mut BibEntry) {
        match self {
            Provenance::Arxiv(id) => entry.set_arxiv_provenance(id),
            Provenance::PubMed(key) => entry.set_field(PMID, strip_pmid_prefix(key)),
        }
    }
}

/// A metadata service.
///
/// Implementations must be cheap to share: the resolver holds them behind
/// `Arc` and calls them concurrently from every key being resolved.
#[async_trait]
pub trait Source: Send + Sync + fmt::Debug {
    /// Short identifier (`"mathscinet"`, `"crossref"`, ...)
    fn id(&self) -> &str;

    /// Service name used in user-facing messages
    fn name(&self) -> &str;

    /// Describe the lookups this source supports
    fn capabilities(&self) -> SourceCapabilities;

    /// Whether this source supports searching by title
    fn supports_title_search(&self) -> bool {
        self.capabilities().contains(SourceCapabilities::TITLE_SEARCH)
    }

    /// Look up one record.
    ///
    /// Parameters the source does not understand fail with
    /// [`SourceError::InvalidRequest`].
    async fn fetch(&self, param: &LookupParam) -> Result<Lookup, SourceError>;

    /// Find the DOI of the record whose title is exactly `title`
    async fn find_doi_by_title(&self, _title: &str) -> Result<String, SourceError> {
        Err(SourceError::NotImplemented)
    }
}

/// Category of a [`SourceError`], as seen by the resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network failure, timeout or unexpected HTTP status
    ServiceUnavailable,
    /// Well-formed answer without a usable record
    NotFoundOnService,
    /// Credentials missing or rejected
    AuthorizationMissing,
    /// The source was asked for something it cannot look up
    InvalidRequest,
}

/// Errors that can occur when interacting with a source
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// Connection failure or timeout
    #[error("{0}")]
    Unavailable(String),

    /// Unexpected HTTP status
    #[error("{status}{}", detail_suffix(.detail))]
    Http { status: u16, detail: String },

    /// The service answered but has no matching record
    #[error("{0}")]
    NotFound(String),

    /// The response could not be understood
    #[error("{0}")]
    Parse(String),

    /// Credentials missing or rejected
    #[error("{0}")]
    Unauthorized(String),

    /// The parameter does not apply to this source
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The requested operation is not implemented for this source
    #[error("operation not supported by this source")]
    NotImplemented,
}

fn detail_suffix(detail: &str) -> String {
    if detail.is_empty() {
        String::new()
    } else {
        format!("; {}", detail)
    }
}

impl SourceError {
    /// Map onto the resolver's error taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            SourceError::Unavailable(_) => ErrorKind::ServiceUnavailable,
            SourceError::Http { status, .. } => match status {
                401 | 403 => ErrorKind::AuthorizationMissing,
                404 | 410 => ErrorKind::NotFoundOnService,
                _ => ErrorKind::ServiceUnavailable,
            },
            SourceError::NotFound(_) | SourceError::Parse(_) => ErrorKind::NotFoundOnService,
            SourceError::Unauthorized(_) => ErrorKind::AuthorizationMissing,
            SourceError::InvalidRequest(_) | SourceError::NotImplemented => {
                ErrorKind::InvalidRequest
            }
        }
    }

    /// Build an error for a non-success HTTP status
    pub fn http(status: u16) -> Self {
        SourceError::Http {
            status,
            detail: String::new(),
        }
    }

    pub(crate) fn unsupported(source: &str, param: &LookupParam) -> Self {
        SourceError::InvalidRequest(format!("{} cannot look up {:?}", source, param))
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        SourceError::Unavailable(err.to_string())
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(format!("JSON: {}", err))
    }
}

impl From<quick_xml::Error> for SourceError {
    fn from(err: quick_xml::Error) -> Self {
        SourceError::Parse(format!("XML: {}", err))
    }
}

impl From<crate::bibtex::BibtexError> for SourceError {
    fn from(err: crate::bibtex::BibtexError) -> Self {
        SourceError::Parse(err.to_string())
    }
}

/// `"<key> found on <service>"`, with an optional continuation sentence
pub fn msg_found(key: &str, service: &str, continuation: Option<&str>) -> String {
    match continuation {
        Some(next) => format!("{} found on {}. {}", key, service, next),
        None => format!("{} found on {}", key, service),
    }
}

/// `"Looking for <key> on <service>"`
pub fn msg_looking(key: &str, service: &str) -> String {
    format!("Looking for {} on {}", key, service)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntryType;

    #[test]
    fn test_source_capabilities() {
        let caps = SourceCapabilities::DOI_LOOKUP | SourceCapabilities::PMID_LOOKUP;

        assert!(caps.contains(SourceCapabilities::DOI_LOOKUP));
        assert!(caps.contains(SourceCapabilities::PMID_LOOKUP));
        assert!(!caps.contains(SourceCapabilities::MR_LOOKUP));
    }

    #[test]
    fn test_error_display() {
        assert_eq!(SourceError::http(404).to_string(), "404");
        let err = SourceError::Http {
            status: 200,
            detail: "MathSciNet Search".to_string(),
        };
        assert_eq!(err.to_string(), "200; MathSciNet Search");
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(
            SourceError::Unavailable("timeout".into()).kind(),
            ErrorKind::ServiceUnavailable
        );
        assert_eq!(SourceError::http(404).kind(), ErrorKind::NotFoundOnService);
        assert_eq!(SourceError::http(503).kind(), ErrorKind::ServiceUnavailable);
        assert_eq!(SourceError::http(401).kind(), ErrorKind::AuthorizationMissing);
        assert_eq!(
            SourceError::NotFound("none".into()).kind(),
            ErrorKind::NotFoundOnService
        );
        assert_eq!(SourceError::NotImplemented.kind(), ErrorKind::InvalidRequest);
    }

    #[test]
    fn test_provenance_apply() {
        let mut entry = BibEntry::new(EntryType::Article);
        Provenance::Arxiv("math/0211159".into()).apply(&mut entry);
        Provenance::PubMed("PMID:271968".into()).apply(&mut entry);
        assert_eq!(entry.field("eprint"), Some("math/0211159"));
        assert_eq!(entry.field("archiveprefix"), Some("arXiv"));
        assert_eq!(entry.field("pmid"), Some("271968"));
    }

    #[test]
    fn test_messages() {
        assert_eq!(msg_looking("MR123456", "MathSciNet"), "Looking for MR123456 on MathSciNet");
        assert_eq!(msg_found("x", "arXiv", None), "x found on arXiv");
        assert_eq!(
            msg_found("x", "arXiv", Some("Detected 10.1/2")),
            "x found on arXiv. Detected 10.1/2"
        );
    }
}
