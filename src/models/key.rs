//! Citation key classification.
//!
//! A raw key is matched against the recognized identifier shapes in a fixed
//! precedence order: MathSciNet, PubMed, legacy arXiv, new-style arXiv, DOI.
//! The first pattern that matches at the start of the key wins.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Prefix of PubMed citation keys (`PMID:271968`)
pub const PMID_PREFIX: &str = "PMID:";

/// Prefix of MathSciNet citation keys (`MR0026286`)
pub const MR_PREFIX: &str = "MR";

static MATHSCINET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^MR\d{4,10}").expect("valid MathSciNet pattern"));

static PUBMED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^PMID:\d{4,10}").expect("valid PubMed pattern"));

static ARXIV_OLD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\b[a-zA-Z\-\.]{2,10}/\d{7}(?:v\d)?\b").expect("valid legacy arXiv pattern")
});

static ARXIV_NEW_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\b\d{4}\.\d{4,5}(?:v\d)?\b").expect("valid arXiv pattern"));

static DOI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^10\.\d{4,9}/[-._;()/:A-Za-z0-9]+").expect("valid DOI pattern")
});

/// The shape of a citation key, deciding which services can answer it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    /// `MR` followed by 4-10 digits
    MathSciNet,
    /// `PMID:` followed by 4-10 digits
    PubMed,
    /// Legacy slash-form arXiv identifier (`math/0211159`)
    ArxivOld,
    /// `dddd.dddd[d]` arXiv identifier with optional version suffix
    ArxivNew,
    /// `10.<registrant>/<suffix>`
    Doi,
    /// Matches none of the above; never sent to a service
    Invalid,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::MathSciNet => "MathSciNet ID",
            Kind::PubMed => "PubMed ID",
            Kind::ArxivOld => "arXiv ID (legacy)",
            Kind::ArxivNew => "arXiv ID",
            Kind::Doi => "DOI",
            Kind::Invalid => "invalid key",
        };
        f.write_str(name)
    }
}

/// Classify a raw citation key.
///
/// Pure and total: every input maps to exactly one [`Kind`].
pub fn classify(key: &str) -> Kind {
    if MATHSCINET_RE.is_match(key) {
        Kind::MathSciNet
    } else if PUBMED_RE.is_match(key) {
        Kind::PubMed
    } else if ARXIV_OLD_RE.is_match(key) {
        Kind::ArxivOld
    } else if ARXIV_NEW_RE.is_match(key) {
        Kind::ArxivNew
    } else if DOI_RE.is_match(key) {
        Kind::Doi
    } else {
        Kind::Invalid
    }
}

/// Whether `value` starts with a well-formed DOI.
pub fn is_doi(value: &str) -> bool {
    DOI_RE.is_match(value)
}

/// Strip the `PMID:` prefix from a PubMed key, if present.
pub fn strip_pmid_prefix(key: &str) -> &str {
    key.strip_prefix(PMID_PREFIX).unwrap_or(key)
}

/// Strip the `MR` prefix from a MathSciNet key, if present.
pub fn strip_mr_prefix(key: &str) -> &str {
    key.strip_prefix(MR_PREFIX).unwrap_or(key)
}

/// A typed request for exactly one adapter invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LookupParam {
    /// MathSciNet by MR-number (`MR0026286`)
    MathSciNetKey(String),
    /// MathSciNet by DOI
    MathSciNetDoi(String),
    /// BibTeX by DOI content negotiation
    CrossrefDoi(String),
    /// Scopus abstract retrieval by DOI
    ScopusDoi(String),
    /// Scopus abstract retrieval by PubMed key (`PMID:271968`)
    ScopusPmid(String),
    /// arXiv Atom feed by identifier
    Arxiv(String),
    /// PubMed DOI lookup by PubMed key (`PMID:271968`)
    PubMed(String),
}

impl LookupParam {
    /// The key or identifier carried by this parameter
    pub fn key(&self) -> &str {
        match self {
            LookupParam::MathSciNetKey(k)
            | LookupParam::MathSciNetDoi(k)
            | LookupParam::CrossrefDoi(k)
            | LookupParam::ScopusDoi(k)
            | LookupParam::ScopusPmid(k)
            | LookupParam::Arxiv(k)
            | LookupParam::PubMed(k) => k,
        }
    }
}

impl fmt::Display for LookupParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}
