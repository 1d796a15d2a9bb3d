//! Core data models: citation keys, lookup parameters and bibliography entries.

mod entry;
mod key;

pub use entry::{BibEntry, EntryType, Person, ARCHIVE_PREFIX, EPRINT, MRNUMBER, PMID};
pub use key::{
    classify, is_doi, strip_mr_prefix, strip_pmid_prefix, Kind, LookupParam, MR_PREFIX,
    PMID_PREFIX,
};
