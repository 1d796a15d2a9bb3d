//! Canonical bibliography entry produced by every source.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Field recording the arXiv identifier an entry was reached through
pub const EPRINT: &str = "eprint";
/// Companion of [`EPRINT`], always `arXiv`
pub const ARCHIVE_PREFIX: &str = "archiveprefix";
/// PubMed identifier, without the `PMID:` prefix
pub const PMID: &str = "pmid";
/// MathSciNet record number; entries carrying it are never re-fetched
pub const MRNUMBER: &str = "mrnumber";

/// BibTeX entry type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Article,
    Book,
    InProceedings,
    InCollection,
    Unpublished,
    /// Any other type a service hands back (`misc`, `phdthesis`, ...)
    #[serde(untagged)]
    Other(String),
}

impl EntryType {
    /// Parse a type name case-insensitively
    pub fn parse(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "article" => EntryType::Article,
            "book" => EntryType::Book,
            "inproceedings" | "conference" => EntryType::InProceedings,
            "incollection" => EntryType::InCollection,
            "unpublished" => EntryType::Unpublished,
            other => EntryType::Other(other.to_string()),
        }
    }

    /// The lowercase BibTeX name
    pub fn as_str(&self) -> &str {
        match self {
            EntryType::Article => "article",
            EntryType::Book => "book",
            EntryType::InProceedings => "inproceedings",
            EntryType::InCollection => "incollection",
            EntryType::Unpublished => "unpublished",
            EntryType::Other(s) => s,
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An author, split into given and family names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Person {
    pub given: String,
    pub family: String,
}

impl Person {
    pub fn new(given: impl Into<String>, family: impl Into<String>) -> Self {
        Self {
            given: given.into(),
            family: family.into(),
        }
    }

    /// Parse a free-form name.
    ///
    /// Accepts `Family, Given` and `Given Family`. In the second form a run of
    /// lowercase words before the last word (`Ludwig van Beethoven`) stays with
    /// the family name.
    pub fn parse(name: &str) -> Self {
        let name = name.trim();
        if let Some((family, given)) = name.split_once(',') {
            return Self::new(given.trim(), family.trim());
        }

        let words: Vec<&str> = name.split_whitespace().collect();
        match words.len() {
            0 => Self::default(),
            1 => Self::new("", words[0]),
            n => {
                let von = words[1..n - 1]
                    .iter()
                    .position(|w| w.chars().next().is_some_and(char::is_lowercase))
                    .map(|i| i + 1)
                    .unwrap_or(n - 1);
                Self::new(words[..von].join(" "), words[von..].join(" "))
            }
        }
    }

    /// Render as `Family, Given` (or just `Family`)
    pub fn to_bibtex_name(&self) -> String {
        if self.given.is_empty() {
            self.family.clone()
        } else {
            format!("{}, {}", self.family, self.given)
        }
    }
}

impl fmt::Display for Person {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.given.is_empty() {
            f.write_str(&self.family)
        } else {
            write!(f, "{} {}", self.given, self.family)
        }
    }
}

/// A normalized bibliography record, independent of the service it came from.
///
/// Field names are stored lowercase. `key` is the citation label assigned by
/// the caller, not a service's internal identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BibEntry {
    pub entry_type: EntryType,
    pub key: String,
    pub fields: BTreeMap<String, String>,
    pub authors: Vec<Person>,
}

impl BibEntry {
    /// Create an empty entry of the given type
    pub fn new(entry_type: EntryType) -> Self {
        Self {
            entry_type,
            key: String::new(),
            fields: BTreeMap::new(),
            authors: Vec::new(),
        }
    }

    /// Builder-style key assignment
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Builder-style field assignment
    pub fn with_field(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_field(name, value);
        self
    }

    /// Builder-style author list assignment
    pub fn with_authors(mut self, authors: Vec<Person>) -> Self {
        self.authors = authors;
        self
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(&name.to_lowercase())
    }

    pub fn set_field(&mut self, name: &str, value: impl Into<String>) {
        self.fields.insert(name.to_lowercase(), value.into());
    }

    pub fn remove_field(&mut self, name: &str) -> Option<String> {
        self.fields.remove(&name.to_lowercase())
    }

    pub fn title(&self) -> Option<&str> {
        self.field("title")
    }

    pub fn doi(&self) -> Option<&str> {
        self.field("doi")
    }

    /// MathSciNet-origin entries are authoritative and never replaced
    pub fn is_frozen(&self) -> bool {
        self.has_field(MRNUMBER)
    }

    /// Record the arXiv identifier this entry was reached through
    pub fn set_arxiv_provenance(&mut self, eprint: &str) {
        self.set_field(EPRINT, eprint);
        self.set_field(ARCHIVE_PREFIX, "arXiv");
    }
}
