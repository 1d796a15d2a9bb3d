//! BibTeX reading and writing.
//!
//! Parsing goes through the `biblatex` crate and converts its entries into
//! [`BibEntry`] values. Writing is done here so output is deterministic:
//! fields in a fixed order, four-space indentation, quoted values.

pub mod latex;
pub mod sanitize;

use biblatex::{Bibliography, Chunk, Spanned};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use thiserror::Error;

use crate::models::{BibEntry, EntryType, Person};
use latex::{to_latex, EscapeMode};

pub use sanitize::{protect_capitals, sanitize_entry, sanitize_string, sanitized};

/// Fields written first, in this order; the rest follow alphabetically
const FIELD_ORDER: &[&str] = &[
    "title",
    "journal",
    "booktitle",
    "publisher",
    "year",
    "volume",
    "number",
    "pages",
    "note",
    "doi",
    "url",
    "eprint",
    "archiveprefix",
    "pmid",
    "mrnumber",
];

/// Fields whose content is kept byte-for-byte
const VERBATIM_FIELDS: &[&str] = &["url", "doi", "eprint", "file", "urldate"];

/// `@type{key,` headers, used to recover the literal entry type name
static ENTRY_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@\s*([A-Za-z]+)\s*[{(]\s*([^,\s]+)\s*,").expect("valid entry header pattern")
});

#[derive(Debug, Error)]
pub enum BibtexError {
    #[error("BibTeX parse error: {0}")]
    Parse(String),

    #[error("no BibTeX entry found")]
    NoEntries,
}

/// Parse every entry of a BibTeX document.
pub fn parse_bibliography(source: &str) -> Result<Vec<BibEntry>, BibtexError> {
    let types: HashMap<String, String> = ENTRY_HEADER
        .captures_iter(source)
        .map(|caps| (caps[2].to_string(), caps[1].to_lowercase()))
        .collect();

    let bibliography =
        Bibliography::parse(source).map_err(|e| BibtexError::Parse(e.to_string()))?;

    Ok(bibliography
        .into_iter()
        .map(|entry| {
            let type_name = types
                .get(&entry.key)
                .cloned()
                .unwrap_or_else(|| format!("{:?}", entry.entry_type).to_lowercase());
            convert_entry(entry, &type_name)
        })
        .collect())
}

/// Parse the first entry of a BibTeX document.
pub fn parse_entry(source: &str) -> Result<BibEntry, BibtexError> {
    parse_bibliography(source)?
        .into_iter()
        .next()
        .ok_or(BibtexError::NoEntries)
}

fn convert_entry(entry: biblatex::Entry, type_name: &str) -> BibEntry {
    let authors = entry
        .author()
        .map(|people| people.into_iter().map(convert_person).collect())
        .unwrap_or_default();

    let mut out = BibEntry::new(EntryType::parse(type_name)).with_key(entry.key.clone());
    for (name, chunks) in &entry.fields {
        let name = name.to_lowercase();
        if name == "author" {
            continue;
        }
        let verbatim = VERBATIM_FIELDS.contains(&name.as_str());
        out.set_field(&name, chunks_to_string(chunks, verbatim));
    }
    out.authors = authors;
    out
}

fn convert_person(person: biblatex::Person) -> Person {
    let mut family = if person.prefix.is_empty() {
        person.name
    } else {
        format!("{} {}", person.prefix, person.name)
    };
    if !person.suffix.is_empty() {
        family = format!("{}, {}", family, person.suffix);
    }
    Person::new(
        to_latex(&person.given_name, EscapeMode::Text),
        to_latex(&family, EscapeMode::Text),
    )
}

/// Flatten parsed chunks back into LaTeX source text.
fn chunks_to_string(chunks: &[Spanned<Chunk>], verbatim: bool) -> String {
    chunks
        .iter()
        .map(|chunk| match &chunk.v {
            Chunk::Normal(s) if verbatim => s.clone(),
            Chunk::Normal(s) => to_latex(&restore_dashes(s), EscapeMode::Text),
            Chunk::Verbatim(s) if verbatim => s.clone(),
            Chunk::Verbatim(s) => format!("{{{}}}", s),
            Chunk::Math(s) => format!("${}$", s),
        })
        .collect()
}

/// The parser resolves `--` and `---` ligatures; write them back as typed.
fn restore_dashes(text: &str) -> String {
    text.replace('\u{2014}', "---").replace('\u{2013}', "--")
}

/// Render one entry as BibTeX.
pub fn to_bibtex(entry: &BibEntry) -> String {
    let mut lines = Vec::with_capacity(entry.fields.len() + 1);

    if !entry.authors.is_empty() {
        let names: Vec<String> = entry.authors.iter().map(Person::to_bibtex_name).collect();
        lines.push(format_field("author", &names.join(" and ")));
    }
    for name in FIELD_ORDER {
        if let Some(value) = entry.fields.get(*name) {
            lines.push(format_field(name, value));
        }
    }
    for (name, value) in &entry.fields {
        if !FIELD_ORDER.contains(&name.as_str()) {
            lines.push(format_field(name, value));
        }
    }

    if lines.is_empty() {
        return format!("@{}{{{},\n}}", entry.entry_type, entry.key);
    }
    format!("@{}{{{},\n{}\n}}", entry.entry_type, entry.key, lines.join(",\n"))
}

fn format_field(name: &str, value: &str) -> String {
    if value.contains('"') {
        format!("    {} = {{{}}}", name, value)
    } else {
        format!("    {} = \"{}\"", name, value)
    }
}

/// Render entries separated by blank lines, with a trailing newline.
pub fn bibliography_to_string(entries: &[BibEntry]) -> String {
    let mut out = entries
        .iter()
        .map(to_bibtex)
        .collect::<Vec<_>>()
        .join("\n\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}
