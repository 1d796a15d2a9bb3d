//! arXiv source.
//!
//! The export API returns an Atom feed. When the preprint has been published
//! the entry carries an `<arxiv:doi>` element and the lookup forwards to
//! that DOI; otherwise an `unpublished` entry is built from the feed itself.

use async_trait::async_trait;
use feed_rs::parser;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::sync::Arc;
use tracing::info;

use crate::bibtex::sanitized;
use crate::models::{BibEntry, EntryType, LookupParam, Person};
use crate::sources::{
    msg_found, Forward, Lookup, Provenance, Source, SourceCapabilities, SourceError,
};
use crate::utils::HttpClient;

/// Base URL for arXiv API
const ARXIV_API_BASE: &str = "http://export.arxiv.org";

/// Note used when the feed carries no journal reference
const PREPRINT_NOTE: &str = "Preprint";

/// arXiv source
#[derive(Debug, Clone)]
pub struct ArxivSource {
    client: Arc<HttpClient>,
    base_url: String,
}

/// `arxiv:` namespace elements of the first feed entry
#[derive(Debug, Default, PartialEq, Eq)]
struct ArxivExtensions {
    doi: Option<String>,
    journal_ref: Option<String>,
}

impl ArxivSource {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self::with_base_url(client, ARXIV_API_BASE)
    }

    pub fn with_base_url(client: Arc<HttpClient>, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn query_url(&self, id: &str) -> String {
        format!("{}/api/query?id_list={}", self.base_url, id)
    }
}

/// Read `<arxiv:doi>` and `<arxiv:journal_ref>` from the first `<entry>`.
fn read_extensions(xml: &str) -> Result<ArxivExtensions, SourceError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut found = ArxivExtensions::default();
    let mut in_entry = false;
    let mut current: Option<Vec<u8>> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.name().as_ref().to_vec();
                if name == b"entry" {
                    in_entry = true;
                } else if in_entry {
                    current = Some(name);
                }
            }
            Event::Text(t) if in_entry => {
                let value = t
                    .unescape()
                    .map_err(|e| SourceError::Parse(format!("XML: {}", e)))?
                    .trim()
                    .to_string();
                match current.as_deref() {
                    Some(b"arxiv:doi") => found.doi = Some(value),
                    Some(b"arxiv:journal_ref") => found.journal_ref = Some(value),
                    _ => {}
                }
            }
            Event::End(e) => {
                if e.name().as_ref() == b"entry" {
                    break;
                }
                current = None;
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(found)
}

/// Build the preprint entry from the first feed entry.
fn preprint_entry(
    entry: &feed_rs::model::Entry,
    extensions: &ArxivExtensions,
) -> Option<BibEntry> {
    let title = entry
        .title
        .as_ref()
        .map(|t| t.content.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|t| !t.is_empty())?;

    let note = extensions
        .journal_ref
        .clone()
        .unwrap_or_else(|| PREPRINT_NOTE.to_string());

    let mut bib = BibEntry::new(EntryType::Unpublished)
        .with_field("title", title)
        .with_field("note", note)
        .with_authors(entry.authors.iter().map(|a| Person::parse(&a.name)).collect());

    if let Some(published) = entry.published {
        let iso = published.to_rfc3339();
        bib.set_field("year", iso.get(..4).unwrap_or(&iso));
    }
    Some(bib)
}

#[async_trait]
impl Source for ArxivSource {
    fn id(&self) -> &str {
        "arxiv"
    }

    fn name(&self) -> &str {
        "arXiv"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::ARXIV_LOOKUP
    }

    async fn fetch(&self, param: &LookupParam) -> Result<Lookup, SourceError> {
        let LookupParam::Arxiv(id) = param else {
            return Err(SourceError::unsupported(self.id(), param));
        };

        let response = self.client.fetch(&self.query_url(id), &[]).await?;
        if !response.is_success() {
            return Err(SourceError::http(response.status));
        }

        let feed = parser::parse(response.body.as_bytes())
            .map_err(|e| SourceError::Parse(format!("Failed to parse Atom feed: {}", e)))?;
        let extensions = read_extensions(&response.body)?;
        let empty = || SourceError::NotFound(format!("{}; empty arXiv entry returned", response.status));

        let Some(entry) = feed.entries.first() else {
            return Err(empty());
        };
        // Unknown identifiers come back as a single entry describing the error.
        if entry.id.contains("api/errors") {
            let reason = entry
                .summary
                .as_ref()
                .map(|s| s.content.trim().to_string())
                .unwrap_or_else(|| "unknown identifier".to_string());
            return Err(SourceError::NotFound(format!("{}; {}", response.status, reason)));
        }

        if let Some(doi) = extensions.doi.clone() {
            info!(
                "{}",
                msg_found(id, self.name(), Some(&format!("Detected {}", doi)))
            );
            return Ok(Lookup::Forward(Forward {
                doi,
                provenance: Provenance::Arxiv(id.clone()),
            }));
        }

        let mut bib = sanitized(preprint_entry(entry, &extensions).ok_or_else(empty)?);
        bib.set_arxiv_provenance(id);
        info!(
            "{}",
            msg_found(
                id,
                self.name(),
                Some("No DOI found, using title and authors")
            )
        );
        Ok(Lookup::Entry(bib))
    }
}
