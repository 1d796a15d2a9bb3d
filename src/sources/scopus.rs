//! Scopus (Elsevier) source.
//!
//! Requires an API key and is quota-limited, so every request first takes a
//! permit from the shared [`RateGate`]. The abstract retrieval API returns
//! a deeply nested JSON record; the parts used here are
//!
//! ```text
//! abstracts-retrieval-response
//! ├── coredata { prism:doi, pubmed-id }
//! └── item.bibrecord.head
//!     ├── citation-title
//!     ├── author-group    (object or list)
//!     │   └── author      (object or list) { preferred-name { ce:surname, ce:given-name } }
//!     └── source { @type, sourcetitle, sourcetitle-abbrev, publicationyear,
//!                  publisher.publishername, volisspag { voliss, pagerange } }
//! ```

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::bibtex::sanitized;
use crate::models::{strip_pmid_prefix, BibEntry, EntryType, LookupParam, Person, PMID};
use crate::sources::{msg_found, Lookup, Source, SourceCapabilities, SourceError};
use crate::utils::{HttpClient, RateGate};

const SCOPUS_API_BASE: &str = "https://api.elsevier.com";
const JSON_ACCEPT: &str = "application/json; charset=utf-8";

/// Appended to the status of a 401 answer
const UNAUTHORIZED_HINT: &str =
    "Error 401 suggests that either the supplied API key is wrong, or requires a VPN connection";

#[derive(Debug, Clone)]
pub struct ScopusSource {
    client: Arc<HttpClient>,
    base_url: String,
    api_key: String,
    gate: Arc<RateGate>,
}

impl ScopusSource {
    pub fn new(client: Arc<HttpClient>, api_key: impl Into<String>, gate: Arc<RateGate>) -> Self {
        Self::with_base_url(client, api_key, gate, SCOPUS_API_BASE)
    }

    pub fn with_base_url(
        client: Arc<HttpClient>,
        api_key: impl Into<String>,
        gate: Arc<RateGate>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            gate,
        }
    }

    fn abstract_url(&self, param: &LookupParam) -> Result<String, SourceError> {
        let path = match param {
            LookupParam::ScopusDoi(doi) => format!("doi/{}", doi),
            LookupParam::ScopusPmid(key) => format!("pubmed_id/{}", strip_pmid_prefix(key)),
            other => return Err(SourceError::unsupported(self.id(), other)),
        };
        Ok(format!(
            "{}/content/abstract/{}?view=FULL&apiKey={}",
            self.base_url,
            path,
            urlencoding::encode(&self.api_key)
        ))
    }

    fn search_url(&self, title: &str) -> String {
        let query = format!("TITLE(\"{}\")", title);
        format!(
            "{}/content/search/scopus?query={}&apiKey={}",
            self.base_url,
            urlencoding::encode(&query),
            urlencoding::encode(&self.api_key)
        )
    }

    /// Rate-limited GET returning the parsed JSON body
    async fn get_json(&self, url: &str) -> Result<Value, SourceError> {
        self.gate.acquire().await;
        let response = self.client.fetch(url, &[("Accept", JSON_ACCEPT)]).await?;

        match response.status {
            401 => Err(SourceError::Unauthorized(format!("401; {}", UNAUTHORIZED_HINT))),
            status if !response.is_success() => Err(SourceError::http(status)),
            _ => Ok(serde_json::from_str(&response.body)?),
        }
    }
}

#[async_trait]
impl Source for ScopusSource {
    fn id(&self) -> &str {
        "scopus"
    }

    fn name(&self) -> &str {
        "Scopus"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::DOI_LOOKUP
            | SourceCapabilities::PMID_LOOKUP
            | SourceCapabilities::TITLE_SEARCH
    }

    async fn fetch(&self, param: &LookupParam) -> Result<Lookup, SourceError> {
        let url = self.abstract_url(param)?;
        let record = self.get_json(&url).await?;
        let entry = parse_abstract(&record, param)?;
        info!("{}", msg_found(param.key(), self.name(), None));
        Ok(Lookup::Entry(entry))
    }

    async fn find_doi_by_title(&self, title: &str) -> Result<String, SourceError> {
        let results = self.get_json(&self.search_url(title)).await?;
        results
            .pointer("/search-results/entry/0/prism:doi")
            .and_then(text)
            .ok_or_else(|| SourceError::NotFound(format!("no DOI found for \"{}\"", title)))
    }
}

/// Text content of a JSON node: a string, a number or a `{"$": ...}` wrapper
fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => map.get("$").and_then(text),
        _ => None,
    }
}

/// Scopus sends a bare object where a list has a single element
fn as_list(value: Option<&Value>) -> Vec<&Value> {
    match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(other @ Value::Object(_)) => vec![other],
        _ => Vec::new(),
    }
}

fn required(value: Option<&Value>, what: &str) -> Result<String, SourceError> {
    value
        .and_then(text)
        .ok_or_else(|| SourceError::Parse(format!("missing {}", what)))
}

fn flatten_authors(head: &Value) -> Vec<Person> {
    as_list(head.get("author-group"))
        .into_iter()
        .flat_map(|group| as_list(group.get("author")))
        .filter_map(|author| {
            let name = author.get("preferred-name")?;
            let family = name.get("ce:surname").and_then(text)?;
            let given = name.get("ce:given-name").and_then(text).unwrap_or_default();
            Some(Person::new(given, family))
        })
        .collect()
}

/// Build an entry from an abstract retrieval response.
fn parse_abstract(record: &Value, param: &LookupParam) -> Result<BibEntry, SourceError> {
    let key = param.key();
    let response = record
        .get("abstracts-retrieval-response")
        .ok_or_else(|| SourceError::Parse("missing abstracts-retrieval-response".to_string()))?;
    let head = response
        .pointer("/item/bibrecord/head")
        .ok_or_else(|| SourceError::Parse("missing bibrecord head".to_string()))?;
    let source = head
        .get("source")
        .ok_or_else(|| SourceError::Parse("missing source".to_string()))?;

    let type_code = required(source.get("@type"), "citation type")?;
    let mut entry = BibEntry::new(EntryType::Article)
        .with_field("title", required(head.get("citation-title"), "citation-title")?)
        .with_authors(flatten_authors(head));

    if let Some(year) = source
        .get("publicationyear")
        .and_then(|y| text(y).or_else(|| y.as_object()?.values().next().and_then(text)))
    {
        entry.set_field("year", year);
    }

    let doi = match param {
        LookupParam::ScopusPmid(_) => required(response.pointer("/coredata/prism:doi"), "DOI")?,
        _ => key.to_string(),
    };
    entry.set_field("url", format!("https://doi.org/{}", doi));
    entry.set_field("doi", doi);

    match type_code.as_str() {
        "j" => {
            entry.entry_type = EntryType::Article;
            let journal = source
                .get("sourcetitle-abbrev")
                .and_then(text)
                .or_else(|| source.get("sourcetitle").and_then(text));
            if let Some(journal) = journal {
                entry.set_field("journal", journal);
            }
            let voliss = source.pointer("/volisspag/voliss");
            match (
                voliss.and_then(|v| v.get("@volume")).and_then(text),
                voliss.and_then(|v| v.get("@issue")).and_then(text),
            ) {
                (Some(volume), Some(issue)) => {
                    entry.set_field("volume", volume);
                    entry.set_field("number", issue);
                }
                (Some(volume), None) => entry.set_field("volume", volume),
                _ => info!("{}: No volume or issue found on Scopus.", key),
            }
            match source.pointer("/volisspag/pagerange").and_then(Value::as_object) {
                Some(range) => {
                    let pages: Vec<String> = range.values().filter_map(text).collect();
                    entry.set_field("pages", pages.join("--"));
                }
                None => info!("{}: No page range found on Scopus.", key),
            }
        }
        "p" | "k" => {
            entry.entry_type = if type_code == "p" {
                EntryType::InProceedings
            } else {
                EntryType::InCollection
            };
            entry.set_field(
                "publisher",
                required(source.pointer("/publisher/publishername"), "publisher")?,
            );
            entry.set_field(
                "booktitle",
                required(source.get("sourcetitle-abbrev"), "sourcetitle-abbrev")?,
            );
        }
        "b" => {
            entry.entry_type = EntryType::Book;
            entry.set_field(
                "publisher",
                required(source.pointer("/publisher/publishername"), "publisher")?,
            );
            entry.set_field("title", required(source.get("sourcetitle"), "sourcetitle")?);
            match source.pointer("/volisspag/pagerange/@last").and_then(text) {
                Some(last) => entry.set_field("pages", last),
                None => warn!("{}: Number of pages not found on Scopus.", key),
            }
        }
        other => {
            return Err(SourceError::Parse(format!("Unknown citation type: {}", other)));
        }
    }

    let pmid = match param {
        LookupParam::ScopusPmid(key) => Some(strip_pmid_prefix(key).to_string()),
        _ => response.pointer("/coredata/pubmed-id").and_then(text),
    };
    if let Some(pmid) = pmid {
        entry.set_field(PMID, pmid);
    }

    Ok(sanitized(entry))
}
