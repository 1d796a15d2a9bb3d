//! MathSciNet (AMS) source.
//!
//! The search page renders BibTeX inside `<pre>` blocks when asked for
//! `fmt=bibtex`. A lookup by MR-number or DOI normally yields exactly one
//! block; several blocks mean the query was ambiguous and the first wins.

use async_trait::async_trait;
use scraper::{Html, Selector};
use std::sync::Arc;
use tracing::{info, warn};

use crate::bibtex;
use crate::models::{strip_mr_prefix, LookupParam};
use crate::sources::{msg_found, Lookup, Source, SourceCapabilities, SourceError};
use crate::utils::HttpClient;

const MATHSCINET_BASE_URL: &str = "https://mathscinet.ams.org";

#[derive(Debug, Clone)]
pub struct MathSciNetSource {
    client: Arc<HttpClient>,
    base_url: String,
}

impl MathSciNetSource {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self::with_base_url(client, MATHSCINET_BASE_URL)
    }

    /// Point the source at another host (used by tests)
    pub fn with_base_url(client: Arc<HttpClient>, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn search_url(&self, param: &LookupParam) -> Result<String, SourceError> {
        let (field, value) = match param {
            LookupParam::MathSciNetKey(key) => ("MR", strip_mr_prefix(key).to_string()),
            LookupParam::MathSciNetDoi(doi) => ("DOI", urlencoding::encode(doi).into_owned()),
            other => return Err(SourceError::unsupported(self.id(), other)),
        };
        Ok(format!(
            "{}/mathscinet/search/publications.html?fmt=bibtex&pg1={}&s1={}",
            self.base_url, field, value
        ))
    }
}

/// Text of every `<pre>` block plus the page title
fn extract_blocks(page: &str) -> (Vec<String>, Option<String>) {
    let document = Html::parse_document(page);

    let blocks = match Selector::parse("pre") {
        Ok(pre) => document
            .select(&pre)
            .map(|block| block.text().collect::<String>())
            .filter(|text| !text.trim().is_empty())
            .collect(),
        Err(_) => Vec::new(),
    };
    let title = Selector::parse("head > title").ok().and_then(|selector| {
        document
            .select(&selector)
            .next()
            .map(|t| t.text().collect::<String>().replace('\n', "").trim().to_string())
    });

    (blocks, title)
}

#[async_trait]
impl Source for MathSciNetSource {
    fn id(&self) -> &str {
        "mathscinet"
    }

    fn name(&self) -> &str {
        "MathSciNet"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::MR_LOOKUP | SourceCapabilities::DOI_LOOKUP
    }

    async fn fetch(&self, param: &LookupParam) -> Result<Lookup, SourceError> {
        let url = self.search_url(param)?;
        let response = self.client.fetch(&url, &[]).await?;

        let (blocks, title) = extract_blocks(&response.body);
        let Some(first) = blocks.first() else {
            // A rendered page without BibTeX is a miss, not an outage.
            return Err(match (response.status, title) {
                (200, Some(title)) => SourceError::NotFound(format!("200; {}", title)),
                (200, None) => SourceError::NotFound("200".to_string()),
                (status, _) => SourceError::http(status),
            });
        };
        if blocks.len() > 1 {
            warn!(
                "MathSciNet returned more than one entry for {}. Using the first one but this may be wrong.",
                param
            );
        }

        let entry = bibtex::parse_entry(first)?;
        info!("{}", msg_found(param.key(), self.name(), None));
        Ok(Lookup::Entry(entry))
    }
}
