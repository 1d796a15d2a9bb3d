//! PubMed source.
//!
//! PubMed records are never turned into entries directly. The source only
//! finds the DOI of the article and forwards it, recording the PMID as
//! provenance on whatever entry the DOI resolves to.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info};

use crate::models::{strip_pmid_prefix, LookupParam};
use crate::sources::{
    msg_found, Forward, Lookup, Provenance, Source, SourceCapabilities, SourceError,
};
use crate::utils::HttpClient;

/// NCBI base URL (ID converter)
const NCBI_BASE_URL: &str = "https://www.ncbi.nlm.nih.gov";
/// PubMed web base URL (MEDLINE-format records)
const PUBMED_BASE_URL: &str = "https://pubmed.ncbi.nlm.nih.gov";

static MEDLINE_DOI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"AID - (10\.\d{4,9}/[-._;()/:A-Za-z0-9]+) \[doi\]")
        .expect("valid MEDLINE DOI pattern")
});

/// PubMed source
#[derive(Debug, Clone)]
pub struct PubMedSource {
    client: Arc<HttpClient>,
    ncbi_base: String,
    pubmed_base: String,
}

#[derive(Debug, Deserialize)]
struct IdConvResponse {
    #[serde(default)]
    records: Vec<IdConvRecord>,
}

#[derive(Debug, Deserialize)]
struct IdConvRecord {
    doi: Option<String>,
}

impl PubMedSource {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self::with_base_urls(client, NCBI_BASE_URL, PUBMED_BASE_URL)
    }

    /// Point both endpoints at other hosts (used by tests)
    pub fn with_base_urls(
        client: Arc<HttpClient>,
        ncbi_base: impl Into<String>,
        pubmed_base: impl Into<String>,
    ) -> Self {
        Self {
            client,
            ncbi_base: ncbi_base.into().trim_end_matches('/').to_string(),
            pubmed_base: pubmed_base.into().trim_end_matches('/').to_string(),
        }
    }

    /// DOI from the NCBI ID converter, if it knows one
    async fn doi_from_idconv(&self, pmid: &str) -> Result<Option<String>, SourceError> {
        let url = format!(
            "{}/pmc/utils/idconv/v1.0/?ids={}&idtype=pmid&format=json",
            self.ncbi_base, pmid
        );
        let response = self
            .client
            .fetch(&url, &[("Accept", "application/json")])
            .await?;
        if !response.is_success() {
            return Err(SourceError::http(response.status));
        }
        let parsed: IdConvResponse = serde_json::from_str(&response.body)?;
        Ok(parsed
            .records
            .into_iter()
            .next()
            .and_then(|r| r.doi)
            .filter(|doi| !doi.is_empty()))
    }

    /// DOI from the `AID` line of the MEDLINE-format record
    async fn doi_from_medline(&self, pmid: &str) -> Result<Option<String>, SourceError> {
        let url = format!("{}/{}/?format=pubmed", self.pubmed_base, pmid);
        let response = self.client.fetch(&url, &[]).await?;
        if !response.is_success() {
            return Err(SourceError::http(response.status));
        }
        Ok(MEDLINE_DOI_RE
            .captures(&response.body)
            .map(|caps| caps[1].to_string()))
    }
}

#[async_trait]
impl Source for PubMedSource {
    fn id(&self) -> &str {
        "pubmed"
    }

    fn name(&self) -> &str {
        "PubMed"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::PMID_LOOKUP
    }

    async fn fetch(&self, param: &LookupParam) -> Result<Lookup, SourceError> {
        let LookupParam::PubMed(key) = param else {
            return Err(SourceError::unsupported(self.id(), param));
        };
        let pmid = strip_pmid_prefix(key);

        let doi = match self.doi_from_idconv(pmid).await {
            Ok(Some(doi)) => Some(doi),
            Ok(None) => None,
            Err(e) => {
                debug!("ID converter failed for {}: {}", key, e);
                None
            }
        };
        let doi = match doi {
            Some(doi) => doi,
            None => self
                .doi_from_medline(pmid)
                .await?
                .ok_or_else(|| SourceError::NotFound(format!("DOI not found for PubMed ID {}!", key)))?,
        };

        info!(
            "{}",
            msg_found(key, self.name(), Some(&format!("Detected {}", doi)))
        );
        Ok(Lookup::Forward(Forward {
            doi,
            provenance: Provenance::PubMed(key.clone()),
        }))
    }
}
