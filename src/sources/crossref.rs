//! Crossref source.
//!
//! Asks the DOI resolver for BibTeX through content negotiation. The resolver
//! redirects to whichever registration agency holds the DOI (Crossref,
//! DataCite, mEDRA, JaLC), so this works for every registered DOI.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::bibtex::{self, sanitized};
use crate::models::LookupParam;
use crate::sources::{msg_found, Lookup, Source, SourceCapabilities, SourceError};
use crate::utils::HttpClient;

const DOI_RESOLVER_BASE: &str = "https://doi.org";
const BIBTEX_ACCEPT: &str = "application/x-bibtex; charset=utf-8";

/// Crossref source
///
/// The generic fallback for DOIs: its records are not curated, so every
/// entry is sanitized before it is returned.
#[derive(Debug, Clone)]
pub struct CrossrefSource {
    client: Arc<HttpClient>,
    base_url: String,
}

impl CrossrefSource {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self::with_base_url(client, DOI_RESOLVER_BASE)
    }

    pub fn with_base_url(client: Arc<HttpClient>, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn doi_url(&self, doi: &str) -> String {
        format!("{}/{}", self.base_url, doi)
    }
}

#[async_trait]
impl Source for CrossrefSource {
    fn id(&self) -> &str {
        "crossref"
    }

    fn name(&self) -> &str {
        "crossref.org"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::DOI_LOOKUP
    }

    async fn fetch(&self, param: &LookupParam) -> Result<Lookup, SourceError> {
        let LookupParam::CrossrefDoi(doi) = param else {
            return Err(SourceError::unsupported(self.id(), param));
        };

        let response = self
            .client
            .fetch(&self.doi_url(doi), &[("Accept", BIBTEX_ACCEPT)])
            .await?;
        if !response.is_success() {
            return Err(SourceError::http(response.status));
        }

        let entry = bibtex::parse_entry(&response.body).map_err(|e| {
            SourceError::NotFound(format!("{}; {}", response.status, e))
        })?;
        info!("{}", msg_found(doi, self.name(), None));
        Ok(Lookup::Entry(sanitized(entry)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHANNON_BIBTEX: &str = "@article{Shannon_1948, title={A Mathematical Theory of Communication}, \
        volume={27}, ISSN={0005-8580}, url={http://dx.doi.org/10.1002/j.1538-7305.1948.tb01338.x}, \
        DOI={10.1002/j.1538-7305.1948.tb01338.x}, number={3}, journal={Bell System Technical Journal}, \
        publisher={Institute of Electrical and Electronics Engineers (IEEE)}, author={Shannon, C. E.}, \
        year={1948}, month=jul, pages={379--423} }";

    fn source(server: &mockito::ServerGuard) -> CrossrefSource {
        CrossrefSource::with_base_url(Arc::new(HttpClient::new().unwrap()), server.url())
    }

    #[tokio::test]
    async fn test_fetch_sanitizes_entry() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/10.1002/j.1538-7305.1948.tb01338.x")
            .match_header("accept", BIBTEX_ACCEPT)
            .with_status(200)
            .with_body(SHANNON_BIBTEX)
            .create_async()
            .await;

        let lookup = source(&server)
            .fetch(&LookupParam::CrossrefDoi(
                "10.1002/j.1538-7305.1948.tb01338.x".into(),
            ))
            .await
            .unwrap();
        let Lookup::Entry(entry) = lookup else {
            panic!("expected an entry");
        };
        assert_eq!(
            entry.title(),
            Some("{A} {Mathematical} {Theory} of {Communication}")
        );
        assert!(!entry.has_field("month"));
        assert_eq!(entry.field("pages"), Some("379--423"));
        assert_eq!(entry.authors[0].family, "Shannon");
    }

    #[tokio::test]
    async fn test_fetch_follows_registration_agency_redirect() {
        let mut server = mockito::Server::new_async().await;
        let _redirect = server
            .mock("GET", "/10.5281/zenodo.1234")
            .with_status(302)
            .with_header("location", "/dois/10.5281/zenodo.1234")
            .create_async()
            .await;
        let _record = server
            .mock("GET", "/dois/10.5281/zenodo.1234")
            .match_header("accept", BIBTEX_ACCEPT)
            .with_status(200)
            .with_body(
                "@misc{Doe_2020, doi = {10.5281/zenodo.1234}, \
                 author = {Doe, Jane}, title = {Survey Data Set}, publisher = {Zenodo}, year = {2020}}",
            )
            .create_async()
            .await;

        let lookup = source(&server)
            .fetch(&LookupParam::CrossrefDoi("10.5281/zenodo.1234".into()))
            .await
            .unwrap();
        let Lookup::Entry(entry) = lookup else {
            panic!("expected an entry");
        };
        assert_eq!(entry.title(), Some("{Survey} {Data} {Set}"));
        assert_eq!(entry.field("publisher"), Some("Zenodo"));
    }

    #[tokio::test]
    async fn test_fetch_unknown_doi() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/10.1000/missing")
            .with_status(404)
            .with_body("Resource not found.")
            .create_async()
            .await;

        let err = source(&server)
            .fetch(&LookupParam::CrossrefDoi("10.1000/missing".into()))
            .await
            .unwrap_err();
        assert_eq!(err, SourceError::http(404));
    }

    #[tokio::test]
    async fn test_fetch_rejects_other_params() {
        let server = mockito::Server::new_async().await;
        let err = source(&server)
            .fetch(&LookupParam::ScopusDoi("10.1000/x".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::InvalidRequest(_)));
    }
}
