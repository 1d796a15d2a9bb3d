//! Resolution of citation keys into bibliography entries.
//!
//! A key is classified once and mapped onto a fixed sequence of sources:
//!
//! | Kind | Sources, in order |
//! |---|---|
//! | MR-number | MathSciNet |
//! | PubMed ID | Scopus by PMID (if configured), PubMed |
//! | arXiv ID | arXiv |
//! | DOI | MathSciNet (if enabled), Scopus (if configured), Crossref |
//!
//! Each source is tried only after the previous one failed; intermediate
//! failures are logged and only the last one reaches the caller. arXiv and
//! PubMed forward to a DOI, which is resolved again from the top. Forwarding
//! depth is not bounded: both services forward to DOIs, and DOIs never
//! forward.

pub mod update;

use futures_util::future::{join_all, BoxFuture, FutureExt};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::Settings;
use crate::models::{classify, BibEntry, Kind, LookupParam};
use crate::sources::{
    msg_looking, ArxivSource, CrossrefSource, Lookup, MathSciNetSource, PubMedSource,
    ScopusSource, Source, SourceError,
};
use crate::utils::{HttpClient, RateGate};

pub use update::{merge_provenance, Prompter, ScriptedPrompter, TerminalPrompter, Updater};

/// Final outcome of a failed resolution
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// The key matches no known identifier pattern
    #[error("{key} = Invalid citation key")]
    InvalidKey { key: String },

    /// The last source in the sequence failed
    #[error("{}", not_found_message(.key, .service, .reason, .continuation))]
    NotFound {
        key: String,
        service: String,
        reason: Option<String>,
        continuation: Option<String>,
    },
}

fn not_found_message(
    key: &str,
    service: &str,
    reason: &Option<String>,
    continuation: &Option<String>,
) -> String {
    let mut msg = format!("{} not found on {}", key, service);
    if let Some(reason) = reason {
        msg.push_str(&format!(" ({})", reason));
    }
    if let Some(next) = continuation {
        msg.push_str(&format!(". {}", next));
    }
    msg
}

impl ResolveError {
    /// Wrap a source failure for `key`
    pub fn from_source(key: &str, service: &str, err: &SourceError) -> Self {
        let reason = err.to_string();
        ResolveError::NotFound {
            key: key.to_string(),
            service: service.to_string(),
            reason: (!reason.is_empty()).then_some(reason),
            continuation: None,
        }
    }

    /// Attach a hint about what happens next
    pub fn continue_with(self, hint: impl Into<String>) -> Self {
        match self {
            ResolveError::NotFound {
                key,
                service,
                reason,
                ..
            } => ResolveError::NotFound {
                key,
                service,
                reason,
                continuation: Some(hint.into()),
            },
            other => other,
        }
    }

    /// The key this error is about
    pub fn key(&self) -> &str {
        match self {
            ResolveError::InvalidKey { key } | ResolveError::NotFound { key, .. } => key,
        }
    }
}

/// The set of services a [`Resolver`] dispatches to.
#[derive(Debug, Clone)]
pub struct Services {
    pub mathscinet: Arc<dyn Source>,
    pub crossref: Arc<dyn Source>,
    /// `None` when no API key is configured; Scopus is then never called
    pub scopus: Option<Arc<dyn Source>>,
    pub arxiv: Arc<dyn Source>,
    pub pubmed: Arc<dyn Source>,
}

impl Services {
    /// The production services sharing one HTTP client
    pub fn from_settings(settings: &Settings) -> Result<Self, SourceError> {
        let client = Arc::new(HttpClient::with_timeout(settings.http.timeout())?);
        let scopus = settings.api_key().map(|key| {
            let gate = Arc::new(RateGate::per_second(settings.scopus.rate_limit));
            Arc::new(ScopusSource::new(client.clone(), key, gate)) as Arc<dyn Source>
        });

        Ok(Self {
            mathscinet: Arc::new(MathSciNetSource::new(client.clone())),
            crossref: Arc::new(CrossrefSource::new(client.clone())),
            scopus,
            arxiv: Arc::new(ArxivSource::new(client.clone())),
            pubmed: Arc::new(PubMedSource::new(client)),
        })
    }
}

/// Resolves citation keys against the configured services.
#[derive(Debug, Clone)]
pub struct Resolver {
    services: Services,
    use_mathscinet: bool,
}

impl Resolver {
    pub fn new(services: Services, use_mathscinet: bool) -> Self {
        Self {
            services,
            use_mathscinet,
        }
    }

    /// Build the production resolver from settings
    pub fn from_settings(settings: &Settings) -> Result<Self, SourceError> {
        Ok(Self::new(
            Services::from_settings(settings)?,
            settings.sources.mathscinet,
        ))
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn uses_mathscinet(&self) -> bool {
        self.use_mathscinet
    }

    /// The sources to try for a key, in order
    fn plan(&self, key: &str, kind: Kind) -> Vec<(Arc<dyn Source>, LookupParam)> {
        let s = &self.services;
        let mut steps = Vec::new();
        match kind {
            Kind::MathSciNet => {
                steps.push((s.mathscinet.clone(), LookupParam::MathSciNetKey(key.to_string())));
            }
            Kind::PubMed => {
                if let Some(scopus) = &s.scopus {
                    steps.push((scopus.clone(), LookupParam::ScopusPmid(key.to_string())));
                }
                steps.push((s.pubmed.clone(), LookupParam::PubMed(key.to_string())));
            }
            Kind::ArxivOld | Kind::ArxivNew => {
                steps.push((s.arxiv.clone(), LookupParam::Arxiv(key.to_string())));
            }
            Kind::Doi => {
                if self.use_mathscinet {
                    steps.push((s.mathscinet.clone(), LookupParam::MathSciNetDoi(key.to_string())));
                }
                if let Some(scopus) = &s.scopus {
                    steps.push((scopus.clone(), LookupParam::ScopusDoi(key.to_string())));
                }
                steps.push((s.crossref.clone(), LookupParam::CrossrefDoi(key.to_string())));
            }
            Kind::Invalid => {}
        }
        steps
    }

    /// Call one source, following a forward if it returns one
    async fn attempt(
        &self,
        source: &dyn Source,
        param: &LookupParam,
    ) -> Result<BibEntry, ResolveError> {
        let key = param.key();
        info!("{}", msg_looking(key, source.name()));
        match source.fetch(param).await {
            Ok(Lookup::Entry(entry)) => Ok(entry),
            Ok(Lookup::Forward(forward)) => {
                let mut entry = self.resolve(&forward.doi).await?;
                forward.provenance.apply(&mut entry);
                Ok(entry)
            }
            Err(err) => {
                debug!(source = source.id(), kind = ?err.kind(), "{}: {}", key, err);
                Err(ResolveError::from_source(key, source.name(), &err))
            }
        }
    }

    /// Resolve one citation key.
    ///
    /// The returned entry carries `key` as its citation label.
    pub fn resolve<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<BibEntry, ResolveError>> {
        async move {
            let kind = classify(key);
            let steps = self.plan(key, kind);
            if steps.is_empty() {
                return Err(ResolveError::InvalidKey {
                    key: key.to_string(),
                });
            }

            let mut last_err = None;
            for (i, (source, param)) in steps.iter().enumerate() {
                match self.attempt(source.as_ref(), param).await {
                    Ok(mut entry) => {
                        entry.key = key.to_string();
                        return Ok(entry);
                    }
                    Err(err) => match steps.get(i + 1) {
                        Some((next, _)) => {
                            info!("{}", err.continue_with(format!("Trying {}", next.name())));
                        }
                        None => last_err = Some(err),
                    },
                }
            }
            Err(last_err.unwrap_or(ResolveError::InvalidKey {
                key: key.to_string(),
            }))
        }
        .boxed()
    }

    /// Resolve every key concurrently.
    ///
    /// Results come back in input order; one failure never affects the
    /// other keys.
    pub async fn resolve_many(
        &self,
        keys: &[String],
    ) -> Vec<(String, Result<BibEntry, ResolveError>)> {
        join_all(keys.iter().map(|key| async move {
            let outcome = self.resolve(key).await;
            (key.clone(), outcome)
        }))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntryType, Person};
    use crate::sources::{MockSource, Provenance};

    struct Mocks {
        mathscinet: Arc<MockSource>,
        crossref: Arc<MockSource>,
        scopus: Arc<MockSource>,
        arxiv: Arc<MockSource>,
        pubmed: Arc<MockSource>,
    }

    impl Mocks {
        fn new() -> Self {
            Self {
                mathscinet: Arc::new(MockSource::new("mathscinet", "MathSciNet")),
                crossref: Arc::new(MockSource::new("crossref", "crossref.org")),
                scopus: Arc::new(MockSource::new("scopus", "Scopus")),
                arxiv: Arc::new(MockSource::new("arxiv", "arXiv")),
                pubmed: Arc::new(MockSource::new("pubmed", "PubMed")),
            }
        }

        fn resolver(&self, with_scopus: bool, use_mathscinet: bool) -> Resolver {
            Resolver::new(
                Services {
                    mathscinet: self.mathscinet.clone(),
                    crossref: self.crossref.clone(),
                    scopus: with_scopus.then(|| self.scopus.clone() as Arc<dyn Source>),
                    arxiv: self.arxiv.clone(),
                    pubmed: self.pubmed.clone(),
                },
                use_mathscinet,
            )
        }
    }

    fn article(title: &str) -> BibEntry {
        BibEntry::new(EntryType::Article)
            .with_key("service-key")
            .with_field("title", title)
            .with_authors(vec![Person::new("C. E.", "Shannon")])
    }

    const DOI: &str = "10.1002/j.1538-7305.1948.tb01338.x";

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    /// Resolve `key` while capturing log output at `level`
    async fn resolve_logged(
        resolver: &Resolver,
        key: &str,
        level: tracing::Level,
    ) -> (Result<BibEntry, ResolveError>, String) {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);
        let outcome = resolver.resolve(key).await;
        (outcome, buffer.contents())
    }

    #[tokio::test]
    async fn test_mr_key_uses_mathscinet_only() {
        let mocks = Mocks::new();
        mocks.mathscinet.respond(
            LookupParam::MathSciNetKey("MR0026286".into()),
            Ok(Lookup::Entry(article("MR").with_field("mrnumber", "26286"))),
        );

        let entry = mocks.resolver(true, true).resolve("MR0026286").await.unwrap();
        assert_eq!(entry.key, "MR0026286");
        assert_eq!(entry.field("mrnumber"), Some("26286"));
        assert_eq!(mocks.crossref.call_count(), 0);
        assert_eq!(mocks.scopus.call_count(), 0);
    }

    #[tokio::test]
    async fn test_doi_falls_back_in_order() {
        let mocks = Mocks::new();
        mocks.crossref.respond(
            LookupParam::CrossrefDoi(DOI.into()),
            Ok(Lookup::Entry(article("Crossref"))),
        );

        let entry = mocks.resolver(true, true).resolve(DOI).await.unwrap();
        assert_eq!(entry.title(), Some("Crossref"));
        assert_eq!(entry.key, DOI);
        assert_eq!(
            mocks.mathscinet.calls(),
            vec![LookupParam::MathSciNetDoi(DOI.into())]
        );
        assert_eq!(mocks.scopus.calls(), vec![LookupParam::ScopusDoi(DOI.into())]);
        assert_eq!(mocks.crossref.call_count(), 1);
    }

    #[tokio::test]
    async fn test_intermediate_failures_stay_below_warn() {
        let mocks = Mocks::new();
        mocks.crossref.respond(
            LookupParam::CrossrefDoi(DOI.into()),
            Ok(Lookup::Entry(article("Crossref"))),
        );
        let resolver = mocks.resolver(false, true);

        let (outcome, quiet) = resolve_logged(&resolver, DOI, tracing::Level::WARN).await;
        assert!(outcome.is_ok());
        assert_eq!(quiet, "");

        let (_, verbose) = resolve_logged(&resolver, DOI, tracing::Level::INFO).await;
        assert!(verbose.contains(&format!("{} not found on MathSciNet", DOI)));
        assert!(verbose.contains("Trying crossref.org"));

        let (_, debug) = resolve_logged(&resolver, DOI, tracing::Level::DEBUG).await;
        assert!(debug.contains("NotFoundOnService"));
    }

    #[tokio::test]
    async fn test_doi_without_mathscinet_skips_it() {
        let mocks = Mocks::new();
        mocks.crossref.respond(
            LookupParam::CrossrefDoi(DOI.into()),
            Ok(Lookup::Entry(article("Crossref"))),
        );

        mocks.resolver(false, false).resolve(DOI).await.unwrap();
        assert_eq!(mocks.mathscinet.call_count(), 0);
        assert_eq!(mocks.scopus.call_count(), 0);
        assert_eq!(mocks.crossref.call_count(), 1);
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let mocks = Mocks::new();
        mocks.mathscinet.respond(
            LookupParam::MathSciNetDoi(DOI.into()),
            Ok(Lookup::Entry(article("MathSciNet"))),
        );

        let entry = mocks.resolver(true, true).resolve(DOI).await.unwrap();
        assert_eq!(entry.title(), Some("MathSciNet"));
        assert_eq!(mocks.scopus.call_count(), 0);
        assert_eq!(mocks.crossref.call_count(), 0);
    }

    #[tokio::test]
    async fn test_last_failure_propagates() {
        let mocks = Mocks::new();
        mocks.crossref.respond(
            LookupParam::CrossrefDoi(DOI.into()),
            Err(SourceError::http(404)),
        );

        let err = mocks.resolver(false, true).resolve(DOI).await.unwrap_err();
        assert_eq!(
            err,
            ResolveError::NotFound {
                key: DOI.into(),
                service: "crossref.org".into(),
                reason: Some("404".into()),
                continuation: None,
            }
        );
        assert_eq!(err.to_string(), format!("{} not found on crossref.org (404)", DOI));
    }

    #[tokio::test]
    async fn test_invalid_key_calls_nothing() {
        let mocks = Mocks::new();
        let err = mocks.resolver(true, true).resolve("not-a-key").await.unwrap_err();
        assert_eq!(err.to_string(), "not-a-key = Invalid citation key");
        assert_eq!(mocks.mathscinet.call_count(), 0);
        assert_eq!(mocks.crossref.call_count(), 0);
        assert_eq!(mocks.arxiv.call_count(), 0);
    }

    #[tokio::test]
    async fn test_arxiv_forward_applies_provenance() {
        let mocks = Mocks::new();
        mocks.arxiv.respond(
            LookupParam::Arxiv("math/0211159".into()),
            Ok(Lookup::Forward(crate::sources::Forward {
                doi: DOI.into(),
                provenance: Provenance::Arxiv("math/0211159".into()),
            })),
        );
        mocks.crossref.respond(
            LookupParam::CrossrefDoi(DOI.into()),
            Ok(Lookup::Entry(article("Forwarded"))),
        );

        let entry = mocks
            .resolver(false, false)
            .resolve("math/0211159")
            .await
            .unwrap();
        assert_eq!(entry.key, "math/0211159");
        assert_eq!(entry.field("eprint"), Some("math/0211159"));
        assert_eq!(entry.field("archiveprefix"), Some("arXiv"));
    }

    #[tokio::test]
    async fn test_pmid_tries_scopus_then_pubmed() {
        let mocks = Mocks::new();
        mocks.pubmed.respond(
            LookupParam::PubMed("PMID:271968".into()),
            Ok(Lookup::Forward(crate::sources::Forward {
                doi: DOI.into(),
                provenance: Provenance::PubMed("PMID:271968".into()),
            })),
        );
        mocks.crossref.respond(
            LookupParam::CrossrefDoi(DOI.into()),
            Ok(Lookup::Entry(article("PubMed"))),
        );

        let entry = mocks
            .resolver(true, false)
            .resolve("PMID:271968")
            .await
            .unwrap();
        assert_eq!(entry.field("pmid"), Some("271968"));
        assert_eq!(entry.key, "PMID:271968");
        assert_eq!(
            mocks.scopus.calls(),
            vec![
                LookupParam::ScopusPmid("PMID:271968".into()),
                LookupParam::ScopusDoi(DOI.into())
            ]
        );
    }

    #[tokio::test]
    async fn test_forward_failure_propagates_inner_error() {
        let mocks = Mocks::new();
        mocks.arxiv.respond(
            LookupParam::Arxiv("2301.12345".into()),
            Ok(Lookup::Forward(crate::sources::Forward {
                doi: "10.1000/gone".into(),
                provenance: Provenance::Arxiv("2301.12345".into()),
            })),
        );

        let err = mocks
            .resolver(false, false)
            .resolve("2301.12345")
            .await
            .unwrap_err();
        assert_eq!(err.key(), "10.1000/gone");
    }

    #[tokio::test]
    async fn test_resolve_many_keeps_order_and_isolates_failures() {
        let mocks = Mocks::new();
        mocks.mathscinet.respond(
            LookupParam::MathSciNetKey("MR0026286".into()),
            Ok(Lookup::Entry(article("MR"))),
        );
        let keys = vec![
            "bogus".to_string(),
            "MR0026286".to_string(),
            "MR1234567".to_string(),
        ];

        let results = mocks.resolver(false, true).resolve_many(&keys).await;
        let order: Vec<&str> = results.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(order, vec!["bogus", "MR0026286", "MR1234567"]);
        assert!(matches!(results[0].1, Err(ResolveError::InvalidKey { .. })));
        assert!(results[1].1.is_ok());
        assert!(matches!(results[2].1, Err(ResolveError::NotFound { .. })));
    }

    #[test]
    fn test_continuation_message() {
        let err = ResolveError::from_source("MR1", "MathSciNet", &SourceError::http(503))
            .continue_with("Trying crossref.org");
        assert_eq!(
            err.to_string(),
            "MR1 not found on MathSciNet (503). Trying crossref.org"
        );
    }
}
