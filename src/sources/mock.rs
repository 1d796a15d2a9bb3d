//! Mock source for testing purposes.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::models::{BibEntry, LookupParam};
use crate::sources::{Forward, Lookup, Provenance, Source, SourceCapabilities, SourceError};

/// A scriptable source that answers from predefined responses.
///
/// Lookups without a scripted response fail with [`SourceError::NotFound`].
/// Every call is recorded so tests can assert which services were asked.
#[derive(Debug)]
pub struct MockSource {
    id: String,
    name: String,
    responses: Mutex<HashMap<LookupParam, Result<Lookup, SourceError>>>,
    titles: Mutex<HashMap<String, Result<String, SourceError>>>,
    calls: Mutex<Vec<LookupParam>>,
    capabilities: SourceCapabilities,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockSource {
    /// Create a new mock source.
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            responses: Mutex::new(HashMap::new()),
            titles: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            capabilities: SourceCapabilities::all(),
        }
    }

    /// Advertise only `capabilities` instead of every lookup.
    pub fn with_capabilities(mut self, capabilities: SourceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Answer `param` with a complete entry.
    pub fn with_entry(self, param: LookupParam, entry: BibEntry) -> Self {
        self.respond(param, Ok(Lookup::Entry(entry)));
        self
    }

    /// Answer `param` by forwarding to `doi`.
    pub fn with_forward(self, param: LookupParam, doi: &str, provenance: Provenance) -> Self {
        self.respond(
            param,
            Ok(Lookup::Forward(Forward {
                doi: doi.to_string(),
                provenance,
            })),
        );
        self
    }

    /// Answer `param` with an error.
    pub fn with_error(self, param: LookupParam, error: SourceError) -> Self {
        self.respond(param, Err(error));
        self
    }

    /// Answer a title search for `title` with `doi`.
    pub fn with_title(self, title: &str, doi: &str) -> Self {
        lock(&self.titles).insert(title.to_string(), Ok(doi.to_string()));
        self
    }

    /// Set the response for a lookup.
    pub fn respond(&self, param: LookupParam, response: Result<Lookup, SourceError>) {
        lock(&self.responses).insert(param, response);
    }

    /// Every lookup made so far, in call order.
    pub fn calls(&self) -> Vec<LookupParam> {
        lock(&self.calls).clone()
    }

    /// Number of lookups made so far.
    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }
}

#[async_trait]
impl Source for MockSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> SourceCapabilities {
        self.capabilities
    }

    async fn fetch(&self, param: &LookupParam) -> Result<Lookup, SourceError> {
        lock(&self.calls).push(param.clone());
        lock(&self.responses)
            .get(param)
            .cloned()
            .unwrap_or_else(|| Err(SourceError::NotFound(format!("no mock response for {}", param))))
    }

    async fn find_doi_by_title(&self, title: &str) -> Result<String, SourceError> {
        lock(&self.titles)
            .get(title)
            .cloned()
            .unwrap_or_else(|| Err(SourceError::NotFound(format!("no mock result for {}", title))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntryType;

    #[tokio::test]
    async fn test_mock_scripted_responses() {
        let entry = BibEntry::new(EntryType::Article).with_key("x");
        let mock = MockSource::new("mock", "Mock")
            .with_entry(LookupParam::CrossrefDoi("10.1000/a".into()), entry.clone())
            .with_title("A Title", "10.1000/a");

        assert_eq!(
            mock.fetch(&LookupParam::CrossrefDoi("10.1000/a".into()))
                .await
                .unwrap(),
            Lookup::Entry(entry)
        );
        assert!(mock
            .fetch(&LookupParam::CrossrefDoi("10.1000/b".into()))
            .await
            .is_err());
        assert_eq!(mock.find_doi_by_title("A Title").await.unwrap(), "10.1000/a");
        assert_eq!(mock.call_count(), 2);
    }
}
