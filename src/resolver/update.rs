//! Interactive replacement of existing bibliography entries.
//!
//! For every entry the [`Updater`] looks for a better record (MathSciNet by
//! DOI, then a Scopus title search) and asks the user whether to take it.
//! The user can also type a DOI to resolve instead. Entries carrying an
//! `mrnumber` are left alone.

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::bibtex::{latex, to_bibtex};
use crate::models::{is_doi, BibEntry, LookupParam, ARCHIVE_PREFIX, EPRINT, MRNUMBER, PMID};
use crate::resolver::{ResolveError, Resolver};
use crate::sources::{Lookup, Source, SourceError};
use crate::utils::display;

const REPLACE_PREFIX: &str = "Replace old citation? ";
const INVALID_DOI_PREFIX: &str = "Invalid DOI! ";

/// Blocking user interaction.
///
/// Kept behind a trait so the update flow can run without a terminal.
pub trait Prompter: Send + Sync {
    /// Show `message` and read one line of input (without the newline)
    fn ask(&self, message: &str) -> io::Result<String>;

    /// Show informational text
    fn say(&self, text: &str);
}

/// Prompts on stderr and reads stdin, leaving stdout to the bibliography.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn ask(&self, message: &str) -> io::Result<String> {
        let mut stderr = io::stderr().lock();
        write!(stderr, "{}", message)?;
        stderr.flush()?;

        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "no input"));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    fn say(&self, text: &str) {
        eprintln!("{}", text);
    }
}

/// Answers prompts from a fixed script and records everything shown.
///
/// Running out of answers behaves like end of input.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<String>>,
    transcript: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            transcript: Mutex::new(Vec::new()),
        }
    }

    /// Prompts and messages shown so far
    pub fn transcript(&self) -> Vec<String> {
        self.transcript
            .lock()
            .map(|t| t.clone())
            .unwrap_or_default()
    }

    fn record(&self, text: &str) {
        if let Ok(mut transcript) = self.transcript.lock() {
            transcript.push(text.to_string());
        }
    }
}

impl Prompter for ScriptedPrompter {
    fn ask(&self, message: &str) -> io::Result<String> {
        self.record(message);
        self.answers
            .lock()
            .ok()
            .and_then(|mut answers| answers.pop_front())
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "script exhausted"))
    }

    fn say(&self, text: &str) {
        self.record(text);
    }
}

impl<P: Prompter + ?Sized> Prompter for &P {
    fn ask(&self, message: &str) -> io::Result<String> {
        (**self).ask(message)
    }

    fn say(&self, text: &str) {
        (**self).say(text)
    }
}

/// Carry identifiers of the superseded entry over to its replacement.
///
/// The citation key is always kept. `eprint`/`archiveprefix` are copied when
/// the old entry has them; `pmid` only when the candidate lacks one.
pub fn merge_provenance(old: &BibEntry, candidate: &mut BibEntry) {
    candidate.key = old.key.clone();
    if let Some(eprint) = old.field(EPRINT) {
        candidate.set_field(EPRINT, eprint);
        match old.field(ARCHIVE_PREFIX) {
            Some(prefix) => candidate.set_field(ARCHIVE_PREFIX, prefix),
            None => {
                candidate.remove_field(ARCHIVE_PREFIX);
            }
        }
    }
    if let Some(pmid) = old.field(PMID) {
        if !candidate.has_field(PMID) {
            candidate.set_field(PMID, pmid);
        }
    }
}

fn prompt_text(prefix: &str, has_candidate: bool) -> String {
    let mut prompt = format!("{}Press", prefix);
    if has_candidate {
        prompt.push_str(" 'y' to replace,");
    }
    prompt.push_str(" [enter] to leave the old citation, or enter a DOI for a custom replacement: ");
    prompt
}

/// Runs the update flow against a [`Resolver`].
pub struct Updater<'a, P: Prompter> {
    resolver: &'a Resolver,
    prompter: P,
    color: bool,
}

impl<'a, P: Prompter> Updater<'a, P> {
    pub fn new(resolver: &'a Resolver, prompter: P) -> Self {
        Self {
            resolver,
            prompter,
            color: display::is_terminal(),
        }
    }

    /// Enable or disable colored diffs
    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    async fn fetch_entry(
        &self,
        source: &dyn Source,
        param: LookupParam,
    ) -> Result<BibEntry, SourceError> {
        match source.fetch(&param).await? {
            Lookup::Entry(entry) => Ok(entry),
            Lookup::Forward(forward) => self
                .resolver
                .resolve(&forward.doi)
                .await
                .map(|mut entry| {
                    forward.provenance.apply(&mut entry);
                    entry
                })
                .map_err(|e| SourceError::NotFound(e.to_string())),
        }
    }

    /// MathSciNet by DOI, if MathSciNet is enabled
    async fn from_mathscinet(&self, doi: &str) -> Result<BibEntry, SourceError> {
        if !self.resolver.uses_mathscinet() {
            return Err(SourceError::NotImplemented);
        }
        let mathscinet = self.resolver.services().mathscinet.clone();
        self.fetch_entry(mathscinet.as_ref(), LookupParam::MathSciNetDoi(doi.to_string()))
            .await
    }

    /// Scopus title search, then MathSciNet or Scopus by the DOI found
    async fn from_title_search(&self, title: &str) -> Result<BibEntry, SourceError> {
        let Some(scopus) = self.resolver.services().scopus.clone() else {
            return Err(SourceError::Unauthorized("no Scopus API key configured".to_string()));
        };
        if !scopus.supports_title_search() {
            return Err(SourceError::NotImplemented);
        }
        info!("\"{}\": Checking for DOI on Scopus", title);
        let doi = scopus.find_doi_by_title(title).await?;
        match self.from_mathscinet(&doi).await {
            Ok(entry) => Ok(entry),
            Err(err) => {
                debug!("{}: {}", doi, err);
                self.fetch_entry(scopus.as_ref(), LookupParam::ScopusDoi(doi))
                    .await
            }
        }
    }

    async fn find_candidate(&self, entry: &BibEntry, title: &str) -> Option<BibEntry> {
        if let Some(doi) = entry.doi() {
            match self.from_mathscinet(doi).await {
                Ok(candidate) => return Some(candidate),
                Err(err) => info!("{} ({}): Not found on MathSciNet ({})", doi, title, err),
            }
        }
        match self.from_title_search(title).await {
            Ok(candidate) => Some(candidate),
            Err(err) => {
                debug!("\"{}\": {}", title, err);
                None
            }
        }
    }

    /// Offer a replacement for one entry and return whichever the user keeps
    pub async fn update(&self, entry: BibEntry) -> BibEntry {
        let title = latex::to_plain_text(entry.title().unwrap_or_default());
        if entry.is_frozen() {
            info!(
                "MR{} ({}): Skipping MR entry",
                entry.field(MRNUMBER).unwrap_or_default(),
                title
            );
            return entry;
        }

        let mut candidate = self.find_candidate(&entry, &title).await;
        let mut prefix = match candidate {
            Some(_) => REPLACE_PREFIX.to_string(),
            None => format!("\"{}\": No entry found on Scopus. ", title),
        };

        loop {
            if let Some(found) = candidate.as_mut() {
                merge_provenance(&entry, found);
                self.prompter.say("Found the following replacement:");
                self.prompter.say(&display::side_by_side(
                    &to_bibtex(&entry),
                    &to_bibtex(found),
                    display::column_width(display::terminal_width()),
                    self.color,
                ));
            }

            let answer = match self.prompter.ask(&prompt_text(&prefix, candidate.is_some())) {
                Ok(answer) => answer.trim().to_string(),
                Err(err) => {
                    warn!("{}: no answer ({}); leaving old citation", entry.key, err);
                    return entry;
                }
            };

            if answer.is_empty() {
                return entry;
            }
            if answer == "y" {
                if let Some(found) = candidate.take() {
                    return found;
                }
            }
            if !is_doi(&answer) {
                prefix = INVALID_DOI_PREFIX.to_string();
                candidate = None;
                continue;
            }

            match self.resolver.resolve(&answer).await {
                Ok(found) => {
                    candidate = Some(found);
                    prefix = REPLACE_PREFIX.to_string();
                }
                Err(err) => {
                    self.report_failure(&answer, &err);
                    return entry;
                }
            }
        }
    }

    fn report_failure(&self, doi: &str, err: &ResolveError) {
        self.prompter
            .say(&format!("{}: No citation found; leaving old citation", doi));
        self.prompter.say(&err.to_string());
    }

    /// Update every entry in order, one prompt at a time
    pub async fn update_all(&self, entries: Vec<BibEntry>) -> Vec<BibEntry> {
        let mut updated = Vec::with_capacity(entries.len());
        for entry in entries {
            updated.push(self.update(entry).await);
        }
        updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntryType, Person};
    use crate::resolver::Services;
    use crate::sources::{MockSource, SourceCapabilities};
    use std::sync::Arc;

    const OLD_DOI: &str = "10.1000/old";
    const TITLE: &str = "A Study of Things";

    struct Fixture {
        mathscinet: Arc<MockSource>,
        crossref: Arc<MockSource>,
        scopus: Arc<MockSource>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                mathscinet: Arc::new(MockSource::new("mathscinet", "MathSciNet")),
                crossref: Arc::new(MockSource::new("crossref", "crossref.org")),
                scopus: Arc::new(MockSource::new("scopus", "Scopus")),
            }
        }

        fn resolver(&self) -> Resolver {
            Resolver::new(
                Services {
                    mathscinet: self.mathscinet.clone(),
                    crossref: self.crossref.clone(),
                    scopus: Some(self.scopus.clone() as Arc<dyn Source>),
                    arxiv: Arc::new(MockSource::new("arxiv", "arXiv")),
                    pubmed: Arc::new(MockSource::new("pubmed", "PubMed")),
                },
                true,
            )
        }
    }

    fn old_entry() -> BibEntry {
        BibEntry::new(EntryType::Article)
            .with_key("smith2020")
            .with_field("title", "{A} {Study} of {Things}")
            .with_field("doi", OLD_DOI)
            .with_field("eprint", "2001.00001")
            .with_field("archiveprefix", "arXiv")
            .with_field("pmid", "123456")
            .with_authors(vec![Person::new("Jane", "Smith")])
    }

    fn mr_entry() -> BibEntry {
        BibEntry::new(EntryType::Article)
            .with_key("MR-origin")
            .with_field("title", "A Study of Things")
            .with_field("journal", "Ann. of Math.")
            .with_field("mrnumber", "1234567")
    }

    #[test]
    fn test_merge_provenance() {
        let old = old_entry();
        let mut candidate = BibEntry::new(EntryType::Article).with_key("other");
        merge_provenance(&old, &mut candidate);
        assert_eq!(candidate.key, "smith2020");
        assert_eq!(candidate.field("eprint"), Some("2001.00001"));
        assert_eq!(candidate.field("archiveprefix"), Some("arXiv"));
        assert_eq!(candidate.field("pmid"), Some("123456"));

        let mut with_pmid = BibEntry::new(EntryType::Article).with_field("pmid", "999");
        merge_provenance(&old, &mut with_pmid);
        assert_eq!(with_pmid.field("pmid"), Some("999"));
    }

    #[test]
    fn test_prompt_text() {
        assert_eq!(
            prompt_text(REPLACE_PREFIX, true),
            "Replace old citation? Press 'y' to replace, [enter] to leave the old citation, \
             or enter a DOI for a custom replacement: "
        );
        assert!(!prompt_text(INVALID_DOI_PREFIX, false).contains("'y'"));
    }

    #[tokio::test]
    async fn test_frozen_entry_is_untouched() {
        let fixture = Fixture::new();
        let resolver = fixture.resolver();
        let prompter = ScriptedPrompter::new(["y"]);
        let updater = Updater::new(&resolver, &prompter).with_color(false);

        let entry = mr_entry().with_field("doi", OLD_DOI);
        assert_eq!(updater.update(entry.clone()).await, entry);
        assert!(prompter.transcript().is_empty());
        assert_eq!(fixture.mathscinet.call_count(), 0);
    }

    #[tokio::test]
    async fn test_accepts_mathscinet_candidate() {
        let fixture = Fixture::new();
        fixture.mathscinet.respond(
            LookupParam::MathSciNetDoi(OLD_DOI.into()),
            Ok(Lookup::Entry(mr_entry())),
        );
        let resolver = fixture.resolver();
        let prompter = ScriptedPrompter::new(["y"]);
        let updater = Updater::new(&resolver, &prompter).with_color(false);

        let updated = updater.update(old_entry()).await;
        assert_eq!(updated.key, "smith2020");
        assert_eq!(updated.field("mrnumber"), Some("1234567"));
        assert_eq!(updated.field("eprint"), Some("2001.00001"));
        assert_eq!(updated.field("pmid"), Some("123456"));

        let transcript = prompter.transcript();
        assert_eq!(transcript[0], "Found the following replacement:");
        assert!(transcript[1].contains("->"));
        assert!(transcript[2].starts_with(REPLACE_PREFIX));
    }

    #[tokio::test]
    async fn test_enter_keeps_old_entry() {
        let fixture = Fixture::new();
        fixture.mathscinet.respond(
            LookupParam::MathSciNetDoi(OLD_DOI.into()),
            Ok(Lookup::Entry(mr_entry())),
        );
        let resolver = fixture.resolver();
        let prompter = ScriptedPrompter::new([""]);
        let updater = Updater::new(&resolver, &prompter).with_color(false);

        assert_eq!(updater.update(old_entry()).await, old_entry());
    }

    #[tokio::test]
    async fn test_falls_back_to_title_search() {
        let fixture = Fixture::new().with_scopus_title();
        let scopus_entry = BibEntry::new(EntryType::Article)
            .with_field("title", "{A} {Study} of {Things}")
            .with_field("doi", "10.1000/new");
        fixture.scopus.respond(
            LookupParam::ScopusDoi("10.1000/new".into()),
            Ok(Lookup::Entry(scopus_entry)),
        );
        let resolver = fixture.resolver();
        let prompter = ScriptedPrompter::new(["y"]);
        let updater = Updater::new(&resolver, &prompter).with_color(false);

        let updated = updater.update(old_entry()).await;
        assert_eq!(updated.doi(), Some("10.1000/new"));
        assert_eq!(updated.key, "smith2020");
        assert_eq!(
            fixture.mathscinet.calls(),
            vec![
                LookupParam::MathSciNetDoi(OLD_DOI.into()),
                LookupParam::MathSciNetDoi("10.1000/new".into())
            ]
        );
    }

    #[tokio::test]
    async fn test_title_search_needs_capability() {
        let scopus = Arc::new(
            MockSource::new("scopus", "Scopus")
                .with_title(TITLE, "10.1000/new")
                .with_capabilities(SourceCapabilities::DOI_LOOKUP | SourceCapabilities::PMID_LOOKUP),
        );
        let fixture = Fixture { scopus, ..Fixture::new() };
        let resolver = fixture.resolver();
        let prompter = ScriptedPrompter::new([""]);
        let updater = Updater::new(&resolver, &prompter).with_color(false);

        assert_eq!(updater.update(old_entry()).await, old_entry());
        assert_eq!(fixture.mathscinet.calls(), vec![LookupParam::MathSciNetDoi(OLD_DOI.into())]);
        assert_eq!(fixture.scopus.call_count(), 0);
        assert!(prompter.transcript()[0].starts_with("\"A Study of Things\": No entry found on Scopus. "));
    }

    #[tokio::test]
    async fn test_invalid_then_manual_doi() {
        let fixture = Fixture::new();
        fixture.crossref.respond(
            LookupParam::CrossrefDoi("10.1000/manual".into()),
            Ok(Lookup::Entry(
                BibEntry::new(EntryType::Article).with_field("doi", "10.1000/manual"),
            )),
        );
        let resolver = fixture.resolver();
        let prompter = ScriptedPrompter::new(["not a doi", "10.1000/manual", "y"]);
        let updater = Updater::new(&resolver, &prompter).with_color(false);

        let updated = updater.update(old_entry()).await;
        assert_eq!(updated.doi(), Some("10.1000/manual"));
        assert_eq!(updated.key, "smith2020");

        let prompts: Vec<String> = prompter
            .transcript()
            .into_iter()
            .filter(|line| line.ends_with("custom replacement: "))
            .collect();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[0].starts_with("\"A Study of Things\": No entry found on Scopus. "));
        assert!(prompts[1].starts_with(INVALID_DOI_PREFIX));
        assert!(prompts[2].starts_with(REPLACE_PREFIX));
    }

    #[tokio::test]
    async fn test_unresolvable_manual_doi_keeps_old_entry() {
        let fixture = Fixture::new();
        let resolver = fixture.resolver();
        let prompter = ScriptedPrompter::new(["10.1000/nowhere"]);
        let updater = Updater::new(&resolver, &prompter).with_color(false);

        assert_eq!(updater.update(old_entry()).await, old_entry());
        assert!(prompter
            .transcript()
            .contains(&"10.1000/nowhere: No citation found; leaving old citation".to_string()));
    }

    #[tokio::test]
    async fn test_update_all_runs_in_order() {
        let fixture = Fixture::new();
        let resolver = fixture.resolver();
        let prompter = ScriptedPrompter::new([""]);
        let updater = Updater::new(&resolver, &prompter).with_color(false);

        let entries = vec![mr_entry(), old_entry()];
        assert_eq!(updater.update_all(entries.clone()).await, entries);
    }

    impl Fixture {
        fn with_scopus_title(self) -> Self {
            let scopus = Arc::new(MockSource::new("scopus", "Scopus").with_title(TITLE, "10.1000/new"));
            Self { scopus, ..self }
        }
    }
}
