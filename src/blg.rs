//! Scanner for BibTeX and Biber log files (`.blg`).
//!
//! Extracts the citation keys the bibliography run could not find, and the
//! database files it read, so missing entries can be fetched and appended.

use regex::Regex;
use std::sync::LazyLock;

static MISSING_SINGLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"I didn't find a database entry for '([A-Za-z0-9.\-_ :/]*)'")
        .expect("valid missing-entry pattern")
});

static MISSING_DOUBLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"I didn't find a database entry for "([A-Za-z0-9.\-_ :/]*)""#)
        .expect("valid missing-entry pattern")
});

static DATABASE_PATTERNS: LazyLock<[Regex; 4]> = LazyLock::new(|| {
    [
        r"Found BibTeX data source '([A-Za-z0-9.\-_/]*)'",
        r"Looking for bibtex file '([A-Za-z0-9.\-_/]*)'",
        r"Database file #\d+: ([A-Za-z0-9.\-_/]*)\r?\n",
        r"I couldn't open database file ([A-Za-z0-9.\-_/]*)\r?\n",
    ]
    .map(|pattern| Regex::new(pattern).expect("valid database-file pattern"))
});

/// What a `.blg` file says about the bibliography run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlgReport {
    /// Citation keys without a database entry, first occurrence order
    pub missing_citations: Vec<String>,
    /// Database files named in the log, in pattern order
    pub database_files: Vec<String>,
}

impl BlgReport {
    /// The file missing entries should be appended to by default
    pub fn primary_database(&self) -> Option<&str> {
        self.database_files.first().map(String::as_str)
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !value.is_empty() && !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

/// Scan the text of a `.blg` file
pub fn scan(log: &str) -> BlgReport {
    let mut report = BlgReport::default();

    for re in [&*MISSING_SINGLE, &*MISSING_DOUBLE] {
        for caps in re.captures_iter(log) {
            push_unique(&mut report.missing_citations, &caps[1]);
        }
    }
    for re in DATABASE_PATTERNS.iter() {
        for caps in re.captures_iter(log) {
            push_unique(&mut report.database_files, &caps[1]);
        }
    }
    report
}
