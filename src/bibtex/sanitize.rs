//! Entry normalization applied before an entry is handed to the caller.
//!
//! Free-text fields lose raw newlines and tabs, embedded LaTeX is decoded and
//! non-ASCII characters and the text specials `& % # _` are re-encoded as
//! LaTeX escapes. Titles additionally
//! get brace protection on every word starting with a capital letter so
//! BibTeX styles do not lowercase proper nouns.

use regex::{Captures, Regex};
use std::sync::LazyLock;

use super::latex::{to_latex, to_plain_text, EscapeMode};
use crate::models::{BibEntry, Person};

/// Fields rendered with capital protection
const TITLE_FIELDS: &[&str] = &["title", "booktitle"];

/// Free-text fields that are sanitized without capital protection
const TEXT_FIELDS: &[&str] = &["journal", "publisher"];

/// From an uppercase letter up to the next word boundary, one word at a time
static CAPITALIZED_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z].*?)\b").expect("valid capital run pattern"));

/// Sanitize every text field of an entry in place.
///
/// Idempotent: `sanitize_entry` on an already sanitized entry changes nothing.
pub fn sanitize_entry(entry: &mut BibEntry) {
    for &name in TITLE_FIELDS {
        if let Some(value) = entry.fields.get_mut(name) {
            *value = sanitize_string(value, true);
        }
    }
    for &name in TEXT_FIELDS {
        if let Some(value) = entry.fields.get_mut(name) {
            *value = sanitize_string(value, false);
        }
    }

    for person in &mut entry.authors {
        sanitize_person(person);
    }

    entry.remove_field("month");

    if let Some(url) = entry.fields.get_mut("url") {
        *url = unescape_url(url);
    }
}

/// Percent-decode until nothing changes, so nested encodings end up plain.
fn unescape_url(url: &str) -> String {
    let mut current = url.to_string();
    while let Ok(decoded) = urlencoding::decode(&current) {
        let next = decoded.into_owned();
        if next == current {
            break;
        }
        current = next;
    }
    current
}

/// Owned variant of [`sanitize_entry`]
pub fn sanitized(mut entry: BibEntry) -> BibEntry {
    sanitize_entry(&mut entry);
    entry
}

fn sanitize_person(person: &mut Person) {
    person.given = sanitize_string(&person.given, false);
    person.family = sanitize_string(&person.family, false);
}

/// Normalize one free-text value.
///
/// Strips newlines and tabs, collapses doubled backslashes, decodes LaTeX to
/// plain text and re-encodes non-ASCII characters and `& % # _` outside math.
/// With `title` set, capital letters are brace-protected.
pub fn sanitize_string(value: &str, title: bool) -> String {
    let cleaned = value
        .replace(['\n', '\t'], "")
        .replace("\\\\", "\\");
    let plain = to_plain_text(&cleaned);
    let encoded = to_latex(&plain, EscapeMode::Text);
    if title {
        protect_capitals(&encoded)
    } else {
        encoded
    }
}

/// Wrap every run starting with an uppercase letter in braces.
///
/// The run ends at the next word boundary, so `Hilbert-Space` becomes
/// `{Hilbert}-{Space}` and `McKean` becomes `{McKean}`. Math segments and
/// control words (`\AE`) are left alone.
pub fn protect_capitals(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    for (i, segment) in split_math(text).into_iter().enumerate() {
        // Odd segments are `$...$` math.
        if i % 2 == 1 {
            out.push_str(segment);
            continue;
        }
        let protected = CAPITALIZED_RUN.replace_all(segment, |caps: &Captures| {
            let whole = caps.get(0).map_or("", |m| m.as_str());
            let start = caps.get(0).map_or(0, |m| m.start());
            if segment[..start].ends_with('\\') {
                whole.to_string()
            } else {
                format!("{{{}}}", whole)
            }
        });
        out.push_str(&protected);
    }
    out
}

/// Split text into alternating plain and `$...$` segments (plain first).
fn split_math(text: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut in_math = false;
    let bytes = text.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'$' => {
                if in_math {
                    segments.push(&text[start..=i]);
                    start = i + 1;
                } else {
                    segments.push(&text[start..i]);
                    start = i;
                }
                in_math = !in_math;
                i += 1;
            }
            _ => i += 1,
        }
    }
    if start < text.len() {
        if in_math {
            // Unterminated `$`: keep the plain/math alternation intact.
            segments.push("");
        }
        segments.push(&text[start..]);
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntryType;

    #[test]
    fn test_protect_capitals_word_by_word() {
        assert_eq!(protect_capitals("Hello World"), "{Hello} {World}");
        assert_eq!(protect_capitals("on the Riemann hypothesis"), "on the {Riemann} hypothesis");
        assert_eq!(protect_capitals("Hilbert-Space"), "{Hilbert}-{Space}");
        assert_eq!(protect_capitals("lowercase only"), "lowercase only");
    }

    #[test]
    fn test_protect_capitals_skips_control_words_and_math() {
        assert_eq!(protect_capitals(r"{\AE}ther"), r"{\AE}ther");
        assert_eq!(protect_capitals(r"The $L^2$ norm"), r"{The} $L^2$ norm");
        assert_eq!(protect_capitals(r"{\'E}cole"), r"{\'{E}}cole");
    }

    #[test]
    fn test_sanitize_string_strips_whitespace_controls() {
        assert_eq!(sanitize_string("a\nb\tc", false), "abc");
        assert_eq!(sanitize_string(r"x \\& y", false), r"x \& y");
    }

    #[test]
    fn test_sanitize_string_keeps_specials_escaped() {
        assert_eq!(
            sanitize_string(r"Science \& Technology", true),
            r"{Science} \& {Technology}"
        );
        assert_eq!(sanitize_string(r"A 50\% Reduction", true), r"{A} 50\% {Reduction}");
        assert_eq!(sanitize_string("R&D #1 in_situ", false), r"R\&D \#1 in\_situ");
        assert_eq!(
            sanitize_string(r"On $\mathbb{Z}_p$ & more", false),
            r"On $\mathbb{Z}_p$ \& more"
        );
    }

    #[test]
    fn test_sanitize_string_reencodes() {
        assert_eq!(sanitize_string("Gödel", false), r#"G{\"o}del"#);
        assert_eq!(sanitize_string(r#"G\"{o}del"#, false), r#"G{\"o}del"#);
        assert_eq!(
            sanitize_string("Über die Gödelsche Zahl", true),
            r#"{\"{U}}ber die {G}{\"o}delsche {Zahl}"#
        );
    }

    #[test]
    fn test_sanitize_string_title_is_idempotent() {
        let samples = [
            "The Structure of Scientific Revolutions",
            "Über die Gödelsche Zahl",
            r"On $\mathbb{Z}_p$-Extensions of {N}umber {F}ields",
            "Æther and Øresund – a Study",
            "Šimeček's α-Stable Processes",
            "Deep Residual Learning for Image Recognition",
            r"Science \& Technology at 50\%",
            "Research & Development_2",
        ];
        for s in samples {
            let once = sanitize_string(s, true);
            assert_eq!(sanitize_string(&once, true), once, "input: {}", s);
        }
    }

    fn sample_entry() -> BibEntry {
        BibEntry::new(EntryType::Article)
            .with_key("key")
            .with_field("title", "A Study of\n Gödel Numbers")
            .with_field("journal", "Annals of Mathematics")
            .with_field("month", "jan")
            .with_field("url", "https://doi.org/10.1000%2Fabc")
            .with_authors(vec![Person::new("Kurt", "Gödel")])
    }

    #[test]
    fn test_sanitize_entry() {
        let entry = sanitized(sample_entry());
        assert_eq!(
            entry.title(),
            Some(r#"{A} {Study} of {G}{\"o}del {Numbers}"#)
        );
        assert_eq!(entry.field("journal"), Some("Annals of Mathematics"));
        assert!(!entry.has_field("month"));
        assert_eq!(entry.field("url"), Some("https://doi.org/10.1000/abc"));
        assert_eq!(entry.authors[0].family, r#"G{\"o}del"#);
    }

    #[test]
    fn test_sanitize_entry_is_idempotent() {
        let once = sanitized(sample_entry());
        let twice = sanitized(once.clone());
        assert_eq!(once, twice);

        let nested = sample_entry().with_field("url", "https://x.org/a%2541");
        let once = sanitized(nested);
        assert_eq!(once.field("url"), Some("https://x.org/aA"));
        assert_eq!(sanitized(once.clone()), once);
    }
}
