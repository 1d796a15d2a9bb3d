//! LaTeX / Unicode text codec.
//!
//! [`to_plain_text`] turns LaTeX markup into Unicode text, [`to_latex`] goes the
//! other way. Both directions are driven by the same tables so that
//! `to_plain_text(to_latex(s)) == s` for every character either table knows.

use std::collections::HashMap;
use std::sync::LazyLock;

/// Which characters [`to_latex`] escapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EscapeMode {
    /// Only non-ASCII characters; existing LaTeX commands pass through untouched
    #[default]
    NonAsciiOnly,
    /// Non-ASCII characters and the text specials `& % # _` outside `$...$`
    /// math; braces, backslash sequences and math pass through
    Text,
    /// Non-ASCII characters and the ASCII specials `& % $ # _ { } ~ ^ \`
    All,
}

const NBSP: char = '\u{00a0}';

/// Accents written with a punctuation command (`\'e`)
const SYMBOL_ACCENTS: &str = "'`^\"~=.";

/// Accents written with a one-letter command (`\v{s}`)
const LETTER_ACCENTS: &str = "uvHckrdb";

/// (accent, base letter, composed character)
const ACCENTED: &[(char, char, char)] = &[
    ('\'', 'a', 'á'), ('\'', 'e', 'é'), ('\'', 'i', 'í'), ('\'', 'o', 'ó'),
    ('\'', 'u', 'ú'), ('\'', 'y', 'ý'), ('\'', 'A', 'Á'), ('\'', 'E', 'É'),
    ('\'', 'I', 'Í'), ('\'', 'O', 'Ó'), ('\'', 'U', 'Ú'), ('\'', 'Y', 'Ý'),
    ('\'', 'c', 'ć'), ('\'', 'C', 'Ć'), ('\'', 'n', 'ń'), ('\'', 'N', 'Ń'),
    ('\'', 's', 'ś'), ('\'', 'S', 'Ś'), ('\'', 'z', 'ź'), ('\'', 'Z', 'Ź'),
    ('\'', 'l', 'ĺ'), ('\'', 'L', 'Ĺ'), ('\'', 'r', 'ŕ'), ('\'', 'R', 'Ŕ'),
    ('`', 'a', 'à'), ('`', 'e', 'è'), ('`', 'i', 'ì'), ('`', 'o', 'ò'),
    ('`', 'u', 'ù'), ('`', 'A', 'À'), ('`', 'E', 'È'), ('`', 'I', 'Ì'),
    ('`', 'O', 'Ò'), ('`', 'U', 'Ù'),
    ('^', 'a', 'â'), ('^', 'e', 'ê'), ('^', 'i', 'î'), ('^', 'o', 'ô'),
    ('^', 'u', 'û'), ('^', 'A', 'Â'), ('^', 'E', 'Ê'), ('^', 'I', 'Î'),
    ('^', 'O', 'Ô'), ('^', 'U', 'Û'), ('^', 'c', 'ĉ'), ('^', 'C', 'Ĉ'),
    ('^', 'g', 'ĝ'), ('^', 'G', 'Ĝ'), ('^', 's', 'ŝ'), ('^', 'S', 'Ŝ'),
    ('^', 'w', 'ŵ'), ('^', 'y', 'ŷ'),
    ('"', 'a', 'ä'), ('"', 'e', 'ë'), ('"', 'i', 'ï'), ('"', 'o', 'ö'),
    ('"', 'u', 'ü'), ('"', 'y', 'ÿ'), ('"', 'A', 'Ä'), ('"', 'E', 'Ë'),
    ('"', 'I', 'Ï'), ('"', 'O', 'Ö'), ('"', 'U', 'Ü'), ('"', 'Y', 'Ÿ'),
    ('~', 'a', 'ã'), ('~', 'n', 'ñ'), ('~', 'o', 'õ'), ('~', 'A', 'Ã'),
    ('~', 'N', 'Ñ'), ('~', 'O', 'Õ'), ('~', 'i', 'ĩ'), ('~', 'u', 'ũ'),
    ('=', 'a', 'ā'), ('=', 'e', 'ē'), ('=', 'i', 'ī'), ('=', 'o', 'ō'),
    ('=', 'u', 'ū'), ('=', 'A', 'Ā'), ('=', 'E', 'Ē'), ('=', 'I', 'Ī'),
    ('=', 'O', 'Ō'), ('=', 'U', 'Ū'),
    ('.', 'z', 'ż'), ('.', 'Z', 'Ż'), ('.', 'e', 'ė'), ('.', 'E', 'Ė'),
    ('.', 'g', 'ġ'), ('.', 'I', 'İ'),
    ('u', 'a', 'ă'), ('u', 'A', 'Ă'), ('u', 'g', 'ğ'), ('u', 'G', 'Ğ'),
    ('u', 'u', 'ŭ'),
    ('v', 'c', 'č'), ('v', 'C', 'Č'), ('v', 's', 'š'), ('v', 'S', 'Š'),
    ('v', 'z', 'ž'), ('v', 'Z', 'Ž'), ('v', 'r', 'ř'), ('v', 'R', 'Ř'),
    ('v', 'e', 'ě'), ('v', 'E', 'Ě'), ('v', 'n', 'ň'), ('v', 'N', 'Ň'),
    ('v', 'd', 'ď'), ('v', 'D', 'Ď'), ('v', 't', 'ť'), ('v', 'T', 'Ť'),
    ('H', 'o', 'ő'), ('H', 'O', 'Ő'), ('H', 'u', 'ű'), ('H', 'U', 'Ű'),
    ('c', 'c', 'ç'), ('c', 'C', 'Ç'), ('c', 's', 'ş'), ('c', 'S', 'Ş'),
    ('c', 't', 'ţ'), ('c', 'T', 'Ţ'),
    ('k', 'a', 'ą'), ('k', 'A', 'Ą'), ('k', 'e', 'ę'), ('k', 'E', 'Ę'),
    ('r', 'a', 'å'), ('r', 'A', 'Å'), ('r', 'u', 'ů'), ('r', 'U', 'Ů'),
];

/// Control words that stand for a single text character
const TEXT_SYMBOLS: &[(&str, char)] = &[
    ("ss", 'ß'), ("ae", 'æ'), ("AE", 'Æ'), ("o", 'ø'), ("O", 'Ø'),
    ("oe", 'œ'), ("OE", 'Œ'), ("l", 'ł'), ("L", 'Ł'), ("i", 'ı'),
    ("j", 'ȷ'), ("dj", 'đ'), ("DJ", 'Đ'), ("th", 'þ'), ("TH", 'Þ'),
    ("textendash", '–'), ("textemdash", '—'), ("ldots", '…'),
    ("textquoteleft", '‘'), ("textquoteright", '’'),
    ("textquotedblleft", '“'), ("textquotedblright", '”'),
    ("guillemotleft", '«'), ("guillemotright", '»'),
    ("texteuro", '€'), ("pounds", '£'), ("S", '§'), ("P", '¶'),
    ("textdegree", '°'), ("copyright", '©'), ("textregistered", '®'),
    ("textasciitilde", '~'), ("textasciicircum", '^'), ("textbackslash", '\\'),
];

/// Decoding-only aliases
const TEXT_ALIASES: &[(&str, char)] = &[("aa", 'å'), ("AA", 'Å'), ("dots", '…')];

/// Symbols that only exist in math mode, written as `\ensuremath{\alpha}`
const MATH_SYMBOLS: &[(&str, char)] = &[
    ("alpha", 'α'), ("beta", 'β'), ("gamma", 'γ'), ("delta", 'δ'),
    ("epsilon", 'ϵ'), ("varepsilon", 'ε'), ("zeta", 'ζ'), ("eta", 'η'),
    ("theta", 'θ'), ("iota", 'ι'), ("kappa", 'κ'), ("lambda", 'λ'),
    ("mu", 'μ'), ("nu", 'ν'), ("xi", 'ξ'), ("pi", 'π'), ("rho", 'ρ'),
    ("sigma", 'σ'), ("tau", 'τ'), ("upsilon", 'υ'), ("phi", 'ϕ'),
    ("varphi", 'φ'), ("chi", 'χ'), ("psi", 'ψ'), ("omega", 'ω'),
    ("Gamma", 'Γ'), ("Delta", 'Δ'), ("Theta", 'Θ'), ("Lambda", 'Λ'),
    ("Xi", 'Ξ'), ("Pi", 'Π'), ("Sigma", 'Σ'), ("Phi", 'Φ'), ("Psi", 'Ψ'),
    ("Omega", 'Ω'), ("pm", '±'), ("times", '×'), ("infty", '∞'),
    ("leq", '≤'), ("geq", '≥'), ("neq", '≠'), ("approx", '≈'),
    ("cdot", '·'), ("to", '→'), ("partial", '∂'), ("nabla", '∇'),
];

/// Escapable ASCII specials (`\&` and friends)
const ESCAPED_SPECIALS: &str = "&%$#_{}";

struct Tables {
    compose: HashMap<(char, char), char>,
    decompose: HashMap<char, (char, char)>,
    words: HashMap<&'static str, char>,
    text_words: HashMap<char, &'static str>,
    math_words: HashMap<&'static str, char>,
    math_chars: HashMap<char, &'static str>,
}

static TABLES: LazyLock<Tables> = LazyLock::new(|| Tables {
    compose: ACCENTED.iter().map(|&(a, b, c)| ((a, b), c)).collect(),
    decompose: ACCENTED.iter().map(|&(a, b, c)| (c, (a, b))).collect(),
    words: TEXT_SYMBOLS
        .iter()
        .chain(TEXT_ALIASES)
        .map(|&(w, c)| (w, c))
        .collect(),
    text_words: TEXT_SYMBOLS.iter().map(|&(w, c)| (c, w)).collect(),
    math_words: MATH_SYMBOLS.iter().map(|&(w, c)| (w, c)).collect(),
    math_chars: MATH_SYMBOLS.iter().map(|&(w, c)| (c, w)).collect(),
});

/// Convert LaTeX markup to plain Unicode text.
///
/// Accent and symbol commands are decoded, formatting commands are dropped
/// while their arguments are kept, grouping braces are removed and `$...$`
/// math is copied verbatim.
pub fn to_plain_text(latex: &str) -> String {
    let chars: Vec<char> = latex.chars().collect();
    let mut out = String::with_capacity(latex.len());
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '$' => {
                let end = find_math_end(&chars, i);
                out.extend(&chars[i..end]);
                i = end;
            }
            '{' | '}' => i += 1,
            '~' => {
                out.push(NBSP);
                i += 1;
            }
            '\\' => i = decode_command(&chars, i + 1, &mut out),
            c => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

/// Convert plain Unicode text to LaTeX.
///
/// Characters without a known LaTeX spelling are kept as they are.
pub fn to_latex(text: &str, mode: EscapeMode) -> String {
    let tables = &*TABLES;
    let mut out = String::with_capacity(text.len());
    let mut in_math = false;
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        if c.is_ascii() {
            match mode {
                EscapeMode::NonAsciiOnly => out.push(c),
                EscapeMode::All => push_escaped_ascii(c, &mut out),
                EscapeMode::Text => match c {
                    '\\' => {
                        out.push(c);
                        if let Some(next) = chars.next() {
                            out.push(next);
                        }
                    }
                    '$' => {
                        in_math = !in_math;
                        out.push(c);
                    }
                    '&' | '%' | '#' | '_' if !in_math => {
                        out.push('\\');
                        out.push(c);
                    }
                    c => out.push(c),
                },
            }
            continue;
        }

        if c == NBSP {
            out.push('~');
        } else if let Some(&(accent, base)) = tables.decompose.get(&c) {
            if SYMBOL_ACCENTS.contains(accent) {
                out.push_str(&format!("{{\\{}{}}}", accent, base));
            } else {
                out.push_str(&format!("{{\\{}{{{}}}}}", accent, base));
            }
        } else if let Some(word) = tables.text_words.get(&c) {
            out.push_str(&format!("{{\\{}}}", word));
        } else if let Some(word) = tables.math_chars.get(&c) {
            out.push_str(&format!("\\ensuremath{{\\{}}}", word));
        } else {
            out.push(c);
        }
    }

    out
}

fn push_escaped_ascii(c: char, out: &mut String) {
    match c {
        '~' => out.push_str("{\\textasciitilde}"),
        '^' => out.push_str("{\\textasciicircum}"),
        '\\' => out.push_str("{\\textbackslash}"),
        c if ESCAPED_SPECIALS.contains(c) => {
            out.push('\\');
            out.push(c);
        }
        c => out.push(c),
    }
}

/// Index just past the math segment opened at `start`
fn find_math_end(chars: &[char], start: usize) -> usize {
    let mut j = start + 1;
    while j < chars.len() {
        match chars[j] {
            '\\' => j += 2,
            '$' => return j + 1,
            _ => j += 1,
        }
    }
    chars.len()
}

/// Index just past the brace group opened at `start`, plus its inner text
fn read_group(chars: &[char], start: usize) -> (usize, String) {
    let mut depth = 0usize;
    let mut j = start;
    while j < chars.len() {
        match chars[j] {
            '\\' => j += 1,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return (j + 1, chars[start + 1..j].iter().collect());
                }
            }
            _ => {}
        }
        j += 1;
    }
    (chars.len(), chars[(start + 1).min(chars.len())..].iter().collect())
}

fn skip_spaces(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() && chars[i] == ' ' {
        i += 1;
    }
    i
}

/// Decode the command whose name starts at `i` (just past the backslash).
fn decode_command(chars: &[char], i: usize, out: &mut String) -> usize {
    let tables = &*TABLES;
    let Some(&first) = chars.get(i) else {
        return i;
    };

    if !first.is_ascii_alphabetic() {
        return match first {
            c if SYMBOL_ACCENTS.contains(c) => decode_accent(chars, i + 1, c, out),
            c if ESCAPED_SPECIALS.contains(c) => {
                out.push(c);
                i + 1
            }
            '\\' | ' ' | ',' => {
                out.push(' ');
                i + 1
            }
            '-' | '/' => i + 1,
            c => {
                out.push(c);
                i + 1
            }
        };
    }

    let mut end = i;
    while end < chars.len() && chars[end].is_ascii_alphabetic() {
        end += 1;
    }
    let name: String = chars[i..end].iter().collect();

    if name.len() == 1 && LETTER_ACCENTS.contains(name.as_str()) {
        let accent = first;
        return decode_accent(chars, skip_spaces(chars, end), accent, out);
    }

    if let Some(&c) = tables.words.get(name.as_str()) {
        out.push(c);
        return skip_empty_group(chars, skip_spaces(chars, end));
    }

    if name == "ensuremath" {
        let start = skip_spaces(chars, end);
        if chars.get(start) == Some(&'{') {
            let (next, inner) = read_group(chars, start);
            let symbol = inner.trim().strip_prefix('\\').unwrap_or(inner.trim());
            match tables.math_words.get(symbol) {
                Some(&c) => out.push(c),
                None => out.push_str(&to_plain_text(&inner)),
            }
            return next;
        }
        return start;
    }

    // Formatting commands (\emph, \textit, ...) vanish; their arguments stay.
    end
}

/// `\ss{}` style empty groups after a symbol word are consumed with it
fn skip_empty_group(chars: &[char], i: usize) -> usize {
    if chars.get(i) == Some(&'{') && chars.get(i + 1) == Some(&'}') {
        i + 2
    } else {
        i
    }
}

/// Decode an accent whose argument starts at `i`.
fn decode_accent(chars: &[char], i: usize, accent: char, out: &mut String) -> usize {
    let (next, argument) = match chars.get(i) {
        None => (i, String::new()),
        Some('{') => {
            let (next, inner) = read_group(chars, i);
            (next, to_plain_text(&inner))
        }
        Some('\\') => {
            let mut decoded = String::new();
            let next = decode_command(chars, i + 1, &mut decoded);
            (next, decoded)
        }
        Some(&c) => (i + 1, c.to_string()),
    };

    let mut rest = argument.chars();
    match rest.next() {
        Some(base) => {
            let base = match base {
                'ı' => 'i',
                'ȷ' => 'j',
                other => other,
            };
            match TABLES.compose.get(&(accent, base)) {
                Some(&composed) => out.push(composed),
                None => out.push(base),
            }
            out.extend(rest);
        }
        None => {
            // A bare accent with nothing to sit on (`\~{}`) prints itself.
            out.push(accent);
        }
    }
    next
}
