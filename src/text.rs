//! Text reflow and cleanup primitives shared by the renderer and the
//! docstring assembly pass.

use crate::Terms;
use regex::Regex;
use std::sync::LazyLock;

/// Character/typography fixes applied to every assembled docstring.
pub const CLEANUP: &[(&str, &str)] = &[
    (",, ", ", "),
    (", , ", ", "),
    (",. ", ". "),
    (" , ", ", "),
    (", )", ")"),
    (",)", ")"),
    // Percentage signs adjacent to literal markup break rendering.
    ("% ``", "``"),
    ("`` %", "``"),
    ("\u{a0}", " "),
    ("\u{2019}", "``"),
    ("\u{2217}", "*"),
    ("\u{2212}", "-"),
    ("\u{2013}", "-"),
    ("\u{2026}", "..."),
];

/// Vendor markup artifacts stripped from docstrings and link tails.
pub const XML_CLEANUP: &[(&str, &str)] = &[
    ("Dtl?", ""),
    ("Caret?", ""),
    ("Caret1?", ""),
    ("Caret 40?", ""),
    ("``\"``", "``"),
    ("/_nolinebreak?", ""),
    ("_nolinebreak?", ""),
    ("nbsp", " "),
];

static RE_ENTITY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"&([^\s&;-]+);").unwrap());

static RE_SPACE_BEFORE_PERIOD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\S)[ \t]+\.").unwrap());

static RE_SPACE_BEFORE_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\S)[ \t]+,").unwrap());

// ``*DIM`` style command tokens: a literal star before an upper-case run.
static RE_STAR_COMMAND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([^*`\\])\*([A-Z]+)([`,.\s])").unwrap());

// fac1*fac2 style products inside prose.
static RE_STAR_FUNCTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([^*\s\\`]+)\*([^*\s]+)").unwrap());

// ***DIM** — a bold command token keeping its leading star.
static RE_BOLD_COMMAND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([^*])\*\*\*([^*\n]*?)\*\*([^*])").unwrap());

static RE_CODE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*\.\. code:: \S+\n(?:\n| +.*\n?)+").unwrap());

/// Collapse runs of whitespace (including newlines) into single spaces.
/// Idempotent.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize an anchor id for cross-referencing. Idempotent.
pub fn normalize_anchor(id: &str) -> String {
    id.replace('.', "_")
}

/// Apply a literal replacement table.
pub fn apply_cleanup(text: &str, table: &[(&str, &str)]) -> String {
    let mut out = text.to_string();
    for (from, to) in table {
        out = out.replace(from, to);
    }
    out
}

/// Prefix every non-empty line with `prefix`.
pub fn indent_lines(text: &str, prefix: &str) -> String {
    text.lines()
        .map(|line| {
            if line.trim().is_empty() {
                line.to_string()
            } else {
                format!("{prefix}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Greedy word wrap of a single paragraph. Long words are never broken.
fn fill_paragraph(text: &str, width: usize, initial: &str, subsequent: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut current = initial.to_string();
    let mut has_word = false;

    for word in text.split_whitespace() {
        if has_word && current.len() + 1 + word.len() > width {
            lines.push(current);
            current = subsequent.to_string();
            has_word = false;
        }
        if has_word {
            current.push(' ');
        }
        current.push_str(word);
        has_word = true;
    }
    lines.push(current);
    lines.join("\n")
}

/// Reflow text to `width`, respecting paragraph breaks (`\n\n`) and keeping
/// `initial`/`subsequent` as the indents of the first and following lines.
/// Triple newlines collapse to double and stray whitespace before periods
/// and commas is removed first.
pub fn resize_length(text: &str, width: usize, initial: &str, subsequent: &str) -> String {
    let mut text = text.to_string();
    while text.contains("\n\n\n") {
        text = text.replace("\n\n\n", "\n\n");
    }
    let text = punctuation_whitespace(&text);

    text.split("\n\n")
        .map(|para| fill_paragraph(para, width, initial, subsequent))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Same as [`resize_length`] but split into lines.
pub fn resize_lines(text: &str, width: usize, initial: &str, subsequent: &str) -> Vec<String> {
    resize_length(text, width, initial, subsequent)
        .lines()
        .map(str::to_string)
        .collect()
}

/// Remove whitespace preceding periods and commas.
pub fn punctuation_whitespace(text: &str) -> String {
    let text = RE_SPACE_BEFORE_PERIOD.replace_all(text, "$1.");
    RE_SPACE_BEFORE_COMMA.replace_all(&text, "$1,").to_string()
}

/// Substitute `&entity;` references against the terms table, repeating until
/// a fixed point (entities may expand to text containing further entities).
/// Unknown entities are left in place.
pub fn replace_terms(text: &str, terms: &Terms) -> String {
    let mut current = text.to_string();
    loop {
        let mut replaced_any = false;
        let next = RE_ENTITY
            .replace_all(&current, |caps: &regex::Captures| {
                let name = &caps[1];
                match terms.get(name).and_then(|v| v.as_text()) {
                    Some(value) => {
                        replaced_any = true;
                        value.to_string()
                    }
                    None => caps[0].to_string(),
                }
            })
            .to_string();
        if !replaced_any || next == current {
            return next;
        }
        current = next;
    }
}

fn escape_asterisks_in_prose(text: &str) -> String {
    let text = RE_STAR_COMMAND.replace_all(text, "$1\\*$2$3");
    let text = RE_STAR_FUNCTION.replace_all(&text, "$1\\*$2");
    RE_BOLD_COMMAND
        .replace_all(&text, "$1**\\*$2**$3")
        .to_string()
}

/// Escape bare asterisks so they do not open RST emphasis, leaving code
/// blocks untouched.
pub fn escape_asterisks(text: &str) -> String {
    if !text.contains(".. code::") {
        return escape_asterisks_in_prose(text);
    }

    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for mat in RE_CODE_BLOCK.find_iter(text) {
        out.push_str(&escape_asterisks_in_prose(&text[last..mat.start()]));
        out.push_str(mat.as_str());
        last = mat.end();
    }
    out.push_str(&escape_asterisks_in_prose(&text[last..]));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TermValue;

    #[test]
    fn collapse_is_idempotent() {
        let raw = "  a\t\tb\n\n c  ";
        let once = collapse_whitespace(raw);
        assert_eq!(once, "a b c");
        assert_eq!(collapse_whitespace(&once), once);
    }

    #[test]
    fn anchor_normalization_is_idempotent() {
        let once = normalize_anchor("ds.Support.Types");
        assert_eq!(once, "ds_Support_Types");
        assert_eq!(normalize_anchor(&once), once);
    }

    #[test]
    fn fill_respects_indents() {
        let out = fill_paragraph("one two three four", 12, "", "  ");
        assert_eq!(out, "one two\n  three four");
    }

    #[test]
    fn fill_never_breaks_long_words() {
        let out = fill_paragraph("supercalifragilistic", 5, "", "");
        assert_eq!(out, "supercalifragilistic");
    }

    #[test]
    fn resize_collapses_triple_newlines() {
        let out = resize_length("a\n\n\nb", 80, "", "");
        assert_eq!(out, "a\n\nb");
    }

    #[test]
    fn punctuation_space_removed() {
        assert_eq!(punctuation_whitespace("end of line ."), "end of line.");
        assert_eq!(punctuation_whitespace("a , b"), "a, b");
    }

    #[test]
    fn terms_resolve_to_fixed_point() {
        let mut terms = Terms::new();
        terms.insert("a".into(), TermValue::Text("x &b; y".into()));
        terms.insert("b".into(), TermValue::Text("z".into()));
        assert_eq!(replace_terms("see &a;", &terms), "see x z y");
    }

    #[test]
    fn unknown_terms_survive() {
        let terms = Terms::new();
        assert_eq!(replace_terms("keep &missing;", &terms), "keep &missing;");
    }

    #[test]
    fn star_command_escaped() {
        assert_eq!(escape_asterisks(" *DIM "), " \\*DIM ");
    }

    #[test]
    fn code_blocks_left_alone() {
        let text = "prose *DIM here\n\n.. code:: apdl\n\n   *DIM,X\n";
        let out = escape_asterisks(text);
        assert!(out.contains("\\*DIM here"));
        assert!(out.contains("   *DIM,X"));
    }
}
