//! Text cleaning: normalise raw page text before it is embedded in the
//! final document.
//!
//! Text pulled out of a PDF text layer carries layout debris: form feeds,
//! page markers, running headers, watermark words, citation brackets,
//! typographic punctuation and pictographs. The cleaner applies six ordered
//! stages; each one assumes the previous stages already ran.
//!
//! ## Stage Order
//!
//! 1. Strip PDF artifacts (line-anchored patterns need the original newlines)
//! 2. Normalise whitespace (after this the text is a single line)
//! 3. Strip emoji and pictographs
//! 4. Strip citation markers and asterisk footnotes
//! 5. Normalise typographic punctuation
//! 6. Final pass: re-space, collapse special-character runs, drop symbols
//!
//! One pass over all six stages is not idempotent: deleting a symbol in
//! stage 6 can join fragments that an earlier stage would have removed
//! (`DR@AFT` becomes `DRAFT`). [`TextCleaner::clean`] therefore repeats the
//! pass until the text stops changing, which makes
//! `clean(clean(x)) == clean(x)` hold for every input. After the first pass
//! every later pass only deletes characters, so the loop terminates within
//! one pass per character of the first pass's output. An explicit pass cap
//! ([`TextCleaner::with_max_passes`]) surfaces as [`CleanError::NoFixpoint`].

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Cleaning did not converge.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CleanError {
    #[error("text did not reach a fixpoint after {passes} cleaning passes")]
    NoFixpoint { passes: usize },
}

/// Stateless cleaning pipeline.
///
/// The default cleaner runs until the text stops changing. A cleaner built
/// with [`TextCleaner::with_max_passes`] gives up after that many passes.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCleaner {
    max_passes: Option<usize>,
}

impl TextCleaner {
    pub fn with_max_passes(max_passes: usize) -> Self {
        Self {
            max_passes: Some(max_passes.max(1)),
        }
    }

    /// Clean `input` to its fixpoint.
    pub fn clean(&self, input: &str) -> Result<String, CleanError> {
        let mut current = clean_pass(input);
        // Every pass after the first removes at least one character or stops.
        let limit = self.max_passes.unwrap_or_else(|| current.chars().count() + 2);
        for _ in 1..limit {
            let next = clean_pass(&current);
            if next == current {
                return Ok(current);
            }
            current = next;
        }
        Err(CleanError::NoFixpoint { passes: limit })
    }
}

/// Clean with the default, unbounded cleaner.
pub fn clean_text(input: &str) -> Result<String, CleanError> {
    TextCleaner::default().clean(input)
}

/// One run of all six stages, in order.
pub fn clean_pass(input: &str) -> String {
    if input.is_empty() {
        return String::new();
    }
    let s = remove_pdf_artifacts(input);
    let s = normalise_whitespace(&s);
    let s = remove_emoji(&s);
    let s = remove_citations(&s);
    let s = normalise_punctuation(&s);
    final_cleanup(&s)
}

// ── Stage 1: PDF artifacts ───────────────────────────────────────────────────

static RE_PAGE_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)Page\s*\d+").unwrap());
static RE_BULLET_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*[\x{2022}\-\x{2013}\x{2014}]+\s*$").unwrap());
static RE_WATERMARK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)CONFIDENTIAL|DRAFT|WATERMARK").unwrap());
static RE_N_OF_M: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\d+\s+of\s+\d+").unwrap());
static RE_RUNNING_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*[A-Za-z\s]+\|\s*\d+\s*$").unwrap());

fn remove_pdf_artifacts(input: &str) -> String {
    let s = input.replace('\u{000C}', "");
    let s = RE_PAGE_MARKER.replace_all(&s, "");
    let s = RE_BULLET_LINE.replace_all(&s, "");
    let s = RE_WATERMARK.replace_all(&s, "");
    let s = RE_N_OF_M.replace_all(&s, "");
    RE_RUNNING_HEADER.replace_all(&s, "").into_owned()
}

// ── Stage 2: Whitespace ──────────────────────────────────────────────────────

static RE_NEWLINE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n+").unwrap());
static RE_WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// A lone newline joins wrapped lines; a run keeps a paragraph break. The
/// final collapse then folds every run, breaks included, into one space.
fn normalise_whitespace(input: &str) -> String {
    let s = RE_NEWLINE_RUN.replace_all(input, |caps: &regex::Captures<'_>| {
        if caps[0].len() == 1 {
            " "
        } else {
            "\n\n"
        }
    });
    RE_WHITESPACE_RUN.replace_all(&s, " ").into_owned()
}

// ── Stage 3: Emoji ───────────────────────────────────────────────────────────

static RE_EMOJI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"[\p{Extended_Pictographic}\p{Emoji_Modifier}\x{1F1E6}-\x{1F1FF}\x{FE0E}\x{FE0F}\x{200D}\x{20E3}]",
    )
    .unwrap()
});

fn remove_emoji(input: &str) -> String {
    RE_EMOJI.replace_all(input, "").into_owned()
}

// ── Stage 4: Citations and footnotes ─────────────────────────────────────────

static RE_BRACKET_CITATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\d+\]").unwrap());
static RE_PAREN_CITATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(\d+\)").unwrap());
static RE_AUTHOR_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\([A-Za-z]+ et al\., \d{4}\)").unwrap());
// Stage 2 already removed newlines, so a footnote runs to the end of the text.
static RE_FOOTNOTE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*[^\n]*\n?").unwrap());

fn remove_citations(input: &str) -> String {
    let s = RE_BRACKET_CITATION.replace_all(input, "");
    let s = RE_PAREN_CITATION.replace_all(&s, "");
    let s = RE_AUTHOR_YEAR.replace_all(&s, "");
    RE_FOOTNOTE.replace_all(&s, "").into_owned()
}

// ── Stage 5: Punctuation ─────────────────────────────────────────────────────

const PUNCTUATION: [(char, &str); 7] = [
    ('\u{2013}', "-"),
    ('\u{2014}', "-"),
    ('\u{2026}', "..."),
    ('\u{2039}', "<"),
    ('\u{203A}', ">"),
    ('\u{00AB}', "<<"),
    ('\u{00BB}', ">>"),
];

fn normalise_punctuation(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match PUNCTUATION.iter().find(|(from, _)| *from == ch) {
            Some((_, to)) => out.push_str(to),
            None => out.push(ch),
        }
    }
    out
}

// ── Stage 6: Final cleanup ───────────────────────────────────────────────────

const REPEATABLE: &str = ".\\/&*+=#@$%^(){}[]|:;<>?~`\"";

static RE_DISALLOWED: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s.,!?-]").unwrap());

fn final_cleanup(input: &str) -> String {
    let s = input.split_whitespace().collect::<Vec<_>>().join(" ");
    let s = collapse_special_runs(&s);
    RE_DISALLOWED.replace_all(&s, "").trim().to_string()
}

/// Collapse any run of 3+ identical characters from [`REPEATABLE`] to 2.
fn collapse_special_runs(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut run_char: Option<char> = None;
    let mut run_len = 0usize;
    for ch in input.chars() {
        if Some(ch) == run_char {
            run_len += 1;
        } else {
            run_char = Some(ch);
            run_len = 1;
        }
        if run_len <= 2 || !REPEATABLE.contains(ch) {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean(s: &str) -> String {
        clean_text(s).expect("cleaning converges")
    }

    #[test]
    fn ellipsis_run_collapses_to_two() {
        assert_eq!(clean("Hello...World"), "Hello..World");
        assert_eq!(clean("Wait....."), "Wait..");
    }

    #[test]
    fn unicode_ellipsis_becomes_two_dots() {
        assert_eq!(clean("Hello\u{2026}World"), "Hello..World");
    }

    #[test]
    fn page_markers_and_watermarks_removed() {
        let out = clean("Intro text\nPage 3\nCONFIDENTIAL body 2 of 10 end");
        assert!(!out.to_lowercase().contains("page"), "got: {out}");
        assert!(!out.contains("CONFIDENTIAL"), "got: {out}");
        assert!(!out.contains("2 of 10"), "got: {out}");
        assert!(out.contains("Intro text"));
        assert!(out.contains("end"));
    }

    #[test]
    fn form_feed_removed() {
        assert_eq!(clean("one\u{000C}two"), "onetwo");
    }

    #[test]
    fn bullet_only_lines_removed() {
        let out = clean("first\n\u{2022}\nsecond\n --- \nthird");
        assert_eq!(out, "first second third");
    }

    #[test]
    fn running_header_line_removed() {
        let out = clean("Annual Report | 12\nRevenue grew.");
        assert_eq!(out, "Revenue grew.");
    }

    #[test]
    fn newlines_become_single_spaces() {
        assert_eq!(clean("wrapped\nline\n\n\nnext para"), "wrapped line next para");
    }

    #[test]
    fn emoji_stripped() {
        assert_eq!(clean("Launch \u{1F680} day \u{1F44D}\u{1F3FD}!"), "Launch day !");
        assert_eq!(clean("flag \u{1F1EB}\u{1F1F7} here"), "flag here");
    }

    #[test]
    fn citations_stripped() {
        let out = clean("As shown [12] and (3) by (Smith et al., 2020) results hold.");
        assert_eq!(out, "As shown and by results hold.");
    }

    #[test]
    fn asterisk_footnote_runs_to_end() {
        assert_eq!(clean("Body text. * footnote here"), "Body text.");
    }

    #[test]
    fn typographic_punctuation_normalised() {
        assert_eq!(clean("a\u{2013}b\u{2014}c"), "a-b-c");
        // Guillemets map to angle brackets, which stage 6 then drops.
        assert_eq!(clean("\u{00AB}quoted\u{00BB}"), "quoted");
    }

    #[test]
    fn disallowed_symbols_dropped() {
        assert_eq!(clean("cost: $5 & tax #1"), "cost 5 tax 1");
    }

    #[test]
    fn identical_runs_only() {
        assert_eq!(collapse_special_runs("a!!!b"), "a!!!b");
        assert_eq!(collapse_special_runs("a???b"), "a??b");
        assert_eq!(collapse_special_runs("a.?.b"), "a.?.b");
    }

    #[test]
    fn empty_input_is_empty() {
        assert_eq!(clean(""), "");
        assert_eq!(clean("   \n\t "), "");
    }

    #[test]
    fn idempotent_on_varied_inputs() {
        let inputs = [
            "Hello...World",
            "DR@AFT survives one pass",
            "Pa$ge 4 hides behind a symbol",
            "CONFIDCONFIDENTIALENTIAL",
            "x  \n\n  y\u{000C}z [1] (2) \u{2026}\u{2026}",
            "Quarterly | 3\n\u{2014}\nText \u{1F600} with (Lee et al., 1999) refs",
            "....////&&&&&",
            "Ünïcödé wörds stay, naïve café!",
            "1 of 2 of 3 of 4",
        ];
        for x in inputs {
            let once = clean(x);
            let twice = clean(&once);
            assert_eq!(once, twice, "not idempotent for {x:?}");
        }
    }

    #[test]
    fn nested_watermark_needs_multiple_passes() {
        assert_eq!(clean_pass("DR@AFT ok"), "DRAFT ok");
        assert_eq!(clean("DR@AFT ok"), "ok");
    }

    #[test]
    fn pass_cap_reports_no_fixpoint() {
        let cleaner = TextCleaner::with_max_passes(1);
        assert_eq!(
            cleaner.clean("DR@AFT ok"),
            Err(CleanError::NoFixpoint { passes: 1 })
        );
    }

    #[test]
    fn deep_nesting_still_reaches_a_fixpoint() {
        let watermark = format!("keep {}{}", "DR".repeat(20), "AFT".repeat(20));
        assert_eq!(clean_text(&watermark), Ok("keep".to_string()));

        let mut marker = String::from("Page 1");
        for _ in 0..20 {
            marker = format!("Pa{marker}ge 1");
        }
        let text = format!("intro {marker} outro");
        let once = clean_text(&text).unwrap();
        assert_eq!(once, "intro outro");
        assert_eq!(clean_text(&once).unwrap(), once);
    }

    #[test]
    fn unicode_word_characters_preserved() {
        assert_eq!(clean("naïve café"), "naïve café");
    }
}
