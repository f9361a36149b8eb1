//! Token phrase compiler.
//!
//! Token phrases mix literal text with placeholders:
//!
//! | placeholder       | expands to                               |
//! |-------------------|------------------------------------------|
//! | `[string]`        | one or more letters                      |
//! | `[string:N]`      | exactly N letters                        |
//! | `[string:minN]`   | at least N letters                       |
//! | `[string:maxN]`   | 1..N letters                             |
//! | `[words]`         | 1..3 words                               |
//! | `[words:N]`       | exactly N words                          |
//! | `[words:minN]`    | at least N words                         |
//! | `[words:maxN]`    | 1..N words                               |
//!
//! Words are separated by whitespace. A `[words]` placeholder that directly
//! follows literal whitespace (or opens the phrase) starts with a bare word:
//! the separator was already consumed by the literal run, and requiring a
//! second one would make `best [words] plugin` miss `best seo plugin`.

use regex::Regex;
use std::sync::OnceLock;

const WORD: &str = r"\p{L}+";
const DEFAULT_MAX_WORDS: u32 = 3;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\[(string|words)(?::(min|max)?(\d+))?\]").expect("static regex"))
}

fn detector_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\[(?:string|words)(?::[^\]]+)?\]").expect("static regex"))
}

/// Does the phrase use placeholder syntax at all?
pub fn contains_tokens(phrase: &str) -> bool {
    detector_re().is_match(phrase)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
    Default,
    Exact(u32),
    Min(u32),
    Max(u32),
}

fn parse_bound(kind: Option<&str>, num: Option<&str>) -> Bound {
    let Some(n) = num.and_then(|n| n.parse::<u32>().ok()).filter(|n| *n > 0) else {
        return Bound::Default;
    };
    match kind.map(|k| k.to_ascii_lowercase()) {
        Some(k) if k == "min" => Bound::Min(n),
        Some(k) if k == "max" => Bound::Max(n),
        _ => Bound::Exact(n),
    }
}

fn string_fragment(bound: Bound) -> String {
    let quant = match bound {
        Bound::Default => "+".to_string(),
        Bound::Exact(n) => format!("{{{}}}", n),
        Bound::Min(n) => format!("{{{},}}", n),
        Bound::Max(n) => format!("{{1,{}}}", n),
    };
    format!(r"(?:\p{{L}}{})", quant)
}

/// `(min, max)` word counts; `None` max means unbounded.
fn word_range(bound: Bound) -> (u32, Option<u32>) {
    match bound {
        Bound::Default => (1, Some(DEFAULT_MAX_WORDS)),
        Bound::Exact(n) => (n, Some(n)),
        Bound::Min(n) => (n, None),
        Bound::Max(n) => (1, Some(n)),
    }
}

fn repeat(min: u32, max: Option<u32>) -> String {
    match max {
        Some(max) if max == min => format!("{{{}}}", min),
        Some(max) => format!("{{{},{}}}", min, max),
        None => format!("{{{},}}", min),
    }
}

fn words_fragment(bound: Bound, separator_consumed: bool) -> String {
    let (min, max) = word_range(bound);
    if separator_consumed {
        // first word is bare, the rest carry their own separator
        let rest_min = min.saturating_sub(1);
        let rest_max = max.map(|m| m.saturating_sub(1));
        if rest_max == Some(0) {
            return format!("(?:{})", WORD);
        }
        format!(r"(?:{w})(?:\s+{w}){q}", w = WORD, q = repeat(rest_min, rest_max))
    } else {
        format!(r"(?:\s+{w}){q}", w = WORD, q = repeat(min, max))
    }
}

/// Append an escaped literal span, turning whitespace runs into `\s+`.
/// Returns whether the span ended in whitespace.
fn push_literal(body: &mut String, literal: &str, mut ends_with_space: bool) -> bool {
    let mut pending = String::new();
    let mut in_space = false;
    for c in literal.chars() {
        if c.is_whitespace() {
            if !in_space {
                body.push_str(&fancy_regex::escape(&pending));
                pending.clear();
                body.push_str(r"\s+");
                in_space = true;
            }
            ends_with_space = true;
        } else {
            pending.push(c);
            in_space = false;
            ends_with_space = false;
        }
    }
    body.push_str(&fancy_regex::escape(&pending));
    ends_with_space
}

/// Build the (unwrapped) pattern body of a token phrase.
///
/// Returns `None` when nothing remains to match.
pub fn compile_token_body(phrase: &str) -> Option<String> {
    let mut body = String::new();
    let mut last = 0;
    // start of phrase counts as a consumed separator
    let mut prev_space = true;

    for caps in placeholder_re().captures_iter(phrase) {
        let Some(whole) = caps.get(0) else { continue };
        if whole.start() > last {
            prev_space = push_literal(&mut body, &phrase[last..whole.start()], prev_space);
        }
        let bound = parse_bound(caps.get(2).map(|m| m.as_str()), caps.get(3).map(|m| m.as_str()));
        let kind = caps.get(1).map(|m| m.as_str().to_ascii_lowercase()).unwrap_or_default();
        if kind == "words" {
            body.push_str(&words_fragment(bound, prev_space));
        } else {
            body.push_str(&string_fragment(bound));
        }
        prev_space = false;
        last = whole.end();
    }
    if last < phrase.len() {
        push_literal(&mut body, &phrase[last..], prev_space);
    }

    (!body.is_empty()).then_some(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_placeholders() {
        assert!(contains_tokens("best [words] plugin"));
        assert!(contains_tokens("wordpre[STRING:max5]"));
        assert!(!contains_tokens("plain [link] text"));
    }

    #[test]
    fn test_string_bounds() {
        assert_eq!(compile_token_body("[string]").unwrap(), r"(?:\p{L}+)");
        assert_eq!(compile_token_body("[string:4]").unwrap(), r"(?:\p{L}{4})");
        assert_eq!(compile_token_body("[string:min2]").unwrap(), r"(?:\p{L}{2,})");
        assert_eq!(compile_token_body("x[string:max5]").unwrap(), r"x(?:\p{L}{1,5})");
    }

    #[test]
    fn test_words_after_space_has_no_leading_separator() {
        let body = compile_token_body("best [words] plugin").unwrap();
        assert_eq!(body, r"best\s+(?:\p{L}+)(?:\s+\p{L}+){0,2}\s+plugin");
    }

    #[test]
    fn test_words_glued_to_literal_keeps_separator() {
        let body = compile_token_body("best[words:2]").unwrap();
        assert_eq!(body, r"best(?:\s+\p{L}+){2}");
    }

    #[test]
    fn test_words_exact_one_after_space() {
        let body = compile_token_body("the [words:1] way").unwrap();
        assert_eq!(body, r"the\s+(?:\p{L}+)\s+way");
    }

    #[test]
    fn test_words_min_after_space() {
        let body = compile_token_body("go [words:min2]").unwrap();
        assert_eq!(body, r"go\s+(?:\p{L}+)(?:\s+\p{L}+){1,}");
    }

    #[test]
    fn test_zero_count_falls_back_to_default() {
        assert_eq!(compile_token_body("[string:0]").unwrap(), r"(?:\p{L}+)");
    }

    #[test]
    fn test_literal_text_is_escaped() {
        let body = compile_token_body("c++ [string]").unwrap();
        assert_eq!(body, r"c\+\+\s+(?:\p{L}+)");
    }

    #[test]
    fn test_empty_phrase_has_no_body() {
        assert_eq!(compile_token_body(""), None);
    }
}
