//! Literal prefilter: one Aho-Corasick pass per text node tells which
//! literal rules could possibly match, so the regex engine only runs for
//! those.
//!
//! The automaton folds ASCII case only, so a case-insensitive phrase is gated
//! only when it is pure ASCII. Two non-ASCII characters fold onto ASCII
//! letters (KELVIN SIGN onto `k`, LONG S onto `s`); text containing either
//! bypasses the prefilter.

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind as AcMatchKind};

/// Which rule list a slot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Internal(usize),
    External(usize),
}

/// Candidate flags for one text node.
#[derive(Debug, Clone)]
pub struct Hits {
    internal: Vec<bool>,
    external: Vec<bool>,
}

impl Hits {
    pub fn internal(&self, i: usize) -> bool {
        self.internal.get(i).copied().unwrap_or(true)
    }

    pub fn external(&self, i: usize) -> bool {
        self.external.get(i).copied().unwrap_or(true)
    }
}

#[derive(Debug, Clone, Default)]
pub struct LiteralPrefilter {
    automaton: Option<AhoCorasick>,
    slots: Vec<Slot>,
    /// true = rule is gated by the automaton
    gated_internal: Vec<bool>,
    gated_external: Vec<bool>,
}

/// Can the phrase be gated by an ASCII-case-insensitive automaton?
pub fn gateable(phrase: &str, case_sensitive: bool) -> bool {
    case_sensitive || phrase.is_ascii()
}

impl LiteralPrefilter {
    /// `internal` / `external`: per rule, the literal phrase when the rule may be gated.
    pub fn build(internal: &[Option<&str>], external: &[Option<&str>]) -> Self {
        let mut patterns: Vec<&str> = Vec::new();
        let mut slots: Vec<Slot> = Vec::new();
        for (i, p) in internal.iter().enumerate() {
            if let Some(p) = *p {
                patterns.push(p);
                slots.push(Slot::Internal(i));
            }
        }
        for (i, p) in external.iter().enumerate() {
            if let Some(p) = *p {
                patterns.push(p);
                slots.push(Slot::External(i));
            }
        }

        let automaton = if patterns.is_empty() {
            None
        } else {
            match AhoCorasickBuilder::new()
                .ascii_case_insensitive(true)
                .match_kind(AcMatchKind::Standard)
                .build(&patterns)
            {
                Ok(ac) => Some(ac),
                Err(e) => {
                    tracing::warn!(error = %e, "literal prefilter disabled");
                    None
                }
            }
        };

        let gated = automaton.is_some();
        Self {
            gated_internal: internal.iter().map(|p| gated && p.is_some()).collect(),
            gated_external: external.iter().map(|p| gated && p.is_some()).collect(),
            automaton,
            slots,
        }
    }

    pub fn scan(&self, text: &str) -> Hits {
        if text.contains(|c: char| c == '\u{212A}' || c == '\u{17F}') {
            return Hits { internal: Vec::new(), external: Vec::new() };
        }
        let mut hits = Hits {
            internal: self.gated_internal.iter().map(|g| !g).collect(),
            external: self.gated_external.iter().map(|g| !g).collect(),
        };
        if let Some(ac) = &self.automaton {
            for m in ac.find_overlapping_iter(text) {
                match self.slots.get(m.pattern().as_usize()) {
                    Some(Slot::Internal(i)) => hits.internal[*i] = true,
                    Some(Slot::External(i)) => hits.external[*i] = true,
                    None => {}
                }
            }
        }
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_present_literals_are_candidates() {
        let pf = LiteralPrefilter::build(&[Some("rust"), Some("python")], &[Some("go lang")]);
        let hits = pf.scan("I write RUST daily");
        assert!(hits.internal(0));
        assert!(!hits.internal(1));
        assert!(!hits.external(0));
    }

    #[test]
    fn test_ungated_rules_always_candidates() {
        let pf = LiteralPrefilter::build(&[None, Some("rust")], &[None]);
        let hits = pf.scan("nothing here");
        assert!(hits.internal(0));
        assert!(!hits.internal(1));
        assert!(hits.external(0));
    }

    #[test]
    fn test_gateable() {
        assert!(gateable("WordPress", false));
        assert!(gateable("café", true));
        assert!(!gateable("café", false));
    }

    #[test]
    fn test_folding_characters_bypass_the_automaton() {
        let pf = LiteralPrefilter::build(&[Some("kit")], &[]);
        assert!(!pf.scan("no match").internal(0));
        assert!(pf.scan("\u{212A}it").internal(0));
    }
}
