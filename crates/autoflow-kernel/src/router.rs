//! Deterministic keyword router.
//!
//! When no language model is reachable, utterances are classified by a
//! [`KeywordRouter`]: every handler owns a set of keyword phrases compiled
//! into a single [`aho_corasick`] automaton, and regex extractors pull
//! structured entities (addresses, quoted names, intervals) out of the text.
//!
//! | Stage | Technique |
//! |-------|-----------|
//! | Route | Aho-Corasick over all handler keywords, whole words only |
//! | Extract | Compiled [`regex`] per entity, named group `value` if present |
//!
//! # Example
//!
//! ```rust
//! # use autoflow_kernel::router::{KeywordRouter, RouteResult};
//! let mut router = KeywordRouter::new();
//! router.add_keywords("email", &["email", "send mail", "inbox"]).unwrap();
//! router.add_keywords("tasks", &["task", "todo"]).unwrap();
//!
//! match router.route("Send an email to the team") {
//!     RouteResult::KeywordMatch { handler, .. } => assert_eq!(handler, "email"),
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```

use std::collections::BTreeMap;

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// The outcome of routing an utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteResult {
    /// At least one keyword of `handler` appeared in the text.
    KeywordMatch {
        /// The winning handler.
        handler: String,
        /// Distinct keywords of the winning handler found in the text.
        matched: Vec<String>,
        /// Number of distinct keywords found (`matched.len()`).
        hits: usize,
    },

    /// No keyword of any handler appeared in the text.
    Unrouted {
        /// The original text.
        text: String,
    },
}

impl RouteResult {
    /// The handler for a keyword match, `None` when unrouted.
    pub fn handler(&self) -> Option<&str> {
        match self {
            Self::KeywordMatch { handler, .. } => Some(handler),
            Self::Unrouted { .. } => None,
        }
    }
}

struct Extractor {
    entity: String,
    compiled: Regex,
}

// ---------------------------------------------------------------------------
// KeywordRouter
// ---------------------------------------------------------------------------

/// Keyword-based handler router with regex entity extraction.
///
/// Not `Clone`; wrap in `Arc` for shared access.  Routing takes `&self`, so
/// a fully built router can be shared freely across tasks.
#[derive(Default)]
pub struct KeywordRouter {
    /// Handlers in registration order, which breaks score ties.
    handlers: Vec<String>,
    /// `(lowercased phrase, handler index)` per automaton pattern.
    phrases: Vec<(String, usize)>,
    automaton: Option<AhoCorasick>,
    extractors: Vec<Extractor>,
}

impl KeywordRouter {
    /// Create an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach keyword phrases to `handler`, creating it if needed.
    ///
    /// The automaton is rebuilt immediately so that [`route`](Self::route)
    /// can stay `&self`.
    pub fn add_keywords(&mut self, handler: &str, phrases: &[&str]) -> Result<()> {
        let idx = match self.handlers.iter().position(|h| h == handler) {
            Some(idx) => idx,
            None => {
                self.handlers.push(handler.to_string());
                self.handlers.len() - 1
            }
        };

        for phrase in phrases {
            let phrase = phrase.trim().to_lowercase();
            if !phrase.is_empty() {
                self.phrases.push((phrase, idx));
            }
        }

        tracing::debug!(handler, count = phrases.len(), "keywords added");
        self.rebuild()
    }

    /// Register a regex extractor for `entity`.
    ///
    /// If the pattern has a named group `value`, that group is the extracted
    /// value; otherwise the whole match is.
    pub fn add_extractor(&mut self, entity: &str, pattern: &str) -> Result<()> {
        let compiled = Regex::new(pattern).map_err(|e| KernelError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        self.extractors.push(Extractor {
            entity: entity.to_string(),
            compiled,
        });
        Ok(())
    }

    /// Route `text` to the handler with the most distinct keyword hits.
    pub fn route(&self, text: &str) -> RouteResult {
        let Some(ac) = &self.automaton else {
            return RouteResult::Unrouted {
                text: text.to_string(),
            };
        };

        let mut found: Vec<Vec<String>> = vec![Vec::new(); self.handlers.len()];
        for mat in ac.find_iter(text) {
            if !is_word_bounded(text, mat.start(), mat.end()) {
                continue;
            }
            let (phrase, handler_idx) = &self.phrases[mat.pattern().as_usize()];
            let bucket = &mut found[*handler_idx];
            if !bucket.contains(phrase) {
                bucket.push(phrase.clone());
            }
        }

        // Strictly-greater keeps the earliest-registered handler on ties.
        let mut best: Option<usize> = None;
        for (idx, bucket) in found.iter().enumerate() {
            if bucket.is_empty() {
                continue;
            }
            if best.is_none_or(|b| bucket.len() > found[b].len()) {
                best = Some(idx);
            }
        }

        match best {
            Some(idx) => {
                let matched = std::mem::take(&mut found[idx]);
                tracing::debug!(handler = %self.handlers[idx], hits = matched.len(), "keyword route");
                RouteResult::KeywordMatch {
                    handler: self.handlers[idx].clone(),
                    hits: matched.len(),
                    matched,
                }
            }
            None => RouteResult::Unrouted {
                text: text.to_string(),
            },
        }
    }

    /// First match of every extractor, keyed by entity.
    ///
    /// Extraction runs on the original casing so that values such as names
    /// and addresses are preserved verbatim.  When several extractors share
    /// an entity name the first registered one that matches wins.
    pub fn extract(&self, text: &str) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        for extractor in &self.extractors {
            if out.contains_key(&extractor.entity) {
                continue;
            }
            if let Some(value) = extractor.first(text) {
                out.insert(extractor.entity.clone(), value);
            }
        }
        out
    }

    /// Every match of the extractors registered for `entity`, in text order
    /// per extractor and without duplicates.
    pub fn find_all(&self, text: &str, entity: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for extractor in self.extractors.iter().filter(|e| e.entity == entity) {
            for value in extractor.all(text) {
                if !out.contains(&value) {
                    out.push(value);
                }
            }
        }
        out
    }

    /// Registered handler names in registration order.
    pub fn handlers(&self) -> &[String] {
        &self.handlers
    }

    // -- Private helpers ----------------------------------------------------

    fn rebuild(&mut self) -> Result<()> {
        if self.phrases.is_empty() {
            self.automaton = None;
            return Ok(());
        }

        let patterns: Vec<&str> = self.phrases.iter().map(|(p, _)| p.as_str()).collect();
        let ac = AhoCorasickBuilder::new()
            .ascii_case_insensitive(true)
            .match_kind(MatchKind::LeftmostLongest)
            .build(&patterns)
            .map_err(|e| KernelError::RouterBuildError {
                reason: e.to_string(),
            })?;

        tracing::trace!(count = patterns.len(), "keyword automaton rebuilt");
        self.automaton = Some(ac);
        Ok(())
    }
}

impl Extractor {
    fn capture(&self, caps: &regex::Captures<'_>) -> Option<String> {
        caps.name("value")
            .or_else(|| caps.get(0))
            .map(|m| m.as_str().trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn first(&self, text: &str) -> Option<String> {
        self.compiled
            .captures_iter(text)
            .find_map(|caps| self.capture(&caps))
    }

    fn all(&self, text: &str) -> Vec<String> {
        self.compiled
            .captures_iter(text)
            .filter_map(|caps| self.capture(&caps))
            .collect()
    }
}

/// A keyword only counts when it is not embedded in a longer word.
fn is_word_bounded(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    !before.is_some_and(is_word) && !after.is_some_and(is_word)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
