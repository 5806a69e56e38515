//! RIC allow/deny and regex allow/deny message filter (C4, §4.4).
//!
//! Grounded on `examples/original_source/REGEX.{h,cpp}` for the regex-file
//! loading rules (`#`-comment lines, skip-and-continue on a pattern that
//! fails to compile) and on `DAPNETGateway.cpp`'s filter evaluation order.

use std::collections::HashSet;
use std::path::Path;

use regex::Regex;
use tracing::{debug, warn};

use crate::message::PagingMessage;

/// Compile `pattern` anchored to the whole string, so matching it with
/// `Regex::is_match` reproduces `std::regex_match`'s whole-string semantics
/// (§4.4) rather than `find`'s leftmost-first search. An unanchored search
/// can pick a shorter alternative and miss a full match that exists via a
/// different branch — e.g. `find` against `a|aa` and body `"aa"` returns
/// the `a` branch at `(0,1)`, which isn't whole-string, even though `aa`
/// would match in full.
fn anchor(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{pattern})$"))
}

/// Re-derive the anchored form of regexes a caller already compiled
/// unanchored (e.g. config-supplied patterns passed straight to
/// [`Filter::new`]), logging and dropping any whose wrapped form
/// unexpectedly fails to compile.
fn anchor_all(patterns: Vec<Regex>) -> Vec<Regex> {
    patterns
        .into_iter()
        .filter_map(|re| match anchor(re.as_str()) {
            Ok(anchored) => Some(anchored),
            Err(e) => {
                warn!("error anchoring regex {} ({}), skipping", re.as_str(), e);
                None
            }
        })
        .collect()
}

/// Load a regex list file: one pattern per line, `#`-prefixed lines are
/// comments, patterns that fail to compile are logged and skipped.
fn load_regex_file(path: &Path) -> Vec<Regex> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("could not read regex file {}: {}", path.display(), e);
            return Vec::new();
        }
    };

    let mut patterns = Vec::new();
    for line in contents.lines() {
        if line.starts_with('#') {
            continue;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match Regex::new(line) {
            Ok(re) => patterns.push(re),
            Err(e) => debug!("error in regex {} ({}), skipping", line, e),
        }
    }

    patterns
}

#[derive(Debug, Default)]
pub struct Filter {
    ric_allow: HashSet<u32>,
    ric_deny: HashSet<u32>,
    regex_deny: Vec<Regex>,
    regex_allow: Vec<Regex>,
}

/// Outcome of evaluating a candidate message, for logging by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    RicNotAllowed,
    RicDenied,
    RegexDenied,
    RegexNotAllowed,
}

impl Filter {
    pub fn new(
        ric_allow: Vec<u32>,
        ric_deny: Vec<u32>,
        regex_deny: Vec<Regex>,
        regex_allow: Vec<Regex>,
    ) -> Self {
        Self {
            ric_allow: ric_allow.into_iter().collect(),
            ric_deny: ric_deny.into_iter().collect(),
            regex_deny: anchor_all(regex_deny),
            regex_allow: anchor_all(regex_allow),
        }
    }

    /// Build a filter from config-supplied RIC lists plus optional regex
    /// list files (absent files yield empty lists, per §4.4 "any may be
    /// empty").
    pub fn from_lists(
        ric_allow: Vec<u32>,
        ric_deny: Vec<u32>,
        deny_file: Option<&Path>,
        allow_file: Option<&Path>,
    ) -> Self {
        let regex_deny = deny_file.map(load_regex_file).unwrap_or_default();
        let regex_allow = allow_file.map(load_regex_file).unwrap_or_default();
        Self::new(ric_allow, ric_deny, regex_deny, regex_allow)
    }

    /// Evaluate the strict ordering from §4.4: allow-list, then deny-list,
    /// then regex-deny, then regex-allow.
    pub fn evaluate(&self, message: &PagingMessage) -> Verdict {
        if !self.ric_allow.is_empty() && !self.ric_allow.contains(&message.ric) {
            return Verdict::RicNotAllowed;
        }

        if self.ric_deny.contains(&message.ric) {
            return Verdict::RicDenied;
        }

        // Non-UTF8 bodies never match a regex; treat as opaque bytes via
        // lossy conversion purely for matching purposes.
        let body = String::from_utf8_lossy(&message.body);

        if self.regex_deny.iter().any(|re| re.is_match(&body)) {
            return Verdict::RegexDenied;
        }

        if !self.regex_allow.is_empty() && !self.regex_allow.iter().any(|re| re.is_match(&body))
        {
            return Verdict::RegexNotAllowed;
        }

        Verdict::Accept
    }
}
