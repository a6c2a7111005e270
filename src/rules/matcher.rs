/// Condition matching: per-condition searchers compiled once at load time,
/// plus an Aho-Corasick prefilter over every rule's first content pattern.
///
/// Compiling up front means bad patterns (unsupported pcre, automaton build
/// failures) surface as load errors, never at match time.
use super::rule::{Condition, Rule};
use crate::engine::request::RequestBuffer;
use ahash::AHashSet;
use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use regex::bytes::Regex;
use tracing::debug;

/// Buffer region a condition searched; distance chaining only threads through
/// conditions that address the same region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Payload,
    Uri,
    Method,
}

/// Offsets of one satisfied condition, relative to its region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchSpan {
    pub start: usize,
    pub end: usize,
    pub region: Region,
}

/// A rule condition with its searcher prebuilt
#[derive(Debug)]
pub enum CompiledCondition {
    Content {
        finder: AhoCorasick,
        distance: Option<usize>,
        within: Option<usize>,
        uri_only: bool,
    },
    Pcre {
        re: Regex,
        uri_only: bool,
    },
    Method {
        value: String,
    },
}

impl CompiledCondition {
    pub fn compile(cond: &Condition) -> Result<Self, String> {
        match cond {
            Condition::Content(c) => {
                let finder = AhoCorasickBuilder::new()
                    .match_kind(MatchKind::LeftmostFirst)
                    .ascii_case_insensitive(c.nocase)
                    .build([c.pattern.as_slice()])
                    .map_err(|e| format!("failed to build content searcher: {}", e))?;
                Ok(CompiledCondition::Content {
                    finder,
                    distance: c.distance,
                    within: c.within,
                    uri_only: c.uri_only,
                })
            }
            Condition::Pcre(p) => Ok(CompiledCondition::Pcre {
                re: compile_pcre(&p.expr)?,
                uri_only: p.uri_only,
            }),
            Condition::Field(f) => Ok(CompiledCondition::Method {
                value: f.value.clone(),
            }),
        }
    }
}

/// Evaluate a single condition against a request buffer.
///
/// `prev` is the span of the immediately preceding satisfied condition; a
/// content `distance` restricts the search to start at `prev.end + distance`
/// (minimum-start semantics, not exact adjacency), and only applies when the
/// previous match was in the same region. Returns the leftmost match.
pub fn match_condition(
    cond: &CompiledCondition,
    req: &RequestBuffer,
    prev: Option<MatchSpan>,
) -> Option<MatchSpan> {
    match cond {
        CompiledCondition::Content {
            finder,
            distance,
            within,
            uri_only,
        } => {
            let (region, buf) = region_of(req, *uri_only)?;
            let anchor = prev.filter(|p| p.region == region).map(|p| p.end);

            let start = match (distance, anchor) {
                (Some(d), Some(end)) => end.checked_add(*d)?,
                _ => 0,
            };
            if start > buf.len() {
                return None;
            }

            let m = finder.find(&buf[start..])?;
            let span = MatchSpan {
                start: start + m.start(),
                end: start + m.end(),
                region,
            };

            // within bounds the end of this match relative to the previous one
            if let (Some(w), Some(end)) = (within, anchor) {
                if span.end > end.saturating_add(*w) {
                    return None;
                }
            }
            Some(span)
        }
        CompiledCondition::Pcre { re, uri_only } => {
            let (region, buf) = region_of(req, *uri_only)?;
            let m = re.find(buf)?;
            Some(MatchSpan {
                start: m.start(),
                end: m.end(),
                region,
            })
        }
        CompiledCondition::Method { value } => {
            let method = req.method.as_deref()?;
            if method.eq_ignore_ascii_case(value) {
                Some(MatchSpan {
                    start: 0,
                    end: method.len(),
                    region: Region::Method,
                })
            } else {
                None
            }
        }
    }
}

fn region_of(req: &RequestBuffer, uri_only: bool) -> Option<(Region, &[u8])> {
    if uri_only {
        req.uri_slice().map(|uri| (Region::Uri, uri))
    } else {
        Some((Region::Payload, req.payload.as_slice()))
    }
}

/// Translate `/pattern/flags` into a bytes regex; i/m/s flags are mapped,
/// anything the regex crate rejects is a load-time error
pub fn compile_pcre(expr: &str) -> Result<Regex, String> {
    let expr = expr.trim().trim_matches('"');

    let rest = expr
        .strip_prefix('/')
        .ok_or_else(|| "pcre must start with /".to_string())?;
    let slash = rest
        .rfind('/')
        .ok_or_else(|| "pcre must be in /pattern/flags form".to_string())?;
    let (pattern, flags) = (&rest[..slash], &rest[slash + 1..]);

    let mut regex_str = String::new();
    if flags.contains('i') {
        regex_str.push_str("(?i)");
    }
    if flags.contains('m') {
        regex_str.push_str("(?m)");
    }
    if flags.contains('s') {
        regex_str.push_str("(?s)");
    }
    regex_str.push_str(pattern);

    Regex::new(&regex_str).map_err(|e| format!("invalid pcre: {}", e))
}

/// Multi-pattern prefilter: one automaton pass over the buffer yields the
/// sids whose first content pattern is present. Rules without a content
/// condition are always candidates.
#[derive(Debug, Default)]
pub struct Prefilter {
    ac_sensitive: Option<AhoCorasick>,
    sids_sensitive: Vec<u32>,
    ac_insensitive: Option<AhoCorasick>,
    sids_insensitive: Vec<u32>,
    unfiltered: Vec<u32>,
}

impl Prefilter {
    pub fn build<'a>(rules: impl Iterator<Item = &'a Rule>) -> Result<Self, String> {
        let mut sensitive: Vec<(Vec<u8>, u32)> = Vec::new();
        let mut insensitive: Vec<(Vec<u8>, u32)> = Vec::new();
        let mut unfiltered = Vec::new();

        for rule in rules {
            match rule.first_content() {
                Some(content) if content.nocase => {
                    insensitive.push((content.pattern.clone(), rule.sid()));
                }
                Some(content) => {
                    sensitive.push((content.pattern.clone(), rule.sid()));
                }
                None => unfiltered.push(rule.sid()),
            }
        }

        let build = |patterns: &[(Vec<u8>, u32)], nocase: bool| -> Result<Option<AhoCorasick>, String> {
            if patterns.is_empty() {
                return Ok(None);
            }
            AhoCorasickBuilder::new()
                .match_kind(MatchKind::Standard)
                .ascii_case_insensitive(nocase)
                .build(patterns.iter().map(|(p, _)| p.as_slice()))
                .map(Some)
                .map_err(|e| format!("failed to build prefilter automaton: {}", e))
        };

        let prefilter = Self {
            ac_sensitive: build(&sensitive, false)?,
            sids_sensitive: sensitive.into_iter().map(|(_, sid)| sid).collect(),
            ac_insensitive: build(&insensitive, true)?,
            sids_insensitive: insensitive.into_iter().map(|(_, sid)| sid).collect(),
            unfiltered,
        };
        debug!(
            sensitive = prefilter.sids_sensitive.len(),
            insensitive = prefilter.sids_insensitive.len(),
            unfiltered = prefilter.unfiltered.len(),
            "prefilter built"
        );
        Ok(prefilter)
    }

    /// Sids that may match this request; a sid absent from the result cannot
    /// match and is skipped by the evaluator
    pub fn candidates(&self, req: &RequestBuffer) -> AHashSet<u32> {
        let mut sids: AHashSet<u32> = self.unfiltered.iter().copied().collect();

        let mut scan = |buf: &[u8]| {
            if let Some(ref ac) = self.ac_sensitive {
                for m in ac.find_overlapping_iter(buf) {
                    sids.insert(self.sids_sensitive[m.pattern().as_usize()]);
                }
            }
            if let Some(ref ac) = self.ac_insensitive {
                for m in ac.find_overlapping_iter(buf) {
                    sids.insert(self.sids_insensitive[m.pattern().as_usize()]);
                }
            }
        };

        scan(&req.payload);
        if let Some(uri) = req.uri_slice() {
            scan(uri);
        }
        sids
    }
}
