//! Rule-based tags for newly discovered entries.
//!
//! Rule file format, one rule per line:
//!
//! ```text
//! # comment
//! *.png, *.jpg: [#image, photos]
//! node_modules: [dev]
//! ```
//!
//! `*` matches any run of characters (including `/`), `?` a single character,
//! everything else is literal; the match is anchored against the full path and
//! case-insensitive. A pattern with neither a separator nor a wildcard also
//! matches any single path segment exactly. A leading `#` on a tag is dropped.

use crate::error::Error;
use regex::{Regex, RegexBuilder};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

const MIME_TAGS: [(&str, &str); 3] = [
    ("image/", "image"),
    ("video/", "video"),
    ("audio/", "audio"),
];

#[derive(Debug)]
struct PathPattern {
    regex: Regex,
    segment: Option<String>,
}

impl PathPattern {
    fn compile(pattern: &str) -> Result<Self, regex::Error> {
        let mut source = String::with_capacity(pattern.len() + 8);
        source.push('^');
        for c in pattern.chars() {
            match c {
                '*' => source.push_str(".*"),
                '?' => source.push('.'),
                other => source.push_str(&regex::escape(other.encode_utf8(&mut [0u8; 4]))),
            }
        }
        source.push('$');

        let regex = RegexBuilder::new(&source).case_insensitive(true).build()?;
        let is_plain = !pattern.contains(['*', '?', '/', '\\']);
        Ok(Self {
            regex,
            segment: is_plain.then(|| pattern.to_lowercase()),
        })
    }

    fn matches(&self, path: &str) -> bool {
        if self.regex.is_match(path) {
            return true;
        }
        match &self.segment {
            Some(segment) => path
                .split(['/', '\\'])
                .any(|part| !part.is_empty() && part.to_lowercase() == *segment),
            None => false,
        }
    }
}

#[derive(Debug)]
struct TagRule {
    patterns: Vec<PathPattern>,
    tags: Vec<String>,
}

#[derive(Debug, Default)]
pub struct AutoTagger {
    rules: Vec<TagRule>,
}

impl AutoTagger {
    /// A tagger with no rules; only mime-derived tags apply.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let text = fs::read_to_string(path)?;
        let tagger = Self::parse(&text);
        debug!("Loaded {} auto-tag rules from {}", tagger.rules.len(), path.display());
        Ok(tagger)
    }

    /// Malformed lines are logged and skipped.
    pub fn parse(text: &str) -> Self {
        let mut rules = Vec::new();
        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match parse_rule(line) {
                Ok(Some(rule)) => rules.push(rule),
                Ok(None) => {}
                Err(message) => warn!("Skipping auto-tag rule on line {}: {}", index + 1, message),
            }
        }
        Self { rules }
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Tags for a path: matching rules' tags in first-seen order, then
    /// `image`/`video`/`audio` from the mime type when not already present.
    pub fn tags_for(&self, path: &str, mime_type: Option<&str>) -> Vec<String> {
        let mut tags: Vec<String> = Vec::new();
        for rule in &self.rules {
            if rule.patterns.iter().any(|p| p.matches(path)) {
                for tag in &rule.tags {
                    if !tags.contains(tag) {
                        tags.push(tag.clone());
                    }
                }
            }
        }

        if let Some(mime) = mime_type {
            for (prefix, tag) in MIME_TAGS {
                if mime.starts_with(prefix) && !tags.iter().any(|t| t == tag) {
                    tags.push(tag.to_string());
                }
            }
        }
        tags
    }
}

fn parse_rule(line: &str) -> Result<Option<TagRule>, String> {
    let (patterns_part, tags_part) = line
        .split_once(':')
        .ok_or_else(|| "missing ':' between patterns and tags".to_string())?;

    let tags_part = tags_part.trim();
    let tags_inner = tags_part
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(tags_part);
    let tags: Vec<String> = tags_inner
        .split(',')
        .map(|t| t.trim().trim_start_matches('#').trim().to_string())
        .filter(|t| !t.is_empty())
        .fold(Vec::new(), |mut acc, tag| {
            if !acc.contains(&tag) {
                acc.push(tag);
            }
            acc
        });

    let mut patterns = Vec::new();
    for pattern in patterns_part.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let compiled = PathPattern::compile(pattern)
            .map_err(|e| format!("invalid pattern '{}': {}", pattern, e))?;
        patterns.push(compiled);
    }

    if patterns.is_empty() || tags.is_empty() {
        return Ok(None);
    }
    Ok(Some(TagRule { patterns, tags }))
}
