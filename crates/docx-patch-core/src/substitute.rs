//! Ordered regex substitution over the serialized body text.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PatchError, Result};

/// One find/replace step.
///
/// `find` is a regular expression matched against the serialized XML, so
/// text that XML escapes (`&`, `<`, `>`) must be searched for in its
/// escaped form. `replacement` may refer to capture groups as `\1`..`\9`
/// (`\0` is the whole match); `\\` is a literal backslash and `$` has no
/// special meaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubstitutionRule {
    pub find: String,
    #[serde(rename = "replace")]
    pub replacement: String,
}

impl SubstitutionRule {
    pub fn new(find: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            find: find.into(),
            replacement: replacement.into(),
        }
    }

    /// Rule replacing a plain piece of document text with other plain text.
    pub fn literal(text: &str, replacement: &str) -> Self {
        Self {
            find: regex::escape(&escape_xml_text(text)),
            replacement: escape_xml_text(replacement).replace('\\', "\\\\"),
        }
    }

    /// Pair up find patterns and replacements by position.
    pub fn zip_pairs<F, R>(find_patterns: &[F], replacements: &[R]) -> Result<Vec<Self>>
    where
        F: AsRef<str>,
        R: AsRef<str>,
    {
        if find_patterns.len() != replacements.len() {
            return Err(PatchError::ArityMismatch {
                patterns: find_patterns.len(),
                replacements: replacements.len(),
            });
        }
        Ok(find_patterns
            .iter()
            .zip(replacements)
            .map(|(f, r)| Self::new(f.as_ref(), r.as_ref()))
            .collect())
    }
}

/// Escape text the way it appears inside a `<w:t>` element.
pub fn escape_xml_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
    out
}

/// Translate `\N` back-references into a `regex` expansion template.
pub fn expansion_template(replacement: &str) -> String {
    let mut out = String::with_capacity(replacement.len() + 8);
    let mut chars = replacement.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.peek().copied() {
                Some(d @ '0'..='9') => {
                    chars.next();
                    out.push_str("${");
                    out.push(d);
                    out.push('}');
                }
                Some('\\') => {
                    chars.next();
                    out.push('\\');
                }
                _ => out.push('\\'),
            },
            '$' => out.push_str("$$"),
            other => out.push(other),
        }
    }
    out
}

/// Apply `rules` in order, each over the output of the previous one.
///
/// Returns the rewritten text and the number of matches per rule. A rule
/// that matches nothing leaves the text as it was.
pub fn apply_rules(text: &str, rules: &[SubstitutionRule]) -> Result<(String, Vec<usize>)> {
    let mut buffer = text.to_string();
    let mut counts = Vec::with_capacity(rules.len());

    for (index, rule) in rules.iter().enumerate() {
        let re = Regex::new(&rule.find).map_err(|source| PatchError::Pattern {
            index,
            pattern: rule.find.clone(),
            source,
        })?;
        let template = expansion_template(&rule.replacement);

        let mut count = 0usize;
        let replaced = re
            .replace_all(&buffer, |caps: &Captures| {
                count += 1;
                let mut dst = String::new();
                caps.expand(&template, &mut dst);
                dst
            })
            .into_owned();

        if count == 0 {
            debug!("Rule #{} ({}) matched nothing", index, rule.find);
        } else {
            debug!("Rule #{} ({}) replaced {} matches", index, rule.find, count);
            buffer = replaced;
        }
        counts.push(count);
    }

    Ok((buffer, counts))
}
