//! Compact command-line syntax for tags and criteria.
//!
//! ```text
//! --criterion tag=genus,pattern=pinus,ops=contains+case-insensitive
//! --criterion tag=label:Quota@it,pattern=100..500,ops=range
//! --criterion tag=county,pattern=Siena|Prato,path=loc.c
//! ```
//!
//! Tags are ids unless written `label:<label>[@<language>]`. Patterns with
//! `|` are value sets; under a range operator `lo..hi` is a range with
//! either side optional.

use anyhow::{anyhow, bail, Result};
use ontobase_engine::{Criterion, Operator, Pattern, TagRef};

pub fn parse_tag(raw: &str) -> TagRef {
    match raw.strip_prefix("label:") {
        Some(rest) => match rest.rsplit_once('@') {
            Some((label, language)) if !language.is_empty() => {
                TagRef::label(label, Some(language))
            }
            _ => TagRef::label(rest, None),
        },
        None => TagRef::id(raw),
    }
}

/// Dotted document path, e.g. `loc.c`.
pub fn parse_path(raw: &str) -> Vec<String> {
    raw.split('.')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn non_empty(s: &str) -> Option<&str> {
    Some(s.trim()).filter(|s| !s.is_empty())
}

fn parse_pattern(raw: &str, operators: &[Operator]) -> Pattern {
    let ranged = operators
        .iter()
        .any(|op| matches!(op, Operator::Range | Operator::ExclusiveRange));
    if ranged {
        if let Some((lo, hi)) = raw.split_once("..") {
            return Pattern::range(non_empty(lo), non_empty(hi));
        }
    }
    if raw.contains('|') {
        return Pattern::set(raw.split('|').map(str::trim));
    }
    Pattern::text(raw)
}

pub fn parse_criterion(raw: &str) -> Result<Criterion> {
    let mut tag = None;
    let mut pattern = None;
    let mut operators = Vec::new();
    let mut paths = Vec::new();

    for part in raw.split(',') {
        let (key, value) = part
            .split_once('=')
            .ok_or_else(|| anyhow!("expected key=value in criterion, got `{part}`"))?;
        match key.trim() {
            "tag" => tag = Some(parse_tag(value.trim())),
            "pattern" | "value" => pattern = Some(value.to_string()),
            "ops" | "op" => {
                for op in value.split('+').filter(|s| !s.trim().is_empty()) {
                    operators.push(op.parse::<Operator>().map_err(|e| anyhow!(e))?);
                }
            }
            "path" => paths.push(parse_path(value)),
            other => bail!("unknown criterion key `{other}`"),
        }
    }

    let tag = tag.ok_or_else(|| anyhow!("criterion `{raw}` has no tag"))?;
    let pattern = pattern
        .map(|p| parse_pattern(&p, &operators))
        .unwrap_or_default();
    Ok(Criterion {
        tag,
        pattern,
        operators,
        paths,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_contains_criterion() {
        let c = parse_criterion("tag=genus,pattern=pinus,ops=CONTAINS+CASE_INSENSITIVE").unwrap();
        assert_eq!(c.tag, TagRef::id("genus"));
        assert_eq!(c.pattern, Pattern::text("pinus"));
        assert_eq!(c.operators, vec![Operator::Contains, Operator::CaseInsensitive]);
    }

    #[test]
    fn test_parse_label_range_and_sets() {
        let c = parse_criterion("tag=label:Quota@it,pattern=100..,ops=range").unwrap();
        assert_eq!(c.tag, TagRef::label("Quota", Some("it")));
        assert_eq!(c.pattern, Pattern::range(Some("100"), None));

        let c = parse_criterion("tag=county,pattern=Siena|Prato,path=loc.c").unwrap();
        assert_eq!(c.pattern, Pattern::set(["Siena", "Prato"]));
        assert_eq!(c.paths, vec![vec!["loc".to_string(), "c".to_string()]]);

        // without a range operator `..` is literal text
        let c = parse_criterion("tag=genus,pattern=a..b").unwrap();
        assert_eq!(c.pattern, Pattern::text("a..b"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_criterion("pattern=x").is_err());
        assert!(parse_criterion("tag=genus,ops=sounds-like").is_err());
        assert!(parse_criterion("tag=genus,colour=red").is_err());
        assert!(parse_criterion("tag").is_err());
    }

    #[test]
    fn test_label_without_language() {
        assert_eq!(parse_tag("label:Genus"), TagRef::label("Genus", None));
    }
}
