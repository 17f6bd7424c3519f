//! Adblock Plus filter line parser
//!
//! Turns one line of list text into a [`Filter`], or says why the line
//! produces no network filter. Never panics on arbitrary input.

use log::trace;
use sb_core::filter::{Filter, PatternToken};
use sb_core::types::{FilterFlags, PartyScope, ResourceType};

/// Why a line did not produce a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejected {
    #[error("blank line")]
    Blank,
    #[error("comment")]
    Comment,
    #[error("cosmetic filter")]
    Cosmetic,
    #[error("HTML filter")]
    Html,
    #[error("option cannot be enforced on requests")]
    Unsupported,
    #[error("malformed filter: {0}")]
    Malformed(&'static str),
}

/// Result of parsing a whole list.
#[derive(Debug, Clone, Default)]
pub struct ParsedList {
    pub filters: Vec<Filter>,
    pub num_comments: u32,
    pub num_cosmetic: u32,
    pub num_html: u32,
    pub num_unsupported: u32,
    pub num_malformed: u32,
}

/// Parse list text. `\n`, `\r\n` and `\r` are all line separators.
pub fn parse_filter_list(text: &str) -> ParsedList {
    let mut list = ParsedList::default();

    for line in text.split(['\n', '\r']) {
        match parse_line(line) {
            Ok(filter) => list.filters.push(filter),
            Err(Rejected::Blank) => {}
            Err(Rejected::Comment) => list.num_comments += 1,
            Err(Rejected::Cosmetic) => list.num_cosmetic += 1,
            Err(Rejected::Html) => list.num_html += 1,
            Err(Rejected::Unsupported) => {
                trace!("Unsupported filter: {line}");
                list.num_unsupported += 1;
            }
            Err(reason @ Rejected::Malformed(_)) => {
                trace!("Skipping {line:?}: {reason}");
                list.num_malformed += 1;
            }
        }
    }

    list
}

/// Parse one filter line.
pub fn parse_line(line: &str) -> Result<Filter, Rejected> {
    let line = line.trim();
    if line.is_empty() {
        return Err(Rejected::Blank);
    }
    if is_comment_line(line) {
        return Err(Rejected::Comment);
    }
    if ["##", "#@#", "#?#", "#$#"].iter().any(|m| line.contains(m)) {
        return Err(Rejected::Cosmetic);
    }
    if line.contains("$$") {
        return Err(Rejected::Html);
    }
    if line.starts_with('#') {
        return Err(Rejected::Comment);
    }

    let mut flags = FilterFlags::empty();
    let mut rule = line;
    if let Some(rest) = rule.strip_prefix("@@") {
        flags |= FilterFlags::EXCEPTION;
        rule = rest;
        if rule.is_empty() {
            return Err(Rejected::Malformed("empty exception"));
        }
    }

    let (pattern_text, options_text) = split_rule_options(rule);
    let options = match options_text {
        Some(text) => parse_options(text)?,
        None => ParsedOptions::default(),
    };

    let mut pattern_text = pattern_text;
    if let Some(rest) = pattern_text.strip_prefix("||") {
        flags |= FilterFlags::HOST_ANCHOR;
        pattern_text = rest;
    } else if let Some(rest) = pattern_text.strip_prefix('|') {
        flags |= FilterFlags::LEFT_ANCHOR;
        pattern_text = rest;
    }
    if let Some(rest) = pattern_text.strip_suffix('|') {
        flags |= FilterFlags::RIGHT_ANCHOR;
        pattern_text = rest;
    }

    if pattern_text.is_empty()
        && flags.intersects(FilterFlags::HOST_ANCHOR | FilterFlags::LEFT_ANCHOR)
    {
        return Err(Rejected::Malformed("empty anchored pattern"));
    }

    let pattern = tokenize_pattern(pattern_text);
    if !pattern.is_empty() && pattern.iter().all(|t| *t == PatternToken::Separator) {
        return Err(Rejected::Malformed("separator-only pattern"));
    }

    let host_anchor_key = if flags.contains(FilterFlags::HOST_ANCHOR) {
        host_anchor_key(pattern_text)
    } else {
        None
    };

    Ok(Filter {
        text: line.to_string(),
        pattern,
        flags,
        resource_types: options.resource_types,
        party: options.party,
        domain_include: options.domain_include,
        domain_exclude: options.domain_exclude,
        host_anchor_key,
    })
}

fn is_comment_line(line: &str) -> bool {
    line.starts_with('!') || (line.starts_with('[') && line.ends_with(']'))
}

/// Split at the last `$` not escaped with a backslash.
fn split_rule_options(rule: &str) -> (&str, Option<&str>) {
    let bytes = rule.as_bytes();
    let pos = (0..bytes.len())
        .rev()
        .find(|&i| bytes[i] == b'$' && (i == 0 || bytes[i - 1] != b'\\'));
    match pos {
        Some(pos) => (&rule[..pos], Some(&rule[pos + 1..])),
        None => (rule, None),
    }
}

/// Split pattern text into tokens. Runs of `*` collapse to one wildcard.
fn tokenize_pattern(text: &str) -> Vec<PatternToken> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        let token = match c {
            '*' => PatternToken::Wildcard,
            '^' => PatternToken::Separator,
            '\\' if chars.peek() == Some(&'$') => continue,
            _ => {
                literal.push(c.to_ascii_lowercase());
                continue;
            }
        };

        if !literal.is_empty() {
            tokens.push(PatternToken::Literal(std::mem::take(&mut literal)));
        }
        if token == PatternToken::Wildcard && tokens.last() == Some(&PatternToken::Wildcard) {
            continue;
        }
        tokens.push(token);
    }

    if !literal.is_empty() {
        tokens.push(PatternToken::Literal(literal));
    }
    tokens
}

/// Host of a `||host^` or `||host/` pattern, if the host part is plain.
fn host_anchor_key(pattern: &str) -> Option<String> {
    let end = pattern.find(['/', '^'])?;
    let host = &pattern[..end];
    if host.is_empty()
        || host.starts_with('.')
        || host.ends_with('.')
        || !host
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-' | b'_'))
    {
        return None;
    }
    Some(host.to_ascii_lowercase())
}

// =============================================================================
// Options
// =============================================================================

#[derive(Debug, Default)]
struct ParsedOptions {
    resource_types: ResourceType,
    party: PartyScope,
    domain_include: Vec<String>,
    domain_exclude: Vec<String>,
}

/// Options that only make sense outside a request blocker.
const INERT_OPTIONS: &[&str] = &["ping", "popup", "elemhide", "generichide", "genericblock", "csp"];

fn parse_options(text: &str) -> Result<ParsedOptions, Rejected> {
    let mut options = ParsedOptions::default();
    let mut type_include = 0u32;
    let mut type_exclude = 0u32;

    for raw in text.split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        let raw_lower = raw.to_ascii_lowercase();
        let raw_lower = raw_lower.as_str();

        if let Some(value) = raw_lower.strip_prefix("domain=") {
            parse_domain_option(value, &mut options)?;
            continue;
        }

        if raw_lower.starts_with("csp=") || raw_lower.starts_with("removeparam=") {
            return Err(Rejected::Unsupported);
        }

        let (negated, name) = match raw_lower.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, raw_lower),
        };

        match name {
            "third-party" | "3p" => {
                options.party = if negated {
                    PartyScope::FirstPartyOnly
                } else {
                    PartyScope::ThirdPartyOnly
                };
            }
            "first-party" | "1p" => {
                options.party = if negated {
                    PartyScope::ThirdPartyOnly
                } else {
                    PartyScope::FirstPartyOnly
                };
            }
            "ping" if negated => type_exclude |= ResourceType::PING.bits(),
            _ if INERT_OPTIONS.contains(&name) => {
                if !negated {
                    return Err(Rejected::Unsupported);
                }
            }
            _ => {
                if let Some(ty) = ResourceType::from_option_name(name) {
                    if negated {
                        type_exclude |= ty.bits();
                    } else {
                        type_include |= ty.bits();
                    }
                }
                // Everything else (redirect=, important, match-case, ...) has
                // no effect on the block decision.
            }
        }
    }

    let bits = finalize_mask_u32(type_include, type_exclude, ResourceType::all().bits())
        .ok_or(Rejected::Malformed("option set excludes every resource type"))?;
    options.resource_types = ResourceType::from_bits_truncate(bits);

    options.domain_include.sort_unstable();
    options.domain_include.dedup();
    options.domain_exclude.sort_unstable();
    options.domain_exclude.dedup();

    Ok(options)
}

fn parse_domain_option(value: &str, options: &mut ParsedOptions) -> Result<(), Rejected> {
    let mut found = false;

    for raw in value.split('|') {
        let (is_exclude, domain_raw) = match raw.trim().strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, raw.trim()),
        };
        let Some(domain) = normalize_domain(domain_raw) else {
            continue;
        };

        found = true;
        if is_exclude {
            options.domain_exclude.push(domain);
        } else {
            options.domain_include.push(domain);
        }
    }

    if !found {
        return Err(Rejected::Malformed("empty domain option"));
    }
    Ok(())
}

fn normalize_domain(host: &str) -> Option<String> {
    let trimmed = host.trim().trim_matches('.');
    if trimmed.is_empty() {
        return None;
    }

    if !trimmed
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-' || b == b'_')
    {
        return None;
    }

    Some(trimmed.to_ascii_lowercase())
}

fn finalize_mask_u32(include: u32, exclude: u32, all: u32) -> Option<u32> {
    let include = include & all;
    let exclude = exclude & all;
    let mut mask = if include != 0 { include & !exclude } else { all & !exclude };
    if mask == 0 {
        return None;
    }
    if mask == all {
        mask = 0;
    }
    Some(mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(s: &str) -> PatternToken {
        PatternToken::Literal(s.to_string())
    }

    #[test]
    fn test_rejects_non_network_lines() {
        assert_eq!(parse_line(""), Err(Rejected::Blank));
        assert_eq!(parse_line("   \t"), Err(Rejected::Blank));
        assert_eq!(parse_line("! comment"), Err(Rejected::Comment));
        assert_eq!(parse_line("[Adblock Plus 2.0]"), Err(Rejected::Comment));
        assert_eq!(parse_line("# hosts style comment"), Err(Rejected::Comment));
        assert_eq!(parse_line("example.com##.ad-banner"), Err(Rejected::Cosmetic));
        assert_eq!(parse_line("##.ad-banner"), Err(Rejected::Cosmetic));
        assert_eq!(parse_line("example.com#@#.ad"), Err(Rejected::Cosmetic));
        assert_eq!(parse_line("example.com#?#div:has(.ad)"), Err(Rejected::Cosmetic));
        assert_eq!(parse_line("example.com$$script[data-src=\"x\"]"), Err(Rejected::Html));
    }

    #[test]
    fn test_malformed_lines() {
        assert!(matches!(parse_line("^"), Err(Rejected::Malformed(_))));
        assert!(matches!(parse_line("^^"), Err(Rejected::Malformed(_))));
        assert!(matches!(parse_line("@@"), Err(Rejected::Malformed(_))));
        assert!(matches!(parse_line("||"), Err(Rejected::Malformed(_))));
        assert!(matches!(parse_line("|"), Err(Rejected::Malformed(_))));
        assert!(matches!(parse_line("ad$domain="), Err(Rejected::Malformed(_))));
        assert!(matches!(parse_line("ad$domain=|~"), Err(Rejected::Malformed(_))));
        assert!(matches!(parse_line("ad$script,~script"), Err(Rejected::Malformed(_))));
    }

    #[test]
    fn test_plain_pattern() {
        let f = parse_line("/banner1.gif").unwrap();
        assert_eq!(f.pattern, vec![lit("/banner1.gif")]);
        assert!(f.flags.is_empty());
        assert!(f.resource_types.is_empty());
        assert_eq!(f.text, "/banner1.gif");
    }

    #[test]
    fn test_lone_wildcard() {
        let f = parse_line("*").unwrap();
        assert_eq!(f.pattern, vec![PatternToken::Wildcard]);
    }

    #[test]
    fn test_stars_collapse() {
        let f = parse_line("a/********b").unwrap();
        assert_eq!(f.pattern, vec![lit("a/"), PatternToken::Wildcard, lit("b")]);
        let f = parse_line("***a").unwrap();
        assert_eq!(f.pattern, vec![PatternToken::Wildcard, lit("a")]);
    }

    #[test]
    fn test_anchors() {
        let f = parse_line("|http://example.com/|").unwrap();
        assert_eq!(f.flags, FilterFlags::LEFT_ANCHOR | FilterFlags::RIGHT_ANCHOR);
        assert_eq!(f.pattern, vec![lit("http://example.com/")]);

        let f = parse_line("swf|").unwrap();
        assert_eq!(f.flags, FilterFlags::RIGHT_ANCHOR);

        let f = parse_line("@@||Example.com^").unwrap();
        assert_eq!(f.flags, FilterFlags::EXCEPTION | FilterFlags::HOST_ANCHOR);
        assert_eq!(f.pattern, vec![lit("example.com"), PatternToken::Separator]);
        assert_eq!(f.host_anchor_key.as_deref(), Some("example.com"));
    }

    #[test]
    fn test_host_anchor_key() {
        let key = |line: &str| parse_line(line).unwrap().host_anchor_key;
        assert_eq!(key("||ads.example.com^").as_deref(), Some("ads.example.com"));
        assert_eq!(key("||example.com/banner.gif").as_deref(), Some("example.com"));
        assert_eq!(key("||example.com"), None);
        assert_eq!(key("||*.example.com^"), None);
        assert_eq!(key("||ad*.example.com/"), None);
        assert_eq!(key("||example.com:8080/"), None);
        assert_eq!(key("|example.com^"), None);
    }

    #[test]
    fn test_options_split_at_last_dollar() {
        let f = parse_line("*/b/ss/*&aqe=$image,redirect=1x1-transparent.gif").unwrap();
        assert_eq!(
            f.pattern,
            vec![PatternToken::Wildcard, lit("/b/ss/"), PatternToken::Wildcard, lit("&aqe=")]
        );
        assert_eq!(f.resource_types, ResourceType::IMAGE);

        let f = parse_line("/ad\\$x").unwrap();
        assert_eq!(f.pattern, vec![lit("/ad$x")]);
    }

    #[test]
    fn test_type_options() {
        let f = parse_line("ad$script,image").unwrap();
        assert_eq!(f.resource_types, ResourceType::SCRIPT | ResourceType::IMAGE);

        let f = parse_line("ad$~script").unwrap();
        assert!(!f.resource_types.contains(ResourceType::SCRIPT));
        assert!(f.resource_types.contains(ResourceType::IMAGE));

        let f = parse_line("ad$xhr,sub_frame,object-subrequest").unwrap();
        assert_eq!(
            f.resource_types,
            ResourceType::XMLHTTPREQUEST | ResourceType::SUBDOCUMENT | ResourceType::OBJECT_SUBREQUEST
        );
    }

    #[test]
    fn test_party_options() {
        assert_eq!(parse_line("ad$third-party").unwrap().party, PartyScope::ThirdPartyOnly);
        assert_eq!(parse_line("ad$~third-party").unwrap().party, PartyScope::FirstPartyOnly);
        assert_eq!(parse_line("ad$first-party").unwrap().party, PartyScope::FirstPartyOnly);
    }

    #[test]
    fn test_domain_option() {
        let f = parse_line("adv$domain=Example.com|~foo.example.com|example.com").unwrap();
        assert_eq!(f.domain_include, vec!["example.com".to_string()]);
        assert_eq!(f.domain_exclude, vec!["foo.example.com".to_string()]);
    }

    #[test]
    fn test_inert_and_ignored_options() {
        assert_eq!(parse_line("||example.com^$ping"), Err(Rejected::Unsupported));
        assert_eq!(parse_line("||example.com^$popup"), Err(Rejected::Unsupported));
        assert_eq!(parse_line("||example.com^$csp=script-src 'none'"), Err(Rejected::Unsupported));
        assert_eq!(parse_line("||example.com^$removeparam=utm_source"), Err(Rejected::Unsupported));

        let f = parse_line("||example.com^$~ping").unwrap();
        assert!(!f.resource_types.contains(ResourceType::PING));

        let f = parse_line("||example.com^$important,match-case,collapse,some-new-option").unwrap();
        assert!(f.resource_types.is_empty());
    }

    #[test]
    fn test_parse_filter_list_counts() {
        let list = parse_filter_list(
            "[Adblock Plus 2.0]\n! Title\n/ads/\n\n##.banner\n^\n||x.com^$popup\nexample.com$$div\n@@/ads/ok\n",
        );
        assert_eq!(list.filters.len(), 2);
        assert_eq!(list.num_comments, 2);
        assert_eq!(list.num_cosmetic, 1);
        assert_eq!(list.num_html, 1);
        assert_eq!(list.num_malformed, 1);
        assert_eq!(list.num_unsupported, 1);
    }

    #[test]
    fn test_line_endings_equivalent() {
        let text = "/ads/\n||tracker.net^\n@@/ads/ok$image\n";
        let lf = parse_filter_list(text).filters;
        assert_eq!(lf, parse_filter_list(&text.replace('\n', "\r")).filters);
        assert_eq!(lf, parse_filter_list(&text.replace('\n', "\r\n")).filters);
    }

    #[test]
    fn test_arbitrary_input_does_not_panic() {
        for line in ["$", "@@$", "||^", "|||", "$$$", "*$*", "\u{0}\u{ffff}", "||例子.测试^", "~$~"] {
            let _ = parse_line(line);
        }
    }
}
