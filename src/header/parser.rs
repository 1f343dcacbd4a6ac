use std::collections::BTreeMap;

/// Tag name (lowercase) -> every value given for it, in file order.
pub type HeaderTags = BTreeMap<String, Vec<String>>;

/// Lines that open the diff body and therefore end the header.
const BODY_MARKERS: &[&str] = &["diff ", "--- ", "+++ ", "Index:", "@@", "==="];

/// Return the leading comment region of a patch, one trimmed line per entry.
///
/// Comment prefixes (`#`, `//`, `/*`, `*`, `*/`) are stripped so headers may
/// be written inside comment blocks.
pub fn extract_header(contents: &str) -> Vec<String> {
    let mut lines = Vec::new();
    for raw in contents.lines() {
        if BODY_MARKERS.iter().any(|marker| raw.starts_with(marker)) {
            break;
        }
        let line = strip_comment(raw.trim());
        if !line.is_empty() {
            lines.push(line.to_string());
        }
    }
    lines
}

fn strip_comment(line: &str) -> &str {
    let line = line.strip_suffix("*/").unwrap_or(line);
    for prefix in ["/**", "/*", "//", "#", "*"] {
        if let Some(rest) = line.strip_prefix(prefix) {
            return rest.trim();
        }
    }
    line.trim()
}

/// Parse header lines into tags.
///
/// Accepts `Tag: value` and `@tag value`. Tag names are matched
/// case-insensitively; a bare `@skip` or `Skip:` records an empty value.
/// Lines that are neither are description text and ignored.
pub fn parse_tags(lines: &[String]) -> HeaderTags {
    let mut tags = HeaderTags::new();
    for line in lines {
        if let Some((name, value)) = split_tag(line) {
            tags.entry(name.to_ascii_lowercase())
                .or_default()
                .push(value.trim().to_string());
        }
    }
    tags
}

fn split_tag(line: &str) -> Option<(&str, &str)> {
    if let Some(rest) = line.strip_prefix('@') {
        let (name, value) = match rest.find(char::is_whitespace) {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, ""),
        };
        return is_tag_name(name).then_some((name, value));
    }

    let (name, value) = line.split_once(':')?;
    is_tag_name(name).then_some((name, value))
}

fn is_tag_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
