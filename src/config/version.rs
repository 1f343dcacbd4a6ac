//! Version constraint matching for patch dependencies.
//!
//! Constraints are written the way package manifests usually write them:
//! `^1.0`, `>=1.2 <2.0`, `1.4.*`, `^1.0 || ^2.0`. They are canonicalized to
//! the comma-separated form understood by [`semver::VersionReq`] and any
//! `||` alternative may match.

use semver::{Version, VersionReq};
use std::fmt;

/// Errors during constraint evaluation
#[derive(Debug, Clone)]
pub enum VersionError {
    /// Invalid version string (e.g., "not-a-version")
    InvalidVersion { value: String, source: String },
    /// Invalid version requirement (e.g., ">=bad")
    InvalidRequirement { value: String, source: String },
}

impl fmt::Display for VersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionError::InvalidVersion { value, source } => {
                write!(f, "invalid version '{}': {}", value, source)
            }
            VersionError::InvalidRequirement { value, source } => {
                write!(f, "invalid version requirement '{}': {}", value, source)
            }
        }
    }
}

impl std::error::Error for VersionError {}

const OPERATORS: &[&str] = &[">=", "<=", "!=", ">", "<", "=", "^", "~"];

/// Rewrite a constraint into canonical `a, b || c` form.
///
/// # Examples
///
/// ```
/// use patch_resolver::config::version::canonicalize_constraint;
///
/// assert_eq!(canonicalize_constraint(">= 1.2 <2.0"), ">=1.2, <2.0");
/// assert_eq!(canonicalize_constraint("^1.0|^2.0"), "^1.0 || ^2.0");
/// assert_eq!(canonicalize_constraint("1.0 - 2.0"), ">=1.0, <=2.0");
/// assert_eq!(canonicalize_constraint(""), "*");
/// ```
pub fn canonicalize_constraint(constraint: &str) -> String {
    let alternatives: Vec<String> = constraint
        .split('|')
        .map(str::trim)
        .filter(|alt| !alt.is_empty())
        .map(canonicalize_alternative)
        .collect();

    if alternatives.is_empty() {
        return "*".to_string();
    }
    alternatives.join(" || ")
}

fn canonicalize_alternative(alternative: &str) -> String {
    let tokens: Vec<&str> = alternative
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .collect();

    // hyphen range: "1.0 - 2.0"
    if let [low, "-", high] = tokens.as_slice() {
        return format!(">={}, <={}", strip_flags(low), strip_flags(high));
    }

    let mut terms = Vec::new();
    let mut pending_operator: Option<&str> = None;
    for token in tokens {
        if OPERATORS.contains(&token) {
            pending_operator = Some(token);
            continue;
        }
        let term = strip_flags(token);
        if term.is_empty() {
            continue;
        }
        match pending_operator.take() {
            Some(op) => terms.push(format!("{op}{term}")),
            None => terms.push(term),
        }
    }

    if terms.is_empty() {
        "*".to_string()
    } else {
        terms.join(", ")
    }
}

/// Drop stability flags (`@dev`) and a `v` prefix from a version term.
fn strip_flags(term: &str) -> String {
    let term = term.split('@').next().unwrap_or(term);
    let version = term.trim_start_matches(['>', '<', '=', '!', '^', '~']);
    let operator = &term[..term.len() - version.len()];
    let version = match version.strip_prefix('v') {
        Some(rest) if rest.starts_with(|c: char| c.is_ascii_digit()) => rest,
        _ => version,
    };
    format!("{operator}{version}")
}

/// Normalize an installed version into strict `MAJOR.MINOR.PATCH[-pre]`.
///
/// Missing components are zero-filled and a fourth numeric component is
/// dropped, so `1.2` becomes `1.2.0` and `v2.4.1.3` becomes `2.4.1`.
pub fn normalize_version(version: &str) -> String {
    let version = version.trim();
    let version = version.strip_prefix('v').unwrap_or(version);
    let (core, suffix) = match version.find(['-', '+']) {
        Some(idx) => version.split_at(idx),
        None => (version, ""),
    };

    let mut parts: Vec<&str> = core.split('.').take(3).collect();
    while parts.len() < 3 {
        parts.push("0");
    }
    format!("{}{}", parts.join("."), suffix)
}

/// Check if a version matches a requirement string
///
/// # Examples
///
/// ```
/// use patch_resolver::config::version::matches_requirement;
///
/// assert!(matches_requirement("1.4.0", Some(">=1.2 <2.0")).unwrap());
/// assert!(matches_requirement("2.1", Some("^1.0 || ^2.0")).unwrap());
/// assert!(!matches_requirement("0.9.0", Some(">=1.0")).unwrap());
///
/// // None requirement means "any version"
/// assert!(matches_requirement("1.0.0", None).unwrap());
/// ```
pub fn matches_requirement(
    version: &str,
    requirement: Option<&str>,
) -> Result<bool, VersionError> {
    let Some(req_str) = requirement else {
        return Ok(true);
    };

    let req_str = req_str.trim();
    if req_str.is_empty() || req_str == "*" {
        return Ok(true);
    }

    let normalized = normalize_version(version);
    let version = Version::parse(&normalized).map_err(|e| VersionError::InvalidVersion {
        value: version.to_string(),
        source: e.to_string(),
    })?;

    for alternative in canonicalize_constraint(req_str).split(" || ") {
        let req = parse_requirement(alternative)?;
        if req.matches(&version) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Validate a constraint without evaluating it.
pub fn validate_requirement(requirement: &str) -> Result<(), VersionError> {
    for alternative in canonicalize_constraint(requirement).split(" || ") {
        parse_requirement(alternative)?;
    }
    Ok(())
}

fn parse_requirement(requirement: &str) -> Result<VersionReq, VersionError> {
    VersionReq::parse(requirement).map_err(|e| VersionError::InvalidRequirement {
        value: requirement.to_string(),
        source: e.to_string(),
    })
}
