//! Turns one raw declaration into a canonical [`PatchDefinition`].

use super::{DeclarationFields, PatchDefinition, RawDeclaration, SKIP_MARKER};
use serde_json::Value;
use std::collections::BTreeMap;

/// Outcome of normalizing a declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a dropped declaration yields no definition"]
pub enum Normalized {
    Definition(PatchDefinition),
    /// The declaration had no usable source (`url` or `source`)
    Dropped,
}

impl Normalized {
    pub fn into_definition(self) -> Option<PatchDefinition> {
        match self {
            Normalized::Definition(definition) => Some(definition),
            Normalized::Dropped => None,
        }
    }
}

/// Normalize a declaration made by `owner` for package `target`.
///
/// `fallback_label` is used when the declaration carries no label of its own;
/// callers pass the declaration key or the source string.
///
/// # Examples
///
/// ```
/// use patch_resolver::definition::{normalize, RawDeclaration};
///
/// let def = normalize("acme/lib", "acme/root", "fix", RawDeclaration::from("fix.patch#skip"))
///     .into_definition()
///     .unwrap();
/// assert!(def.skip);
/// assert_eq!(def.source, "fix.patch");
/// ```
pub fn normalize(
    target: &str,
    owner: &str,
    fallback_label: &str,
    raw: RawDeclaration,
) -> Normalized {
    let fields = match raw {
        RawDeclaration::Source(source) => DeclarationFields {
            source: Some(source),
            ..DeclarationFields::default()
        },
        RawDeclaration::Detailed(fields) => fields,
    };

    let Some(mut source) = fields.url.or(fields.source) else {
        return Normalized::Dropped;
    };

    let mut skip = fields.skip;
    if let Some((head, tail)) = source.rsplit_once('#') {
        if tail == SKIP_MARKER {
            source = head.to_string();
            skip = Some(true);
        }
    }

    if source.trim().is_empty() {
        return Normalized::Dropped;
    }

    let mut depends = BTreeMap::new();
    match fields.version {
        Some(Value::Object(map)) => {
            for (name, constraint) in map {
                if let Some(constraint) = constraint_string(&constraint) {
                    depends.insert(name, constraint);
                }
            }
        }
        Some(other) => {
            if let Some(constraint) = constraint_string(&other) {
                depends.insert(target.to_string(), constraint);
            }
        }
        None => {}
    }
    if let Some(explicit) = fields.depends {
        depends.extend(explicit);
    }

    let targets = match fields.targets {
        Some(targets) if !targets.is_empty() => dedupe(targets),
        _ => vec![target.to_string()],
    };

    Normalized::Definition(PatchDefinition {
        source,
        targets,
        owner: owner.to_string(),
        label: fields.label.unwrap_or_else(|| fallback_label.to_string()),
        skip: skip.unwrap_or(false),
        depends,
        issue: fields.issue,
        link: fields.link,
        after: fields
            .after
            .map(|after| after.into_vec())
            .unwrap_or_default()
            .into_iter()
            .filter(|item| !item.trim().is_empty())
            .collect(),
        path: None,
    })
}

fn constraint_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn dedupe(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}
