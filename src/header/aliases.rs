use super::parser::HeaderTags;
use super::tags;

/// Canonical tag -> synonyms folded into it.
pub type TagAliases = [(&'static str, &'static [&'static str])];

const DEFAULT_ALIASES: &TagAliases = &[
    (tags::LABEL, &["desc", "description", "reason"]),
    (tags::ISSUE, &["ticket", "issues", "tickets"]),
    (tags::VERSION, &["constraint"]),
    (tags::PACKAGE, &["target", "module", "targets"]),
    (tags::LINK, &["links", "reference", "ref", "url"]),
];

pub fn default_aliases() -> &'static TagAliases {
    DEFAULT_ALIASES
}

/// Copy synonym tags onto their canonical name.
///
/// A canonical tag already present in the header is never overwritten. When
/// several synonyms are present the last one listed in `aliases` wins.
pub fn apply_aliases(mut data: HeaderTags, aliases: &TagAliases) -> HeaderTags {
    for (canonical, origins) in aliases {
        if data.contains_key(*canonical) {
            continue;
        }
        let mut resolved = None;
        for origin in origins.iter() {
            if let Some(values) = data.get(*origin) {
                resolved = Some(values.clone());
            }
        }
        if let Some(values) = resolved {
            data.insert((*canonical).to_string(), values);
        }
    }
    data
}
