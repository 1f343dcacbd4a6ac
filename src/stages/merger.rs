use super::{Context, Stage, StageOutput};
use crate::definition::PatchDefinition;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

/// Collapses definitions that resolve to the same patch file.
///
/// The first occurrence keeps its position; later duplicates contribute
/// their targets, `after` entries and dependencies. When two duplicates
/// constrain the same dependency differently, the first one wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergerStage;

fn identity(definition: &PatchDefinition) -> PathBuf {
    definition
        .path
        .clone()
        .unwrap_or_else(|| PathBuf::from(&definition.source))
}

fn absorb(into: &mut PatchDefinition, other: PatchDefinition) {
    for target in other.targets {
        into.push_target(target);
    }
    for after in other.after {
        if !into.after.contains(&after) {
            into.after.push(after);
        }
    }
    for (name, constraint) in other.depends {
        into.depends.entry(name).or_insert(constraint);
    }
    if into.issue.is_none() {
        into.issue = other.issue;
    }
    if into.link.is_none() {
        into.link = other.link;
    }
}

impl Stage for MergerStage {
    fn process(&self, patches: Vec<PatchDefinition>, _ctx: &Context<'_>) -> StageOutput {
        let mut merged: Vec<PatchDefinition> = Vec::with_capacity(patches.len());
        let mut index: BTreeMap<PathBuf, usize> = BTreeMap::new();

        for definition in patches {
            let key = identity(&definition);
            match index.get(&key) {
                Some(&at) => {
                    debug!(source = %definition.source, "merging duplicate patch");
                    absorb(&mut merged[at], definition);
                }
                None => {
                    index.insert(key, merged.len());
                    merged.push(definition);
                }
            }
        }
        StageOutput::new(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::testing::{def, Fixture};

    #[test]
    fn test_duplicates_merge_into_first() {
        let fixture = Fixture::new(Vec::new());
        let mut first = def("https://x/a.patch", &["acme/lib"], "acme/app");
        first.path = Some(PathBuf::from("/cache/a.patch"));
        first.depends.insert("acme/lib".into(), ">=1.0".into());
        let mut second = def("https://x/a.patch", &["acme/util"], "acme/lib");
        second.path = Some(PathBuf::from("/cache/a.patch"));
        second.depends.insert("acme/lib".into(), ">=2.0".into());
        second.after.push("base.patch".into());

        let output = MergerStage.process(
            vec![first, def("b.patch", &["acme/lib"], "acme/app"), second],
            &fixture.context(),
        );
        assert_eq!(output.patches.len(), 2);
        let merged = &output.patches[0];
        assert_eq!(merged.targets, vec!["acme/lib", "acme/util"]);
        assert_eq!(merged.depends["acme/lib"], ">=1.0");
        assert_eq!(merged.after, vec!["base.patch"]);
        assert_eq!(output.patches[1].source, "b.patch");
    }
}
