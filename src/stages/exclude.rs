use super::{Context, Stage, StageOutput};
use crate::config::schema::{Exclusions, ANY_OWNER};
use crate::definition::PatchDefinition;

/// Drops declarations listed in the root project's `excluded-patches`.
#[derive(Debug, Clone)]
pub struct GlobalExcludeStage {
    excludes: Exclusions,
}

impl GlobalExcludeStage {
    pub fn new(excludes: Exclusions) -> Self {
        Self { excludes }
    }

    fn is_excluded(&self, definition: &PatchDefinition) -> bool {
        [definition.owner.as_str(), ANY_OWNER]
            .iter()
            .filter_map(|owner| self.excludes.get(*owner))
            .flatten()
            .any(|path| source_matches(&definition.source, path))
    }
}

/// Exact match, or `path` matching the trailing segments of `source`.
fn source_matches(source: &str, path: &str) -> bool {
    let path = path.trim_start_matches("./");
    let source = source.trim_start_matches("./");
    source == path
        || source
            .strip_suffix(path)
            .is_some_and(|head| head.ends_with('/'))
}

impl Stage for GlobalExcludeStage {
    fn process(&self, patches: Vec<PatchDefinition>, _ctx: &Context<'_>) -> StageOutput {
        let mut output = StageOutput::default();
        for definition in patches {
            if self.is_excluded(&definition) {
                output.exclude(definition, "listed in excluded-patches");
            } else {
                output.keep(definition);
            }
        }
        output
    }
}

/// Drops definitions flagged `skip` by their own declaration or header.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalExcludeStage;

impl Stage for LocalExcludeStage {
    fn process(&self, patches: Vec<PatchDefinition>, _ctx: &Context<'_>) -> StageOutput {
        let mut output = StageOutput::default();
        for definition in patches {
            if definition.skip {
                output.exclude(definition, "marked as skipped");
            } else {
                output.keep(definition);
            }
        }
        output
    }
}

/// Removes caller-skipped packages from every definition's targets.
#[derive(Debug, Clone, Default)]
pub struct CustomExcludeStage {
    skipped: Vec<String>,
}

impl CustomExcludeStage {
    pub fn new(skipped: Vec<String>) -> Self {
        Self { skipped }
    }
}

impl Stage for CustomExcludeStage {
    fn process(&self, patches: Vec<PatchDefinition>, _ctx: &Context<'_>) -> StageOutput {
        if self.skipped.is_empty() {
            return StageOutput::new(patches);
        }

        let mut output = StageOutput::default();
        for mut definition in patches {
            let declared = definition.targets.len();
            definition
                .targets
                .retain(|target| !self.skipped.contains(target));
            if declared > 0 && definition.targets.is_empty() {
                output.exclude(definition, "all targets skipped by caller");
            } else {
                output.keep(definition);
            }
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::testing::{def, Fixture};

    #[test]
    fn test_source_matches() {
        assert!(source_matches("patches/fix.patch", "patches/fix.patch"));
        assert!(source_matches("patches/fix.patch", "fix.patch"));
        assert!(source_matches("./patches/fix.patch", "patches/fix.patch"));
        assert!(!source_matches("patches/prefix.patch", "fix.patch"));
    }

    #[test]
    fn test_global_exclude_by_owner() {
        let fixture = Fixture::new(Vec::new());
        let excludes = Exclusions::from([
            ("acme/lib".to_string(), vec!["patches/a.patch".to_string()]),
            (ANY_OWNER.to_string(), vec!["c.patch".to_string()]),
        ]);
        let stage = GlobalExcludeStage::new(excludes);
        let output = stage.process(
            vec![
                def("patches/a.patch", &["acme/util"], "acme/lib"),
                def("patches/a.patch", &["acme/util"], "acme/other"),
                def("patches/c.patch", &["acme/util"], "acme/other"),
            ],
            &fixture.context(),
        );
        assert_eq!(output.patches.len(), 1);
        assert_eq!(output.patches[0].owner, "acme/other");
        assert_eq!(output.patches[0].source, "patches/a.patch");
        assert_eq!(output.excluded.len(), 2);
    }

    #[test]
    fn test_local_exclude_drops_skipped() {
        let fixture = Fixture::new(Vec::new());
        let mut skipped = def("b.patch", &["acme/lib"], "acme/app");
        skipped.skip = true;
        let output = LocalExcludeStage.process(
            vec![def("a.patch", &["acme/lib"], "acme/app"), skipped],
            &fixture.context(),
        );
        assert_eq!(output.patches.len(), 1);
        assert_eq!(output.excluded[0].0.source, "b.patch");
    }

    #[test]
    fn test_custom_exclude_trims_targets() {
        let fixture = Fixture::new(Vec::new());
        let stage = CustomExcludeStage::new(vec!["acme/lib".to_string()]);
        let output = stage.process(
            vec![
                def("a.patch", &["acme/lib"], "acme/app"),
                def("b.patch", &["acme/lib", "acme/util"], "acme/app"),
            ],
            &fixture.context(),
        );
        assert_eq!(output.patches.len(), 1);
        assert_eq!(output.patches[0].targets, vec!["acme/util"]);
        assert_eq!(output.excluded.len(), 1);
    }
}
