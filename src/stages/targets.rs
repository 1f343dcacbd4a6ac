use super::{Context, Stage, StageOutput};
use crate::definition::PatchDefinition;

/// Settles the final target list.
///
/// An empty target list falls back to the sole `depends` package. Targets
/// that are neither installed nor the root are removed.
#[derive(Debug, Clone, Copy, Default)]
pub struct TargetsResolverStage;

impl Stage for TargetsResolverStage {
    fn process(&self, patches: Vec<PatchDefinition>, ctx: &Context<'_>) -> StageOutput {
        let mut output = StageOutput::default();
        for mut definition in patches {
            if definition.targets.is_empty() && definition.depends.len() == 1 {
                if let Some(name) = definition.depends.keys().next().cloned() {
                    definition.targets.push(name);
                }
            }
            definition.targets.retain(|target| ctx.is_known(target));
            if definition.targets.is_empty() {
                output.exclude(definition, "no installed target package");
            } else {
                output.keep(definition);
            }
        }
        output
    }
}
