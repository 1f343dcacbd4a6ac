use super::{Context, Stage, StageOutput};
use crate::definition::PatchDefinition;

/// Checks `depends` entries that name platform packages.
///
/// Satisfied entries are consumed so later stages only see package
/// dependencies.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlatformStage;

impl Stage for PlatformStage {
    fn process(&self, patches: Vec<PatchDefinition>, ctx: &Context<'_>) -> StageOutput {
        if ctx.platform.is_empty() {
            return StageOutput::new(patches);
        }

        let mut output = StageOutput::default();
        'definitions: for mut definition in patches {
            let platform_deps: Vec<(String, String)> = definition
                .depends
                .iter()
                .filter(|(name, _)| ctx.platform.contains(name))
                .map(|(name, constraint)| (name.clone(), constraint.clone()))
                .collect();

            for (name, constraint) in platform_deps {
                if ctx.platform.satisfies(&name, &constraint) == Some(true) {
                    definition.depends.remove(&name);
                } else {
                    let version = ctx.platform.version(&name).unwrap_or_default();
                    let reason = format!("platform {name} {version} does not satisfy {constraint}");
                    output.exclude(definition, reason);
                    continue 'definitions;
                }
            }
            output.keep(definition);
        }
        output
    }
}
