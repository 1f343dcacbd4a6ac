use super::{Context, Stage, StageOutput};
use crate::config::version::matches_requirement;
use crate::definition::PatchDefinition;

/// Checks local files exist and package dependencies are satisfied.
///
/// Unmet dependencies exclude the definition; a missing local file is a
/// failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatorStage;

fn unmet_dependency(definition: &PatchDefinition, ctx: &Context<'_>) -> Option<String> {
    for (name, constraint) in &definition.depends {
        let Some(package) = ctx.package(name) else {
            return Some(format!("requires {name} which is not installed"));
        };
        match matches_requirement(&package.version, Some(constraint)) {
            Ok(true) => {}
            Ok(false) => {
                return Some(format!(
                    "requires {name} {constraint}, installed {}",
                    package.version
                ))
            }
            Err(err) => return Some(format!("cannot check {name}: {err}")),
        }
    }
    None
}

impl Stage for ValidatorStage {
    fn process(&self, patches: Vec<PatchDefinition>, ctx: &Context<'_>) -> StageOutput {
        let mut output = StageOutput::default();
        for definition in patches {
            if let Some(reason) = unmet_dependency(&definition, ctx) {
                output.exclude(definition, reason);
                continue;
            }
            let missing = match &definition.path {
                Some(path) if path.is_file() => None,
                Some(path) => Some(format!("patch file not found: {}", path.display())),
                None => Some("patch source was never resolved".to_string()),
            };
            match missing {
                Some(reason) => output.fail(definition, reason),
                None => output.keep(definition),
            }
        }
        output
    }
}
