use super::{Context, Stage, StageOutput};
use crate::definition::PatchDefinition;

/// Resolves local sources to absolute paths under the owner's base
/// directory. Remote sources and already-resolved definitions pass through.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathNormalizerStage;

impl Stage for PathNormalizerStage {
    fn process(&self, patches: Vec<PatchDefinition>, ctx: &Context<'_>) -> StageOutput {
        let mut output = StageOutput::default();
        for mut definition in patches {
            if definition.is_remote() || definition.path.is_some() {
                output.keep(definition);
                continue;
            }
            match ctx.local_path(&definition) {
                Some(path) => {
                    definition.path = Some(path);
                    output.keep(definition);
                }
                None => {
                    let reason = format!("owner {} has no install path", definition.owner);
                    output.exclude(definition, reason);
                }
            }
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::Package;
    use crate::stages::testing::{def, Fixture};
    use std::path::PathBuf;

    #[test]
    fn test_paths_resolve_against_owner() {
        let fixture = Fixture::new(vec![Package::new("acme/lib", "1.0.0")]);
        let mut resolved = def("found.patch", &["acme/lib"], "acme/lib");
        resolved.path = Some(PathBuf::from("/elsewhere/found.patch"));

        let output = PathNormalizerStage.process(
            vec![
                def("patches/root.patch", &["acme/lib"], "acme/app"),
                def("patches/lib.patch", &["acme/util"], "acme/lib"),
                def("https://x/y.patch", &["acme/lib"], "acme/app"),
                resolved,
                def("patches/ghost.patch", &["acme/lib"], "acme/ghost"),
            ],
            &fixture.context(),
        );

        let base = fixture.dir.path();
        assert_eq!(output.patches.len(), 4);
        assert_eq!(
            output.patches[0].path.as_deref(),
            Some(base.join("patches/root.patch").as_path())
        );
        assert_eq!(
            output.patches[1].path.as_deref(),
            Some(base.join("vendor/acme/lib/patches/lib.patch").as_path())
        );
        assert!(output.patches[2].path.is_none());
        assert_eq!(
            output.patches[3].path.as_deref(),
            Some(std::path::Path::new("/elsewhere/found.patch"))
        );
        assert_eq!(output.excluded[0].0.owner, "acme/ghost");
    }
}
