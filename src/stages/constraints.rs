use super::{Context, Stage, StageOutput};
use crate::config::version::{canonicalize_constraint, validate_requirement};
use crate::definition::PatchDefinition;

/// Rewrites every `depends` constraint into canonical form and drops
/// definitions carrying a constraint that cannot be parsed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstraintsStage;

impl Stage for ConstraintsStage {
    fn process(&self, patches: Vec<PatchDefinition>, _ctx: &Context<'_>) -> StageOutput {
        let mut output = StageOutput::default();
        for mut definition in patches {
            let mut invalid = None;
            for (name, constraint) in definition.depends.iter_mut() {
                let canonical = canonicalize_constraint(constraint);
                if let Err(err) = validate_requirement(&canonical) {
                    invalid = Some(format!("invalid constraint for {name}: {err}"));
                    break;
                }
                *constraint = canonical;
            }
            match invalid {
                Some(reason) => output.exclude(definition, reason),
                None => output.keep(definition),
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
    fn test_constraints_canonicalized() {
        let fixture = Fixture::new(Vec::new());
        let mut good = def("a.patch", &["acme/lib"], "acme/app");
        good.depends.insert("acme/lib".into(), ">=1.2 <2.0".into());
        let mut bad = def("b.patch", &["acme/lib"], "acme/app");
        bad.depends.insert("acme/lib".into(), "not a version".into());

        let output = ConstraintsStage.process(vec![good, bad], &fixture.context());
        assert_eq!(output.patches.len(), 1);
        assert_eq!(output.patches[0].depends["acme/lib"], ">=1.2, <2.0");
        assert_eq!(output.excluded.len(), 1);
    }
}
