use super::{Context, Stage, StageOutput};
use crate::definition::PatchDefinition;
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap};
use std::path::Path;
use tracing::warn;

/// Orders definitions so each comes after the patches its `after` names.
///
/// The sort is stable: unconstrained definitions keep discovery order. A
/// cycle is broken by releasing the earliest remaining definition.
#[derive(Debug, Clone, Copy, Default)]
pub struct SorterStage;

/// Whether an `after` reference names `definition`.
fn refers_to(reference: &str, definition: &PatchDefinition) -> bool {
    let reference = reference.trim_start_matches("./");
    if reference.is_empty() {
        return false;
    }
    definition.source == reference
        || definition.label == reference
        || definition
            .source
            .strip_suffix(reference)
            .is_some_and(|head| head.ends_with('/'))
        || definition
            .path
            .as_deref()
            .is_some_and(|path| path.ends_with(Path::new(reference)))
}

/// Stable topological order of `patches` as indices.
pub(crate) fn sorted_order(patches: &[PatchDefinition]) -> Vec<usize> {
    let count = patches.len();
    let mut indegree = vec![0usize; count];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];

    for (i, definition) in patches.iter().enumerate() {
        let prerequisites: BTreeSet<usize> = definition
            .after
            .iter()
            .flat_map(|reference| {
                patches
                    .iter()
                    .enumerate()
                    .filter(move |(j, other)| *j != i && refers_to(reference, other))
                    .map(|(j, _)| j)
            })
            .collect();
        indegree[i] = prerequisites.len();
        for j in prerequisites {
            dependents[j].push(i);
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = (0..count)
        .filter(|&i| indegree[i] == 0)
        .map(Reverse)
        .collect();
    let mut placed = vec![false; count];
    let mut order = Vec::with_capacity(count);

    loop {
        while let Some(Reverse(i)) = ready.pop() {
            if placed[i] {
                continue;
            }
            placed[i] = true;
            order.push(i);
            for &k in &dependents[i] {
                indegree[k] = indegree[k].saturating_sub(1);
                if indegree[k] == 0 && !placed[k] {
                    ready.push(Reverse(k));
                }
            }
        }
        if order.len() == count {
            break;
        }
        let Some(stuck) = (0..count).find(|&i| !placed[i]) else {
            break;
        };
        warn!(
            source = %patches[stuck].source,
            "cyclic after references, releasing earliest patch"
        );
        indegree[stuck] = 0;
        ready.push(Reverse(stuck));
    }
    order
}

impl Stage for SorterStage {
    fn process(&self, patches: Vec<PatchDefinition>, _ctx: &Context<'_>) -> StageOutput {
        let order = sorted_order(&patches);
        let mut slots: Vec<Option<PatchDefinition>> = patches.into_iter().map(Some).collect();
        StageOutput::new(order.into_iter().filter_map(|i| slots[i].take()).collect())
    }
}
