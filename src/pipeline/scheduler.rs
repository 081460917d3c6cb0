use std::collections::BTreeSet;

use crate::error::{PipelineError, Result};
use crate::pipeline::registry::StageRegistry;

/// Order registered stages so every stage follows the producers of its inputs.
///
/// Kahn's algorithm over stage indices. When several stages are ready at
/// once, the earliest-registered one runs first, so the order is stable.
/// Returns indices into `registry.stages()`.
pub fn schedule(registry: &StageRegistry) -> Result<Vec<usize>> {
    let stages = registry.stages();
    let count = stages.len();

    // predecessors[i] = producers i waits on; successors[p] = stages waiting on p
    let mut predecessors: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); count];
    let mut successors: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); count];

    for (index, stage) in stages.iter().enumerate() {
        for table in stage.depends_on() {
            let producer =
                registry
                    .producer_of(table)
                    .ok_or_else(|| PipelineError::MissingProducer {
                        stage: stage.name().to_string(),
                        table: table.to_string(),
                    })?;
            predecessors[index].insert(producer);
            successors[producer].insert(index);
        }
    }

    let mut remaining: Vec<usize> = predecessors.iter().map(|p| p.len()).collect();
    let mut ready: BTreeSet<usize> = (0..count).filter(|&i| remaining[i] == 0).collect();
    let mut order = Vec::with_capacity(count);

    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &succ in &successors[next] {
            remaining[succ] -= 1;
            if remaining[succ] == 0 {
                ready.insert(succ);
            }
        }
    }

    if order.len() < count {
        let scheduled: BTreeSet<usize> = order.iter().copied().collect();
        let stuck = (0..count)
            .filter(|i| !scheduled.contains(i))
            .map(|i| stages[i].name().to_string())
            .collect();
        return Err(PipelineError::DependencyCycle { stages: stuck });
    }

    Ok(order)
}

/// Stage names in scheduled order
pub fn execution_plan(registry: &StageRegistry) -> Result<Vec<&'static str>> {
    let order = schedule(registry)?;
    Ok(order.into_iter().map(|i| registry.stages()[i].name()).collect())
}
