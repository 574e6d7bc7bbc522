//! The module merge algorithm.
//!
//! Merging minimizes the output-file count while holding three invariants:
//! a module never spans two namespaces, the module dependency graph stays
//! acyclic at every intermediate step, and nothing live references a
//! removed module. Five ordered phases each run to a fixed point:
//!
//! 1. collapse dependency cycles whose modules share one namespace
//! 2. merge modules without dependencies, per namespace
//! 3. merge modules without dependents, per namespace
//! 4. merge modules with identical dependency and dependent sets
//! 5. greedily merge any remaining pair whose contraction stays acyclic
//!
//! A cycle that crosses namespaces cannot be resolved here; it ends phase 1
//! early and is only reported by the final validation if phases 2–5 cannot
//! eliminate it either. Every merge strictly decreases the live module
//! count, so each phase terminates.
//!
//! All traversals are iterative depth-first searches with an explicit stack
//! and an external three-state color map, which lets the phase-5 check
//! simulate a contraction as a pure function over the borrowed graph.

use super::{Module, ModuleGraph, ModuleId};
use crate::error::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Node state during cycle detection; unvisited nodes are absent from the map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    Visiting,
    Visited,
}

/// Runs the five merge phases and validates the resulting graph.
pub fn merge_modules(graph: &mut ModuleGraph) -> Result<()> {
    info!("Merging module cycles...");
    let before = graph.live_count();
    collapse_same_namespace_cycles(graph)?;
    info!("  Modules before: {before}, after: {}", graph.live_count());

    info!("Merging modules with no dependencies...");
    let before = graph.live_count();
    merge_within_namespace(graph, |m| m.depends_on.is_empty())?;
    info!("  Modules before: {before}, after: {}", graph.live_count());

    info!("Merging modules with no dependents...");
    let before = graph.live_count();
    merge_within_namespace(graph, |m| m.depended_on_by.is_empty())?;
    info!("  Modules before: {before}, after: {}", graph.live_count());

    info!("Merging modules with same dependencies and dependents...");
    let before = graph.live_count();
    merge_structural_groups(graph)?;
    info!("  Modules before: {before}, after: {}", graph.live_count());

    info!("Merging remaining modules until a cycle would be created...");
    let before = graph.live_count();
    merge_until_cycle(graph)?;
    info!("  Modules before: {before}, after: {}", graph.live_count());

    info!("Validating the final module graph...");
    validate(graph)?;
    info!("No issues found.");
    Ok(())
}

/// Phase 1: repeatedly find a dependency cycle and collapse it into one
/// module, as long as every module on the cycle shares one namespace.
///
/// The first cycle that crosses namespaces ends the phase: this engine
/// cannot resolve it, and the final validation is the backstop that reports
/// it if the later phases do not happen to eliminate it.
fn collapse_same_namespace_cycles(graph: &mut ModuleGraph) -> Result<()> {
    loop {
        let Some(cycle) = find_cycle(graph) else {
            return Ok(());
        };

        let first = cycle[0];
        let others = &cycle[1..cycle.len() - 1];
        let namespace = graph.module(first).namespace.clone();
        if others
            .iter()
            .any(|&module| graph.module(module).namespace != namespace)
        {
            debug!("Found a cycle crossing namespaces; stopping cycle collapse");
            return Ok(());
        }

        for &other in others {
            graph.merge(first, other)?;
        }
    }
}

/// Phases 2 and 3: within each namespace, merge all modules matching the
/// predicate into one. Repeats until a pass performs no merge.
fn merge_within_namespace(
    graph: &mut ModuleGraph,
    predicate: impl Fn(&Module) -> bool,
) -> Result<()> {
    loop {
        let mut merged = false;
        for ids in graph.namespace_groups().into_values() {
            let candidates: Vec<ModuleId> = ids
                .into_iter()
                .filter(|&id| predicate(graph.module(id)))
                .collect();
            let Some((&first, rest)) = candidates.split_first() else {
                continue;
            };
            for &other in rest {
                graph.merge(first, other)?;
                merged = true;
            }
        }
        if !merged {
            return Ok(());
        }
    }
}

/// Phase 4: within each namespace, group modules by identical `depends_on`
/// set and identical `depended_on_by` set and merge each group into one.
/// Modules the graph cannot tell apart carry no reason to stay separate.
fn merge_structural_groups(graph: &mut ModuleGraph) -> Result<()> {
    loop {
        let mut groups: BTreeMap<(String, Vec<ModuleId>, Vec<ModuleId>), Vec<ModuleId>> =
            BTreeMap::new();
        for id in graph.live_ids() {
            let module = graph.module(id);
            let key = (
                module.namespace.clone(),
                module.depends_on.iter().copied().collect(),
                module.depended_on_by.iter().copied().collect(),
            );
            groups.entry(key).or_default().push(id);
        }

        let mut merged = false;
        for ids in groups.into_values() {
            let Some((&first, rest)) = ids.split_first() else {
                continue;
            };
            for &other in rest {
                graph.merge(first, other)?;
                merged = true;
            }
        }
        if !merged {
            return Ok(());
        }
    }
}

/// Phase 5: scan all same-namespace pairs and merge the first whose
/// contraction keeps the graph acyclic; repeat full scans until a round
/// performs no merge.
fn merge_until_cycle(graph: &mut ModuleGraph) -> Result<()> {
    loop {
        if !greedy_merge_round(graph)? {
            return Ok(());
        }
    }
}

fn greedy_merge_round(graph: &mut ModuleGraph) -> Result<bool> {
    for ids in graph.namespace_groups().into_values() {
        for i in 0..ids.len() {
            for j in (i + 1)..ids.len() {
                if contraction_creates_cycle(graph, ids[i], ids[j]) {
                    continue;
                }
                graph.merge(ids[i], ids[j])?;
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// Checks whether the graph would contain a cycle if `a` and `b` were one
/// node, without mutating anything.
///
/// The two candidates share a representative: every edge into or out of
/// either is mapped onto `a`, edges between the pair disappear. The result
/// must be identical to literally merging and then running the cycle
/// detector; phase 5 depends on that equivalence.
pub fn contraction_creates_cycle(graph: &ModuleGraph, a: ModuleId, b: ModuleId) -> bool {
    let mut color: BTreeMap<ModuleId, Color> = BTreeMap::new();

    for start in graph.live_ids() {
        let start = representative(start, a, b);
        if color.contains_key(&start) {
            continue;
        }

        color.insert(start, Color::Visiting);
        let mut stack = vec![(start, contracted_edges(graph, start, a, b), 0usize)];

        loop {
            let Some(frame) = stack.last_mut() else {
                break;
            };
            if frame.2 >= frame.1.len() {
                color.insert(frame.0, Color::Visited);
                stack.pop();
                continue;
            }
            let neighbor = frame.1[frame.2];
            frame.2 += 1;

            match color.get(&neighbor) {
                None => {
                    color.insert(neighbor, Color::Visiting);
                    stack.push((neighbor, contracted_edges(graph, neighbor, a, b), 0));
                }
                Some(Color::Visiting) => return true,
                Some(Color::Visited) => {}
            }
        }
    }

    false
}

/// Maps a module onto its node in the contracted graph
fn representative(id: ModuleId, a: ModuleId, b: ModuleId) -> ModuleId {
    if id == b {
        a
    } else {
        id
    }
}

/// Outgoing edges of a contracted-graph node, deduplicated and sorted
fn contracted_edges(graph: &ModuleGraph, id: ModuleId, a: ModuleId, b: ModuleId) -> Vec<ModuleId> {
    let mut edges: BTreeSet<ModuleId> = BTreeSet::new();
    if id == a {
        for &neighbor in graph
            .module(a)
            .depends_on
            .iter()
            .chain(graph.module(b).depends_on.iter())
        {
            let neighbor = representative(neighbor, a, b);
            if neighbor != a {
                edges.insert(neighbor);
            }
        }
    } else {
        for &neighbor in &graph.module(id).depends_on {
            edges.insert(representative(neighbor, a, b));
        }
    }
    edges.into_iter().collect()
}

/// Finds one dependency cycle in the live module graph.
///
/// Iterative three-coloring depth-first search; a back-edge to an
/// in-progress node yields the cycle as the path from that node to the
/// current tip, with the closing node repeated at the end.
pub fn find_cycle(graph: &ModuleGraph) -> Option<Vec<ModuleId>> {
    let mut color: BTreeMap<ModuleId, Color> = BTreeMap::new();

    for start in graph.live_ids() {
        if color.contains_key(&start) {
            continue;
        }

        color.insert(start, Color::Visiting);
        let mut stack = vec![(start, out_edges(graph, start), 0usize)];

        loop {
            let Some(frame) = stack.last_mut() else {
                break;
            };
            if frame.2 >= frame.1.len() {
                color.insert(frame.0, Color::Visited);
                stack.pop();
                continue;
            }
            let neighbor = frame.1[frame.2];
            frame.2 += 1;

            match color.get(&neighbor) {
                None => {
                    color.insert(neighbor, Color::Visiting);
                    stack.push((neighbor, out_edges(graph, neighbor), 0));
                }
                Some(Color::Visiting) => {
                    let position = stack
                        .iter()
                        .position(|f| f.0 == neighbor)
                        .expect("an in-progress node is on the traversal stack");
                    let mut cycle: Vec<ModuleId> = stack[position..].iter().map(|f| f.0).collect();
                    cycle.push(neighbor);
                    return Some(cycle);
                }
                Some(Color::Visited) => {}
            }
        }
    }

    None
}

fn out_edges(graph: &ModuleGraph, id: ModuleId) -> Vec<ModuleId> {
    graph.module(id).depends_on.iter().copied().collect()
}

/// Final validation: no cycle, no dangling module reference.
///
/// Any violation here is a defect in the merge algorithm, not bad input.
fn validate(graph: &ModuleGraph) -> Result<()> {
    if let Some(cycle) = find_cycle(graph) {
        return Err(Error::ResidualCycle {
            namespace: graph.module(cycle[0]).namespace.clone(),
        });
    }
    if graph.has_dangling_reference() {
        return Err(Error::DanglingModule);
    }
    Ok(())
}
