//! Dependency ordering.
//!
//! Kahn's algorithm over a ready set kept as an ordered set: whenever several
//! objects are ready, the smallest key goes first. For schema objects the key
//! is the [`ObjectId`], so ties break on kind rank and then on name, and the
//! order never depends on the order objects were declared in.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::error::{CompileError, Result};
use crate::graph::SchemaGraph;
use crate::model::{ObjectId, SchemaObject};

/// Which way to walk the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Dependencies before dependents.
    Creation,
    /// Dependents before dependencies; the exact reverse of creation.
    Deletion,
}

/// Orders the objects of `graph` so that no object precedes anything it
/// depends on (creation) or follows anything that depends on it (deletion).
///
/// # Errors
///
/// Returns [`CompileError::CyclicDependency`] listing one cycle if the graph
/// is not acyclic.
pub fn order(graph: &SchemaGraph, direction: Direction) -> Result<Vec<&SchemaObject>> {
    let ids = order_ids(graph, direction)?;
    Ok(ids.iter().filter_map(|id| graph.get(id)).collect())
}

/// Like [`order`], returning object identities.
///
/// # Errors
///
/// Returns [`CompileError::CyclicDependency`] if the graph has a cycle.
pub fn order_ids(graph: &SchemaGraph, direction: Direction) -> Result<Vec<ObjectId>> {
    let prerequisites: BTreeMap<ObjectId, BTreeSet<ObjectId>> = graph
        .nodes()
        .map(|(id, node)| (id.clone(), node.depends_on.clone()))
        .collect();

    let mut ids = toposort(&prerequisites).map_err(|cycle| CompileError::CyclicDependency {
        cycle: cycle.iter().map(ToString::to_string).collect(),
    })?;
    if direction == Direction::Deletion {
        ids.reverse();
    }
    debug!(objects = ids.len(), ?direction, "resolved dependency order");
    Ok(ids)
}

/// Topologically sorts the keys of `prerequisites`, where each key maps to
/// the keys that must come before it. Prerequisites that are not keys are
/// ignored. Ready keys are emitted smallest first.
///
/// # Errors
///
/// Returns one cycle, in dependency order and closed (first element
/// repeated at the end), if no order exists.
pub fn toposort<K: Ord + Clone>(
    prerequisites: &BTreeMap<K, BTreeSet<K>>,
) -> std::result::Result<Vec<K>, Vec<K>> {
    let mut pending: BTreeMap<&K, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&K, Vec<&K>> = BTreeMap::new();

    for (key, before) in prerequisites {
        let present: Vec<&K> = before
            .iter()
            .filter(|p| *p != key && prerequisites.contains_key(*p))
            .collect();
        pending.insert(key, present.len());
        for p in present {
            dependents.entry(p).or_default().push(key);
        }
        if before.contains(key) {
            // A self-edge is a cycle of one.
            return Err(vec![key.clone(), key.clone()]);
        }
    }

    let mut ready: BTreeSet<&K> = pending
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(key, _)| *key)
        .collect();
    let mut sorted = Vec::with_capacity(prerequisites.len());

    while let Some(key) = ready.pop_first() {
        sorted.push(key.clone());
        for dependent in dependents.get(key).into_iter().flatten() {
            if let Some(count) = pending.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(*dependent);
                }
            }
        }
    }

    if sorted.len() == prerequisites.len() {
        return Ok(sorted);
    }

    let done: BTreeSet<&K> = sorted.iter().collect();
    Err(find_cycle(prerequisites, &done))
}

/// Walks prerequisite edges among unsorted keys until a key repeats. Every
/// unsorted key has an unsorted prerequisite, so the walk always closes.
fn find_cycle<K: Ord + Clone>(
    prerequisites: &BTreeMap<K, BTreeSet<K>>,
    done: &BTreeSet<&K>,
) -> Vec<K> {
    let remaining = |k: &&K| !done.contains(k) && prerequisites.contains_key(*k);
    let Some(start) = prerequisites.keys().find(|k| remaining(k)) else {
        return Vec::new();
    };

    let mut path: Vec<&K> = vec![start];
    let mut current = start;
    loop {
        let Some(next) = prerequisites
            .get(current)
            .and_then(|before| before.iter().find(|k| remaining(k)))
        else {
            return path.into_iter().cloned().collect();
        };
        if let Some(pos) = path.iter().position(|k| *k == next) {
            let mut cycle: Vec<K> = path[pos..].iter().map(|k| (*k).clone()).collect();
            cycle.push(next.clone());
            return cycle;
        }
        path.push(next);
        current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        EnumType, Extension, FunctionBuilder, ObjectKind, Table, TableBuilder, TriggerBuilder,
        TriggerEvent, uuid,
    };
    use crate::registry::register;

    fn names(objects: &[&SchemaObject]) -> Vec<String> {
        objects.iter().map(|o| o.id().to_string()).collect()
    }

    #[test]
    fn ties_break_on_kind_then_name() {
        let graph = register([
            Table::new("b").into(),
            Table::new("a").into(),
            EnumType::new("status", ["A"]).into(),
            Extension::new("pg_trgm").into(),
        ])
        .unwrap();
        let created = order(&graph, Direction::Creation).unwrap();
        assert_eq!(
            names(&created),
            ["extension pg_trgm", "enum status", "table a", "table b"]
        );
    }

    #[test]
    fn dependencies_override_kind_rank() {
        let graph = register([
            TableBuilder::new("legacy").column(uuid("id")).build().into(),
            FunctionBuilder::new("count_legacy")
                .returns("bigint")
                .depends_on(ObjectKind::Table, "legacy")
                .build()
                .into(),
        ])
        .unwrap();
        let created = order(&graph, Direction::Creation).unwrap();
        assert_eq!(names(&created), ["table legacy", "function count_legacy"]);
    }

    #[test]
    fn deletion_is_reverse_of_creation() {
        let graph = register([
            FunctionBuilder::new("legacy_audit_fn").returns("trigger").build().into(),
            TableBuilder::new("legacy")
                .column(uuid("id"))
                .trigger(TriggerBuilder::new("legacy_audit", "legacy_audit_fn").on(TriggerEvent::Delete))
                .build()
                .into(),
        ])
        .unwrap();
        let mut created = order_ids(&graph, Direction::Creation).unwrap();
        let deleted = order_ids(&graph, Direction::Deletion).unwrap();
        created.reverse();
        assert_eq!(created, deleted);
        assert_eq!(
            deleted.iter().map(ToString::to_string).collect::<Vec<_>>(),
            ["trigger legacy.legacy_audit", "table legacy", "function legacy_audit_fn"]
        );
    }

    #[test]
    fn cycles_are_reported() {
        let graph = register([
            FunctionBuilder::new("a")
                .depends_on(ObjectKind::Function, "b")
                .build()
                .into(),
            FunctionBuilder::new("b")
                .depends_on(ObjectKind::Function, "c")
                .build()
                .into(),
            FunctionBuilder::new("c")
                .depends_on(ObjectKind::Function, "a")
                .build()
                .into(),
            FunctionBuilder::new("d")
                .depends_on(ObjectKind::Function, "a")
                .build()
                .into(),
        ])
        .unwrap();

        let err = order(&graph, Direction::Creation).unwrap_err();
        let CompileError::CyclicDependency { cycle } = err else {
            panic!("expected a cycle");
        };
        assert_eq!(
            cycle,
            ["function a", "function b", "function c", "function a"]
        );
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let mut prerequisites = BTreeMap::new();
        prerequisites.insert(1, BTreeSet::from([1]));
        assert_eq!(toposort(&prerequisites), Err(vec![1, 1]));
    }

    #[test]
    fn generic_keys_use_their_ordering() {
        let mut prerequisites: BTreeMap<(u8, usize), BTreeSet<(u8, usize)>> = BTreeMap::new();
        prerequisites.insert((2, 0), BTreeSet::new());
        prerequisites.insert((1, 5), BTreeSet::from([(2, 0)]));
        prerequisites.insert((1, 1), BTreeSet::new());
        assert_eq!(
            toposort(&prerequisites).unwrap(),
            vec![(1, 1), (2, 0), (1, 5)]
        );
    }
}
