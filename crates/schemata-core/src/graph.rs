//! The registered schema graph.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{EnumType, Function, ObjectId, ObjectKind, SchemaObject, Table};

/// A registered object and the objects it depends on.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// The object.
    pub object: SchemaObject,
    /// Objects that must exist before this one.
    pub depends_on: BTreeSet<ObjectId>,
}

/// Every object of a schema keyed by identity, with dependency edges.
///
/// Built by [`register`](crate::registry::register); every dependency of a
/// node is itself a node of the graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaGraph {
    nodes: BTreeMap<ObjectId, Node>,
}

impl SchemaGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, object: SchemaObject, depends_on: BTreeSet<ObjectId>) {
        self.nodes.insert(object.id(), Node { object, depends_on });
    }

    /// Number of objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the graph has no objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns `true` if the graph holds `id`.
    #[must_use]
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Looks up an object.
    #[must_use]
    pub fn get(&self, id: &ObjectId) -> Option<&SchemaObject> {
        self.nodes.get(id).map(|n| &n.object)
    }

    /// Looks up a node.
    #[must_use]
    pub fn node(&self, id: &ObjectId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Iterates over nodes in identity order.
    pub fn nodes(&self) -> impl Iterator<Item = (&ObjectId, &Node)> {
        self.nodes.iter()
    }

    /// Iterates over object identities in identity order.
    pub fn ids(&self) -> impl Iterator<Item = &ObjectId> {
        self.nodes.keys()
    }

    /// Iterates over objects in identity order.
    pub fn objects(&self) -> impl Iterator<Item = &SchemaObject> {
        self.nodes.values().map(|n| &n.object)
    }

    /// Direct dependencies of `id`.
    #[must_use]
    pub fn depends_on(&self, id: &ObjectId) -> Option<&BTreeSet<ObjectId>> {
        self.nodes.get(id).map(|n| &n.depends_on)
    }

    /// Objects that directly depend on `id`.
    #[must_use]
    pub fn dependents(&self, id: &ObjectId) -> Vec<&ObjectId> {
        self.nodes
            .iter()
            .filter(|(_, node)| node.depends_on.contains(id))
            .map(|(other, _)| other)
            .collect()
    }

    /// Looks up a table node.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&Table> {
        match self.get(&ObjectId::table(name)) {
            Some(SchemaObject::Table(table)) => Some(table),
            _ => None,
        }
    }

    /// Looks up an enum type.
    #[must_use]
    pub fn enum_type(&self, name: &str) -> Option<&EnumType> {
        match self.get(&ObjectId::new(ObjectKind::Enum, name)) {
            Some(SchemaObject::Enum(e)) => Some(e),
            _ => None,
        }
    }

    /// Looks up a function.
    #[must_use]
    pub fn function(&self, name: &str) -> Option<&Function> {
        match self.get(&ObjectId::new(ObjectKind::Function, name)) {
            Some(SchemaObject::Function(f)) => Some(f),
            _ => None,
        }
    }

    /// Objects bound to table `name` (foreign keys, indexes, triggers).
    pub fn table_objects<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a SchemaObject> {
        self.objects()
            .filter(move |object| object.owning_table() == Some(name))
    }

    /// Consumes the graph, returning its objects in identity order.
    #[must_use]
    pub fn into_objects(self) -> Vec<SchemaObject> {
        self.nodes.into_values().map(|n| n.object).collect()
    }

    /// Removes every object for which `keep` returns `false`, together with
    /// the edges pointing at it.
    pub fn retain(&mut self, mut keep: impl FnMut(&SchemaObject) -> bool) {
        self.nodes.retain(|_, node| keep(&node.object));
        let ids: BTreeSet<ObjectId> = self.nodes.keys().cloned().collect();
        for node in self.nodes.values_mut() {
            node.depends_on.retain(|dep| ids.contains(dep));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Extension;

    fn graph() -> SchemaGraph {
        let mut graph = SchemaGraph::new();
        graph.insert(Extension::new("plpgsql").into(), BTreeSet::new());
        graph.insert(Extension::new("pg_trgm").into(), BTreeSet::new());
        graph.insert(
            Table::new("person").into(),
            [ObjectId::new(ObjectKind::Extension, "pg_trgm")].into(),
        );
        graph
    }

    #[test]
    fn dependents_are_reverse_edges() {
        let graph = graph();
        let trgm = ObjectId::new(ObjectKind::Extension, "pg_trgm");
        assert_eq!(graph.dependents(&trgm), vec![&ObjectId::table("person")]);
        assert!(graph.table("person").is_some());
        assert!(graph.table("missing").is_none());
    }

    #[test]
    fn retain_drops_dangling_edges() {
        let mut graph = graph();
        graph.retain(|o| o.kind() != ObjectKind::Extension);
        assert_eq!(graph.len(), 1);
        assert!(graph
            .depends_on(&ObjectId::table("person"))
            .is_some_and(BTreeSet::is_empty));
    }
}
