//! Collects schema objects into a validated dependency graph.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::declaration::DatabaseDeclaration;
use crate::error::{CompileError, Result};
use crate::graph::SchemaGraph;
use crate::model::{
    ConstraintKind, ObjectId, ObjectKind, SchemaObject, Table, TableConstraint,
};
use crate::naming::{constraint_name, index_name};
use crate::normalize::called_functions;

/// Registers a declaration.
///
/// # Errors
///
/// See [`register`].
pub fn register_declaration(decl: &DatabaseDeclaration) -> Result<SchemaGraph> {
    register(decl.objects())
}

/// Builds a [`SchemaGraph`] from a list of objects.
///
/// Tables are split into a table node plus one node per foreign key, index
/// and trigger. Unnamed constraints and indexes receive generated names,
/// custom column types naming a registered enum become enum references and
/// calls to registered functions in defaults, checks and index expressions
/// become dependency edges. Registration is pure: the same input always
/// yields the same graph.
///
/// # Errors
///
/// - [`CompileError::DuplicateName`] if two objects of the same kind share a
///   qualified name, a table repeats a column or an enum repeats a label.
/// - [`CompileError::UnknownReference`] if a reference does not resolve.
pub fn register(objects: impl IntoIterator<Item = SchemaObject>) -> Result<SchemaGraph> {
    let mut registered: BTreeMap<ObjectId, SchemaObject> = BTreeMap::new();

    for object in objects.into_iter().flat_map(split) {
        let object = with_generated_name(object);
        let id = object.id();
        if registered.contains_key(&id) {
            return Err(CompileError::duplicate(id.kind.as_str(), id.name));
        }
        registered.insert(id, object);
    }

    let enums: BTreeSet<String> = names_of(&registered, ObjectKind::Enum);
    for object in registered.values_mut() {
        if let SchemaObject::Table(table) = object {
            for column in &mut table.columns {
                column.data_type.resolve_enums(&|name| enums.contains(name));
            }
        }
    }

    let context = Context {
        objects: &registered,
        functions: names_of(&registered, ObjectKind::Function),
        extensions: registered
            .keys()
            .filter(|id| id.kind == ObjectKind::Extension)
            .cloned()
            .collect(),
    };

    let mut graph = SchemaGraph::new();
    for object in registered.values() {
        let depends_on = context.dependencies(object)?;
        graph.insert(object.clone(), depends_on);
    }

    debug!(objects = graph.len(), "registered schema graph");
    Ok(graph)
}

/// Splits a table into its node and the nodes bound to it.
fn split(object: SchemaObject) -> Vec<SchemaObject> {
    let SchemaObject::Table(mut table) = object else {
        return vec![object];
    };

    let mut parts = Vec::new();
    let (foreign_keys, inline): (Vec<_>, Vec<_>) = std::mem::take(&mut table.constraints)
        .into_iter()
        .partition(|c| matches!(c.kind, ConstraintKind::ForeignKey(_)));
    table.constraints = inline;

    for constraint in foreign_keys {
        parts.push(SchemaObject::Constraint(TableConstraint {
            table: table.name.clone(),
            constraint,
        }));
    }
    for mut index in std::mem::take(&mut table.indexes) {
        if index.table.is_empty() {
            index.table.clone_from(&table.name);
        }
        parts.push(SchemaObject::Index(index));
    }
    for mut trigger in std::mem::take(&mut table.triggers) {
        if trigger.table.is_empty() {
            trigger.table.clone_from(&table.name);
        }
        parts.push(SchemaObject::Trigger(trigger));
    }

    parts.insert(0, SchemaObject::Table(table));
    parts
}

fn with_generated_name(mut object: SchemaObject) -> SchemaObject {
    match &mut object {
        SchemaObject::Table(table) => {
            let name = table.name.clone();
            for constraint in &mut table.constraints {
                if constraint.name.is_empty() {
                    constraint.name = constraint_name(&name, &constraint.kind);
                }
            }
        }
        SchemaObject::Constraint(c) => {
            if c.constraint.name.is_empty() {
                c.constraint.name = constraint_name(&c.table, &c.constraint.kind);
            }
        }
        SchemaObject::Index(index) => {
            if index.name.is_empty() {
                index.name = index_name(index);
            }
        }
        _ => {}
    }
    object
}

fn names_of(objects: &BTreeMap<ObjectId, SchemaObject>, kind: ObjectKind) -> BTreeSet<String> {
    objects
        .keys()
        .filter(|id| id.kind == kind)
        .map(|id| id.name.clone())
        .collect()
}

struct Context<'a> {
    objects: &'a BTreeMap<ObjectId, SchemaObject>,
    functions: BTreeSet<String>,
    extensions: BTreeSet<ObjectId>,
}

impl Context<'_> {
    fn dependencies(&self, object: &SchemaObject) -> Result<BTreeSet<ObjectId>> {
        let from = object.id();
        let mut deps = BTreeSet::new();

        match object {
            SchemaObject::Extension(_) => {}
            SchemaObject::Enum(e) => {
                let mut seen = BTreeSet::new();
                for label in &e.labels {
                    if !seen.insert(label) {
                        return Err(CompileError::duplicate(
                            "enum label",
                            format!("{}.{label}", e.name),
                        ));
                    }
                }
            }
            SchemaObject::Function(f) => {
                for dep in &f.depends_on {
                    self.require(&from, dep)?;
                    deps.insert(dep.clone());
                }
            }
            SchemaObject::Table(table) => self.table_dependencies(&from, table, &mut deps)?,
            SchemaObject::Constraint(c) => {
                let table = self.require_table(&from, &c.table)?;
                deps.insert(ObjectId::table(&c.table));
                require_columns(&from, table, c.constraint.kind.columns())?;

                if let Some(fk) = c.constraint.foreign_key() {
                    let target = self.require_table(&from, &fk.references_table)?;
                    require_columns(&from, target, &fk.references_columns)?;
                    deps.insert(ObjectId::table(&fk.references_table));
                }
            }
            SchemaObject::Index(index) => {
                let table = self.require_table(&from, &index.table)?;
                deps.insert(ObjectId::table(&index.table));
                require_columns(&from, table, &index.columns)?;
                for expr in index.expression.iter().chain(&index.predicate) {
                    self.add_function_calls(expr, &mut deps);
                }
                if !index.method.is_builtin_ordered() {
                    deps.extend(self.extensions.iter().cloned());
                }
            }
            SchemaObject::Trigger(trigger) => {
                self.require_table(&from, &trigger.table)?;
                let function = ObjectId::new(ObjectKind::Function, &trigger.function);
                self.require(&from, &function)?;
                deps.insert(ObjectId::table(&trigger.table));
                deps.insert(function);
            }
        }
        Ok(deps)
    }

    fn table_dependencies(
        &self,
        from: &ObjectId,
        table: &Table,
        deps: &mut BTreeSet<ObjectId>,
    ) -> Result<()> {
        let mut seen = BTreeSet::new();
        for column in &table.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(CompileError::duplicate(
                    "column",
                    format!("{}.{}", table.name, column.name),
                ));
            }
            if let Some(name) = column.data_type.enum_name() {
                let id = ObjectId::new(ObjectKind::Enum, name);
                self.require(from, &id)?;
                deps.insert(id);
            }
            if column.data_type.custom_name().is_some() {
                deps.extend(self.extensions.iter().cloned());
            }
            if let Some(expr) = column.default.as_ref().and_then(|d| d.expression()) {
                self.add_function_calls(expr, deps);
            }
        }

        for constraint in &table.constraints {
            require_columns(from, table, constraint.kind.columns())?;
            if let ConstraintKind::Check { expression } = &constraint.kind {
                self.add_function_calls(expression, deps);
            }
        }
        Ok(())
    }

    fn add_function_calls(&self, expression: &str, deps: &mut BTreeSet<ObjectId>) {
        for name in called_functions(expression) {
            if self.functions.contains(&name) {
                deps.insert(ObjectId::new(ObjectKind::Function, name));
            }
        }
    }

    fn require(&self, from: &ObjectId, id: &ObjectId) -> Result<()> {
        if self.objects.contains_key(id) {
            Ok(())
        } else {
            Err(CompileError::unknown(
                from.to_string(),
                id.kind.as_str(),
                id.name.clone(),
            ))
        }
    }

    fn require_table(&self, from: &ObjectId, name: &str) -> Result<&Table> {
        match self.objects.get(&ObjectId::table(name)) {
            Some(SchemaObject::Table(table)) => Ok(table),
            _ => Err(CompileError::unknown(from.to_string(), "table", name)),
        }
    }
}

fn require_columns(from: &ObjectId, table: &Table, columns: &[String]) -> Result<()> {
    for column in columns {
        if table.column(column).is_none() {
            return Err(CompileError::unknown(
                from.to_string(),
                "column",
                format!("{}.{column}", table.name),
            ));
        }
    }
    Ok(())
}
