//! The declared schema as authored by the host application.

use serde::{Deserialize, Serialize};

use crate::graph::SchemaGraph;
use crate::model::{
    EnumType, Extension, Function, Index, SchemaObject, Table, TableConstraint, Trigger,
};

/// A complete schema declaration: the aggregation point a host application
/// hands to the compiler.
///
/// ```rust
/// use schemata_core::declaration::DatabaseDeclaration;
/// use schemata_core::model::{EnumType, TableBuilder, enumeration, uuid};
///
/// let decl = DatabaseDeclaration::new("immich")
///     .extension("pg_trgm")
///     .enum_type(EnumType::new("status", ["ACTIVE", "ARCHIVED"]))
///     .table(
///         TableBuilder::new("asset")
///             .column(uuid("id").primary_key())
///             .column(enumeration("status", "status").default_str("ACTIVE"))
///             .build(),
///     );
///
/// assert_eq!(decl.objects().len(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseDeclaration {
    /// Database name.
    pub name: String,
    /// Target schema.
    #[serde(default = "default_schema")]
    pub schema: String,
    /// Required extensions.
    #[serde(default)]
    pub extensions: Vec<String>,
    /// Enum types.
    #[serde(default)]
    pub enums: Vec<EnumType>,
    /// Custom functions.
    #[serde(default)]
    pub functions: Vec<Function>,
    /// Tables with their constraints, indexes and triggers.
    #[serde(default)]
    pub tables: Vec<Table>,
}

fn default_schema() -> String {
    String::from("public")
}

impl DatabaseDeclaration {
    /// Creates an empty declaration.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: default_schema(),
            extensions: Vec::new(),
            enums: Vec::new(),
            functions: Vec::new(),
            tables: Vec::new(),
        }
    }

    /// Adds a required extension.
    #[must_use]
    pub fn extension(mut self, name: impl Into<String>) -> Self {
        self.extensions.push(name.into());
        self
    }

    /// Adds an enum type.
    #[must_use]
    pub fn enum_type(mut self, enum_type: EnumType) -> Self {
        self.enums.push(enum_type);
        self
    }

    /// Adds a function.
    #[must_use]
    pub fn function(mut self, function: Function) -> Self {
        self.functions.push(function);
        self
    }

    /// Adds a table.
    #[must_use]
    pub fn table(mut self, table: Table) -> Self {
        self.tables.push(table);
        self
    }

    /// Flattens the declaration into schema objects.
    #[must_use]
    pub fn objects(&self) -> Vec<SchemaObject> {
        let extensions = self
            .extensions
            .iter()
            .map(|name| SchemaObject::Extension(Extension::new(name)));
        let enums = self.enums.iter().cloned().map(SchemaObject::Enum);
        let functions = self.functions.iter().cloned().map(SchemaObject::Function);
        let tables = self.tables.iter().cloned().map(SchemaObject::Table);
        extensions.chain(enums).chain(functions).chain(tables).collect()
    }
}

impl SchemaGraph {
    /// Converts the graph back into a declaration, re-attaching foreign
    /// keys, indexes and triggers to their tables.
    #[must_use]
    pub fn to_declaration(&self, name: &str) -> DatabaseDeclaration {
        let mut decl = DatabaseDeclaration::new(name);
        let mut constraints: Vec<&TableConstraint> = Vec::new();
        let mut indexes: Vec<&Index> = Vec::new();
        let mut triggers: Vec<&Trigger> = Vec::new();

        for object in self.objects() {
            match object {
                SchemaObject::Extension(e) => decl.extensions.push(e.name.clone()),
                SchemaObject::Enum(e) => decl.enums.push(e.clone()),
                SchemaObject::Function(f) => decl.functions.push(f.clone()),
                SchemaObject::Table(t) => decl.tables.push(t.clone()),
                SchemaObject::Constraint(c) => constraints.push(c),
                SchemaObject::Index(i) => indexes.push(i),
                SchemaObject::Trigger(t) => triggers.push(t),
            }
        }

        for table in &mut decl.tables {
            table.constraints.extend(
                constraints
                    .iter()
                    .filter(|c| c.table == table.name)
                    .map(|c| c.constraint.clone()),
            );
            table
                .indexes
                .extend(indexes.iter().filter(|i| i.table == table.name).map(|i| (*i).clone()));
            table
                .triggers
                .extend(triggers.iter().filter(|t| t.table == table.name).map(|t| (*t).clone()));
        }
        decl
    }
}
