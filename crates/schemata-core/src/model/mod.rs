//! Object model of a declared or introspected schema.
//!
//! Schemas are plain data. They are either constructed with the fluent
//! builders in this module or deserialized from JSON.

mod column;
mod object;
mod routine;
mod table;
mod types;

pub use column::{
    bigint, boolean, enumeration, integer, jsonb, text, timestamptz, uuid, varchar, Column,
    ColumnBuilder, DefaultValue, ForeignKeyAction,
};
pub use object::{EnumType, Extension, ObjectId, ObjectKind, SchemaObject};
pub use routine::{
    Function, FunctionBuilder, ParallelSafety, Trigger, TriggerBuilder, TriggerEvent,
    TriggerScope, TriggerTiming, Volatility,
};
pub use table::{
    Constraint, ConstraintKind, ForeignKeyRef, Index, IndexBuilder, IndexMethod, Table,
    TableBuilder, TableConstraint,
};
pub use types::{DataType, ParseTypeError};
