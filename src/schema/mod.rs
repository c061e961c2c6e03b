//! Schema stratum: descriptors, DDL builders, and the schema differ.

pub mod ddl;
pub mod descriptor;
pub mod differ;

pub use descriptor::{
    ColumnDescriptor, IndexDescriptor, RoutineDescriptor, RoutineKind, TableDescriptor,
};
pub use differ::{SchemaDiffer, SchemaTickReport};
