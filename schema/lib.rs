//! Declarative metadata for un0 tables.
//!
//! Everything in this crate is plain data: descriptors are assembled with [`TableBuilder`],
//! validated once, and then shared read-only through a [`SchemaRegistry`]. Turning this metadata
//! into SQL is the job of the `un0-datastore` crate.

pub mod bundle;
pub mod constraint;
mod error;
pub mod field;
pub mod graph;
mod ident;
pub mod models;
pub mod registry;
pub mod table;
pub mod view;

pub use crate::bundle::{Bundle, TableBuilder};
pub use crate::constraint::{ConstraintDescriptor, ConstraintKind, IndexDescriptor};
pub use crate::error::{ConfigurationError, RegistryError};
pub use crate::field::{
    DataType, DefaultValue, EdgeLabels, FieldDescriptor, ForeignKey, LookupFamily, OnDelete,
};
pub use crate::graph::{Edge, EdgeEnd, Property, TableKind, Vertex};
pub use crate::ident::{is_valid_identifier, is_valid_label, vertex_label};
pub use crate::models::{register_builtin, standard_table, BuiltinError};
pub use crate::registry::{EnumType, SchemaRegistry};
pub use crate::table::{AuditMode, EmitterKind, QualifiedName, RlsPolicy, TableDescriptor};
pub use crate::view::FieldView;
