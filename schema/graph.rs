//! The property graph projected from the relational tables.
//!
//! Every vertex table becomes a vertex label and each of its rows a vertex keyed by its id. Foreign
//! keys annotated with [`crate::EdgeLabels`] become edges. Tables that only link other tables
//! (associations) do not get a label of their own: each row becomes one or more edges between the
//! rows it references.

use indexmap::IndexMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use crate::field::{DataType, FieldDescriptor};
use crate::ident::vertex_label;
use crate::table::QualifiedName;

/// A column copied into the graph as a vertex or edge property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub data_type: DataType,
}

impl From<&FieldDescriptor> for Property {
    fn from(field: &FieldDescriptor) -> Self {
        Self { name: field.name.clone(), data_type: field.data_type.clone() }
    }
}

/// Foreign keys become edges instead. JSON documents have no Cypher map syntax and stay out of
/// the graph.
fn is_property(field: &FieldDescriptor) -> bool {
    !field.is_foreign_key() && field.data_type != DataType::Json
}

/// One end of an edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeEnd {
    /// Vertex label of the end.
    pub label: String,
    /// Table holding the vertices of that label.
    pub table: QualifiedName,
    /// Column of the row that triggers the edge holding the id of this end's vertex.
    pub column: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub label: String,
    pub start: EdgeEnd,
    pub end: EdgeEnd,
    pub properties: Vec<Property>,
    /// Primary key of the row an association edge comes from. Several rows may link the same
    /// two vertices with the same label, so their edges are told apart by these.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vertex {
    pub label: String,
    pub table: QualifiedName,
    pub id_column: String,
    pub properties: Vec<Property>,
    pub edges: Vec<Edge>,
}

/// How a table shows up in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Normal(Vertex),
    Association(Vec<Edge>),
}

impl TableKind {
    pub(crate) fn vertex(
        table: &QualifiedName,
        id_column: &str,
        fields: &IndexMap<String, FieldDescriptor>,
    ) -> Self {
        let label = vertex_label(&table.name);
        let this = EdgeEnd { label: label.clone(), table: table.clone(), column: id_column.into() };
        let properties = fields
            .values()
            .filter(|f| f.name == id_column || is_property(f))
            .map(Property::from)
            .collect();

        let mut edges = vec![];
        for field in fields.values() {
            let (fk, labels) = match (&field.foreign_key, field.edge_labels()) {
                (Some(fk), Some(labels)) => (fk, labels),
                _ => continue,
            };
            let target = EdgeEnd {
                label: vertex_label(&fk.table.name),
                table: fk.table.clone(),
                column: field.name.clone(),
            };
            edges.push(Edge {
                label: labels.forward.clone(),
                start: this.clone(),
                end: target.clone(),
                properties: vec![],
                keys: vec![],
            });
            if let Some(reverse) = &labels.reverse {
                edges.push(Edge {
                    label: reverse.clone(),
                    start: target,
                    end: this.clone(),
                    properties: vec![],
                    keys: vec![],
                });
            }
        }

        TableKind::Normal(Vertex {
            label,
            table: table.clone(),
            id_column: id_column.into(),
            properties,
            edges,
        })
    }

    pub(crate) fn association(fields: &IndexMap<String, FieldDescriptor>) -> Self {
        let keys: Vec<&FieldDescriptor> = fields.values().filter(|f| f.is_foreign_key()).collect();
        let row_key: Vec<String> =
            fields.values().filter(|f| f.primary_key).map(|f| f.name.clone()).collect();

        let properties: Vec<Property> = fields
            .values()
            .filter(|f| row_key.contains(&f.name) || is_property(f))
            .map(Property::from)
            .collect();

        let mut edges = vec![];
        for pair in keys.iter().permutations(2) {
            let (a, b) = (pair[0], pair[1]);
            let (a_fk, b_fk, labels) = match (&a.foreign_key, &b.foreign_key, b.edge_labels()) {
                (Some(a_fk), Some(b_fk), Some(labels)) => (a_fk, b_fk, labels),
                _ => continue,
            };
            edges.push(Edge {
                label: labels.forward.clone(),
                start: EdgeEnd {
                    label: vertex_label(&a_fk.table.name),
                    table: a_fk.table.clone(),
                    column: a.name.clone(),
                },
                end: EdgeEnd {
                    label: vertex_label(&b_fk.table.name),
                    table: b_fk.table.clone(),
                    column: b.name.clone(),
                },
                properties: properties.clone(),
                keys: row_key.clone(),
            });
        }
        TableKind::Association(edges)
    }
}
