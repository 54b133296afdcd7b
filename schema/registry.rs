use indexmap::IndexMap;
use petgraph::graphmap::DiGraphMap;
use petgraph::visit::DfsPostOrder;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use crate::error::{ConfigurationError, RegistryError};
use crate::graph::Vertex;
use crate::table::{QualifiedName, TableDescriptor};

/// A PostgreSQL enum type created during bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumType {
    pub name: QualifiedName,
    pub variants: Vec<String>,
}

impl EnumType {
    pub fn new<S: Into<String>>(
        name: QualifiedName,
        variants: impl IntoIterator<Item = S>,
    ) -> Self {
        Self { name, variants: variants.into_iter().map(Into::into).collect() }
    }
}

/// Every table (and enum type) the compiler knows about.
///
/// Filled once at startup, read-only afterwards.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    tables: IndexMap<QualifiedName, Arc<TableDescriptor>>,
    class_names: HashMap<String, QualifiedName>,
    enums: IndexMap<QualifiedName, EnumType>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        table: TableDescriptor,
    ) -> Result<Arc<TableDescriptor>, RegistryError> {

        let name = table.qualified_name();
        if self.tables.contains_key(&name) {
            return Err(RegistryError::TableNameExists(name));
        }
        if let Some(existing) = self.class_names.get(&table.class_name) {
            return Err(RegistryError::ClassNameExists {
                class_name: table.class_name.clone(),
                table: existing.clone(),
            });
        }
        self.class_names.insert(table.class_name.clone(), name.clone());
        let table = Arc::new(table);
        self.tables.insert(name, table.clone());
        Ok(table)
    }

    pub fn register_enum(&mut self, enum_type: EnumType) -> Result<(), RegistryError> {
        if self.enums.contains_key(&enum_type.name) {
            return Err(RegistryError::TableNameExists(enum_type.name));
        }
        self.enums.insert(enum_type.name.clone(), enum_type);
        Ok(())
    }

    pub fn get(&self, name: &QualifiedName) -> Option<&Arc<TableDescriptor>> {
        self.tables.get(name)
    }

    pub fn lookup(&self, name: &QualifiedName) -> Result<&Arc<TableDescriptor>, RegistryError> {
        self.get(name).ok_or_else(|| RegistryError::NoSuchTable(name.clone()))
    }

    pub fn get_by_class(&self, class_name: &str) -> Option<&Arc<TableDescriptor>> {
        self.class_names.get(class_name).and_then(|name| self.tables.get(name))
    }

    /// Tables in registration order.
    pub fn tables(&self) -> impl Iterator<Item = &Arc<TableDescriptor>> {
        self.tables.values()
    }

    pub fn enums(&self) -> impl Iterator<Item = &EnumType> {
        self.enums.values()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// The vertex of `table`, if it is registered and is a vertex table.
    pub fn vertex(&self, table: &QualifiedName) -> Option<&Vertex> {
        self.get(table).and_then(|t| t.vertex())
    }

    /// Tables ordered so that foreign key targets come before the tables referencing them.
    ///
    /// Self-references and cycles are tolerated: the members of a cycle keep their relative
    /// registration order. Targets that are not registered are ignored.
    pub fn dependency_order(&self) -> Vec<&Arc<TableDescriptor>> {
        let mut graph = DiGraphMap::<usize, ()>::new();
        for (i, table) in self.tables.values().enumerate() {
            graph.add_node(i);
            for fk in table.fields.values().filter_map(|f| f.foreign_key.as_ref()) {
                if let Some(j) = self.tables.get_index_of(&fk.table) {
                    if i != j {
                        graph.add_edge(i, j, ());
                    }
                }
            }
        }

        let mut seen = HashSet::new();
        let mut order = Vec::with_capacity(self.tables.len());
        for root in 0..self.tables.len() {
            if seen.contains(&root) {
                continue;
            }
            let mut dfs = DfsPostOrder::new(&graph, root);
            while let Some(i) = dfs.next(&graph) {
                if seen.insert(i) {
                    order.push(i);
                }
            }
        }
        order.into_iter().filter_map(|i| self.tables.get_index(i).map(|(_, t)| t)).collect()
    }

    /// Checks what can only be checked once all tables are known.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for table in self.tables.values() {
            let name = table.qualified_name();
            for field in table.fields.values() {
                if let Some(type_name) = field.data_type.enum_name() {
                    if !self.enums.contains_key(type_name) {
                        return Err(ConfigurationError::UnknownEnum {
                            table: name,
                            column: field.name.clone(),
                            type_name: type_name.clone(),
                        });
                    }
                }
                let fk = match &field.foreign_key {
                    Some(fk) => fk,
                    None => continue,
                };
                let target = self.tables.get(&fk.table).ok_or_else(|| {
                    ConfigurationError::UnknownForeignKeyTarget {
                        table: name.clone(),
                        column: field.name.clone(),
                        target: fk.table.clone(),
                    }
                })?;
                if !target.has_field(&fk.column) {
                    return Err(ConfigurationError::UnknownForeignKeyColumn {
                        table: name,
                        column: field.name.clone(),
                        target: fk.table.clone(),
                        target_column: fk.column.clone(),
                    });
                }
            }
        }

        let mut vertex_labels: HashMap<&str, QualifiedName> = HashMap::new();
        for vertex in self.tables.values().filter_map(|t| t.vertex()) {
            if let Some(first) = vertex_labels.insert(&vertex.label, vertex.table.clone()) {
                return Err(ConfigurationError::DuplicateVertexLabel {
                    label: vertex.label.clone(),
                    first,
                    second: vertex.table.clone(),
                });
            }
        }

        let mut edges = HashSet::new();
        for table in self.tables.values() {
            for edge in table.edges() {
                if vertex_labels.contains_key(edge.label.as_str()) {
                    return Err(ConfigurationError::EdgeLabelIsVertexLabel {
                        label: edge.label.clone(),
                        table: table.qualified_name(),
                    });
                }
                if !edges.insert((&edge.start.label, &edge.label, &edge.end.label)) {
                    return Err(ConfigurationError::DuplicateEdge {
                        label: edge.label.clone(),
                        start: edge.start.label.clone(),
                        end: edge.end.label.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}
