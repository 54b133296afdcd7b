use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use crate::constraint::{ConstraintDescriptor, IndexDescriptor};
use crate::field::FieldDescriptor;
use crate::graph::{Edge, TableKind, Vertex};
use crate::view::FieldView;

/// A schema-qualified name of a table or a type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QualifiedName {
    pub schema: String,
    pub name: String,
}

impl QualifiedName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self { schema: schema.into(), name: name.into() }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// One SQL-emitting concern attached to a table.
///
/// The declaration order of the variants is the order in which the emitters run. Later emitters
/// rely on side tables filled by earlier ones (for example, filter fields join on the table-type
/// record).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmitterKind {
    /// Table owner and role grants.
    Ownership,
    /// Row in `un0.table_type`, plus the related-object trigger when the table uses one.
    TableTypeRecord,
    /// `ENABLE`/`FORCE ROW LEVEL SECURITY` and the four policies.
    RowLevelSecurity,
    /// Changefeed tracking or a history table, see [`AuditMode`].
    Audit,
    /// Trigger stamping `owned_by_id`, `modified_by_id`, `created_at` and `modified_at`.
    CreatedModified,
    /// Trigger turning the first `DELETE` of a row into a soft delete.
    SoftDelete,
    /// Vertex/edge labels and the triggers keeping the graph in sync.
    Graph,
    /// Registration of the table's properties, vertex and edges as filter fields.
    FilterFields,
}

impl EmitterKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Ownership => "ownership",
            Self::TableTypeRecord => "table_type_record",
            Self::RowLevelSecurity => "row_level_security",
            Self::Audit => "audit",
            Self::CreatedModified => "created_modified",
            Self::SoftDelete => "soft_delete",
            Self::Graph => "graph",
            Self::FilterFields => "filter_fields",
        }
    }
}

/// Which row-level security policy template a table uses.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RlsPolicy {
    None,
    /// Anybody may read, only superusers may write.
    PublicRead,
    SuperuserOnly,
    /// Tenant admins see and change rows of their tenant, superusers everything.
    TenantAdmin,
    /// Owner and group based access on top of the tenant admin rules.
    Default,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditMode {
    None,
    /// Generic changefeed through `audit.enable_tracking`.
    Basic,
    /// A dedicated append-only copy of the table in the `audit` schema.
    History,
}

/// Declarative metadata for one relational table.
///
/// Built by [`crate::TableBuilder`] and immutable afterwards.
#[derive(Debug, Serialize)]
pub struct TableDescriptor {
    pub schema: String,
    pub name: String,
    pub plural_name: String,
    /// Name of the model that owns this table, unique across the registry.
    pub class_name: String,
    pub doc: Option<String>,
    #[serde(serialize_with = "map_values")]
    pub fields: IndexMap<String, FieldDescriptor>,
    #[serde(serialize_with = "map_values")]
    pub constraints: IndexMap<String, ConstraintDescriptor>,
    #[serde(serialize_with = "map_values")]
    pub indices: IndexMap<String, IndexDescriptor>,
    #[serde(serialize_with = "map_values")]
    pub views: IndexMap<String, FieldView>,
    /// Emitters in execution order, without duplicates.
    pub emitters: Vec<EmitterKind>,
    pub rls_policy: RlsPolicy,
    /// Apply policies to the table owner as well.
    pub force_rls: bool,
    pub audit: AuditMode,
    pub kind: TableKind,
}

impl TableDescriptor {
    pub fn qualified_name(&self) -> QualifiedName {
        QualifiedName::new(&self.schema, &self.name)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.get(name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn primary_key(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.values().filter(|f| f.primary_key)
    }

    pub fn foreign_keys(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.values().filter(|f| f.foreign_key.is_some())
    }

    /// Fields that end users may set directly (as opposed to server-managed ones).
    pub fn editable_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.values().filter(|f| f.editable)
    }

    pub fn has_emitter(&self, kind: EmitterKind) -> bool {
        self.emitters.contains(&kind)
    }

    pub fn vertex(&self) -> Option<&Vertex> {
        match &self.kind {
            TableKind::Normal(vertex) => Some(vertex),
            TableKind::Association(_) => None,
        }
    }

    /// All edges this table keeps in sync, whether it is a vertex or an association.
    pub fn edges(&self) -> &[Edge] {
        match &self.kind {
            TableKind::Normal(vertex) => &vertex.edges,
            TableKind::Association(edges) => edges,
        }
    }

    /// Name of the history table in the `audit` schema.
    pub fn history_table_name(&self) -> String {
        format!("{}_{}", self.schema, self.name)
    }
}

/// Writes the values of a name-keyed map as a list; every value carries its own name.
fn map_values<S: Serializer, T: Serialize>(
    map: &IndexMap<String, T>,
    serializer: S,
) -> Result<S::Ok, S::Error> {

    serializer.collect_seq(map.values())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emitter_order_is_declaration_order() {
        let mut kinds = vec![
            EmitterKind::FilterFields,
            EmitterKind::Graph,
            EmitterKind::Audit,
            EmitterKind::Ownership,
            EmitterKind::SoftDelete,
            EmitterKind::RowLevelSecurity,
            EmitterKind::CreatedModified,
            EmitterKind::TableTypeRecord,
        ];
        kinds.sort();
        assert_eq!(
            kinds,
            [
                EmitterKind::Ownership,
                EmitterKind::TableTypeRecord,
                EmitterKind::RowLevelSecurity,
                EmitterKind::Audit,
                EmitterKind::CreatedModified,
                EmitterKind::SoftDelete,
                EmitterKind::Graph,
                EmitterKind::FilterFields,
            ]
        );

    }

    #[test]
    fn qualified_name_display() {
        assert_eq!(QualifiedName::new("un0", "user").to_string(), "un0.user");
    }
}
