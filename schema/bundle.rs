//! Composition of table descriptors out of reusable bundles of fields and emitters.

use indexmap::IndexMap;
use log::warn;
use crate::constraint::{self, ConstraintDescriptor, IndexDescriptor};
use crate::error::ConfigurationError;
use crate::field::{DataType, DefaultValue, FieldDescriptor};
use crate::graph::TableKind;
use crate::ident::{is_valid_identifier, is_valid_label};
use crate::table::{AuditMode, EmitterKind, QualifiedName, RlsPolicy, TableDescriptor};
use crate::view::FieldView;

/// A named, reusable set of fields, constraints, indices and emitters.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
    pub constraints: Vec<ConstraintDescriptor>,
    pub indices: Vec<IndexDescriptor>,
    pub emitters: Vec<EmitterKind>,
    pub rls: Option<RlsPolicy>,
    pub audit: Option<AuditMode>,
}

impl Bundle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: vec![],
            constraints: vec![],
            indices: vec![],
            emitters: vec![],
            rls: None,
            audit: None,
        }
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn emitter(mut self, kind: EmitterKind) -> Self {
        self.emitters.push(kind);
        self
    }

    pub fn rls(mut self, policy: RlsPolicy) -> Self {
        self.rls = Some(policy);
        self
    }

    pub fn audit(mut self, audit: AuditMode) -> Self {
        self.audit = Some(audit);
        self
    }

    /// ULID primary key generated by the database.
    pub fn id() -> Self {
        Bundle::new("id").field(
            FieldDescriptor::new("id", DataType::Ulid)
                .primary_key()
                .default(DefaultValue::GenerateUlid)
                .editable(false),
        )
    }

    /// Primary key shared with a row of `un0.related_object`, filled in by a trigger.
    pub fn related_object() -> Self {
        Bundle::new("related_object").field(
            FieldDescriptor::new("id", DataType::Ulid)
                .primary_key()
                .references(QualifiedName::new("un0", "related_object"), "id")
                .editable(false),
        )
    }

    /// Who owns and who last modified the row, and when.
    pub fn tracking() -> Self {
        let user = QualifiedName::new("un0", "user");
        Bundle::new("tracking")
            .field(
                FieldDescriptor::new("owned_by_id", DataType::Ulid)
                    .index()
                    .references(user.clone(), "id")
                    .edge("OWNED_BY", Some("OWNS"))
                    .editable(false),
            )
            .field(
                FieldDescriptor::new("created_at", DataType::Timestamp)
                    .default(DefaultValue::Now)
                    .editable(false),
            )
            .field(
                FieldDescriptor::new("modified_by_id", DataType::Ulid)
                    .index()
                    .references(user, "id")
                    .edge("LAST_MODIFIED_BY", Some("LAST_MODIFIED"))
                    .editable(false),
            )
            .field(
                FieldDescriptor::new("modified_at", DataType::Timestamp)
                    .default(DefaultValue::Now)
                    .editable(false),
            )
            .emitter(EmitterKind::CreatedModified)
    }

    pub fn soft_delete() -> Self {
        Bundle::new("soft_delete")
            .field(
                FieldDescriptor::new("is_deleted", DataType::Boolean)
                    .not_null()
                    .index()
                    .default(DefaultValue::Bool(false))
                    .editable(false),
            )
            .field(FieldDescriptor::new("deleted_at", DataType::Timestamp).editable(false))
            .field(
                FieldDescriptor::new("deleted_by_id", DataType::Ulid)
                    .index()
                    .references(QualifiedName::new("un0", "user"), "id")
                    .edge("DELETED_BY", None)
                    .editable(false),
            )
            .emitter(EmitterKind::SoftDelete)
    }

    pub fn tenant() -> Self {
        Bundle::new("tenant").field(
            FieldDescriptor::new("tenant_id", DataType::Ulid)
                .index()
                .references(QualifiedName::new("un0", "tenant"), "id")
                .edge("IS_OWNED_BY_TENANT", Some("OWNS")),
        )
    }

    pub fn group() -> Self {
        Bundle::new("group").field(
            FieldDescriptor::new("group_id", DataType::Ulid)
                .index()
                .references(QualifiedName::new("un0", "group"), "id")
                .edge("IS_ACCESSIBLE_BY", Some("HAS_ACCESS_TO")),
        )
    }

    pub fn active() -> Self {
        Bundle::new("active").field(
            FieldDescriptor::new("is_active", DataType::Boolean)
                .not_null()
                .index()
                .default(DefaultValue::Bool(true)),
        )
    }

    /// The emitters every un0 table gets.
    pub fn base() -> Self {
        Bundle::new("base")
            .emitter(EmitterKind::Ownership)
            .emitter(EmitterKind::TableTypeRecord)
            .emitter(EmitterKind::Graph)
            .emitter(EmitterKind::FilterFields)
            .audit(AuditMode::Basic)
    }
}

/// Assembles a [`TableDescriptor`] and validates it.
#[derive(Debug)]
pub struct TableBuilder {
    schema: String,
    name: String,
    plural_name: Option<String>,
    class_name: Option<String>,
    doc: Option<String>,
    fields: IndexMap<String, FieldDescriptor>,
    field_sources: IndexMap<String, String>,
    constraints: Vec<ConstraintDescriptor>,
    indices: Vec<IndexDescriptor>,
    views: Vec<FieldView>,
    emitters: Vec<EmitterKind>,
    rls_policy: RlsPolicy,
    force_rls: bool,
    audit: AuditMode,
    vertex: bool,
}

impl TableBuilder {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            plural_name: None,
            class_name: None,
            doc: None,
            fields: IndexMap::new(),
            field_sources: IndexMap::new(),
            constraints: vec![],
            indices: vec![],
            views: vec![],
            emitters: vec![],
            rls_policy: RlsPolicy::None,
            force_rls: true,
            audit: AuditMode::None,
            vertex: true,
        }
    }

    pub fn class_name(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = Some(class_name.into());
        self
    }

    pub fn plural_name(mut self, plural_name: impl Into<String>) -> Self {
        self.plural_name = Some(plural_name.into());
        self
    }

    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Merges a bundle. Later bundles and fields override earlier fields of the same name, which
    /// keep their position.
    pub fn with(mut self, bundle: &Bundle) -> Self {
        for field in &bundle.fields {
            self.merge_field(field.clone(), &bundle.name);
        }
        self.constraints.extend(bundle.constraints.iter().cloned());
        self.indices.extend(bundle.indices.iter().cloned());
        self.emitters.extend(bundle.emitters.iter().copied());
        if let Some(rls) = bundle.rls {
            self.rls_policy = rls;
        }
        if let Some(audit) = bundle.audit {
            self.audit = audit;
        }
        self
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.merge_field(field, "table");
        self
    }

    fn merge_field(&mut self, field: FieldDescriptor, source: &str) {
        if let Some(previous) = self.field_sources.insert(field.name.clone(), source.into()) {
            warn!(
                "{}.{}: field `{}` from {} overrides the one from {}",
                self.schema, self.name, field.name, source, previous
            );
        }
        self.fields.insert(field.name.clone(), field);
    }

    pub fn constraint(mut self, constraint: ConstraintDescriptor) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn index(mut self, index: IndexDescriptor) -> Self {
        self.indices.push(index);
        self
    }

    pub fn view(mut self, view: FieldView) -> Self {
        self.views.push(view);
        self
    }

    pub fn emitter(mut self, kind: EmitterKind) -> Self {
        self.emitters.push(kind);
        self
    }

    pub fn rls(mut self, policy: RlsPolicy) -> Self {
        self.rls_policy = policy;
        self
    }

    pub fn force_rls(mut self, force: bool) -> Self {
        self.force_rls = force;
        self
    }

    pub fn audit(mut self, audit: AuditMode) -> Self {
        self.audit = audit;
        self
    }

    /// Whether rows of this table are graph vertices (the default) or only link other vertices.
    pub fn vertex(mut self, vertex: bool) -> Self {
        self.vertex = vertex;
        self
    }

    pub fn build(self) -> Result<TableDescriptor, ConfigurationError> {
        let qualified = QualifiedName::new(&self.schema, &self.name);
        for ident in [&self.schema, &self.name] {
            check_identifier(ident)?;
        }

        for field in self.fields.values() {
            check_identifier(&field.name)?;
            if let Some(labels) = &field.edge {
                if field.foreign_key.is_none() {
                    return Err(ConfigurationError::EdgeWithoutForeignKey {
                        table: qualified.clone(),
                        column: field.name.clone(),
                    });
                }
                for label in std::iter::once(&labels.forward).chain(labels.reverse.iter()) {
                    if !is_valid_label(label) {
                        return Err(ConfigurationError::InvalidLabel(label.clone()));
                    }
                }
            }
        }

        // Implicit names share a namespace with the declared constraints and indices.
        let mut names: Vec<String> = vec![constraint::primary_key_name(&self.name)];
        for field in self.fields.values() {
            if field.unique {
                names.push(constraint::unique_key_name(&self.name, &field.name));
            }
            if field.is_foreign_key() {
                names.push(constraint::foreign_key_name(&self.name, &field.name));
            }
            if field.index {
                names.push(constraint::index_name(&self.name, &field.name));
            }
        }

        let mut constraints = IndexMap::new();
        for c in self.constraints {
            check_identifier(&c.name)?;
            check_columns(&qualified, &self.fields, c.columns(), &c.name)?;
            if names.contains(&c.name) || constraints.contains_key(&c.name) {
                return Err(ConfigurationError::DuplicateConstraintName {
                    table: qualified,
                    name: c.name,
                });
            }
            constraints.insert(c.name.clone(), c);
        }

        let mut indices = IndexMap::new();
        for i in self.indices {
            check_identifier(&i.name)?;
            check_columns(&qualified, &self.fields, &i.columns, &i.name)?;
            if names.contains(&i.name)
                || constraints.contains_key(&i.name)
                || indices.contains_key(&i.name)
            {

                return Err(ConfigurationError::DuplicateConstraintName {
                    table: qualified,
                    name: i.name,
                });
            }
            indices.insert(i.name.clone(), i);
        }

        let pk: Vec<&FieldDescriptor> = self.fields.values().filter(|f| f.primary_key).collect();
        let kind = match (self.vertex, pk.as_slice()) {
            (_, []) => return Err(ConfigurationError::MissingPrimaryKey(qualified)),
            (true, [id]) => TableKind::vertex(&qualified, &id.name, &self.fields),
            (true, _) => return Err(ConfigurationError::CompositeVertexKey(qualified)),
            (false, _) => TableKind::association(&self.fields),
        };

        let mut emitters = self.emitters;
        if self.rls_policy != RlsPolicy::None {
            emitters.push(EmitterKind::RowLevelSecurity);
        }
        if self.audit != AuditMode::None {
            emitters.push(EmitterKind::Audit);
        }
        emitters.sort();
        emitters.dedup();

        let plural_name = self.plural_name.unwrap_or_else(|| format!("{}s", self.name));
        let class_name = self.class_name.unwrap_or_else(|| crate::ident::vertex_label(&self.name));
        let mut table = TableDescriptor {
            schema: self.schema,
            name: self.name,
            plural_name,
            class_name,
            doc: self.doc,
            fields: self.fields,
            constraints,
            indices,
            views: IndexMap::new(),
            emitters,
            rls_policy: self.rls_policy,
            force_rls: self.force_rls,
            audit: self.audit,
            kind,
        };

        for view in self.views {
            view.resolve(&table)?;
            if table.views.contains_key(&view.name) {
                return Err(ConfigurationError::DuplicateView {
                    table: table.qualified_name(),
                    view: view.name,
                });
            }
            table.views.insert(view.name.clone(), view);
        }
        Ok(table)
    }
}

fn check_identifier(ident: &str) -> Result<(), ConfigurationError> {
    if is_valid_identifier(ident) {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidIdentifier(ident.into()))
    }
}

fn check_columns(
    table: &QualifiedName,
    fields: &IndexMap<String, FieldDescriptor>,
    columns: &[String],
    context: &str,
) -> Result<(), ConfigurationError> {
    match columns.iter().find(|c| !fields.contains_key(*c)) {
        Some(column) => Err(ConfigurationError::UnknownColumn {
            table: table.clone(),
            column: column.clone(),
            context: context.into(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widget() -> TableBuilder {
        TableBuilder::new("app", "widget").with(&Bundle::id())
    }

    #[test]
    fn last_writer_wins_and_keeps_position() {
        let table = widget()
            .with(&Bundle::tracking())
            .field(FieldDescriptor::new("name", DataType::Text))
            .field(FieldDescriptor::new("owned_by_id", DataType::Text))
            .build()
            .unwrap();
        let names: Vec<_> = table.fields.keys().map(String::as_str).collect();
        assert_eq!(
            names,
            ["id", "owned_by_id", "created_at", "modified_by_id", "modified_at", "name"]
        );

        assert_eq!(table.fields["owned_by_id"].data_type, DataType::Text);
        assert!(!table.fields["owned_by_id"].is_foreign_key());
    }

    #[test]
    fn emitters_are_normalized() {
        let table = widget()
            .with(&Bundle::base())
            .with(&Bundle::tracking())
            .with(&Bundle::soft_delete())
            .emitter(EmitterKind::Ownership)
            .rls(RlsPolicy::PublicRead)
            .build()
            .unwrap();
        assert_eq!(table.emitters, [
            EmitterKind::Ownership,
            EmitterKind::TableTypeRecord,
            EmitterKind::RowLevelSecurity,
            EmitterKind::Audit,
            EmitterKind::CreatedModified,
            EmitterKind::SoftDelete,
            EmitterKind::Graph,
            EmitterKind::FilterFields,
        ]);
        assert_eq!(table.audit, AuditMode::Basic);
        assert!(table.force_rls);
    }

    #[test]
    fn duplicate_constraint_names() {
        let err = widget()
            .field(FieldDescriptor::new("code", DataType::Text).unique())
            .constraint(ConstraintDescriptor::unique("widget_code_key", ["code"]))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::DuplicateConstraintName { .. }));

        let err = widget()
            .field(FieldDescriptor::new("code", DataType::Text))
            .constraint(ConstraintDescriptor::check("code_not_empty", "code <> ''"))
            .index(IndexDescriptor::new("code_not_empty", ["code"]))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::DuplicateConstraintName { .. }));
    }

    #[test]
    fn validation() {
        assert_eq!(
            TableBuilder::new("app", "Widget").with(&Bundle::id()).build().unwrap_err(),
            ConfigurationError::InvalidIdentifier("Widget".into())
        );
        assert_eq!(
            TableBuilder::new("app", "widget").build().unwrap_err(),
            ConfigurationError::MissingPrimaryKey(QualifiedName::new("app", "widget"))
        );
        let err = widget()
            .field(FieldDescriptor::new("other", DataType::Integer).primary_key())
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::CompositeVertexKey(_)));
        let err = widget()
            .field(FieldDescriptor::new("parent", DataType::Ulid).edge("CHILD_OF", None))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::EdgeWithoutForeignKey { .. }));
        let err = widget()
            .field(FieldDescriptor::new("parent_id", DataType::Ulid)
                .references(QualifiedName::new("app", "widget"), "id")
                .edge("CHILD-OF", None))
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigurationError::InvalidLabel("CHILD-OF".into()));
        let err = widget()
            .index(IndexDescriptor::new("widget_colour_idx", ["colour"]))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownColumn { .. }));
    }

    #[test]
    fn views_are_checked() {
        let err = widget()
            .field(FieldDescriptor::new("name", DataType::Text))
            .view(FieldView::new("summary").include(["name", "name"]))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::DuplicateInList { .. }));
        let err = widget()
            .view(FieldView::new("summary"))
            .view(FieldView::new("summary"))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::DuplicateView { .. }));
    }

    #[test]
    fn defaults() {
        let table = widget().build().unwrap();
        assert_eq!(table.plural_name, "widgets");
        assert_eq!(table.class_name, "Widget");
        assert!(table.emitters.is_empty());
    }
}
