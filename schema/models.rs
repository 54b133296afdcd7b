//! The tables un0 itself needs: authorization, related objects and filter fields.

use crate::bundle::{Bundle, TableBuilder};
use crate::constraint::{ConstraintDescriptor, IndexDescriptor};
use crate::error::{ConfigurationError, RegistryError};
use crate::field::{DataType, DefaultValue, FieldDescriptor, OnDelete};
use crate::registry::{EnumType, SchemaRegistry};
use crate::table::{EmitterKind, QualifiedName, RlsPolicy, TableDescriptor};

pub const UN0_SCHEMA: &str = "un0";

pub fn un0(name: &str) -> QualifiedName {
    QualifiedName::new(UN0_SCHEMA, name)
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BuiltinError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// The builder most application tables start from: ULID key, tenant and group, ownership
/// tracking, soft delete, the standard emitters and the default RLS policy.
pub fn standard_table(schema: &str, name: &str) -> TableBuilder {
    TableBuilder::new(schema, name)
        .with(&Bundle::id())
        .with(&Bundle::tenant())
        .with(&Bundle::group())
        .with(&Bundle::active())
        .with(&Bundle::tracking())
        .with(&Bundle::soft_delete())
        .with(&Bundle::base())
        .rls(RlsPolicy::Default)
}

/// Registers the enum types and tables every un0 database has.
pub fn register_builtin(registry: &mut SchemaRegistry) -> Result<(), BuiltinError> {
    registry.register_enum(EnumType::new(
        un0("permission_name"),
        ["SELECT", "INSERT", "UPDATE", "DELETE"],
    ))?;
    registry.register_enum(EnumType::new(
        un0("tenant_type"),
        ["INDIVIDUAL", "SMALL_BUSINESS", "CORPORATE", "ENTERPRISE"],
    ))?;
    registry.register_enum(EnumType::new(un0("graph_type"), ["PROPERTY", "VERTEX", "EDGE"]))?;
    registry.register_enum(EnumType::new(un0("edge_direction"), ["FROM", "TO"]))?;

    for table in builtin_tables()? {
        registry.register(table)?;
    }
    Ok(())
}

fn identity() -> FieldDescriptor {
    FieldDescriptor::new("id", DataType::Integer)
        .primary_key()
        .default(DefaultValue::Identity)
        .editable(false)
}

fn name_field() -> FieldDescriptor {
    FieldDescriptor::new("name", DataType::Text).not_null()
}

fn builtin_tables() -> Result<Vec<TableDescriptor>, ConfigurationError> {
    let table_type = TableBuilder::new(UN0_SCHEMA, "table_type")
        .doc("One row per table known to un0.")
        .field(identity())
        .field(FieldDescriptor::new("db_schema", DataType::Text).not_null())
        .field(name_field())
        .constraint(ConstraintDescriptor::unique(
            "uq_table_type_db_schema_name",
            ["db_schema", "name"],
        ))
        .emitter(EmitterKind::Ownership)
        .emitter(EmitterKind::TableTypeRecord)
        .emitter(EmitterKind::Graph)
        .rls(RlsPolicy::PublicRead)
        .build()?;

    let related_object = TableBuilder::new(UN0_SCHEMA, "related_object")
        .doc("Shared key space for every table using a related-object id.")
        .with(&Bundle::id())
        .field(FieldDescriptor::new("table_type_id", DataType::Integer)
            .not_null()
            .index()
            .references(un0("table_type"), "id")
            .on_delete(OnDelete::Cascade)
            .edge("HAS_TABLE_TYPE", Some("IS_TABLE_TYPE_OF")))
        .emitter(EmitterKind::Ownership)
        .emitter(EmitterKind::TableTypeRecord)
        .emitter(EmitterKind::Graph)
        .build()?;

    let token_secret = TableBuilder::new(UN0_SCHEMA, "token_secret")
        .doc("Secret used to verify JWTs. Holds at most one row.")
        .field(FieldDescriptor::new("secret", DataType::Text).primary_key())
        .emitter(EmitterKind::Ownership)
        .vertex(false)
        .build()?;

    let tenant = TableBuilder::new(UN0_SCHEMA, "tenant")
        .with(&Bundle::related_object())
        .field(name_field().unique())
        .field(FieldDescriptor::new("tenant_type", DataType::Enum(un0("tenant_type")))
            .not_null()
            .index()
            .default(DefaultValue::Text("INDIVIDUAL".into())))
        .with(&Bundle::active())
        .with(&Bundle::tracking())
        .with(&Bundle::soft_delete())
        .with(&Bundle::base())
        .rls(RlsPolicy::SuperuserOnly)
        .build()?;

    let user = TableBuilder::new(UN0_SCHEMA, "user")
        .with(&Bundle::related_object())
        .field(FieldDescriptor::new("email", DataType::Text).not_null().unique())
        .field(FieldDescriptor::new("handle", DataType::Text).not_null().index())
        .field(FieldDescriptor::new("full_name", DataType::Text).not_null())
        .field(FieldDescriptor::new("tenant_id", DataType::Ulid)
            .index()
            .references(un0("tenant"), "id")
            .on_delete(OnDelete::Cascade)
            .edge("BELONGS_TO", Some("HAS_USER")))
        .field(FieldDescriptor::new("default_group_id", DataType::Ulid)
            .index()
            .references(un0("group"), "id")
            .on_delete(OnDelete::SetNull)
            .edge("HAS_DEFAULT_GROUP", Some("IS_DEFAULT_GROUP_OF")))
        .field(FieldDescriptor::new("is_superuser", DataType::Boolean)
            .not_null()
            .default(DefaultValue::Bool(false)))
        .field(FieldDescriptor::new("is_tenant_admin", DataType::Boolean)
            .not_null()
            .default(DefaultValue::Bool(false)))
        .constraint(ConstraintDescriptor::check(
            "ck_user_is_superuser",
            "NOT (is_superuser AND is_tenant_admin)",
        ))
        .with(&Bundle::active())
        .with(&Bundle::tracking())
        .with(&Bundle::soft_delete())
        .with(&Bundle::base())
        .rls(RlsPolicy::TenantAdmin)
        .build()?;

    let group = TableBuilder::new(UN0_SCHEMA, "group")
        .with(&Bundle::related_object())
        .with(&Bundle::tenant())
        .field(name_field())
        .constraint(ConstraintDescriptor::unique("uq_group_tenant_name", ["tenant_id", "name"]))
        .with(&Bundle::active())
        .with(&Bundle::tracking())
        .with(&Bundle::soft_delete())
        .with(&Bundle::base())
        .rls(RlsPolicy::TenantAdmin)
        .build()?;

    let role = TableBuilder::new(UN0_SCHEMA, "role")
        .with(&Bundle::related_object())
        .with(&Bundle::tenant())
        .field(name_field())
        .field(FieldDescriptor::new("description", DataType::Text))
        .constraint(ConstraintDescriptor::unique("uq_role_tenant_name", ["tenant_id", "name"]))
        .with(&Bundle::active())
        .with(&Bundle::tracking())
        .with(&Bundle::soft_delete())
        .with(&Bundle::base())
        .rls(RlsPolicy::TenantAdmin)
        .build()?;

    let tablepermission = TableBuilder::new(UN0_SCHEMA, "tablepermission")
        .doc("Sets of actions on a table that roles can be granted. Created by a trigger on \
            table_type.")
        .field(identity())
        .field(FieldDescriptor::new("table_type_id", DataType::Integer)
            .not_null()
            .index()
            .references(un0("table_type"), "id")
            .on_delete(OnDelete::Cascade)
            .edge("PERMITS_ACCESS_TO", Some("HAS_TABLE_PERMISSION")))
        .field(FieldDescriptor::new(
            "actions",
            DataType::Array(Box::new(DataType::Enum(un0("permission_name")))),
        ).not_null())
        .field(FieldDescriptor::new("is_active", DataType::Boolean)
            .not_null()
            .default(DefaultValue::Bool(true)))
        .constraint(ConstraintDescriptor::unique(
            "uq_tablepermission_table_type_actions",
            ["table_type_id", "actions"],
        ))
        .emitter(EmitterKind::Ownership)
        .emitter(EmitterKind::TableTypeRecord)
        .emitter(EmitterKind::Graph)
        .rls(RlsPolicy::PublicRead)
        .build()?;

    let role_tablepermission = TableBuilder::new(UN0_SCHEMA, "role_tablepermission")
        .vertex(false)
        .field(FieldDescriptor::new("role_id", DataType::Ulid)
            .primary_key()
            .index()
            .references(un0("role"), "id")
            .on_delete(OnDelete::Cascade)
            .edge("HAS_ROLE", None))
        .field(FieldDescriptor::new("tablepermission_id", DataType::Integer)
            .primary_key()
            .index()
            .references(un0("tablepermission"), "id")
            .on_delete(OnDelete::Cascade)
            .edge("GRANTS", None))
        .emitter(EmitterKind::Ownership)
        .emitter(EmitterKind::TableTypeRecord)
        .emitter(EmitterKind::Graph)
        .build()?;

    let user_group_role = TableBuilder::new(UN0_SCHEMA, "user_group_role")
        .vertex(false)
        .field(FieldDescriptor::new("user_id", DataType::Ulid)
            .primary_key()
            .index()
            .references(un0("user"), "id")
            .on_delete(OnDelete::Cascade)
            .edge("HAS_MEMBER", None))
        .field(FieldDescriptor::new("group_id", DataType::Ulid)
            .primary_key()
            .index()
            .references(un0("group"), "id")
            .on_delete(OnDelete::Cascade)
            .edge("IS_MEMBER_OF", None))
        .field(FieldDescriptor::new("role_id", DataType::Ulid)
            .primary_key()
            .index()
            .references(un0("role"), "id")
            .on_delete(OnDelete::Cascade)
            .edge("HAS_ROLE", None))
        .emitter(EmitterKind::Ownership)
        .emitter(EmitterKind::TableTypeRecord)
        .emitter(EmitterKind::Graph)
        .build()?;

    let filterfield = TableBuilder::new(UN0_SCHEMA, "filterfield")
        .doc("Properties, vertices and edges users can filter on.")
        .vertex(false)
        .field(identity())
        .field(FieldDescriptor::new("accessor", DataType::Text).not_null())
        .field(FieldDescriptor::new("label", DataType::Text).not_null())
        .field(FieldDescriptor::new("data_type", DataType::Text).not_null())
        .field(FieldDescriptor::new("graph_type", DataType::Enum(un0("graph_type")))
            .not_null()
            .default(DefaultValue::Text("PROPERTY".into())))
        .field(FieldDescriptor::new("lookups", DataType::Array(Box::new(DataType::Text)))
            .not_null()
            .default(DefaultValue::EmptyArray))
        .constraint(ConstraintDescriptor::unique(
            "uq_filterfield_label_graph_type",
            ["label", "graph_type"],
        ))

        .emitter(EmitterKind::Ownership)
        .rls(RlsPolicy::PublicRead)
        .build()?;

    let filterfield_tabletype = TableBuilder::new(UN0_SCHEMA, "filterfield_tabletype")
        .vertex(false)
        .field(FieldDescriptor::new("filterfield_id", DataType::Integer)
            .primary_key()
            .references(un0("filterfield"), "id")
            .on_delete(OnDelete::Cascade))
        .field(FieldDescriptor::new("table_type_id", DataType::Integer)
            .primary_key()
            .references(un0("table_type"), "id")
            .on_delete(OnDelete::Cascade))
        .field(FieldDescriptor::new("direction", DataType::Enum(un0("edge_direction")))
            .primary_key()
            .default(DefaultValue::Text("FROM".into())))
        .index(IndexDescriptor::new(
            "ix_filterfield_tabletype_table_type_direction",
            ["table_type_id", "direction"],
        ))
        .emitter(EmitterKind::Ownership)
        .rls(RlsPolicy::PublicRead)
        .build()?;

    Ok(vec![
        table_type,
        related_object,
        token_secret,
        tenant,
        user,
        group,
        role,
        tablepermission,
        role_tablepermission,
        user_group_role,
        filterfield,
        filterfield_tabletype,
    ])
}
