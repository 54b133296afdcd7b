//! Per-table SQL emitters.
//!
//! Each [`EmitterKind`] attached to a table maps to one [`Emitter`]. Emitters only read the
//! descriptor and the registry; running the same emitter twice yields the same statements, and
//! every statement is safe to execute again on a database that already has its effect.

use un0_schema::{ConfigurationError, EmitterKind, QualifiedName, SchemaRegistry, TableDescriptor};
use crate::ast::{script, Expr, Statement};
use crate::settings::DbSettings;

mod audit;
mod filter_field;
mod graph;
mod ownership;
mod rls;
mod table_type;
mod tracking;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EmissionError {
    #[error["edge {edge} of {table} ends at {target}, which is not a registered table"]]
    UnknownVertex { table: QualifiedName, edge: String, target: QualifiedName },
    #[error["edge {edge} of {table} ends at {target}, which is not a vertex table"]]
    NotAVertex { table: QualifiedName, edge: String, target: QualifiedName },
    #[error["{emitter} emitter needs column {column} in {table}"]]
    MissingColumn { table: QualifiedName, emitter: &'static str, column: String },
    #[error["text quoted with ${tag}$ contains its own delimiter"]]
    UnsafeLiteral { tag: String },
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

/// What emitters may look at besides the table itself.
#[derive(Debug, Clone, Copy)]
pub struct EmitContext<'a> {
    pub settings: &'a DbSettings,
    pub registry: &'a SchemaRegistry,
}

impl<'a> EmitContext<'a> {
    pub fn new(settings: &'a DbSettings, registry: &'a SchemaRegistry) -> Self {
        Self { settings, registry }
    }

    pub(crate) fn session_var(&self, name: &'static str) -> Expr {
        Expr::SessionVar { prefix: self.settings.session_prefix.clone(), name }
    }

    pub(crate) fn session_bool(&self, name: &'static str) -> Expr {
        Expr::SessionBool { prefix: self.settings.session_prefix.clone(), name }
    }
}

pub trait Emitter: Sync {
    fn kind(&self) -> EmitterKind;
    fn emit(
        &self,
        cx: &EmitContext,
        table: &TableDescriptor,
    ) -> Result<Vec<Statement>, EmissionError>;
}

pub fn emitter_for(kind: EmitterKind) -> &'static dyn Emitter {
    match kind {
        EmitterKind::Ownership => &ownership::OwnershipEmitter,
        EmitterKind::TableTypeRecord => &table_type::TableTypeEmitter,
        EmitterKind::RowLevelSecurity => &rls::RlsEmitter,
        EmitterKind::Audit => &audit::AuditEmitter,
        EmitterKind::CreatedModified => &tracking::CreatedModifiedEmitter,
        EmitterKind::SoftDelete => &tracking::SoftDeleteEmitter,
        EmitterKind::Graph => &graph::GraphEmitter,
        EmitterKind::FilterFields => &filter_field::FilterFieldEmitter,
    }
}

/// Runs all emitters of the table in order.
pub fn emit_table(
    cx: &EmitContext,
    table: &TableDescriptor,
) -> Result<Vec<Statement>, EmissionError> {

    let mut statements = vec![];
    for kind in &table.emitters {
        statements.extend(emitter_for(*kind).emit(cx, table)?);
    }
    Ok(statements)
}

/// The SQL of [`emit_table`] as one script.
pub fn emit_sql(cx: &EmitContext, table: &TableDescriptor) -> Result<String, EmissionError> {
    script(&emit_table(cx, table)?)
}

/// Fails with [`EmissionError::MissingColumn`] unless the table has all `columns`.
pub(crate) fn require_columns(
    table: &TableDescriptor,
    emitter: EmitterKind,
    columns: &[&str],
) -> Result<(), EmissionError> {
    match columns.iter().find(|c| !table.has_field(c)) {
        Some(column) => Err(EmissionError::MissingColumn {
            table: table.qualified_name(),
            emitter: emitter.name(),
            column: column.to_string(),
        }),
        None => Ok(()),
    }
}

/// `<table>_<concern>_trigger`
pub(crate) fn trigger_name(table: &TableDescriptor, concern: &str) -> String {
    format!("{}_{}_trigger", table.name, concern)
}

#[cfg(test)]
pub(crate) mod test_util {
    use un0_schema::{register_builtin, standard_table, DataType, FieldDescriptor, SchemaRegistry};
    use crate::settings::DbSettings;

    pub fn registry() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        register_builtin(&mut registry).unwrap();
        registry.register(standard_table("app", "invoice")
            .field(FieldDescriptor::new("total", DataType::Numeric).not_null())
            .field(FieldDescriptor::new("note", DataType::Text))
            .build()
            .unwrap()).unwrap();
        registry.validate().unwrap();
        registry
    }

    pub fn settings() -> DbSettings {
        DbSettings::default()
    }
}
