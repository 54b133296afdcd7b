use un0_schema::{EmitterKind, QualifiedName, TableDescriptor};
use crate::ast::{Expr, Insert, InsertSource, OnConflict, Statement, Timing, Trigger, TriggerLevel};
use super::{trigger_name, EmissionError, EmitContext, Emitter};

pub struct TableTypeEmitter;

pub(crate) fn related_object_table() -> QualifiedName {
    QualifiedName::new("un0", "related_object")
}

/// Whether the rows of `table` share their key with `un0.related_object`.
pub(crate) fn uses_related_object(table: &TableDescriptor) -> bool {
    table
        .field("id")
        .and_then(|f| f.foreign_key.as_ref())
        .map_or(false, |fk| fk.table == related_object_table() && fk.column == "id")
}

impl Emitter for TableTypeEmitter {
    fn kind(&self) -> EmitterKind {
        EmitterKind::TableTypeRecord
    }

    fn emit(
        &self,
        _cx: &EmitContext,
        table: &TableDescriptor,
    ) -> Result<Vec<Statement>, EmissionError> {
        let mut statements = vec![Statement::Insert(Insert {
            table: QualifiedName::new("un0", "table_type"),
            columns: vec!["db_schema".into(), "name".into()],
            source: InsertSource::Values(vec![vec![
                Expr::text(table.schema.as_str()),
                Expr::text(table.name.as_str()),
            ]]),
            on_conflict: OnConflict::DoNothing,
        })];

        if uses_related_object(table) {
            statements.push(Statement::CreateTrigger(Trigger {
                name: trigger_name(table, "insert_related_object"),
                table: table.qualified_name(),
                timing: Timing::Before,
                events: vec!["INSERT"],
                level: TriggerLevel::Row,
                function: QualifiedName::new("un0", "insert_related_object"),
            }));
        }
        Ok(statements)
    }
}
