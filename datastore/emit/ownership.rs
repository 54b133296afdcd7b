use un0_schema::{EmitterKind, TableDescriptor};
use crate::ast::{GrantTarget, Statement};
use super::{EmissionError, EmitContext, Emitter};

pub struct OwnershipEmitter;

impl Emitter for OwnershipEmitter {
    fn kind(&self) -> EmitterKind {
        EmitterKind::Ownership
    }

    fn emit(
        &self,
        cx: &EmitContext,
        table: &TableDescriptor,
    ) -> Result<Vec<Statement>, EmissionError> {
        let name = table.qualified_name();
        let settings = cx.settings;
        Ok(vec![
            Statement::AlterTableOwner { table: name.clone(), owner: settings.admin_role() },
            Statement::Grant {
                privileges: "SELECT",
                on: GrantTarget::Table(name.clone()),
                to: vec![settings.reader_role(), settings.writer_role()],
            },
            Statement::Grant {
                privileges: "INSERT, UPDATE, DELETE",
                on: GrantTarget::Table(name),
                to: vec![settings.writer_role()],
            },
        ])
    }
}
