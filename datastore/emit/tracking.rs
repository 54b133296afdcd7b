//! Triggers maintaining the ownership columns and turning deletes into soft deletes.

use un0_schema::{EmitterKind, QualifiedName, TableDescriptor};
use crate::ast::{
    Declare, Expr, FromItem, Function, PlBlock, PlStmt, Select, Statement, Timing, Trigger,
    TriggerLevel,
};
use super::{require_columns, trigger_name, EmissionError, EmitContext, Emitter};

pub struct CreatedModifiedEmitter;
pub struct SoftDeleteEmitter;

const USER_ID: &str = "_user_id";

fn user_id_declare(cx: &EmitContext) -> Declare {
    Declare::new(USER_ID, "VARCHAR(26)").init(cx.session_var("user_id"))
}

fn user_id() -> Expr {
    Expr::Var(USER_ID)
}

/// The first user is inserted before any session user can exist.
fn bootstrap_exception(cx: &EmitContext) -> Expr {
    let user_table = &cx.settings.user_table;
    let reltuples = Select::new(vec![Expr::column("reltuples")])
        .from(FromItem::table(QualifiedName::new("pg_catalog", "pg_class")))
        .filter(Expr::eq(Expr::column("oid"), Expr::Raw("TG_RELID")));
    Expr::all([
        Expr::eq(Expr::Raw("TG_TABLE_SCHEMA"), Expr::text(user_table.schema.as_str())),
        Expr::eq(Expr::Raw("TG_TABLE_NAME"), Expr::text(user_table.name.as_str())),
        Expr::binop("<", Expr::Subquery(Box::new(reltuples)), Expr::int(1)),
    ])
}

fn row_trigger(
    table: &TableDescriptor,
    concern: &str,
    events: Vec<&'static str>,
    function: QualifiedName,
) -> Statement {
    Statement::CreateTrigger(Trigger {
        name: trigger_name(table, concern),
        table: table.qualified_name(),
        timing: Timing::Before,
        events,
        level: TriggerLevel::Row,
        function,
    })
}

impl Emitter for CreatedModifiedEmitter {
    fn kind(&self) -> EmitterKind {
        EmitterKind::CreatedModified
    }

    fn emit(
        &self,
        cx: &EmitContext,
        table: &TableDescriptor,
    ) -> Result<Vec<Statement>, EmissionError> {
        require_columns(
            table,
            self.kind(),
            &["owned_by_id", "created_at", "modified_by_id", "modified_at"],
        )?;

        let assign = |column: &str, value: Expr| PlStmt::Assign {
            target: Expr::new_row(column),
            value,
        };
        let no_user = vec![
            PlStmt::if_then(bootstrap_exception(cx), vec![PlStmt::Return(Expr::Raw("NEW"))]),
            PlStmt::Raise("user_id is NULL".into()),
        ];
        let on_insert = vec![
            assign("owned_by_id", user_id()),
            assign("created_at", Expr::call("now", vec![])),
        ];
        let body = PlBlock::new(vec![
            PlStmt::if_then(user_id().is_null(), no_user),
            PlStmt::if_then(Expr::eq(Expr::Raw("TG_OP"), Expr::text("INSERT")), on_insert),
            assign("modified_by_id", user_id()),
            assign("modified_at", Expr::call("now", vec![])),
            PlStmt::Return(Expr::Raw("NEW")),
        ])
        .declare(user_id_declare(cx));


        let function = QualifiedName::new(&table.schema, "set_owner_and_modified");
        Ok(vec![
            Statement::CreateFunction(Function::trigger(function.clone(), body)),
            row_trigger(table, "set_owner_and_modified", vec!["INSERT", "UPDATE"], function),
        ])
    }
}

impl Emitter for SoftDeleteEmitter {
    fn kind(&self) -> EmitterKind {
        EmitterKind::SoftDelete
    }

    fn emit(
        &self,
        cx: &EmitContext,
        table: &TableDescriptor,
    ) -> Result<Vec<Statement>, EmissionError> {
        require_columns(table, self.kind(), &["id", "is_deleted", "deleted_at", "deleted_by_id"])?;

        let body = PlBlock::new(vec![
            PlStmt::if_then(Expr::old_row("is_deleted"), vec![PlStmt::Return(Expr::Raw("OLD"))]),
            PlStmt::if_then(user_id().is_null(), vec![PlStmt::Raise("user_id is NULL".into())]),
            PlStmt::ExecuteFormat {
                format: "UPDATE %I.%I \
                         SET is_deleted = true, deleted_by_id = %L, deleted_at = now() \
                         WHERE id = %L"
                    .into(),
                args: vec![
                    Expr::Raw("TG_TABLE_SCHEMA"),
                    Expr::Raw("TG_TABLE_NAME"),
                    user_id(),
                    Expr::old_row("id"),
                ],
            },
            PlStmt::ReturnNull,
        ])
        .declare(user_id_declare(cx));


        let function = QualifiedName::new(&table.schema, "validate_delete");
        Ok(vec![
            Statement::CreateFunction(Function::trigger(function.clone(), body)),
            row_trigger(table, "validate_delete", vec!["DELETE"], function),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::script;
    use crate::emit::test_util;
    use un0_schema::{Bundle, TableBuilder};

    fn emit(emitter: &dyn Emitter, table: &TableDescriptor) -> Result<String, EmissionError> {
        let registry = test_util::registry();
        let settings = test_util::settings();
        let cx = EmitContext::new(&settings, &registry);
        script(&emitter.emit(&cx, table)?)
    }

    #[test]
    fn owner_and_modified() {
        let registry = test_util::registry();
        let invoice = registry.get(&QualifiedName::new("app", "invoice")).unwrap();
        let sql = emit(&CreatedModifiedEmitter, invoice).unwrap();
        assert!(sql.starts_with("CREATE OR REPLACE FUNCTION \"app\".\"set_owner_and_modified\"()"));
        assert!(sql.contains("_user_id VARCHAR(26) := \
            NULLIF(current_setting('rls_var.user_id', true), '');"));
        assert!(sql.contains("IF _user_id IS NULL THEN"));
        assert!(sql.contains("(TG_TABLE_SCHEMA = 'un0')"));
        assert!(sql.contains("(TG_TABLE_NAME = 'user')"));
        assert!(sql.contains("((SELECT \"reltuples\" FROM \"pg_catalog\".\"pg_class\" \
            WHERE (\"oid\" = TG_RELID)) < 1)"));
        assert!(sql.contains("RAISE EXCEPTION 'user_id is NULL';"));
        assert!(sql.contains("IF (TG_OP = 'INSERT') THEN\n        \
            NEW.\"owned_by_id\" := _user_id;\n        \
            NEW.\"created_at\" := now();\n    END IF;\n    NEW.\"modified_by_id\" := _user_id;"));
        assert!(sql.contains("CREATE OR REPLACE TRIGGER \"invoice_set_owner_and_modified_trigger\" \
            BEFORE INSERT OR UPDATE ON \"app\".\"invoice\""));
    }

    #[test]
    fn soft_delete() {
        let registry = test_util::registry();
        let invoice = registry.get(&QualifiedName::new("app", "invoice")).unwrap();
        let sql = emit(&SoftDeleteEmitter, invoice).unwrap();
        assert!(sql.contains("IF OLD.\"is_deleted\" THEN\n        RETURN OLD;"));
        assert!(sql.contains("EXECUTE format('UPDATE %I.%I \
            SET is_deleted = true, deleted_by_id = %L, deleted_at = now() WHERE id = %L', \
            TG_TABLE_SCHEMA, TG_TABLE_NAME, _user_id, OLD.\"id\");"));
        assert!(sql.contains("RETURN NULL;"));
        assert!(
            sql.contains("\"invoice_validate_delete_trigger\" BEFORE DELETE ON \"app\".\"invoice\"")
        );

    }

    #[test]
    fn missing_columns() {
        let table = TableBuilder::new("app", "plain").with(&Bundle::id()).build().unwrap();
        assert!(matches!(
            emit(&CreatedModifiedEmitter, &table),
            Err(EmissionError::MissingColumn { emitter: "created_modified", .. })
        ));
        assert!(matches!(
            emit(&SoftDeleteEmitter, &table),
            Err(EmissionError::MissingColumn { emitter: "soft_delete", .. })
        ));
    }
}
