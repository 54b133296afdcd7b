use un0_schema::{AuditMode, EmitterKind, QualifiedName, TableDescriptor};
use crate::ast::{
    Expr, FromItem, Function, Insert, InsertSource, OnConflict, PlBlock, PlStmt, Select, Statement,
    Timing, Trigger, TriggerLevel,
};
use crate::sql_writer::SqlWriter;
use super::{require_columns, trigger_name, EmissionError, EmitContext, Emitter};

pub struct AuditEmitter;

const AUDIT_SCHEMA: &str = "audit";

impl Emitter for AuditEmitter {
    fn kind(&self) -> EmitterKind {
        EmitterKind::Audit
    }

    fn emit(
        &self,
        _cx: &EmitContext,
        table: &TableDescriptor,
    ) -> Result<Vec<Statement>, EmissionError> {
        match table.audit {
            AuditMode::None => Ok(vec![]),
            AuditMode::Basic => Ok(vec![enable_tracking(table)]),
            AuditMode::History => {
                require_columns(table, self.kind(), &["id", "modified_at"])?;
                Ok(history(table))
            }
        }
    }
}

/// `SELECT audit.enable_tracking('"schema"."table"'::regclass)`
fn enable_tracking(table: &TableDescriptor) -> Statement {
    let mut regclass = SqlWriter::new();
    regclass.write_qualified(&table.qualified_name());
    let call = Expr::call_schema(
        QualifiedName::new(AUDIT_SCHEMA, "enable_tracking"),
        vec![Expr::text(regclass.build()).cast("regclass")],
    );
    Statement::Select(Select::new(vec![call]))
}

fn history(table: &TableDescriptor) -> Vec<Statement> {
    let source = table.qualified_name();
    let history_name = table.history_table_name();
    let history = QualifiedName::new(AUDIT_SCHEMA, &history_name);
    let columns: Vec<String> = table.fields.keys().cloned().collect();

    let copy_row = Insert {
        table: history.clone(),
        columns: columns.clone(),
        source: InsertSource::Select(
            Select::new(columns.iter().map(Expr::column).collect())
                .from(FromItem::table(source.clone()))
                .filter(Expr::eq(Expr::column("id"), Expr::new_row("id"))),
        ),
        on_conflict: OnConflict::Fail,
    };
    let function_name = QualifiedName::new(&table.schema, format!("{}_history", table.name));
    let function = Function::trigger(
        function_name.clone(),
        PlBlock::new(vec![
            PlStmt::sql(Statement::Insert(copy_row)),
            PlStmt::Return(Expr::Raw("NEW")),
        ]),
    )
    .security_definer();


    vec![
        Statement::CreateTableAs { name: history.clone(), columns, source: source.clone() },
        Statement::AddIdentityPrimaryKey { table: history.clone(), column: "pk".into() },
        Statement::CreateIndex {
            name: format!("{}_pk_idx", history_name),
            table: history.clone(),
            columns: vec!["pk".into()],
            unique: false,
        },
        Statement::CreateIndex {
            name: format!("{}_id_modified_at_idx", history_name),
            table: history,
            columns: vec!["id".into(), "modified_at".into()],
            unique: false,
        },
        Statement::CreateFunction(function),
        Statement::CreateTrigger(Trigger {
            name: trigger_name(table, "history"),
            table: source,
            timing: Timing::After,
            events: vec!["INSERT", "UPDATE"],
            level: TriggerLevel::Row,
            function: function_name,
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::script;
    use crate::emit::test_util;
    use un0_schema::{standard_table, Bundle, DataType, FieldDescriptor, TableBuilder};

    fn emit(table: &TableDescriptor) -> Result<String, EmissionError> {
        let registry = test_util::registry();
        let settings = test_util::settings();
        let cx = EmitContext::new(&settings, &registry);
        script(&AuditEmitter.emit(&cx, table)?)
    }

    #[test]
    fn basic() {
        let registry = test_util::registry();
        let sql = emit(registry.get(&QualifiedName::new("un0", "user")).unwrap()).unwrap();
        assert_eq!(sql, "SELECT \"audit\".\"enable_tracking\"('\"un0\".\"user\"'::regclass);\n");
    }

    #[test]
    fn history_table() {
        let table = standard_table("app", "contract")
            .field(FieldDescriptor::new("amount", DataType::Numeric))
            .audit(AuditMode::History)
            .build()
            .unwrap();
        let sql = emit(&table).unwrap();
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS \"audit\".\"app_contract\" \
            AS (SELECT \"id\", "));
        assert!(sql.contains(") WITH NO DATA;"));
        assert!(sql.contains("ALTER TABLE \"audit\".\"app_contract\" \
            ADD COLUMN IF NOT EXISTS \"pk\" INT GENERATED
 ALWAYS AS IDENTITY PRIMARY KEY;"));
        assert!(sql.contains("CREATE INDEX IF NOT EXISTS \"app_contract_pk_idx\" \
            ON \"audit\".\"app_contract\" (\"pk\");"));
        assert!(sql.contains("\"app_contract_id_modified_at_idx\" \
            ON \"audit\".\"app_contract\" (\"id\", \"modified_at\");"));

        assert!(sql.contains("CREATE OR REPLACE FUNCTION \"app\".\"contract_history\"()"));
        assert!(sql.contains("SECURITY DEFINER"));
        assert!(sql.contains("WHERE (\"id\" = NEW.\"id\");"));
        assert!(sql.contains("\"amount\""));
        assert!(sql.contains("AFTER INSERT OR UPDATE ON \"app\".\"contract\" FOR EACH ROW \
            EXECUTE FUNCTION \"app\".\"contract_history\"()"));
    }

    #[test]
    fn history_needs_modified_at() {
        let table = TableBuilder::new("app", "plain")
            .with(&Bundle::id())
            .audit(AuditMode::History)
            .build()
            .unwrap();
        assert!(matches!(
            emit(&table),
            Err(EmissionError::MissingColumn { column, .. }) if column == "modified_at"
        ));
    }
}
