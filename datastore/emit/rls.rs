use un0_schema::{EmitterKind, QualifiedName, RlsPolicy, TableDescriptor};
use crate::ast::{Expr, Select, Statement};
use super::{require_columns, EmissionError, EmitContext, Emitter};

pub struct RlsEmitter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Select,
    Insert,
    Update,
    Delete,
}

impl Verb {
    const ALL: [Verb; 4] = [Verb::Select, Verb::Insert, Verb::Update, Verb::Delete];

    fn command(self) -> &'static str {
        match self {
            Verb::Select => "SELECT",
            Verb::Insert => "INSERT",
            Verb::Update => "UPDATE",
            Verb::Delete => "DELETE",
        }
    }

    fn policy_name(self, table: &TableDescriptor) -> String {
        format!("{}_{}_policy", table.name, self.command().to_lowercase())
    }
}

struct Predicates<'a> {
    cx: &'a EmitContext<'a>,
    table: &'a TableDescriptor,
}

impl<'a> Predicates<'a> {
    fn superuser(&self) -> Expr {
        self.cx.session_bool("is_superuser")
    }

    fn tenant_admin(&self) -> Expr {
        Expr::and(
            self.cx.session_bool("is_tenant_admin"),
            Expr::eq(Expr::column("tenant_id"), self.cx.session_var("tenant_id")),
        )
    }

    fn owner(&self) -> Expr {
        Expr::eq(Expr::column("owned_by_id"), self.cx.session_var("user_id"))
    }

    fn group(&self, verb: Verb) -> Expr {
        let args = vec![
            Expr::text(self.table.schema.as_str()),
            Expr::text(self.table.name.as_str()),
            Expr::text(verb.command()),
        ];
        let groups = Expr::call_schema(QualifiedName::new("un0", "permissible_groups"), args);

        Expr::InSubquery {
            expr: Box::new(Expr::column("group_id")),
            query: Box::new(Select::new(vec![groups])),
        }
    }

    fn for_verb(&self, policy: RlsPolicy, verb: Verb) -> Expr {
        match (policy, verb) {
            (RlsPolicy::PublicRead, Verb::Select) => Expr::bool(true),
            (RlsPolicy::TenantAdmin, Verb::Insert) => self.superuser(),
            (RlsPolicy::TenantAdmin, _) => Expr::any([self.superuser(), self.tenant_admin()]),
            (RlsPolicy::Default, verb) => Expr::any([
                self.superuser(),
                self.tenant_admin(),
                self.owner(),
                self.group(verb),
            ]),
            _ => self.superuser(),
        }
    }
}

fn required_columns(policy: RlsPolicy) -> &'static [&'static str] {
    match policy {
        RlsPolicy::TenantAdmin => &["tenant_id"],
        RlsPolicy::Default => &["tenant_id", "owned_by_id", "group_id"],
        _ => &[],
    }
}

impl Emitter for RlsEmitter {
    fn kind(&self) -> EmitterKind {
        EmitterKind::RowLevelSecurity
    }

    fn emit(
        &self,
        cx: &EmitContext,
        table: &TableDescriptor,
    ) -> Result<Vec<Statement>, EmissionError> {
        if table.rls_policy == RlsPolicy::None {
            return Ok(vec![]);
        }
        require_columns(table, self.kind(), required_columns(table.rls_policy))?;

        let name = table.qualified_name();
        let mut statements = vec![Statement::EnableRls { table: name.clone() }];
        if table.force_rls {
            statements.push(Statement::ForceRls { table: name.clone() });
        }

        let predicates = Predicates { cx, table };
        for verb in Verb::ALL {
            let predicate = predicates.for_verb(table.rls_policy, verb);
            let (using, with_check) = match verb {
                Verb::Select | Verb::Delete => (Some(predicate), None),
                Verb::Insert => (None, Some(predicate)),
                Verb::Update => (Some(predicate.clone()), Some(predicate)),
            };
            statements.push(Statement::DropPolicy {
                name: verb.policy_name(table),
                table: name.clone(),
            });

            statements.push(Statement::CreatePolicy {
                name: verb.policy_name(table),
                table: name.clone(),
                command: verb.command(),
                using,
                with_check,
            });
        }
        Ok(statements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::script;
    use crate::emit::test_util;
    use un0_schema::{Bundle, TableBuilder};

    fn emit(table: &TableDescriptor) -> Result<String, EmissionError> {
        let registry = test_util::registry();
        let settings = test_util::settings();
        let cx = EmitContext::new(&settings, &registry);
        script(&RlsEmitter.emit(&cx, table)?)
    }

    const SUPERUSER: &str =
        "COALESCE(NULLIF(current_setting('rls_var.is_superuser', true), '')::BOOLEAN, false)";

    #[test]
    fn public_read() {
        let registry = test_util::registry();
        let sql = emit(registry.get(&QualifiedName::new("un0", "table_type")).unwrap()).unwrap();
        assert!(sql.starts_with("ALTER TABLE \"un0\".\"table_type\" ENABLE ROW LEVEL SECURITY;\n\n\
            ALTER TABLE \"un0\".\"table_type\" FORCE ROW LEVEL SECURITY;\n\n\
            DROP POLICY IF EXISTS \"table_type_select_policy\" ON \"un0\".\"table_type\";"));
        assert!(sql.contains("FOR SELECT USING (true);"));
        assert!(sql.contains(&format!("FOR INSERT WITH CHECK ({});", SUPERUSER)));
        assert!(sql.contains(&format!("FOR UPDATE USING ({0}) WITH CHECK ({0});", SUPERUSER)));
        assert!(sql.contains(&format!("FOR DELETE USING ({});", SUPERUSER)));
        assert_eq!(sql.matches("CREATE POLICY").count(), 4);
        assert_eq!(sql.matches("DROP POLICY IF EXISTS").count(), 4);
    }

    #[test]
    fn tenant_admin() {
        let registry = test_util::registry();
        let sql = emit(registry.get(&QualifiedName::new("un0", "user")).unwrap()).unwrap();
        assert!(sql.contains(&format!(
            "\"user_insert_policy\" ON \"un0\".\"user\" FOR INSERT WITH CHECK ({});",
            SUPERUSER
        )));
        assert!(
            sql.contains("(\"tenant_id\" = NULLIF(current_setting('rls_var.tenant_id', true), ''))")
        );
    }

    #[test]
    fn default_policy() {
        let registry = test_util::registry();
        let sql = emit(registry.get(&QualifiedName::new("app", "invoice")).unwrap()).unwrap();
        for verb in ["SELECT", "INSERT", "UPDATE", "DELETE"] {
            assert!(sql.contains(&format!(
                "\"group_id\" IN (SELECT \"un0\".\"permissible_groups\"('app', 'invoice', '{}'))",
                verb
            )));
        }
        assert!(
            sql.contains("(\"owned_by_id\" = NULLIF(current_setting('rls_var.user_id', true), ''))")
        );

    }

    #[test]
    fn opt_out_of_force() {
        let table = TableBuilder::new("app", "note")
            .with(&Bundle::id())
            .rls(RlsPolicy::SuperuserOnly)
            .force_rls(false)
            .build()
            .unwrap();
        let sql = emit(&table).unwrap();
        assert!(!sql.contains("FORCE"));
        assert!(!sql.contains("USING (true)"));
    }

    #[test]
    fn missing_columns() {
        let table = TableBuilder::new("app", "note")
            .with(&Bundle::id())
            .with(&Bundle::tracking())
            .rls(RlsPolicy::Default)
            .build()
            .unwrap();
        assert_eq!(emit(&table).unwrap_err(), EmissionError::MissingColumn {
            table: QualifiedName::new("app", "note"),
            emitter: "row_level_security",
            column: "tenant_id".into(),
        });
    }
}
