//! Tables, keys and indexes of the registered descriptors.
//!
//! Foreign keys are added in a pass of their own after every table exists, so tables may
//! reference each other in any order, themselves included.

use un0_schema::constraint::{foreign_key_name, index_name, primary_key_name, unique_key_name};
use un0_schema::{ConstraintKind, DefaultValue, FieldDescriptor, QualifiedName, TableDescriptor};
use crate::ast::{ColumnDef, CreateTable, Expr, Statement, TableConstraint};

fn default_expr(default: &DefaultValue) -> Option<Expr> {
    match default {
        DefaultValue::Bool(value) => Some(Expr::bool(*value)),
        DefaultValue::Int(value) => Some(Expr::int(*value)),
        DefaultValue::Text(value) => Some(Expr::text(value.as_str())),
        DefaultValue::Now => Some(Expr::call("now", vec![])),
        DefaultValue::GenerateUlid => {
            Some(Expr::call_schema(QualifiedName::new("un0", "generate_ulid"), vec![]))
        }
        DefaultValue::EmptyArray => Some(Expr::text("{}")),
        DefaultValue::Identity => None,
    }
}

fn column(field: &FieldDescriptor) -> ColumnDef {
    ColumnDef {
        name: field.name.clone(),
        ty: field.data_type.sql_name(),
        not_null: !field.nullable,
        default: field.default.as_ref().and_then(default_expr),
        identity: field.default == Some(DefaultValue::Identity),
    }
}

/// `CREATE TABLE IF NOT EXISTS` with columns, primary key, unique and check constraints.
pub fn create_table(table: &TableDescriptor) -> Statement {
    let mut constraints = vec![TableConstraint::PrimaryKey {
        name: primary_key_name(&table.name),
        columns: table.primary_key().map(|f| f.name.clone()).collect(),
    }];
    for field in table.fields.values().filter(|f| f.unique) {
        constraints.push(TableConstraint::Unique {
            name: unique_key_name(&table.name, &field.name),
            columns: vec![field.name.clone()],
        });
    }
    for c in table.constraints.values() {
        constraints.push(match &c.kind {
            ConstraintKind::Unique(columns) => {
                TableConstraint::Unique { name: c.name.clone(), columns: columns.clone() }
            }
            ConstraintKind::Check(predicate) => {
                TableConstraint::Check { name: c.name.clone(), predicate: predicate.clone() }
            }
        });
    }

    Statement::CreateTable(CreateTable {
        name: table.qualified_name(),
        columns: table.fields.values().map(column).collect(),
        constraints,
    })
}

/// Drops and re-adds every foreign key, which keeps the step repeatable.
pub fn foreign_keys(table: &TableDescriptor) -> Vec<Statement> {
    let mut statements = vec![];
    for field in table.foreign_keys() {
        let fk = match &field.foreign_key {
            Some(fk) => fk,
            None => continue,
        };
        let name = foreign_key_name(&table.name, &field.name);
        statements.push(Statement::DropConstraint {
            table: table.qualified_name(),
            name: name.clone(),
        });

        statements.push(Statement::AddForeignKey {
            table: table.qualified_name(),
            name,
            column: field.name.clone(),
            target: fk.table.clone(),
            target_column: fk.column.clone(),
            on_delete: fk.on_delete.sql(),
        });
    }
    statements
}

pub fn indexes(table: &TableDescriptor) -> Vec<Statement> {
    let single = table.fields.values().filter(|f| f.index).map(|f| Statement::CreateIndex {
        name: index_name(&table.name, &f.name),
        table: table.qualified_name(),
        columns: vec![f.name.clone()],
        unique: false,
    });
    let declared = table.indices.values().map(|i| Statement::CreateIndex {
        name: i.name.clone(),
        table: table.qualified_name(),
        columns: i.columns.clone(),
        unique: i.unique,
    });
    single.chain(declared).collect()
}
