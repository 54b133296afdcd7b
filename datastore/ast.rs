//! Typed SQL and PL/pgSQL statements.
//!
//! Emitters build these values instead of formatting strings. Every identifier goes through
//! [`SqlWriter::write_name`] and every literal through [`SqlWriter::write_literal`] when the
//! statement is rendered, so descriptor contents can never change the shape of the SQL.

use un0_schema::{EnumType, QualifiedName};
use crate::cypher::CypherCall;
use crate::emit::EmissionError;
use crate::sql_writer::{SqlWriter, WriteSql};

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Text(String),
    Int(i64),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FunctionRef {
    /// A function resolved through the search path, like `now` or `set_config`.
    Builtin(&'static str),
    Schema(QualifiedName),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `"name"`, or `qualifier."name"` for `NEW`, `OLD`, table aliases and row variables.
    Column { qualifier: Option<&'static str>, name: String },
    Literal(Literal),
    /// A PL/pgSQL variable or function argument.
    Var(&'static str),
    /// `NULLIF(current_setting('<prefix>.<name>', true), '')`
    SessionVar { prefix: String, name: &'static str },
    /// Like [`Expr::SessionVar`], cast to boolean and defaulting to false.
    SessionBool { prefix: String, name: &'static str },
    Call { function: FunctionRef, args: Vec<Expr> },
    Cast { expr: Box<Expr>, ty: String },
    BinOp { op: &'static str, left: Box<Expr>, right: Box<Expr> },
    Not(Box<Expr>),
    IsNull { expr: Box<Expr>, negated: bool },
    IsDistinctFrom { left: Box<Expr>, right: Box<Expr> },
    InSubquery { expr: Box<Expr>, query: Box<Select> },
    Exists(Box<Select>),
    Subquery(Box<Select>),
    Array(Vec<Expr>),
    /// Trusted fragments built into the emitters: `TG_OP`, `TG_RELID`, `NEW`, ...
    Raw(&'static str),
}

impl Expr {
    pub fn column(name: impl Into<String>) -> Self {
        Expr::Column { qualifier: None, name: name.into() }
    }

    pub fn qualified(qualifier: &'static str, name: impl Into<String>) -> Self {
        Expr::Column { qualifier: Some(qualifier), name: name.into() }
    }

    pub fn new_row(name: impl Into<String>) -> Self {
        Self::qualified("NEW", name)
    }

    pub fn old_row(name: impl Into<String>) -> Self {
        Self::qualified("OLD", name)
    }

    pub fn text(value: impl Into<String>) -> Self {
        Expr::Literal(Literal::Text(value.into()))
    }

    pub fn int(value: i64) -> Self {
        Expr::Literal(Literal::Int(value))
    }

    pub fn bool(value: bool) -> Self {
        Expr::Literal(Literal::Bool(value))
    }

    pub fn null() -> Self {
        Expr::Literal(Literal::Null)
    }

    pub fn call(name: &'static str, args: Vec<Expr>) -> Self {
        Expr::Call { function: FunctionRef::Builtin(name), args }
    }

    pub fn call_schema(name: QualifiedName, args: Vec<Expr>) -> Self {
        Expr::Call { function: FunctionRef::Schema(name), args }
    }

    pub fn cast(self, ty: impl Into<String>) -> Self {
        Expr::Cast { expr: Box::new(self), ty: ty.into() }
    }

    pub fn binop(op: &'static str, left: Expr, right: Expr) -> Self {
        Expr::BinOp { op, left: Box::new(left), right: Box::new(right) }
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Self::binop("=", left, right)
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Self::binop("AND", left, right)
    }

    pub fn or(left: Expr, right: Expr) -> Self {
        Self::binop("OR", left, right)
    }

    /// Folds the expressions with `AND`; an empty list is `true`.
    pub fn all(exprs: impl IntoIterator<Item = Expr>) -> Self {
        exprs.into_iter().reduce(Self::and).unwrap_or_else(|| Self::bool(true))
    }

    pub fn any(exprs: impl IntoIterator<Item = Expr>) -> Self {
        exprs.into_iter().reduce(Self::or).unwrap_or_else(|| Self::bool(false))
    }

    pub fn is_null(self) -> Self {
        Expr::IsNull { expr: Box::new(self), negated: false }
    }

    pub fn is_not_null(self) -> Self {
        Expr::IsNull { expr: Box::new(self), negated: true }
    }

    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }
}

impl WriteSql for Expr {
    fn write_sql(&self, w: &mut SqlWriter) {
        match self {
            Expr::Column { qualifier, name } => {
                if let Some(qualifier) = qualifier {
                    w.write_str(qualifier);
                    w.write_str(".");
                }
                w.write_name(name);
            }
            Expr::Literal(Literal::Text(value)) => w.write_literal(value),
            Expr::Literal(Literal::Int(value)) => write!(w, "{}", value),
            Expr::Literal(Literal::Bool(value)) => write!(w, "{}", value),
            Expr::Literal(Literal::Null) => w.write_str("NULL"),
            Expr::Var(name) | Expr::Raw(name) => w.write_str(name),
            Expr::SessionVar { prefix, name } => write_session_var(w, prefix, name),
            Expr::SessionBool { prefix, name } => {
                w.write_str("COALESCE(");
                write_session_var(w, prefix, name);
                w.write_str("::BOOLEAN, false)");
            }
            Expr::Call { function, args } => {
                match function {
                    FunctionRef::Builtin(name) => w.write_str(name),
                    FunctionRef::Schema(name) => w.write_qualified(name),
                }
                w.write_str("(");
                w.write_list(args, ", ", |w, arg| w.write(arg));
                w.write_str(")");
            }
            Expr::Cast { expr, ty } => {
                w.write(expr.as_ref());
                w.write_str("::");
                w.write_str(ty);
            }
            Expr::BinOp { op, left, right } => {
                w.write_str("(");
                w.write(left.as_ref());
                write!(w, " {} ", op);
                w.write(right.as_ref());
                w.write_str(")");
            }
            Expr::Not(expr) => {
                w.write_str("NOT ");
                w.write(expr.as_ref());
            }
            Expr::IsNull { expr, negated } => {
                w.write(expr.as_ref());
                w.write_str(if *negated { " IS NOT NULL" } else { " IS NULL" });
            }
            Expr::IsDistinctFrom { left, right } => {
                w.write(left.as_ref());
                w.write_str(" IS DISTINCT FROM ");
                w.write(right.as_ref());
            }
            Expr::InSubquery { expr, query } => {
                w.write(expr.as_ref());
                w.write_str(" IN (");
                w.write(query.as_ref());
                w.write_str(")");
            }
            Expr::Exists(query) => {
                w.write_str("EXISTS (");
                w.write(query.as_ref());
                w.write_str(")");
            }
            Expr::Subquery(query) => {
                w.write_str("(");
                w.write(query.as_ref());
                w.write_str(")");
            }
            Expr::Array(elems) => {
                w.write_str("ARRAY[");
                w.write_list(elems, ", ", |w, e| w.write(e));
                w.write_str("]");
            }
        }
    }
}

fn write_session_var(w: &mut SqlWriter, prefix: &str, name: &str) {
    w.write_str("NULLIF(current_setting(");
    w.write_literal(&format!("{}.{}", prefix, name));
    w.write_str(", true), '')");
}

#[derive(Debug, Clone, PartialEq)]
pub enum FromSource {
    Table(QualifiedName),
    Call(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FromItem {
    pub source: FromSource,
    pub alias: Option<&'static str>,
}

impl FromItem {
    pub fn table(table: QualifiedName) -> Self {
        Self { source: FromSource::Table(table), alias: None }
    }

    pub fn aliased(table: QualifiedName, alias: &'static str) -> Self {
        Self { source: FromSource::Table(table), alias: Some(alias) }
    }

    pub fn call(call: Expr) -> Self {
        Self { source: FromSource::Call(call), alias: None }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Select {
    pub exprs: Vec<Expr>,
    pub from: Vec<FromItem>,
    pub filter: Option<Expr>,
}

impl Select {
    pub fn new(exprs: Vec<Expr>) -> Self {
        Self { exprs, from: vec![], filter: None }
    }

    pub fn from(mut self, item: FromItem) -> Self {
        self.from.push(item);
        self
    }

    pub fn filter(mut self, filter: Expr) -> Self {
        self.filter = Some(filter);
        self
    }

    fn write_with_into(&self, w: &mut SqlWriter, into: &[&'static str]) {
        w.write_str("SELECT ");
        if self.exprs.is_empty() {
            w.write_str("1");
        } else {
            w.write_list(&self.exprs, ", ", |w, e| w.write(e));
        }
        if !into.is_empty() {
            w.write_str(" INTO ");
            w.write_list(into, ", ", |w, var| w.write_str(var));
        }
        if !self.from.is_empty() {
            w.write_str(" FROM ");
            w.write_list(&self.from, ", ", |w, item| {
                match &item.source {
                    FromSource::Table(name) => w.write_qualified(name),
                    FromSource::Call(call) => w.write(call),
                }
                if let Some(alias) = item.alias {
                    write!(w, " {}", alias);
                }
            });
        }
        if let Some(filter) = &self.filter {
            w.write_str(" WHERE ");
            w.write(filter);
        }
    }
}

impl WriteSql for Select {
    fn write_sql(&self, w: &mut SqlWriter) {
        self.write_with_into(w, &[]);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InsertSource {
    Values(Vec<Vec<Expr>>),
    Select(Select),
}

#[derive(Debug, Clone, PartialEq)]
pub enum OnConflict {
    Fail,
    DoNothing,
    DoNothingOn(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    pub table: QualifiedName,
    pub columns: Vec<String>,
    pub source: InsertSource,
    pub on_conflict: OnConflict,
}

impl WriteSql for Insert {
    fn write_sql(&self, w: &mut SqlWriter) {
        w.write_str("INSERT INTO ");
        w.write_qualified(&self.table);
        w.write_str(" (");
        w.write_names(&self.columns);
        w.write_str(") ");
        match &self.source {
            InsertSource::Values(rows) => {
                w.write_str("VALUES ");
                w.write_list(rows, ", ", |w, row| {
                    w.write_str("(");
                    w.write_list(row, ", ", |w, e| w.write(e));
                    w.write_str(")");
                });
            }
            InsertSource::Select(select) => w.write(select),
        }
        match &self.on_conflict {
            OnConflict::Fail => {}
            OnConflict::DoNothing => w.write_str(" ON CONFLICT DO NOTHING"),
            OnConflict::DoNothingOn(columns) => {
                w.write_str(" ON CONFLICT (");
                w.write_names(columns);
                w.write_str(") DO NOTHING");
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GrantTarget {
    Database(String),
    Schemas(Vec<String>),
    AllTablesIn(Vec<String>),
    AllSequencesIn(Vec<String>),
    AllFunctionsIn(Vec<String>),
    Table(QualifiedName),
}

impl WriteSql for GrantTarget {
    fn write_sql(&self, w: &mut SqlWriter) {
        match self {
            GrantTarget::Database(name) => {
                w.write_str("DATABASE ");
                w.write_name(name);
            }
            GrantTarget::Schemas(names) => {
                w.write_str("SCHEMA ");
                w.write_names(names);
            }
            GrantTarget::AllTablesIn(names) => {
                w.write_str("ALL TABLES IN SCHEMA ");
                w.write_names(names);
            }
            GrantTarget::AllSequencesIn(names) => {
                w.write_str("ALL SEQUENCES IN SCHEMA ");
                w.write_names(names);
            }
            GrantTarget::AllFunctionsIn(names) => {
                w.write_str("ALL FUNCTIONS IN SCHEMA ");
                w.write_names(names);
            }
            GrantTarget::Table(name) => w.write_qualified(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub ty: String,
    pub not_null: bool,
    pub default: Option<Expr>,
    pub identity: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableConstraint {
    PrimaryKey { name: String, columns: Vec<String> },
    Unique { name: String, columns: Vec<String> },
    /// Predicate emitted verbatim.
    Check { name: String, predicate: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTable {
    pub name: QualifiedName,
    pub columns: Vec<ColumnDef>,
    pub constraints: Vec<TableConstraint>,
}

impl WriteSql for CreateTable {
    fn write_sql(&self, w: &mut SqlWriter) {
        w.write_str("CREATE TABLE IF NOT EXISTS ");
        w.write_qualified(&self.name);
        w.write_str(" (\n");
        let mut first = true;
        for column in &self.columns {
            if !first {
                w.write_str(",\n");
            }
            first = false;
            w.write_str("    ");
            w.write_name(&column.name);
            write!(w, " {}", column.ty);
            if column.identity {
                w.write_str(" GENERATED BY DEFAULT AS IDENTITY");
            }
            if column.not_null {
                w.write_str(" NOT NULL");
            }
            if let Some(default) = &column.default {
                w.write_str(" DEFAULT ");
                w.write(default);
            }
        }
        for constraint in &self.constraints {
            if !first {
                w.write_str(",\n");
            }
            first = false;
            w.write_str("    CONSTRAINT ");
            match constraint {
                TableConstraint::PrimaryKey { name, columns } => {
                    w.write_name(name);
                    w.write_str(" PRIMARY KEY (");
                    w.write_names(columns);
                    w.write_str(")");
                }
                TableConstraint::Unique { name, columns } => {
                    w.write_name(name);
                    w.write_str(" UNIQUE (");
                    w.write_names(columns);
                    w.write_str(")");
                }
                TableConstraint::Check { name, predicate } => {
                    w.write_name(name);
                    write!(w, " CHECK ({})", predicate);
                }
            }
        }
        w.write_str("\n)");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    PlPgSql,
    Sql,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionArg {
    pub name: &'static str,
    pub ty: &'static str,
    pub default: Option<Expr>,
}

impl FunctionArg {
    pub fn new(name: &'static str, ty: &'static str) -> Self {
        Self { name, ty, default: None }
    }

    pub fn default(mut self, default: Expr) -> Self {
        self.default = Some(default);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FunctionBody {
    Pl(PlBlock),
    Query(Select),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: QualifiedName,
    pub args: Vec<FunctionArg>,
    pub returns: String,
    pub volatility: Option<&'static str>,
    pub security_definer: bool,
    pub body: FunctionBody,
}

impl Function {
    /// A PL/pgSQL function returning `TRIGGER`.
    pub fn trigger(name: QualifiedName, body: PlBlock) -> Self {
        Self {
            name,
            args: vec![],
            returns: "TRIGGER".into(),
            volatility: None,
            security_definer: false,
            body: FunctionBody::Pl(body),
        }
    }

    pub fn security_definer(mut self) -> Self {
        self.security_definer = true;
        self
    }

    fn language(&self) -> Language {
        match self.body {
            FunctionBody::Pl(_) => Language::PlPgSql,
            FunctionBody::Query(_) => Language::Sql,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timing {
    Before,
    After,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerLevel {
    Row,
    Statement,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub name: String,
    pub table: QualifiedName,
    pub timing: Timing,
    pub events: Vec<&'static str>,
    pub level: TriggerLevel,
    pub function: QualifiedName,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declare {
    pub name: &'static str,
    pub ty: String,
    pub default: Option<Expr>,
}

impl Declare {
    pub fn new(name: &'static str, ty: impl Into<String>) -> Self {
        Self { name, ty: ty.into(), default: None }
    }

    pub fn init(mut self, value: Expr) -> Self {
        self.default = Some(value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlBlock {
    pub declare: Vec<Declare>,
    pub body: Vec<PlStmt>,
}

impl PlBlock {
    pub fn new(body: Vec<PlStmt>) -> Self {
        Self { declare: vec![], body }
    }

    pub fn declare(mut self, declare: Declare) -> Self {
        self.declare.push(declare);
        self
    }

    /// `IF NOT EXISTS (<lookup>) THEN <body> END IF`, the guard used for catalog objects
    /// without an `IF NOT EXISTS` clause of their own.
    pub fn guarded(lookup: Select, body: Vec<PlStmt>) -> Self {
        Self::new(vec![PlStmt::If {
            branches: vec![(Expr::Exists(Box::new(lookup)).not(), body)],
            otherwise: vec![],
        }])
    }

    fn render(&self, w: &mut SqlWriter) -> Result<(), EmissionError> {
        if !self.declare.is_empty() {
            w.write_str("DECLARE\n");
            for declare in &self.declare {
                write!(w, "    {} {}", declare.name, declare.ty);
                if let Some(value) = &declare.default {
                    w.write_str(" := ");
                    w.write(value);
                }
                w.write_str(";\n");
            }
        }
        w.write_str("BEGIN\n");
        render_pl_stmts(w, &self.body, 1)?;
        w.write_str("END");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlStmt {
    If { branches: Vec<(Expr, Vec<PlStmt>)>, otherwise: Vec<PlStmt> },
    Assign { target: Expr, value: Expr },
    Raise(String),
    Return(Expr),
    ReturnNull,
    /// `EXECUTE format(<format>, <args>)`
    ExecuteFormat { format: String, args: Vec<Expr> },
    Cypher(CypherCall),
    Perform(Expr),
    SelectInto { select: Select, into: Vec<&'static str> },
    Sql(Box<Statement>),
}

impl PlStmt {
    pub fn if_then(condition: Expr, body: Vec<PlStmt>) -> Self {
        PlStmt::If { branches: vec![(condition, body)], otherwise: vec![] }
    }

    pub fn sql(statement: Statement) -> Self {
        PlStmt::Sql(Box::new(statement))
    }
}

fn render_pl_stmts(w: &mut SqlWriter, stmts: &[PlStmt], depth: usize) -> Result<(), EmissionError> {
    for stmt in stmts {
        render_pl_stmt(w, stmt, depth)?;
    }
    Ok(())
}

fn indent(w: &mut SqlWriter, depth: usize) {
    for _ in 0..depth {
        w.write_str("    ");
    }
}

fn render_pl_stmt(w: &mut SqlWriter, stmt: &PlStmt, depth: usize) -> Result<(), EmissionError> {
    indent(w, depth);
    match stmt {
        PlStmt::If { branches, otherwise } => {
            for (i, (condition, body)) in branches.iter().enumerate() {
                w.write_str(if i == 0 { "IF " } else { "ELSIF " });
                w.write(condition);
                w.write_str(" THEN\n");
                render_pl_stmts(w, body, depth + 1)?;
                indent(w, depth);
            }
            if !otherwise.is_empty() {
                w.write_str("ELSE\n");
                render_pl_stmts(w, otherwise, depth + 1)?;
                indent(w, depth);
            }
            w.write_str("END IF");
        }
        PlStmt::Assign { target, value } => {
            w.write(target);
            w.write_str(" := ");
            w.write(value);
        }
        PlStmt::Raise(message) => {
            w.write_str("RAISE EXCEPTION ");
            w.write_literal(message);
        }
        PlStmt::Return(value) => {
            w.write_str("RETURN ");
            w.write(value);
        }
        PlStmt::ReturnNull => w.write_str("RETURN NULL"),
        PlStmt::ExecuteFormat { format, args } => {
            w.write_str("EXECUTE format(");
            w.write_literal(format);
            for arg in args {
                w.write_str(", ");
                w.write(arg);
            }
            w.write_str(")");
        }
        PlStmt::Cypher(call) => call.render(w)?,
        PlStmt::Perform(expr) => {
            w.write_str("PERFORM ");
            w.write(expr);
        }
        PlStmt::SelectInto { select, into } => select.write_with_into(w, into),
        PlStmt::Sql(statement) => statement.render(w)?,
    }
    w.write_str(";\n");
    Ok(())
}

/// One top-level SQL statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    DropDatabase { name: String },
    DropRole { name: String },
    /// `CREATE ROLE`, skipped when the role exists.
    CreateRole {
        name: String,
        inherit: bool,
        login_password: Option<String>,
        in_roles: Vec<String>,
    },
    GrantRole { role: String, to: String },
    CreateDatabase { name: String, owner: String },
    CreateSchema { name: String, owner: Option<String> },
    CreateExtension { name: String, schema: Option<String>, cascade: bool },
    Load { library: String },
    AlterDatabaseSet { database: String, parameter: &'static str, value: String },
    AlterRoleSearchPath { role: String, schemas: Vec<String> },
    AlterSchemaOwner { schema: String, owner: String },
    AlterTableOwner { table: QualifiedName, owner: String },
    Grant { privileges: &'static str, on: GrantTarget, to: Vec<String> },
    Revoke { privileges: &'static str, on: GrantTarget, from: Vec<String> },
    /// `ALTER DEFAULT PRIVILEGES IN SCHEMA .. GRANT .. ON <objects> TO ..`
    AlterDefaultPrivileges {
        schemas: Vec<String>,
        privileges: &'static str,
        objects: &'static str,
        to: Vec<String>,
    },
    /// `CREATE TYPE .. AS ENUM`, skipped when the type exists.
    CreateEnum(EnumType),
    CreateTable(CreateTable),
    DropConstraint { table: QualifiedName, name: String },
    AddForeignKey {
        table: QualifiedName,
        name: String,
        column: String,
        target: QualifiedName,
        target_column: String,
        on_delete: &'static str,
    },
    CreateIndex { name: String, table: QualifiedName, columns: Vec<String>, unique: bool },
    /// A structural copy of `source` without rows.
    CreateTableAs { name: QualifiedName, columns: Vec<String>, source: QualifiedName },
    AddIdentityPrimaryKey { table: QualifiedName, column: String },
    CreateFunction(Function),
    CreateTrigger(Trigger),
    EnableRls { table: QualifiedName },
    ForceRls { table: QualifiedName },
    DropPolicy { name: String, table: QualifiedName },
    CreatePolicy {
        name: String,
        table: QualifiedName,
        command: &'static str,
        using: Option<Expr>,
        with_check: Option<Expr>,
    },
    Insert(Insert),
    Delete { table: QualifiedName },
    Select(Select),
    Do(PlBlock),
    /// Output of an earlier [`Statement::to_sql`], nested inside a guard block.
    Rendered(String),
}

impl Statement {
    pub fn to_sql(&self) -> Result<String, EmissionError> {
        let mut w = SqlWriter::new();
        self.render(&mut w)?;
        Ok(w.build())
    }

    fn render(&self, w: &mut SqlWriter) -> Result<(), EmissionError> {
        match self {
            Statement::DropDatabase { name } => {
                w.write_str("DROP DATABASE IF EXISTS ");
                w.write_name(name);
                w.write_str(" WITH (FORCE)");
            }
            Statement::DropRole { name } => {
                w.write_str("DROP ROLE IF EXISTS ");
                w.write_name(name);
            }
            Statement::CreateRole { name, inherit, login_password, in_roles } => {
                let mut create = SqlWriter::new();
                create.write_str("CREATE ROLE ");
                create.write_name(name);
                create.write_str(if *inherit { " INHERIT" } else { " NOINHERIT" });
                if let Some(password) = login_password {
                    create.write_str(" LOGIN PASSWORD ");
                    create.write_literal(password);
                }
                if !in_roles.is_empty() {
                    create.write_str(" IN ROLE ");
                    create.write_names(in_roles);
                }
                let lookup = Select::new(vec![])
                    .from(FromItem::table(QualifiedName::new("pg_catalog", "pg_roles")))
                    .filter(Expr::eq(Expr::column("rolname"), Expr::text(name.as_str())));
                let body = vec![PlStmt::sql(Statement::Rendered(create.build()))];
                Statement::Do(PlBlock::guarded(lookup, body)).render(w)?;
            }
            Statement::GrantRole { role, to } => {
                w.write_str("GRANT ");
                w.write_name(role);
                w.write_str(" TO ");
                w.write_name(to);
            }
            Statement::CreateDatabase { name, owner } => {
                w.write_str("CREATE DATABASE ");
                w.write_name(name);
                w.write_str(" OWNER ");
                w.write_name(owner);
            }
            Statement::CreateSchema { name, owner } => {
                w.write_str("CREATE SCHEMA IF NOT EXISTS ");
                w.write_name(name);
                if let Some(owner) = owner {
                    w.write_str(" AUTHORIZATION ");
                    w.write_name(owner);
                }
            }
            Statement::CreateExtension { name, schema, cascade } => {
                w.write_str("CREATE EXTENSION IF NOT EXISTS ");
                w.write_name(name);
                if let Some(schema) = schema {
                    w.write_str(" WITH SCHEMA ");
                    w.write_name(schema);
                }
                if *cascade {
                    w.write_str(" CASCADE");
                }
            }
            Statement::Load { library } => {
                w.write_str("LOAD ");
                w.write_literal(library);
            }
            Statement::AlterDatabaseSet { database, parameter, value } => {
                w.write_str("ALTER DATABASE ");
                w.write_name(database);
                write!(w, " SET {} TO ", parameter);
                w.write_literal(value);
            }
            Statement::AlterRoleSearchPath { role, schemas } => {
                w.write_str("ALTER ROLE ");
                w.write_name(role);
                w.write_str(" SET search_path TO ");
                w.write_names(schemas);
            }
            Statement::AlterSchemaOwner { schema, owner } => {
                w.write_str("ALTER SCHEMA ");
                w.write_name(schema);
                w.write_str(" OWNER TO ");
                w.write_name(owner);
            }
            Statement::AlterTableOwner { table, owner } => {
                w.write_str("ALTER TABLE ");
                w.write_qualified(table);
                w.write_str(" OWNER TO ");
                w.write_name(owner);
            }
            Statement::Grant { privileges, on, to } => {
                write!(w, "GRANT {} ON ", privileges);
                w.write(on);
                w.write_str(" TO ");
                w.write_names(to);
            }
            Statement::Revoke { privileges, on, from } => {
                write!(w, "REVOKE {} ON ", privileges);
                w.write(on);
                w.write_str(" FROM ");
                w.write_names(from);
            }
            Statement::AlterDefaultPrivileges { schemas, privileges, objects, to } => {
                w.write_str("ALTER DEFAULT PRIVILEGES IN SCHEMA ");
                w.write_names(schemas);
                write!(w, " GRANT {} ON {} TO ", privileges, objects);
                w.write_names(to);
            }
            Statement::CreateEnum(enum_type) => {
                let mut create = SqlWriter::new();
                create.write_str("CREATE TYPE ");
                create.write_qualified(&enum_type.name);
                create.write_str(" AS ENUM (");
                create.write_list(&enum_type.variants, ", ", |w, v| w.write_literal(v));
                create.write_str(")");
                let lookup = Select::new(vec![])
                    .from(FromItem::aliased(QualifiedName::new("pg_catalog", "pg_type"), "t"))
                    .from(FromItem::aliased(QualifiedName::new("pg_catalog", "pg_namespace"), "n"))
                    .filter(Expr::all([
                        Expr::eq(Expr::qualified("n", "oid"), Expr::qualified("t", "typnamespace")),
                        Expr::eq(
                            Expr::qualified("n", "nspname"),
                            Expr::text(enum_type.name.schema.as_str()),
                        ),
                        Expr::eq(
                            Expr::qualified("t", "typname"),
                            Expr::text(enum_type.name.name.as_str()),
                        ),

                    ]));
                let body = vec![PlStmt::sql(Statement::Rendered(create.build()))];
                Statement::Do(PlBlock::guarded(lookup, body)).render(w)?;
            }
            Statement::CreateTable(table) => w.write(table),
            Statement::DropConstraint { table, name } => {
                w.write_str("ALTER TABLE ");
                w.write_qualified(table);
                w.write_str(" DROP CONSTRAINT IF EXISTS ");
                w.write_name(name);
            }
            Statement::AddForeignKey { table, name, column, target, target_column, on_delete } => {
                w.write_str("ALTER TABLE ");
                w.write_qualified(table);
                w.write_str(" ADD CONSTRAINT ");
                w.write_name(name);
                w.write_str(" FOREIGN KEY (");
                w.write_name(column);
                w.write_str(") REFERENCES ");
                w.write_qualified(target);
                w.write_str(" (");
                w.write_name(target_column);
                write!(w, ") ON DELETE {}", on_delete);
            }
            Statement::CreateIndex { name, table, columns, unique } => {
                w.write_str(if *unique { "CREATE UNIQUE INDEX" } else { "CREATE INDEX" });
                w.write_str(" IF NOT EXISTS ");
                w.write_name(name);
                w.write_str(" ON ");
                w.write_qualified(table);
                w.write_str(" (");
                w.write_names(columns);
                w.write_str(")");
            }
            Statement::CreateTableAs { name, columns, source } => {
                w.write_str("CREATE TABLE IF NOT EXISTS ");
                w.write_qualified(name);
                w.write_str(" AS (SELECT ");
                w.write_names(columns);
                w.write_str(" FROM ");
                w.write_qualified(source);
                w.write_str(") WITH NO DATA");
            }
            Statement::AddIdentityPrimaryKey { table, column } => {
                w.write_str("ALTER TABLE ");
                w.write_qualified(table);
                w.write_str(" ADD COLUMN IF NOT EXISTS ");
                w.write_name(column);
                w.write_str(" INT GENERATED ALWAYS AS IDENTITY PRIMARY KEY");
            }
            Statement::CreateFunction(function) => render_function(w, function)?,
            Statement::CreateTrigger(trigger) => {
                w.write_str("CREATE OR REPLACE TRIGGER ");
                w.write_name(&trigger.name);
                w.write_str(match trigger.timing {
                    Timing::Before => " BEFORE ",
                    Timing::After => " AFTER ",
                });
                w.write_str(&trigger.events.join(" OR "));
                w.write_str(" ON ");
                w.write_qualified(&trigger.table);
                w.write_str(match trigger.level {
                    TriggerLevel::Row => " FOR EACH ROW",
                    TriggerLevel::Statement => " FOR EACH STATEMENT",
                });
                w.write_str(" EXECUTE FUNCTION ");
                w.write_qualified(&trigger.function);
                w.write_str("()");
            }
            Statement::EnableRls { table } => {
                w.write_str("ALTER TABLE ");
                w.write_qualified(table);
                w.write_str(" ENABLE ROW LEVEL SECURITY");
            }
            Statement::ForceRls { table } => {
                w.write_str("ALTER TABLE ");
                w.write_qualified(table);
                w.write_str(" FORCE ROW LEVEL SECURITY");
            }
            Statement::DropPolicy { name, table } => {
                w.write_str("DROP POLICY IF EXISTS ");
                w.write_name(name);
                w.write_str(" ON ");
                w.write_qualified(table);
            }
            Statement::CreatePolicy { name, table, command, using, with_check } => {
                w.write_str("CREATE POLICY ");
                w.write_name(name);
                w.write_str(" ON ");
                w.write_qualified(table);
                write!(w, " FOR {}", command);
                if let Some(using) = using {
                    w.write_str(" USING (");
                    w.write(using);
                    w.write_str(")");
                }
                if let Some(with_check) = with_check {
                    w.write_str(" WITH CHECK (");
                    w.write(with_check);
                    w.write_str(")");
                }
            }
            Statement::Insert(insert) => w.write(insert),
            Statement::Delete { table } => {
                w.write_str("DELETE FROM ");
                w.write_qualified(table);
            }
            Statement::Select(select) => w.write(select),
            Statement::Do(block) => {
                let mut body = SqlWriter::new();
                block.render(&mut body)?;
                w.write_str("DO ");
                w.write_dollar_quoted("do", &body.build())?;
            }
            Statement::Rendered(sql) => w.write_str(sql),
        }
        Ok(())
    }
}

fn render_function(w: &mut SqlWriter, function: &Function) -> Result<(), EmissionError> {
    w.write_str("CREATE OR REPLACE FUNCTION ");
    w.write_qualified(&function.name);
    w.write_str("(");
    w.write_list(&function.args, ", ", |w, arg| {
        write!(w, "{} {}", arg.name, arg.ty);
        if let Some(default) = &arg.default {
            w.write_str(" DEFAULT ");
            w.write(default);
        }
    });
    write!(w, ")\nRETURNS {}\n", function.returns);
    w.write_str(match function.language() {
        Language::PlPgSql => "LANGUAGE plpgsql\n",
        Language::Sql => "LANGUAGE sql\n",
    });
    if let Some(volatility) = function.volatility {
        write!(w, "{}\n", volatility);
    }
    if function.security_definer {
        w.write_str("SECURITY DEFINER\n");
    }
    let mut body = SqlWriter::new();
    match &function.body {
        FunctionBody::Pl(block) => block.render(&mut body)?,
        FunctionBody::Query(select) => body.write(select),
    }
    w.write_str("AS ");
    w.write_dollar_quoted("fn", &format!("\n{}\n", body.build()))
}

/// Statements separated the way `psql` scripts are.
pub fn script(statements: &[Statement]) -> Result<String, EmissionError> {
    let rendered = statements.iter().map(Statement::to_sql).collect::<Result<Vec<_>, _>>()?;
    Ok(rendered.join(";\n\n") + if rendered.is_empty() { "" } else { ";\n" })
}
