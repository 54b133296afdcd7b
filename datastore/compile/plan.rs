use anyhow::{Context, Result};
use std::fmt;
use un0_schema::SchemaRegistry;
use crate::ast::Statement;
use crate::bootstrap;
use crate::ddl;
use crate::emit::{emit_table, EmissionError, EmitContext};
use crate::settings::DbSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Bootstrap,
    TableDdl,
    Emission,
    Seed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Bootstrap => "bootstrap",
            Phase::TableDdl => "table DDL",
            Phase::Emission => "emission",
            Phase::Seed => "seed",
        })
    }
}

/// The database a stage connects to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// The server's maintenance database, for roles and `CREATE DATABASE`.
    Maintenance,
    /// The database being built.
    Database,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Target::Maintenance => "maintenance",
            Target::Database => "target",
        })
    }
}

/// Statements that are logged and skipped together.
#[derive(Debug, Clone)]
pub struct Unit {
    pub label: String,
    /// The unit is skipped when this query returns a row.
    pub skip_if: Option<String>,
    pub statements: Vec<String>,
}

impl Unit {
    fn new(label: impl Into<String>, statements: &[Statement]) -> Result<Self, EmissionError> {
        Ok(Self {
            label: label.into(),
            skip_if: None,
            statements: statements.iter().map(Statement::to_sql).collect::<Result<_, _>>()?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Stage {
    pub phase: Phase,
    pub target: Target,
    pub units: Vec<Unit>,
}

#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub stages: Vec<Stage>,
}

impl Plan {
    fn push(&mut self, phase: Phase, target: Target, units: Vec<Unit>) {
        if !units.is_empty() {
            self.stages.push(Stage { phase, target, units });
        }
    }

    pub fn units(&self) -> impl Iterator<Item = &Unit> {
        self.stages.iter().flat_map(|s| s.units.iter())
    }

    pub fn statement_count(&self) -> usize {
        self.units().map(|u| u.statements.len()).sum()
    }

    /// The whole plan as a commented SQL script.
    pub fn to_script(&self) -> String {
        let mut script = String::new();
        for stage in &self.stages {
            script += &format!("-- {} phase, on the {} database\n\n", stage.phase, stage.target);
            for unit in &stage.units {
                script += &format!("-- {}\n", unit.label);
                if let Some(check) = &unit.skip_if {
                    script += &format!("-- skipped when this returns a row: {}\n", check);
                }
                for statement in &unit.statements {
                    script += statement;
                    script += ";\n\n";
                }
            }
        }
        script
    }
}

#[derive(Debug, Clone)]
pub struct PlanOpts {
    /// Drop the database and its roles first.
    pub drop_existing: bool,
    /// Insert the bootstrap superuser.
    pub seed: bool,
}

impl Default for PlanOpts {
    fn default() -> Self {
        Self { drop_existing: false, seed: true }
    }
}

/// Table-type and filter-field registrations, as opposed to schema objects.
fn writes_rows(statement: &Statement) -> bool {
    matches!(statement, Statement::Insert(_))
}

fn validate(registry: &SchemaRegistry, settings: &DbSettings) -> Result<()> {
    settings.validate().context("invalid database settings")?;
    registry.validate().context("invalid schema registry")?;
    Ok(())
}

/// Every statement needed to build the database described by `registry`, in order.
pub fn plan_database(
    registry: &SchemaRegistry,
    settings: &DbSettings,
    opts: &PlanOpts,
) -> Result<Plan> {
    validate(registry, settings)?;
    let mut plan = Plan::default();

    let mut units = vec![];
    if opts.drop_existing {
        units.push(Unit::new("drop database and roles", &bootstrap::drop_database(settings))?);
    }
    units.push(Unit::new("roles", &bootstrap::create_roles(settings))?);
    let mut create = Unit::new(
        format!("database {}", settings.db_name),
        &[bootstrap::create_database(settings)],
    )?;
    create.skip_if = Some(bootstrap::database_exists(settings).to_sql()?);
    units.push(create);
    plan.push(Phase::Bootstrap, Target::Maintenance, units);

    let units = vec![
        Unit::new("schemas, extensions and graph", &bootstrap::schemas_and_extensions(settings))?,
        Unit::new("privileges", &bootstrap::privileges(settings))?,
        Unit::new("enum types", &bootstrap::enum_types(registry))?,
        Unit::new("ulid generator", &[bootstrap::generate_ulid()])?,
    ];
    plan.push(Phase::Bootstrap, Target::Database, units);

    let tables = registry.dependency_order();
    let mut units = vec![];
    for table in &tables {
        units.push(Unit::new(
            format!("table {}", table.qualified_name()),
            &[ddl::create_table(table)],
        )?);
    }
    let foreign_keys: Vec<Statement> = tables.iter().flat_map(|t| ddl::foreign_keys(t)).collect();
    units.push(Unit::new("foreign keys", &foreign_keys)?);
    let indexes: Vec<Statement> = tables.iter().flat_map(|t| ddl::indexes(t)).collect();
    units.push(Unit::new("indexes", &indexes)?);
    units.push(Unit::new("table functions", &bootstrap::table_functions(settings))?);
    units.push(Unit::new("table privileges", &bootstrap::table_privileges(settings))?);
    plan.push(Phase::TableDdl, Target::Database, units);

    // Every table gets its triggers before any rows are written into the registry tables, so
    // those rows go through the graph and permission triggers like any other.
    let cx = EmitContext::new(settings, registry);
    let mut units = vec![];
    let mut records = vec![];
    for table in &tables {
        let name = table.qualified_name();
        let statements =
            emit_table(&cx, table).with_context(|| format!("could not emit table {}", name))?;
        let (rows, objects): (Vec<Statement>, Vec<Statement>) =
            statements.into_iter().partition(writes_rows);

        units.push(Unit::new(name.to_string(), &objects)?);
        if !rows.is_empty() {
            records.push(Unit::new(format!("{} records", name), &rows)?);
        }
    }
    units.extend(records);
    plan.push(Phase::Emission, Target::Database, units);

    if opts.seed {
        let seed = Unit::new("superuser", &[bootstrap::seed_superuser(settings)])?;
        plan.push(Phase::Seed, Target::Database, vec![seed]);
    }
    Ok(plan)
}

/// Drops the database and its roles.
pub fn plan_drop(settings: &DbSettings) -> Result<Plan> {
    settings.validate().context("invalid database settings")?;
    let mut plan = Plan::default();
    let drop = Unit::new("drop database and roles", &bootstrap::drop_database(settings))?;
    plan.push(Phase::Bootstrap, Target::Maintenance, vec![drop]);

    Ok(plan)
}
