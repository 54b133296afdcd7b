// SPDX-FileCopyrightText: © 2021 ChiselStrike <info@chiselstrike.com>

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use log::info;
use un0_datastore::{create_database, drop_database, emit_sql, plan_database, EmitContext, PlanOpts};

use un0_schema::{register_builtin, QualifiedName, SchemaRegistry};

mod config;

use crate::config::{Command, Config, Opt};

fn builtin_registry() -> Result<SchemaRegistry> {
    let mut registry = SchemaRegistry::new();
    register_builtin(&mut registry).context("could not register the builtin tables")?;
    Ok(registry)
}

fn parse_table(name: &str) -> Result<QualifiedName> {
    let (schema, table) = name
        .split_once('.')
        .ok_or_else(|| anyhow!("table {:?} must be given as schema.table", name))?;

    Ok(QualifiedName::new(schema, table))
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let opt = Opt::parse();
    let config = Config::load(&opt)?;

    if opt.show_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }
    let command = match opt.command {
        Some(command) => command,
        None => bail!("no command given, see `un0 --help`"),
    };

    let settings = config.db_settings();
    let registry = builtin_registry()?;
    match command {
        Command::CreateDb { keep_existing, no_seed } => {
            let opts = PlanOpts { drop_existing: !keep_existing, seed: !no_seed };
            create_database(&registry, &settings, &opts, &config.connect_targets()).await?;
            info!("database {} is ready", settings.db_name);
        }
        Command::DropDb => {
            drop_database(&settings, &config.connect_targets()).await?;
            info!("database {} dropped", settings.db_name);
        }
        Command::Emit { table: Some(name) } => {
            let name = parse_table(&name)?;
            let table = registry.lookup(&name)?;
            let cx = EmitContext::new(&settings, &registry);
            print!("{}", emit_sql(&cx, table)?);
        }
        Command::Emit { table: None } => {
            let plan = plan_database(&registry, &settings, &PlanOpts::default())
                .context("could not plan database")?;
            print!("{}", plan.to_script());
        }
        Command::Describe => {
            let tables: Vec<_> = registry.tables().collect();
            println!("{}", serde_json::to_string_pretty(&tables)?);
        }
    }
    Ok(())
}
