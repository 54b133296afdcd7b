//! The schema compiler: turns a registry into an ordered [`Plan`] and runs it.

use anyhow::{Context, Result};
use un0_schema::SchemaRegistry;
use crate::conn::ConnectTargets;
use crate::settings::DbSettings;

mod exec;
mod plan;

pub use self::exec::execute;
pub use self::plan::{plan_database, plan_drop, Phase, Plan, PlanOpts, Stage, Target, Unit};

/// Plans and builds the database in one go.
pub async fn create_database(
    registry: &SchemaRegistry,
    settings: &DbSettings,
    opts: &PlanOpts,
    targets: &ConnectTargets,
) -> Result<()> {
    let plan = plan_database(registry, settings, opts).context("could not plan database")?;
    execute(&plan, targets)
        .await
        .with_context(|| format!("could not create database {}", settings.db_name))
}

pub async fn drop_database(settings: &DbSettings, targets: &ConnectTargets) -> Result<()> {
    let plan = plan_drop(settings)?;
    execute(&plan, targets)
        .await
        .with_context(|| format!("could not drop database {}", settings.db_name))

}
