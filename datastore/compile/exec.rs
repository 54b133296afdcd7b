use anyhow::{Context, Result};
use log::{debug, info};
use sqlx::{Connection, Executor, PgConnection};
use crate::conn::ConnectTargets;
use super::plan::{Plan, Stage, Target, Unit};

/// Runs the plan stage by stage, reusing the connection while the target stays the same.
///
/// Statements run in autocommit mode; whatever ran before a failure stays applied.
pub async fn execute(plan: &Plan, targets: &ConnectTargets) -> Result<()> {
    let mut current: Option<(Target, PgConnection)> = None;
    for stage in &plan.stages {
        let mut conn = match current.take() {
            Some((target, conn)) if target == stage.target => conn,
            previous => {
                if let Some((_, conn)) = previous {
                    conn.close().await.context("could not close connection")?;
                }
                targets.connect(stage.target).await?
            }
        };
        info!(
            "{} phase on the {} database ({} units)",
            stage.phase,
            stage.target,
            stage.units.len()
        );
        exec_stage(&mut conn, stage)
            .await
            .with_context(|| format!("{} phase failed", stage.phase))?;
        current = Some((stage.target, conn));
    }
    if let Some((_, conn)) = current {
        conn.close().await.context("could not close connection")?;
    }
    Ok(())
}

async fn exec_stage(conn: &mut PgConnection, stage: &Stage) -> Result<()> {
    for unit in &stage.units {
        exec_unit(conn, unit)
            .await
            .with_context(|| format!("could not apply {}", unit.label))?;
    }
    Ok(())
}

async fn exec_unit(conn: &mut PgConnection, unit: &Unit) -> Result<()> {
    if let Some(check) = &unit.skip_if {
        let found = sqlx::query(check)
            .fetch_optional(&mut *conn)
            .await
            .context("could not check whether the unit was applied")?;
        if found.is_some() {
            info!("{} already exists, skipping", unit.label);
            return Ok(());
        }
    }
    info!("applying {}", unit.label);
    for sql_text in &unit.statements {
        execute_sql(conn, sql_text).await?;
    }
    Ok(())
}

async fn execute_sql(conn: &mut PgConnection, sql_text: &str) -> Result<()> {
    debug!("{}", sql_text);
    (&mut *conn).execute(sql_text).await.with_context(|| {
        if cfg!(debug_assertions) {
            format!("could not execute SQL statement {:?}", sql_text)
        } else {
            "could not execute SQL statement".into()
        }
    })?;

    Ok(())
}
