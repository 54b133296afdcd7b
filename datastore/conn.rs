use anyhow::{Context, Result};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use crate::compile::Target;

/// Connection options for both databases the compiler talks to.
#[derive(Debug, Clone)]
pub struct ConnectTargets {
    pub maintenance: PgConnectOptions,
    pub database: PgConnectOptions,
}

impl ConnectTargets {
    /// Uses the server, credentials and TLS settings of `base` for both targets.
    pub fn new(base: PgConnectOptions, maintenance_db: &str, db_name: &str) -> Self {
        Self {
            maintenance: base.clone().database(maintenance_db),
            database: base.database(db_name),
        }
    }

    pub fn options(&self, target: Target) -> &PgConnectOptions {
        match target {
            Target::Maintenance => &self.maintenance,
            Target::Database => &self.database,
        }
    }

    pub async fn connect(&self, target: Target) -> Result<PgConnection> {
        PgConnection::connect_with(self.options(target))
            .await
            .with_context(|| format!("could not connect to the {} database", target))

    }
}
