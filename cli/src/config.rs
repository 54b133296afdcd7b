// SPDX-FileCopyrightText: © 2022 ChiselStrike <info@chiselstrike.com>

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgConnectOptions;
use std::path::{Path, PathBuf};
use un0_datastore::{ConnectTargets, DbSettings, SuperuserSeed};
use un0_schema::QualifiedName;

#[derive(Parser, Debug)]
#[command(name = "un0", version, about = "Builds un0 PostgreSQL databases")]
pub struct Opt {
    /// Read configuration from this TOML file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
    /// PostgreSQL server host.
    #[arg(long, env = "UN0_DB_HOST", global = true)]
    pub db_host: Option<String>,
    #[arg(long, env = "UN0_DB_PORT", global = true)]
    pub db_port: Option<u16>,
    /// Superuser the compiler connects as.
    #[arg(long, env = "UN0_DB_USER", global = true)]
    pub db_user: Option<String>,
    #[arg(long, env = "UN0_DB_PASSWORD", global = true, hide_env_values = true)]
    pub db_password: Option<String>,
    /// Name of the database to build.
    #[arg(long, env = "UN0_DB_NAME", global = true)]
    pub db_name: Option<String>,
    /// Database to connect to while creating or dropping the target database.
    #[arg(long, env = "UN0_MAINTENANCE_DB", global = true)]
    pub maintenance_db: Option<String>,
    /// Prints the configuration resulting from the merging of all the configuration sources,
    /// including default values, in the JSON format.
    #[arg(long, global = true)]
    pub show_config: bool,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Creates the roles, the database and every builtin table.
    CreateDb {
        /// Build on top of an existing database instead of dropping it first.
        #[arg(long)]
        keep_existing: bool,
        /// Do not insert the bootstrap superuser.
        #[arg(long)]
        no_seed: bool,
    },
    /// Drops the database and its roles.
    DropDb,
    /// Prints the SQL create-db would run, without connecting.
    Emit {
        /// Only the statements emitted for this table (`schema.table`).
        #[arg(long)]
        table: Option<String>,
    },
    /// Prints the registered tables as JSON.
    Describe,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    pub db_host: String,
    pub db_port: u16,
    pub db_user: String,
    pub db_password: Option<String>,
    pub maintenance_db: String,
    pub db_name: String,
    pub app_schema: String,
    pub graph_name: String,
    pub session_prefix: String,
    pub login_password: String,
    pub superuser_email: String,
    pub superuser_handle: String,
    pub superuser_full_name: String,
    pub extensions: Vec<String>,
    pub load_age: bool,
}

impl Default for Config {
    fn default() -> Self {
        let settings = DbSettings::default();
        Self {
            db_host: "localhost".into(),
            db_port: 5432,
            db_user: "postgres".into(),
            db_password: None,
            maintenance_db: "postgres".into(),
            db_name: settings.db_name,
            app_schema: settings.app_schema,
            graph_name: settings.graph_name,
            session_prefix: settings.session_prefix,
            login_password: settings.login_password,
            superuser_email: settings.superuser.email,
            superuser_handle: settings.superuser.handle,
            superuser_full_name: settings.superuser.full_name,
            extensions: settings.extensions,
            load_age: settings.load_age,
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("could not read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("could not parse config file {}", path.display()))
    }

    /// Defaults, then the config file, then flags and environment variables.
    pub fn load(opt: &Opt) -> Result<Self> {
        let mut config = match &opt.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        if let Some(host) = &opt.db_host {
            config.db_host = host.clone();
        }
        if let Some(port) = opt.db_port {
            config.db_port = port;
        }
        if let Some(user) = &opt.db_user {
            config.db_user = user.clone();
        }
        if let Some(password) = &opt.db_password {
            config.db_password = Some(password.clone());
        }
        if let Some(name) = &opt.db_name {
            config.db_name = name.clone();
        }
        if let Some(name) = &opt.maintenance_db {
            config.maintenance_db = name.clone();
        }
        Ok(config)
    }

    pub fn db_settings(&self) -> DbSettings {
        DbSettings {
            db_name: self.db_name.clone(),
            app_schema: self.app_schema.clone(),
            graph_name: self.graph_name.clone(),
            session_prefix: self.session_prefix.clone(),
            login_password: self.login_password.clone(),
            superuser: SuperuserSeed {
                email: self.superuser_email.clone(),
                handle: self.superuser_handle.clone(),
                full_name: self.superuser_full_name.clone(),
            },
            extensions: self.extensions.clone(),
            load_age: self.load_age,
            user_table: QualifiedName::new("un0", "user"),
        }
    }

    pub fn connect_targets(&self) -> ConnectTargets {
        let mut options = PgConnectOptions::new()
            .host(&self.db_host)
            .port(self.db_port)
            .username(&self.db_user);
        if let Some(password) = &self.db_password {
            options = options.password(password);
        }
        ConnectTargets::new(options, &self.maintenance_db, &self.db_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_db_settings() {
        assert_eq!(Config::default().db_settings(), DbSettings::default());
    }

    #[test]
    fn partial_file() {
        let config: Config = toml::from_str("db_name = \"shop\"\nload_age = false\n").unwrap();
        assert_eq!(config.db_name, "shop");
        assert!(!config.load_age);
        assert_eq!(config.db_port, 5432);
        assert_eq!(config.db_settings().admin_role(), "shop_admin");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<Config>("db_nmae = \"shop\"\n").is_err());
    }

    #[test]
    fn flags_override_defaults() {
        let opt = Opt::parse_from(["un0", "--db-port", "6543", "--db-name", "shop", "describe"]);
        let config = Config::load(&opt).unwrap();
        assert_eq!(config.db_port, 6543);
        assert_eq!(config.db_name, "shop");
        assert!(matches!(opt.command, Some(Command::Describe)));
    }
}
