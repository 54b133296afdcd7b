#![allow(clippy::needless_lifetimes)]

pub mod ast;
pub mod bootstrap;
pub mod compile;
pub mod conn;
pub mod cypher;
pub mod ddl;
pub mod emit;
mod settings;
mod sql_writer;

pub use crate::compile::{
    create_database, drop_database, execute, plan_database, plan_drop, Plan, PlanOpts,
};

pub use crate::conn::ConnectTargets;
pub use crate::emit::{emit_sql, emit_table, EmissionError, EmitContext};
pub use crate::settings::{DbSettings, SuperuserSeed};
pub use crate::sql_writer::SqlWriter;
