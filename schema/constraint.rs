use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    /// Predicate emitted verbatim inside `CHECK (...)`.
    Check(String),
    Unique(Vec<String>),
}

/// A named table constraint beyond what the columns declare themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintDescriptor {
    pub name: String,
    pub kind: ConstraintKind,
}

impl ConstraintDescriptor {
    pub fn check(name: impl Into<String>, predicate: impl Into<String>) -> Self {
        Self { name: name.into(), kind: ConstraintKind::Check(predicate.into()) }
    }

    pub fn unique<S: Into<String>>(
        name: impl Into<String>,
        columns: impl IntoIterator<Item = S>,
    ) -> Self {
        let columns = columns.into_iter().map(Into::into).collect();
        Self { name: name.into(), kind: ConstraintKind::Unique(columns) }
    }

    pub fn columns(&self) -> &[String] {
        match &self.kind {
            ConstraintKind::Check(_) => &[],
            ConstraintKind::Unique(columns) => columns,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

impl IndexDescriptor {
    pub fn new<S: Into<String>>(
        name: impl Into<String>,
        columns: impl IntoIterator<Item = S>,
    ) -> Self {

        let columns = columns.into_iter().map(Into::into).collect();
        Self { name: name.into(), columns, unique: false }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

pub fn primary_key_name(table: &str) -> String {
    format!("{}_pkey", table)
}

pub fn unique_key_name(table: &str, column: &str) -> String {
    format!("{}_{}_key", table, column)
}

pub fn foreign_key_name(table: &str, column: &str) -> String {
    format!("{}_{}_fkey", table, column)
}

pub fn index_name(table: &str, column: &str) -> String {
    format!("{}_{}_idx", table, column)
}
