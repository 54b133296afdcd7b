use convert_case::{Case, Casing};
use lazy_static::lazy_static;
use regex::Regex;

/// PostgreSQL truncates identifiers longer than this (NAMEDATALEN - 1).
const MAX_IDENTIFIER_LEN: usize = 63;

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new("^[a-z_][a-z0-9_]*$").unwrap();
    static ref LABEL: Regex = Regex::new("^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

/// Is `name` acceptable as a schema, table, column or constraint name?
///
/// We only accept lowercase snake case, so every name we emit is the same whether it is quoted or
/// not, and it can be embedded in Cypher and in `format()` strings without escaping surprises.
pub fn is_valid_identifier(name: &str) -> bool {
    name.len() <= MAX_IDENTIFIER_LEN && IDENTIFIER.is_match(name)
}

/// Is `label` acceptable as a graph (vertex or edge) label?
pub fn is_valid_label(label: &str) -> bool {
    label.len() <= MAX_IDENTIFIER_LEN && LABEL.is_match(label)
}

/// Derives the vertex label for a table: `user_group_role` becomes `UserGroupRole`.
pub fn vertex_label(table_name: &str) -> String {
    table_name.to_case(Case::Pascal)
}
