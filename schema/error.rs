use crate::table::QualifiedName;

/// A model declaration that cannot be turned into a consistent table.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error["invalid identifier {0:?}"]]
    InvalidIdentifier(String),
    #[error["invalid graph label {0:?}"]]
    InvalidLabel(String),
    #[error["column {column:?} is listed in both the include and exclude list of view {view:?}"]]
    IncludedAndExcluded { view: String, column: String },
    #[error["column {column:?} appears more than once in the {list} list of view {view:?}"]]
    DuplicateInList { view: String, list: &'static str, column: String },
    #[error["view {view:?} of {table} names unknown column {column:?}"]]
    UnknownViewColumn { table: QualifiedName, view: String, column: String },
    #[error["view {view:?} is declared twice on {table}"]]
    DuplicateView { table: QualifiedName, view: String },
    #[error["constraint name {name:?} is used twice on {table}"]]
    DuplicateConstraintName { table: QualifiedName, name: String },
    #[error["{0} has no primary key"]]
    MissingPrimaryKey(QualifiedName),
    #[error["{0} is a vertex, so it needs a single-column primary key"]]
    CompositeVertexKey(QualifiedName),
    #[error["{table} names unknown column {column:?} in {context}"]]
    UnknownColumn { table: QualifiedName, column: String, context: String },
    #[error["foreign key {table}.{column} references unknown table {target}"]]
    UnknownForeignKeyTarget { table: QualifiedName, column: String, target: QualifiedName },
    #[error["foreign key {table}.{column} references unknown column {target}.{target_column}"]]
    UnknownForeignKeyColumn {
        table: QualifiedName,
        column: String,
        target: QualifiedName,
        target_column: String,
    },
    #[error["edge labels on {table}.{column} require a foreign key"]]
    EdgeWithoutForeignKey { table: QualifiedName, column: String },
    #[error["column {table}.{column} uses unknown enum type {type_name}"]]
    UnknownEnum { table: QualifiedName, column: String, type_name: QualifiedName },
    #[error["vertex label {label:?} is derived by both {first} and {second}"]]
    DuplicateVertexLabel { label: String, first: QualifiedName, second: QualifiedName },
    #[error["edge label {label:?} declared on {table} collides with a vertex label"]]
    EdgeLabelIsVertexLabel { label: String, table: QualifiedName },
    #[error["edge {label:?} from {start:?} to {end:?} is declared more than once"]]
    DuplicateEdge { label: String, start: String, end: String },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error["table name exists: {0}"]]
    TableNameExists(QualifiedName),
    #[error["class name exists: {class_name:?} is already mapped to {table}"]]
    ClassNameExists { class_name: String, table: QualifiedName },
    #[error["no such table: {0}"]]
    NoSuchTable(QualifiedName),
}
